//! Tracer configuration.

use serde::{Deserialize, Serialize};

use std::{error, fmt};

use crate::{buffer::MessageBuffer, sampling::SamplingPolicy};

/// Configuration of call capture. Read once when a registry is created.
///
/// The config can be deserialized with all fields being optional.
///
/// # Examples
///
/// ```
/// # use rpcz_capture::TracerConfig;
/// let config = TracerConfig::default()
///     .with_sampling_rate(0.25)
///     .with_message_retention(3, 7)
///     .with_metadata(false);
/// config.validate()?;
/// assert_eq!(config.calls_per_method, 10);
/// # Ok::<_, rpcz_capture::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct TracerConfig {
    /// Probability that a call is traced. Default: 1.0 (all calls are traced).
    pub sampling_rate: f64,
    /// Number of most recent calls retained per method and direction. Default: 10.
    pub calls_per_method: usize,
    /// Number of first messages retained per call. Default: 5.
    pub keep_first_messages: usize,
    /// Number of last messages retained per call. Default: 5.
    pub keep_last_messages: usize,
    /// Whether call metadata is recorded. Default: true.
    pub record_metadata: bool,
    /// Number of messages in a call after which message payloads are no longer retained.
    /// Default: 64.
    pub huge_message_cutoff: Option<usize>,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 1.0,
            calls_per_method: 10,
            keep_first_messages: 5,
            keep_last_messages: 5,
            record_metadata: true,
            huge_message_cutoff: Some(64),
        }
    }
}

impl TracerConfig {
    /// Sets the sampling rate.
    #[must_use]
    pub fn with_sampling_rate(mut self, rate: f64) -> Self {
        self.sampling_rate = rate;
        self
    }

    /// Sets the number of retained calls per method.
    #[must_use]
    pub fn with_calls_per_method(mut self, count: usize) -> Self {
        self.calls_per_method = count;
        self
    }

    /// Sets the number of retained first and last messages per call.
    #[must_use]
    pub fn with_message_retention(mut self, keep_first: usize, keep_last: usize) -> Self {
        self.keep_first_messages = keep_first;
        self.keep_last_messages = keep_last;
        self
    }

    /// Switches recording of call metadata.
    #[must_use]
    pub fn with_metadata(mut self, record: bool) -> Self {
        self.record_metadata = record;
        self
    }

    /// Sets the huge message cutoff. `None` disables the cutoff.
    #[must_use]
    pub fn with_huge_message_cutoff(mut self, cutoff: Option<usize>) -> Self {
        self.huge_message_cutoff = cutoff;
        self
    }

    /// Validates this config.
    ///
    /// # Errors
    ///
    /// Returns an error if the sampling rate is not finite or the number of calls
    /// per method is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sampling_rate.is_finite() {
            return Err(ConfigError::InvalidSamplingRate(self.sampling_rate));
        }
        if self.calls_per_method == 0 {
            return Err(ConfigError::ZeroCallsPerMethod);
        }
        Ok(())
    }

    pub(crate) fn sampling_policy(&self) -> SamplingPolicy {
        SamplingPolicy::new(self.sampling_rate)
    }

    pub(crate) fn ring_len(&self) -> usize {
        self.calls_per_method.max(1)
    }

    pub(crate) fn new_buffer<T>(&self) -> MessageBuffer<T> {
        MessageBuffer::new(self.keep_first_messages, self.keep_last_messages)
            .with_huge_cutoff(self.huge_message_cutoff)
    }
}

/// Errors that can occur when validating a [`TracerConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    /// The sampling rate is NaN or infinite.
    InvalidSamplingRate(f64),
    /// Zero calls per method are configured to be retained.
    ZeroCallsPerMethod,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSamplingRate(rate) => {
                write!(formatter, "sampling rate must be finite, got {rate}")
            }
            Self::ZeroCallsPerMethod => {
                formatter.write_str("at least one call per method must be retained")
            }
        }
    }
}

impl error::Error for ConfigError {}
