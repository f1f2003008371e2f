//! Call sampling.

/// Policy deciding whether a specific call is traced.
///
/// The policy is stateless besides the sampling rate: the rate is the probability
/// with which each call is independently selected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPolicy {
    rate: f64,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self::ALWAYS
    }
}

impl SamplingPolicy {
    /// Policy sampling every call.
    pub const ALWAYS: Self = Self { rate: 1.0 };
    /// Policy never sampling calls.
    pub const NEVER: Self = Self { rate: 0.0 };

    /// Creates a policy with the specified rate. Rates `>= 1.0` sample every call; rates `<= 0.0`
    /// (as well as NaN) never sample.
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }

    /// Returns the sampling rate.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Decides whether a call to the specified method should be traced.
    pub fn should_sample(&self, _method: &str) -> bool {
        if self.rate >= 1.0 {
            true
        } else if self.rate > 0.0 {
            rand::random::<f64>() < self.rate
        } else {
            false
        }
    }
}
