//! Interceptors and stream wrappers capturing recent RPC calls.
//!
//! This crate glues the capture engine from [`rpcz_capture`] to RPC call sites. The entry point
//! is [`Tracer`]; it provides adapters for unary calls ([`Tracer::unary_client()`],
//! [`Tracer::unary_server()`]) and for streaming calls ([`Tracer::stream_client()`],
//! [`Tracer::stream_server()`]). Adapters never alter the wrapped call: its result is returned
//! unchanged, and calls that are not sampled run without any capture.
//!
//! Streaming calls are captured via decorators implementing the [`ClientStream`] / [`ServerStream`]
//! traits, which describe the streaming surface of the host RPC framework.
//!
//! # Examples
//!
//! ```
//! use rpcz_interceptor::{CallContext, Code, Status, Tracer, TracerConfig};
//! use std::net::SocketAddr;
//!
//! let tracer = Tracer::new(TracerConfig::default().with_calls_per_method(5));
//! let context = CallContext::new().with_peer("10.0.0.1:443".parse()?);
//! let response = tracer.unary_server("/test.Math/Sqrt", &context, &-4.0_f64, |&value| {
//!     if value < 0.0 {
//!         Err(Status::new(Code::InvalidArgument, "negative value"))
//!     } else {
//!         Ok(value.sqrt())
//!     }
//! });
//! assert!(response.is_err());
//!
//! let snapshot = tracer.snapshot();
//! let call = &snapshot.method("recv: /test.Math/Sqrt").unwrap().calls()[0];
//! assert_eq!(call.status().unwrap().code(), Code::InvalidArgument);
//! assert_eq!(call.peer(), Some("10.0.0.1:443".parse::<SocketAddr>()?));
//! # Ok::<_, std::net::AddrParseError>(())
//! ```

// Documentation settings.
#![doc(html_root_url = "https://docs.rs/rpcz-interceptor/0.1.0")]
// Linter settings.
#![warn(missing_debug_implementations, missing_docs, bare_trait_objects)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

use once_cell::sync::OnceCell;

use std::{error, fmt};

mod stream;
mod unary;

pub use crate::{
    stream::{ClientStream, ServerStream, TracedClientStream, TracedServerStream},
    unary::UnaryCall,
};
pub use rpcz_capture::{
    CallContext, CallHandle, Code, Direction, Json, Metadata, Opaque, Payload, SharedRegistry,
    Snapshot, Status, Text, ToStatus, TracerConfig,
};

/// Captures RPC calls into a [`SharedRegistry`].
///
/// A tracer is cheap to clone; clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct Tracer {
    registry: SharedRegistry,
}

impl Tracer {
    /// Creates a tracer with a new registry using the specified configuration.
    pub fn new(config: TracerConfig) -> Self {
        Self::with_registry(SharedRegistry::new(config))
    }

    /// Creates a tracer capturing calls into an existing registry.
    pub fn with_registry(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    /// Returns the registry this tracer captures calls into.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Takes a snapshot of all retained calls.
    pub fn snapshot(&self) -> Snapshot {
        self.registry.snapshot()
    }

    fn sample(
        &self,
        method: &str,
        direction: Direction,
        context: &CallContext,
        initial: Option<&dyn Payload>,
    ) -> Option<CallHandle> {
        self.registry.sample_call(method, direction, context, initial)
    }
}

static GLOBAL: OnceCell<Tracer> = OnceCell::new();

/// Returns the process-wide tracer. If the tracer was not initialized with [`init_global()`],
/// it is initialized with the default configuration on the first call.
pub fn global() -> &'static Tracer {
    GLOBAL.get_or_init(Tracer::default)
}

/// Initializes the process-wide tracer with the specified configuration.
///
/// # Errors
///
/// Returns an error if the process-wide tracer is already initialized, either by a previous
/// call to this function or by [`global()`].
pub fn init_global(config: TracerConfig) -> Result<&'static Tracer, AlreadyInitialized> {
    let mut is_initialized = false;
    let tracer = GLOBAL.get_or_init(|| {
        is_initialized = true;
        Tracer::new(config)
    });
    if is_initialized {
        tracing::debug!(config = ?tracer.registry().config(), "initialized global tracer");
        Ok(tracer)
    } else {
        Err(AlreadyInitialized(()))
    }
}

/// Error returned by [`init_global()`] if the process-wide tracer is already initialized.
#[derive(Debug)]
pub struct AlreadyInitialized(());

impl fmt::Display for AlreadyInitialized {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("global tracer is already initialized")
    }
}

impl error::Error for AlreadyInitialized {}

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
