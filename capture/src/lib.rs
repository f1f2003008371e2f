//! Bounded in-memory capture of recent RPC calls, grouped by method.
//!
//! This crate is the capture engine of an in-process "recent RPCs" debug page. For each method
//! and call direction, it retains a fixed number of the most recent calls
//! together with their timing, status, peer, metadata and a bounded set of messages
//! (the first and the last few messages of each call). Memory use is bounded
//! regardless of the call rate or the number of messages in a call.
//!
//! The core type is [`SharedRegistry`]: it samples calls according to the configured
//! [`SamplingPolicy`], hands out [`CallHandle`]s for the sampled calls and provides
//! point-in-time [`Snapshot`]s of the retained calls. Glue for specific RPC frameworks
//! (interceptors and stream wrappers) lives in a separate crate, `rpcz-interceptor`.
//!
//! # Examples
//!
//! ```
//! use rpcz_capture::{
//!     CallContext, Code, Direction, MessageEntry, SharedRegistry, Status, TracerConfig,
//! };
//!
//! let config = TracerConfig::default().with_message_retention(2, 2);
//! let registry = SharedRegistry::new(config);
//!
//! // Capture a streaming call with 10 received messages.
//! let context = CallContext::new().with_metadata([("user-agent", "test")].into_iter().collect());
//! let call = registry.begin_call("/test.Feed/Subscribe", Direction::Outbound, &context, None);
//! for i in 0..10 {
//!     call.record_message(&format!("event #{i}"), Direction::Inbound);
//! }
//! call.complete(Status::new(Code::Cancelled, "client went away"), None, None);
//!
//! // Inspect the captured call.
//! let snapshot = registry.snapshot();
//! let method = snapshot.method("sent: /test.Feed/Subscribe").unwrap();
//! let call = &method.calls()[0];
//! assert_eq!(call.status().unwrap().code(), Code::Cancelled);
//! assert_eq!(call.metadata().get("user-agent"), Some("test"));
//! assert_eq!(call.total_messages(), 10);
//! assert_eq!(call.dropped_messages(), 6);
//! assert_eq!(call.messages()[2], MessageEntry::Omitted { count: 6 });
//!
//! let payloads: Vec<_> = call
//!     .captured_messages()
//!     .map(|(_, payload)| payload.to_string())
//!     .collect();
//! assert_eq!(payloads, ["event #0", "event #1", "event #8", "event #9"]);
//! ```

// Documentation settings.
#![doc(html_root_url = "https://docs.rs/rpcz-capture/0.1.0")]
// Linter settings.
#![warn(missing_debug_implementations, missing_docs, bare_trait_objects)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

use std::fmt;

mod buffer;
mod config;
mod payload;
pub mod predicates;
mod record;
mod registry;
mod sampling;
mod snapshot;
mod types;

pub use crate::{
    buffer::MessageBuffer,
    config::{ConfigError, TracerConfig},
    payload::{CapturedPayload, Json, Opaque, Payload, PayloadVisitor, Text},
    record::{CallRecord, CapturedMessage, Completion},
    registry::{CallHandle, Registry, SharedRegistry},
    sampling::SamplingPolicy,
    snapshot::{CallSnapshot, MessageEntry, MethodSnapshot, Snapshot},
    types::{CallContext, Code, Direction, Metadata, Status, ToStatus},
};

mod sealed {
    pub trait Sealed {}
}

/// Marker trait for captured objects that can be queried with [`predicates`].
/// This trait is sealed.
pub trait Captured: fmt::Debug + sealed::Sealed {}

impl sealed::Sealed for CallSnapshot {}
impl Captured for CallSnapshot {}
impl sealed::Sealed for MethodSnapshot {}
impl Captured for MethodSnapshot {}

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
