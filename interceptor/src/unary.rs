//! Adapters for unary calls.

use std::net::SocketAddr;

use crate::Tracer;
use rpcz_capture::{CallContext, CallHandle, Direction, Payload, Status, ToStatus};

/// Unary call in progress, returned by [`Tracer::begin_unary()`].
///
/// The call must be completed with [`Self::finish()`]; a dropped `UnaryCall` leaves the call
/// in progress in the registry until it is evicted.
#[derive(Debug)]
#[must_use = "Call should be finished with the call outcome"]
pub struct UnaryCall {
    call: CallHandle,
}

impl UnaryCall {
    /// Returns the handle of the captured call.
    pub fn handle(&self) -> &CallHandle {
        &self.call
    }

    /// Completes the call with the specified outcome. On success, the response is recorded
    /// as the reply message. `peer`, if provided, overwrites the remote party address.
    pub fn finish<Resp, E>(self, result: &Result<Resp, E>, peer: Option<SocketAddr>)
    where
        Resp: Payload,
        E: ToStatus,
    {
        match result {
            Ok(response) => self.call.complete(Status::ok(), peer, Some(response)),
            Err(err) => self.call.complete(err.to_status(), peer, None),
        }
    }
}

impl Tracer {
    /// Starts capturing a unary call. Returns `None` if the call is not sampled.
    ///
    /// This is a lower-level alternative to [`Self::unary_client()`] and [`Self::unary_server()`]
    /// for call sites that cannot hand over the call as a closure (e.g., async ones).
    pub fn begin_unary<Req: Payload>(
        &self,
        method: &str,
        direction: Direction,
        context: &CallContext,
        request: &Req,
    ) -> Option<UnaryCall> {
        let call = self.sample(method, direction, context, Some(request))?;
        Some(UnaryCall { call })
    }

    /// Captures an outbound unary call.
    ///
    /// `invoker` performs the call; it may set the address of the server it has connected to
    /// via its second argument. The invoker result is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `invoker`.
    pub fn unary_client<Req, Resp, E, F>(
        &self,
        method: &str,
        context: &CallContext,
        request: &Req,
        invoker: F,
    ) -> Result<Resp, E>
    where
        Req: Payload,
        Resp: Payload,
        E: ToStatus,
        F: FnOnce(&Req, &mut Option<SocketAddr>) -> Result<Resp, E>,
    {
        let call = self.begin_unary(method, Direction::Outbound, context, request);
        let mut peer = None;
        let result = invoker(request, &mut peer);
        if let Some(call) = call {
            call.finish(&result, peer);
        }
        result
    }

    /// Captures an inbound unary call. The caller address is taken from `context`.
    /// The handler result is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `handler`.
    pub fn unary_server<Req, Resp, E, F>(
        &self,
        method: &str,
        context: &CallContext,
        request: &Req,
        handler: F,
    ) -> Result<Resp, E>
    where
        Req: Payload,
        Resp: Payload,
        E: ToStatus,
        F: FnOnce(&Req) -> Result<Resp, E>,
    {
        let call = self.begin_unary(method, Direction::Inbound, context, request);
        let result = handler(request);
        if let Some(call) = call {
            call.finish(&result, None);
        }
        result
    }
}
