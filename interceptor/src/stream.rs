//! Stream traits and decorators capturing streaming calls.

use crate::Tracer;
use rpcz_capture::{CallContext, CallHandle, Direction, Payload, Status, ToStatus};

/// Client side of a streaming call provided by the host RPC framework.
pub trait ClientStream {
    /// Messages sent to the server.
    type Request;
    /// Messages received from the server.
    type Response;
    /// Stream error.
    type Error;

    /// Returns the context of the call. The peer address in the context should point
    /// to the server the stream is connected to.
    fn context(&self) -> &CallContext;

    /// Sends a message to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be sent; the call is considered failed.
    fn send(&mut self, message: &Self::Request) -> Result<(), Self::Error>;

    /// Receives the next message from the server. Returns `Ok(None)` if the server
    /// has successfully finished the call.
    ///
    /// # Errors
    ///
    /// Returns an error if the call has failed.
    fn recv(&mut self) -> Result<Option<Self::Response>, Self::Error>;

    /// Signals to the server that no more messages will be sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be delivered; the call is considered failed.
    fn close_send(&mut self) -> Result<(), Self::Error>;
}

/// Server side of a streaming call provided by the host RPC framework.
pub trait ServerStream {
    /// Messages received from the client.
    type Request;
    /// Messages sent to the client.
    type Response;
    /// Stream error.
    type Error;

    /// Returns the context of the call, with the incoming metadata and the client address.
    fn context(&self) -> &CallContext;

    /// Sends a message to the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be sent; the call is considered failed.
    fn send(&mut self, message: &Self::Response) -> Result<(), Self::Error>;

    /// Receives the next message from the client. Returns `Ok(None)` if the client
    /// has finished sending messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the call has failed.
    fn recv(&mut self) -> Result<Option<Self::Request>, Self::Error>;
}

/// Records a sent message. The message is recorded even if sending has failed,
/// in which case the call is completed with the error.
fn record_send<E: ToStatus>(
    call: Option<&CallHandle>,
    message: &impl Payload,
    result: &Result<(), E>,
) {
    if let Some(call) = call {
        call.record_message(message, Direction::Outbound);
        if let Err(err) = result {
            call.complete(err.to_status(), None, None);
        }
    }
}

fn complete_on_error<T, E: ToStatus>(call: Option<&CallHandle>, result: &Result<T, E>) {
    if let (Some(call), Err(err)) = (call, result) {
        call.complete(err.to_status(), None, None);
    }
}

/// [`ClientStream`] decorator capturing the call.
///
/// Returned by [`Tracer::stream_client()`]. If the call is not sampled, the decorator
/// forwards all operations to the wrapped stream without capturing anything.
#[derive(Debug)]
pub struct TracedClientStream<S> {
    inner: S,
    call: Option<CallHandle>,
}

impl<S> TracedClientStream<S> {
    /// Returns the handle of the captured call, or `None` if the call is not sampled.
    pub fn call(&self) -> Option<&CallHandle> {
        self.call.as_ref()
    }

    /// Returns a shared reference to the wrapped stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Returns an exclusive reference to the wrapped stream. Operations performed
    /// directly on the wrapped stream are not captured.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Unwraps the wrapped stream.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S> ClientStream for TracedClientStream<S>
where
    S: ClientStream,
    S::Request: Payload,
    S::Response: Payload,
    S::Error: ToStatus,
{
    type Request = S::Request;
    type Response = S::Response;
    type Error = S::Error;

    fn context(&self) -> &CallContext {
        self.inner.context()
    }

    fn send(&mut self, message: &Self::Request) -> Result<(), Self::Error> {
        let result = self.inner.send(message);
        record_send(self.call.as_ref(), message, &result);
        result
    }

    fn recv(&mut self) -> Result<Option<Self::Response>, Self::Error> {
        let result = self.inner.recv();
        if let Some(call) = &self.call {
            match &result {
                Ok(Some(message)) => call.record_message(message, Direction::Inbound),
                Ok(None) => call.complete(Status::ok(), None, None),
                Err(err) => call.complete(err.to_status(), None, None),
            }
        }
        result
    }

    fn close_send(&mut self) -> Result<(), Self::Error> {
        let result = self.inner.close_send();
        complete_on_error(self.call.as_ref(), &result);
        result
    }
}

/// [`ServerStream`] decorator capturing the call.
///
/// Created by [`Tracer::begin_server_stream()`] or passed to the handler
/// in [`Tracer::stream_server()`]. Unlike on the client side, the end of the client stream
/// does not complete the call; the call is completed with the outcome of the handler.
#[derive(Debug)]
pub struct TracedServerStream<S> {
    inner: S,
    call: Option<CallHandle>,
}

impl<S> TracedServerStream<S> {
    /// Returns the handle of the captured call, or `None` if the call is not sampled.
    pub fn call(&self) -> Option<&CallHandle> {
        self.call.as_ref()
    }

    /// Returns a shared reference to the wrapped stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Returns an exclusive reference to the wrapped stream. Operations performed
    /// directly on the wrapped stream are not captured.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Completes the call with the outcome of the handler. No reply message is recorded;
    /// all messages sent to the client are recorded by [`ServerStream::send()`].
    pub fn finish<T, E: ToStatus>(&self, result: &Result<T, E>) {
        if let Some(call) = &self.call {
            call.complete(Status::from_result(result), None, None);
        }
    }

    /// Unwraps the wrapped stream.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S> ServerStream for TracedServerStream<S>
where
    S: ServerStream,
    S::Request: Payload,
    S::Response: Payload,
    S::Error: ToStatus,
{
    type Request = S::Request;
    type Response = S::Response;
    type Error = S::Error;

    fn context(&self) -> &CallContext {
        self.inner.context()
    }

    fn send(&mut self, message: &Self::Response) -> Result<(), Self::Error> {
        let result = self.inner.send(message);
        record_send(self.call.as_ref(), message, &result);
        result
    }

    fn recv(&mut self) -> Result<Option<Self::Request>, Self::Error> {
        let result = self.inner.recv();
        if let (Some(call), Ok(Some(message))) = (&self.call, &result) {
            call.record_message(message, Direction::Inbound);
        }
        complete_on_error(self.call.as_ref(), &result);
        result
    }
}

impl Tracer {
    /// Captures an outbound streaming call.
    ///
    /// `opener` establishes the stream. If it fails, the call is completed with the error
    /// and the error is returned unchanged. Otherwise, the peer address is taken
    /// from the stream context, and the stream is wrapped into a capturing decorator.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `opener`.
    pub fn stream_client<S, E, F>(
        &self,
        method: &str,
        context: &CallContext,
        opener: F,
    ) -> Result<TracedClientStream<S>, E>
    where
        S: ClientStream,
        E: ToStatus,
        F: FnOnce(&CallContext) -> Result<S, E>,
    {
        let call = self.sample(method, Direction::Outbound, context, None);
        match opener(context) {
            Ok(stream) => {
                if let (Some(call), Some(peer)) = (&call, stream.context().peer()) {
                    call.set_peer(peer);
                }
                Ok(TracedClientStream {
                    inner: stream,
                    call,
                })
            }
            Err(err) => {
                if let Some(call) = call {
                    let status = err.to_status();
                    tracing::debug!(method, %status, "failed opening client stream");
                    call.complete(status, None, None);
                }
                Err(err)
            }
        }
    }

    /// Starts capturing an inbound streaming call. The call metadata and the client address
    /// are taken from the stream context.
    ///
    /// The returned decorator should be completed with [`TracedServerStream::finish()`];
    /// [`Self::stream_server()`] takes care of this automatically.
    pub fn begin_server_stream<S: ServerStream>(
        &self,
        method: &str,
        stream: S,
    ) -> TracedServerStream<S> {
        let call = self.sample(method, Direction::Inbound, stream.context(), None);
        TracedServerStream {
            inner: stream,
            call,
        }
    }

    /// Captures an inbound streaming call handled by `handler`. After the handler returns,
    /// the call is completed with its outcome, which is then returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `handler`.
    pub fn stream_server<S, T, E, F>(&self, method: &str, stream: S, handler: F) -> Result<T, E>
    where
        S: ServerStream,
        E: ToStatus,
        F: FnOnce(&mut TracedServerStream<S>) -> Result<T, E>,
    {
        let mut stream = self.begin_server_stream(method, stream);
        let result = handler(&mut stream);
        stream.finish(&result);
        result
    }
}
