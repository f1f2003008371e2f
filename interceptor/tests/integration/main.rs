//! Integration tests for call adapters.

use assert_matches::assert_matches;
use predicates::ord::eq;
use tracing::Level;

use std::{io, net::SocketAddr, thread, time::Duration};


use crate::mock::MockStream;
use rpcz_capture::{
    predicates::{method, ScannerExt},
    CallSnapshot, MessageEntry,
};
use rpcz_interceptor::{
    CallContext, ClientStream, Code, Direction, ServerStream, Status, Tracer, TracerConfig,
};

const PEER: &str = "10.0.0.5:8443";

fn enable_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

fn peer() -> SocketAddr {
    PEER.parse().unwrap()
}

fn messages(call: &CallSnapshot) -> Vec<(Direction, String)> {
    call.captured_messages()
        .map(|(direction, payload)| (direction, payload.to_string()))
        .collect()
}

fn single_call(tracer: &Tracer, key: &str) -> CallSnapshot {
    let snapshot = tracer.snapshot();
    let method = snapshot.method(key).unwrap_or_else(|| panic!("no method {key}"));
    assert_eq!(method.calls().len(), 1);
    method.calls()[0].clone()
}

type ClientMock = MockStream<String, String>;

#[test]
fn client_stream_with_interleaved_messages() {
    enable_tracing();
    let tracer = Tracer::default();
    let context = CallContext::new();
    let incoming = [Ok("pong #0".to_owned()), Ok("pong #1".to_owned())];
    let mut stream = tracer
        .stream_client("/test.Ping/Stream", &context, |context| {
            let context = context.clone().with_peer(peer());
            Ok::<_, io::Error>(ClientMock::new(context, incoming))
        })
        .unwrap();
    assert!(stream.call().is_some());

    stream.send(&"ping #0".to_owned()).unwrap();
    assert_eq!(stream.recv().unwrap().unwrap(), "pong #0");
    stream.send(&"ping #1".to_owned()).unwrap();
    assert_eq!(stream.recv().unwrap().unwrap(), "pong #1");
    stream.send(&"ping #2".to_owned()).unwrap();
    stream.close_send().unwrap();
    assert!(stream.recv().unwrap().is_none());
    assert_eq!(stream.get_ref().sent.len(), 3);

    let call = single_call(&tracer, "sent: /test.Ping/Stream");
    assert_eq!(call.direction(), Direction::Outbound);
    assert!(call.status().unwrap().is_ok());
    assert!(call.duration().unwrap() > Duration::ZERO);
    assert_eq!(call.peer(), Some(peer()));
    assert_eq!(call.total_messages(), 5);
    assert_eq!(
        messages(&call),
        [
            (Direction::Outbound, "ping #0".to_owned()),
            (Direction::Inbound, "pong #0".to_owned()),
            (Direction::Outbound, "ping #1".to_owned()),
            (Direction::Inbound, "pong #1".to_owned()),
            (Direction::Outbound, "ping #2".to_owned()),
        ]
    );
}

#[test]
fn client_stream_send_failure() {
    enable_tracing();
    let tracer = Tracer::default();
    let context = CallContext::new();
    let mut stream = tracer
        .stream_client("/test.Upload/Put", &context, |context| {
            Ok::<_, io::Error>(ClientMock::new(context.clone(), []).fail_sends_after(1))
        })
        .unwrap();

    stream.send(&"chunk #0".to_owned()).unwrap();
    let err = stream.send(&"chunk #1".to_owned()).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

    let call = single_call(&tracer, "sent: /test.Upload/Put");
    let status = call.status().unwrap();
    assert_eq!(status.code(), Code::Unavailable);
    assert_eq!(status.message(), "connection lost");
    assert_eq!(call.peer(), None);
    assert_eq!(
        messages(&call),
        [
            (Direction::Outbound, "chunk #0".to_owned()),
            (Direction::Outbound, "chunk #1".to_owned()),
        ]
    );
}

#[test]
fn client_stream_receive_failure() {
    let tracer = Tracer::default();
    let context = CallContext::new();
    let incoming = [
        Ok("event".to_owned()),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")),
    ];
    let mut stream = tracer
        .stream_client("/test.Feed/Watch", &context, |context| {
            Ok::<_, io::Error>(ClientMock::new(context.clone(), incoming))
        })
        .unwrap();

    assert!(stream.recv().unwrap().is_some());
    let err = stream.recv().unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    // Subsequent end of stream does not override the failure.
    assert!(stream.recv().unwrap().is_none());

    let call = single_call(&tracer, "sent: /test.Feed/Watch");
    assert_eq!(call.status().unwrap().code(), Code::Unavailable);
    assert_eq!(messages(&call), [(Direction::Inbound, "event".to_owned())]);
}

#[test]
fn close_send_failure_completes_call() {
    let tracer = Tracer::default();
    let context = CallContext::new();
    let mut stream = tracer
        .stream_client("/test.Upload/Put", &context, |context| {
            Ok::<_, io::Error>(ClientMock::new(context.clone(), []))
        })
        .unwrap();
    stream.close_send().unwrap();
    let err = stream.close_send().unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

    let call = single_call(&tracer, "sent: /test.Upload/Put");
    assert_eq!(call.status().unwrap().code(), Code::InvalidArgument);
    assert_eq!(call.total_messages(), 0);
}

#[test]
fn stream_opener_failure() {
    enable_tracing();
    let tracer = Tracer::default();
    let context = CallContext::new().with_peer(peer());
    let result = tracer.stream_client("/test.Feed/Watch", &context, |_| {
        Err::<ClientMock, _>(Status::new(Code::Unavailable, "no route to host"))
    });
    let err = result.unwrap_err();
    assert_eq!(err.message(), "no route to host");

    let call = single_call(&tracer, "sent: /test.Feed/Watch");
    assert_eq!(call.status(), Some(&err));
    assert_eq!(call.total_messages(), 0);
    // Peer from the context is retained since the opener provides no other address.
    assert_eq!(call.peer(), Some(peer()));
}

type ServerMock = MockStream<u32, u32>;

#[test]
fn server_stream_handler() {
    let tracer = Tracer::default();
    let context = CallContext::new()
        .with_peer(peer())
        .with_metadata([("x-request-id", "42")].into_iter().collect());
    let stream = ServerMock::new(context, [Ok(1), Ok(2), Ok(3)]);

    let sum = tracer
        .stream_server("/test.Math/Sum", stream, |stream| {
            let mut sum = 0;
            while let Some(value) = stream.recv()? {
                sum += value;
                stream.send(&sum)?;
            }
            // End of the client stream does not complete the call.
            let call = stream.call().unwrap();
            let registry = tracer.registry().lock();
            assert!(!registry.record(call).unwrap().is_completed());
            Ok::<_, io::Error>(sum)
        })
        .unwrap();
    assert_eq!(sum, 6);

    let call = single_call(&tracer, "recv: /test.Math/Sum");
    assert_eq!(call.direction(), Direction::Inbound);
    assert!(call.status().unwrap().is_ok());
    assert_eq!(call.peer(), Some(peer()));
    assert_eq!(call.metadata().get("x-request-id"), Some("42"));
    let expected_messages = [
        (Direction::Inbound, "1"),
        (Direction::Outbound, "1"),
        (Direction::Inbound, "2"),
        (Direction::Outbound, "3"),
        (Direction::Inbound, "3"),
        (Direction::Outbound, "6"),
    ];
    let expected_messages: Vec<_> = expected_messages
        .into_iter()
        .map(|(direction, payload)| (direction, payload.to_owned()))
        .collect();
    assert_eq!(messages(&call), expected_messages);
}

#[test]
fn server_stream_send_failure() {
    enable_tracing();
    let tracer = Tracer::default();
    let stream = ServerMock::new(CallContext::new(), []).fail_sends_after(2);

    let err = tracer
        .stream_server("/test.Counter/Count", stream, |stream| {
            for i in 0..5 {
                stream.send(&i)?;
            }
            Ok::<_, io::Error>(())
        })
        .unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

    let call = single_call(&tracer, "recv: /test.Counter/Count");
    let status = call.status().unwrap();
    assert_eq!(status.code(), Code::Unavailable);
    assert_eq!(status.message(), "connection lost");
    // The failed message is recorded as well.
    let payloads: Vec<_> = messages(&call)
        .into_iter()
        .map(|(direction, payload)| {
            assert_eq!(direction, Direction::Outbound);
            payload
        })
        .collect();
    assert_eq!(payloads, ["0", "1", "2"]);
}

#[test]
fn server_stream_handler_error() {
    let tracer = Tracer::default();
    let stream = ServerMock::new(CallContext::new(), [Ok(1)]);
    let err = tracer
        .stream_server("/test.Math/Sum", stream, |stream| {
            stream.recv()?;
            Err::<(), _>(io::Error::new(io::ErrorKind::InvalidData, "overflow"))
        })
        .unwrap_err();
    assert_eq!(err.to_string(), "overflow");

    let call = single_call(&tracer, "recv: /test.Math/Sum");
    assert_eq!(call.status().unwrap().code(), Code::InvalidArgument);
    assert_eq!(messages(&call), [(Direction::Inbound, "1".to_owned())]);
}

#[test]
fn manually_finished_server_stream() {
    let tracer = Tracer::default();
    let stream = ServerMock::new(CallContext::new(), []);
    let mut stream = tracer.begin_server_stream("/test.Math/Sum", stream);
    assert!(stream.recv().unwrap().is_none());
    {
        let registry = tracer.registry().lock();
        let record = registry.record(stream.call().unwrap()).unwrap();
        assert!(!record.is_completed());
    }

    stream.finish(&Err::<(), _>(Status::new(Code::Aborted, "shutting down")));
    let mock = stream.into_inner();
    assert!(mock.sent.is_empty());
    let call = single_call(&tracer, "recv: /test.Math/Sum");
    assert_eq!(call.status().unwrap().to_string(), "Aborted: shutting down");
}

#[test]
fn unary_client_call() {
    enable_tracing();
    let tracer = Tracer::default();
    let context = CallContext::new().with_timeout(Duration::from_secs(1));
    let response = tracer.unary_client(
        "/test.Echo/Say",
        &context,
        &"hello".to_owned(),
        |request, peer_addr| {
            *peer_addr = Some(peer());
            thread::sleep(Duration::from_millis(1));
            Ok::<_, Status>(format!("{request}!"))
        },
    );
    assert_eq!(response.unwrap(), "hello!");

    let call = single_call(&tracer, "sent: /test.Echo/Say");
    assert!(call.status().unwrap().is_ok());
    assert_eq!(call.peer(), Some(peer()));
    assert!(call.deadline().unwrap() <= Duration::from_secs(1));
    assert!(call.duration().unwrap() >= Duration::from_millis(1));
    assert_eq!(
        messages(&call),
        [
            (Direction::Outbound, "hello".to_owned()),
            (Direction::Inbound, "hello!".to_owned()),
        ]
    );
}

#[test]
fn unary_server_call_error() {
    let tracer = Tracer::default();
    let context = CallContext::new().with_peer(peer());
    let result = tracer.unary_server("/test.Store/Get", &context, &"key".to_owned(), |_| {
        Err::<String, _>(Status::new(Code::NotFound, "no such key"))
    });
    assert_eq!(result.unwrap_err().code(), Code::NotFound);

    let call = single_call(&tracer, "recv: /test.Store/Get");
    assert_eq!(call.status().unwrap().message(), "no such key");
    assert_eq!(call.peer(), Some(peer()));
    assert!(call.deadline().is_none());
    assert_eq!(messages(&call), [(Direction::Inbound, "key".to_owned())]);
}

#[test]
fn unary_server_call_with_boxed_error() {
    type BoxedError = Box<dyn std::error::Error + Send + Sync>;

    let tracer = Tracer::default();
    let context = CallContext::new();
    let result = tracer.unary_server("/test.Store/Put", &context, &"key".to_owned(), |_| {
        let err = io::Error::new(io::ErrorKind::TimedOut, "storage is slow");
        Err::<String, BoxedError>(err.into())
    });
    assert_eq!(result.unwrap_err().to_string(), "storage is slow");

    let call = single_call(&tracer, "recv: /test.Store/Put");
    let status = call.status().unwrap();
    assert_eq!(status.code(), Code::DeadlineExceeded);
    assert_eq!(status.message(), "storage is slow");

    let result = tracer.unary_server("/test.Store/Delete", &context, &"key".to_owned(), |_| {
        Err::<String, BoxedError>("storage is gone".into())
    });
    assert!(result.is_err());
    let call = single_call(&tracer, "recv: /test.Store/Delete");
    assert_eq!(call.status().unwrap().code(), Code::Unknown);
    assert_eq!(call.status().unwrap().message(), "storage is gone");
}

#[test]
fn manually_finished_unary_call() {
    let tracer = Tracer::default();
    let context = CallContext::new();
    let call = tracer
        .begin_unary("/test.Store/Put", Direction::Outbound, &context, &7_u32)
        .unwrap();
    assert!(call.handle().is_retained());
    // Simulate work done elsewhere, e.g. in an async task.
    let result = thread::spawn(|| Ok::<_, Status>(true)).join().unwrap();
    call.finish(&result, Some(peer()));

    let snapshot = tracer.snapshot();
    let put = snapshot.methods().scanner().single(&method(eq("/test.Store/Put")));
    let call = &put.calls()[0];
    assert_eq!(call.peer(), Some(peer()));
    assert_eq!(
        messages(call),
        [
            (Direction::Outbound, "7".to_owned()),
            (Direction::Inbound, "true".to_owned()),
        ]
    );
    assert_matches!(
        &call.messages()[1],
        MessageEntry::Message { direction: Direction::Inbound, .. }
    );
}

#[test]
fn metadata_is_not_recorded_if_disabled() {
    let tracer = Tracer::new(TracerConfig::default().with_metadata(false));
    let context = CallContext::new()
        .with_metadata([("authorization", "secret")].into_iter().collect());
    tracer
        .unary_server("/test.Auth/Login", &context, &(), |_| Ok::<_, Status>(()))
        .unwrap();
    let stream = ServerMock::new(context, []);
    tracer
        .stream_server("/test.Auth/Watch", stream, |_| Ok::<_, io::Error>(()))
        .unwrap();

    let snapshot = tracer.snapshot();
    assert_eq!(snapshot.calls().count(), 2);
    assert!(snapshot.calls().all(|call| call.metadata().is_empty()));
}

#[test]
fn unsampled_calls_pass_through() {
    let tracer = Tracer::new(TracerConfig::default().with_sampling_rate(0.0));
    let context = CallContext::new();

    let response = tracer.unary_client("/test.Echo/Say", &context, &1_u32, |&request, _| {
        Ok::<_, Status>(request + 1)
    });
    assert_eq!(response.unwrap(), 2);
    assert!(tracer
        .begin_unary("/test.Echo/Say", Direction::Inbound, &context, &1_u32)
        .is_none());

    let incoming = [Ok("pong".to_owned())];
    let mut stream = tracer
        .stream_client("/test.Ping/Stream", &context, |context| {
            Ok::<_, io::Error>(ClientMock::new(context.clone(), incoming))
        })
        .unwrap();
    assert!(stream.call().is_none());
    stream.send(&"ping".to_owned()).unwrap();
    assert_eq!(stream.recv().unwrap().unwrap(), "pong");
    assert!(stream.recv().unwrap().is_none());
    let mock = stream.into_inner();
    assert_eq!(mock.sent, ["ping"]);

    let stream = ServerMock::new(context, [Ok(5)]);
    let value = tracer
        .stream_server("/test.Math/Sum", stream, |stream| {
            assert!(stream.call().is_none());
            let value = stream.recv()?.unwrap_or_default();
            stream.send(&value)?;
            Ok::<_, io::Error>(value)
        })
        .unwrap();
    assert_eq!(value, 5);

    assert!(tracer.snapshot().methods().is_empty());
}

#[test]
fn global_tracer() {
    let config = TracerConfig::default().with_calls_per_method(2);
    let tracer = rpcz_interceptor::init_global(config).unwrap();
    assert!(std::ptr::eq(tracer, rpcz_interceptor::global()));
    assert_eq!(tracer.registry().config().calls_per_method, 2);

    let err = rpcz_interceptor::init_global(TracerConfig::default()).unwrap_err();
    assert_eq!(err.to_string(), "global tracer is already initialized");

    let context = CallContext::new();
    for i in 0..3_u32 {
        let call = rpcz_interceptor::global()
            .begin_unary("/test.Global/Call", Direction::Inbound, &context, &i)
            .unwrap();
        call.finish(&Ok::<_, Status>(()), None);
    }
    let call_count = tracer.snapshot().calls().count();
    assert_eq!(call_count, 2);
}
