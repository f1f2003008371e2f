//! Integration tests for RPC call capture.

use assert_matches::assert_matches;
use predicates::ord::eq;
use tracing::Level;

use std::{
    net::SocketAddr,
    thread,
    time::{Duration, Instant},
};


use rpcz_capture::{
    predicates::{method, status, ScannerExt},
    CallContext, Code, Direction, Json, MessageEntry, Metadata, SharedRegistry,
    Status, TracerConfig,
};

fn enable_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(Level::TRACE)
        .with_test_writer()
        .try_init()
        .ok();
}

#[test]
fn ring_retains_newest_calls() {
    enable_tracing();
    let registry = SharedRegistry::new(TracerConfig::default().with_calls_per_method(3));
    let context = CallContext::new();
    for i in 0..5 {
        let call = registry.begin_call("/test.Echo/Say", Direction::Inbound, &context, Some(&i));
        call.complete(Status::ok(), None, None);
    }

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.methods().len(), 1);
    let calls = snapshot.methods()[0].calls();
    let requests: Vec<_> = calls
        .iter()
        .map(|call| call.captured_messages().next().unwrap().1.to_string())
        .collect();
    assert_eq!(requests, ["4", "3", "2"]);
}

#[test]
fn partially_filled_ring() {
    let registry = SharedRegistry::default();
    let context = CallContext::new();
    registry.begin_call("/test.Echo/Say", Direction::Outbound, &context, Some(&"first"));
    registry.begin_call("/test.Echo/Say", Direction::Outbound, &context, Some(&"second"));

    let registry = registry.lock();
    let records: Vec<_> = registry.calls("sent: /test.Echo/Say").unwrap().collect();
    assert_eq!(records.len(), 2);
    let first_payload = records[0].messages().first()[0].payload();
    assert_eq!(first_payload.as_str(), Some("second"));
    assert!(records.iter().all(|record| !record.is_completed()));
    assert!(registry.calls("recv: /test.Echo/Say").is_none());
}

#[test]
fn directions_are_tracked_separately() {
    let registry = SharedRegistry::new(TracerConfig::default().with_calls_per_method(1));
    let context = CallContext::new();
    registry.begin_call("/test.Echo/Say", Direction::Inbound, &context, None);
    registry.begin_call("/test.Echo/Say", Direction::Outbound, &context, None);
    registry.begin_call("/test.Echo/Shout", Direction::Inbound, &context, None);

    let snapshot = registry.snapshot();
    let names: Vec<_> = snapshot.methods().iter().map(|method| method.name()).collect();
    assert_eq!(
        names,
        ["recv: /test.Echo/Say", "recv: /test.Echo/Shout", "sent: /test.Echo/Say"]
    );
    let ids: Vec<_> = snapshot.methods().iter().map(|method| method.id()).collect();
    assert_eq!(ids, ["mth0", "mth1", "mth2"]);
    assert_eq!(snapshot.calls().count(), 3);
    assert_eq!(registry.lock().method_keys(), names);
}

#[test]
fn evicted_call_does_not_affect_newer_call() {
    enable_tracing();
    let registry = SharedRegistry::new(TracerConfig::default().with_calls_per_method(1));
    let context = CallContext::new();
    let old_call = registry.begin_call("/test.Slow/Wait", Direction::Inbound, &context, None);
    assert!(old_call.is_retained());
    let new_call = registry.begin_call("/test.Slow/Wait", Direction::Inbound, &context, None);
    assert!(!old_call.is_retained());
    assert!(new_call.is_retained());

    let peer: SocketAddr = "10.1.2.3:4567".parse().unwrap();
    old_call.record_message("late message", Direction::Outbound);
    old_call.set_peer(peer);
    old_call.complete(Status::new(Code::DeadlineExceeded, "too slow"), None, None);

    {
        let registry = registry.lock();
        assert!(registry.record(&old_call).is_none());
        let record = registry.record(&new_call).unwrap();
        assert!(!record.is_completed());
        assert!(record.messages().is_empty());
        assert_eq!(record.peer(), None);
    }

    new_call.complete(Status::ok(), None, None);
    let snapshot = registry.snapshot();
    let call = snapshot.calls().scanner().single(&status(Code::Ok));
    assert_eq!(call.total_messages(), 0);
}

#[test]
fn unsampled_calls_are_not_captured() {
    let registry = SharedRegistry::new(TracerConfig::default().with_sampling_rate(0.0));
    let context = CallContext::new();
    for _ in 0..10 {
        let call = registry.sample_call("/test.Echo/Say", Direction::Inbound, &context, None);
        assert!(call.is_none());
    }
    assert!(registry.snapshot().methods().is_empty());
}

#[test]
fn metadata_recording_can_be_switched_off() {
    let metadata: Metadata = [("authorization", "Bearer secret"), ("x-trace", "1")]
        .into_iter()
        .collect();
    let context = CallContext::new().with_metadata(metadata);

    let registry = SharedRegistry::default();
    registry.begin_call("/test.Auth/Check", Direction::Inbound, &context, None);
    let snapshot = registry.snapshot();
    let call = snapshot.calls().next().unwrap();
    assert_eq!(call.metadata().get("Authorization"), Some("Bearer secret"));

    let registry = SharedRegistry::new(TracerConfig::default().with_metadata(false));
    registry.begin_call("/test.Auth/Check", Direction::Inbound, &context, None);
    registry.begin_call("/test.Auth/Check", Direction::Outbound, &context, None);
    let snapshot = registry.snapshot();
    assert!(snapshot.calls().all(|call| call.metadata().is_empty()));
}

#[test]
fn deadline_is_captured_relative_to_call_start() {
    let registry = SharedRegistry::default();
    let context = CallContext::new().with_timeout(Duration::from_millis(500));
    let call = registry.begin_call("/test.Echo/Say", Direction::Outbound, &context, None);
    thread::sleep(Duration::from_millis(2));
    call.complete(Status::ok(), None, None);

    let snapshot = registry.snapshot();
    let call = snapshot.calls().next().unwrap();
    let deadline = call.deadline().unwrap();
    assert!(deadline <= Duration::from_millis(500), "{deadline:?}");
    assert!(deadline > Duration::from_millis(400), "{deadline:?}");
    assert!(call.duration().unwrap() >= Duration::from_millis(2));
    assert!(call.finished_at().unwrap() > call.started_at());

    // Deadlines in the past are clamped.
    let context = CallContext::new().with_deadline(Instant::now());
    thread::sleep(Duration::from_millis(1));
    registry.begin_call("/test.Echo/Say", Direction::Outbound, &context, None);
    let snapshot = registry.snapshot();
    let newest_call = &snapshot.methods()[0].calls()[0];
    assert_eq!(newest_call.deadline(), Some(Duration::ZERO));
}

#[test]
fn messages_in_snapshot() {
    let config = TracerConfig::default().with_message_retention(2, 3);
    let registry = SharedRegistry::new(config);
    let context = CallContext::new();
    let call = registry.begin_call(
        "/test.Feed/Watch",
        Direction::Outbound,
        &context,
        Some(&"watch"),
    );
    for i in 0..10 {
        thread::sleep(Duration::from_millis(1));
        call.record_message(&i, Direction::Inbound);
    }
    call.complete(Status::ok(), None, None);

    let snapshot = registry.snapshot();
    let call = snapshot.calls().next().unwrap();
    assert_eq!(call.total_messages(), 11);
    assert_eq!(call.dropped_messages(), 6);
    let messages = call.messages();
    assert_eq!(messages.len(), 6);
    assert_matches!(
        &messages[0],
        MessageEntry::Message { direction: Direction::Outbound, payload, .. }
            if payload.as_str() == Some("watch")
    );
    assert_matches!(messages[2], MessageEntry::Omitted { count: 6 });

    let payloads: Vec<_> = call
        .captured_messages()
        .map(|(_, payload)| payload.to_string())
        .collect();
    assert_eq!(payloads, ["watch", "0", "7", "8", "9"]);

    let mut previous_offset = Duration::ZERO;
    for entry in messages {
        if let MessageEntry::Message {
            offset,
            since_previous,
            ..
        } = entry
        {
            assert!(*offset >= previous_offset);
            assert_eq!(*since_previous, *offset - previous_offset);
            previous_offset = *offset;
        }
    }
}

#[test]
fn huge_calls_stop_retaining_payloads() {
    enable_tracing();
    let config = TracerConfig::default().with_huge_message_cutoff(Some(20));
    let registry = SharedRegistry::new(config);
    let context = CallContext::new();
    let call = registry.begin_call("/test.Feed/Flood", Direction::Inbound, &context, None);
    for i in 0..1_000 {
        call.record_message(&format!("#{i}"), Direction::Outbound);
    }

    {
        let registry = registry.lock();
        let record = registry.record(&call).unwrap();
        assert!(record.messages().is_huge());
        assert_eq!(record.messages().total(), 1_000);
    }

    let snapshot = registry.snapshot();
    let call = snapshot.calls().next().unwrap();
    assert_eq!(call.dropped_messages(), 995);
    let payloads: Vec<_> = call
        .captured_messages()
        .map(|(_, payload)| payload.to_string())
        .collect();
    assert_eq!(payloads, ["#0", "#1", "#2", "#3", "#4"]);
}

#[test]
fn snapshot_serialization() {
    let registry = SharedRegistry::default();
    let peer: SocketAddr = "127.0.0.1:50051".parse().unwrap();
    let context = CallContext::new()
        .with_peer(peer)
        .with_metadata([("x-user", "alice")].into_iter().collect());
    let request = Json(serde_json::json!({ "key": "answer" }));
    let call = registry.begin_call(
        "/kv.Store/Get",
        Direction::Inbound,
        &context,
        Some(&request),
    );
    call.complete(Status::new(Code::NotFound, "no such key"), None, None);

    let snapshot = registry.snapshot();
    let json = serde_json::to_value(&snapshot).unwrap();
    let method = &json["methods"][0];
    assert_eq!(method["name"], "recv: /kv.Store/Get");
    assert_eq!(method["id"], "mth0");
    assert_eq!(method["method"], "/kv.Store/Get");
    assert_eq!(method["direction"], "inbound");

    let call = &method["calls"][0];
    assert_eq!(call["peer"], "127.0.0.1:50051");
    assert_eq!(call["status"]["code"], "not_found");
    assert_eq!(call["status"]["message"], "no such key");
    assert_eq!(call["metadata"]["x-user"][0], "alice");
    assert_eq!(call["dropped_messages"], 0);
    assert!(call["deadline"].is_null());

    let message = &call["messages"][0];
    assert_eq!(message["kind"], "message");
    assert_eq!(message["direction"], "inbound");
    let payload = &message["payload"]["bytes"];
    let data: Vec<u8> = serde_json::from_value(payload["data"].clone()).unwrap();
    assert_eq!(data, br#"{"key":"answer"}"#);
    assert_eq!(payload["descriptor"], "serde_json::value::Value");
}

#[test]
fn querying_snapshot_with_predicates() {
    let registry = SharedRegistry::default();
    let context = CallContext::new();
    for code in [Code::Ok, Code::Unavailable, Code::Ok] {
        let call = registry.begin_call("/kv.Store/Put", Direction::Outbound, &context, None);
        call.complete(Status::new(code, ""), None, None);
    }
    registry.begin_call("/kv.Store/Get", Direction::Outbound, &context, None);

    let snapshot = registry.snapshot();
    let put = snapshot.methods().scanner().single(&method(eq("/kv.Store/Put")));
    assert_eq!(put.calls().scanner().count(&status(Code::Ok)), 2);
    let failed = put.calls().scanner().single(&status(Code::Unavailable));
    assert_eq!(failed.status().unwrap().to_string(), "Unavailable");
}
