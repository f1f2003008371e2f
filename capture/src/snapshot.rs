//! Point-in-time copies of captured calls.

use serde::Serialize;

use std::{
    net::SocketAddr,
    time::{Duration, SystemTime},
};

use crate::{
    payload::CapturedPayload,
    record::{CallRecord, CapturedMessage},
    registry::Registry,
    types::{Direction, Metadata, Status},
};

/// Snapshot of all calls retained in a [`Registry`].
///
/// Snapshots are detached from the registry; they can be inspected or serialized
/// without holding the registry lock.
///
/// # Examples
///
/// ```
/// # use rpcz_capture::{CallContext, Direction, MessageEntry, SharedRegistry, Status};
/// let registry = SharedRegistry::default();
/// let context = CallContext::new();
/// for i in 0..3 {
///     let call = registry.begin_call("/test.Counter/Get", Direction::Outbound, &context, None);
///     call.complete(Status::ok(), None, Some(&i.to_string()));
/// }
///
/// let snapshot = registry.snapshot();
/// let method = snapshot.method("sent: /test.Counter/Get").unwrap();
/// assert_eq!(method.id(), "mth0");
/// // Calls are ordered from the newest to the oldest.
/// let replies: Vec<_> = method
///     .calls()
///     .iter()
///     .map(|call| call.captured_messages().next().unwrap().1.to_string())
///     .collect();
/// assert_eq!(replies, ["2", "1", "0"]);
/// ```
#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub struct Snapshot {
    methods: Vec<MethodSnapshot>,
}

impl Snapshot {
    pub(crate) fn new(registry: &Registry) -> Self {
        let mut methods: Vec<_> = registry
            .rings()
            .map(|(key, ring)| MethodSnapshot {
                name: key.to_owned(),
                id: String::new(),
                method: ring.method().to_owned(),
                direction: ring.direction(),
                calls: registry.ring_calls(ring).map(CallSnapshot::new).collect(),
            })
            .collect();
        methods.sort_unstable_by(|x, y| x.name.cmp(&y.name));
        for (idx, method) in methods.iter_mut().enumerate() {
            method.id = format!("mth{idx}");
        }
        Self { methods }
    }

    /// Returns snapshots of all methods, ordered by their [key](MethodSnapshot::name()).
    pub fn methods(&self) -> &[MethodSnapshot] {
        &self.methods
    }

    /// Returns the snapshot for the specified method key (e.g., `recv: /pkg.Service/Method`).
    pub fn method(&self, key: &str) -> Option<&MethodSnapshot> {
        let idx = self
            .methods
            .binary_search_by(|method| method.name.as_str().cmp(key))
            .ok()?;
        Some(&self.methods[idx])
    }

    /// Iterates over calls for all methods.
    pub fn calls(&self) -> impl Iterator<Item = &CallSnapshot> + '_ {
        self.methods.iter().flat_map(|method| &method.calls)
    }
}

/// Snapshot of retained calls for a single method and direction.
#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub struct MethodSnapshot {
    name: String,
    id: String,
    method: String,
    direction: Direction,
    calls: Vec<CallSnapshot>,
}

impl MethodSnapshot {
    /// Returns the method key qualified with the call direction, such as `recv: /pkg.Service/Method`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns an anchor ID of this method (`mth0`, `mth1`, ...) unique within the snapshot.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the unqualified method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the direction of calls for this method.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns calls ordered from the newest to the oldest.
    pub fn calls(&self) -> &[CallSnapshot] {
        &self.calls
    }
}

/// Entry in the message list of a [`CallSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum MessageEntry {
    /// Retained message.
    Message {
        /// Message direction.
        direction: Direction,
        /// Time elapsed from the call start.
        offset: Duration,
        /// Time elapsed from the previous retained message, or from the call start
        /// for the first message.
        since_previous: Duration,
        /// Captured message payload.
        payload: CapturedPayload,
    },
    /// Marker for messages that were not retained.
    Omitted {
        /// Number of omitted messages.
        count: usize,
    },
}

impl MessageEntry {
    fn new(message: &CapturedMessage, previous_offset: &mut Duration) -> Self {
        let offset = message.offset();
        let since_previous = offset.saturating_sub(*previous_offset);
        *previous_offset = offset;
        Self::Message {
            direction: message.direction(),
            offset,
            since_previous,
            payload: message.payload().clone(),
        }
    }
}

/// Snapshot of a single call.
#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub struct CallSnapshot {
    direction: Direction,
    started_at: SystemTime,
    deadline: Option<Duration>,
    duration: Option<Duration>,
    status: Option<Status>,
    peer: Option<SocketAddr>,
    metadata: Metadata,
    messages: Vec<MessageEntry>,
    total_messages: usize,
    dropped_messages: usize,
}

impl CallSnapshot {
    fn new(record: &CallRecord) -> Self {
        let buffer = record.messages();
        let mut previous_offset = Duration::ZERO;
        let mut messages: Vec<_> = buffer
            .first()
            .iter()
            .map(|message| MessageEntry::new(message, &mut previous_offset))
            .collect();
        if buffer.dropped() > 0 {
            messages.push(MessageEntry::Omitted {
                count: buffer.dropped(),
            });
        }
        let last = buffer.last();
        messages.extend(
            last.iter()
                .map(|message| MessageEntry::new(message, &mut previous_offset)),
        );

        Self {
            direction: record.direction(),
            started_at: record.started_at(),
            deadline: record.deadline(),
            duration: record.duration(),
            status: record.status().cloned(),
            peer: record.peer(),
            metadata: record.metadata().clone(),
            messages,
            total_messages: buffer.total(),
            dropped_messages: buffer.dropped(),
        }
    }

    /// Returns the call direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the wall-clock time when the call started.
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Returns the wall-clock time when the call finished, or `None` if the call is in progress.
    pub fn finished_at(&self) -> Option<SystemTime> {
        self.duration
            .and_then(|duration| self.started_at.checked_add(duration))
    }

    /// Returns the call deadline relative to its start.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Returns the call duration, or `None` if the call is in progress.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Returns the call status, or `None` if the call is in progress.
    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    /// Checks whether the call is completed.
    pub fn is_completed(&self) -> bool {
        self.status.is_some()
    }

    /// Returns the address of the remote party, if known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Returns call metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns retained messages in their chronological order, with an [`Omitted`] marker
    /// in place of messages that were not retained.
    ///
    /// [`Omitted`]: MessageEntry::Omitted
    pub fn messages(&self) -> &[MessageEntry] {
        &self.messages
    }

    /// Iterates over retained messages, skipping the [`Omitted`](MessageEntry::Omitted) marker.
    pub fn captured_messages(&self) -> impl Iterator<Item = (Direction, &CapturedPayload)> + '_ {
        self.messages.iter().filter_map(|entry| match entry {
            MessageEntry::Message {
                direction, payload, ..
            } => Some((*direction, payload)),
            MessageEntry::Omitted { .. } => None,
        })
    }

    /// Returns the total number of messages in the call, including the ones that were
    /// not retained.
    pub fn total_messages(&self) -> usize {
        self.total_messages
    }

    /// Returns the number of messages that were not retained.
    pub fn dropped_messages(&self) -> usize {
        self.dropped_messages
    }
}
