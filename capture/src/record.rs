//! Captured state of a single call.

use serde::{Deserialize, Serialize};

use std::{
    net::SocketAddr,
    time::{Duration, Instant, SystemTime},
};

use crate::{
    buffer::MessageBuffer,
    payload::{CapturedPayload, Payload},
    types::{CallContext, Direction, Metadata, Status},
    TracerConfig,
};

/// Message captured during a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedMessage {
    direction: Direction,
    offset: Duration,
    payload: CapturedPayload,
}

impl CapturedMessage {
    /// Returns the direction of the message.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the time elapsed from the call start to the message.
    pub fn offset(&self) -> Duration {
        self.offset
    }

    /// Returns the captured payload.
    pub fn payload(&self) -> &CapturedPayload {
        &self.payload
    }
}

/// Completion information for a [`CallRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    duration: Duration,
    status: Status,
}

impl Completion {
    /// Returns the call duration measured with a monotonic clock.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns the normalized call status.
    pub fn status(&self) -> &Status {
        &self.status
    }
}

/// Reply recorded on call completion.
#[derive(Debug)]
pub(crate) enum Reply {
    /// Reply is retained by the record.
    Captured(CapturedPayload),
    /// Reply is only counted since the record would not retain it.
    CountOnly,
}

/// Information about a starting call, prepared before the registry lock is acquired.
#[derive(Debug)]
pub(crate) struct CallStart {
    direction: Direction,
    started_at: SystemTime,
    started: Instant,
    deadline: Option<Duration>,
    peer: Option<SocketAddr>,
    metadata: Option<Metadata>,
    initial: Option<CapturedPayload>,
}

impl CallStart {
    pub(crate) fn new(
        config: &TracerConfig,
        direction: Direction,
        context: &CallContext,
        initial: Option<&dyn Payload>,
    ) -> Self {
        let started = Instant::now();
        Self {
            direction,
            started_at: SystemTime::now(),
            started,
            deadline: context
                .deadline()
                .map(|deadline| deadline.saturating_duration_since(started)),
            peer: context.peer(),
            metadata: config
                .record_metadata
                .then(|| context.metadata().clone()),
            initial: initial.map(CapturedPayload::capture),
        }
    }

    pub(crate) fn direction(&self) -> Direction {
        self.direction
    }
}

/// Captured state of a single call: timing, outcome, peer, metadata and retained messages.
///
/// Records are owned by the registry and are exposed via
/// [`Registry::record()`](crate::Registry::record()) or copied into snapshots.
#[derive(Debug)]
pub struct CallRecord {
    direction: Direction,
    started_at: SystemTime,
    started: Instant,
    deadline: Option<Duration>,
    completion: Option<Completion>,
    peer: Option<SocketAddr>,
    metadata: Metadata,
    messages: MessageBuffer,
}

impl CallRecord {
    pub(crate) fn new(config: &TracerConfig, start: CallStart) -> Self {
        let mut this = Self {
            direction: start.direction,
            started_at: start.started_at,
            started: start.started,
            deadline: None,
            completion: None,
            peer: None,
            metadata: Metadata::new(),
            messages: config.new_buffer(),
        };
        this.start(start);
        this
    }

    /// (Re)starts this record. The record is assumed to be reset.
    pub(crate) fn start(&mut self, start: CallStart) {
        self.direction = start.direction;
        self.started_at = start.started_at;
        self.started = start.started;
        self.deadline = start.deadline;
        self.peer = start.peer;
        if let Some(metadata) = start.metadata {
            self.metadata = metadata;
        }
        if let Some(payload) = start.initial {
            self.record_message(payload, start.direction);
        }
    }

    /// Clears all fields, retaining allocated message storage.
    pub(crate) fn reset(&mut self) {
        self.deadline = None;
        self.completion = None;
        self.peer = None;
        self.metadata = Metadata::new();
        self.messages.reset();
    }

    pub(crate) fn record_message(&mut self, payload: CapturedPayload, direction: Direction) {
        let offset = self.started.elapsed();
        self.messages.push(CapturedMessage {
            direction,
            offset,
            payload,
        });
    }

    /// Counts a message without retaining it. Returns `false` if the message should be
    /// recorded with [`Self::record_message()`] instead.
    pub(crate) fn count_message(&mut self) -> bool {
        self.messages.count_only()
    }

    pub(crate) fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = Some(peer);
    }

    /// Completes the call. Returns `false` if the call was already completed; in this case,
    /// the reply is still recorded, but the status is left intact.
    pub(crate) fn complete(
        &mut self,
        status: Status,
        peer: Option<SocketAddr>,
        reply: Option<Reply>,
    ) -> bool {
        match reply {
            Some(Reply::Captured(payload)) => {
                self.record_message(payload, self.direction.reverse());
            }
            Some(Reply::CountOnly) => {
                // Retention only decreases for a started record, so the reply is not retained.
                let counted = self.count_message();
                debug_assert!(counted);
            }
            None => { /* no reply */ }
        }
        if self.completion.is_some() {
            return false;
        }

        self.completion = Some(Completion {
            duration: self.started.elapsed(),
            status,
        });
        if let Some(peer) = peer {
            self.peer = Some(peer);
        }
        true
    }

    /// Returns the call direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the wall-clock time when the call started.
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Returns the call deadline relative to its start, if the call had a deadline.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Returns completion information, or `None` if the call is in progress.
    pub fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    /// Checks whether the call is completed.
    pub fn is_completed(&self) -> bool {
        self.completion.is_some()
    }

    /// Returns the call duration, or `None` if the call is in progress.
    pub fn duration(&self) -> Option<Duration> {
        self.completion.as_ref().map(Completion::duration)
    }

    /// Returns the call status, or `None` if the call is in progress.
    pub fn status(&self) -> Option<&Status> {
        self.completion.as_ref().map(Completion::status)
    }

    /// Returns the address of the remote party, if known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Returns the call metadata. The metadata is empty if metadata recording is switched off.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns retained call messages.
    pub fn messages(&self) -> &MessageBuffer {
        &self.messages
    }
}
