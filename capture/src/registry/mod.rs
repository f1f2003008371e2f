//! `Registry` of recent calls and related types.

use id_arena::{Arena, Id};

use std::{
    collections::HashMap,
    fmt,
    net::SocketAddr,
    ops,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    payload::{CapturedPayload, Payload},
    record::{CallRecord, CallStart, Reply},
    snapshot::Snapshot,
    types::{CallContext, Direction, Status},
    TracerConfig,
};


#[derive(Debug)]
pub(crate) struct CallSlot {
    generation: u64,
    record: CallRecord,
}

type CallId = Id<CallSlot>;

/// Fixed-size ring of the most recent calls for a single method and direction.
#[derive(Debug)]
pub(crate) struct MethodRing {
    method: String,
    direction: Direction,
    slots: Vec<Option<CallId>>,
    cursor: usize,
}

impl MethodRing {
    fn new(method: &str, direction: Direction, len: usize) -> Self {
        Self {
            method: method.to_owned(),
            direction,
            slots: vec![None; len],
            cursor: 0,
        }
    }

    pub(crate) fn method(&self) -> &str {
        &self.method
    }

    pub(crate) fn direction(&self) -> Direction {
        self.direction
    }

    fn take_current(&mut self) -> Option<CallId> {
        self.slots.get_mut(self.cursor).and_then(Option::take)
    }

    fn put(&mut self, id: CallId) {
        if let Some(slot) = self.slots.get_mut(self.cursor) {
            *slot = Some(id);
        }
        self.cursor = (self.cursor + 1) % self.slots.len();
    }

    /// Iterates over occupied slots from the newest call to the oldest one.
    fn newest_first(&self) -> impl Iterator<Item = CallId> + '_ {
        let (newer, older) = self.slots.split_at(self.cursor);
        newer.iter().rev().chain(older.iter().rev()).filter_map(|id| *id)
    }
}

/// Outcome of registering a call in a [`Registry`].
#[derive(Debug)]
struct Registration {
    id: CallId,
    generation: u64,
    is_new_method: bool,
    evicted: bool,
}

/// Registry of recent calls, grouped by the method and direction.
///
/// For each method and direction, the registry retains a fixed number of most recent calls
/// (configured via [`TracerConfig::calls_per_method`]); a new call evicts the oldest one
/// once the limit is reached. Records of evicted calls are reset and reused for new calls.
///
/// `Registry` instances are not created directly; instead, they are wrapped
/// in [`SharedRegistry`] and can be accessed via [`lock()`](SharedRegistry::lock()).
#[derive(Debug)]
pub struct Registry {
    config: TracerConfig,
    calls: Arena<CallSlot>,
    free_ids: Vec<CallId>,
    methods: HashMap<String, MethodRing>,
}

impl Registry {
    pub(crate) fn new(config: TracerConfig) -> Self {
        Self {
            config,
            calls: Arena::new(),
            free_ids: vec![],
            methods: HashMap::new(),
        }
    }

    /// Returns the configuration of this registry.
    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Returns the record of the specified call, or `None` if the call was evicted.
    pub fn record(&self, handle: &CallHandle) -> Option<&CallRecord> {
        let slot = self.calls.get(handle.id)?;
        (slot.generation == handle.generation).then_some(&slot.record)
    }

    /// Returns keys of all methods with recorded calls in the lexicographic order.
    /// A key is the method name qualified with the call direction, such as
    /// `recv: /pkg.Service/Method` for inbound calls or `sent: /pkg.Service/Method`
    /// for outbound ones.
    pub fn method_keys(&self) -> Vec<&str> {
        let mut keys: Vec<_> = self.methods.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Iterates over retained calls for the specified method key, from the newest call
    /// to the oldest one. Returns `None` if there are no calls for the key.
    pub fn calls(&self, key: &str) -> Option<impl Iterator<Item = &CallRecord> + '_> {
        let ring = self.methods.get(key)?;
        Some(self.ring_calls(ring))
    }

    pub(crate) fn rings(&self) -> impl Iterator<Item = (&str, &MethodRing)> + '_ {
        self.methods.iter().map(|(key, ring)| (key.as_str(), ring))
    }

    pub(crate) fn ring_calls<'a>(
        &'a self,
        ring: &'a MethodRing,
    ) -> impl Iterator<Item = &'a CallRecord> + 'a {
        ring.newest_first().map(|id| &self.calls[id].record)
    }

    /// Takes a snapshot of all retained calls.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self)
    }

    fn begin_call(&mut self, method: &str, start: CallStart) -> Registration {
        let direction = start.direction();
        let key = format!("{}: {method}", direction.key_prefix());
        let Self {
            config,
            calls,
            free_ids,
            methods,
        } = self;

        let mut is_new_method = false;
        let ring = methods.entry(key).or_insert_with(|| {
            is_new_method = true;
            MethodRing::new(method, direction, config.ring_len())
        });

        let evicted_id = ring.take_current();
        if let Some(evicted_id) = evicted_id {
            let slot = &mut calls[evicted_id];
            slot.generation += 1;
            slot.record.reset();
            free_ids.push(evicted_id);
        }

        let id = if let Some(id) = free_ids.pop() {
            calls[id].record.start(start);
            id
        } else {
            calls.alloc(CallSlot {
                generation: 0,
                record: CallRecord::new(config, start),
            })
        };
        ring.put(id);

        Registration {
            id,
            generation: calls[id].generation,
            is_new_method,
            evicted: evicted_id.is_some(),
        }
    }

    fn record_mut(&mut self, id: CallId, generation: u64) -> Option<&mut CallRecord> {
        let slot = self.calls.get_mut(id)?;
        (slot.generation == generation).then_some(&mut slot.record)
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared wrapper for a call [`Registry`]. This is the entry point for capturing calls.
///
/// # Examples
///
/// ```
/// # use rpcz_capture::{CallContext, Direction, SharedRegistry, Status};
/// let registry = SharedRegistry::default();
/// let context = CallContext::new();
/// let call = registry
///     .sample_call("/test.Echo/Say", Direction::Inbound, &context, Some(&"hello"))
///     .expect("default config samples all calls");
/// call.complete(Status::ok(), None, Some(&"hello"));
///
/// let registry = registry.lock();
/// let record = registry.record(&call).unwrap();
/// assert!(record.status().unwrap().is_ok());
/// assert_eq!(record.messages().total(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct SharedRegistry {
    inner: Arc<Mutex<Registry>>,
    config: Arc<TracerConfig>,
}

impl Default for SharedRegistry {
    fn default() -> Self {
        Self::new(TracerConfig::default())
    }
}

impl SharedRegistry {
    /// Creates a registry with the specified configuration.
    pub fn new(config: TracerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry::new(config.clone()))),
            config: Arc::new(config),
        }
    }

    /// Returns the configuration of this registry.
    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Locks the underlying [`Registry`] for exclusive access. While the lock is held,
    /// capturing cannot progress; beware of deadlocks!
    pub fn lock(&self) -> impl ops::Deref<Target = Registry> + '_ {
        lock(&self.inner)
    }

    /// Takes a snapshot of all retained calls.
    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot()
    }

    /// Starts capturing a call if it is selected by the sampling policy. Returns `None`
    /// if the call is not sampled.
    ///
    /// The `initial` payload, if provided, is recorded as the first message of the call
    /// in the call direction (e.g., the request of a unary call).
    pub fn sample_call(
        &self,
        method: &str,
        direction: Direction,
        context: &CallContext,
        initial: Option<&dyn Payload>,
    ) -> Option<CallHandle> {
        if self.config.sampling_policy().should_sample(method) {
            let label = direction.as_str();
            metrics::increment_counter!("rpcz_calls_sampled_total", "direction" => label);
            Some(self.begin_call(method, direction, context, initial))
        } else {
            let label = direction.as_str();
            metrics::increment_counter!("rpcz_calls_skipped_total", "direction" => label);
            None
        }
    }

    /// Starts capturing a call regardless of the sampling policy.
    pub fn begin_call(
        &self,
        method: &str,
        direction: Direction,
        context: &CallContext,
        initial: Option<&dyn Payload>,
    ) -> CallHandle {
        let start = CallStart::new(&self.config, direction, context, initial);
        let registration = lock(&self.inner).begin_call(method, start);

        if registration.is_new_method {
            tracing::debug!(method, %direction, "started tracing calls for new method");
        }
        if registration.evicted {
            tracing::trace!(method, %direction, "evicted oldest call");
            metrics::increment_counter!("rpcz_calls_evicted_total");
        }

        CallHandle {
            registry: Arc::clone(&self.inner),
            id: registration.id,
            generation: registration.generation,
            direction,
        }
    }
}

/// Handle to a call captured in a [`Registry`].
///
/// All operations on the handle take the registry lock once. If the call was evicted from
/// the registry, the operations are no-ops; they never affect the call that reuses
/// the evicted record.
#[derive(Clone)]
pub struct CallHandle {
    registry: Arc<Mutex<Registry>>,
    id: CallId,
    generation: u64,
    direction: Direction,
}

impl fmt::Debug for CallHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CallHandle")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}

impl CallHandle {
    /// Returns the call direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Checks whether the call is still retained in the registry.
    pub fn is_retained(&self) -> bool {
        let mut registry = lock(&self.registry);
        registry.record_mut(self.id, self.generation).is_some()
    }

    fn with_record<R>(&self, action: impl FnOnce(&mut CallRecord) -> R) -> Option<R> {
        let mut registry = lock(&self.registry);
        registry.record_mut(self.id, self.generation).map(action)
    }

    /// Records a message sent or received during the call. The payload is only rendered
    /// if the message is going to be retained; otherwise, the message is just counted.
    pub fn record_message(&self, payload: &(impl Payload + ?Sized), direction: Direction) {
        let counted = self.with_record(|record| {
            let was_huge = record.messages().is_huge();
            record
                .count_message()
                .then(|| !was_huge && record.messages().is_huge())
        });
        let became_huge = match counted {
            None => return, // the call was evicted
            Some(Some(became_huge)) => became_huge,
            Some(None) => {
                // Rendering is performed outside the lock; the record may have become huge
                // in the meantime, which is handled by the buffer.
                let payload = CapturedPayload::capture(payload);
                let became_huge = self.with_record(|record| {
                    let was_huge = record.messages().is_huge();
                    record.record_message(payload, direction);
                    !was_huge && record.messages().is_huge()
                });
                became_huge == Some(true)
            }
        };

        if became_huge {
            tracing::debug!(
                call = ?self.id,
                "call has exceeded huge message cutoff; further messages will only be counted"
            );
        }
    }

    /// Sets the address of the remote party.
    pub fn set_peer(&self, peer: SocketAddr) {
        self.with_record(|record| record.set_peer(peer));
    }

    /// Completes the call with the specified status. If provided, `reply` is recorded
    /// as a message in the direction opposite to the call direction, and `peer` overwrites
    /// the remote party address.
    ///
    /// Only the first completion of a call has effect on its status; subsequent
    /// completions only record the reply.
    pub fn complete(&self, status: Status, peer: Option<SocketAddr>, reply: Option<&dyn Payload>) {
        let reply = match reply {
            None => None,
            Some(reply) => match self.with_record(|record| record.messages().stores_next()) {
                None => return,
                Some(true) => Some(Reply::Captured(CapturedPayload::capture(reply))),
                Some(false) => Some(Reply::CountOnly),
            },
        };
        let is_first = self.with_record(|record| record.complete(status, peer, reply));
        if is_first == Some(false) {
            tracing::debug!(call = ?self.id, "ignored repeated call completion");
        }
    }
}
