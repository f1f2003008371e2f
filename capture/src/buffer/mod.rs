//! Bounded per-call message retention: the first `K1` and the last `K2` messages of a call.

use std::borrow::Cow;

use crate::record::CapturedMessage;


/// Bounded buffer retaining the first `keep_first` (aka `K1`) and the last `keep_last`
/// (aka `K2`) messages of a call; messages in between are only counted.
///
/// The buffer holds at most `K1 + K2` messages and maintains exact accounting: for any number
/// of pushed messages,
///
/// ```text
/// first().len() + last().len() + dropped() == total()
/// ```
///
/// Additionally, the buffer may have an absolute cutoff on the number of messages
/// independent of `K1` and `K2`. Once a message arrives after the cutoff is reached,
/// the buffer becomes *huge*: no further messages are stored, the tail region is
/// no longer reported, and only the message count keeps growing.
///
/// # Examples
///
/// ```
/// # use rpcz_capture::MessageBuffer;
/// let mut buffer = MessageBuffer::new(2, 3);
/// for i in 0..10 {
///     buffer.push(i);
/// }
/// assert_eq!(buffer.first(), [0, 1]);
/// assert_eq!(*buffer.last(), [7, 8, 9]);
/// assert_eq!(buffer.dropped(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct MessageBuffer<T = CapturedMessage> {
    slots: Vec<T>,
    keep_first: usize,
    keep_last: usize,
    huge_cutoff: Option<usize>,
    seen: usize,
    huge: bool,
}

impl<T> MessageBuffer<T> {
    /// Creates a buffer with the specified retention sizes and without a huge cutoff.
    pub fn new(keep_first: usize, keep_last: usize) -> Self {
        Self {
            slots: Vec::new(),
            keep_first,
            keep_last,
            huge_cutoff: None,
            seen: 0,
            huge: false,
        }
    }

    /// Sets the absolute cutoff on the number of messages after which the buffer becomes huge.
    /// `None` disables the cutoff.
    #[must_use]
    pub fn with_huge_cutoff(mut self, cutoff: Option<usize>) -> Self {
        self.huge_cutoff = cutoff;
        self
    }

    /// Returns the number of first messages retained.
    pub fn keep_first(&self) -> usize {
        self.keep_first
    }

    /// Returns the number of last messages retained.
    pub fn keep_last(&self) -> usize {
        self.keep_last
    }

    /// Returns the total number of messages pushed into this buffer, including the ones
    /// that were not retained.
    pub fn total(&self) -> usize {
        self.seen
    }

    /// Checks whether the buffer has crossed its huge cutoff.
    pub fn is_huge(&self) -> bool {
        self.huge
    }

    /// Checks whether no messages were pushed into this buffer.
    pub fn is_empty(&self) -> bool {
        self.seen == 0
    }

    fn reaches_cutoff(&self) -> bool {
        self.huge_cutoff.is_some_and(|cutoff| self.seen >= cutoff)
    }

    /// Checks whether the next pushed message will be stored. If it will not, the message
    /// can be counted with [`Self::count_only()`] without being constructed.
    ///
    /// Once this method returns `false`, it keeps returning `false` until the buffer is reset.
    pub fn stores_next(&self) -> bool {
        !self.huge && !self.reaches_cutoff() && (self.seen < self.keep_first || self.keep_last > 0)
    }

    /// Counts a message without storing it. Returns `false` and does nothing if the message
    /// would be stored (i.e., if [`Self::stores_next()`] returns `true`).
    pub fn count_only(&mut self) -> bool {
        if self.stores_next() {
            return false;
        }
        self.huge = self.huge || self.reaches_cutoff();
        self.seen += 1;
        true
    }

    /// Pushes a message into the buffer.
    pub fn push(&mut self, message: T) {
        if self.count_only() {
            return;
        }

        let index = if self.seen < self.keep_first {
            self.seen
        } else {
            self.keep_first + (self.seen - self.keep_first) % self.keep_last
        };
        self.seen += 1;

        if let Some(slot) = self.slots.get_mut(index) {
            *slot = message;
        } else {
            // Slots are filled sequentially until the first wraparound.
            debug_assert_eq!(index, self.slots.len());
            self.slots.push(message);
        }
    }

    /// Returns the first messages in their chronological order. At most `keep_first`
    /// messages are returned.
    pub fn first(&self) -> &[T] {
        &self.slots[..self.slots.len().min(self.keep_first)]
    }

    /// Returns the last messages in their chronological order. At most `keep_last`
    /// messages are returned; messages returned from [`Self::first()`] are never repeated.
    ///
    /// The returned slice is borrowed from the buffer unless the tail region has wrapped
    /// at a non-boundary position, in which case it is unrolled into an owned vector.
    /// Returns an empty slice if the buffer is huge.
    pub fn last(&self) -> Cow<'_, [T]>
    where
        T: Clone,
    {
        if self.huge || self.seen <= self.keep_first || self.keep_last == 0 {
            return Cow::Borrowed(&[]);
        }

        let tail = self.slots.get(self.keep_first..).unwrap_or_default();
        let tail_seen = self.seen - self.keep_first;
        let wrap = tail_seen % self.keep_last;
        if tail_seen < self.keep_last || wrap == 0 {
            Cow::Borrowed(tail)
        } else {
            let (newer, older) = tail.split_at(wrap);
            let mut unrolled = Vec::with_capacity(tail.len());
            unrolled.extend_from_slice(older);
            unrolled.extend_from_slice(newer);
            Cow::Owned(unrolled)
        }
    }

    /// Returns the number of messages that were counted, but are not returned
    /// by either [`Self::first()`] or [`Self::last()`].
    pub fn dropped(&self) -> usize {
        if self.huge {
            self.seen - self.first().len()
        } else {
            self.seen.saturating_sub(self.keep_first + self.keep_last)
        }
    }

    /// Resets the buffer to its initial state, retaining the allocated capacity.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.seen = 0;
        self.huge = false;
    }
}
