//! Bounded FIFO of variable-length messages with drop-oldest eviction.
//!
//! # Design
//!
//! ```text
//! ring (capacity bytes):
//! ┌──────────────────────────────────────────────┐
//! │ ..ccc│               │aaaa│bbbbbb│cc...        │
//! └──────────────────────────────────────────────┘
//!                        ^ head                ^ wraps to 0
//!
//! lens: [4, 6, 5]        size = 15
//! ```
//!
//! Message bytes live in one contiguous ring of exactly `capacity` bytes; a message
//! may wrap past the end of the ring. `lens` keeps the length of every queued
//! message, oldest first, so pushing never allocates a node per message.
//!
//! The buffer is not synchronized. [`AsyncWriter`](crate::AsyncWriter) guards it
//! with a mutex.

use std::collections::VecDeque;
use std::fmt;

use crate::error::{ConfigError, WriteError};

/// What a [`Buffer::push`] had to drop to make room.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Evicted {
  pub messages: usize,
  pub bytes: usize,
}

impl Evicted {
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.messages == 0
  }
}

pub struct Buffer {
  ring: Box<[u8]>,
  // offset of the oldest byte
  head: usize,
  lens: VecDeque<usize>,
  size: usize,
}

impl Buffer {
  /// Creates an empty buffer holding at most `capacity` bytes of messages.
  pub fn new(capacity: usize) -> Result<Self, ConfigError> {
    if capacity == 0 {
      return Err(ConfigError::ZeroCapacity);
    }

    Ok(Self {
      ring: vec![0u8; capacity].into_boxed_slice(),
      head: 0,
      lens: VecDeque::new(),
      size: 0,
    })
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.ring.len()
  }

  /// Sum of the lengths of all queued messages.
  #[inline]
  pub fn size(&self) -> usize {
    self.size
  }

  /// Bytes that can be pushed without evicting anything.
  #[inline]
  pub fn available(&self) -> usize {
    self.capacity() - self.size
  }

  /// Number of queued messages.
  #[inline]
  pub fn len(&self) -> usize {
    self.lens.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.lens.is_empty()
  }

  /// Appends `msg` as the newest message.
  ///
  /// Evicts the oldest messages until `msg` fits. The new message itself is always
  /// retained. Fails with [`WriteError::MessageTooLarge`] and leaves the buffer
  /// untouched when `msg` alone is larger than the capacity.
  pub fn push(&mut self, msg: &[u8]) -> Result<Evicted, WriteError> {
    let len = msg.len();
    let capacity = self.capacity();
    if len > capacity {
      return Err(WriteError::MessageTooLarge { len, capacity });
    }

    let mut evicted = Evicted::default();
    while self.size + len > capacity {
      // size + len > capacity >= len, so the queue is non-empty here
      let Some(oldest) = self.lens.pop_front() else { break };
      self.consume(oldest);
      evicted.messages += 1;
      evicted.bytes += oldest;
    }

    let tail = (self.head + self.size) % capacity;
    let first = len.min(capacity - tail);
    self.ring[tail..tail + first].copy_from_slice(&msg[..first]);
    self.ring[..len - first].copy_from_slice(&msg[first..]);

    self.lens.push_back(len);
    self.size += len;
    Ok(evicted)
  }

  /// Removes and returns the oldest message, or `None` when the buffer is empty.
  pub fn take(&mut self) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(self.lens.front().copied()?);
    self.take_into(&mut out);
    Some(out)
  }

  /// Like [`take`](Self::take), but copies the message into `out` (cleared first),
  /// reusing its allocation. Returns `false` and leaves `out` alone when empty.
  pub fn take_into(&mut self, out: &mut Vec<u8>) -> bool {
    let Some(len) = self.lens.pop_front() else {
      return false;
    };

    let first = len.min(self.capacity() - self.head);
    out.clear();
    out.extend_from_slice(&self.ring[self.head..self.head + first]);
    out.extend_from_slice(&self.ring[..len - first]);

    self.consume(len);
    true
  }

  #[inline]
  fn consume(&mut self, len: usize) {
    self.size -= len;
    self.head = if self.size == 0 { 0 } else { (self.head + len) % self.capacity() };
  }
}

impl fmt::Debug for Buffer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Buffer")
      .field("capacity", &self.capacity())
      .field("size", &self.size)
      .field("messages", &self.lens.len())
      .finish_non_exhaustive()
  }
}
