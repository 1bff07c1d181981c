//! Error types for the buffer and the async writer.

use std::io;

use thiserror::Error;

/// Errors returned to a producer by [`AsyncWriter::write`](crate::AsyncWriter::write)
/// and by the writer's lifecycle calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteError {
  /// A single message is larger than the whole buffer; no eviction can make room for it.
  #[error("message of {len} bytes exceeds buffer capacity of {capacity} bytes")]
  MessageTooLarge { len: usize, capacity: usize },

  /// The writer has been closed and no longer accepts messages.
  #[error("writer is closed")]
  Closed,

  /// The drain thread panicked before it could be joined.
  #[error("drain thread panicked")]
  DrainPanicked,
}

/// Errors raised while building a buffer or starting a writer.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("buffer capacity must be non-zero")]
  ZeroCapacity,

  #[error("idle flush interval must be non-zero")]
  ZeroIdleFlush,

  #[error("failed to spawn drain thread: {0}")]
  Spawn(#[source] io::Error),
}

impl From<WriteError> for io::Error {
  fn from(err: WriteError) -> Self {
    let kind = match err {
      WriteError::MessageTooLarge { .. } => io::ErrorKind::InvalidInput,
      WriteError::Closed => io::ErrorKind::BrokenPipe,
      WriteError::DrainPanicked => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
  }
}
