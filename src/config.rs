use std::time::Duration;

use crate::error::ConfigError;

/// Default buffer capacity: 1 MiB of queued messages.
pub const DEFAULT_CAPACITY: usize = 1024 * 1024;

/// How long the drain thread waits for a message before calling
/// [`Sink::on_idle`](crate::Sink::on_idle).
pub const DEFAULT_IDLE_FLUSH: Duration = Duration::from_micros(500);

pub const DEFAULT_THREAD_NAME: &str = "aio-drain";

/// Settings for an [`AsyncWriter`](crate::AsyncWriter).
#[derive(Debug, Clone)]
pub struct WriterConfig {
  /// Total bytes of messages the writer buffers before it starts evicting.
  pub capacity: usize,
  /// Deliver everything still buffered when the writer is closed.
  pub flush_on_close: bool,
  pub idle_flush: Duration,
  /// Pin the drain thread to this core.
  pub drain_core: Option<usize>,
  pub thread_name: String,
}

impl Default for WriterConfig {
  fn default() -> Self {
    Self {
      capacity: DEFAULT_CAPACITY,
      flush_on_close: true,
      idle_flush: DEFAULT_IDLE_FLUSH,
      drain_core: None,
      thread_name: DEFAULT_THREAD_NAME.to_string(),
    }
  }
}

impl WriterConfig {
  pub fn with_capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity;
    self
  }

  pub fn with_flush_on_close(mut self, flush: bool) -> Self {
    self.flush_on_close = flush;
    self
  }

  pub fn with_idle_flush(mut self, idle_flush: Duration) -> Self {
    self.idle_flush = idle_flush;
    self
  }

  pub fn with_drain_core(mut self, core: usize) -> Self {
    self.drain_core = Some(core);
    self
  }

  pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
    self.thread_name = name.into();
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.capacity == 0 {
      return Err(ConfigError::ZeroCapacity);
    }
    if self.idle_flush.is_zero() {
      return Err(ConfigError::ZeroIdleFlush);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_config_is_valid() {
    let config = WriterConfig::default();
    assert!(config.validate().is_ok());
    assert!(config.flush_on_close);
    assert_eq!(config.drain_core, None);
  }

  #[test]
  fn setters_chain() {
    let config = WriterConfig::default()
      .with_capacity(64)
      .with_flush_on_close(false)
      .with_idle_flush(Duration::from_millis(2))
      .with_drain_core(3)
      .with_thread_name("log-drain");

    assert_eq!(config.capacity, 64);
    assert!(!config.flush_on_close);
    assert_eq!(config.idle_flush, Duration::from_millis(2));
    assert_eq!(config.drain_core, Some(3));
    assert_eq!(config.thread_name, "log-drain");
  }

  #[test]
  fn rejects_zero_values() {
    let zero_cap = WriterConfig::default().with_capacity(0);
    assert!(matches!(zero_cap.validate(), Err(ConfigError::ZeroCapacity)));

    let zero_idle = WriterConfig::default().with_idle_flush(Duration::ZERO);
    assert!(matches!(zero_idle.validate(), Err(ConfigError::ZeroIdleFlush)));
  }
}
