//! Async writer: producers push into a bounded [`Buffer`], one drain thread
//! forwards messages to the [`Sink`].
//!
//! ```text
//! producer ─┐
//! producer ─┼─ write() ── lock ── Buffer::push ── try_send(wake)
//! producer ─┘                                         │
//!                                                     v
//!                    drain thread ── Buffer::take_into ── Sink::write_message
//! ```
//!
//! The wake channel has a single slot. A producer that finds it full knows a
//! wake-up is already pending, and the drain thread empties the whole buffer
//! per wake-up, so producers never block on signalling.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::buffer::{Buffer, Evicted};
use crate::config::WriterConfig;
use crate::error::{ConfigError, WriteError};
use crate::sink::Sink;

/// Point-in-time counters of an [`AsyncWriter`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterStats {
  /// Messages accepted by `write`.
  pub accepted: u64,
  /// Messages dropped to make room for newer ones.
  pub evicted_messages: u64,
  pub evicted_bytes: u64,
  /// Messages the sink accepted. A batching sink may still lose them later;
  /// that shows up as a failed `write_message`, `flush` or `on_idle` call.
  pub delivered: u64,
  /// Failed sink calls of any kind.
  pub sink_errors: u64,
  /// Bytes still waiting in the buffer.
  pub buffered_bytes: usize,
}

struct Queue {
  buffer: Buffer,
  closed: bool,
}

#[derive(Default)]
struct Counters {
  accepted: CachePadded<AtomicU64>,
  evicted_messages: CachePadded<AtomicU64>,
  evicted_bytes: CachePadded<AtomicU64>,
  delivered: CachePadded<AtomicU64>,
  sink_errors: CachePadded<AtomicU64>,
}

impl Counters {
  #[inline]
  fn record_push(&self, evicted: Evicted) {
    self.accepted.fetch_add(1, Ordering::Relaxed);
    if !evicted.is_empty() {
      self.evicted_messages.fetch_add(evicted.messages as u64, Ordering::Relaxed);
      self.evicted_bytes.fetch_add(evicted.bytes as u64, Ordering::Relaxed);
    }
  }
}

struct Shared {
  queue: Mutex<Queue>,
  counters: Counters,
  // set once a producer finds the wake channel disconnected
  drain_gone: AtomicBool,
}

/// Non-blocking, lossy writer in front of a slow sink.
///
/// `write` copies the message into a bounded buffer and returns; it never
/// touches the sink. When the buffer is full the oldest queued messages are
/// dropped. The writer is `Sync`; share it behind an `Arc` between producers.
///
/// Every call to `write` is one message: it is delivered whole or not at all.
pub struct AsyncWriter {
  shared: Arc<Shared>,
  wake_tx: Sender<()>,
  shutdown_tx: Sender<()>,
  drain: Mutex<Option<JoinHandle<()>>>,
  capacity: usize,
}

impl AsyncWriter {
  /// Starts a writer buffering up to `capacity` bytes in front of `sink`.
  pub fn new<S: Sink>(sink: S, capacity: usize) -> Result<Self, ConfigError> {
    Self::with_config(sink, WriterConfig::default().with_capacity(capacity))
  }

  pub fn with_config<S: Sink>(sink: S, config: WriterConfig) -> Result<Self, ConfigError> {
    config.validate()?;

    let shared = Arc::new(Shared {
      queue: Mutex::new(Queue {
        buffer: Buffer::new(config.capacity)?,
        closed: false,
      }),
      counters: Counters::default(),
      drain_gone: AtomicBool::new(false),
    });

    let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);

    let drain = DrainThread {
      shared: Arc::clone(&shared),
      sink,
      scratch: Vec::new(),
      idle_flush: config.idle_flush,
      flush_on_close: config.flush_on_close,
      failing: false,
    };
    let drain_core = config.drain_core;
    // the drain thread logs into the creating thread's subscriber, if it has one;
    // otherwise it follows the global default, which may be installed later
    let dispatch = tracing::dispatcher::get_default(|d| d.clone());
    let inherit = !dispatch.is::<tracing::subscriber::NoSubscriber>();

    let handle = thread::Builder::new()
      .name(config.thread_name.clone())
      .spawn(move || {
        let run = move || {
          if let Some(id) = drain_core {
            if !core_affinity::set_for_current(core_affinity::CoreId { id }) {
              warn!(core = id, "failed to pin drain thread");
            }
          }
          drain.run(wake_rx, shutdown_rx);
        };
        if inherit {
          tracing::dispatcher::with_default(&dispatch, run);
        } else {
          run();
        }
      })
      .map_err(ConfigError::Spawn)?;

    debug!(capacity = config.capacity, thread = %config.thread_name, "async writer started");

    Ok(Self {
      shared,
      wake_tx,
      shutdown_tx,
      drain: Mutex::new(Some(handle)),
      capacity: config.capacity,
    })
  }

  /// Queues `p` for delivery and returns `p.len()`.
  ///
  /// Never waits on the sink. Older messages are evicted if `p` does not fit.
  /// Writing an empty slice is a no-op.
  pub fn write(&self, p: &[u8]) -> Result<usize, WriteError> {
    let evicted = {
      let mut queue = self.shared.queue.lock();
      if queue.closed {
        return Err(WriteError::Closed);
      }
      if p.is_empty() {
        return Ok(0);
      }
      queue.buffer.push(p)?
    };

    self.shared.counters.record_push(evicted);
    // Full: a wake-up is already pending.
    if let Err(TrySendError::Disconnected(())) = self.wake_tx.try_send(()) {
      if !self.shared.drain_gone.swap(true, Ordering::Relaxed) {
        warn!("drain thread is gone, buffered messages will not be delivered");
      }
    }
    Ok(p.len())
  }

  /// Stops accepting writes and joins the drain thread.
  ///
  /// With `flush_on_close` (the default) every message still buffered is handed
  /// to the sink and [`Sink::flush`] is called first. Returns the final stats.
  /// Closing twice fails with [`WriteError::Closed`].
  pub fn close(&self) -> Result<WriterStats, WriteError> {
    let handle = self.drain.lock().take().ok_or(WriteError::Closed)?;

    self.shared.queue.lock().closed = true;
    let _ = self.shutdown_tx.send(());

    handle.join().map_err(|_| WriteError::DrainPanicked)?;

    let stats = self.stats();
    debug!(?stats, "async writer closed");
    Ok(stats)
  }

  pub fn is_closed(&self) -> bool {
    self.shared.queue.lock().closed
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn stats(&self) -> WriterStats {
    let c = &self.shared.counters;
    WriterStats {
      accepted: c.accepted.load(Ordering::Relaxed),
      evicted_messages: c.evicted_messages.load(Ordering::Relaxed),
      evicted_bytes: c.evicted_bytes.load(Ordering::Relaxed),
      delivered: c.delivered.load(Ordering::Relaxed),
      sink_errors: c.sink_errors.load(Ordering::Relaxed),
      buffered_bytes: self.shared.queue.lock().buffer.size(),
    }
  }
}

impl Drop for AsyncWriter {
  fn drop(&mut self) {
    if self.drain.get_mut().is_some() {
      if let Err(err) = self.close() {
        warn!(%err, "async writer dropped without a clean close");
      }
    }
  }
}

impl std::fmt::Debug for AsyncWriter {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AsyncWriter")
      .field("capacity", &self.capacity)
      .field("closed", &self.is_closed())
      .finish_non_exhaustive()
  }
}

impl io::Write for &AsyncWriter {
  #[inline]
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    AsyncWriter::write(*self, buf).map_err(io::Error::from)
  }

  /// Does not wait for the drain thread; use [`AsyncWriter::close`] for that.
  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for AsyncWriter {
  type Writer = &'a AsyncWriter;

  fn make_writer(&'a self) -> Self::Writer {
    self
  }
}

// =============================
// Drain thread: the only reader of the buffer and the only user of the sink
// =============================
struct DrainThread<S> {
  shared: Arc<Shared>,
  sink: S,
  scratch: Vec<u8>,
  idle_flush: Duration,
  flush_on_close: bool,
  // sink failed on its last call
  failing: bool,
}

impl<S: Sink> DrainThread<S> {
  fn run(mut self, wake_rx: Receiver<()>, shutdown_rx: Receiver<()>) {
    loop {
      crossbeam_channel::select! {
        recv(wake_rx) -> msg => match msg {
          Ok(()) => self.drain_pending(),
          Err(_) => break,
        },
        recv(shutdown_rx) -> _ => break,
        default(self.idle_flush) => {
          let res = self.sink.on_idle();
          self.record_housekeeping(res);
        }
      }
    }

    if self.flush_on_close {
      self.drain_pending();
      let res = self.sink.flush();
      self.record_housekeeping(res);
    }
    debug!("drain thread stopped");
  }

  fn drain_pending(&mut self) {
    loop {
      let taken = self.shared.queue.lock().buffer.take_into(&mut self.scratch);
      if !taken {
        break;
      }

      let res = self.sink.write_message(&self.scratch);
      self.record_write(res);
    }
  }

  /// Sink errors never reach producers. Only the first failure of a streak and
  /// the recovery are logged.
  fn record_write(&mut self, res: io::Result<()>) {
    match res {
      Ok(()) => {
        self.shared.counters.delivered.fetch_add(1, Ordering::Relaxed);
        if self.failing {
          self.failing = false;
          info!("sink recovered");
        }
      }
      Err(err) => self.record_failure(err),
    }
  }

  /// `flush`/`on_idle` results. Success says nothing about message delivery, so
  /// it does not end a failure streak.
  fn record_housekeeping(&mut self, res: io::Result<()>) {
    if let Err(err) = res {
      self.record_failure(err);
    }
  }

  fn record_failure(&mut self, err: io::Error) {
    self.shared.counters.sink_errors.fetch_add(1, Ordering::Relaxed);
    if !self.failing {
      self.failing = true;
      warn!(%err, "sink write failed, messages are being dropped");
    }
  }
}
