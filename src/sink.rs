use std::io::{self, Write};
use std::time::Duration;

use minstant::Instant;

/// Destination the drain thread forwards messages to.
///
/// A sink is moved into the drain thread and only ever used from there, so it
/// needs no internal synchronization.
pub trait Sink: Send + 'static {
  /// Writes one whole message. An error drops the message; it is not retried.
  fn write_message(&mut self, msg: &[u8]) -> io::Result<()>;

  /// Called once when the writer closes with `flush_on_close` set.
  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }

  /// Called when the drain thread has seen no message for the configured idle interval.
  fn on_idle(&mut self) -> io::Result<()> {
    Ok(())
  }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
  fn write_message(&mut self, msg: &[u8]) -> io::Result<()> {
    (**self).write_message(msg)
  }

  fn flush(&mut self) -> io::Result<()> {
    (**self).flush()
  }

  fn on_idle(&mut self) -> io::Result<()> {
    (**self).on_idle()
  }
}

/// Adapts any [`io::Write`] (file, socket, stdout) into a [`Sink`].
#[derive(Debug)]
pub struct IoSink<W> {
  inner: W,
}

impl<W: Write + Send + 'static> IoSink<W> {
  pub fn new(inner: W) -> Self {
    Self { inner }
  }

  pub fn get_ref(&self) -> &W {
    &self.inner
  }

  pub fn into_inner(self) -> W {
    self.inner
  }
}

impl<W: Write + Send + 'static> Sink for IoSink<W> {
  #[inline]
  fn write_message(&mut self, msg: &[u8]) -> io::Result<()> {
    self.inner.write_all(msg)
  }

  fn flush(&mut self) -> io::Result<()> {
    self.inner.flush()
  }
}

/// -------- Console batch sink --------
///
/// Collects messages into one batch and writes it out when the batch reaches
/// `flush_bytes`, or when `flush_interval` has passed since the last write-out.
/// The drain thread calls [`Sink::on_idle`] while waiting, so a partial batch
/// still becomes visible after at most about one interval.
///
/// Messages handed to the sink count as delivered once batched. If writing the
/// batch out fails, the whole batch is dropped; the returned error says how many
/// messages were in it and [`dropped_messages`](Self::dropped_messages) keeps the total.
pub struct ConsoleBatchSink<W = io::Stdout> {
  out: W,
  batch: Vec<u8>,
  batched: usize,
  dropped: u64,

  flush_bytes: usize,
  flush_interval: Duration,
  last_flush: Instant,
}

pub const DEFAULT_FLUSH_BYTES: usize = 256 * 1024;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_micros(500);

impl ConsoleBatchSink<io::Stdout> {
  pub fn new() -> Self {
    Self::with_output(io::stdout(), DEFAULT_FLUSH_BYTES, DEFAULT_FLUSH_INTERVAL)
  }
}

impl Default for ConsoleBatchSink<io::Stdout> {
  fn default() -> Self {
    Self::new()
  }
}

impl<W: Write + Send + 'static> ConsoleBatchSink<W> {
  pub fn with_output(out: W, flush_bytes: usize, flush_interval: Duration) -> Self {
    Self {
      out,
      batch: Vec::with_capacity(flush_bytes),
      batched: 0,
      dropped: 0,
      flush_bytes,
      flush_interval,
      last_flush: Instant::now(),
    }
  }

  pub fn get_ref(&self) -> &W {
    &self.out
  }

  /// Bytes collected but not yet written out.
  pub fn pending(&self) -> usize {
    self.batch.len()
  }

  /// Messages lost because writing their batch out failed.
  pub fn dropped_messages(&self) -> u64 {
    self.dropped
  }

  #[inline(always)]
  fn should_flush(&self) -> bool {
    self.batch.len() >= self.flush_bytes || self.last_flush.elapsed() >= self.flush_interval
  }

  fn flush_now(&mut self) -> io::Result<()> {
    self.last_flush = Instant::now();
    if self.batch.is_empty() {
      return Ok(());
    }

    // the batch is dropped even if the write fails, it would only grow otherwise
    let res = self.out.write_all(&self.batch).and_then(|()| self.out.flush());
    let batched = std::mem::take(&mut self.batched);
    self.batch.clear();
    res.map_err(|err| {
      self.dropped += batched as u64;
      io::Error::new(err.kind(), format!("dropped batch of {batched} messages: {err}"))
    })
  }
}

impl<W: Write + Send + 'static> Sink for ConsoleBatchSink<W> {
  #[inline]
  fn write_message(&mut self, msg: &[u8]) -> io::Result<()> {
    self.batch.extend_from_slice(msg);
    self.batched += 1;
    if self.should_flush() {
      self.flush_now()?;
    }
    Ok(())
  }

  fn flush(&mut self) -> io::Result<()> {
    self.flush_now()
  }

  fn on_idle(&mut self) -> io::Result<()> {
    if !self.batch.is_empty() && self.last_flush.elapsed() >= self.flush_interval {
      self.flush_now()?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const HOUR: Duration = Duration::from_secs(3600);

  #[test]
  fn io_sink_writes_whole_messages() {
    let mut sink = IoSink::new(Vec::new());
    sink.write_message(b"hello ").unwrap();
    sink.write_message(b"world").unwrap();
    Sink::flush(&mut sink).unwrap();

    assert_eq!(sink.into_inner(), b"hello world");
  }

  #[test]
  fn batch_is_written_once_it_reaches_flush_bytes() {
    let mut sink = ConsoleBatchSink::with_output(Vec::new(), 8, HOUR);

    sink.write_message(b"abc").unwrap();
    assert!(sink.get_ref().is_empty());
    assert_eq!(sink.pending(), 3);

    sink.write_message(b"defgh").unwrap();
    assert_eq!(sink.get_ref(), b"abcdefgh");
    assert_eq!(sink.pending(), 0);
  }

  #[test]
  fn idle_flushes_only_after_the_interval() {
    let mut sink = ConsoleBatchSink::with_output(Vec::new(), 1024, HOUR);
    sink.write_message(b"line\n").unwrap();
    sink.on_idle().unwrap();
    assert!(sink.get_ref().is_empty());

    let mut eager = ConsoleBatchSink::with_output(Vec::new(), 1024, Duration::from_millis(1));
    eager.write_message(b"line\n").unwrap();
    std::thread::sleep(Duration::from_millis(5));
    eager.on_idle().unwrap();
    assert_eq!(eager.get_ref(), b"line\n");
  }

  #[test]
  fn explicit_flush_writes_partial_batch() {
    let mut sink = ConsoleBatchSink::with_output(Vec::new(), 1024, HOUR);
    sink.write_message(b"tail").unwrap();
    Sink::flush(&mut sink).unwrap();
    assert_eq!(sink.get_ref(), b"tail");
  }

  struct BrokenOut;

  impl Write for BrokenOut {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
      Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn failed_write_out_reports_dropped_messages() {
    let mut sink = ConsoleBatchSink::with_output(BrokenOut, 1024, HOUR);
    sink.write_message(b"one\n").unwrap();
    sink.write_message(b"two\n").unwrap();
    sink.write_message(b"three\n").unwrap();

    let err = Sink::flush(&mut sink).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    assert!(err.to_string().contains("3 messages"), "{err}");
    assert_eq!(sink.dropped_messages(), 3);
    assert_eq!(sink.pending(), 0);

    // a fresh batch starts counting from zero
    sink.write_message(b"four\n").unwrap();
    assert!(Sink::flush(&mut sink).is_err());
    assert_eq!(sink.dropped_messages(), 4);
  }

  #[test]
  fn boxed_sink_forwards() {
    let mut sink: Box<dyn Sink> = Box::new(IoSink::new(io::sink()));
    assert!(sink.write_message(b"x").is_ok());
    assert!(sink.on_idle().is_ok());
  }
}
