use std::sync::Arc;

use aio_writer::{AsyncWriter, ConsoleBatchSink, WriterConfig};
use anyhow::anyhow;
use minstant::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

const CAPACITY: usize = 10_000_000;
const ROUND: usize = 256;
const NUM_LOG: usize = 128;

/// Logs bursts through an `AsyncWriter` onto stdout and reports producer-side
/// latency on stderr.
///
/// usage: aio_writer [text|json]
fn main() -> anyhow::Result<()> {
  let format = std::env::args().nth(1).unwrap_or_else(|| "json".to_string());

  let config = WriterConfig::default().with_capacity(CAPACITY);
  let writer = Arc::new(AsyncWriter::with_config(ConsoleBatchSink::new(), config)?);
  init_tracing(&format, Arc::clone(&writer))?;

  let mut batch_costs = Vec::<u64>::with_capacity(ROUND);
  for round in 0..ROUND {
    let start = Instant::now();
    for id in 0..NUM_LOG {
      info!(round, id, r#"{{"some": "message"}}"#);
    }
    batch_costs.push(start.elapsed().as_nanos() as u64);
    std::thread::park_timeout(std::time::Duration::from_micros(10_000));
  }

  let stats = writer.close()?;

  let total_ns: u64 = batch_costs.iter().sum();
  let total_logs = (ROUND * NUM_LOG) as f64;
  eprintln!("== burst bench ==");
  eprintln!("ROUND={} NUM_LOG={} total_ns={}", ROUND, NUM_LOG, total_ns);
  eprintln!("avg per log: {:.3} ns", total_ns as f64 / total_logs);
  eprintln!(
    "batch ns: min={} p50={} p90={} p99={} max={}",
    batch_costs.iter().min().copied().unwrap_or_default(),
    percentile(&batch_costs, 0.50),
    percentile(&batch_costs, 0.90),
    percentile(&batch_costs, 0.99),
    batch_costs.iter().max().copied().unwrap_or_default(),
  );
  eprintln!(
    "accepted={} delivered={} evicted={} sink_errors={}",
    stats.accepted, stats.delivered, stats.evicted_messages, stats.sink_errors
  );
  Ok(())
}

fn init_tracing(format: &str, writer: Arc<AsyncWriter>) -> anyhow::Result<()> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_file(true)
    .with_line_number(true);

  let res = match format.to_ascii_lowercase().as_str() {
    "text" => builder.with_ansi(false).try_init(),
    "json" => builder.json().try_init(),
    other => return Err(anyhow!("unexpected log format {other:?}")),
  };
  res.map_err(|err| anyhow!(err))
}

fn percentile(v: &[u64], p: f64) -> u64 {
  if v.is_empty() {
    return 0;
  }
  let mut sorted = v.to_vec();
  sorted.sort_unstable();
  let idx = ((sorted.len() as f64 - 1.0) * p).floor() as usize;
  sorted[idx.min(sorted.len() - 1)]
}
