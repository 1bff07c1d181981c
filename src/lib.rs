//! Non-blocking, capacity-bounded writer for slow sinks.
//!
//! Producers call [`AsyncWriter::write`], which copies the message into a
//! bounded [`Buffer`] and returns right away. A single drain thread forwards
//! buffered messages to a [`Sink`]. When the buffer is full the oldest messages
//! are evicted, so producers are never held up by the sink; loss is counted in
//! [`WriterStats`].
//!
//! ```
//! use aio_writer::{AsyncWriter, IoSink};
//!
//! let writer = AsyncWriter::new(IoSink::new(std::io::sink()), 4096).unwrap();
//! assert_eq!(writer.write(b"hello").unwrap(), 5);
//!
//! let stats = writer.close().unwrap();
//! assert_eq!(stats.delivered, 1);
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod sink;
pub mod writer;

pub use buffer::{Buffer, Evicted};
pub use config::WriterConfig;
pub use error::{ConfigError, WriteError};
pub use sink::{ConsoleBatchSink, IoSink, Sink};
pub use writer::{AsyncWriter, WriterStats};
