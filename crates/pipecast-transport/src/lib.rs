//! Named pipe (FIFO) transport for pipecast.
//!
//! Provides the two pipe endpoints the relay talks through:
//! - a read side that waits for a producer, then exposes readiness polling
//!   with a bounded timeout and non-blocking reads
//! - a write side that delivers short, atomic lines to whatever process is
//!   reading the input pipe
//!
//! This is the lowest layer of pipecast. Everything else builds on top of
//! the [`PollRead`] trait and the FIFO types provided here.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod fifo;

pub use error::{Result, TransportError};
pub use traits::PollRead;

#[cfg(unix)]
pub use fifo::{ensure_fifo, FifoReader, FifoWriter, DEFAULT_FIFO_MODE, PIPE_BUF};
