use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use pipecast_transport::{FifoReader, PollRead};
use tracing::{debug, trace};

use crate::error::{FrameError, Result};

/// Frame width in pixels.
pub const WIDTH: usize = 320;
/// Frame height in pixels.
pub const HEIGHT: usize = 200;
/// Size of one raw frame on the wire: one palette index per pixel.
pub const FRAME_LEN: usize = WIDTH * HEIGHT;

const READ_CHUNK_SIZE: usize = 16 * 1024;
/// Upper bound on bytes drained in a single poll, so a producer that writes
/// faster than we read cannot pin the reader in one call.
const MAX_DRAIN_BYTES: usize = 16 * FRAME_LEN;

/// One complete frame of palette indices.
#[derive(Clone, PartialEq, Eq)]
pub struct RawFrame {
    data: Bytes,
}

impl RawFrame {
    /// Wrap exactly [`FRAME_LEN`] bytes of palette indices.
    pub fn new(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.len() != FRAME_LEN {
            return Err(FrameError::InvalidLength {
                len: data.len(),
                expected: FRAME_LEN,
            });
        }
        Ok(Self { data })
    }

    /// A frame where every pixel uses the same palette index.
    pub fn filled(index: u8) -> Self {
        Self {
            data: Bytes::from(vec![index; FRAME_LEN]),
        }
    }

    /// Palette indices in row-major order.
    pub fn indices(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("len", &self.data.len())
            .finish()
    }
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePoll {
    /// The newest complete frame read during this cycle.
    Frame(RawFrame),
    /// No complete frame arrived before the readiness timeout.
    NotReady,
    /// The writer disconnected; reopen the pipe to continue.
    Closed,
}

/// Running counters for one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Complete frames surfaced to the caller.
    pub frames_read: u64,
    /// Complete frames discarded because a newer one was read in the same cycle.
    pub frames_dropped: u64,
    /// Incomplete frames discarded when the writer disconnected.
    pub invalid_reads: u64,
}

/// Latest-frame-wins reader over a pollable byte source.
///
/// Every poll drains whatever the source has buffered and keeps only the last
/// complete frame, so a backlog never builds up between producer and consumer.
/// Bytes of a frame still being written are held until it completes; if the
/// writer disconnects first, they are discarded as an invalid read.
pub struct FrameSource<T> {
    inner: T,
    buf: BytesMut,
    closed: bool,
    stats: SourceStats,
}

impl<T: PollRead> FrameSource<T> {
    /// Wrap a pollable source.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(FRAME_LEN),
            closed: false,
            stats: SourceStats::default(),
        }
    }

    /// Wait up to `timeout` for the newest complete frame.
    ///
    /// Returns [`FramePoll::Closed`] once the writer has gone; every later call
    /// keeps returning `Closed`.
    pub fn poll_next_frame(&mut self, timeout: Duration) -> Result<FramePoll> {
        if self.closed {
            return Ok(FramePoll::Closed);
        }

        if !self.inner.poll_readable(timeout)? {
            return Ok(FramePoll::NotReady);
        }

        let mut latest: Option<RawFrame> = None;
        let mut drained = 0usize;
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        while drained < MAX_DRAIN_BYTES {
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                self.closed = true;
                break;
            }

            drained += read;
            self.buf.extend_from_slice(&chunk[..read]);
            while self.buf.len() >= FRAME_LEN {
                let frame = RawFrame {
                    data: self.buf.split_to(FRAME_LEN).freeze(),
                };
                if latest.replace(frame).is_some() {
                    self.stats.frames_dropped += 1;
                }
            }
        }

        if self.closed && !self.buf.is_empty() {
            self.stats.invalid_reads += 1;
            debug!(
                len = self.buf.len(),
                expected = FRAME_LEN,
                "discarding incomplete frame at writer disconnect"
            );
            self.buf.clear();
        }

        match latest {
            Some(frame) => {
                self.stats.frames_read += 1;
                trace!(drained, "surfacing newest frame");
                Ok(FramePoll::Frame(frame))
            }
            None if self.closed => Ok(FramePoll::Closed),
            None => Ok(FramePoll::NotReady),
        }
    }

    /// True when the endpoint behind this source was removed or replaced.
    pub fn is_detached(&self) -> bool {
        self.inner.is_detached()
    }

    /// Counters accumulated since this source was created.
    pub fn stats(&self) -> SourceStats {
        self.stats
    }
}

impl FrameSource<FifoReader> {
    /// Create the video FIFO if absent and open it for reading.
    ///
    /// Blocks until a producer opens the write end.
    pub fn open(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let reader = FifoReader::open_with_mode(path, mode)?;
        Ok(Self::new(reader))
    }
}
