use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use pipecast_frame::encode_part;
use tokio::sync::watch;

/// The most recently rendered frame, already framed as a multipart part.
#[derive(Clone, PartialEq, Eq)]
pub struct LatestFrame {
    /// Publication counter; strictly increasing, starting at 1.
    pub seq: u64,
    /// The JPEG image.
    pub jpeg: Bytes,
    /// `jpeg` wrapped in its multipart part header and trailer.
    pub part: Bytes,
}

impl std::fmt::Debug for LatestFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatestFrame")
            .field("seq", &self.seq)
            .field("jpeg_len", &self.jpeg.len())
            .finish()
    }
}

/// Single shared latest-frame slot.
///
/// One writer (the feed) replaces the value; any number of client streams
/// observe it. Older frames are simply overwritten.
#[derive(Clone)]
pub struct FrameSlot {
    tx: Arc<watch::Sender<Option<LatestFrame>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the current frame with `jpeg` and wake every subscriber.
    ///
    /// Returns the sequence number assigned to the new frame.
    pub fn publish(&self, jpeg: Bytes) -> u64 {
        let mut part = BytesMut::new();
        encode_part(&jpeg, &mut part);
        let part = part.freeze();

        let mut seq = 0;
        self.tx.send_modify(|slot| {
            seq = slot.as_ref().map_or(1, |frame| frame.seq + 1);
            *slot = Some(LatestFrame {
                seq,
                jpeg: jpeg.clone(),
                part: part.clone(),
            });
        });
        seq
    }

    /// A receiver positioned at the current value.
    pub fn subscribe(&self) -> watch::Receiver<Option<LatestFrame>> {
        self.tx.subscribe()
    }

    /// Snapshot of the current frame, if any has been published.
    pub fn latest(&self) -> Option<LatestFrame> {
        self.tx.borrow().clone()
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}
