use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_core::Stream;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::slot::LatestFrame;

/// Tracks connected stream clients.
#[derive(Debug)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    active: Arc<AtomicUsize>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Register a new client. The returned guard unregisters it on drop.
    pub fn register(&self) -> ClientGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(client = id, active, "client stream opened");
        ClientGuard {
            id,
            active: self.active.clone(),
        }
    }

    /// Number of currently connected clients.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Membership of one client in a [`ClientRegistry`].
#[derive(Debug)]
pub struct ClientGuard {
    id: u64,
    active: Arc<AtomicUsize>,
}

impl ClientGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let active = self.active.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        debug!(client = self.id, active, "client stream closed");
    }
}

struct ClientState {
    rx: watch::Receiver<Option<LatestFrame>>,
    cancel: CancellationToken,
    last_seq: u64,
    _guard: ClientGuard,
}

/// Per-client multipart body.
///
/// Yields the current frame right away (if one exists), then each newer
/// frame as it is published. Frames published while the client is still
/// sending the previous one are skipped, so a slow client never falls
/// behind by more than one frame. The stream ends when `cancel` fires or
/// the slot is dropped; dropping the stream releases `guard`.
pub fn client_stream(
    rx: watch::Receiver<Option<LatestFrame>>,
    guard: ClientGuard,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let state = ClientState {
        rx,
        cancel,
        last_seq: 0,
        _guard: guard,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            let current = state.rx.borrow_and_update().clone();
            if let Some(frame) = current {
                if frame.seq > state.last_seq {
                    state.last_seq = frame.seq;
                    return Some((Ok(frame.part), state));
                }
            }

            tokio::select! {
                _ = state.cancel.cancelled() => return None,
                changed = state.rx.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    })
}
