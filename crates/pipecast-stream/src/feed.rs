use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use pipecast_frame::{FrameCodec, FramePoll, FrameSource, RawFrame, SourceStats};
use pipecast_transport::{ensure_fifo, FifoReader, FifoWriter};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::error::{Result, StreamError};
use crate::slot::FrameSlot;

/// Connection state of the video pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    /// No pipe open; the FIFO is (re)created on the next step.
    Disconnected,
    /// Waiting for a producer to open the write end.
    Connecting,
    /// A producer is attached and frames are being read.
    Streaming,
}

/// Counters since the feed started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    pub frames_published: u64,
    pub frames_dropped: u64,
    pub invalid_reads: u64,
    pub encode_failures: u64,
    pub reconnects: u64,
}

#[derive(Debug, Default)]
struct FeedCounters {
    frames_published: AtomicU64,
    frames_dropped: AtomicU64,
    invalid_reads: AtomicU64,
    encode_failures: AtomicU64,
    reconnects: AtomicU64,
}

impl FeedCounters {
    fn snapshot(&self) -> FeedStats {
        FeedStats {
            frames_published: self.frames_published.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            invalid_reads: self.invalid_reads.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }

    fn absorb(&self, now: SourceStats, before: SourceStats) {
        self.frames_dropped
            .fetch_add(now.frames_dropped - before.frames_dropped, Ordering::Relaxed);
        self.invalid_reads
            .fetch_add(now.invalid_reads - before.invalid_reads, Ordering::Relaxed);
    }
}

/// Read-only view of a running feed.
#[derive(Clone)]
pub struct FeedMonitor {
    state: watch::Receiver<FeedState>,
    counters: Arc<FeedCounters>,
}

impl FeedMonitor {
    pub fn state(&self) -> FeedState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> FeedStats {
        self.counters.snapshot()
    }

    /// Resolve once the feed reaches `target`, or return `false` if the feed is gone.
    pub async fn wait_for(&mut self, target: FeedState) -> bool {
        self.state.wait_for(|state| *state == target).await.is_ok()
    }
}

/// Background reader that keeps the shared slot filled with the newest frame.
///
/// Runs on a dedicated thread: opening the pipe blocks until a producer
/// attaches, and steady-state reads wait at most `poll_timeout` so
/// cancellation is noticed promptly.
pub struct Feed {
    monitor: FeedMonitor,
    cancel: CancellationToken,
    video_pipe: std::path::PathBuf,
    thread: Option<JoinHandle<()>>,
}

impl Feed {
    /// Start the feed thread.
    pub fn spawn(
        config: FeedConfig,
        codec: FrameCodec,
        slot: FrameSlot,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let (state_tx, state_rx) = watch::channel(FeedState::Disconnected);
        let counters = Arc::new(FeedCounters::default());
        let video_pipe = config.video_pipe.clone();

        let worker = FeedWorker {
            config,
            codec,
            slot,
            cancel: cancel.clone(),
            state_tx,
            counters: counters.clone(),
        };
        let thread = std::thread::Builder::new()
            .name("pipecast-feed".to_string())
            .spawn(move || worker.run())
            .map_err(StreamError::Spawn)?;

        Ok(Self {
            monitor: FeedMonitor {
                state: state_rx,
                counters,
            },
            cancel,
            video_pipe,
            thread: Some(thread),
        })
    }

    pub fn monitor(&self) -> FeedMonitor {
        self.monitor.clone()
    }

    /// Stop the feed and wait up to `grace` for the thread to exit.
    ///
    /// Returns `false` if the thread was still running when the grace period
    /// ended; it is then left to finish on its own.
    pub fn shutdown(mut self, grace: Duration) -> bool {
        self.cancel.cancel();

        let Some(thread) = self.thread.take() else {
            return true;
        };
        let deadline = Instant::now() + grace;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                debug!("feed thread still running after shutdown grace; detaching");
                return false;
            }
            // A feed blocked in open() only returns once a writer appears, so
            // attach one briefly. Fails harmlessly when nobody is waiting.
            let _ = FifoWriter::try_open(&self.video_pipe);
            std::thread::sleep(Duration::from_millis(10));
        }
        let _ = thread.join();
        true
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct FeedWorker {
    config: FeedConfig,
    codec: FrameCodec,
    slot: FrameSlot,
    cancel: CancellationToken,
    state_tx: watch::Sender<FeedState>,
    counters: Arc<FeedCounters>,
}

impl FeedWorker {
    fn run(self) {
        let path = self.config.video_pipe.clone();
        let mut state = FeedState::Disconnected;
        let mut source: Option<FrameSource<FifoReader>> = None;
        let mut seen = SourceStats::default();

        while !self.cancel.is_cancelled() {
            self.state_tx.send_if_modified(|current| {
                let changed = *current != state;
                *current = state;
                changed
            });

            state = match state {
                FeedState::Disconnected => match ensure_fifo(&path, self.config.fifo_mode) {
                    Ok(_) => FeedState::Connecting,
                    Err(err) => {
                        warn!(?path, error = %err, "cannot create video pipe");
                        std::thread::sleep(self.config.reconnect_delay);
                        FeedState::Disconnected
                    }
                },
                FeedState::Connecting => {
                    info!(?path, "waiting for video producer");
                    match FrameSource::open(&path, self.config.fifo_mode) {
                        Ok(opened) => {
                            info!(?path, "video producer attached");
                            source = Some(opened);
                            seen = SourceStats::default();
                            FeedState::Streaming
                        }
                        Err(err) => {
                            warn!(?path, error = %err, "cannot open video pipe");
                            std::thread::sleep(self.config.reconnect_delay);
                            FeedState::Disconnected
                        }
                    }
                }
                FeedState::Streaming => {
                    let Some(reader) = source.as_mut() else {
                        state = FeedState::Disconnected;
                        continue;
                    };

                    let outcome = reader.poll_next_frame(self.config.poll_timeout);
                    let now = reader.stats();
                    self.counters.absorb(now, seen);
                    seen = now;

                    let keep = match outcome {
                        Ok(FramePoll::Frame(raw)) => {
                            self.publish(&raw);
                            true
                        }
                        Ok(FramePoll::NotReady) => {
                            if reader.is_detached() {
                                info!(?path, "video pipe removed or replaced; recreating");
                                false
                            } else {
                                true
                            }
                        }
                        Ok(FramePoll::Closed) => {
                            info!(?path, "video producer disconnected");
                            false
                        }
                        Err(err) => {
                            warn!(?path, error = %err, "video pipe read failed");
                            false
                        }
                    };

                    if keep {
                        FeedState::Streaming
                    } else {
                        source = None;
                        self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
                        FeedState::Disconnected
                    }
                }
            };
        }

        self.state_tx.send_replace(FeedState::Disconnected);
        debug!(?path, "feed stopped");
    }

    fn publish(&self, raw: &RawFrame) {
        match self.codec.render(raw) {
            Ok(jpeg) => {
                let seq = self.slot.publish(jpeg.into_bytes());
                self.counters.frames_published.fetch_add(1, Ordering::Relaxed);
                if seq == 1 {
                    info!("first frame published");
                }
            }
            Err(err) => {
                self.counters.encode_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "skipping frame that failed to encode");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use pipecast_frame::{CodecConfig, Palette, FRAME_LEN, PALETTE_SIZE};

    use super::*;

    fn unique_dir(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/pipecast-feed-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    fn codec() -> FrameCodec {
        let rows = vec![[10u16, 20, 30]; PALETTE_SIZE];
        let palette = Palette::from_rows(&rows).unwrap();
        FrameCodec::new(Arc::new(palette), CodecConfig::default()).unwrap()
    }

    fn config(path: PathBuf) -> FeedConfig {
        FeedConfig {
            video_pipe: path,
            poll_timeout: Duration::from_millis(20),
            reconnect_delay: Duration::from_millis(10),
            ..FeedConfig::default()
        }
    }

    fn write_frames(path: &std::path::Path, frames: &[u8]) {
        let mut writer = FifoWriter::open(path).unwrap();
        for index in frames {
            writer.write_all(&vec![*index; FRAME_LEN]).unwrap();
        }
    }

    async fn wait_for_seq(slot: &FrameSlot, seq: u64) -> crate::slot::LatestFrame {
        let mut rx = slot.subscribe();
        let found = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|latest| latest.as_ref().is_some_and(|f| f.seq >= seq)),
        )
        .await
        .expect("frame should be published in time")
        .expect("slot should stay open")
        .clone();
        found.expect("slot holds a frame")
    }

    #[tokio::test]
    async fn publishes_frames_and_reconnects_after_writer_leaves() {
        let dir = unique_dir("reconnect");
        let path = dir.join("video");
        let slot = FrameSlot::new();
        let feed = Feed::spawn(
            config(path.clone()),
            codec(),
            slot.clone(),
            CancellationToken::new(),
        )
        .unwrap();
        let mut monitor = feed.monitor();

        let first_path = path.clone();
        tokio::task::spawn_blocking(move || write_frames(&first_path, &[1]))
            .await
            .unwrap();
        let first = wait_for_seq(&slot, 1).await;
        assert_eq!(&first.jpeg[..2], &[0xFF, 0xD8]);

        let second_path = path.clone();
        tokio::task::spawn_blocking(move || write_frames(&second_path, &[2]))
            .await
            .unwrap();
        let second = wait_for_seq(&slot, 2).await;
        assert!(second.seq > first.seq);

        assert!(monitor.stats().frames_published >= 2);
        assert!(monitor.stats().reconnects >= 1);
        assert!(tokio::time::timeout(
            Duration::from_secs(5),
            monitor.wait_for(FeedState::Connecting)
        )
        .await
        .unwrap_or(false));

        assert!(feed.shutdown(Duration::from_secs(2)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn recreates_pipe_that_was_removed() {
        let dir = unique_dir("recreate");
        let path = dir.join("video");
        let slot = FrameSlot::new();
        let feed = Feed::spawn(
            config(path.clone()),
            codec(),
            slot.clone(),
            CancellationToken::new(),
        )
        .unwrap();
        let mut monitor = feed.monitor();

        // Attach a writer that stays open, then delete the FIFO under it.
        let hold_path = path.clone();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder = std::thread::spawn(move || {
            let _writer = FifoWriter::open(&hold_path).unwrap();
            let _ = release_rx.recv();
        });
        assert!(tokio::time::timeout(
            Duration::from_secs(5),
            monitor.wait_for(FeedState::Streaming)
        )
        .await
        .unwrap_or(false));

        std::fs::remove_file(&path).unwrap();
        assert!(tokio::time::timeout(
            Duration::from_secs(5),
            monitor.wait_for(FeedState::Connecting)
        )
        .await
        .unwrap_or(false));
        assert!(path.exists(), "feed should recreate the fifo");

        let _ = release_tx.send(());
        holder.join().unwrap();

        let write_path = path.clone();
        tokio::task::spawn_blocking(move || write_frames(&write_path, &[3]))
            .await
            .unwrap();
        wait_for_seq(&slot, 1).await;

        assert!(feed.shutdown(Duration::from_secs(2)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn shutdown_unblocks_a_feed_waiting_for_a_producer() {
        let dir = unique_dir("shutdown");
        let path = dir.join("video");
        let feed = Feed::spawn(
            config(path.clone()),
            codec(),
            FrameSlot::new(),
            CancellationToken::new(),
        )
        .unwrap();
        let mut monitor = feed.monitor();
        assert!(tokio::time::timeout(
            Duration::from_secs(5),
            monitor.wait_for(FeedState::Connecting)
        )
        .await
        .unwrap_or(false));
        // Give the worker a moment to enter the blocking open.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stopped = tokio::task::spawn_blocking(move || feed.shutdown(Duration::from_secs(2)))
            .await
            .unwrap();
        assert!(stopped);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
