use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use pipecast_frame::{CodecConfig, PaletteConfig};
use pipecast_transport::DEFAULT_FIFO_MODE;

use crate::error::{Result, StreamError};

/// Video pipe written by the producer.
pub const DEFAULT_VIDEO_PIPE: &str = "/tmp/doom_pipe";
/// Input pipe read by the producer.
pub const DEFAULT_INPUT_PIPE: &str = "/tmp/doom_input";
/// Palette table written by the producer at startup.
pub const DEFAULT_PALETTE: &str = "/tmp/doom_palette.txt";
/// HTTP listen address.
pub const DEFAULT_BIND: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 5000));

/// Configuration for the background video feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Path of the video FIFO. Created if absent.
    pub video_pipe: PathBuf,
    /// Readiness wait per poll. Default: 100 ms.
    pub poll_timeout: Duration,
    /// Mode for a newly created FIFO.
    pub fifo_mode: u32,
    /// Pause before retrying after the pipe could not be created or opened.
    pub reconnect_delay: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            video_pipe: PathBuf::from(DEFAULT_VIDEO_PIPE),
            poll_timeout: Duration::from_millis(100),
            fifo_mode: DEFAULT_FIFO_MODE,
            reconnect_delay: Duration::from_millis(250),
        }
    }
}

/// Configuration for the input relay.
#[derive(Debug, Clone)]
pub struct InputConfig {
    /// Path of the input FIFO. Created if absent.
    pub input_pipe: PathBuf,
    /// Mode for a newly created FIFO.
    pub fifo_mode: u32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            input_pipe: PathBuf::from(DEFAULT_INPUT_PIPE),
            fifo_mode: DEFAULT_FIFO_MODE,
        }
    }
}

/// Top-level relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind: SocketAddr,
    /// Route of the multipart video stream.
    pub stream_path: String,
    /// Route of the input WebSocket.
    pub input_path: String,
    /// Optional directory of static client assets served at `/`.
    pub static_dir: Option<PathBuf>,
    pub palette_path: PathBuf,
    pub palette: PaletteConfig,
    pub codec: CodecConfig,
    pub feed: FeedConfig,
    pub input: InputConfig,
    /// How long shutdown waits for the feed thread to stop.
    pub shutdown_grace: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND,
            stream_path: "/stream".to_string(),
            input_path: "/ws".to_string(),
            static_dir: None,
            palette_path: PathBuf::from(DEFAULT_PALETTE),
            palette: PaletteConfig::default(),
            codec: CodecConfig::default(),
            feed: FeedConfig::default(),
            input: InputConfig::default(),
            shutdown_grace: Duration::from_secs(1),
        }
    }
}

impl RelayConfig {
    /// Check route shapes and codec settings before anything starts.
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("stream path", &self.stream_path),
            ("input path", &self.input_path),
        ] {
            if !path.starts_with('/') || path.len() < 2 {
                return Err(StreamError::Config(format!(
                    "{name} must start with '/' and name a route: {path:?}"
                )));
            }
        }
        if self.stream_path == self.input_path {
            return Err(StreamError::Config(
                "stream path and input path must differ".to_string(),
            ));
        }
        for reserved in ["/health", "/input"] {
            if self.stream_path == reserved || self.input_path == reserved {
                return Err(StreamError::Config(format!("{reserved} is a built-in route")));
            }
        }
        if self.feed.poll_timeout.is_zero() {
            return Err(StreamError::Config(
                "poll timeout must be greater than zero".to_string(),
            ));
        }
        self.codec.validate()?;
        Ok(())
    }
}
