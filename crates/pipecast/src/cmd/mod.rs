use clap::{Args, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use pipecast_frame::ChannelOrder;
use pipecast_stream::{DEFAULT_BIND, DEFAULT_INPUT_PIPE, DEFAULT_PALETTE, DEFAULT_VIDEO_PIPE};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod doctor;
pub mod feed;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay: serve the video pipe as MJPEG and forward input.
    Serve(ServeArgs),
    /// Write generated or recorded frames into a video pipe.
    Feed(FeedArgs),
    /// Write one input event line into an input pipe.
    Send(SendArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Feed(args) => feed::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Doctor(args) => doctor::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ChannelOrderArg {
    #[default]
    Rgb,
    Bgr,
}

impl From<ChannelOrderArg> for ChannelOrder {
    fn from(value: ChannelOrderArg) -> Self {
        match value {
            ChannelOrderArg::Rgb => ChannelOrder::Rgb,
            ChannelOrderArg::Bgr => ChannelOrder::Bgr,
        }
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "PIPECAST_BIND", default_value_t = DEFAULT_BIND)]
    pub bind: SocketAddr,
    /// Video FIFO written by the producer (created if absent).
    #[arg(long, env = "PIPECAST_VIDEO_PIPE", default_value = DEFAULT_VIDEO_PIPE)]
    pub video_pipe: PathBuf,
    /// Input FIFO read by the producer (created if absent).
    #[arg(long, env = "PIPECAST_INPUT_PIPE", default_value = DEFAULT_INPUT_PIPE)]
    pub input_pipe: PathBuf,
    /// Palette table written by the producer.
    #[arg(long, env = "PIPECAST_PALETTE", default_value = DEFAULT_PALETTE)]
    pub palette: PathBuf,
    /// How long to wait for the palette before giving up (e.g. 30s, 500ms).
    #[arg(long, default_value = "30s")]
    pub palette_timeout: String,
    /// JPEG quality (1-100).
    #[arg(long, env = "PIPECAST_QUALITY", default_value_t = pipecast_frame::DEFAULT_QUALITY,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: u8,
    /// Channel order of the palette entries.
    #[arg(long, value_enum, default_value_t = ChannelOrderArg::Rgb)]
    pub channel_order: ChannelOrderArg,
    /// Directory of static client assets served at `/`.
    #[arg(long, env = "PIPECAST_STATIC_DIR", value_name = "DIR")]
    pub static_dir: Option<PathBuf>,
    /// Route of the multipart video stream.
    #[arg(long, default_value = "/stream")]
    pub stream_path: String,
    /// Route of the input WebSocket.
    #[arg(long, default_value = "/ws")]
    pub input_path: String,
    /// Maximum wait per video pipe poll (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub poll_timeout: String,
}

#[derive(Args, Debug)]
pub struct FeedArgs {
    /// Video FIFO to write into (created if absent).
    pub pipe: PathBuf,
    /// Generated frame pattern: `solid:<index>` or `gradient`.
    #[arg(long, default_value = "gradient", conflicts_with = "file")]
    pub pattern: String,
    /// Raw frame file (a whole number of 64000-byte frames).
    #[arg(long, conflicts_with = "pattern")]
    pub file: Option<PathBuf>,
    /// Number of generated frames to write.
    #[arg(long, default_value_t = 1)]
    pub count: usize,
    /// Delay between frames (e.g. 33ms).
    #[arg(long)]
    pub interval: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Input FIFO to write into.
    pub pipe: PathBuf,
    /// Event action (e.g. `up`).
    #[arg(long)]
    pub action: String,
    /// Event state (e.g. `pressed`).
    #[arg(long)]
    pub state: String,
    /// Keep retrying until a reader is attached, for at most this long (e.g. 5s).
    #[arg(long)]
    pub wait: Option<String>,
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Palette table to validate.
    #[arg(long, env = "PIPECAST_PALETTE", default_value = DEFAULT_PALETTE)]
    pub palette: PathBuf,
    /// Video FIFO path to inspect.
    #[arg(long, env = "PIPECAST_VIDEO_PIPE", default_value = DEFAULT_VIDEO_PIPE)]
    pub video_pipe: PathBuf,
    /// Input FIFO path to inspect.
    #[arg(long, env = "PIPECAST_INPUT_PIPE", default_value = DEFAULT_INPUT_PIPE)]
    pub input_pipe: PathBuf,
    /// Listen address to probe.
    #[arg(long, env = "PIPECAST_BIND", default_value_t = DEFAULT_BIND)]
    pub bind: SocketAddr,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
