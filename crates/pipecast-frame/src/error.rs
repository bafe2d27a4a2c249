use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur while loading a palette.
#[derive(Debug, thiserror::Error)]
pub enum PaletteError {
    /// The palette file did not appear within the allowed wait.
    #[error("palette unavailable at {path} (waited {waited:?})")]
    Unavailable { path: PathBuf, waited: Duration },

    /// The palette file exists but could not be read.
    #[error("failed to read palette {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A row could not be parsed as three channel values.
    #[error("malformed palette row {line}: {reason}")]
    Malformed { line: usize, reason: String },

    /// The table does not have exactly 256 rows.
    #[error("palette has {0} entries (expected 256)")]
    WrongSize(usize),
}

/// Errors that can occur while converting or compressing a frame.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Pixel buffer length does not match the declared dimensions.
    #[error("color frame has {len} bytes, expected {expected} for {width}x{height}")]
    Dimensions {
        width: u32,
        height: u32,
        len: usize,
        expected: usize,
    },

    /// JPEG quality outside 1..=100.
    #[error("jpeg quality {0} out of range (1-100)")]
    InvalidQuality(u8),

    /// The JPEG encoder rejected the frame.
    #[error("jpeg encode failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Errors that can occur while reading frames from the video pipe.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A read produced a frame of the wrong size.
    #[error("invalid frame length ({len} bytes, expected {expected})")]
    InvalidLength { len: usize, expected: usize },

    /// An I/O error occurred while draining the pipe.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The pipe could not be created or opened.
    #[error("transport error: {0}")]
    Transport(#[from] pipecast_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
