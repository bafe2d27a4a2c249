use std::path::PathBuf;

/// Errors that can occur in FIFO transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to create the FIFO special file.
    #[error("failed to create fifo {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The path exists but is not a FIFO.
    #[error("existing path is not a fifo: {path}")]
    NotFifo { path: PathBuf },

    /// Failed to open the FIFO.
    #[error("failed to open fifo {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A non-blocking open for writing found no process reading the FIFO.
    #[error("no reader attached to fifo {path}")]
    NoReader { path: PathBuf },

    /// The FIFO buffer is full and a non-blocking write could not proceed.
    #[error("fifo {path} is full")]
    PipeFull { path: PathBuf },

    /// An atomic write was requested for more than `PIPE_BUF` bytes.
    #[error("write too large for an atomic fifo write ({len} bytes, max {max})")]
    WriteTooLarge { len: usize, max: usize },

    /// An I/O error occurred on an open FIFO.
    #[error("fifo I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
