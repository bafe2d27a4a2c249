use std::net::SocketAddr;

/// Errors that can occur while running the relay.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Pipe-level error.
    #[error("transport error: {0}")]
    Transport(#[from] pipecast_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] pipecast_frame::FrameError),

    /// Codec configuration or encode error.
    #[error("codec error: {0}")]
    Codec(#[from] pipecast_frame::CodecError),

    /// Palette could not be loaded.
    #[error("palette error: {0}")]
    Palette(#[from] pipecast_frame::PaletteError),

    /// Invalid relay configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Failed to bind the HTTP listener.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The HTTP server stopped with an error.
    #[error("server error: {0}")]
    Serve(std::io::Error),

    /// The feed thread could not be started.
    #[error("failed to spawn feed thread: {0}")]
    Spawn(std::io::Error),
}

/// Reasons an input message is rejected before reaching the input pipe.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// A required field is absent or empty.
    #[error("missing or empty field: {0}")]
    MissingField(&'static str),

    /// A field contains a line break, which would split the event line.
    #[error("field {0} contains a line break")]
    LineBreak(&'static str),

    /// The serialized line does not fit in one atomic pipe write.
    #[error("event line too long ({len} bytes, max {max})")]
    TooLong { len: usize, max: usize },

    /// The message is not valid JSON of the expected shape.
    #[error("invalid input message: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;
