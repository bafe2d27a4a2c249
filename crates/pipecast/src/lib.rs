//! Relay a raw indexed-color video pipe to browsers, and browser input back.
//!
//! An external process writes fixed-size 320x200 palette-index frames into a
//! named pipe. pipecast colors them with the producer's palette, encodes them
//! as JPEG and serves them to any number of HTTP clients as a
//! `multipart/x-mixed-replace` stream. Input events from browser clients go
//! back to the producer as `action:state` lines on a second pipe.
//!
//! # Crate Structure
//!
//! - [`transport`]: FIFO creation and non-blocking pipe endpoints
//! - [`frame`]: palette, raw frame source, color decode and JPEG encode
//! - [`stream`]: background feed, per-client streams, input relay, HTTP server

/// Re-export transport types.
pub mod transport {
    pub use pipecast_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pipecast_frame::*;
}

/// Re-export relay types.
pub mod stream {
    pub use pipecast_stream::*;
}
