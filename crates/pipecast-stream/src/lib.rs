//! Live relay between the video/input pipes and HTTP clients.
//!
//! This is the "just works" layer. One background feed reads the video pipe,
//! renders each surviving frame once, and publishes it into a shared
//! latest-frame slot. Every HTTP client gets its own multipart stream over
//! that slot, and input events from WebSocket clients go back out through
//! the input pipe.

pub mod config;
pub mod error;
pub mod feed;
pub mod input;
pub mod mux;
pub mod server;
pub mod slot;

pub use config::{
    FeedConfig, InputConfig, RelayConfig, DEFAULT_BIND, DEFAULT_INPUT_PIPE, DEFAULT_PALETTE,
    DEFAULT_VIDEO_PIPE,
};
pub use error::{InputError, Result, StreamError};
pub use feed::{Feed, FeedMonitor, FeedState, FeedStats};
pub use input::{Delivery, InputEvent, InputMessage, InputRelay, InputStats, StateValue};
pub use mux::{client_stream, ClientGuard, ClientRegistry};
pub use server::{router, AppState, Relay};
pub use slot::{FrameSlot, LatestFrame};
