//! Indexed video frames: from pipe bytes to multipart JPEG parts.
//!
//! This is the core value-add layer of pipecast. A frame travels through:
//! - [`FrameSource`]: drains the video pipe and surfaces only the newest
//!   complete `WIDTH * HEIGHT` frame (latest-frame-wins)
//! - [`decode`]: palette lookup, one RGB triple per index
//! - [`encode`]: lossy JPEG compression at a fixed quality
//! - [`encode_part`]: one `multipart/x-mixed-replace` part per frame
//!
//! The [`Palette`] is loaded once, normalized once, and shared read-only.

pub mod codec;
pub mod error;
pub mod multipart;
pub mod palette;
pub mod source;

pub use codec::{
    decode, encode, ChannelOrder, CodecConfig, ColorFrame, EncodedFrame, FrameCodec,
    DEFAULT_QUALITY,
};
pub use error::{CodecError, FrameError, PaletteError, Result};
pub use multipart::{encode_part, BOUNDARY, PART_CONTENT_TYPE, STREAM_CONTENT_TYPE};
pub use palette::{Palette, PaletteConfig, PALETTE_SIZE};
pub use source::{FramePoll, FrameSource, RawFrame, SourceStats, FRAME_LEN, HEIGHT, WIDTH};
