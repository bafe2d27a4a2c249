use std::sync::Arc;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::error::CodecError;
use crate::palette::Palette;
use crate::source::{RawFrame, HEIGHT, WIDTH};

/// Default JPEG quality on a 1-100 scale.
pub const DEFAULT_QUALITY: u8 = 80;

/// Byte order of each pixel in a [`ColorFrame`].
///
/// The JPEG encoder always interprets pixels as RGB. `Bgr` writes the palette
/// channels reversed, which corrects a palette table stored blue-first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

impl ChannelOrder {
    #[inline]
    fn arrange(self, [r, g, b]: [u8; 3]) -> [u8; 3] {
        match self {
            ChannelOrder::Rgb => [r, g, b],
            ChannelOrder::Bgr => [b, g, r],
        }
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// JPEG quality, 1-100. Default: 80.
    pub quality: u8,
    /// Pixel channel order handed to the encoder. Default: RGB.
    pub channel_order: ChannelOrder,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            channel_order: ChannelOrder::Rgb,
        }
    }
}

impl CodecConfig {
    /// Reject settings the encoder cannot honour.
    pub fn validate(&self) -> Result<(), CodecError> {
        if !(1..=100).contains(&self.quality) {
            return Err(CodecError::InvalidQuality(self.quality));
        }
        Ok(())
    }
}

/// A frame of packed 3-byte pixels, row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct ColorFrame {
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Vec<u8>,
}

impl ColorFrame {
    /// Assemble a frame from parts. Dimensions are checked at encode time.
    pub fn from_raw_parts(width: u32, height: u32, order: ChannelOrder, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            order,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    /// Packed pixel bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The three channel bytes at `(x, y)`, in this frame's channel order.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        let px = self.data.get(offset..offset + 3)?;
        Some([px[0], px[1], px[2]])
    }
}

impl std::fmt::Debug for ColorFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColorFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("order", &self.order)
            .field("len", &self.data.len())
            .finish()
    }
}

/// A compressed JPEG image.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    bytes: Bytes,
}

impl EncodedFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for EncodedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedFrame")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Expand palette indices into packed color pixels.
pub fn decode(raw: &RawFrame, palette: &Palette, order: ChannelOrder) -> ColorFrame {
    let indices = raw.indices();
    let mut data = Vec::with_capacity(indices.len() * 3);
    for &index in indices {
        data.extend_from_slice(&order.arrange(palette.color(index)));
    }
    ColorFrame::from_raw_parts(WIDTH as u32, HEIGHT as u32, order, data)
}

/// Compress a color frame to JPEG.
pub fn encode(frame: &ColorFrame, quality: u8) -> Result<EncodedFrame, CodecError> {
    if !(1..=100).contains(&quality) {
        return Err(CodecError::InvalidQuality(quality));
    }

    let expected = frame.width as usize * frame.height as usize * 3;
    if frame.width == 0 || frame.height == 0 || frame.data.len() != expected {
        return Err(CodecError::Dimensions {
            width: frame.width,
            height: frame.height,
            len: frame.data.len(),
            expected,
        });
    }

    let mut out = Vec::with_capacity(expected / 8);
    JpegEncoder::new_with_quality(&mut out, quality).encode(
        &frame.data,
        frame.width,
        frame.height,
        ExtendedColorType::Rgb8,
    )?;

    Ok(EncodedFrame {
        bytes: Bytes::from(out),
    })
}

/// Palette-bound decode + encode pipeline.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    palette: Arc<Palette>,
    config: CodecConfig,
}

impl FrameCodec {
    pub fn new(palette: Arc<Palette>, config: CodecConfig) -> Result<Self, CodecError> {
        config.validate()?;
        Ok(Self { palette, config })
    }

    /// Decode a raw frame with the bound palette and compress it.
    pub fn render(&self, raw: &RawFrame) -> Result<EncodedFrame, CodecError> {
        let color = decode(raw, &self.palette, self.config.channel_order);
        encode(&color, self.config.quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::PALETTE_SIZE;

    fn test_palette() -> Palette {
        let rows: Vec<[u16; 3]> = (0..PALETTE_SIZE)
            .map(|i| match i {
                0 => [200, 40, 10],
                1 => [0, 0, 255],
                _ => [i as u16, i as u16, i as u16],
            })
            .collect();
        Palette::from_rows(&rows).unwrap()
    }

    #[test]
    fn all_zero_frame_decodes_to_palette_entry_zero() {
        let palette = test_palette();
        let color = decode(&RawFrame::filled(0), &palette, ChannelOrder::Rgb);

        assert_eq!(color.width(), WIDTH as u32);
        assert_eq!(color.height(), HEIGHT as u32);
        assert_eq!(color.as_bytes().len(), WIDTH * HEIGHT * 3);
        for px in color.as_bytes().chunks_exact(3) {
            assert_eq!(px, &palette.color(0));
        }
    }

    #[test]
    fn bgr_order_reverses_channels() {
        let palette = test_palette();
        let rgb = decode(&RawFrame::filled(0), &palette, ChannelOrder::Rgb);
        let bgr = decode(&RawFrame::filled(0), &palette, ChannelOrder::Bgr);

        assert_eq!(rgb.pixel(0, 0), Some([200, 40, 10]));
        assert_eq!(bgr.pixel(0, 0), Some([10, 40, 200]));
        assert_eq!(bgr.order(), ChannelOrder::Bgr);
    }

    #[test]
    fn decode_maps_each_pixel_independently() {
        let palette = test_palette();
        let mut indices = vec![0u8; WIDTH * HEIGHT];
        indices[WIDTH + 2] = 1;
        let raw = RawFrame::new(indices).unwrap();
        let color = decode(&raw, &palette, ChannelOrder::Rgb);

        assert_eq!(color.pixel(2, 1), Some([0, 0, 255]));
        assert_eq!(color.pixel(1, 1), Some([200, 40, 10]));
        assert_eq!(color.pixel(WIDTH as u32, 0), None);
    }

    #[test]
    fn encode_produces_jpeg_that_decodes_back_to_the_same_color() {
        let palette = test_palette();
        let color = decode(&RawFrame::filled(0), &palette, ChannelOrder::Rgb);
        let jpeg = encode(&color, DEFAULT_QUALITY).unwrap();

        let bytes = jpeg.as_bytes();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8], "JPEG SOI marker");
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9], "JPEG EOI marker");

        let back = image::load_from_memory(bytes).unwrap().to_rgb8();
        assert_eq!(back.dimensions(), (WIDTH as u32, HEIGHT as u32));
        let expected = palette.color(0);
        for (x, y) in [(0, 0), (160, 100), (319, 199)] {
            let px = back.get_pixel(x, y).0;
            for channel in 0..3 {
                let diff = (px[channel] as i16 - expected[channel] as i16).abs();
                assert!(diff <= 8, "pixel ({x},{y}) channel {channel}: {px:?} vs {expected:?}");
            }
        }
    }

    #[test]
    fn encode_rejects_mismatched_dimensions() {
        let frame = ColorFrame::from_raw_parts(10, 10, ChannelOrder::Rgb, vec![0; 10 * 10 * 3 - 1]);
        assert!(matches!(
            encode(&frame, DEFAULT_QUALITY),
            Err(CodecError::Dimensions { expected: 300, len: 299, .. })
        ));

        let empty = ColorFrame::from_raw_parts(0, 10, ChannelOrder::Rgb, Vec::new());
        assert!(matches!(
            encode(&empty, DEFAULT_QUALITY),
            Err(CodecError::Dimensions { .. })
        ));
    }

    #[test]
    fn quality_must_be_in_range() {
        let frame = ColorFrame::from_raw_parts(2, 2, ChannelOrder::Rgb, vec![0; 12]);
        assert!(matches!(encode(&frame, 0), Err(CodecError::InvalidQuality(0))));
        assert!(matches!(encode(&frame, 101), Err(CodecError::InvalidQuality(101))));
        assert!(encode(&frame, 1).is_ok());
        assert!(encode(&frame, 100).is_ok());

        let config = CodecConfig {
            quality: 0,
            ..CodecConfig::default()
        };
        assert!(FrameCodec::new(Arc::new(test_palette()), config).is_err());
    }

    #[test]
    fn frame_codec_renders_with_bound_palette() {
        let codec = FrameCodec::new(Arc::new(test_palette()), CodecConfig::default()).unwrap();
        let jpeg = codec.render(&RawFrame::filled(1)).unwrap();
        assert!(!jpeg.is_empty());
    }
}
