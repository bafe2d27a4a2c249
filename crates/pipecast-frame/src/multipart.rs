//! `multipart/x-mixed-replace` part framing.
//!
//! Wire format of one part:
//! ```text
//! --frame\r\n
//! Content-Type: image/jpeg\r\n
//! \r\n
//! <jpeg bytes>\r\n
//! ```
//! Parts carry no length header; a reader finds the end of a part at the next
//! boundary line. The header is built from [`BOUNDARY`] and
//! [`PART_CONTENT_TYPE`].

use bytes::{BufMut, BytesMut};

/// Boundary token between parts.
pub const BOUNDARY: &str = "frame";

/// Content type of the whole streaming response.
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Content type of each part.
pub const PART_CONTENT_TYPE: &str = "image/jpeg";

const CRLF: &[u8] = b"\r\n";

/// Append one part carrying `payload` to `dst`.
pub fn encode_part(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(header_len() + payload.len() + CRLF.len());
    dst.put_slice(b"--");
    dst.put_slice(BOUNDARY.as_bytes());
    dst.put_slice(CRLF);
    dst.put_slice(b"Content-Type: ");
    dst.put_slice(PART_CONTENT_TYPE.as_bytes());
    dst.put_slice(CRLF);
    dst.put_slice(CRLF);
    dst.put_slice(payload);
    dst.put_slice(CRLF);
}

fn header_len() -> usize {
    let boundary_line = 2 + BOUNDARY.len() + CRLF.len();
    let type_line = "Content-Type: ".len() + PART_CONTENT_TYPE.len() + CRLF.len();
    boundary_line + type_line + CRLF.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_layout_matches_wire_format() {
        let mut buf = BytesMut::new();
        encode_part(b"JPEG", &mut buf);
        assert_eq!(
            &buf[..],
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n".as_slice()
        );
        assert_eq!(buf.len(), header_len() + b"JPEG\r\n".len());
    }

    #[test]
    fn stream_content_type_names_the_boundary() {
        assert!(STREAM_CONTENT_TYPE.ends_with(&format!("boundary={BOUNDARY}")));
    }
}
