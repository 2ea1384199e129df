//! Frame encoding and decoding.
//!
//! One frame carries exactly one encoded [`Message`]. Frames are
//! length-prefixed, so a receiver can recover frame boundaries from an
//! accumulation buffer alone, with no sentinel bytes and no knowledge of
//! how the transport split the stream.
//!
//! Frame layout (all integers little-endian):
//!
//! ```text
//! +----------------+---------------+-------------------------------+
//! | Payload length | Field count   | Fields                        |
//! | 2 bytes (LE16) | 2 bytes (LE16)| variable                      |
//! +----------------+---------------+-------------------------------+
//! ```
//!
//! The payload length counts every byte after the prefix. Each field is:
//!
//! ```text
//! +----------------+-----------+-------+------------------------+
//! | Key length     | Key bytes | Tag   | Value body             |
//! | 2 bytes (LE16) | UTF-8     | 1 byte| tag-dependent          |
//! +----------------+-----------+-------+------------------------+
//! ```
//!
//! Value bodies: `Bool` is one byte, `Int` is an LE i64, `Float` is the
//! LE bit pattern of an f64, `Text` and `Bytes` are an LE16 length
//! followed by that many bytes.

use thiserror::Error;

use super::message::{Message, Value};

/// Frame layout sizes.
pub mod sizes {
    /// Frame length prefix (u16, little-endian).
    pub const FRAME_HEADER_SIZE: usize = 2;
    /// Field count header at the start of the payload (u16, little-endian).
    pub const FIELD_COUNT_SIZE: usize = 2;
    /// Smallest well-formed frame: a prefix and an empty field table.
    pub const MIN_FRAME_SIZE: usize = FRAME_HEADER_SIZE + FIELD_COUNT_SIZE;
    /// Largest frame the length prefix can describe.
    pub const MAX_FRAME_SIZE: usize = FRAME_HEADER_SIZE + u16::MAX as usize;
    /// Default frame cap, shared by the encoder and the inbound buffer.
    pub const DEFAULT_MAX_FRAME: usize = 1024;
}

/// Wire tags for [`Value`] variants.
mod tag {
    pub const BOOL: u8 = 0x01;
    pub const INT: u8 = 0x02;
    pub const FLOAT: u8 = 0x03;
    pub const TEXT: u8 = 0x04;
    pub const BYTES: u8 = 0x05;
}

/// Errors from frame encoding and decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Encoded frame, or one advertised by a length prefix, exceeds the cap.
    #[error("frame too large: {size} bytes exceeds cap of {max}")]
    TooLarge {
        /// Size the frame would occupy on the wire.
        size: usize,
        /// Cap it was checked against.
        max: usize,
    },

    /// Payload ended before the data its headers announced.
    #[error("frame truncated: expected {expected} more bytes, found {actual}")]
    Truncated {
        /// Bytes the current header still called for.
        expected: usize,
        /// Bytes actually left in the payload.
        actual: usize,
    },

    /// Unknown value tag byte.
    #[error("invalid value tag 0x{0:02x}")]
    InvalidTag(u8),

    /// A key or text value was not valid UTF-8.
    #[error("key or text value is not valid UTF-8")]
    InvalidUtf8,

    /// Payload bytes left over after the final field.
    #[error("{0} trailing bytes after the final field")]
    TrailingBytes(usize),

    /// Decoder was fed past its buffer bound.
    #[error("decoder overflow: pushed {pushed} bytes with {capacity} free")]
    Overflow {
        /// Bytes the caller tried to push.
        pushed: usize,
        /// Free space that was left in the buffer.
        capacity: usize,
    },
}

/// Encode one message into a self-delimited frame.
///
/// The whole frame, prefix included, must fit within `max_frame`; an
/// oversized message fails with [`FrameError::TooLarge`] and produces no
/// bytes. Caps above [`sizes::MAX_FRAME_SIZE`] are treated as that limit,
/// since the length prefix cannot describe more.
pub fn encode(message: &Message, max_frame: usize) -> Result<Vec<u8>, FrameError> {
    let max_frame = max_frame.min(sizes::MAX_FRAME_SIZE);

    let mut payload = Vec::with_capacity(sizes::FIELD_COUNT_SIZE);
    push_len(&mut payload, message.len())?;
    for (key, value) in message.iter() {
        push_len(&mut payload, key.len())?;
        payload.extend_from_slice(key.as_bytes());
        match value {
            Value::Bool(b) => {
                payload.push(tag::BOOL);
                payload.push(u8::from(*b));
            }
            Value::Int(n) => {
                payload.push(tag::INT);
                payload.extend_from_slice(&n.to_le_bytes());
            }
            Value::Float(x) => {
                payload.push(tag::FLOAT);
                payload.extend_from_slice(&x.to_le_bytes());
            }
            Value::Text(s) => {
                payload.push(tag::TEXT);
                push_len(&mut payload, s.len())?;
                payload.extend_from_slice(s.as_bytes());
            }
            Value::Bytes(b) => {
                payload.push(tag::BYTES);
                push_len(&mut payload, b.len())?;
                payload.extend_from_slice(b);
            }
        }
    }

    let total = sizes::FRAME_HEADER_SIZE + payload.len();
    if total > max_frame {
        return Err(FrameError::TooLarge {
            size: total,
            max: max_frame,
        });
    }

    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode one complete frame from the front of `buf`.
///
/// Returns `Ok(None)` while `buf` holds only part of a frame. On success
/// the `usize` is the number of bytes the frame occupied, so the caller
/// can drain them and retry on the remainder.
pub fn decode(buf: &[u8], max_frame: usize) -> Result<Option<(Message, usize)>, FrameError> {
    if buf.len() < sizes::FRAME_HEADER_SIZE {
        return Ok(None);
    }
    let payload_len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
    let total = sizes::FRAME_HEADER_SIZE + payload_len;
    if total > max_frame {
        // Reject from the prefix alone, before the rest of the frame
        // arrives.
        return Err(FrameError::TooLarge {
            size: total,
            max: max_frame,
        });
    }
    if buf.len() < total {
        return Ok(None);
    }
    let message = decode_payload(&buf[sizes::FRAME_HEADER_SIZE..total])?;
    Ok(Some((message, total)))
}

/// Streaming decoder that turns arbitrarily split inbound bytes into
/// complete messages.
///
/// The accumulation buffer is bounded at the frame cap. A buffer that
/// fills up always holds either a complete frame or an oversized prefix,
/// so [`FrameDecoder::next_message`] can never get stuck: draining after
/// each push always frees space or surfaces an error.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame: usize,
}

impl FrameDecoder {
    /// Create a decoder with the given frame cap.
    pub fn new(max_frame: usize) -> Self {
        let max_frame = max_frame.min(sizes::MAX_FRAME_SIZE);
        Self {
            buffer: Vec::with_capacity(max_frame),
            max_frame,
        }
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Free space left before the buffer bound.
    pub fn capacity_left(&self) -> usize {
        self.max_frame.saturating_sub(self.buffer.len())
    }

    /// Append received bytes to the buffer.
    pub fn push(&mut self, data: &[u8]) -> Result<(), FrameError> {
        let free = self.capacity_left();
        if data.len() > free {
            return Err(FrameError::Overflow {
                pushed: data.len(),
                capacity: free,
            });
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Drain one complete message off the front of the buffer, if present.
    pub fn next_message(&mut self) -> Result<Option<Message>, FrameError> {
        match decode(&self.buffer, self.max_frame)? {
            Some((message, consumed)) => {
                self.buffer.drain(..consumed);
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }
}

/// Write a length that must fit the wire's u16 fields.
fn push_len(buf: &mut Vec<u8>, len: usize) -> Result<(), FrameError> {
    let len = u16::try_from(len).map_err(|_| FrameError::TooLarge {
        size: len,
        max: u16::MAX as usize,
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn decode_payload(data: &[u8]) -> Result<Message, FrameError> {
    let mut pos = 0;
    let count = take_u16(data, &mut pos)? as usize;

    let mut message = Message::new();
    for _ in 0..count {
        let key_len = take_u16(data, &mut pos)? as usize;
        let key = std::str::from_utf8(take(data, &mut pos, key_len)?)
            .map_err(|_| FrameError::InvalidUtf8)?
            .to_owned();
        let value = match take(data, &mut pos, 1)?[0] {
            tag::BOOL => Value::Bool(take(data, &mut pos, 1)?[0] != 0),
            tag::INT => {
                let bytes = take(data, &mut pos, 8)?;
                Value::Int(i64::from_le_bytes(bytes.try_into().unwrap()))
            }
            tag::FLOAT => {
                let bytes = take(data, &mut pos, 8)?;
                Value::Float(f64::from_le_bytes(bytes.try_into().unwrap()))
            }
            tag::TEXT => {
                let len = take_u16(data, &mut pos)? as usize;
                let text = std::str::from_utf8(take(data, &mut pos, len)?)
                    .map_err(|_| FrameError::InvalidUtf8)?
                    .to_owned();
                Value::Text(text)
            }
            tag::BYTES => {
                let len = take_u16(data, &mut pos)? as usize;
                Value::Bytes(take(data, &mut pos, len)?.to_vec())
            }
            other => return Err(FrameError::InvalidTag(other)),
        };
        message.push_field(key, value);
    }

    if pos != data.len() {
        return Err(FrameError::TrailingBytes(data.len() - pos));
    }
    Ok(message)
}

fn take<'a>(data: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], FrameError> {
    let remaining = data.len() - *pos;
    if remaining < n {
        return Err(FrameError::Truncated {
            expected: n,
            actual: remaining,
        });
    }
    let slice = &data[*pos..*pos + n];
    *pos += n;
    Ok(slice)
}

fn take_u16(data: &[u8], pos: &mut usize) -> Result<u16, FrameError> {
    let bytes = take(data, pos, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> Message {
        Message::new()
            .with("op", "ping")
            .with("seq", 42)
            .with("ratio", 0.25)
            .with("urgent", true)
            .with("blob", vec![0xDEu8, 0xAD, 0xBE, 0xEF])
    }

    #[test]
    fn test_roundtrip_mixed_values() {
        let msg = sample_message();
        let frame = encode(&msg, sizes::DEFAULT_MAX_FRAME).unwrap();
        let (decoded, consumed) = decode(&frame, sizes::DEFAULT_MAX_FRAME)
            .unwrap()
            .unwrap();

        assert_eq!(decoded, msg);
        assert_eq!(consumed, frame.len());
    }

    #[test]
    fn test_roundtrip_empty_message() {
        let msg = Message::new();
        let frame = encode(&msg, sizes::DEFAULT_MAX_FRAME).unwrap();

        assert_eq!(frame.len(), sizes::MIN_FRAME_SIZE);
        let (decoded, consumed) = decode(&frame, sizes::DEFAULT_MAX_FRAME)
            .unwrap()
            .unwrap();
        assert!(decoded.is_empty());
        assert_eq!(consumed, sizes::MIN_FRAME_SIZE);
    }

    #[test]
    fn test_decode_incomplete_returns_none() {
        let frame = encode(&sample_message(), sizes::DEFAULT_MAX_FRAME).unwrap();

        assert_eq!(decode(&[], sizes::DEFAULT_MAX_FRAME).unwrap(), None);
        assert_eq!(decode(&frame[..1], sizes::DEFAULT_MAX_FRAME).unwrap(), None);
        assert_eq!(
            decode(&frame[..frame.len() - 1], sizes::DEFAULT_MAX_FRAME).unwrap(),
            None
        );
    }

    #[test]
    fn test_decode_consumes_one_frame_at_a_time() {
        let first = Message::new().with("n", 1);
        let second = Message::new().with("n", 2);

        let mut buf = encode(&first, sizes::DEFAULT_MAX_FRAME).unwrap();
        buf.extend(encode(&second, sizes::DEFAULT_MAX_FRAME).unwrap());

        let (decoded, consumed) = decode(&buf, sizes::DEFAULT_MAX_FRAME).unwrap().unwrap();
        assert_eq!(decoded, first);

        let (decoded, rest) = decode(&buf[consumed..], sizes::DEFAULT_MAX_FRAME)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, second);
        assert_eq!(consumed + rest, buf.len());
    }

    #[test]
    fn test_encode_rejects_oversized_message() {
        let msg = Message::new().with("blob", vec![0u8; 2048]);
        let result = encode(&msg, sizes::DEFAULT_MAX_FRAME);

        assert!(matches!(result, Err(FrameError::TooLarge { .. })));
    }

    #[test]
    fn test_encode_at_exact_cap() {
        // Overhead: 2 prefix + 2 count + 2 key len + 4 key + 1 tag + 2 len
        let msg = Message::new().with("blob", vec![0u8; 1011]);
        let frame = encode(&msg, sizes::DEFAULT_MAX_FRAME).unwrap();
        assert_eq!(frame.len(), sizes::DEFAULT_MAX_FRAME);

        let over = Message::new().with("blob", vec![0u8; 1012]);
        assert!(matches!(
            encode(&over, sizes::DEFAULT_MAX_FRAME),
            Err(FrameError::TooLarge { size: 1025, max: 1024 })
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_prefix_early() {
        // Prefix advertises 60000 payload bytes; none of them are here yet.
        let buf = 60000u16.to_le_bytes();
        let result = decode(&buf, sizes::DEFAULT_MAX_FRAME);

        assert!(matches!(
            result,
            Err(FrameError::TooLarge { size: 60002, max: 1024 })
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_tag() {
        let mut frame = encode(
            &Message::new().with("x", true),
            sizes::DEFAULT_MAX_FRAME,
        )
        .unwrap();
        // Field layout: prefix(2) count(2) keylen(2) key(1) tag(1)
        frame[7] = 0x7F;

        assert_eq!(
            decode(&frame, sizes::DEFAULT_MAX_FRAME),
            Err(FrameError::InvalidTag(0x7F))
        );
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        // Count says one field, but the payload ends immediately.
        let mut frame = Vec::new();
        frame.extend_from_slice(&2u16.to_le_bytes());
        frame.extend_from_slice(&1u16.to_le_bytes());

        assert!(matches!(
            decode(&frame, sizes::DEFAULT_MAX_FRAME),
            Err(FrameError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let inner = encode(&Message::new().with("x", 1), sizes::DEFAULT_MAX_FRAME).unwrap();
        let payload_len = (inner.len() - sizes::FRAME_HEADER_SIZE + 3) as u16;

        let mut frame = Vec::new();
        frame.extend_from_slice(&payload_len.to_le_bytes());
        frame.extend_from_slice(&inner[sizes::FRAME_HEADER_SIZE..]);
        frame.extend_from_slice(&[0, 0, 0]);

        assert_eq!(
            decode(&frame, sizes::DEFAULT_MAX_FRAME),
            Err(FrameError::TrailingBytes(3))
        );
    }

    #[test]
    fn test_decode_rejects_invalid_utf8_key() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&6u16.to_le_bytes());
        frame.extend_from_slice(&1u16.to_le_bytes());
        frame.extend_from_slice(&2u16.to_le_bytes());
        frame.extend_from_slice(&[0xFF, 0xFE]);

        assert_eq!(
            decode(&frame, sizes::DEFAULT_MAX_FRAME),
            Err(FrameError::InvalidUtf8)
        );
    }

    #[test]
    fn test_decoder_assembles_split_input() {
        let frame = encode(&sample_message(), sizes::DEFAULT_MAX_FRAME).unwrap();
        let mut decoder = FrameDecoder::new(sizes::DEFAULT_MAX_FRAME);

        // Feed one byte at a time; the message appears only at the end.
        for (i, byte) in frame.iter().enumerate() {
            decoder.push(&[*byte]).unwrap();
            let decoded = decoder.next_message().unwrap();
            if i < frame.len() - 1 {
                assert!(decoded.is_none());
            } else {
                assert_eq!(decoded.unwrap(), sample_message());
            }
        }
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_yields_back_to_back_frames() {
        let first = Message::new().with("n", 1);
        let second = Message::new().with("n", 2);
        let mut buf = encode(&first, sizes::DEFAULT_MAX_FRAME).unwrap();
        buf.extend(encode(&second, sizes::DEFAULT_MAX_FRAME).unwrap());

        let mut decoder = FrameDecoder::new(sizes::DEFAULT_MAX_FRAME);
        decoder.push(&buf).unwrap();

        assert_eq!(decoder.next_message().unwrap(), Some(first));
        assert_eq!(decoder.next_message().unwrap(), Some(second));
        assert_eq!(decoder.next_message().unwrap(), None);
    }

    #[test]
    fn test_decoder_buffer_bound() {
        let mut decoder = FrameDecoder::new(8);
        decoder.push(&[0; 8]).unwrap();

        assert_eq!(decoder.capacity_left(), 0);
        assert_eq!(
            decoder.push(&[0]),
            Err(FrameError::Overflow {
                pushed: 1,
                capacity: 0
            })
        );
    }

    #[test]
    fn test_float_roundtrip_is_bit_exact() {
        for x in [0.0, -0.0, 1.5, f64::MIN_POSITIVE, f64::MAX, f64::NEG_INFINITY] {
            let msg = Message::new().with("x", x);
            let frame = encode(&msg, sizes::DEFAULT_MAX_FRAME).unwrap();
            let (decoded, _) = decode(&frame, sizes::DEFAULT_MAX_FRAME).unwrap().unwrap();
            let got = decoded.get("x").unwrap().as_float().unwrap();
            assert_eq!(got.to_bits(), x.to_bits());
        }
    }
}
