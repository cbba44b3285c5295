//! SLIP-style delimiter framing for the companion-computer serial link.
//!
//! A frame is `END`, the escaped wrapped packet, `END`. Inside the frame
//! `END` and `ESC` bytes are replaced by two-byte escape sequences, so the
//! delimiter never appears in the body.

use bytes::{Buf, BufMut, BytesMut};

use crate::codec::{self, wrapped_size};
use crate::error::{PacketError, Result};
use crate::packet::Packet;

pub const END: u8 = 0xC0;
pub const ESC: u8 = 0xDB;
pub const ESC_END: u8 = 0xDC;
pub const ESC_ESC: u8 = 0xDD;

/// Default receive buffer for one delimited frame, delimiters included.
pub const DEFAULT_MAX_FRAME: usize = 256;

/// Append `data` with SLIP escaping applied (no delimiters).
pub fn escape(data: &[u8], dst: &mut BytesMut) {
    for &byte in data {
        match byte {
            END => dst.put_slice(&[ESC, ESC_END]),
            ESC => dst.put_slice(&[ESC, ESC_ESC]),
            other => dst.put_u8(other),
        }
    }
}

/// Reverse [`escape`].
pub fn unescape(body: &[u8]) -> Result<BytesMut> {
    let mut out = BytesMut::with_capacity(body.len());
    let mut bytes = body.iter().copied();
    while let Some(byte) = bytes.next() {
        if byte != ESC {
            out.put_u8(byte);
            continue;
        }
        match bytes.next() {
            Some(ESC_END) => out.put_u8(END),
            Some(ESC_ESC) => out.put_u8(ESC),
            Some(other) => return Err(PacketError::InvalidEscape(other)),
            None => return Err(PacketError::InvalidEscape(0)),
        }
    }
    Ok(out)
}

/// Encode a packet into its delimited form.
///
/// Fails without writing anything if the delimited frame would exceed
/// `max_frame` bytes.
pub fn frame(packet: &Packet, max_frame: usize, dst: &mut BytesMut) -> Result<()> {
    let mut wrapped = BytesMut::with_capacity(wrapped_size(packet));
    codec::wrap(packet, usize::MAX, &mut wrapped)?;

    let mut framed = BytesMut::with_capacity(wrapped.len() + 2);
    framed.put_u8(END);
    escape(&wrapped, &mut framed);
    framed.put_u8(END);

    if framed.len() > max_frame {
        return Err(PacketError::FrameSizeExceeded {
            size: framed.len(),
            max: max_frame,
        });
    }
    dst.extend_from_slice(&framed);
    Ok(())
}

/// Decode the next delimited packet from a buffer.
///
/// Returns `Ok(None)` if no complete frame is buffered yet. Bytes before the
/// first delimiter are discarded, and empty frames (back-to-back
/// delimiters) are skipped. A frame that fails to decode is consumed before
/// the error is returned, so the caller can keep draining the buffer.
pub fn deframe(src: &mut BytesMut, max_frame: usize) -> Result<Option<Packet>> {
    let Some(start) = src.iter().position(|&b| b == END) else {
        src.clear();
        return Ok(None);
    };
    src.advance(start);

    let run = src.iter().take_while(|&&b| b == END).count();
    src.advance(run - 1);

    let Some(body_len) = src[1..].iter().position(|&b| b == END) else {
        if src.len() > max_frame {
            let size = src.len();
            src.clear();
            return Err(PacketError::FrameTooLarge {
                size,
                max: max_frame,
            });
        }
        return Ok(None);
    };

    let frame_len = body_len + 2;
    let body = src.split_to(frame_len);
    if frame_len > max_frame {
        return Err(PacketError::FrameTooLarge {
            size: frame_len,
            max: max_frame,
        });
    }

    let wrapped = unescape(&body[1..=body_len])?;
    codec::unwrap(&wrapped).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelId;
    use crate::packet::{NodeId, PacketType};

    fn sample(payload: &[u8]) -> Packet {
        Packet::new(PacketType(0x800), NodeId::Obc, NodeId::Companion)
            .with_channels(ChannelId::NONE, ChannelId::COMPANION)
            .with_payload(payload.to_vec())
    }

    #[test]
    fn frame_deframe_roundtrip_with_reserved_bytes() {
        let packet = sample(&[END, ESC, 0x00, END, ESC_END]);
        let mut buf = BytesMut::new();
        frame(&packet, DEFAULT_MAX_FRAME, &mut buf).unwrap();

        assert_eq!(buf[0], END);
        assert_eq!(buf[buf.len() - 1], END);
        assert!(!buf[1..buf.len() - 1].contains(&END));

        let decoded = deframe(&mut buf, DEFAULT_MAX_FRAME).unwrap().unwrap();
        assert_eq!(decoded, packet);
        assert!(buf.is_empty());
    }

    #[test]
    fn leading_garbage_produces_no_packet() {
        let mut buf = BytesMut::from(&b"noise without delimiter"[..]);
        assert!(deframe(&mut buf, DEFAULT_MAX_FRAME).unwrap().is_none());
        assert!(buf.is_empty());

        let packet = sample(b"hi");
        let mut buf = BytesMut::from(&b"\x01\x02garbage"[..]);
        frame(&packet, DEFAULT_MAX_FRAME, &mut buf).unwrap();
        assert_eq!(deframe(&mut buf, DEFAULT_MAX_FRAME).unwrap(), Some(packet));
    }

    #[test]
    fn incomplete_frame_waits_for_more_bytes() {
        let mut full = BytesMut::new();
        frame(&sample(b"partial"), DEFAULT_MAX_FRAME, &mut full).unwrap();
        let tail = full.split_off(6);

        let mut buf = full;
        assert!(deframe(&mut buf, DEFAULT_MAX_FRAME).unwrap().is_none());
        buf.extend_from_slice(&tail);
        assert!(deframe(&mut buf, DEFAULT_MAX_FRAME).unwrap().is_some());
    }

    #[test]
    fn back_to_back_frames_decode_in_order() {
        let mut buf = BytesMut::new();
        frame(&sample(b"one"), DEFAULT_MAX_FRAME, &mut buf).unwrap();
        buf.put_u8(END);
        frame(&sample(b"two"), DEFAULT_MAX_FRAME, &mut buf).unwrap();

        let first = deframe(&mut buf, DEFAULT_MAX_FRAME).unwrap().unwrap();
        let second = deframe(&mut buf, DEFAULT_MAX_FRAME).unwrap().unwrap();
        assert_eq!(first.payload.as_ref(), b"one");
        assert_eq!(second.payload.as_ref(), b"two");
        assert!(deframe(&mut buf, DEFAULT_MAX_FRAME).unwrap().is_none());
    }

    #[test]
    fn corrupt_frame_is_consumed_and_reported() {
        let mut buf = BytesMut::new();
        frame(&sample(b"bad"), DEFAULT_MAX_FRAME, &mut buf).unwrap();
        buf[3] ^= 0x40;
        frame(&sample(b"good"), DEFAULT_MAX_FRAME, &mut buf).unwrap();

        assert!(deframe(&mut buf, DEFAULT_MAX_FRAME).is_err());
        let next = deframe(&mut buf, DEFAULT_MAX_FRAME).unwrap().unwrap();
        assert_eq!(next.payload.as_ref(), b"good");
    }

    #[test]
    fn invalid_escape_is_rejected() {
        assert!(matches!(
            unescape(&[0x01, ESC, 0x02]),
            Err(PacketError::InvalidEscape(0x02))
        ));
        assert!(matches!(unescape(&[ESC]), Err(PacketError::InvalidEscape(0))));
    }

    #[test]
    fn frame_larger_than_buffer_is_rejected_both_ways() {
        let packet = sample(&[0x11; 64]);
        let mut buf = BytesMut::new();
        assert!(matches!(
            frame(&packet, 32, &mut buf),
            Err(PacketError::FrameSizeExceeded { max: 32, .. })
        ));
        assert!(buf.is_empty());

        frame(&packet, DEFAULT_MAX_FRAME, &mut buf).unwrap();
        assert!(matches!(
            deframe(&mut buf, 32),
            Err(PacketError::FrameTooLarge { max: 32, .. })
        ));
    }
}
