use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_16_IBM_3740};

use crate::channel::ChannelId;
use crate::error::{PacketError, Result};
use crate::packet::{NodeId, Packet, PacketType};

/// Header: type (2) + length (2) + origin + destination + chanin + chanout = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// CRC-16 trailer.
pub const TRAILER_SIZE: usize = 2;

/// Largest frame the radio FIFO accepts.
pub const RADIO_MAX_FRAME: usize = 50;

/// Largest payload that fits a radio frame.
pub const RADIO_MAX_PAYLOAD: usize = RADIO_MAX_FRAME - HEADER_SIZE - TRAILER_SIZE;

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF).
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Checksum used by the wrapped form.
pub fn checksum(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Size of `packet` once wrapped.
pub fn wrapped_size(packet: &Packet) -> usize {
    HEADER_SIZE + packet.payload.len() + TRAILER_SIZE
}

/// Encode a packet into the wrapped (radio) form.
///
/// Wire format:
/// ```text
/// ┌───────────┬───────────┬──────┬──────┬────────┬─────────┬──────────┬──────────┐
/// │ Type      │ Length    │ Orig │ Dest │ Chanin │ Chanout │ Payload  │ CRC-16   │
/// │ (2B LE)   │ (2B LE)   │ (1B) │ (1B) │ (1B)   │ (1B)    │ (Length) │ (2B LE)  │
/// └───────────┴───────────┴──────┴──────┴────────┴─────────┴──────────┴──────────┘
/// ```
/// The CRC covers the header and payload. Fails without writing anything if
/// the result would exceed `max_frame`.
pub fn wrap(packet: &Packet, max_frame: usize, dst: &mut BytesMut) -> Result<()> {
    let size = wrapped_size(packet);
    let max = max_frame.min(HEADER_SIZE + u16::MAX as usize + TRAILER_SIZE);
    if size > max {
        return Err(PacketError::FrameSizeExceeded { size, max });
    }

    let start = dst.len();
    dst.reserve(size);
    dst.put_u16_le(packet.packet_type.0);
    dst.put_u16_le(packet.payload.len() as u16);
    dst.put_u8(packet.origin as u8);
    dst.put_u8(packet.destination as u8);
    dst.put_u8(packet.channel_in.0);
    dst.put_u8(packet.channel_out.0);
    dst.put_slice(&packet.payload);
    let crc = checksum(&dst[start..]);
    dst.put_u16_le(crc);
    Ok(())
}

/// Wrap into a fresh buffer.
pub fn wrap_to_bytes(packet: &Packet, max_frame: usize) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(wrapped_size(packet));
    wrap(packet, max_frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode a complete wrapped packet.
///
/// Fails on truncation, a length field that disagrees with the data,
/// checksum mismatch, or unknown node ids in the header.
pub fn unwrap(src: &[u8]) -> Result<Packet> {
    let min = HEADER_SIZE + TRAILER_SIZE;
    if src.len() < min {
        return Err(PacketError::Truncated {
            len: src.len(),
            min,
        });
    }

    let (body, trailer) = src.split_at(src.len() - TRAILER_SIZE);
    let mut header = &body[..HEADER_SIZE];
    let packet_type = PacketType(header.get_u16_le());
    let declared = header.get_u16_le() as usize;
    let actual = body.len() - HEADER_SIZE;
    if declared != actual {
        return Err(PacketError::LengthMismatch { declared, actual });
    }

    let expected = u16::from_le_bytes([trailer[0], trailer[1]]);
    let computed = checksum(body);
    if expected != computed {
        return Err(PacketError::ChecksumMismatch { expected, computed });
    }

    let origin = NodeId::try_from(header.get_u8())?;
    let destination = NodeId::try_from(header.get_u8())?;
    let channel_in = ChannelId(header.get_u8());
    let channel_out = ChannelId(header.get_u8());

    Ok(Packet {
        packet_type,
        origin,
        destination,
        channel_in,
        channel_out,
        payload: Bytes::copy_from_slice(&body[HEADER_SIZE..]),
    })
}
