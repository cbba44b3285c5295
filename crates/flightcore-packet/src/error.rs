/// Errors that can occur while encoding, decoding or moving packets.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// The encoded packet would exceed the transport's maximum frame size.
    #[error("encoded size {size} exceeds maximum frame size {max}")]
    FrameSizeExceeded { size: usize, max: usize },

    /// Fewer bytes than the smallest valid wrapped packet.
    #[error("truncated packet ({len} bytes, need at least {min})")]
    Truncated { len: usize, min: usize },

    /// The header's length field disagrees with the bytes present.
    #[error("length mismatch (header says {declared} payload bytes, found {actual})")]
    LengthMismatch { declared: usize, actual: usize },

    /// The integrity trailer does not match the packet contents.
    #[error("checksum mismatch (expected {expected:#06x}, computed {computed:#06x})")]
    ChecksumMismatch { expected: u16, computed: u16 },

    /// A node identifier outside the known set.
    #[error("unknown node id {0}")]
    UnknownNode(u8),

    /// An escape byte followed by something other than an escape code.
    #[error("invalid SLIP escape sequence 0xDB {0:#04x}")]
    InvalidEscape(u8),

    /// A delimited frame longer than the receive buffer.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A command payload that does not match its packet type.
    #[error("malformed {kind} payload: {reason}")]
    MalformedCommand { kind: &'static str, reason: String },

    /// An I/O error occurred while reading or writing a stream.
    #[error("packet I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream reported end of file.
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream accepted fewer bytes than requested.
    #[error("short write after {written} of {total} bytes")]
    ShortWrite { written: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, PacketError>;
