use std::io::{ErrorKind, Read, Write};

use bytes::BytesMut;

use crate::error::{PacketError, Result};
use crate::packet::Packet;
use crate::slip::{deframe, frame, DEFAULT_MAX_FRAME};

const READ_CHUNK_SIZE: usize = 64;

/// Frames decoded from one read batch.
#[derive(Debug, Default)]
pub struct ReadBatch {
    /// Packets that deframed and unwrapped cleanly, in stream order.
    pub packets: Vec<Packet>,
    /// Frames that were delimited but failed to decode.
    pub rejected: Vec<PacketError>,
    /// Trailing bytes left over after the last complete frame.
    pub discarded: usize,
}

/// Delimiter-framed packet exchange over a serial stream.
///
/// Reads are batch-oriented: [`read_batch`](Self::read_batch) drains what
/// the stream has buffered right now, returns every complete frame in it,
/// and drops whatever partial frame remains. The link has no higher-level
/// resynchronization, so a frame split across two batches is lost.
pub struct SlipStream<T> {
    inner: T,
    max_frame: usize,
    rx: BytesMut,
    tx: BytesMut,
}

impl<T: Read + Write> SlipStream<T> {
    pub fn new(inner: T) -> Self {
        Self::with_max_frame(inner, DEFAULT_MAX_FRAME)
    }

    pub fn with_max_frame(inner: T, max_frame: usize) -> Self {
        Self {
            inner,
            max_frame,
            rx: BytesMut::with_capacity(max_frame),
            tx: BytesMut::with_capacity(max_frame),
        }
    }

    /// Consume the bytes currently available and decode every complete frame.
    ///
    /// Returns `Err(PacketError::ConnectionClosed)` when the stream reports
    /// end of file before yielding any data.
    pub fn read_batch(&mut self) -> Result<ReadBatch> {
        self.rx.clear();
        let budget = self.max_frame.saturating_mul(4);
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        while self.rx.len() < budget {
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::TimedOut => break,
                Err(err) => return Err(PacketError::Io(err)),
            };
            if read == 0 {
                if self.rx.is_empty() {
                    return Err(PacketError::ConnectionClosed);
                }
                break;
            }
            self.rx.extend_from_slice(&chunk[..read]);
        }

        let mut batch = ReadBatch::default();
        loop {
            match deframe(&mut self.rx, self.max_frame) {
                Ok(Some(packet)) => batch.packets.push(packet),
                Ok(None) => break,
                Err(err) => {
                    tracing::debug!(error = %err, "dropping undecodable frame");
                    batch.rejected.push(err);
                }
            }
        }
        batch.discarded = self.rx.len();
        self.rx.clear();
        Ok(batch)
    }

    /// Frame a packet and write it one byte at a time.
    ///
    /// Any byte the stream does not accept is reported as a short write.
    pub fn send(&mut self, packet: &Packet) -> Result<()> {
        self.tx.clear();
        frame(packet, self.max_frame, &mut self.tx)?;

        let total = self.tx.len();
        for written in 0..total {
            let byte = [self.tx[written]];
            loop {
                match self.inner.write(&byte) {
                    Ok(1) => break,
                    Ok(_) => return Err(PacketError::ShortWrite { written, total }),
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) if err.kind() == ErrorKind::WouldBlock => {
                        return Err(PacketError::ShortWrite { written, total })
                    }
                    Err(err) => return Err(PacketError::Io(err)),
                }
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(PacketError::Io(err)),
            }
        }
    }

    pub fn max_frame(&self) -> usize {
        self.max_frame
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}
