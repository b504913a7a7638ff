//! Packet dispatch against the stored buffer.
//!
//! One packet is processed per connection. The handler owns the stored
//! buffer and the receive buffer; both outlive individual connections, so
//! bytes past the end of a short packet are whatever an earlier packet left
//! behind.

use crate::config::CheckMode;
use crate::protocol::{Header, Opcode, Packet, PacketError, HEADER_SIZE, MAX_PACKET_SIZE};
use crate::storage::{Storage, StorageError};
use bytes::Bytes;
use std::fmt;
use tracing::{debug, warn};

/// Result of handling one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The operation ran. Only reads carry response bytes.
    Applied { response: Option<Bytes> },
    /// The packet decoded but the operation was refused.
    Rejected(Rejection),
    /// The packet could not be decoded.
    Malformed(PacketError),
}

impl Outcome {
    fn applied() -> Self {
        Outcome::Applied { response: None }
    }

    /// Bytes to send back to the client, if any.
    pub fn response(&self) -> Option<&Bytes> {
        match self {
            Outcome::Applied { response } => response.as_ref(),
            _ => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied { .. })
    }
}

/// Why a decoded packet was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Read or write before any reset.
    BufferAbsent,
    /// The requested range fails the admission check.
    OutOfBounds { offset: u64, length: u64, stored: u64 },
    /// The header claims more payload than was received.
    PayloadTooShort { claimed: u64, available: u64 },
    UnknownOpcode(u32),
    /// Vulnerable mode admitted an access that lands outside the stored
    /// buffer.
    UnsafeAccessBlocked(StorageError),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::BufferAbsent => write!(f, "stored buffer is absent"),
            Rejection::OutOfBounds {
                offset,
                length,
                stored,
            } => write!(
                f,
                "offset={:#x} length={:#x} out of bounds for {:#x} stored bytes",
                offset, length, stored
            ),
            Rejection::PayloadTooShort { claimed, available } => write!(
                f,
                "datagram length is invalid: claims {:#x}, carries {:#x}",
                claimed, available
            ),
            Rejection::UnknownOpcode(tag) => write!(f, "unknown datagram type: {}", tag),
            Rejection::UnsafeAccessBlocked(e) => write!(f, "unchecked access blocked: {}", e),
        }
    }
}

/// Protocol handler owning the stored buffer.
pub struct Handler {
    storage: Storage,
    mode: CheckMode,
    recv_buf: Box<[u8]>,
}

impl Handler {
    pub fn new(mode: CheckMode) -> Self {
        Self {
            storage: Storage::new(),
            mode,
            recv_buf: vec![0; MAX_PACKET_SIZE].into_boxed_slice(),
        }
    }

    pub fn mode(&self) -> CheckMode {
        self.mode
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Buffer the acceptor receives into before calling [`Handler::handle`].
    pub fn recv_buffer_mut(&mut self) -> &mut [u8] {
        &mut self.recv_buf
    }

    /// Copy `input` into the receive buffer and handle it. Input beyond
    /// [`MAX_PACKET_SIZE`] is dropped, as a single receive would.
    pub fn process(&mut self, input: &[u8]) -> Outcome {
        let n = input.len().min(MAX_PACKET_SIZE);
        self.recv_buf[..n].copy_from_slice(&input[..n]);
        self.handle(n)
    }

    /// Handle the first `n` bytes of the receive buffer as one packet.
    pub fn handle(&mut self, n: usize) -> Outcome {
        let Handler {
            storage,
            mode,
            recv_buf,
        } = self;
        let recv_buf: &[u8] = recv_buf;
        let n = n.min(recv_buf.len());

        let packet = match Packet::decode(&recv_buf[..n]) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(error = %e, "Dropping packet");
                return Outcome::Malformed(e);
            }
        };

        let outcome = match packet.header.opcode {
            Opcode::Read => {
                debug!("got a data read packet");
                read(storage, *mode, packet.header)
            }
            Opcode::Write => {
                debug!("got a data write packet");
                write(storage, *mode, &packet, recv_buf)
            }
            Opcode::Reset => {
                debug!("got a data reset packet");
                reset(storage, &packet)
            }
            Opcode::Unknown(tag) => {
                debug!(tag, "got an unknown datagram type");
                Outcome::Rejected(Rejection::UnknownOpcode(tag))
            }
        };

        match &outcome {
            Outcome::Rejected(reason @ Rejection::UnsafeAccessBlocked(_)) => {
                warn!(reason = %reason, "Out-of-range access prevented");
            }
            Outcome::Rejected(reason) => debug!(reason = %reason, "Packet rejected"),
            _ => {}
        }

        outcome
    }
}

fn out_of_bounds(header: Header, storage: &Storage) -> Outcome {
    Outcome::Rejected(Rejection::OutOfBounds {
        offset: header.offset,
        length: header.length,
        stored: storage.len() as u64,
    })
}

fn read(storage: &Storage, mode: CheckMode, header: Header) -> Outcome {
    if !storage.is_present() {
        return Outcome::Rejected(Rejection::BufferAbsent);
    }

    let stored = storage.len() as u64;
    let admitted = match mode {
        CheckMode::Safe => header
            .offset
            .checked_add(header.length)
            .is_some_and(|end| end <= stored),
        CheckMode::Vulnerable => header.offset.wrapping_add(header.length) <= stored,
    };
    if !admitted {
        return out_of_bounds(header, storage);
    }

    match storage.read(header.offset, header.length) {
        Ok(slice) => Outcome::Applied {
            response: Some(Bytes::copy_from_slice(slice)),
        },
        Err(e) => Outcome::Rejected(Rejection::UnsafeAccessBlocked(e)),
    }
}

fn write(storage: &mut Storage, mode: CheckMode, packet: &Packet<'_>, recv_buf: &[u8]) -> Outcome {
    let header = packet.header;
    if !storage.is_present() {
        return Outcome::Rejected(Rejection::BufferAbsent);
    }

    match mode {
        CheckMode::Safe => {
            if header.length > packet.available() {
                return Outcome::Rejected(Rejection::PayloadTooShort {
                    claimed: header.length,
                    available: packet.available(),
                });
            }
            let src = &packet.payload[..header.length as usize];
            match storage.write(header.offset, src) {
                Ok(()) => Outcome::applied(),
                Err(_) => out_of_bounds(header, storage),
            }
        }
        CheckMode::Vulnerable => {
            if header.length > storage.len() as u64 {
                return out_of_bounds(header, storage);
            }

            // The source is taken from the receive buffer regardless of how
            // many bytes arrived.
            let src = match recv_buf.get(HEADER_SIZE..HEADER_SIZE + header.length as usize) {
                Some(src) => src,
                None => {
                    return Outcome::Rejected(Rejection::PayloadTooShort {
                        claimed: header.length,
                        available: (recv_buf.len() - HEADER_SIZE) as u64,
                    })
                }
            };
            match storage.write(header.offset, src) {
                Ok(()) => Outcome::applied(),
                Err(e) => Outcome::Rejected(Rejection::UnsafeAccessBlocked(e)),
            }
        }
    }
}

fn reset(storage: &mut Storage, packet: &Packet<'_>) -> Outcome {
    let length = packet.header.length;
    if length > packet.available() {
        return Outcome::Rejected(Rejection::PayloadTooShort {
            claimed: length,
            available: packet.available(),
        });
    }

    debug!(length, available = packet.available(), "Resetting stored buffer");
    storage.reset(&packet.payload[..length as usize]);
    Outcome::applied()
}
