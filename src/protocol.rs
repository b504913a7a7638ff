//! Binary packet codec.
//!
//! Every packet is a packed little-endian header followed by a payload:
//!
//! ```text
//! offset  size  field
//! 0       4     type    (0 = read, 1 = write, 2 = reset)
//! 4       8     offset
//! 12      8     length
//! 20      var   data
//! ```
//!
//! Decoding reads the fields from fixed offsets and hands out the payload
//! as a borrowed slice of the receive buffer.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// Size of the fixed packet header.
pub const HEADER_SIZE: usize = 20;

/// Largest packet accepted from a single receive.
pub const MAX_PACKET_SIZE: usize = 0x1000;

/// Packet type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Read,
    Write,
    Reset,
    Unknown(u32),
}

impl From<u32> for Opcode {
    fn from(tag: u32) -> Self {
        match tag {
            0 => Opcode::Read,
            1 => Opcode::Write,
            2 => Opcode::Reset,
            other => Opcode::Unknown(other),
        }
    }
}

impl From<Opcode> for u32 {
    fn from(opcode: Opcode) -> Self {
        match opcode {
            Opcode::Read => 0,
            Opcode::Write => 1,
            Opcode::Reset => 2,
            Opcode::Unknown(tag) => tag,
        }
    }
}

/// Fixed-size packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub opcode: Opcode,
    pub offset: u64,
    pub length: u64,
}

impl Header {
    /// Decode the header from the front of `input`.
    pub fn decode(input: &[u8]) -> Result<Header, PacketError> {
        if input.len() < HEADER_SIZE {
            return Err(PacketError::TooShort {
                received: input.len(),
            });
        }

        let mut buf = &input[..HEADER_SIZE];
        let opcode = Opcode::from(buf.get_u32_le());
        let offset = buf.get_u64_le();
        let length = buf.get_u64_le();

        Ok(Header {
            opcode,
            offset,
            length,
        })
    }

    /// Append the wire form of this header to `out`.
    pub fn encode(&self, out: &mut BytesMut) {
        out.reserve(HEADER_SIZE);
        out.put_u32_le(self.opcode.into());
        out.put_u64_le(self.offset);
        out.put_u64_le(self.length);
    }
}

/// A decoded packet borrowing its payload from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub header: Header,
    pub payload: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Decode a packet from exactly the bytes that were received.
    pub fn decode(input: &'a [u8]) -> Result<Packet<'a>, PacketError> {
        let header = Header::decode(input)?;
        Ok(Packet {
            header,
            payload: &input[HEADER_SIZE..],
        })
    }

    /// Number of payload bytes actually present.
    pub fn available(&self) -> u64 {
        self.payload.len() as u64
    }
}

/// Serialize a packet. `length` is written as given so callers can
/// send a header that disagrees with the payload.
pub fn encode_packet(opcode: Opcode, offset: u64, length: u64, data: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(HEADER_SIZE + data.len());
    Header {
        opcode,
        offset,
        length,
    }
    .encode(&mut out);
    out.extend_from_slice(data);
    out.freeze()
}

/// Packet decoding errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Fewer bytes than a header were received.
    TooShort { received: usize },
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::TooShort { received } => write!(
                f,
                "packet not large enough: {} bytes, header needs {}",
                received, HEADER_SIZE
            ),
        }
    }
}

impl std::error::Error for PacketError {}
