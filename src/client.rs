//! Blocking client for the packet protocol.
//!
//! Every call opens a fresh connection, sends one packet, half-closes the
//! write side and collects whatever the server sends before it closes.

use crate::protocol::{encode_packet, Opcode};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use tracing::trace;

#[derive(Debug, Clone, Copy)]
pub struct Client {
    addr: SocketAddr,
}

impl Client {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Request `length` bytes at `offset`. An empty reply means the server
    /// refused.
    pub fn read(&self, offset: u64, length: u64) -> io::Result<Vec<u8>> {
        self.send_raw(&encode_packet(Opcode::Read, offset, length, &[]))
    }

    pub fn write(&self, offset: u64, data: &[u8]) -> io::Result<Vec<u8>> {
        self.send_raw(&encode_packet(Opcode::Write, offset, data.len() as u64, data))
    }

    pub fn reset(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        self.send_raw(&encode_packet(Opcode::Reset, 0, data.len() as u64, data))
    }

    /// Send arbitrary bytes as one packet and return the reply.
    pub fn send_raw(&self, packet: &[u8]) -> io::Result<Vec<u8>> {
        let mut stream = TcpStream::connect(self.addr)?;
        stream.write_all(packet)?;
        stream.shutdown(Shutdown::Write)?;

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply)?;
        trace!(sent = packet.len(), received = reply.len(), "Packet exchanged");
        Ok(reply)
    }
}
