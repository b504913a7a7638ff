//! slab-vault: a one-connection-at-a-time server guarding a single byte
//! buffer.
//!
//! Each connection carries one binary packet that reads a slice of the
//! stored buffer, writes into it, or replaces it outright.
//!
//! - `protocol`: packet layout and codec
//! - `storage`: the stored buffer and its bounds-checked accessor
//! - `handler`: per-packet dispatch under a safe or vulnerable check policy
//! - `server`: sequential TCP acceptor
//! - `client`: one-packet-per-connection client

pub mod client;
pub mod config;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod storage;
