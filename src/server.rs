//! TCP acceptor for the packet protocol.
//!
//! Connections are served strictly one after another: accept, receive once,
//! handle, reply if there is anything to say, close. A client that connects
//! and never sends blocks everyone behind it.

use crate::config::Config;
use crate::handler::{Handler, Outcome};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use tracing::{debug, error, info, trace};

/// Server instance
pub struct Server {
    listener: TcpListener,
    handler: Handler,
}

impl Server {
    /// Bind the listening socket described by `config`.
    pub fn bind(config: &Config) -> Result<Self, ServerError> {
        let listener = create_listener(config.listen, config.backlog)
            .map_err(|e| ServerError::Bind(config.listen, e))?;
        let local = listener.local_addr().map_err(ServerError::Io)?;
        let handler = Handler::new(config.mode);

        info!(address = %local, backlog = config.backlog, mode = ?handler.mode(), "Server listening");

        Ok(Server { listener, handler })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Accept and serve connections forever.
    pub fn run(&mut self) -> Result<(), ServerError> {
        loop {
            if let Err(e) = self.serve_one() {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }

    /// Accept one connection and serve its single packet.
    ///
    /// Only a failed accept is returned; errors on the accepted connection
    /// are logged and the connection is closed.
    pub fn serve_one(&mut self) -> io::Result<Option<Outcome>> {
        let (stream, peer) = self.listener.accept()?;
        debug!(peer = %peer, "got a new connection");

        let outcome = match handle_connection(stream, &mut self.handler) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                debug!(peer = %peer, error = %e, "Connection error");
                None
            }
        };
        trace!(peer = %peer, "Connection closed");

        Ok(outcome)
    }
}

/// Receive once, handle, and reply. The stream is closed on return.
fn handle_connection(mut stream: TcpStream, handler: &mut Handler) -> io::Result<Outcome> {
    let n = stream.read(handler.recv_buffer_mut())?;
    debug!(bytes_read = n, "Received packet");

    let outcome = handler.handle(n);
    if let Some(response) = outcome.response() {
        if !response.is_empty() {
            stream.write_all(response)?;
        }
    }

    Ok(outcome)
}

/// Create a blocking TCP listener with SO_REUSEADDR and the given backlog.
fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}

/// Listener setup errors
#[derive(Debug)]
pub enum ServerError {
    Bind(SocketAddr, io::Error),
    Io(io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Bind(addr, e) => write!(f, "Failed to bind {}: {}", addr, e),
            ServerError::Io(e) => write!(f, "Listener error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {}
