//! Single-client TCP transport.
//!
//! The server binds once, accepts exactly one client and then drops the
//! listening socket. Every report goes out as one framed, flushed write; any
//! write failure is final for the connection.

use std::{
    io::{self, Write},
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
};

use thiserror::Error;
use tracing::{debug, info};

use crate::tracking::wire::{Framing, encode_frame};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to accept a client connection")]
    Accept(#[source] io::Error),
    #[error("failed to connect to {addr}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to send report to client")]
    Send(#[source] io::Error),
    #[error("failed to read from server")]
    Receive(#[source] io::Error),
    #[error("payload of {len} bytes exceeds the {max} byte frame limit")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("newline-delimited payload contains a raw newline")]
    EmbeddedNewline,
    #[error("malformed report")]
    Decode(#[source] serde_json::Error),
    #[error("connection is closed")]
    Closed,
}

/// Where encoded reports are written.
pub trait ReportChannel {
    /// Frame and write one payload, returning the number of bytes put on the wire.
    fn send(&mut self, payload: &[u8]) -> Result<usize, TransportError>;

    /// Close the channel. Calling this more than once is a no-op.
    fn close(&mut self);
}

impl<T: ReportChannel + ?Sized> ReportChannel for Box<T> {
    fn send(&mut self, payload: &[u8]) -> Result<usize, TransportError> {
        (**self).send(payload)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

pub struct TransportListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TransportListener {
    pub fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;
        debug!("Listening on {local_addr}");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Block until one client connects. The listening socket is closed
    /// afterwards, so later clients are refused.
    pub fn accept_one(self, framing: Framing) -> Result<ClientConnection, TransportError> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        info!(
            "Client connected from {peer} ({} framing)",
            framing.as_str()
        );
        Ok(ClientConnection {
            stream: Some(stream),
            peer,
            framing,
            scratch: Vec::with_capacity(4096),
        })
    }
}

/// The accepted client. Reports are written synchronously; a stalled client
/// stalls the caller.
pub struct ClientConnection {
    stream: Option<TcpStream>,
    peer: SocketAddr,
    framing: Framing,
    scratch: Vec<u8>,
}

impl ClientConnection {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl ReportChannel for ClientConnection {
    fn send(&mut self, payload: &[u8]) -> Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        self.scratch.clear();
        encode_frame(self.framing, payload, &mut self.scratch)?;
        stream
            .write_all(&self.scratch)
            .map_err(TransportError::Send)?;
        stream.flush().map_err(TransportError::Send)?;
        Ok(self.scratch.len())
    }

    fn close(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        if let Err(err) = stream.shutdown(Shutdown::Both) {
            debug!("Shutdown of connection to {} failed: {err}", self.peer);
        }
        info!("Closed connection to {}", self.peer);
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        self.close();
    }
}
