//! Live client connections.
//!
//! A [`Connection`] is the registry's view of an accepted socket: its id,
//! addresses, liveness and the write side of the transport. The read side
//! is owned by the session driving the connection, so no lock is ever held
//! while a session waits for bytes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{watch, Mutex};

/// Write/close capability of an accepted socket.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write the whole buffer.
    async fn write_all(&self, buf: &[u8]) -> io::Result<()>;

    /// Close the transport. Pending reads on the other half observe EOF
    /// or an error once the socket is released.
    async fn close(&self) -> io::Result<()>;

    /// Local endpoint.
    fn local_addr(&self) -> SocketAddr;

    /// Remote endpoint.
    fn peer_addr(&self) -> SocketAddr;
}

/// [`Transport`] over the write half of a tokio TCP stream.
pub struct TcpTransport {
    writer: Mutex<OwnedWriteHalf>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

impl TcpTransport {
    pub fn new(writer: OwnedWriteHalf, local_addr: SocketAddr, peer_addr: SocketAddr) -> Self {
        Self {
            writer: Mutex::new(writer),
            local_addr,
            peer_addr,
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(buf).await?;
        writer.flush().await
    }

    async fn close(&self) -> io::Result<()> {
        self.writer.lock().await.shutdown().await
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

/// A registered client connection.
pub struct Connection {
    id: u64,
    transport: Box<dyn Transport>,
    alive: AtomicBool,
    /// Flipped to `true` exactly once, when `alive` goes false.
    closed: watch::Sender<bool>,
    connected_at: DateTime<Utc>,
}

impl Connection {
    /// Wrap a freshly accepted transport. New connections start alive.
    pub fn new(id: u64, transport: impl Transport + 'static) -> Self {
        Self {
            id,
            transport: Box::new(transport),
            alive: AtomicBool::new(true),
            closed: watch::Sender::new(false),
            connected_at: Utc::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.transport.peer_addr()
    }

    /// Remote IP as text, without the port.
    pub fn remote_host(&self) -> String {
        self.remote_addr().ip().to_string()
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Time since the connection was accepted.
    pub fn lifetime(&self) -> chrono::Duration {
        Utc::now() - self.connected_at
    }

    /// Write a frame to the peer.
    pub async fn write(&self, buf: &[u8]) -> io::Result<()> {
        if !self.is_alive() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("connection {} is closed", self.id),
            ));
        }
        self.transport.write_all(buf).await
    }

    /// Mark the connection dead.
    ///
    /// Returns `true` only for the caller that performed the transition;
    /// that caller is responsible for closing the transport.
    pub(crate) fn mark_dead(&self) -> bool {
        let was_alive = self.alive.swap(false, Ordering::AcqRel);
        if was_alive {
            self.closed.send_replace(true);
        }
        was_alive
    }

    pub(crate) async fn close_transport(&self) -> io::Result<()> {
        self.transport.close().await
    }

    /// Resolves once the connection has been marked dead.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives as long as `self`, so this cannot fail while we
        // hold a reference.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .field("local", &self.local_addr())
            .field("remote", &self.remote_addr())
            .field("connected_at", &self.connected_at)
            .finish()
    }
}
