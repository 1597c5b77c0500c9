//! Per-connection decode, dispatch, handle loop.
//!
//! A session is `Active` until the first failure of any kind, then it
//! deregisters its connection (which closes the transport) and ends. There
//! is no recovery inside a session; the peer has to dial again.

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::registry::ConnectionRegistry;
use crate::router::Router;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, error, info, warn};

/// Drives one connection until it fails or is closed.
pub struct Session<R> {
    conn: Arc<Connection>,
    reader: R,
    router: Arc<Router>,
    registry: Arc<ConnectionRegistry>,
}

impl<R> Session<R>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    pub fn new(
        conn: Arc<Connection>,
        reader: R,
        router: Arc<Router>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            conn,
            reader,
            router,
            registry,
        }
    }

    /// Serve packets until the connection fails, then tear it down.
    ///
    /// Returns the error that ended the session.
    pub async fn run(mut self) -> Error {
        let cause = loop {
            if let Err(e) = self.step().await {
                break e;
            }
        };

        let conn_id = self.conn.id();
        if cause.is_eof() {
            debug!(conn_id, "Peer closed connection");
        } else if cause.is_shutdown() {
            debug!(conn_id, "Connection closed locally");
        } else {
            warn!(conn_id, error = %cause, "Session terminated");
        }

        if let Err(e) = self.registry.remove_by_id(conn_id).await {
            error!(conn_id, error = %e, "Failed to remove connection");
        }

        info!(
            conn_id,
            local = %self.conn.local_addr(),
            remote = %self.conn.remote_addr(),
            connected_at = %self.conn.connected_at().to_rfc3339(),
            lifetime_ms = self.conn.lifetime().num_milliseconds(),
            "Connection released"
        );

        cause
    }

    /// One decode, dispatch, handle cycle.
    async fn step(&mut self) -> Result<()> {
        if !self.conn.is_alive() {
            return Err(closed(self.conn.id()));
        }

        let binding = self.router.bind(&self.conn);

        // Shutdown marks the connection dead while we may be parked on a
        // read; the close signal ends the wait.
        let packet = tokio::select! {
            decoded = self.router.codec().decode(&mut self.reader) => decoded?,
            _ = self.conn.closed() => return Err(closed(self.conn.id())),
        };

        debug!(
            conn_id = self.conn.id(),
            id = packet.id,
            kind = packet.kind,
            length = packet.length,
            remote = %self.conn.remote_addr(),
            "Received packet"
        );

        self.router.dispatch(&binding, packet).await
    }
}

fn closed(conn_id: u64) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::ConnectionAborted,
        format!("connection {conn_id} closed"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Codec, PacketCodec};
    use crate::error::ProtocolViolation;
    use crate::handlers;
    use crate::packet::{Packet, PacketType};
    use crate::testkit::MemoryTransport;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncWriteExt};

    struct Fixture {
        registry: Arc<ConnectionRegistry>,
        conn: Arc<Connection>,
        router: Arc<Router>,
        transport_written: Arc<std::sync::Mutex<Vec<u8>>>,
        transport_closed: Arc<std::sync::atomic::AtomicBool>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(ConnectionRegistry::new());
        let transport = MemoryTransport::new("10.0.0.9:7000");
        let transport_written = transport.written();
        let transport_closed = transport.closed();
        let conn = Arc::new(Connection::new(registry.generate_id(), transport));
        registry.register(Arc::clone(&conn));

        let router = Arc::new(Router::new(
            Arc::new(handlers::default_table()),
            Arc::new(PacketCodec::default()),
        ));

        Fixture {
            registry,
            conn,
            router,
            transport_written,
            transport_closed,
        }
    }

    fn frame(id: u32, kind: u16, body: &'static [u8]) -> Vec<u8> {
        let packet = Packet {
            id,
            kind,
            length: 0,
            body: bytes::Bytes::from_static(body),
        };
        PacketCodec::default().encode(&packet).unwrap().to_vec()
    }

    #[tokio::test]
    async fn test_ping_then_eof() {
        let f = fixture();
        let (mut client, server) = duplex(1024);

        client
            .write_all(&frame(1000, PacketType::Ping.as_u16(), b"ping"))
            .await
            .unwrap();
        client
            .write_all(&frame(1000, PacketType::Ping.as_u16(), b"again"))
            .await
            .unwrap();
        drop(client);

        let session = Session::new(
            Arc::clone(&f.conn),
            server,
            Arc::clone(&f.router),
            Arc::clone(&f.registry),
        );
        let cause = session.run().await;

        assert!(cause.is_eof());
        let pong = frame(1000, 0, b"pong");
        let mut expected = pong.clone();
        expected.extend_from_slice(&pong);
        assert_eq!(&f.transport_written.lock().unwrap()[..], &expected[..]);
        assert!(f.registry.is_empty());
        assert!(f.transport_closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unroutable_closes_without_reply() {
        let f = fixture();
        let (mut client, server) = duplex(1024);

        client
            .write_all(&frame(4000, PacketType::Ping.as_u16(), b"ping"))
            .await
            .unwrap();

        let session = Session::new(
            Arc::clone(&f.conn),
            server,
            Arc::clone(&f.router),
            Arc::clone(&f.registry),
        );

        match session.run().await {
            Error::UnroutablePacket { id: 4000, .. } => {}
            other => panic!("unexpected: {:?}", other),
        }
        assert!(f.transport_written.lock().unwrap().is_empty());
        assert!(f.registry.is_empty());
        assert!(!f.conn.is_alive());
    }

    #[tokio::test]
    async fn test_protocol_violation_terminates() {
        let f = fixture();
        let (mut client, server) = duplex(1024);

        client.write_all(&[0, 0, 0, 0]).await.unwrap();

        let session = Session::new(
            Arc::clone(&f.conn),
            server,
            Arc::clone(&f.router),
            Arc::clone(&f.registry),
        );

        match session.run().await {
            Error::ProtocolViolation(ProtocolViolation::ZeroId) => {}
            other => panic!("unexpected: {:?}", other),
        }
        assert!(f.registry.is_empty());
    }

    #[tokio::test]
    async fn test_external_removal_interrupts_read() {
        let f = fixture();
        let (_client, server) = duplex(1024);

        let session = Session::new(
            Arc::clone(&f.conn),
            server,
            Arc::clone(&f.router),
            Arc::clone(&f.registry),
        );
        let task = tokio::spawn(session.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        f.registry.remove_by_id(f.conn.id()).await.unwrap();

        let cause = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        match &cause {
            Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionAborted),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(cause.is_shutdown());
        assert!(f.registry.is_empty());
    }
}
