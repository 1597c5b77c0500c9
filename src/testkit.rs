//! Shared test fixtures.

use crate::connection::Transport;
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory transport that records writes and close calls.
pub struct MemoryTransport {
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    written: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
    close_calls: Arc<AtomicUsize>,
    fail_close: Arc<AtomicBool>,
}

impl MemoryTransport {
    pub fn new(peer: &str) -> Self {
        Self {
            local_addr: "127.0.0.1:9000".parse().unwrap(),
            peer_addr: peer.parse().unwrap(),
            written: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            close_calls: Arc::new(AtomicUsize::new(0)),
            fail_close: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every `close` call fail until the returned flag is cleared.
    pub fn failing_close(self) -> (Self, Arc<AtomicBool>) {
        self.fail_close.store(true, Ordering::SeqCst);
        let flag = Arc::clone(&self.fail_close);
        (self, flag)
    }

    pub fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }

    pub fn closed(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    pub fn close_calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.close_calls)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        }
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(())
    }

    async fn close(&self) -> io::Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(io::Error::other("close failed"));
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}
