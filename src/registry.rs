//! Registry of live connections.
//!
//! Assigns connection ids and tracks every accepted connection until it is
//! torn down. Registration, lookup and removal may run concurrently from
//! any number of sessions; the backing map is sharded and no entry guard is
//! held across an await.

use crate::connection::Connection;
use dashmap::DashMap;
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Live connections of one server, keyed by connection id.
pub struct ConnectionRegistry {
    connections: DashMap<u64, Arc<Connection>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry. The first generated id is 1.
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Next connection id. Unique and strictly increasing for the lifetime
    /// of the registry.
    pub fn generate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Store a connection under its id. Dead connections are not stored.
    pub fn register(&self, conn: Arc<Connection>) {
        if !conn.is_alive() {
            warn!(conn_id = conn.id(), "Connection not alive, not registering");
            return;
        }

        info!(
            conn_id = conn.id(),
            local = %conn.local_addr(),
            remote = %conn.remote_addr(),
            "Connection established"
        );
        self.connections.insert(conn.id(), conn);
    }

    /// Find a live connection by id.
    pub fn lookup(&self, id: u64) -> Option<Arc<Connection>> {
        self.connections
            .get(&id)
            .filter(|entry| entry.is_alive())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// All live connections whose remote address is `host`.
    ///
    /// An empty or unparseable host matches nothing.
    pub fn lookup_by_remote_host(&self, host: &str) -> Vec<Arc<Connection>> {
        let Some(ip) = parse_host(host) else {
            return Vec::new();
        };

        self.connections
            .iter()
            .filter(|entry| entry.is_alive() && entry.remote_addr().ip() == ip)
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Tear down and forget a connection.
    ///
    /// Removing an unknown id succeeds. If the connection is still alive it
    /// is marked dead and its transport closed first; when the close fails
    /// the error is returned and the entry stays registered.
    pub async fn remove_by_id(&self, id: u64) -> io::Result<()> {
        let conn = match self.connections.get(&id) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                debug!(conn_id = id, "Connection already removed");
                return Ok(());
            }
        };

        self.remove(&conn).await
    }

    /// Tear down the first connection found for `host`.
    ///
    /// Ties between connections sharing a host are not disambiguated.
    pub async fn remove_by_remote_host(&self, host: &str) -> io::Result<()> {
        let found = parse_host(host).and_then(|ip| {
            self.connections
                .iter()
                .find(|entry| entry.remote_addr().ip() == ip)
                .map(|entry| Arc::clone(entry.value()))
        });

        match found {
            Some(conn) => self.remove(&conn).await,
            None => {
                debug!(host, "No connection for remote host");
                Ok(())
            }
        }
    }

    async fn remove(&self, conn: &Connection) -> io::Result<()> {
        if conn.mark_dead() {
            if let Err(e) = conn.close_transport().await {
                error!(conn_id = conn.id(), error = %e, "Failed to close connection");
                return Err(e);
            }
        }

        self.connections.remove(&conn.id());
        Ok(())
    }

    /// Snapshot of every registered connection, dead or alive.
    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_host(host: &str) -> Option<IpAddr> {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::MemoryTransport;
    use std::collections::HashSet;
    use std::thread;

    fn conn(registry: &ConnectionRegistry, peer: &str) -> Arc<Connection> {
        Arc::new(Connection::new(
            registry.generate_id(),
            MemoryTransport::new(peer),
        ))
    }

    #[test]
    fn test_generate_id_sequential() {
        let registry = ConnectionRegistry::new();
        let ids: Vec<u64> = (0..100).map(|_| registry.generate_id()).collect();

        assert_eq!(ids[0], 1);
        assert!(ids.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[test]
    fn test_generate_id_concurrent() {
        let registry = Arc::new(ConnectionRegistry::new());
        let threads = 8;
        let per_thread = 1000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..per_thread)
                        .map(|_| registry.generate_id())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }

        let total = (threads * per_thread) as u64;
        assert_eq!(seen.len() as u64, total);
        // No gaps either: exactly 1..=total.
        assert_eq!(seen.iter().copied().max(), Some(total));
        assert_eq!(seen.iter().copied().min(), Some(1));
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = ConnectionRegistry::new();
        let c1 = conn(&registry, "10.0.0.1:5000");
        let c2 = conn(&registry, "10.0.0.2:5000");

        registry.register(Arc::clone(&c1));
        registry.register(Arc::clone(&c2));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup(c1.id()).unwrap().id(), c1.id());
        assert!(registry.lookup(999).is_none());
    }

    #[tokio::test]
    async fn test_register_dead_connection_is_noop() {
        let registry = ConnectionRegistry::new();
        let c = conn(&registry, "10.0.0.1:5000");
        c.mark_dead();

        registry.register(c);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_skips_dead() {
        let registry = ConnectionRegistry::new();
        let c = conn(&registry, "10.0.0.1:5000");
        registry.register(Arc::clone(&c));

        c.mark_dead();
        assert!(registry.lookup(c.id()).is_none());
        assert!(registry.lookup_by_remote_host("10.0.0.1").is_empty());
        // Still listed for shutdown until removed.
        assert_eq!(registry.all().len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_by_remote_host() {
        let registry = ConnectionRegistry::new();
        for peer in ["10.0.0.1:5000", "10.0.0.1:5001", "10.0.0.2:5000"] {
            registry.register(conn(&registry, peer));
        }

        assert_eq!(registry.lookup_by_remote_host("10.0.0.1").len(), 2);
        assert_eq!(registry.lookup_by_remote_host("10.0.0.2").len(), 1);
        assert!(registry.lookup_by_remote_host("10.0.0.3").is_empty());
        assert!(registry.lookup_by_remote_host("").is_empty());
        assert!(registry.lookup_by_remote_host("not-a-host").is_empty());
    }

    #[tokio::test]
    async fn test_remove_by_id_idempotent() {
        let registry = ConnectionRegistry::new();
        let transport = MemoryTransport::new("10.0.0.1:5000");
        let close_calls = transport.close_calls();
        let c = Arc::new(Connection::new(registry.generate_id(), transport));
        registry.register(Arc::clone(&c));

        registry.remove_by_id(c.id()).await.unwrap();
        assert!(registry.is_empty());
        assert!(!c.is_alive());

        registry.remove_by_id(c.id()).await.unwrap();
        assert!(registry.is_empty());
        assert_eq!(close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_unknown_id() {
        let registry = ConnectionRegistry::new();
        registry.remove_by_id(42).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_close_failure_keeps_entry() {
        let registry = ConnectionRegistry::new();
        let (transport, fail_close) = MemoryTransport::new("10.0.0.1:5000").failing_close();
        let c = Arc::new(Connection::new(registry.generate_id(), transport));
        registry.register(Arc::clone(&c));

        assert!(registry.remove_by_id(c.id()).await.is_err());
        assert_eq!(registry.len(), 1);
        assert!(!c.is_alive());

        // Already dead: the retry only forgets the entry.
        fail_close.store(false, Ordering::SeqCst);
        registry.remove_by_id(c.id()).await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_remove_by_remote_host() {
        let registry = ConnectionRegistry::new();
        let a = conn(&registry, "10.0.0.1:5000");
        let b = conn(&registry, "10.0.0.2:5000");
        registry.register(Arc::clone(&a));
        registry.register(Arc::clone(&b));

        registry.remove_by_remote_host("10.0.0.1").await.unwrap();
        assert!(!a.is_alive());
        assert!(b.is_alive());
        assert_eq!(registry.len(), 1);

        registry.remove_by_remote_host("10.0.0.1").await.unwrap();
        registry.remove_by_remote_host("").await.unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_register_and_remove() {
        let registry = Arc::new(ConnectionRegistry::new());

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    let c = Arc::new(Connection::new(
                        registry.generate_id(),
                        MemoryTransport::new(&format!("10.0.1.{}:6000", i % 250)),
                    ));
                    registry.register(Arc::clone(&c));
                    if i % 2 == 0 {
                        registry.remove_by_id(c.id()).await.unwrap();
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.len(), 32);
        assert!(registry.all().iter().all(|c| c.is_alive()));
    }
}
