//! TCP server: accept loop and shutdown.
//!
//! Each server owns one listening socket and one connection registry.
//! Every accepted socket is registered and driven by its own session task;
//! the accept loop never waits on a session.

use crate::config::{Network, ServerConfig};
use crate::connection::{Connection, TcpTransport};
use crate::registry::ConnectionRegistry;
use crate::router::Router;
use crate::session::Session;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Read buffer size per connection.
const BUFFER_SIZE: usize = 8 * 1024;

/// A running server instance.
pub struct Server {
    name: String,
    local_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    accept_task: JoinHandle<()>,
}

impl Server {
    /// Resolve and bind the configured endpoint, then start accepting.
    pub async fn start(config: &ServerConfig, backlog: u32, router: Arc<Router>) -> io::Result<Self> {
        let addr = resolve(config.network, &config.host, config.port).await?;
        let listener = TcpListener::from_std(create_listener(addr, backlog)?)?;
        let local_addr = listener.local_addr()?;

        info!(
            server = %config.name,
            network = ?config.network,
            address = %local_addr,
            "Server listening"
        );
        for (route, handler) in router.table().iter() {
            debug!(server = %config.name, route, handler = handler.name(), "Route registered");
        }

        let registry = Arc::new(ConnectionRegistry::new());
        let accept_task = tokio::spawn(accept_loop(
            config.name.clone(),
            listener,
            Arc::clone(&registry),
            router,
        ));

        Ok(Server {
            name: config.name.clone(),
            local_addr,
            registry,
            accept_task,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Stop accepting and close every registered connection.
    ///
    /// Connections already torn down by their own sessions are skipped.
    /// Every removal is attempted; the first failure is returned.
    pub async fn stop(&self) -> io::Result<()> {
        self.accept_task.abort();

        let mut first_error = None;
        for conn in self.registry.all() {
            if !conn.is_alive() {
                continue;
            }
            if let Err(e) = self.registry.remove_by_id(conn.id()).await {
                warn!(server = %self.name, conn_id = conn.id(), error = %e, "Failed to close connection on stop");
                first_error.get_or_insert(e);
            }
        }

        info!(server = %self.name, "Server stopped");
        first_error.map_or(Ok(()), Err)
    }
}

async fn accept_loop(
    name: String,
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    router: Arc<Router>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if let Err(e) = spawn_session(stream, peer, &registry, &router) {
                    warn!(server = %name, peer = %peer, error = %e, "Failed to set up connection");
                }
            }
            Err(e) => {
                error!(server = %name, error = %e, "Failed to accept connection");
            }
        }
    }
}

fn spawn_session(
    stream: TcpStream,
    peer: SocketAddr,
    registry: &Arc<ConnectionRegistry>,
    router: &Arc<Router>,
) -> io::Result<()> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
    }
    let local = stream.local_addr()?;
    let (reader, writer) = stream.into_split();

    let conn = Arc::new(Connection::new(
        registry.generate_id(),
        TcpTransport::new(writer, local, peer),
    ));
    registry.register(Arc::clone(&conn));

    let session = Session::new(
        conn,
        BufReader::with_capacity(BUFFER_SIZE, reader),
        Arc::clone(router),
        Arc::clone(registry),
    );
    tokio::spawn(async move {
        session.run().await;
    });

    Ok(())
}

/// Resolve `host:port`, keeping only addresses the network allows.
async fn resolve(network: Network, host: &str, port: u16) -> io::Result<SocketAddr> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    tokio::net::lookup_host((host, port))
        .await?
        .find(|addr| network.accepts(addr))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no {network:?} address for {host}:{port}"),
            )
        })
}

fn create_listener(addr: SocketAddr, backlog: u32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

    Ok(socket.into())
}
