//! Routing of decoded packets to handlers.
//!
//! The [`DispatchTable`] maps a packet's routing key (its `id`) to a shared
//! [`Handler`]. It is filled in at startup and then frozen inside a
//! [`Router`], which every session of every server shares.

use crate::codec::Codec;
use crate::connection::Connection;
use crate::error::{Error, HandlerError, Result};
use crate::packet::Packet;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// Business logic for one routing key.
///
/// Handlers are shared between all connections and must not keep
/// per-connection state; everything about the current connection comes in
/// through the [`Binding`].
#[async_trait]
pub trait Handler: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Process one packet. May write at most one reply through `binding`.
    async fn handle(&self, binding: &Binding<'_>, packet: Packet)
        -> std::result::Result<(), HandlerError>;
}

/// The codec paired with the connection a packet arrived on.
pub struct Binding<'a> {
    conn: &'a Connection,
    codec: &'a dyn Codec,
}

impl<'a> Binding<'a> {
    pub fn new(conn: &'a Connection, codec: &'a dyn Codec) -> Self {
        Self { conn, codec }
    }

    /// Connection the packet arrived on.
    pub fn connection(&self) -> &Connection {
        self.conn
    }

    /// Encode `packet` and write it back on the bound connection.
    pub async fn write(&self, packet: &Packet) -> std::result::Result<(), HandlerError> {
        let frame = self.codec.encode(packet)?;
        self.conn.write(&frame).await?;
        trace!(
            conn_id = self.conn.id(),
            id = packet.id,
            bytes = frame.len(),
            "Wrote reply"
        );
        Ok(())
    }
}

/// Routing key to handler mapping.
#[derive(Default)]
pub struct DispatchTable {
    handlers: BTreeMap<u32, Arc<dyn Handler>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `key`, returning the one it replaces.
    pub fn register(&mut self, key: u32, handler: Arc<dyn Handler>) -> Option<Arc<dyn Handler>> {
        self.handlers.insert(key, handler)
    }

    pub fn lookup(&self, key: u32) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(&key)
    }

    /// Registered routes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Arc<dyn Handler>)> {
        self.handlers.iter().map(|(key, handler)| (*key, handler))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Frozen dispatch table plus the codec replies are written with.
pub struct Router {
    table: Arc<DispatchTable>,
    codec: Arc<dyn Codec>,
}

impl Router {
    pub fn new(table: Arc<DispatchTable>, codec: Arc<dyn Codec>) -> Self {
        Self { table, codec }
    }

    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// Pair the shared codec with `conn` for the next dispatch.
    pub fn bind<'a>(&'a self, conn: &'a Connection) -> Binding<'a> {
        Binding::new(conn, self.codec.as_ref())
    }

    /// Hand `packet` to the handler registered for its routing key.
    pub async fn dispatch(&self, binding: &Binding<'_>, packet: Packet) -> Result<()> {
        let handler = self
            .table
            .lookup(packet.id)
            .ok_or(Error::UnroutablePacket {
                id: packet.id,
                kind: packet.kind,
            })?;

        trace!(
            conn_id = binding.connection().id(),
            route = packet.id,
            handler = handler.name(),
            "Dispatching packet"
        );
        handler.handle(binding, packet).await?;
        Ok(())
    }
}
