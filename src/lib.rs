//! frame-router: a TCP server for a length-prefixed binary protocol.
//!
//! Packets are framed as a 10-byte big-endian header (`id`, `type`,
//! `length`) followed by the body. The `id` is a routing key: each decoded
//! packet is handed to the handler registered for it.
//!
//! Components:
//! - `codec`: framing of packets to and from bytes
//! - `registry`: live connections, their ids and teardown
//! - `router`: routing key to handler dispatch
//! - `session`: per-connection decode, dispatch, handle loop
//! - `server`: listener, accept loop and shutdown

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod packet;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;

#[cfg(test)]
pub(crate) mod testkit;

pub use codec::{Codec, PacketCodec};
pub use error::{Error, HandlerError, ProtocolViolation, Result};
pub use packet::{Packet, PacketType};
pub use registry::ConnectionRegistry;
pub use router::{Binding, DispatchTable, Handler, Router};
pub use server::Server;
