//! Ping responder.
//!
//! Replies to any packet on its route with a `pong` body routed back under
//! the same key. The inbound body is ignored, which makes the route useful
//! for health checks and for measuring round-trip latency through the full
//! decode, dispatch and encode path.
//!
//! ```text
//! Request:  {id: 1000, type: 1234, length: 4, body: "ping"}
//! Response: {id: 1000, type: 0,    length: 4, body: "pong"}
//! ```

use crate::error::HandlerError;
use crate::packet::Packet;
use crate::router::{Binding, Handler};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

const PONG: &[u8] = b"pong";

/// Answers every packet with `pong`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PingHandler;

#[async_trait]
impl Handler for PingHandler {
    fn name(&self) -> &'static str {
        "ping"
    }

    async fn handle(&self, binding: &Binding<'_>, packet: Packet) -> Result<(), HandlerError> {
        debug!(
            conn_id = binding.connection().id(),
            id = packet.id,
            kind = packet.kind,
            length = packet.length,
            "Handling ping"
        );

        binding
            .write(&Packet::reply(packet.id, Bytes::from_static(PONG)))
            .await
    }
}
