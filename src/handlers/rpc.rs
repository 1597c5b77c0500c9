//! Rpc stub: accepts packets on its route and logs them.

use crate::error::HandlerError;
use crate::packet::Packet;
use crate::router::{Binding, Handler};
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct RpcHandler;

#[async_trait]
impl Handler for RpcHandler {
    fn name(&self) -> &'static str {
        "rpc"
    }

    async fn handle(&self, binding: &Binding<'_>, packet: Packet) -> Result<(), HandlerError> {
        debug!(
            conn_id = binding.connection().id(),
            id = packet.id,
            kind = packet.kind,
            length = packet.length,
            body = %String::from_utf8_lossy(&packet.body),
            "Handling rpc"
        );
        Ok(())
    }
}
