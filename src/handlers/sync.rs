//! Sync stub: accepts packets on its route and logs them.

use crate::error::HandlerError;
use crate::packet::Packet;
use crate::router::{Binding, Handler};
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct SyncHandler;

#[async_trait]
impl Handler for SyncHandler {
    fn name(&self) -> &'static str {
        "sync"
    }

    async fn handle(&self, binding: &Binding<'_>, packet: Packet) -> Result<(), HandlerError> {
        debug!(
            conn_id = binding.connection().id(),
            id = packet.id,
            kind = packet.kind,
            length = packet.length,
            "Handling sync"
        );
        Ok(())
    }
}
