//! Built-in handlers.
//!
//! ## Routes
//! - `1000` ([`PingHandler`]): answers every packet with `pong`
//! - `2000` ([`SyncHandler`]): accepts sync packets without replying
//! - `3000` ([`RpcHandler`]): accepts rpc packets without replying

pub mod ping;
pub mod rpc;
pub mod sync;

pub use ping::PingHandler;
pub use rpc::RpcHandler;
pub use sync::SyncHandler;

use crate::router::DispatchTable;
use std::sync::Arc;

/// Routing key of the ping responder.
pub const PING_ROUTE: u32 = 1000;
/// Routing key of the sync stub.
pub const SYNC_ROUTE: u32 = 2000;
/// Routing key of the rpc stub.
pub const RPC_ROUTE: u32 = 3000;

/// Dispatch table with every built-in handler registered.
pub fn default_table() -> DispatchTable {
    let mut table = DispatchTable::new();
    table.register(PING_ROUTE, Arc::new(PingHandler));
    table.register(SYNC_ROUTE, Arc::new(SyncHandler));
    table.register(RPC_ROUTE, Arc::new(RpcHandler));
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = default_table();
        let routes: Vec<(u32, &str)> = table.iter().map(|(k, h)| (k, h.name())).collect();
        assert_eq!(
            routes,
            vec![(1000, "ping"), (2000, "sync"), (3000, "rpc")]
        );
    }
}
