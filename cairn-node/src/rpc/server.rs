use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

use jsonrpsee::server::{ServerBuilder, ServerHandle};

use cairn_anchor::engine::AnchorEngine;

use super::handlers::{AnchorRpcImpl, AnchorRpcServer};
use crate::error::NodeError;
use crate::metrics::NodeMetrics;

/// Start the JSON-RPC HTTP+WS server. Returns the bound address, which
/// differs from `addr` when it asks for port 0.
pub async fn start_rpc_server(
    addr: &str,
    engine: Arc<RwLock<AnchorEngine>>,
    metrics: Arc<NodeMetrics>,
) -> Result<(ServerHandle, SocketAddr), NodeError> {
    let server = ServerBuilder::default()
        .build(addr)
        .await
        .map_err(|e| NodeError::RpcError {
            reason: format!("failed to build RPC server: {}", e),
        })?;
    let local_addr = server.local_addr().map_err(|e| NodeError::RpcError {
        reason: format!("failed to read RPC address: {}", e),
    })?;

    let rpc_impl = AnchorRpcImpl { engine, metrics };
    let handle = server.start(rpc_impl.into_rpc());

    tracing::info!(addr = %local_addr, "RPC server started");

    Ok((handle, local_addr))
}
