//! Outgoing link connector.
//!
//! Autoconnect links get a task that dials the peer and, on loss, retries
//! with linear backoff. The connected socket is handed to the engine like
//! any accepted one, carrying the link block name so negotiation starts
//! immediately.

use crate::config::LinkBlock;
use crate::engine::Event;
use crate::gateway::spawn_socket_tasks;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{info, warn};

const RECONNECT_DELAY_SECS: u64 = 60;

/// Keep one autoconnect link alive.
pub fn spawn_link_connector(
    link: LinkBlock,
    events: mpsc::UnboundedSender<Event>,
    conn_ids: Arc<AtomicU64>,
) {
    tokio::spawn(async move {
        let (Some(host), Some(port)) = (link.host.clone(), link.port) else {
            warn!(link = %link.name, "autoconnect link without host/port");
            return;
        };
        loop {
            match TcpStream::connect((host.as_str(), port)).await {
                Ok(stream) => {
                    info!(link = %link.name, host = %host, port, "outgoing link connected");
                    let conn_id = conn_ids.fetch_add(1, Ordering::Relaxed);
                    let ip = stream
                        .peer_addr()
                        .map(|a| a.ip().to_string())
                        .unwrap_or_else(|_| host.clone());
                    let closed = spawn_socket_tasks(
                        stream,
                        conn_id,
                        ip,
                        false,
                        Some(link.name.clone()),
                        events.clone(),
                    );
                    // Hold the retry loop until the link dies.
                    let _ = closed.await;
                    warn!(link = %link.name, "link lost, reconnecting after backoff");
                }
                Err(e) => {
                    warn!(link = %link.name, error = %e, "connect failed");
                }
            }
            tokio::time::sleep(std::time::Duration::from_secs(RECONNECT_DELAY_SECS)).await;
        }
    });
}
