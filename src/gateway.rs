//! The gateway: listening sockets, accept throttling and socket tasks.
//!
//! Accepted sockets are framed into lines and forwarded to the engine as
//! events; nothing here touches server state. The per-IP accept throttle
//! runs before a connection reaches the engine at all.

use crate::config::{Config, TlsConfig};
use crate::engine::Event;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// Recent connection timestamps per IP, for the accept throttle.
pub type ThrottleMap = Arc<DashMap<String, Vec<i64>>>;

/// Bind every configured listener and start accepting.
pub async fn run_gateway(
    conf: Arc<Config>,
    events: mpsc::UnboundedSender<Event>,
    conn_ids: Arc<AtomicU64>,
) -> anyhow::Result<()> {
    let throttle: ThrottleMap = Arc::new(DashMap::new());
    let tls_acceptor = match &conf.tls {
        Some(tls) => Some(build_tls_acceptor(tls)?),
        None => None,
    };

    for listen in &conf.listen {
        let listener = TcpListener::bind((listen.addr.as_str(), listen.port)).await?;
        info!(addr = %listen.addr, port = listen.port, tls = listen.tls, "listening");
        let acceptor = if listen.tls { tls_acceptor.clone() } else { None };
        let conf = Arc::clone(&conf);
        let events = events.clone();
        let conn_ids = Arc::clone(&conn_ids);
        let throttle = Arc::clone(&throttle);

        tokio::spawn(async move {
            loop {
                let (stream, addr) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let ip = addr.ip().to_string();
                if throttled(&conf, &throttle, &ip) {
                    debug!(ip = %ip, "throttling connection");
                    let mut stream = stream;
                    let _ = stream
                        .write_all(b"ERROR :Throttling - you are (re)connecting too fast\r\n")
                        .await;
                    continue;
                }

                let conn_id = conn_ids.fetch_add(1, Ordering::Relaxed);
                match &acceptor {
                    Some(acceptor) => {
                        let acceptor = acceptor.clone();
                        let events = events.clone();
                        tokio::spawn(async move {
                            match acceptor.accept(stream).await {
                                Ok(tls_stream) => {
                                    let _ =
                                        spawn_socket_tasks(tls_stream, conn_id, ip, true, None, events);
                                }
                                Err(e) => debug!(error = %e, "TLS handshake failed"),
                            }
                        });
                    }
                    None => {
                        let _ = spawn_socket_tasks(stream, conn_id, ip, false, None, events.clone());
                    }
                }
            }
        });
    }
    Ok(())
}

/// Whether an IP exceeded `throttle = "count:seconds"`.
fn throttled(conf: &Config, throttle: &ThrottleMap, ip: &str) -> bool {
    let Some((count, window)) = conf.throttle_policy() else {
        return false;
    };
    let now = chrono::Utc::now().timestamp();
    let mut entry = throttle.entry(ip.to_string()).or_default();
    entry.retain(|&t| now - t <= window);
    if entry.len() >= count {
        return true;
    }
    entry.push(now);
    false
}

/// Spawn the reader/writer pair for one socket.
///
/// Returns a receiver resolved when the socket closes; the connector uses
/// it to pace reconnects.
pub fn spawn_socket_tasks<S>(
    stream: S,
    conn_id: u64,
    ip: String,
    tls: bool,
    link_name: Option<String>,
    events: mpsc::UnboundedSender<Event>,
) -> oneshot::Receiver<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (closed_tx, closed_rx) = oneshot::channel();

    let _ = events.send(Event::Accepted {
        conn_id,
        ip,
        tls,
        tx: out_tx,
        link_name,
    });

    // Writer: engine lines out, CRLF framed. Ends when the engine drops
    // the sender (connection exit).
    tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if write_half.write_all(b"\r\n").await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    // Reader: CR/LF tolerant line framing into engine events.
    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        let reason = loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim_end_matches('\r').to_string();
                    if events.send(Event::Line { conn_id, line }).is_err() {
                        break "engine gone".to_string();
                    }
                }
                Ok(None) => break "Connection closed".to_string(),
                Err(e) => break format!("Read error: {}", e),
            }
        };
        let _ = events.send(Event::Closed { conn_id, reason });
        let _ = closed_tx.send(());
    });

    closed_rx
}

fn build_tls_acceptor(conf: &TlsConfig) -> anyhow::Result<TlsAcceptor> {
    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(std::fs::File::open(
        &conf.cert,
    )?))
    .collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(std::fs::File::open(
        &conf.key,
    )?))?
    .ok_or_else(|| anyhow::anyhow!("no private key in {}", conf.key))?;
    let config = tokio_rustls::rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}
