//! Shared test infrastructure.
//!
//! The engine mutates state synchronously behind its event queue, so tests
//! drive a [`Network`] directly: every "connection" is a captured channel
//! pair and `line()` mirrors exactly what the engine does for a received
//! line. No sockets, no timing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use weftd::config::Config;
use weftd::conn::Connection;
use weftd::state::Network;

pub struct TestNet {
    pub net: Network,
    next_conn: u64,
    conns: HashMap<String, u64>,
    outs: HashMap<String, UnboundedReceiver<String>>,
}

impl TestNet {
    pub fn new() -> Self {
        Self::with_config(Config::for_testing())
    }

    pub fn with_config(conf: Config) -> Self {
        Self {
            net: Network::new(Arc::new(conf)),
            next_conn: 1,
            conns: HashMap::new(),
            outs: HashMap::new(),
        }
    }

    /// Accept a connection under a label; returns the allocated UID.
    pub fn connect(&mut self, label: &str) -> String {
        self.connect_from(label, "1.2.3.4")
    }

    pub fn connect_from(&mut self, label: &str, ip: &str) -> String {
        let conn_id = self.next_conn;
        self.next_conn += 1;
        let (tx, rx) = unbounded_channel();
        let conn = Connection::new(conn_id, ip, false, tx);
        let id = self.net.register_local_conn(conn).expect("uid allocation");
        self.conns.insert(label.to_string(), conn_id);
        self.outs.insert(label.to_string(), rx);
        id
    }

    /// Feed one raw line, the way the engine does for a Line event.
    pub fn line(&mut self, label: &str, raw: &str) {
        let conn_id = self.conns[label];
        let now = self.net.now();
        if let Some(conn) = self.net.conns.get_mut(&conn_id) {
            conn.handshake_started = true;
            conn.enqueue_recv(now, raw.to_string());
        }
        self.net.drain_conn(conn_id);
        self.net.enforce_flood(conn_id);
    }

    pub fn lines(&mut self, label: &str, raws: &[&str]) {
        for raw in raws {
            self.line(label, raw);
        }
    }

    /// Everything queued for this connection since the last drain.
    pub fn drain(&mut self, label: &str) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(rx) = self.outs.get_mut(label) {
            while let Ok(line) = rx.try_recv() {
                out.push(line);
            }
        }
        out
    }

    /// The raw connection id for a label.
    pub fn conn_id(&self, label: &str) -> u64 {
        self.conns[label]
    }

    /// The entity id currently owning this connection (servers re-key
    /// to their SID during link auth).
    pub fn id_of(&self, label: &str) -> String {
        self.net
            .conn_owner(self.conns[label])
            .unwrap_or_else(|| "<gone>".to_string())
    }

    pub fn is_connected(&self, label: &str) -> bool {
        self.net.conn_owner(self.conns[label]).is_some()
    }

    /// NICK + USER registration, output drained and returned.
    pub fn register(&mut self, label: &str, nick: &str) -> Vec<String> {
        self.line(label, &format!("NICK {}", nick));
        self.line(label, &format!("USER {} 0 * :{} test user", nick, nick));
        self.drain(label)
    }

    /// Authenticate a peer as the configured test link block
    /// (`leaf.weft.test`, password `linkpass`) and return our side of the
    /// exchange (intro + burst).
    pub fn link_server(&mut self, label: &str, sid: &str) -> Vec<String> {
        self.connect_from(label, "10.0.0.2");
        self.line(label, "PASS :linkpass");
        self.line(label, &format!("PROTOCTL EAUTH=leaf.weft.test SID={}", sid));
        self.line(label, "SERVER leaf.weft.test 1 :Test leaf");
        self.drain(label)
    }

    /// Count of members in a channel, 0 when absent.
    pub fn member_count(&self, chan: &str) -> usize {
        self.net.channel(chan).map(|c| c.member_count()).unwrap_or(0)
    }
}

/// True when any line contains the needle.
pub fn any_line(lines: &[String], needle: &str) -> bool {
    lines.iter().any(|l| l.contains(needle))
}

/// Index of the first line containing the needle.
pub fn find_line(lines: &[String], needle: &str) -> Option<usize> {
    lines.iter().position(|l| l.contains(needle))
}
