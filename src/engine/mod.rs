//! The engine: single owner of the world, fed by queued events.
//!
//! Socket tasks, timers and connectors never touch state; they enqueue
//! [`Event`]s and the engine task applies them one at a time. The
//! maintenance tick drives delayed execution, flood decay, ban expiry and
//! the registration-delay window.

pub mod dispatch;

use crate::conn::{ConnId, Connection};
use crate::state::network::Network;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Everything that can happen to the world.
#[derive(Debug)]
pub enum Event {
    /// A socket was accepted (or an outgoing link socket connected).
    Accepted {
        conn_id: ConnId,
        ip: String,
        tls: bool,
        tx: mpsc::UnboundedSender<String>,
        /// Set for outgoing link sockets: the link block to negotiate.
        link_name: Option<String>,
    },
    /// A framed line arrived on a socket.
    Line { conn_id: ConnId, line: String },
    /// A socket went away.
    Closed { conn_id: ConnId, reason: String },
    /// One-second maintenance tick.
    Tick,
}

/// The engine task: owns the [`Network`], drains the event queue.
pub struct Engine {
    pub net: Network,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Engine {
    pub fn new(net: Network, rx: mpsc::UnboundedReceiver<Event>) -> Self {
        Self { net, rx }
    }

    /// Run until every event sender is gone.
    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                event = self.rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        info!("event queue closed, engine stopping");
                        return;
                    }
                },
                _ = tick.tick() => self.handle_event(Event::Tick),
            }
        }
    }

    /// Apply one event. Synchronous: this is the only place state mutates.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Accepted { conn_id, ip, tls, tx, link_name } => {
                let mut conn = Connection::new(conn_id, &ip, tls, tx);
                conn.link_name = link_name.clone();
                match self.net.register_local_conn(conn) {
                    Ok(id) => {
                        if let Some(link) = link_name {
                            self.net.start_outgoing_handshake(&id, &link);
                        }
                    }
                    Err(e) => {
                        debug!(conn = conn_id, error = %e, "rejecting connection");
                    }
                }
            }
            Event::Line { conn_id, line } => {
                let now = self.net.now();
                let Some(owner) = self.net.conn_owner(conn_id) else {
                    return;
                };
                if let Some(entity) = self.net.entity_mut(&owner) {
                    if !entity.flags.handshake_finished {
                        entity.flags.handshake_finished = true;
                    }
                }
                if let Some(conn) = self.net.conns.get_mut(&conn_id) {
                    conn.handshake_started = true;
                    conn.enqueue_recv(now, line);
                }
                self.net.drain_conn(conn_id);
                self.net.enforce_flood(conn_id);
            }
            Event::Closed { conn_id, reason } => {
                if let Some(owner) = self.net.conn_owner(conn_id) {
                    self.net.exit_client(&owner, &reason);
                }
            }
            Event::Tick => self.net.tick(),
        }
    }
}

impl Network {
    /// Evaluate flood limits for a connection and exit it on violation.
    pub fn enforce_flood(&mut self, conn_id: ConnId) {
        let Some(violation) = self.check_flood(conn_id) else {
            return;
        };
        let Some(owner) = self.conn_owner(conn_id) else {
            return;
        };
        let name = self
            .entity(&owner)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| "*".to_string());
        self.send_snomask(
            None,
            'f',
            &format!(
                "Flood from {}: {} at {} while the limit is {}",
                name, violation.what, violation.amount, violation.limit
            ),
            false,
        );
        self.exit_client(&owner, "Excess Flood");
    }

    /// One-second maintenance pass.
    pub fn tick(&mut self) {
        let now = self.now();

        // Delayed lines become executable; flood limits re-evaluate.
        let conn_ids: Vec<ConnId> = self.conns.keys().copied().collect();
        for conn_id in conn_ids {
            self.drain_conn(conn_id);
            self.enforce_flood(conn_id);
        }

        // Server-ban expiry, with an operator trace.
        for tkl in self.tkl.sweep_expired(now) {
            let what = crate::security::tkl::flag_def(tkl.flag)
                .map(|d| d.name)
                .unwrap_or("TKL");
            self.send_snomask(
                None,
                't',
                &format!("Expiring {} {} (set by {})", what, tkl.mask(), tkl.set_by),
                false,
            );
        }

        self.sweep_timed_listmodes(now);

        // Registration delays: drop what expired, then re-check the
        // affected clients for promotion.
        let expired: Vec<String> = self
            .delayed_connections
            .iter()
            .filter(|d| d.expire <= now)
            .map(|d| d.entity.clone())
            .collect();
        if !expired.is_empty() {
            self.delayed_connections.retain(|d| d.expire > now);
            for id in expired {
                if self.entity(&id).is_some() {
                    crate::handlers::welcome::try_register(self, &id);
                }
            }
        }
    }

    /// Remove lapsed `~time:` list entries, announcing the unset.
    fn sweep_timed_listmodes(&mut self, now: i64) {
        let mut removals: Vec<(String, char, String)> = Vec::new();
        for chan in self.channels.values() {
            for (&flag, entries) in &chan.lists {
                for entry in entries {
                    if crate::modes::extban::timed_expired(&entry.mask, entry.set_time, now) {
                        removals.push((chan.name.clone(), flag, entry.mask.clone()));
                    }
                }
            }
        }
        for (chan_name, flag, mask) in removals {
            if let Some(chan) = self.channel_mut(&chan_name) {
                chan.remove_list_entry(flag, &mask);
            }
            let me = self.me_name();
            let line = format!(":{} MODE {} -{} {}", me, chan_name, flag, mask);
            self.broadcast_to_channel(&chan_name, None, None, &[], &line);
            let local_only = self.channel(&chan_name).is_some_and(|c| c.is_local_only());
            if !local_only {
                let line = format!(":{} MODE {} -{} {}", self.me, chan_name, flag, mask);
                self.send_to_servers(None, &[], &line);
            }
        }
    }
}
