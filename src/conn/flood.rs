//! Flood and penalty accounting.
//!
//! Evaluated after every received line and on the maintenance tick.
//! recvq/sendq compare windowed byte sums against the connection class;
//! the buffered-command cap kicks in one second after signon; the penalty
//! counter decays to zero after sixty quiet seconds and trips at one
//! million units (ten million for operators).

use crate::conn::ConnId;
use crate::state::network::Network;

const PENALTY_LIMIT: u64 = 1_000_000;
const PENALTY_LIMIT_OPER: u64 = 10_000_000;
const PENALTY_DECAY_SECS: i64 = 60;

/// Outcome of a flood evaluation.
#[derive(Debug, PartialEq, Eq)]
pub struct FloodViolation {
    /// Which limit tripped, for the operator notice.
    pub what: &'static str,
    pub amount: u64,
    pub limit: u64,
}

impl Network {
    /// Add penalty units to a connection's counter, unless the owning
    /// entity is currently flood-safe.
    pub fn add_penalty(&mut self, conn_id: ConnId, amount: u64) {
        let flood_safe = self
            .conn_owner(conn_id)
            .and_then(|id| self.entity(&id))
            .is_some_and(|e| e.flags.flood_safe);
        if flood_safe {
            return;
        }
        let now = self.now();
        if let Some(conn) = self.conns.get_mut(&conn_id) {
            if conn.penalty_since == 0 {
                conn.penalty_since = now;
            }
            conn.penalty += amount;
        }
    }

    /// Evaluate every flood limit for one connection.
    ///
    /// Returns the violation when the connection must be dropped; the
    /// caller exits it with "Excess Flood" and raises snomask `f`.
    pub fn check_flood(&mut self, conn_id: ConnId) -> Option<FloodViolation> {
        let now = self.now();
        let owner = self.conn_owner(conn_id)?;
        let (is_oper, flood_safe) = match self.entity(&owner) {
            Some(e) => (e.is_oper(), e.flags.flood_safe),
            None => (false, false),
        };

        let (recvq_limit, sendq_limit) = {
            let conn = self.conns.get(&conn_id)?;
            let class = conn.class.as_deref().and_then(|name| self.conf.class(name));
            (
                class.map(|c| c.recvq).unwrap_or(65536),
                class.map(|c| c.sendq).unwrap_or(65536),
            )
        };

        let conn = self.conns.get_mut(&conn_id)?;
        conn.age_buffers(now);

        if flood_safe {
            conn.sendq_buffer.clear();
            return None;
        }

        let recv_bytes = conn.recvq_bytes() as u64;
        let send_bytes = conn.sendq_bytes() as u64;
        if recv_bytes > recvq_limit as u64 {
            return Some(FloodViolation {
                what: "RecvQ",
                amount: recv_bytes,
                limit: recvq_limit as u64,
            });
        }
        if send_bytes > sendq_limit as u64 {
            return Some(FloodViolation {
                what: "SendQ",
                amount: send_bytes,
                limit: sendq_limit as u64,
            });
        }

        // Unexecuted command pileup, relevant once the client is signed on.
        let max_cmds = (recvq_limit / 50) as u64;
        if conn.signon_at > 0
            && now - conn.signon_at >= 1
            && conn.recv_queue.len() as u64 >= max_cmds
        {
            return Some(FloodViolation {
                what: "buffered commands",
                amount: conn.recv_queue.len() as u64,
                limit: max_cmds,
            });
        }

        if conn.penalty_since != 0 && now - conn.penalty_since >= PENALTY_DECAY_SECS {
            conn.penalty = 0;
            conn.penalty_since = 0;
        }
        let penalty_limit = if is_oper { PENALTY_LIMIT_OPER } else { PENALTY_LIMIT };
        if conn.penalty >= penalty_limit {
            return Some(FloodViolation {
                what: "flood penalty",
                amount: conn.penalty,
                limit: penalty_limit,
            });
        }

        None
    }
}
