//! Federation: link bring-up, the state burst and user sync.
//!
//! Burst order is fixed: servers, then users (each UID followed by its own
//! MD/AWAY/SWHOIS), then channels (SJOIN, list modes, topic), then global
//! TKLs, then EOS. Burst lines go straight to the peer's socket; regular
//! fan-out queues behind the burst via `send_after_eos`.

pub mod connector;

use crate::config::LinkBlock;
use crate::conn::ConnId;
use crate::state::entity::Entity;
use crate::state::network::Network;
use base64::Engine as _;
use tracing::{debug, info};

/// Encode a dotted-quad IP for the UID line; other hosts pass through raw.
pub fn encode_ip(ip: &str) -> String {
    let Ok(addr) = ip.parse::<std::net::Ipv4Addr>() else {
        return ip.to_string();
    };
    base64::engine::general_purpose::STANDARD.encode(addr.octets())
}

impl Network {
    /// Move an entity to a new registry key, fixing self-references.
    /// Used when a placeholder connection authenticates as a server.
    pub fn rekey_entity(&mut self, old_id: &str, new_id: &str) {
        let Some(mut entity) = self.entities.remove(old_id) else {
            return;
        };
        if entity.uplink == old_id {
            entity.uplink = new_id.to_string();
        }
        if entity.direction == old_id {
            entity.direction = new_id.to_string();
        }
        entity.id = new_id.to_string();
        if let Some(conn_id) = entity.conn {
            self.set_conn_owner(conn_id, new_id);
        }
        self.entities.insert(new_id.to_string(), entity);
    }

    /// Our side of the link handshake: PASS, PROTOCTL, SERVER.
    pub fn send_link_intro(&mut self, conn_id: ConnId, block: &LinkBlock) {
        let me_name = self.me_name();
        let me_sid = self.me.clone();
        let info = self.conf.server.info.clone();
        self.send_raw_to_conn(conn_id, &format!("PASS :{}", block.password));
        self.send_raw_to_conn(
            conn_id,
            &format!("PROTOCTL EAUTH={} SID={}", me_name, me_sid),
        );
        self.send_raw_to_conn(conn_id, &format!("SERVER {} 1 :{}", me_name, info));
    }

    /// Begin negotiation on a socket we opened ourselves.
    pub fn start_outgoing_handshake(&mut self, id: &str, link_name: &str) {
        let Some(block) = self.conf.link.iter().find(|l| l.name == link_name).cloned() else {
            debug!(link = %link_name, "unknown link block for outgoing socket");
            self.exit_client(id, "Unknown link block");
            return;
        };
        let Some(conn_id) = self.entity(id).and_then(|e| e.conn) else {
            return;
        };
        info!(link = %link_name, "starting outgoing link handshake");
        self.send_link_intro(conn_id, &block);
    }

    /// Send our complete state to a freshly authenticated neighbour.
    pub fn send_burst(&mut self, peer: &str) {
        let me = self.me.clone();

        // 1. Every other server we know about.
        let servers: Vec<Entity> = self
            .entities
            .values()
            .filter(|e| e.is_server() && e.id != me && e.id != peer)
            .cloned()
            .collect();
        for server in servers {
            let line = format!(
                ":{} SID {} {} {} :{}",
                me,
                server.name,
                server.hops + 1,
                server.id,
                server.info
            );
            self.send_to_one_server(peer, &[], &line);
        }

        // 2. Users, each followed by its own metadata.
        let users: Vec<String> = self
            .entities
            .values()
            .filter(|e| e.is_user() && e.flags.registered && e.direction != peer)
            .map(|e| e.id.clone())
            .collect();
        for uid in users {
            self.sync_user(&uid, Some(peer));
        }

        // 3. Channels, local-only ones excluded.
        let chan_names: Vec<String> = self
            .channels
            .values()
            .filter(|c| !c.is_local_only())
            .map(|c| c.name.clone())
            .collect();
        for name in chan_names {
            self.burst_channel(peer, &name);
        }

        // 4. Global server bans.
        let tkls: Vec<crate::security::tkl::Tkl> = self
            .tkl
            .iter()
            .filter(|t| t.is_global())
            .cloned()
            .collect();
        for tkl in tkls {
            let line = format!(
                ":{} TKL + {} {} {} {} {} {} :{}",
                me, tkl.flag, tkl.ident, tkl.host, tkl.set_by, tkl.expire, tkl.set_time, tkl.reason
            );
            self.send_to_one_server(peer, &[], &line);
        }

        // 5. Done.
        let line = format!(":{} EOS", me);
        self.send_to_one_server(peer, &[], &line);
        info!(peer = %peer, "burst sent");
    }

    fn burst_channel(&mut self, peer: &str, chan_name: &str) {
        let me = self.me.clone();
        let Some(chan) = self.channel(chan_name) else { return };

        let mut member_tokens = Vec::new();
        for (uid, member) in &chan.members {
            let sigils: String = member
                .status
                .iter()
                .filter_map(|&f| self.modes.prefix_of(f))
                .collect();
            member_tokens.push(format!("{}{}", sigils, uid));
        }
        let flags: String = chan.modes.iter().collect();
        let mut mode_section = String::new();
        let mut mode_args = Vec::new();
        if !flags.is_empty() || !chan.params.is_empty() {
            let mut all_flags = flags;
            for (&flag, value) in &chan.params {
                all_flags.push(flag);
                mode_args.push(value.clone());
            }
            mode_section = format!(" +{}", all_flags);
            if !mode_args.is_empty() {
                mode_section.push(' ');
                mode_section.push_str(&mode_args.join(" "));
            }
        }
        let ts = chan.remote_created;
        let lists: Vec<(char, String)> = chan
            .lists
            .iter()
            .flat_map(|(&flag, entries)| entries.iter().map(move |e| (flag, e.mask.clone())))
            .collect();
        let topic = (!chan.topic.is_empty()).then(|| {
            (chan.topic.clone(), chan.topic_author.clone(), chan.topic_time)
        });

        let line = format!(
            ":{} SJOIN {} {}{} :{}",
            me,
            ts,
            chan_name,
            mode_section,
            member_tokens.join(" ")
        );
        self.send_to_one_server(peer, &[], &line);

        for (flag, mask) in lists {
            let line = format!(":{} MODE {} +{} {}", me, chan_name, flag, mask);
            self.send_to_one_server(peer, &[], &line);
        }
        if let Some((text, author, set_time)) = topic {
            let line = format!(":{} TOPIC {} {} {} :{}", me, chan_name, author, set_time, text);
            self.send_to_one_server(peer, &[], &line);
        }
    }

    /// Introduce one user to the mesh (or to a single peer during burst).
    pub fn sync_user(&mut self, uid: &str, target: Option<&str>) {
        let Some(entity) = self.entity(uid) else { return };
        let Some(user) = entity.user() else { return };
        if entity.name == "*" {
            debug!(uid = %uid, "not syncing a user without a nickname");
            return;
        }

        let global_modes: String = user
            .modes
            .iter()
            .filter(|&&f| self.modes.user_def(f).is_some_and(|d| d.is_global))
            .collect();
        let ip = entity
            .conn
            .and_then(|c| self.conns.get(&c))
            .map(|c| c.ip.clone())
            .unwrap_or_else(|| user.realhost.clone());
        let uplink = entity.uplink.clone();
        let line = format!(
            ":{} UID {} {} {} {} {} {} {} +{} {} {} {} :{}",
            uplink,
            entity.name,
            entity.hops + 1,
            entity.created,
            user.username,
            user.realhost,
            uid,
            user.account,
            global_modes,
            user.cloakhost,
            user.cloakhost,
            encode_ip(&ip),
            entity.info
        );

        let mut followups = Vec::new();
        for (name, md) in &entity.moddata {
            if md.sync {
                followups.push(format!(":{} MD client {} {} :{}", uplink, uid, name, md.value));
            }
        }
        if let Some(away) = &user.away {
            followups.push(format!(":{} AWAY :{}", uid, away));
        }
        for swhois in &user.swhois {
            followups.push(format!(
                ":{} SWHOIS {} + {} :{}",
                self.me, uid, swhois.tag, swhois.line
            ));
        }

        match target {
            Some(peer) => {
                self.send_to_one_server(peer, &[], &line);
                for followup in followups {
                    self.send_to_one_server(peer, &[], &followup);
                }
            }
            None => {
                self.send_to_servers(Some(uid), &[], &line);
                for followup in followups {
                    self.send_to_servers(Some(uid), &[], &followup);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_quads_encode_as_base64_octets() {
        assert_eq!(encode_ip("1.2.3.4"), "AQIDBA==");
        // Hostnames and v6 literals pass through.
        assert_eq!(encode_ip("host.example"), "host.example");
        assert_eq!(encode_ip("2001:db8::1"), "2001:db8::1");
    }
}
