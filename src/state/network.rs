//! The world: every entity, channel, ban and connection this server knows.
//!
//! One engine task owns the `Network` and is its only mutator; everything
//! else talks to it through queued events. Lookups go through folded-name
//! maps, fan-out helpers observe direction and sync state, and `exit` is
//! the single idempotent teardown path for any entity.

use crate::batch::Batch;
use crate::config::Config;
use crate::conn::{ConnId, Connection};
use crate::engine::dispatch::CommandTable;
use crate::hooks::{HookArgs, HookBus, HookKind, HookVerdict};
use crate::modes::{extban, ModeTables};
use crate::mtags::{self, TagDestination};
use crate::security::tkl::{Tkl, TklSubject, TklTable};
use crate::state::channel::Channel;
use crate::state::entity::{Entity, EntityId, EntityKind, ServerInfo};
use crate::state::uid::UidAllocator;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use weft_proto::{to_irc_lower, Numeric, Tag};

/// A client parked during its registration window.
#[derive(Debug, Clone)]
pub struct DelayedConnection {
    pub entity: EntityId,
    pub expire: i64,
    pub label: String,
}

/// The single mutable world.
pub struct Network {
    pub conf: Arc<Config>,
    /// This server's entity id (its SID).
    pub me: EntityId,
    pub boottime: i64,
    pub entities: HashMap<EntityId, Entity>,
    /// Folded nick -> user id.
    pub nicks: HashMap<String, EntityId>,
    /// Folded server name -> server id.
    pub server_names: HashMap<String, EntityId>,
    /// Folded channel name -> channel.
    pub channels: HashMap<String, Channel>,
    pub conns: HashMap<ConnId, Connection>,
    conn_entity: HashMap<ConnId, EntityId>,
    pub modes: ModeTables,
    pub commands: CommandTable,
    pub hooks: HookBus,
    pub tkl: TklTable,
    pub batches: Vec<Batch>,
    pub uid_gen: UidAllocator,
    pub motd: Vec<String>,
    pub local_user_count: u32,
    pub global_user_count: u32,
    pub max_local_users: u32,
    pub max_global_users: u32,
    /// Neighbour currently mid-burst; other servers' input is parked.
    pub current_link_sync: Option<EntityId>,
    /// Servers whose queued lines wait for the burst to finish, FIFO.
    pub process_after_eos: Vec<EntityId>,
    /// Lines queued per not-yet-synced neighbour, FIFO.
    pub send_after_eos: HashMap<EntityId, Vec<String>>,
    pub delayed_connections: Vec<DelayedConnection>,
}

impl Network {
    pub fn new(conf: Arc<Config>) -> Self {
        let mut commands = CommandTable::new();
        let mut hooks = HookBus::new();
        crate::handlers::register_all(&mut commands, &mut hooks);

        let now = chrono::Utc::now().timestamp();
        let sid = conf.server.sid.clone();
        let me = Entity {
            id: sid.clone(),
            name: conf.server.name.clone(),
            hops: 0,
            created: now,
            idle_since: now,
            uplink: sid.clone(),
            direction: sid.clone(),
            conn: None,
            info: conf.server.info.clone(),
            flags: crate::state::entity::EntityFlags {
                registered: true,
                handshake_finished: true,
                ..Default::default()
            },
            kind: EntityKind::Server(ServerInfo {
                synced: true,
                authed: true,
                squit: false,
                link_name: None,
            }),
            moddata: Default::default(),
            recv_mtags: Vec::new(),
            send_mtags: Vec::new(),
            remember: Default::default(),
        };

        let motd = conf
            .server
            .motd_file
            .as_deref()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default();

        let mut net = Self {
            me: sid.clone(),
            boottime: now,
            entities: HashMap::new(),
            nicks: HashMap::new(),
            server_names: HashMap::new(),
            channels: HashMap::new(),
            conns: HashMap::new(),
            conn_entity: HashMap::new(),
            modes: ModeTables::with_defaults(),
            commands,
            hooks,
            tkl: TklTable::default(),
            batches: Vec::new(),
            uid_gen: UidAllocator::new(&sid),
            motd,
            local_user_count: 0,
            global_user_count: 0,
            max_local_users: 0,
            max_global_users: 0,
            current_link_sync: None,
            process_after_eos: Vec::new(),
            send_after_eos: HashMap::new(),
            delayed_connections: Vec::new(),
            conf,
        };
        net.server_names
            .insert(to_irc_lower(&net.entities_me_name()), sid.clone());
        net.entities.insert(sid, me);
        net
    }

    fn entities_me_name(&self) -> String {
        self.conf.server.name.clone()
    }

    pub fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// This server's display name.
    pub fn me_name(&self) -> String {
        self.conf.server.name.clone()
    }

    pub fn version_string(&self) -> String {
        format!("weftd-{}", env!("CARGO_PKG_VERSION"))
    }

    // --- Registry lookups ---

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn entity_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn conn_owner(&self, conn: ConnId) -> Option<EntityId> {
        self.conn_entity.get(&conn).cloned()
    }

    pub(crate) fn set_conn_owner(&mut self, conn: ConnId, id: &str) {
        self.conn_entity.insert(conn, id.to_string());
    }

    pub fn find_user_by_nick(&self, nick: &str) -> Option<EntityId> {
        self.nicks.get(&to_irc_lower(nick)).cloned()
    }

    pub fn find_server_by_name(&self, name: &str) -> Option<EntityId> {
        self.server_names.get(&to_irc_lower(name)).cloned()
    }

    /// Resolve a source token: stable id first, then either name space.
    pub fn resolve_source(&self, token: &str) -> Option<EntityId> {
        if self.entities.contains_key(token) {
            return Some(token.to_string());
        }
        self.find_user_by_nick(token)
            .or_else(|| self.find_server_by_name(token))
    }

    /// Resolve a command target that may be a nick or a UID.
    pub fn resolve_user(&self, token: &str) -> Option<EntityId> {
        match self.entities.get(token) {
            Some(e) if e.is_user() => Some(token.to_string()),
            _ => self.find_user_by_nick(token),
        }
    }

    pub fn is_local(&self, id: &str) -> bool {
        self.entity(id).is_some_and(Entity::is_local)
    }

    /// Directly connected, authed server neighbours.
    pub fn local_servers(&self) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.id != self.me && e.conn.is_some() && e.is_server())
            .map(|e| e.id.clone())
            .collect()
    }

    /// Create the entity for a freshly accepted socket.
    pub fn register_local_conn(&mut self, conn: Connection) -> Result<EntityId, crate::error::Error> {
        let now = self.now();
        let conn_id = conn.id;
        let uid = {
            let entities = &self.entities;
            self.uid_gen
                .next(|candidate| entities.contains_key(candidate))
        }
        .ok_or(crate::error::Error::UidExhausted)?;
        self.conns.insert(conn_id, conn);
        self.conn_entity.insert(conn_id, uid.clone());
        let me = self.me.clone();
        self.entities
            .insert(uid.clone(), Entity::local_unregistered(uid.clone(), conn_id, now, &me));
        debug!(uid = %uid, conn = conn_id, "connection accepted");
        Ok(uid)
    }

    // --- Outbound plumbing ---

    /// Push a raw line to a socket, CRLF added by the writer.
    pub fn send_raw_to_conn(&mut self, conn_id: ConnId, line: &str) {
        let now = self.now();
        if let Some(conn) = self.conns.get_mut(&conn_id) {
            conn.send_raw(now, line);
        }
    }

    fn destination_profile(&self, id: &str) -> Option<(ConnId, TagDestination)> {
        let entity = self.entity(id)?;
        let (conn_id, dest_entity) = if let Some(conn) = entity.conn {
            (conn, entity)
        } else {
            let direction = self.entity(&entity.direction)?;
            (direction.conn?, direction)
        };
        let is_server = dest_entity.is_server();
        let caps_ok = is_server
            || self
                .conns
                .get(&conn_id)
                .is_some_and(|c| c.caps.contains("message-tags"));
        Some((
            conn_id,
            TagDestination {
                is_server,
                has_message_tags_cap: caps_ok,
                is_oper: dest_entity.is_oper(),
            },
        ))
    }

    /// Deliver a line toward an entity, filtering tags per destination.
    pub fn send_to_entity(&mut self, id: &str, tags: &[Tag], line: &str) {
        let Some((conn_id, dest)) = self.destination_profile(id) else {
            return;
        };
        let prefix = mtags::filter_outgoing(tags, &dest);
        self.send_raw_to_conn(conn_id, &format!("{}{}", prefix, line));
    }

    /// Send a numeric reply to a user.
    pub fn send_numeric(&mut self, id: &str, numeric: Numeric, args: &[&str]) {
        let target_name = self
            .entity(id)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| "*".to_string());
        let line = format!(
            ":{} {:03} {} {}",
            self.me_name(),
            numeric.code(),
            target_name,
            numeric.render(args)
        );
        self.send_to_entity(id, &[], &line);
    }

    /// `NOTICE` from this server to a local user.
    pub fn server_notice(&mut self, id: &str, text: &str) {
        let name = self
            .entity(id)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| "*".to_string());
        let line = format!(":{} NOTICE {} :*** {}", self.me_name(), name, text);
        self.send_to_entity(id, &[], &line);
    }

    /// Route a server notice to local operators holding `flag` in their
    /// snomask; optionally relay global flags to the mesh.
    pub fn send_snomask(&mut self, source: Option<&str>, flag: char, text: &str, sendsno: bool) {
        let recipients: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| {
                e.is_local()
                    && e.user()
                        .is_some_and(|u| u.modes.contains(&'s') && u.snomask.contains(flag))
            })
            .map(|e| e.id.clone())
            .collect();
        for id in recipients {
            self.server_notice(&id, text);
        }
        let is_global = self
            .modes
            .snomask_def(flag)
            .is_some_and(|d| d.is_global);
        if is_global && sendsno {
            let origin = source.map(str::to_string);
            let line = format!(":{} SENDSNO {} :{}", self.me, flag, text);
            self.send_to_servers(origin.as_deref(), &[], &line);
        }
    }

    // --- Federation fan-out ---

    /// Send toward exactly one server entity, following its direction.
    pub fn send_to_one_server(&mut self, server_id: &str, tags: &[Tag], line: &str) {
        self.send_to_entity(server_id, tags, line);
    }

    /// Fan a line out to every directly linked server except the origin's
    /// direction. Lines for neighbours still inside their burst are queued
    /// and flushed after their EOS.
    pub fn send_to_servers(&mut self, origin: Option<&str>, tags: &[Tag], line: &str) {
        let origin_direction = origin
            .and_then(|id| self.entity(id))
            .map(|e| e.direction.clone());
        for server_id in self.local_servers() {
            if Some(&server_id) == origin_direction.as_ref() {
                continue;
            }
            let synced = self
                .entity(&server_id)
                .and_then(Entity::server)
                .is_some_and(|s| s.synced);
            if !synced {
                // FIFO per destination across the burst boundary.
                let dest = TagDestination {
                    is_server: true,
                    has_message_tags_cap: true,
                    is_oper: false,
                };
                let prefix = mtags::filter_outgoing(tags, &dest);
                self.send_after_eos
                    .entry(server_id)
                    .or_default()
                    .push(format!("{}{}", prefix, line));
                continue;
            }
            self.send_to_one_server(&server_id, tags, line);
        }
    }

    // --- Channel plumbing ---

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&to_irc_lower(name))
    }

    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(&to_irc_lower(name))
    }

    /// Whether `viewer` may be shown `member` on `chan`.
    pub fn user_can_see_member(&mut self, viewer: &str, member: &str, chan: &str) -> bool {
        let args = HookArgs {
            client: Some(viewer),
            target: Some(member),
            channel: Some(chan),
            ..Default::default()
        };
        !matches!(
            self.run_hook(HookKind::VisibleOnChannel, &args),
            HookVerdict::Deny | HookVerdict::Reject(_)
        )
    }

    /// Deliver a line to local channel members.
    ///
    /// When `source` is set, members who have not seen the source are
    /// skipped and delivery marks the pair seen. `skip` excludes one
    /// member (usually the source itself).
    pub fn broadcast_to_channel(
        &mut self,
        chan_name: &str,
        source: Option<&str>,
        skip: Option<&str>,
        tags: &[Tag],
        line: &str,
    ) {
        let folded = to_irc_lower(chan_name);
        let members: Vec<EntityId> = match self.channels.get(&folded) {
            Some(chan) => chan.members.keys().cloned().collect(),
            None => return,
        };
        for member in members {
            if Some(member.as_str()) == skip || !self.is_local(&member) {
                continue;
            }
            if !self
                .entity(&member)
                .is_some_and(|e| e.is_user() && e.flags.registered)
            {
                continue;
            }
            if let Some(source_id) = source {
                if !self
                    .channels
                    .get(&folded)
                    .is_some_and(|c| c.has_seen(&member, source_id))
                {
                    continue;
                }
            }
            self.send_to_entity(&member, tags, line);
        }
    }

    /// Local registered users sharing at least one channel with `id` and
    /// aware of it, deduplicated.
    pub fn common_channel_viewers(&self, id: &str) -> Vec<EntityId> {
        let mut viewers: Vec<EntityId> = Vec::new();
        for chan in self.channels.values() {
            if !chan.has_member(id) {
                continue;
            }
            for member in chan.members.keys() {
                if member == id || viewers.contains(member) {
                    continue;
                }
                if self.is_local(member) && chan.has_seen(member, id) {
                    viewers.push(member.clone());
                }
            }
        }
        viewers
    }

    // --- Mask evaluation ---

    /// Evaluate one mask against a client: the three literal hostmask
    /// forms, or the extban registry for `~`-shaped masks.
    pub fn client_matches_mask(&self, client_id: &str, chan: &Channel, mask: &str) -> bool {
        if extban::is_extban(mask) {
            return extban::matches(self, client_id, chan, mask);
        }
        let Some(entity) = self.entity(client_id) else {
            return false;
        };
        let Some(user) = entity.user() else {
            return false;
        };
        let ip = entity
            .conn
            .and_then(|c| self.conns.get(&c))
            .map(|c| c.ip.clone())
            .unwrap_or_else(|| user.realhost.clone());
        let forms = [
            format!("{}!{}@{}", entity.name, user.username, user.realhost),
            format!("{}!{}@{}", entity.name, user.username, ip),
            format!("{}!{}@{}", entity.name, user.username, user.cloakhost),
        ];
        forms.iter().any(|form| weft_proto::wildcard_match(mask, form))
    }

    /// Whether any entry of a channel list mode matches the client.
    pub fn check_list_match(&self, client_id: &str, chan: &Channel, flag: char) -> bool {
        chan.list(flag)
            .iter()
            .any(|entry| self.client_matches_mask(client_id, chan, &entry.mask))
    }

    /// Banned means: matches `+b` with no `+e` override.
    pub fn is_banned(&self, client_id: &str, chan: &Channel) -> bool {
        self.check_list_match(client_id, chan, 'b')
            && !self.check_list_match(client_id, chan, 'e')
    }

    // --- TKL evaluation ---

    /// First matching TKL of the given flags for a client, exceptions
    /// applied. Returns a clone to keep the registry borrow short.
    pub fn tkl_find(&self, flags: &str, client_id: &str) -> Option<Tkl> {
        let entity = self.entity(client_id)?;
        let user = entity.user();
        let ip = entity
            .conn
            .and_then(|c| self.conns.get(&c))
            .map(|c| c.ip.clone())
            .unwrap_or_default();
        let subject = TklSubject {
            nick: &entity.name,
            ident: user.map(|u| u.username.as_str()).unwrap_or(""),
            realhost: user.map(|u| u.realhost.as_str()).unwrap_or(""),
            ip: &ip,
            cloakhost: user.map(|u| u.cloakhost.as_str()).unwrap_or(""),
            account: user.map(|u| u.account.as_str()).unwrap_or("*"),
            certfp: entity.moddata_value("certfp"),
        };
        self.tkl.find_match(flags, &subject).cloned()
    }

    /// Reserved-nick (Q-line) check used by NICK.
    pub fn find_qline(&self, nick: &str) -> Option<Tkl> {
        self.tkl
            .iter()
            .find(|t| t.flag == 'Q' && weft_proto::wildcard_match(&t.host, nick))
            .cloned()
    }

    // --- Registration window delays ---

    /// Park a registering client for up to `secs` seconds under `label`.
    pub fn delay_client(&mut self, id: &str, label: &str, secs: i64) {
        let expire = self.now() + secs;
        self.delayed_connections.push(DelayedConnection {
            entity: id.to_string(),
            expire,
            label: label.to_string(),
        });
    }

    /// Clear a delay by label; registration re-checks afterwards.
    pub fn clear_delay(&mut self, id: &str, label: &str) {
        self.delayed_connections
            .retain(|d| !(d.entity == id && d.label == label));
    }

    pub fn has_delays(&self, id: &str) -> bool {
        self.delayed_connections.iter().any(|d| d.entity == id)
    }

    // --- Exit ---

    /// Idempotent teardown of any entity.
    ///
    /// Users broadcast QUIT (unless killed), leave their channels and
    /// close their socket; servers cascade through [`Network::server_exit`].
    pub fn exit_client(&mut self, id: &str, reason: &str) {
        let Some(entity) = self.entities.get(id) else {
            return;
        };
        if entity.flags.exited {
            return;
        }
        if entity.is_server() {
            self.server_exit(id, reason);
            return;
        }
        if let Some(e) = self.entities.get_mut(id) {
            e.flags.exited = true;
        }

        let entity = self.entities.get(id).cloned();
        let Some(entity) = entity else { return };

        self.delayed_connections.retain(|d| d.entity != id);
        self.end_batches_of(id);

        let was_registered = entity.flags.registered && entity.is_user();
        if was_registered {
            // Tell every local viewer exactly once.
            let quit_line = format!(":{} QUIT :{}", entity.fullmask(), reason);
            for viewer in self.common_channel_viewers(id) {
                self.send_to_entity(&viewer, &[], &quit_line);
            }
            if !entity.flags.killed && !self.local_servers().is_empty() {
                let line = format!(":{} QUIT :{}", id, reason);
                self.send_to_servers(Some(id), &[], &line);
            }
            if entity.is_local() {
                self.local_user_count = self.local_user_count.saturating_sub(1);
                self.send_snomask(
                    None,
                    'c',
                    &format!("Client exiting: {} ({})", entity.name, reason),
                    false,
                );
            }
            self.global_user_count = self.global_user_count.saturating_sub(1);
        }

        // Leave channels, destroying the empty ones.
        let mut emptied = Vec::new();
        for (folded, chan) in self.channels.iter_mut() {
            if chan.has_member(id) {
                chan.remove_member(id);
                if chan.member_count() == 0 {
                    emptied.push(folded.clone());
                }
            }
        }
        for folded in emptied {
            self.channels.remove(&folded);
        }

        self.nicks.remove(&to_irc_lower(&entity.name));

        // The connection closes last.
        if let Some(conn_id) = entity.conn {
            let err = format!("ERROR :Closing Link: {} ({})", entity.name, reason);
            self.send_raw_to_conn(conn_id, &err);
            self.conns.remove(&conn_id);
            self.conn_entity.remove(&conn_id);
        }
        self.entities.remove(id);
        info!(id = %id, nick = %entity.name, reason = %reason, "client exited");
    }

    /// SQUIT cascade: close a server subtree, synthesising netsplit QUITs
    /// for every dependent entity.
    pub fn server_exit(&mut self, id: &str, reason: &str) {
        let Some(server) = self.entities.get_mut(id) else {
            return;
        };
        if server.flags.exited {
            return;
        }
        server.flags.exited = true;
        if let Some(info) = server.server_mut() {
            info.squit = true;
        }
        let server = self.entities.get(id).cloned().unwrap();

        let uplink_name = self
            .entity(&server.uplink)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| self.me_name());
        // Netsplit reasons read "<lost server> <its uplink>".
        let split_reason = format!("{} {}", server.name, uplink_name);

        // Any netjoin still open for this subtree ends here.
        if let Some(label) = self.find_batch(id, "netjoin") {
            self.end_batch(&label);
        }
        if self.current_link_sync.as_deref() == Some(id) {
            self.current_link_sync = None;
        }
        self.process_after_eos.retain(|e| e != id);
        self.send_after_eos.remove(id);

        // Copy the subtree before mutating the registry.
        let mut affected: Vec<EntityId> = Vec::new();
        let mut frontier = vec![id.to_string()];
        while let Some(current) = frontier.pop() {
            for entity in self.entities.values() {
                if entity.uplink == current && entity.id != current {
                    frontier.push(entity.id.clone());
                }
            }
            if current != id {
                affected.push(current.clone());
            }
        }

        warn!(
            server = %server.name,
            affected = affected.len(),
            reason = %reason,
            "server link lost"
        );
        self.send_snomask(
            None,
            'L',
            &format!("Lost link to {} ({})", server.name, reason),
            false,
        );

        // Netsplit batch wraps the synthetic QUITs toward local viewers.
        let batch_label = self.start_batch(id, "netsplit", &[&server.name, &uplink_name]);
        for entity_id in affected {
            let is_server = self.entity(&entity_id).is_some_and(Entity::is_server);
            if is_server {
                if let Some(e) = self.entities.get_mut(&entity_id) {
                    e.flags.exited = true;
                }
                let name = self.entity(&entity_id).map(|e| e.name.clone()).unwrap_or_default();
                self.server_names.remove(&to_irc_lower(&name));
                self.entities.remove(&entity_id);
                continue;
            }
            self.netsplit_quit(&entity_id, &split_reason, &batch_label);
        }
        self.end_batch(&batch_label);

        let squit = format!("SQUIT {} :{}", server.name, reason);
        self.send_to_servers(Some(id), &[], &squit);

        self.server_names.remove(&to_irc_lower(&server.name));
        if let Some(conn_id) = server.conn {
            let err = format!("ERROR :Closing Link: {} ({})", server.name, reason);
            self.send_raw_to_conn(conn_id, &err);
            self.conns.remove(&conn_id);
            self.conn_entity.remove(&conn_id);
        }
        self.entities.remove(id);

        let args = HookArgs {
            client: Some(id),
            text: Some(reason),
            ..Default::default()
        };
        self.run_hook(HookKind::ServerDisconnect, &args);
    }

    /// One netsplit casualty: QUIT to viewers inside the batch, then
    /// removal without any server broadcast (peers infer from SQUIT).
    fn netsplit_quit(&mut self, id: &str, split_reason: &str, batch_label: &str) {
        let Some(entity) = self.entities.get(id).cloned() else {
            return;
        };
        let quit_line = format!(":{} QUIT :{}", entity.fullmask(), split_reason);
        for viewer in self.common_channel_viewers(id) {
            let mut tags = Vec::new();
            if let Some(conn) = self.entity(&viewer).and_then(|e| e.conn) {
                if let Some(tag) = self.batch_tag_for(batch_label, conn) {
                    tags.push(tag);
                }
            }
            self.send_to_entity(&viewer, &tags, &quit_line);
        }

        let mut emptied = Vec::new();
        for (folded, chan) in self.channels.iter_mut() {
            if chan.has_member(id) {
                chan.remove_member(id);
                if chan.member_count() == 0 {
                    emptied.push(folded.clone());
                }
            }
        }
        for folded in emptied {
            self.channels.remove(&folded);
        }

        self.nicks.remove(&to_irc_lower(&entity.name));
        self.global_user_count = self.global_user_count.saturating_sub(1);
        self.entities.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_net() -> Network {
        Network::new(Arc::new(Config::for_testing()))
    }

    #[test]
    fn me_entity_points_at_itself() {
        let net = test_net();
        let me = net.entity("001").unwrap();
        assert_eq!(me.uplink, "001");
        assert_eq!(me.direction, "001");
        assert!(me.is_server());
        assert!(net.find_server_by_name("hub.weft.test").is_some());
    }

    #[test]
    fn register_allocates_sequential_uids() {
        let mut net = test_net();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let conn = Connection::new(1, "1.2.3.4", false, tx);
        let uid = net.register_local_conn(conn).unwrap();
        assert_eq!(uid, "001AAAAAA");
        assert_eq!(net.conn_owner(1), Some(uid));
    }

    #[test]
    fn exit_is_idempotent() {
        let mut net = test_net();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let conn = Connection::new(1, "1.2.3.4", false, tx);
        let uid = net.register_local_conn(conn).unwrap();
        net.exit_client(&uid, "bye");
        assert!(net.entity(&uid).is_none());
        // Second call is a no-op.
        net.exit_client(&uid, "bye again");
    }
}
