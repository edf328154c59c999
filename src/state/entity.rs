//! Connected entities: users, servers and not-yet-registered peers.
//!
//! Every peer the daemon knows about - local or learned through the mesh -
//! is one [`Entity`]. The user/server split is a tagged variant, not a class
//! hierarchy; capability checks are pattern matches. Back-references
//! (`uplink`, `direction`) are entity ids resolved through the registry.

use crate::conn::ConnId;
use std::collections::BTreeMap;
use weft_proto::Tag;

/// Stable network-wide entity id: a UID for users, a SID for servers.
pub type EntityId = String;

/// Boolean lifecycle flags.
#[derive(Debug, Default, Clone)]
pub struct EntityFlags {
    /// Completed registration (welcome sent / link authed).
    pub registered: bool,
    /// First bytes seen on the socket.
    pub handshake_finished: bool,
    /// Killed; suppresses the QUIT broadcast on exit.
    pub killed: bool,
    /// Shunned; most commands are silently dropped.
    pub shunned: bool,
    /// Penalty accounting disabled for the current command.
    pub flood_safe: bool,
    /// Forced-join in progress (admin override).
    pub sajoin: bool,
    /// Exit ran for this entity; makes exit idempotent.
    pub exited: bool,
}

/// One moddata entry; `sync` decides whether it is broadcast as `MD`.
#[derive(Debug, Clone)]
pub struct ModDataEntry {
    pub value: String,
    pub sync: bool,
}

/// Last known identity, kept for restore operations after the fact.
#[derive(Debug, Default, Clone)]
pub struct Remember {
    pub cloakhost: String,
    pub ident: String,
    pub nick: String,
}

/// A tagged vanity line shown in WHOIS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Swhois {
    pub tag: String,
    pub line: String,
}

/// User-specific state.
#[derive(Debug, Clone)]
pub struct UserInfo {
    /// Account name; `*` when unauthenticated.
    pub account: String,
    /// Active user modes.
    pub modes: std::collections::BTreeSet<char>,
    /// Operator block name when opered.
    pub oper: Option<String>,
    /// Operator class string for WHOIS.
    pub operclass: Option<String>,
    pub username: String,
    pub realhost: String,
    pub cloakhost: String,
    /// Server-notice mask characters for `+s` users.
    pub snomask: String,
    pub swhois: Vec<Swhois>,
    pub away: Option<String>,
}

impl Default for UserInfo {
    fn default() -> Self {
        Self {
            account: "*".to_string(),
            modes: Default::default(),
            oper: None,
            operclass: None,
            username: String::new(),
            realhost: String::new(),
            cloakhost: String::new(),
            snomask: String::new(),
            swhois: Vec::new(),
            away: None,
        }
    }
}

impl UserInfo {
    /// Mode string rendered as `+abc`.
    pub fn mode_string(&self) -> String {
        let mut s = String::from("+");
        s.extend(self.modes.iter());
        s
    }

    /// The host other users see: cloak with `+x`, real host otherwise.
    pub fn visible_host(&self) -> &str {
        if self.modes.contains(&'x') && !self.cloakhost.is_empty() {
            &self.cloakhost
        } else {
            &self.realhost
        }
    }

    pub fn is_oper(&self) -> bool {
        self.modes.contains(&'o')
    }
}

/// Server-specific state.
#[derive(Debug, Default, Clone)]
pub struct ServerInfo {
    /// Burst complete (EOS seen / sent for remote introductions).
    pub synced: bool,
    /// Link negotiation passed.
    pub authed: bool,
    /// SQUIT in progress.
    pub squit: bool,
    /// Name of the link block this server authenticated against.
    pub link_name: Option<String>,
}

/// What kind of peer an entity is.
#[derive(Debug, Clone)]
pub enum EntityKind {
    /// Connection accepted, not yet a user or a server.
    Unregistered,
    User(UserInfo),
    Server(ServerInfo),
}

/// A peer in the mesh.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    /// Display name: nick or server name; `*` until known.
    pub name: String,
    /// Hop count from this server; 0 for local.
    pub hops: u32,
    /// Creation (signon) timestamp, epoch seconds.
    pub created: i64,
    /// Last activity timestamp for idle reporting.
    pub idle_since: i64,
    /// Entity this one was learned through; self for local peers.
    pub uplink: EntityId,
    /// Local neighbour whose socket carries this entity's traffic.
    pub direction: EntityId,
    /// Local socket, when directly connected.
    pub conn: Option<ConnId>,
    /// GECOS / server info line.
    pub info: String,
    pub flags: EntityFlags,
    pub kind: EntityKind,
    /// Synced and local moddata.
    pub moddata: BTreeMap<String, ModDataEntry>,
    /// Tags received with the command currently being processed.
    pub recv_mtags: Vec<Tag>,
    /// Tags to attach to lines this entity originates.
    pub send_mtags: Vec<Tag>,
    pub remember: Remember,
}

impl Entity {
    /// A fresh local, unregistered entity. Locally connected peers hang
    /// directly off this server: their uplink is `me`, their direction is
    /// themselves.
    pub fn local_unregistered(id: EntityId, conn: ConnId, now: i64, me: &str) -> Self {
        Self {
            id: id.clone(),
            name: "*".to_string(),
            hops: 0,
            created: now,
            idle_since: now,
            uplink: me.to_string(),
            direction: id,
            conn: Some(conn),
            info: String::new(),
            flags: EntityFlags::default(),
            kind: EntityKind::Unregistered,
            moddata: BTreeMap::new(),
            recv_mtags: Vec::new(),
            send_mtags: Vec::new(),
            remember: Remember::default(),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self.kind, EntityKind::User(_))
    }

    pub fn is_server(&self) -> bool {
        matches!(self.kind, EntityKind::Server(_))
    }

    pub fn user(&self) -> Option<&UserInfo> {
        match &self.kind {
            EntityKind::User(u) => Some(u),
            _ => None,
        }
    }

    pub fn user_mut(&mut self) -> Option<&mut UserInfo> {
        match &mut self.kind {
            EntityKind::User(u) => Some(u),
            _ => None,
        }
    }

    pub fn server(&self) -> Option<&ServerInfo> {
        match &self.kind {
            EntityKind::Server(s) => Some(s),
            _ => None,
        }
    }

    pub fn server_mut(&mut self) -> Option<&mut ServerInfo> {
        match &mut self.kind {
            EntityKind::Server(s) => Some(s),
            _ => None,
        }
    }

    /// Directly connected to this server (or is this server itself).
    pub fn is_local(&self) -> bool {
        self.conn.is_some() || self.direction == self.id
    }

    pub fn is_oper(&self) -> bool {
        self.user().map(UserInfo::is_oper).unwrap_or(false)
    }

    /// `nick!user@visible-host` for message sources.
    pub fn fullmask(&self) -> String {
        match self.user() {
            Some(u) => format!("{}!{}@{}", self.name, u.username, u.visible_host()),
            None => self.name.clone(),
        }
    }

    /// Set or update a moddata entry.
    pub fn set_moddata(&mut self, name: &str, value: &str, sync: bool) {
        self.moddata.insert(
            name.to_string(),
            ModDataEntry {
                value: value.to_string(),
                sync,
            },
        );
    }

    pub fn moddata_value(&self, name: &str) -> Option<&str> {
        self.moddata.get(name).map(|m| m.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_unregistered_hangs_off_this_server() {
        let e = Entity::local_unregistered("001AAAAAA".into(), 1, 1000, "001");
        assert!(e.is_local());
        assert_eq!(e.uplink, "001");
        assert_eq!(e.direction, e.id);
        assert_eq!(e.name, "*");
        assert!(!e.is_user());
        assert!(!e.is_server());
    }

    #[test]
    fn fullmask_uses_cloak_only_with_plus_x() {
        let mut e = Entity::local_unregistered("001AAAAAA".into(), 1, 1000, "001");
        e.name = "alice".to_string();
        let mut user = UserInfo {
            username: "a".to_string(),
            realhost: "real.example".to_string(),
            cloakhost: "abc.def.example".to_string(),
            ..Default::default()
        };
        user.modes.insert('x');
        e.kind = EntityKind::User(user);
        assert_eq!(e.fullmask(), "alice!a@abc.def.example");

        e.user_mut().unwrap().modes.remove(&'x');
        assert_eq!(e.fullmask(), "alice!a@real.example");
    }
}
