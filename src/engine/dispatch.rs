//! Command table and the receive pipeline.
//!
//! Lines drain from each connection's queue in arrival order, get their
//! tags and source resolved, pass invoker-class and parameter gating plus
//! the PRE_COMMAND hook, and dispatch into the handler table. A handler
//! error is logged and skipped; it never takes the engine down.

use crate::conn::ConnId;
use crate::error::HandlerResult;
use crate::hooks::{HookArgs, HookKind, HookVerdict};
use crate::mtags;
use crate::state::entity::EntityId;
use crate::state::network::Network;
use std::collections::HashMap;
use tracing::{debug, warn};
use weft_proto::{Line, Numeric, Tag};

/// Which invoker classes may run a command.
#[derive(Debug, Clone, Copy, Default)]
pub struct CmdFlags {
    /// Allowed before registration.
    pub unregistered: bool,
    /// Allowed for registered users.
    pub user: bool,
    /// Allowed from server links.
    pub server: bool,
    /// Requires operator status when invoked by a user.
    pub oper: bool,
}

impl CmdFlags {
    pub const USER: CmdFlags = CmdFlags { unregistered: false, user: true, server: false, oper: false };
    pub const SERVER: CmdFlags = CmdFlags { unregistered: false, user: false, server: true, oper: false };
    pub const UNREGISTERED: CmdFlags = CmdFlags { unregistered: true, user: false, server: false, oper: false };
    pub const USER_OR_SERVER: CmdFlags = CmdFlags { unregistered: false, user: true, server: true, oper: false };
    pub const ANY_DIRECTION: CmdFlags = CmdFlags { unregistered: true, user: true, server: true, oper: false };
    pub const PRE_REG_OR_SERVER: CmdFlags = CmdFlags { unregistered: true, user: false, server: true, oper: false };
    pub const OPER_OR_SERVER: CmdFlags = CmdFlags { unregistered: false, user: true, server: true, oper: true };
    pub const PRE_REG_AND_USER: CmdFlags = CmdFlags { unregistered: true, user: true, server: false, oper: false };
}

/// Context handed to a command handler.
pub struct CmdCtx {
    /// The entity the command acts as (prefix-resolved for servers).
    pub client: EntityId,
    /// The local neighbour whose socket delivered the line.
    pub direction: EntityId,
    /// The local socket, when the invoker is directly connected.
    pub conn: Option<ConnId>,
    /// The delivering socket belongs to a server link.
    pub server_direction: bool,
    pub params: Vec<String>,
    pub tags: Vec<Tag>,
}

impl CmdCtx {
    /// Whether the line arrived over a server link.
    pub fn from_server(&self) -> bool {
        self.server_direction
    }

    pub fn param(&self, idx: usize) -> &str {
        self.params.get(idx).map(String::as_str).unwrap_or("")
    }
}

/// A registered command handler.
pub type CmdHandler = fn(&mut Network, &CmdCtx) -> HandlerResult;

/// One command table entry.
#[derive(Clone, Copy)]
pub struct CommandDef {
    pub name: &'static str,
    /// Minimum parameter count; fewer yields numeric 461.
    pub paramcount: usize,
    pub flags: CmdFlags,
    pub handler: CmdHandler,
}

/// The name -> handler table.
#[derive(Default)]
pub struct CommandTable {
    map: HashMap<&'static str, CommandDef>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command; duplicate names are a boot-time error.
    pub fn register(&mut self, def: CommandDef) {
        assert!(
            self.map.insert(def.name, def).is_none(),
            "duplicate command '{}'",
            def.name
        );
    }

    pub fn get(&self, name: &str) -> Option<CommandDef> {
        self.map.get(name).copied()
    }
}

/// Commands a shunned user may still run.
const SHUN_EXEMPT: &[&str] = &["PING", "PONG", "QUIT"];

impl Network {
    /// Drain executable lines from one connection's queue.
    ///
    /// Respects per-line execution delays (operators bypass them) and the
    /// burst back-pressure rule: while one neighbour is mid-burst, other
    /// servers' input is parked until EOS (SQUIT excepted).
    pub fn drain_conn(&mut self, conn_id: ConnId) {
        loop {
            let now = self.now();
            let Some(owner) = self.conn_owner(conn_id) else {
                return;
            };
            let is_oper = self.entity(&owner).is_some_and(|e| e.is_oper());
            let is_server = self.entity(&owner).is_some_and(|e| e.is_server());

            let raw = {
                let Some(conn) = self.conns.get_mut(&conn_id) else {
                    return;
                };
                match conn.recv_queue.front() {
                    None => return,
                    Some((execute_at, _)) if *execute_at > now && !is_oper => return,
                    Some(_) => {}
                }
                conn.recv_queue.front().cloned()
            };
            let Some((_, raw)) = raw else { return };

            // Back-pressure while another neighbour bursts.
            if is_server {
                if let Some(syncing) = self.current_link_sync.clone() {
                    let cmd_word = raw
                        .trim_start()
                        .strip_prefix('@')
                        .and_then(|r| r.split_once(' '))
                        .map(|(_, rest)| rest)
                        .unwrap_or(raw.trim_start());
                    let cmd_word = cmd_word
                        .strip_prefix(':')
                        .and_then(|r| r.split_once(' '))
                        .map(|(_, rest)| rest)
                        .unwrap_or(cmd_word);
                    let first = cmd_word.split_whitespace().next().unwrap_or("");
                    if syncing != owner && !first.eq_ignore_ascii_case("SQUIT") {
                        if !self.process_after_eos.contains(&owner) {
                            debug!(server = %owner, "parking input until {} finishes its burst", syncing);
                            self.process_after_eos.push(owner);
                        }
                        return;
                    }
                }
            }

            if let Some(conn) = self.conns.get_mut(&conn_id) {
                conn.recv_queue.pop_front();
            }
            self.process_line(conn_id, &raw);
            if self.conn_owner(conn_id).is_none() {
                // The line handler exited the connection.
                return;
            }
        }
    }

    /// Parse, validate, gate and dispatch one raw line.
    pub fn process_line(&mut self, conn_id: ConnId, raw: &str) {
        let Some(owner) = self.conn_owner(conn_id) else {
            return;
        };
        let line = match Line::parse(raw) {
            Ok(line) => line,
            Err(weft_proto::LineParseError::Empty) => return,
            Err(e) => {
                debug!(conn = conn_id, error = %e, "dropping unparsable line");
                return;
            }
        };

        let from_server = self.entity(&owner).is_some_and(|e| e.is_server());
        let tags = mtags::accept_incoming(line.tags, from_server);

        // Source resolution: only server directions may speak for others.
        let source = if from_server {
            match &line.source {
                Some(token) => match self.resolve_source(token) {
                    Some(id) => id,
                    None => {
                        let synced = self
                            .entity(&owner)
                            .and_then(|e| e.server())
                            .is_some_and(|s| s.synced);
                        if synced {
                            warn!(conn = conn_id, source = %token, "unknown source, dropping line");
                        }
                        return;
                    }
                },
                None => owner.clone(),
            }
        } else {
            owner.clone()
        };

        let command = line.command.to_ascii_uppercase();

        // Shunned users lose everything but basic liveness.
        if self
            .entity(&source)
            .is_some_and(|e| e.flags.shunned)
            && !SHUN_EXEMPT.contains(&command.as_str())
        {
            return;
        }

        if let Some(e) = self.entity_mut(&source) {
            e.recv_mtags = tags.clone();
        }

        let ctx = CmdCtx {
            client: source.clone(),
            direction: owner.clone(),
            conn: self.entity(&source).and_then(|e| e.conn),
            server_direction: from_server,
            params: line.params,
            tags,
        };

        let Some(def) = self.commands.get(&command) else {
            self.handle_unknown_command(&ctx, &command);
            self.clear_command_state(&source);
            return;
        };

        // Invoker-class gating.
        let registered = self.entity(&source).is_some_and(|e| e.flags.registered);
        let is_user = self.entity(&source).is_some_and(|e| e.is_user());
        let direction_is_server = from_server;
        if direction_is_server && !def.flags.server {
            debug!(command = %command, "ignoring user command from server direction");
            return;
        }
        if !direction_is_server {
            if !registered && !def.flags.unregistered {
                self.send_numeric(&source, Numeric::ERR_NOTREGISTERED, &[]);
                return;
            }
            if registered && !def.flags.user {
                if def.flags.unregistered {
                    self.send_numeric(&source, Numeric::ERR_ALREADYREGISTERED, &[]);
                } else {
                    self.send_numeric(&source, Numeric::ERR_SERVERONLY, &[&command]);
                }
                return;
            }
            if def.flags.oper && is_user && !self.entity(&source).is_some_and(|e| e.is_oper()) {
                self.send_numeric(&source, Numeric::ERR_NOPRIVILEGES, &[]);
                return;
            }
        }

        if ctx.params.len() < def.paramcount {
            self.send_numeric(&source, Numeric::ERR_NEEDMOREPARAMS, &[&command]);
            return;
        }

        let hook_args = HookArgs {
            client: Some(&source),
            command: Some(&command),
            ..Default::default()
        };
        if matches!(
            self.run_hook(HookKind::PreCommand, &hook_args),
            HookVerdict::Deny | HookVerdict::Reject(_)
        ) {
            self.clear_command_state(&source);
            return;
        }

        if let Err(e) = (def.handler)(self, &ctx) {
            warn!(command = %command, error = %e, "command handler failed");
        }

        let hook_args = HookArgs {
            client: Some(&source),
            command: Some(&command),
            ..Default::default()
        };
        self.run_hook(HookKind::PostCommand, &hook_args);
        self.clear_command_state(&source);
    }

    fn clear_command_state(&mut self, source: &str) {
        if let Some(e) = self.entity_mut(source) {
            e.recv_mtags.clear();
            e.send_mtags.clear();
            e.flags.flood_safe = false;
        }
    }

    /// Unknown verb: try configured aliases, else numeric 421.
    fn handle_unknown_command(&mut self, ctx: &CmdCtx, command: &str) {
        if ctx.from_server() {
            debug!(command = %command, "ignoring unknown command from server");
            return;
        }
        let alias = self
            .conf
            .alias
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(command))
            .cloned();
        if let Some(alias) = alias {
            self.run_alias(ctx, &alias);
            return;
        }
        if self.entity(&ctx.client).is_some_and(|e| e.flags.registered) {
            self.send_numeric(&ctx.client, Numeric::ERR_UNKNOWNCOMMAND, &[command]);
        }
    }

    /// Rewrite `/alias text…` into a PRIVMSG toward the configured target.
    fn run_alias(&mut self, ctx: &CmdCtx, alias: &crate::config::AliasBlock) {
        use crate::config::AliasType;
        let text = ctx.params.join(" ");
        if text.is_empty() {
            self.send_numeric(&ctx.client, Numeric::ERR_NOTEXTTOSEND, &[]);
            return;
        }
        if alias.alias_type == AliasType::Services {
            let services_up = alias
                .services_server
                .as_deref()
                .and_then(|name| self.find_server_by_name(name));
            let Some(services_sid) = services_up else {
                self.send_numeric(&ctx.client, Numeric::ERR_SERVICESDOWN, &[]);
                return;
            };
            // The target must reside on the services server.
            let on_services = self
                .resolve_user(&alias.target)
                .and_then(|id| self.entity(&id).map(|e| e.uplink.clone()))
                .is_some_and(|uplink| uplink == services_sid);
            if !on_services {
                self.send_numeric(&ctx.client, Numeric::ERR_SERVICESDOWN, &[]);
                return;
            }
        }
        let forged = CmdCtx {
            client: ctx.client.clone(),
            direction: ctx.direction.clone(),
            conn: ctx.conn,
            server_direction: false,
            params: vec![alias.target.clone(), text],
            tags: Vec::new(),
        };
        let _ = crate::handlers::messaging::h_privmsg(self, &forged);
    }
}
