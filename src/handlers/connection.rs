//! Connection lifecycle: NICK, USER, PASS, PING/PONG, QUIT, CAP, ERROR.

use crate::engine::dispatch::CmdCtx;
use crate::error::HandlerResult;
use crate::state::network::Network;
use rand::Rng;
use tracing::{debug, error};
use weft_proto::{to_irc_lower, valid, Numeric};

/// Capabilities this server offers.
pub const CAPABILITIES: &str = "message-tags batch server-time away-notify account-tag";

pub fn h_pass(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    if let Some(conn) = ctx.conn.and_then(|c| net.conns.get_mut(&c)) {
        conn.pass = Some(ctx.param(0).to_string());
    }
    Ok(())
}

pub fn h_ping(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let me = net.me_name();
    let token = ctx.param(0);
    let line = format!(":{} PONG {} :{}", me, me, token);
    net.send_to_entity(&ctx.client, &[], &line);
    Ok(())
}

pub fn h_pong(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    // The anti-spoof cookie gates registration until echoed back.
    let Some(conn_id) = ctx.conn else { return Ok(()) };
    let cleared = {
        let Some(conn) = net.conns.get_mut(&conn_id) else {
            return Ok(());
        };
        match &conn.nospoof {
            Some(cookie) if ctx.params.iter().any(|p| p == cookie) => {
                conn.nospoof = None;
                true
            }
            _ => false,
        }
    };
    if cleared {
        crate::handlers::welcome::try_register(net, &ctx.client.clone());
    }
    Ok(())
}

pub fn h_quit(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let reason = if ctx.params.is_empty() {
        net.entity(&ctx.client)
            .map(|e| e.name.clone())
            .unwrap_or_default()
    } else {
        ctx.param(0).to_string()
    };
    let reason = if ctx.from_server() {
        reason
    } else {
        format!("Quit: {}", reason)
    };
    net.exit_client(&ctx.client, &reason);
    Ok(())
}

pub fn h_error(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    error!(from = %ctx.direction, "received ERROR: {}", ctx.param(0));
    net.exit_client(&ctx.direction.clone(), "ERROR from peer");
    Ok(())
}

pub fn h_nick(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    if ctx.from_server() {
        return remote_nick_change(net, ctx);
    }
    let Some(new_nick) = ctx.params.first().cloned() else {
        net.send_numeric(&ctx.client, Numeric::ERR_NONICKNAMEGIVEN, &[]);
        return Ok(());
    };

    if !valid::valid_nick(&new_nick, net.conf.server.nick_len) {
        net.send_numeric(&ctx.client, Numeric::ERR_ERRONEUSNICKNAME, &[&new_nick, &new_nick]);
        return Ok(());
    }

    // Reserved nicks (Q-lines) bounce non-operators.
    if !net.entity(&ctx.client).is_some_and(|e| e.is_oper()) {
        if let Some(qline) = net.find_qline(&new_nick) {
            net.send_snomask(
                None,
                'q',
                &format!("Reserved nick {} attempted by {}", new_nick, ctx.client),
                false,
            );
            net.send_numeric(
                &ctx.client,
                Numeric::ERR_ERRONEUSNICKNAME,
                &[&new_nick, &qline.reason],
            );
            return Ok(());
        }
    }

    if let Some(existing) = net.find_user_by_nick(&new_nick) {
        if existing != ctx.client {
            net.send_numeric(&ctx.client, Numeric::ERR_NICKNAMEINUSE, &[&new_nick]);
            return Ok(());
        }
    }

    let registered = net.entity(&ctx.client).is_some_and(|e| e.flags.registered);
    let old_name = net
        .entity(&ctx.client)
        .map(|e| e.name.clone())
        .unwrap_or_default();

    if registered {
        let fullmask = net.entity(&ctx.client).map(|e| e.fullmask()).unwrap_or_default();
        let line = format!(":{} NICK :{}", fullmask, new_nick);
        for viewer in net.common_channel_viewers(&ctx.client) {
            net.send_to_entity(&viewer, &[], &line);
        }
        net.send_to_entity(&ctx.client, &[], &line);
        let s2s = format!(":{} NICK {} {}", ctx.client, new_nick, net.now());
        net.send_to_servers(Some(&ctx.client), &[], &s2s);
        if let Some(conn_id) = ctx.conn {
            net.add_penalty(conn_id, 10_000);
        }
    }

    net.nicks.remove(&to_irc_lower(&old_name));
    net.nicks.insert(to_irc_lower(&new_nick), ctx.client.clone());
    if let Some(entity) = net.entity_mut(&ctx.client) {
        entity.remember.nick = entity.name.clone();
        entity.name = new_nick;
    }

    if !registered {
        maybe_send_nospoof(net, ctx);
        crate::handlers::welcome::try_register(net, &ctx.client.clone());
    }
    Ok(())
}

fn remote_nick_change(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let new_nick = ctx.param(0).to_string();
    if new_nick.is_empty() {
        return Ok(());
    }
    let old_name = net
        .entity(&ctx.client)
        .map(|e| e.name.clone())
        .unwrap_or_default();
    let fullmask = net.entity(&ctx.client).map(|e| e.fullmask()).unwrap_or_default();
    let line = format!(":{} NICK :{}", fullmask, new_nick);
    for viewer in net.common_channel_viewers(&ctx.client) {
        net.send_to_entity(&viewer, &[], &line);
    }
    net.nicks.remove(&to_irc_lower(&old_name));
    net.nicks.insert(to_irc_lower(&new_nick), ctx.client.clone());
    if let Some(entity) = net.entity_mut(&ctx.client) {
        entity.remember.nick = old_name;
        entity.name = new_nick.clone();
    }
    let s2s = format!(":{} NICK {} {}", ctx.client, new_nick, ctx.param(1));
    net.send_to_servers(Some(&ctx.client), &[], &s2s);
    Ok(())
}

pub fn h_user(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let Some(conn_id) = ctx.conn else { return Ok(()) };
    let ident = match valid::clean_ident(ctx.param(0), 12) {
        Some(ident) => ident,
        None => {
            net.send_numeric(&ctx.client, Numeric::ERR_NEEDMOREPARAMS, &["USER"]);
            return Ok(());
        }
    };
    if let Some(conn) = net.conns.get_mut(&conn_id) {
        conn.pending_ident = Some(ident);
        conn.pending_gecos = Some(ctx.param(3).to_string());
    }
    maybe_send_nospoof(net, ctx);
    crate::handlers::welcome::try_register(net, &ctx.client.clone());
    Ok(())
}

/// Issue the anti-spoof PING cookie once nick and user are both staged.
fn maybe_send_nospoof(net: &mut Network, ctx: &CmdCtx) {
    if !net.conf.server.nospoof {
        return;
    }
    let Some(conn_id) = ctx.conn else { return };
    let ready = net.conns.get(&conn_id).is_some_and(|c| {
        c.pending_ident.is_some() && c.nospoof.is_none()
    }) && net.entity(&ctx.client).is_some_and(|e| e.name != "*");
    if !ready {
        return;
    }
    let cookie = format!("{:08X}", rand::thread_rng().r#gen::<u32>());
    let line = format!("PING :{}", cookie);
    net.send_raw_to_conn(conn_id, &line);
    if let Some(conn) = net.conns.get_mut(&conn_id) {
        conn.nospoof = Some(cookie);
    }
}

pub fn h_cap(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let Some(conn_id) = ctx.conn else { return Ok(()) };
    let sub = ctx.param(0).to_ascii_uppercase();
    let nick = net
        .entity(&ctx.client)
        .map(|e| e.name.clone())
        .unwrap_or_else(|| "*".to_string());
    let me = net.me_name();
    let registered = net.entity(&ctx.client).is_some_and(|e| e.flags.registered);

    match sub.as_str() {
        "LS" | "LIST" => {
            if !registered {
                if let Some(conn) = net.conns.get_mut(&conn_id) {
                    conn.cap_negotiating = true;
                }
            }
            let value = if sub == "LS" {
                CAPABILITIES.to_string()
            } else {
                let conn = net.conns.get(&conn_id);
                conn.map(|c| c.caps.iter().cloned().collect::<Vec<_>>().join(" "))
                    .unwrap_or_default()
            };
            let line = format!(":{} CAP {} {} :{}", me, nick, sub, value);
            net.send_raw_to_conn(conn_id, &line);
        }
        "REQ" => {
            if !registered {
                if let Some(conn) = net.conns.get_mut(&conn_id) {
                    conn.cap_negotiating = true;
                }
            }
            let requested = ctx.param(1).to_string();
            let known: Vec<&str> = CAPABILITIES.split(' ').collect();
            let all_known = requested
                .split_whitespace()
                .all(|cap| known.contains(&cap.trim_start_matches('-')));
            let verb = if all_known { "ACK" } else { "NAK" };
            if all_known {
                if let Some(conn) = net.conns.get_mut(&conn_id) {
                    for cap in requested.split_whitespace() {
                        match cap.strip_prefix('-') {
                            Some(removed) => {
                                conn.caps.remove(removed);
                            }
                            None => {
                                conn.caps.insert(cap.to_string());
                            }
                        }
                    }
                }
            }
            let line = format!(":{} CAP {} {} :{}", me, nick, verb, requested);
            net.send_raw_to_conn(conn_id, &line);
        }
        "END" => {
            if let Some(conn) = net.conns.get_mut(&conn_id) {
                conn.cap_negotiating = false;
            }
            crate::handlers::welcome::try_register(net, &ctx.client.clone());
        }
        other => {
            debug!(sub = %other, "unknown CAP subcommand");
            net.send_numeric(&ctx.client, Numeric::ERR_INVALIDCAPCMD, &[other]);
        }
    }
    Ok(())
}
