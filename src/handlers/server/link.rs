//! Link negotiation: PROTOCTL, SERVER, SID, EOS and SQUIT.

use crate::engine::dispatch::CmdCtx;
use crate::error::HandlerResult;
use crate::hooks::{HookArgs, HookKind};
use crate::state::entity::{EntityKind, ServerInfo};
use crate::state::network::Network;
use tracing::{info, warn};
use weft_proto::{to_irc_lower, Numeric};

pub fn h_protoctl(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let Some(conn_id) = ctx.conn else { return Ok(()) };
    if let Some(conn) = net.conns.get_mut(&conn_id) {
        for token in &ctx.params {
            match token.split_once('=') {
                Some((key, value)) => {
                    conn.protoctl.insert(key.to_string(), value.to_string());
                }
                None => {
                    conn.protoctl.insert(token.clone(), String::new());
                }
            }
        }
    }
    Ok(())
}

/// Direct-link authentication: `SERVER <name> <hops> :<info>`.
pub fn h_server(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let Some(conn_id) = ctx.conn else { return Ok(()) };
    let name = ctx.param(0).to_string();
    let info = ctx.params.last().cloned().unwrap_or_default();

    let (pass, sid, eauth, was_outgoing) = {
        let Some(conn) = net.conns.get(&conn_id) else { return Ok(()) };
        (
            conn.pass.clone(),
            conn.protoctl.get("SID").cloned(),
            conn.protoctl.get("EAUTH").cloned(),
            conn.link_name.is_some(),
        )
    };

    let close = |net: &mut Network, reason: &str| {
        warn!(peer = %name, reason = %reason, "refusing server link");
        net.send_raw_to_conn(conn_id, &format!("ERROR :{}", reason));
        net.exit_client(&ctx.client.clone(), reason);
    };

    let Some(block) = net.conf.link.iter().find(|l| l.name == name).cloned() else {
        close(net, "Server not configured on this side of the link");
        return Ok(());
    };
    if pass.as_deref() != Some(block.password.as_str()) {
        close(net, "Link password mismatch");
        return Ok(());
    }
    let Some(sid) = sid else {
        close(net, "Missing SID in PROTOCTL");
        return Ok(());
    };
    if let Some(eauth) = &eauth {
        if !eauth.eq_ignore_ascii_case(&name) {
            close(net, "EAUTH does not match SERVER name");
            return Ok(());
        }
    }
    if net.entities.contains_key(&sid) || net.find_server_by_name(&name).is_some() {
        close(net, "Server with that SID or name already linked");
        return Ok(());
    }

    // The placeholder entity becomes the server, keyed by its SID.
    let old_id = ctx.client.clone();
    net.rekey_entity(&old_id, &sid);
    let me = net.me.clone();
    if let Some(entity) = net.entity_mut(&sid) {
        entity.name = name.clone();
        entity.info = info;
        entity.hops = 1;
        entity.uplink = me;
        entity.flags.registered = true;
        entity.kind = EntityKind::Server(ServerInfo {
            synced: false,
            authed: true,
            squit: false,
            link_name: Some(block.name.clone()),
        });
    }
    net.server_names.insert(to_irc_lower(&name), sid.clone());

    if !was_outgoing {
        net.send_link_intro(conn_id, &block);
    }

    info!(peer = %name, sid = %sid, "server link authenticated");
    net.send_snomask(None, 'L', &format!("Link with {} established", name), false);
    let args = HookArgs { client: Some(&sid), ..Default::default() };
    net.run_hook(HookKind::ServerLinkPostNegotiation, &args);

    // The peer bursts next; park other servers until its EOS. A link
    // arriving while another is mid-burst waits its turn in the parking
    // queue instead of stealing the slot.
    if net.current_link_sync.is_none() {
        net.current_link_sync = Some(sid.clone());
    }
    net.start_batch(&sid, "netjoin", &[&net.me_name(), &name]);
    net.send_burst(&sid);
    Ok(())
}

/// A server introduced from deeper in the mesh:
/// `:<uplink> SID <name> <hops> <sid> :<info>`.
pub fn h_sid(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let name = ctx.param(0).to_string();
    let hops: u32 = ctx.param(1).parse().unwrap_or(2);
    let sid = ctx.param(2).to_string();
    let info = ctx.param(3).to_string();

    if net.entities.contains_key(&sid) || net.find_server_by_name(&name).is_some() {
        warn!(sid = %sid, name = %name, "duplicate SID introduction, dropping link");
        net.exit_client(&ctx.direction.clone(), "Duplicate SID introduced");
        return Ok(());
    }

    let now = net.now();
    let entity = crate::state::entity::Entity {
        id: sid.clone(),
        name: name.clone(),
        hops,
        created: now,
        idle_since: now,
        uplink: ctx.client.clone(),
        direction: ctx.direction.clone(),
        conn: None,
        info: info.clone(),
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
    net.entities.insert(sid.clone(), entity);
    net.server_names.insert(to_irc_lower(&name), sid.clone());
    info!(sid = %sid, name = %name, hops, "server introduced");

    let line = format!(":{} SID {} {} {} :{}", ctx.client, name, hops + 1, sid, info);
    net.send_to_servers(Some(&ctx.direction), &[], &line);
    Ok(())
}

/// End of burst from a neighbour (or a deeper server, relayed).
pub fn h_eos(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let source = ctx.client.clone();
    if let Some(server) = net.entity_mut(&source).and_then(|e| e.server_mut()) {
        server.synced = true;
    }
    info!(server = %source, "end of burst");

    if net.current_link_sync.as_deref() == Some(source.as_str()) {
        net.current_link_sync = None;
    }

    if let Some(label) = net.find_batch(&source, "netjoin") {
        net.end_batch(&label);
    }

    let args = HookArgs { client: Some(&source), ..Default::default() };
    net.run_hook(HookKind::ServerSynced, &args);

    // Drain the servers parked during the burst, in arrival order.
    let parked = std::mem::take(&mut net.process_after_eos);
    for server_id in parked {
        if let Some(conn_id) = net.entity(&server_id).and_then(|e| e.conn) {
            net.drain_conn(conn_id);
        }
    }

    // Flush lines queued for this neighbour while it was bursting.
    if let Some(queued) = net.send_after_eos.remove(&source) {
        for line in queued {
            if let Some(conn_id) = net.entity(&source).and_then(|e| e.conn) {
                net.send_raw_to_conn(conn_id, &line);
            }
        }
    }

    let line = format!(":{} EOS", source);
    net.send_to_servers(Some(&ctx.direction), &[], &line);
    Ok(())
}

pub fn h_squit(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let token = ctx.param(0).to_string();
    let reason = if ctx.params.len() > 1 {
        ctx.param(1).to_string()
    } else {
        "No reason".to_string()
    };
    let Some(target) = net
        .find_server_by_name(&token)
        .or_else(|| net.entities.contains_key(&token).then(|| token.clone()))
    else {
        if !ctx.from_server() {
            net.send_numeric(&ctx.client, Numeric::ERR_NOSUCHSERVER, &[&token]);
        }
        return Ok(());
    };
    if target == net.me {
        net.send_numeric(&ctx.client, Numeric::ERR_NOSUCHSERVER, &[&token]);
        return Ok(());
    }
    net.server_exit(&target, &reason);
    Ok(())
}
