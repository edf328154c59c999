//! User attribute changes: AWAY, SETHOST/SETIDENT/SETNAME, CHGHOST,
//! SWHOIS and MD moddata sync.

use crate::engine::dispatch::CmdCtx;
use crate::error::HandlerResult;
use crate::state::entity::Swhois;
use crate::state::network::Network;
use weft_proto::{valid, Numeric};

/// Which user attribute a change targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Gecos,
    Host,
    Ident,
}

impl ChangeType {
    fn verb(self) -> &'static str {
        match self {
            ChangeType::Gecos => "SETNAME",
            ChangeType::Host => "SETHOST",
            ChangeType::Ident => "SETIDENT",
        }
    }
}

/// Apply an attribute change and propagate it to the mesh.
pub fn setinfo(net: &mut Network, target: &str, change_type: ChangeType, value: &str) {
    let cleaned = match change_type {
        ChangeType::Gecos => Some(value.chars().take(50).collect::<String>()),
        ChangeType::Host => {
            let host: String = value.chars().filter(|c| valid::HOST_CHARS.contains(*c)).collect();
            if host.is_empty() { None } else { Some(host) }
        }
        ChangeType::Ident => valid::clean_ident(value, 12),
    };
    let Some(cleaned) = cleaned else { return };

    {
        let Some(entity) = net.entity_mut(target) else { return };
        match change_type {
            ChangeType::Gecos => entity.info = cleaned.clone(),
            ChangeType::Host => {
                if let Some(user) = entity.user_mut() {
                    user.cloakhost = cleaned.clone();
                    user.modes.insert('x');
                }
                entity.remember.cloakhost = cleaned.clone();
            }
            ChangeType::Ident => {
                if let Some(user) = entity.user_mut() {
                    user.username = cleaned.clone();
                }
                entity.remember.ident = cleaned.clone();
            }
        }
    }

    if change_type == ChangeType::Host && net.is_local(target) {
        net.send_numeric(target, Numeric::RPL_HOSTHIDDEN, &[&cleaned]);
    }
    let line = format!(":{} {} :{}", target, change_type.verb(), cleaned);
    net.send_to_servers(Some(target), &[], &line);
}

pub fn h_sethost(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    setinfo(net, &ctx.client.clone(), ChangeType::Host, ctx.param(0));
    Ok(())
}

pub fn h_setident(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    setinfo(net, &ctx.client.clone(), ChangeType::Ident, ctx.param(0));
    Ok(())
}

pub fn h_setname(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    setinfo(net, &ctx.client.clone(), ChangeType::Gecos, ctx.param(0));
    Ok(())
}

/// Operator-driven host change for another user.
pub fn h_chghost(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let token = ctx.param(0).to_string();
    let Some(target) = net.resolve_user(&token) else {
        net.send_numeric(&ctx.client, Numeric::ERR_NOSUCHNICK, &[&token]);
        return Ok(());
    };
    setinfo(net, &target, ChangeType::Host, ctx.param(1));
    Ok(())
}

/// `:<sid> SWHOIS <uid> +|- <tag> :<line>`
pub fn h_swhois(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let target = ctx.param(0).to_string();
    let sign = ctx.param(1).to_string();
    let tag = ctx.param(2).to_string();
    let line = ctx.param(3).to_string();

    {
        let Some(user) = net.entities.get_mut(&target).and_then(|e| e.user_mut()) else {
            return Ok(());
        };
        if sign == "+" {
            user.swhois.retain(|s| s.tag != tag);
            user.swhois.push(Swhois { tag: tag.clone(), line: line.clone() });
        } else {
            user.swhois.retain(|s| s.tag != tag);
        }
    }
    let out = format!(":{} SWHOIS {} {} {} :{}", ctx.client, target, sign, tag, line);
    net.send_to_servers(Some(&ctx.direction), &[], &out);
    Ok(())
}

/// `MD client <id> <name> :<value>` - synced moddata.
pub fn h_md(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    if ctx.param(0) != "client" {
        return Ok(());
    }
    let target = ctx.param(1).to_string();
    let name = ctx.param(2).to_string();
    let value = ctx.param(3).to_string();
    if let Some(entity) = net.entity_mut(&target) {
        entity.set_moddata(&name, &value, true);
        // Account status rides on moddata for mesh peers.
        if name == "account" {
            if let Some(user) = entity.user_mut() {
                user.account = value.clone();
            }
        }
    }
    let line = format!(":{} MD client {} {} :{}", ctx.client, target, name, value);
    net.send_to_servers(Some(&ctx.direction), &[], &line);
    Ok(())
}

pub fn h_away(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let reason = ctx.params.first().cloned().filter(|r| !r.is_empty());
    {
        let Some(user) = net.entities.get_mut(&ctx.client).and_then(|e| e.user_mut()) else {
            return Ok(());
        };
        user.away = reason.clone();
    }

    if !ctx.from_server() {
        let numeric = if reason.is_some() {
            Numeric::RPL_NOWAWAY
        } else {
            Numeric::RPL_UNAWAY
        };
        net.send_numeric(&ctx.client, numeric, &[]);
    }

    // away-notify for local common-channel viewers.
    let fullmask = net.entity(&ctx.client).map(|e| e.fullmask()).unwrap_or_default();
    let notify = match &reason {
        Some(r) => format!(":{} AWAY :{}", fullmask, r),
        None => format!(":{} AWAY", fullmask),
    };
    for viewer in net.common_channel_viewers(&ctx.client) {
        let has_cap = net
            .entity(&viewer)
            .and_then(|e| e.conn)
            .and_then(|c| net.conns.get(&c))
            .is_some_and(|c| c.caps.contains("away-notify"));
        if has_cap {
            net.send_to_entity(&viewer, &[], &notify);
        }
    }

    let s2s = match &reason {
        Some(r) => format!(":{} AWAY :{}", ctx.client, r),
        None => format!(":{} AWAY", ctx.client),
    };
    net.send_to_servers(Some(&ctx.client), &[], &s2s);
    Ok(())
}
