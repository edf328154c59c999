//! Operator access and KILL.

use crate::engine::dispatch::CmdCtx;
use crate::error::HandlerResult;
use crate::state::entity::Swhois;
use crate::state::network::Network;
use weft_proto::{wildcard_match, Numeric};

pub fn h_oper(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let name = ctx.param(0).to_string();
    let password = ctx.param(1).to_string();
    let nick = net.entity(&ctx.client).map(|e| e.name.clone()).unwrap_or_default();

    if net.entity(&ctx.client).is_some_and(|e| e.is_oper()) {
        net.send_numeric(&ctx.client, Numeric::RPL_YOUREOPER, &[]);
        return Ok(());
    }

    let Some(block) = net.conf.oper.iter().find(|o| o.name == name).cloned() else {
        net.send_numeric(&ctx.client, Numeric::ERR_NOOPERHOST, &[]);
        return Ok(());
    };

    let userhost = {
        let Some(entity) = net.entity(&ctx.client) else { return Ok(()) };
        let Some(user) = entity.user() else { return Ok(()) };
        let ip = entity
            .conn
            .and_then(|c| net.conns.get(&c))
            .map(|c| c.ip.clone())
            .unwrap_or_default();
        (
            format!("{}@{}", user.username, user.realhost),
            format!("{}@{}", user.username, ip),
        )
    };
    let host_ok = block.mask.is_empty()
        || block
            .mask
            .iter()
            .any(|m| wildcard_match(m, &userhost.0) || wildcard_match(m, &userhost.1));
    if !host_ok {
        net.send_numeric(&ctx.client, Numeric::ERR_NOOPERHOST, &[]);
        return Ok(());
    }

    if block.password != password {
        net.send_numeric(&ctx.client, Numeric::ERR_PASSWDMISMATCH, &[]);
        net.send_snomask(
            None,
            'o',
            &format!("Failed OPER attempt by {} [{}]", nick, name),
            true,
        );
        return Ok(());
    }

    let snomask = crate::modes::snomask::filter_valid(&net.modes, &block.snomask);
    {
        let Some(user) = net.entities.get_mut(&ctx.client).and_then(|e| e.user_mut()) else {
            return Ok(());
        };
        user.modes.insert('o');
        user.modes.insert('s');
        user.oper = Some(block.name.clone());
        user.operclass = Some(block.operclass.clone());
        user.snomask = snomask;
        if let Some(swhois) = &block.swhois {
            user.swhois.push(Swhois {
                tag: "oper".to_string(),
                line: swhois.clone(),
            });
        }
    }

    net.send_numeric(&ctx.client, Numeric::RPL_YOUREOPER, &[]);
    let line = format!(":{} MODE {} :+os", nick, nick);
    net.send_to_entity(&ctx.client, &[], &line);
    let s2s = format!(":{} MODE {} :+o", ctx.client, ctx.client);
    net.send_to_servers(Some(&ctx.client), &[], &s2s);
    net.send_snomask(
        None,
        'o',
        &format!("{} is now an IRC Operator ({})", nick, block.operclass),
        true,
    );
    Ok(())
}

pub fn h_kill(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let token = ctx.param(0).to_string();
    let reason = ctx.param(1).to_string();
    let Some(target) = net.resolve_user(&token) else {
        if !ctx.from_server() {
            net.send_numeric(&ctx.client, Numeric::ERR_NOSUCHNICK, &[&token]);
        }
        return Ok(());
    };

    let killer_name = net.entity(&ctx.client).map(|e| e.name.clone()).unwrap_or_default();
    let target_name = net.entity(&target).map(|e| e.name.clone()).unwrap_or_default();

    // Services are off limits for operators.
    let protected = net
        .entity(&target)
        .and_then(|e| e.user())
        .is_some_and(|u| u.modes.contains(&'S'));
    if protected && !ctx.from_server() {
        net.send_numeric(&ctx.client, Numeric::ERR_KILLDENY, &[&target_name]);
        return Ok(());
    }

    if let Some(entity) = net.entity_mut(&target) {
        entity.flags.killed = true;
    }

    if net.is_local(&target) {
        net.send_numeric(
            &target,
            Numeric::RPL_TEXT,
            &[&format!("[{}] {}", killer_name, reason)],
        );
    }

    let line = format!(":{} KILL {} :{}", ctx.client, target, reason);
    net.send_to_servers(Some(&ctx.direction), &[], &line);

    net.send_snomask(
        None,
        'k',
        &format!("{} killed {} ({})", killer_name, target_name, reason),
        true,
    );
    net.exit_client(&target, &format!("Killed ({} ({}))", killer_name, reason));
    Ok(())
}
