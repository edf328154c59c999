//! KICK: forcible removal with rank and protection checks.

use crate::engine::dispatch::CmdCtx;
use crate::error::HandlerResult;
use crate::state::network::Network;
use weft_proto::{to_irc_lower, Numeric};

pub fn h_kick(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let chan_name = ctx.param(0).to_string();
    let target_token = ctx.param(1).to_string();
    let reason = if ctx.params.len() > 2 {
        ctx.param(2).to_string()
    } else {
        net.entity(&ctx.client).map(|e| e.name.clone()).unwrap_or_default()
    };

    let Some(chan) = net.channel(&chan_name) else {
        net.send_numeric(&ctx.client, Numeric::ERR_NOSUCHCHANNEL, &[&chan_name]);
        return Ok(());
    };
    let Some(target) = net.resolve_user(&target_token) else {
        net.send_numeric(&ctx.client, Numeric::ERR_NOSUCHNICK, &[&target_token]);
        return Ok(());
    };
    if !chan.has_member(&target) {
        let target_name = net.entity(&target).map(|e| e.name.clone()).unwrap_or_default();
        net.send_numeric(
            &ctx.client,
            Numeric::ERR_USERNOTINCHANNEL,
            &[&target_name, &chan_name],
        );
        return Ok(());
    }

    if !ctx.from_server() {
        let kicker_rank = chan
            .members
            .get(&ctx.client)
            .map(|m| net.modes.member_rank(&m.status))
            .unwrap_or(0);
        let target_rank = chan
            .members
            .get(&target)
            .map(|m| net.modes.member_rank(&m.status))
            .unwrap_or(0);
        if !chan.has_member(&ctx.client) {
            net.send_numeric(&ctx.client, Numeric::ERR_NOTONCHANNEL, &[&chan_name]);
            return Ok(());
        }
        if kicker_rank < 30 {
            net.send_numeric(&ctx.client, Numeric::ERR_CHANOPRIVSNEEDED, &[&chan_name]);
            return Ok(());
        }
        if target_rank > kicker_rank {
            let target_name = net.entity(&target).map(|e| e.name.clone()).unwrap_or_default();
            net.send_numeric(
                &ctx.client,
                Numeric::ERR_ATTACKDENY,
                &[&chan_name, &target_name],
            );
            return Ok(());
        }
    }

    let kicker_mask = net.entity(&ctx.client).map(|e| e.fullmask()).unwrap_or_default();
    let target_name = net.entity(&target).map(|e| e.name.clone()).unwrap_or_default();
    let line = format!(":{} KICK {} {} :{}", kicker_mask, chan_name, target_name, reason);
    net.broadcast_to_channel(&chan_name, Some(&target), None, &[], &line);

    let local_only = net.channel(&chan_name).is_some_and(|c| c.is_local_only());
    if !ctx.from_server() && !local_only {
        let s2s = format!(":{} KICK {} {} :{}", ctx.client, chan_name, target, reason);
        net.send_to_servers(Some(&ctx.client), &[], &s2s);
    }

    let folded = to_irc_lower(&chan_name);
    if let Some(chan) = net.channels.get_mut(&folded) {
        chan.remove_member(&target);
        if chan.member_count() == 0 {
            net.channels.remove(&folded);
        }
    }
    Ok(())
}
