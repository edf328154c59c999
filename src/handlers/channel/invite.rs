//! INVITE: invitation bookkeeping, the no-invite mode and away courtesy.

use crate::engine::dispatch::CmdCtx;
use crate::error::HandlerResult;
use crate::state::channel::Invite;
use crate::state::network::Network;
use weft_proto::Numeric;

pub fn h_invite(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let target_token = ctx.param(0).to_string();
    let chan_name = ctx.param(1).to_string();

    let Some(target) = net.resolve_user(&target_token) else {
        net.send_numeric(&ctx.client, Numeric::ERR_NOSUCHNICK, &[&target_token]);
        return Ok(());
    };
    let Some(chan) = net.channel(&chan_name) else {
        net.send_numeric(&ctx.client, Numeric::ERR_NOSUCHCHANNEL, &[&chan_name]);
        return Ok(());
    };

    let target_name = net.entity(&target).map(|e| e.name.clone()).unwrap_or_default();
    if chan.has_member(&target) {
        net.send_numeric(
            &ctx.client,
            Numeric::ERR_USERONCHANNEL,
            &[&target_name, &chan_name],
        );
        return Ok(());
    }

    let inviter_rank = chan
        .members
        .get(&ctx.client)
        .map(|m| net.modes.member_rank(&m.status))
        .unwrap_or(0);

    if !ctx.from_server() {
        if !chan.has_member(&ctx.client) {
            net.send_numeric(&ctx.client, Numeric::ERR_NOTONCHANNEL, &[&chan_name]);
            return Ok(());
        }
        if chan.modes.contains(&'V') {
            net.send_numeric(&ctx.client, Numeric::ERR_NOINVITE, &[&chan_name]);
            return Ok(());
        }
        if chan.modes.contains(&'i') && inviter_rank < 30 {
            net.send_numeric(&ctx.client, Numeric::ERR_CHANOPRIVSNEEDED, &[&chan_name]);
            return Ok(());
        }
    }

    // Invites from channel operators walk through +i/+k/+l/+b.
    let now = net.now();
    if let Some(chan) = net.channel_mut(&chan_name) {
        chan.invites.insert(
            target.clone(),
            Invite {
                by: ctx.client.clone(),
                when: now,
                with_override: inviter_rank >= 30 || ctx.from_server(),
            },
        );
    }

    if !ctx.from_server() {
        net.send_numeric(&ctx.client, Numeric::RPL_INVITING, &[&target_name, &chan_name]);
        let away = net
            .entity(&target)
            .and_then(|e| e.user())
            .and_then(|u| u.away.clone());
        if let Some(away) = away {
            net.send_numeric(&ctx.client, Numeric::RPL_AWAY, &[&target_name, &away]);
        }
    }

    if net.is_local(&target) {
        let inviter_mask = net.entity(&ctx.client).map(|e| e.fullmask()).unwrap_or_default();
        let line = format!(":{} INVITE {} :{}", inviter_mask, target_name, chan_name);
        net.send_to_entity(&target, &[], &line);
    } else {
        let line = format!(":{} INVITE {} {}", ctx.client, target, chan_name);
        net.send_to_one_server(&target, &[], &line);
    }
    Ok(())
}
