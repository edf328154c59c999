//! PART: leave a channel, destroying it when emptied.

use crate::engine::dispatch::CmdCtx;
use crate::error::HandlerResult;
use crate::state::network::Network;
use weft_proto::{to_irc_lower, Numeric};

pub fn h_part(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let reason = ctx.param(1).to_string();
    for chan in ctx.param(0).split(',') {
        if !chan.is_empty() {
            do_part(net, &ctx.client.clone(), chan, &reason, ctx.from_server());
        }
    }
    Ok(())
}

/// Remove a member, telling every viewer that has seen them.
pub fn do_part(net: &mut Network, client: &str, chan_name: &str, reason: &str, from_server: bool) {
    let Some(chan) = net.channel(chan_name) else {
        if !from_server {
            net.send_numeric(client, Numeric::ERR_NOSUCHCHANNEL, &[chan_name]);
        }
        return;
    };
    if !chan.has_member(client) {
        if !from_server {
            net.send_numeric(client, Numeric::ERR_NOTONCHANNEL, &[chan_name]);
        }
        return;
    }

    let fullmask = net.entity(client).map(|e| e.fullmask()).unwrap_or_default();
    let line = if reason.is_empty() {
        format!(":{} PART {}", fullmask, chan_name)
    } else {
        format!(":{} PART {} :{}", fullmask, chan_name, reason)
    };
    net.broadcast_to_channel(chan_name, Some(client), Some(client), &[], &line);
    if net.is_local(client) {
        net.send_to_entity(client, &[], &line);
    }

    let local_only = net.channel(chan_name).is_some_and(|c| c.is_local_only());
    if !from_server && !local_only {
        let s2s = if reason.is_empty() {
            format!(":{} PART {}", client, chan_name)
        } else {
            format!(":{} PART {} :{}", client, chan_name, reason)
        };
        net.send_to_servers(Some(client), &[], &s2s);
    }

    let folded = to_irc_lower(chan_name);
    if let Some(chan) = net.channels.get_mut(&folded) {
        chan.remove_member(client);
        if chan.member_count() == 0 {
            net.channels.remove(&folded);
        }
    }
}
