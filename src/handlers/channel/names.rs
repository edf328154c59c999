//! NAMES: the member listing, visibility-filtered.

use crate::engine::dispatch::CmdCtx;
use crate::error::HandlerResult;
use crate::state::network::Network;
use weft_proto::Numeric;

pub fn h_names(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    for chan in ctx.param(0).split(',') {
        if !chan.is_empty() {
            send_names(net, &ctx.client.clone(), chan);
        }
    }
    Ok(())
}

/// 353 lines and the 366 terminator for one channel.
///
/// Listing a member also reveals it: each shown member lands in the
/// viewer's seen set.
pub fn send_names(net: &mut Network, client: &str, chan_name: &str) {
    let members: Vec<String> = net
        .channel(chan_name)
        .map(|c| c.members.keys().cloned().collect())
        .unwrap_or_default();
    let is_member = net.channel(chan_name).is_some_and(|c| c.has_member(client));
    let secret = net.channel(chan_name).is_some_and(|c| c.modes.contains(&'s'));

    if !secret || is_member {
        let mut shown = Vec::new();
        for member in members {
            if member != client && !net.user_can_see_member(client, &member, chan_name) {
                continue;
            }
            let sigil = net
                .channel(chan_name)
                .and_then(|c| c.members.get(&member))
                .map(|m| {
                    // Highest-ranked status only.
                    m.status
                        .iter()
                        .max_by_key(|&&f| net.modes.rank_of(f))
                        .and_then(|&f| net.modes.prefix_of(f))
                })
                .unwrap_or(None);
            let name = net.entity(&member).map(|e| e.name.clone()).unwrap_or_default();
            shown.push(match sigil {
                Some(s) => format!("{}{}", s, name),
                None => name,
            });
            if let Some(chan) = net.channel_mut(chan_name) {
                chan.mark_seen(client, &member);
            }
        }
        // 512-byte discipline: a handful of names per line.
        for chunk in shown.chunks(20) {
            net.send_numeric(client, Numeric::RPL_NAMEREPLY, &[chan_name, &chunk.join(" ")]);
        }
    }
    net.send_numeric(client, Numeric::RPL_ENDOFNAMES, &[chan_name]);
}
