//! SJOIN: channel burst with timestamp resolution.
//!
//! `:<sid> SJOIN <ts> <chan> [+modes params…] :<sigils><uid> …`
//!
//! The older creation timestamp wins. When the remote side is older we
//! adopt its timestamp, drop our non-status modes and the list entries
//! set after that time, and apply the remote modes. When the remote side
//! is newer its modes are ignored. Equal timestamps merge.

use crate::engine::dispatch::CmdCtx;
use crate::error::HandlerResult;
use crate::state::channel::{Channel, ChannelMember};
use crate::state::network::Network;
use std::collections::BTreeSet;
use tracing::debug;
use weft_proto::to_irc_lower;

pub fn h_sjoin(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let rts: i64 = ctx.param(0).parse().unwrap_or_else(|_| net.now());
    let chan_name = ctx.param(1).to_string();
    let member_blob = ctx.params.last().cloned().unwrap_or_default();
    let mode_parts: Vec<String> = if ctx.params.len() > 3 {
        ctx.params[2..ctx.params.len() - 1].to_vec()
    } else {
        Vec::new()
    };

    let folded = to_irc_lower(&chan_name);
    let created = !net.channels.contains_key(&folded);
    if created {
        let mut chan = Channel::new(&chan_name, rts);
        chan.remote_created = rts;
        net.channels.insert(folded.clone(), chan);
    }

    let lts = net.channels.get(&folded).map(|c| c.remote_created).unwrap_or(rts);
    let remote_modes_apply = if rts < lts {
        debug!(chan = %chan_name, rts, lts, "remote side is older, resetting local modes");
        if let Some(chan) = net.channels.get_mut(&folded) {
            chan.remote_created = rts;
            chan.modes.clear();
            chan.params.clear();
            // Entries younger than the surviving timestamp go with them.
            for entries in chan.lists.values_mut() {
                entries.retain(|e| e.set_time <= rts);
            }
            chan.lists.retain(|_, entries| !entries.is_empty());
        }
        true
    } else if rts == lts {
        true
    } else {
        debug!(chan = %chan_name, rts, lts, "remote side is newer, ignoring its modes");
        false
    };

    if remote_modes_apply && !mode_parts.is_empty() {
        let modestr = mode_parts[0].clone();
        let params = mode_parts[1..].to_vec();
        crate::handlers::mode::apply_mode_string(
            net,
            &ctx.client.clone(),
            &chan_name,
            &modestr,
            &params,
            true,
        );
    }

    // Members arrive as "<sigils><uid>", space separated.
    let now = net.now();
    let batch_label = net.find_batch(&ctx.direction, "netjoin");
    for token in member_blob.split_whitespace() {
        let mut status: BTreeSet<char> = BTreeSet::new();
        let mut rest = token;
        while let Some(c) = rest.chars().next() {
            match net.modes.flag_for_prefix(c) {
                Some(flag) => {
                    status.insert(flag);
                    rest = &rest[c.len_utf8()..];
                }
                None => break,
            }
        }
        let uid = rest.to_string();
        if uid.is_empty() || net.entity(&uid).is_none() {
            debug!(chan = %chan_name, token = %token, "SJOIN references unknown uid");
            continue;
        }

        let is_new = !net.channels.get(&folded).is_some_and(|c| c.has_member(&uid));
        if let Some(chan) = net.channels.get_mut(&folded) {
            let member = chan
                .members
                .entry(uid.clone())
                .or_insert_with(|| ChannelMember { status: BTreeSet::new(), joined_at: now });
            // Higher rank wins on merge; union keeps both sides' grants.
            member.status.extend(status.iter().copied());
        }
        if is_new {
            reveal_remote_join(net, &chan_name, &uid, &status, batch_label.as_deref());
        }
    }

    // Preserve the source prefix hop by hop.
    let mut parts = vec![rts.to_string(), chan_name.clone()];
    parts.extend(mode_parts);
    let line = format!(":{} SJOIN {} :{}", ctx.client, parts.join(" "), member_blob);
    net.send_to_servers(Some(&ctx.direction), &[], &line);
    Ok(())
}

/// Show a bursted join (and its status grants) to local viewers.
fn reveal_remote_join(
    net: &mut Network,
    chan_name: &str,
    uid: &str,
    status: &BTreeSet<char>,
    batch_label: Option<&str>,
) {
    let fullmask = net.entity(uid).map(|e| e.fullmask()).unwrap_or_default();
    let nick = net.entity(uid).map(|e| e.name.clone()).unwrap_or_default();
    let join_line = format!(":{} JOIN :{}", fullmask, chan_name);
    let mode_line = if status.is_empty() {
        None
    } else {
        let flags: String = status.iter().collect();
        let nicks = vec![nick.clone(); status.len()].join(" ");
        Some(format!(":{} MODE {} +{} {}", net.me_name(), chan_name, flags, nicks))
    };

    let members: Vec<String> = net
        .channel(chan_name)
        .map(|c| c.members.keys().cloned().collect())
        .unwrap_or_default();
    for member in members {
        if member == uid || !net.is_local(&member) {
            continue;
        }
        if !net.user_can_see_member(&member, uid, chan_name) {
            continue;
        }
        let mut tags = Vec::new();
        if let (Some(label), Some(conn)) = (batch_label, net.entity(&member).and_then(|e| e.conn)) {
            if let Some(tag) = net.batch_tag_for(label, conn) {
                tags.push(tag);
            }
        }
        net.send_to_entity(&member, &tags, &join_line);
        if let Some(line) = &mode_line {
            net.send_to_entity(&member, &tags, line);
        }
        if let Some(chan) = net.channel_mut(chan_name) {
            chan.mark_seen(&member, uid);
        }
    }
}
