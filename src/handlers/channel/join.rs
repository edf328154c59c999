//! JOIN: admission, creation, founder status and mesh propagation.

use crate::engine::dispatch::CmdCtx;
use crate::error::HandlerResult;
use crate::hooks::{HookArgs, HookKind, HookVerdict};
use crate::state::channel::{Channel, ChannelMember};
use crate::state::network::Network;
use weft_proto::{valid, Numeric};

/// Map a CAN_JOIN rejection code onto its numeric.
fn join_numeric(code: u16) -> Numeric {
    match code {
        471 => Numeric::ERR_CHANNELISFULL,
        473 => Numeric::ERR_INVITEONLYCHAN,
        475 => Numeric::ERR_BADCHANNELKEY,
        477 => Numeric::ERR_NEEDREGGEDNICK,
        489 => Numeric::ERR_SECUREONLY,
        520 => Numeric::ERR_OPERONLY,
        _ => Numeric::ERR_BANNEDFROMCHAN,
    }
}

pub fn h_join(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let keys: Vec<&str> = ctx.param(1).split(',').collect();
    for (i, chan) in ctx.param(0).split(',').enumerate() {
        if chan.is_empty() {
            continue;
        }
        let key = keys.get(i).copied().filter(|k| !k.is_empty());
        do_join(net, &ctx.client.clone(), chan, key, ctx.from_server());
    }
    if let Some(conn_id) = ctx.conn {
        net.add_penalty(conn_id, 15_000);
    }
    Ok(())
}

/// Admit a client into a channel, creating it when absent.
pub fn do_join(net: &mut Network, client: &str, chan_name: &str, key: Option<&str>, from_server: bool) {
    if !valid::valid_channel_name(chan_name, 32) {
        net.send_numeric(client, Numeric::ERR_NOSUCHCHANNEL, &[chan_name]);
        return;
    }
    if net.channel(chan_name).is_some_and(|c| c.has_member(client)) {
        return;
    }

    if !from_server {
        let joined = net
            .channels
            .values()
            .filter(|c| c.has_member(client))
            .count();
        if joined >= net.conf.limits.max_channels_per_user {
            net.send_numeric(client, Numeric::ERR_TOOMANYCHANNELS, &[chan_name]);
            return;
        }
    }

    let now = net.now();
    let created = net.channel(chan_name).is_none();
    if created {
        let folded = weft_proto::to_irc_lower(chan_name);
        net.channels.insert(folded, Channel::new(chan_name, now));
    }

    // Admission control for local users: an overriding invite or an
    // operator walk-through skips the guard hooks entirely.
    if !from_server {
        let overriding_invite = net
            .channel(chan_name)
            .and_then(|c| c.invites.get(client))
            .is_some_and(|i| i.with_override);
        let oper_walkthrough =
            net.conf.server.oper_override && net.entity(client).is_some_and(|e| e.is_oper());
        if !overriding_invite && !oper_walkthrough {
            let args = HookArgs {
                client: Some(client),
                channel: Some(chan_name),
                key,
                ..Default::default()
            };
            match net.run_hook(HookKind::CanJoin, &args) {
                HookVerdict::Reject(code) => {
                    net.send_numeric(client, join_numeric(code), &[chan_name]);
                    if created {
                        let folded = weft_proto::to_irc_lower(chan_name);
                        net.channels.remove(&folded);
                    }
                    return;
                }
                HookVerdict::Deny => return,
                _ => {}
            }
        }
    }

    // First member of a # or & channel founds it with ops.
    let mut status = std::collections::BTreeSet::new();
    let modeless = net.channel(chan_name).is_some_and(|c| c.is_modeless());
    let first = net.channel(chan_name).is_some_and(|c| c.member_count() == 0);
    if first && !modeless {
        status.insert('o');
    }

    if let Some(chan) = net.channel_mut(chan_name) {
        chan.invites.remove(client);
        chan.members.insert(
            client.to_string(),
            ChannelMember { status: status.clone(), joined_at: now },
        );
    }

    if created && !from_server {
        let plain_flags: Vec<char> = net
            .conf
            .server
            .modes_on_join
            .chars()
            .filter(|&flag| {
                matches!(
                    net.modes.chan_def(flag).map(|d| d.kind),
                    Some(crate::modes::ChanModeKind::Flag)
                )
            })
            .collect();
        if let Some(chan) = net.channel_mut(chan_name) {
            chan.modes.extend(plain_flags);
        }
    }

    announce_join(net, client, chan_name);

    if !from_server {
        let local_only = net.channel(chan_name).is_some_and(|c| c.is_local_only());
        if !local_only {
            let ts = net.channel(chan_name).map(|c| c.remote_created).unwrap_or(now);
            let sigils: String = status
                .iter()
                .filter_map(|&f| net.modes.prefix_of(f))
                .collect();
            let line = format!(":{} SJOIN {} {} :{}{}", net.me, ts, chan_name, sigils, client);
            net.send_to_servers(Some(client), &[], &line);
        }
    }
}

/// Reveal a join to the joiner and to every viewer allowed to see it.
fn announce_join(net: &mut Network, client: &str, chan_name: &str) {
    let fullmask = net.entity(client).map(|e| e.fullmask()).unwrap_or_default();
    let join_line = format!(":{} JOIN :{}", fullmask, chan_name);

    let members: Vec<String> = net
        .channel(chan_name)
        .map(|c| c.members.keys().cloned().collect())
        .unwrap_or_default();
    for member in members {
        if member == client || !net.is_local(&member) {
            continue;
        }
        if net.channel(chan_name).is_some_and(|c| c.has_seen(&member, client)) {
            continue;
        }
        if !net.user_can_see_member(&member, client, chan_name) {
            continue;
        }
        net.send_to_entity(&member, &[], &join_line);
        if let Some(chan) = net.channel_mut(chan_name) {
            chan.mark_seen(&member, client);
        }
    }

    if net.is_local(client) {
        net.send_to_entity(client, &[], &join_line);
        if let Some(chan) = net.channel_mut(chan_name) {
            chan.mark_seen(client, client);
        }
        // Founder status surfaces as a server mode change.
        let founder_flags: String = net
            .channel(chan_name)
            .and_then(|c| c.members.get(client))
            .map(|m| m.status.iter().collect())
            .unwrap_or_default();
        if !founder_flags.is_empty() {
            let nick = net.entity(client).map(|e| e.name.clone()).unwrap_or_default();
            let params = vec![nick.clone(); founder_flags.len()].join(" ");
            let me = net.me_name();
            let line = format!(":{} MODE {} +{} {}", me, chan_name, founder_flags, params);
            net.send_to_entity(client, &[], &line);
        }
        let topic_set = net.channel(chan_name).is_some_and(|c| !c.topic.is_empty());
        if topic_set {
            super::topic::send_topic_numerics(net, client, chan_name);
        }
        super::names::send_names(net, client, chan_name);
    }
}
