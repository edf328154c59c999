//! Built-in join and channel-message guards.
//!
//! Each restriction mode is its own CAN_JOIN / PRE_LOCAL_CHANMSG hook, so
//! the evaluation order and the override rules live in one place and
//! extensions can slot in around them.

use crate::hooks::{HookArgs, HookBus, HookKind, HookVerdict};
use crate::state::network::Network;

/// Register the mode-backed guards.
pub fn register_hooks(hooks: &mut HookBus) {
    // Join checks, cheapest first; the ban walk runs last.
    hooks.register(HookKind::CanJoin, 50, guard_join_oper_only);
    hooks.register(HookKind::CanJoin, 40, guard_join_secure);
    hooks.register(HookKind::CanJoin, 35, guard_join_registered);
    hooks.register(HookKind::CanJoin, 30, guard_join_invite_only);
    hooks.register(HookKind::CanJoin, 20, guard_join_key);
    hooks.register(HookKind::CanJoin, 15, guard_join_limit);
    hooks.register(HookKind::CanJoin, 10, guard_join_ban);

    hooks.register(HookKind::PreLocalChanmsg, 30, guard_msg_external);
    hooks.register(HookKind::PreLocalChanmsg, 20, guard_msg_moderated);
    hooks.register(HookKind::PreLocalChanmsg, 10, guard_msg_banned);
}

fn member_rank(net: &Network, chan: &str, client: &str) -> u8 {
    net.channel(chan)
        .and_then(|c| c.members.get(client))
        .map(|m| net.modes.member_rank(&m.status))
        .unwrap_or(0)
}

fn guard_join_oper_only(net: &mut Network, args: &HookArgs) -> HookVerdict {
    let (Some(client), Some(chan)) = (args.client, args.channel) else {
        return HookVerdict::Continue;
    };
    let restricted = net.channel(chan).is_some_and(|c| c.modes.contains(&'O'));
    if restricted && !net.entity(client).is_some_and(|e| e.is_oper()) {
        return HookVerdict::Reject(520);
    }
    HookVerdict::Continue
}

fn guard_join_secure(net: &mut Network, args: &HookArgs) -> HookVerdict {
    let (Some(client), Some(chan)) = (args.client, args.channel) else {
        return HookVerdict::Continue;
    };
    let restricted = net.channel(chan).is_some_and(|c| c.modes.contains(&'S'));
    if !restricted {
        return HookVerdict::Continue;
    }
    let secure = net
        .entity(client)
        .is_some_and(|e| e.user().is_some_and(|u| u.modes.contains(&'z')));
    if secure { HookVerdict::Continue } else { HookVerdict::Reject(489) }
}

fn guard_join_registered(net: &mut Network, args: &HookArgs) -> HookVerdict {
    let (Some(client), Some(chan)) = (args.client, args.channel) else {
        return HookVerdict::Continue;
    };
    let restricted = net.channel(chan).is_some_and(|c| c.modes.contains(&'r'));
    if !restricted {
        return HookVerdict::Continue;
    }
    let identified = net
        .entity(client)
        .is_some_and(|e| e.user().is_some_and(|u| u.account != "*"));
    if identified { HookVerdict::Continue } else { HookVerdict::Reject(477) }
}

fn guard_join_invite_only(net: &mut Network, args: &HookArgs) -> HookVerdict {
    let (Some(client), Some(chan_name)) = (args.client, args.channel) else {
        return HookVerdict::Continue;
    };
    let Some(chan) = net.channel(chan_name) else {
        return HookVerdict::Continue;
    };
    if !chan.modes.contains(&'i') {
        return HookVerdict::Continue;
    }
    if chan.invites.contains_key(client) || net.check_list_match(client, chan, 'I') {
        return HookVerdict::Continue;
    }
    HookVerdict::Reject(473)
}

fn guard_join_key(net: &mut Network, args: &HookArgs) -> HookVerdict {
    let (Some(_client), Some(chan_name)) = (args.client, args.channel) else {
        return HookVerdict::Continue;
    };
    let Some(chan) = net.channel(chan_name) else {
        return HookVerdict::Continue;
    };
    match chan.key() {
        Some(key) if args.key != Some(key) => HookVerdict::Reject(475),
        _ => HookVerdict::Continue,
    }
}

fn guard_join_limit(net: &mut Network, args: &HookArgs) -> HookVerdict {
    let Some(chan_name) = args.channel else {
        return HookVerdict::Continue;
    };
    let Some(chan) = net.channel(chan_name) else {
        return HookVerdict::Continue;
    };
    match chan.limit() {
        Some(limit) if chan.member_count() >= limit => HookVerdict::Reject(471),
        _ => HookVerdict::Continue,
    }
}

fn guard_join_ban(net: &mut Network, args: &HookArgs) -> HookVerdict {
    let (Some(client), Some(chan_name)) = (args.client, args.channel) else {
        return HookVerdict::Continue;
    };
    let Some(chan) = net.channel(chan_name) else {
        return HookVerdict::Continue;
    };
    if net.is_banned(client, chan) {
        return HookVerdict::Reject(474);
    }
    HookVerdict::Continue
}

fn guard_msg_external(net: &mut Network, args: &HookArgs) -> HookVerdict {
    let (Some(client), Some(chan_name)) = (args.client, args.channel) else {
        return HookVerdict::Continue;
    };
    let Some(chan) = net.channel(chan_name) else {
        return HookVerdict::Continue;
    };
    if chan.modes.contains(&'n') && !chan.has_member(client) {
        return HookVerdict::Reject(404);
    }
    HookVerdict::Continue
}

fn guard_msg_moderated(net: &mut Network, args: &HookArgs) -> HookVerdict {
    let (Some(client), Some(chan_name)) = (args.client, args.channel) else {
        return HookVerdict::Continue;
    };
    let moderated = net.channel(chan_name).is_some_and(|c| c.modes.contains(&'m'));
    if moderated && member_rank(net, chan_name, client) < 10 {
        return HookVerdict::Reject(404);
    }
    HookVerdict::Continue
}

fn guard_msg_banned(net: &mut Network, args: &HookArgs) -> HookVerdict {
    let (Some(client), Some(chan_name)) = (args.client, args.channel) else {
        return HookVerdict::Continue;
    };
    let Some(chan) = net.channel(chan_name) else {
        return HookVerdict::Continue;
    };
    // Voiced members speak through their own ban.
    if net.is_banned(client, chan) && member_rank(net, chan_name, client) < 10 {
        return HookVerdict::Reject(404);
    }
    HookVerdict::Continue
}
