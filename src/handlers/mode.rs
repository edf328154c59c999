//! MODE: the user and channel mode engine.
//!
//! Mode strings walk left to right behind a sign pointer. Channel changes
//! accumulate into a mode/parameter buffer and are emitted in lines of at
//! most `limits.max_modes_per_line` changes. Remote changes (server
//! direction) skip permission checks; timestamp disputes are settled at
//! SJOIN time, not here.

use crate::engine::dispatch::CmdCtx;
use crate::error::HandlerResult;
use crate::modes::{extban, ChanModeKind, SetterLevel};
use crate::state::channel::ListEntry;
use crate::state::network::Network;
use std::collections::BTreeSet;
use weft_proto::{make_mask, Numeric};

pub fn h_mode(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let target = ctx.param(0).to_string();
    if target.starts_with(['#', '&', '+']) {
        channel_mode(net, ctx, &target)
    } else {
        user_mode(net, ctx, &target)
    }
}

// --- User modes ---

fn user_mode(net: &mut Network, ctx: &CmdCtx, target: &str) -> HandlerResult {
    let Some(target_id) = net.resolve_user(target) else {
        net.send_numeric(&ctx.client, Numeric::ERR_NOSUCHNICK, &[target]);
        return Ok(());
    };
    if !ctx.from_server() && target_id != ctx.client {
        net.send_numeric(&ctx.client, Numeric::ERR_USERSDONTMATCH, &[]);
        return Ok(());
    }

    if ctx.params.len() < 2 {
        let modes = net
            .entity(&target_id)
            .and_then(|e| e.user())
            .map(|u| u.mode_string())
            .unwrap_or_else(|| "+".to_string());
        net.send_numeric(&ctx.client, Numeric::RPL_UMODEIS, &[&modes]);
        return Ok(());
    }

    let modestr = ctx.param(1).to_string();
    let snomask_param = ctx.param(2).to_string();
    let is_oper = net.entity(&ctx.client).is_some_and(|e| e.is_oper());
    let mut set = true;
    let mut applied_plus = String::new();
    let mut applied_minus = String::new();
    let mut unknown_sent = false;
    let mut deopered = false;

    for flag in modestr.chars() {
        match flag {
            '+' => set = true,
            '-' => set = false,
            _ => {
                let Some(def) = net.modes.user_def(flag).cloned() else {
                    if !unknown_sent && !ctx.from_server() {
                        net.send_numeric(
                            &ctx.client,
                            Numeric::ERR_UMODEUNKNOWNFLAG,
                            &[&flag.to_string()],
                        );
                        unknown_sent = true;
                    }
                    continue;
                };
                if !ctx.from_server() {
                    let allowed = match def.level {
                        SetterLevel::Anyone => true,
                        // Operator modes may always be dropped, never
                        // self-granted.
                        SetterLevel::Oper => !set || is_oper && flag != 'o',
                        SetterLevel::Server => false,
                    };
                    if !allowed || (flag == 'o' && set) {
                        continue;
                    }
                }
                let changed = {
                    let Some(user) = net.entities.get_mut(&target_id).and_then(|e| e.user_mut())
                    else {
                        continue;
                    };
                    if set {
                        user.modes.insert(flag)
                    } else {
                        user.modes.remove(&flag)
                    }
                };
                if !changed {
                    continue;
                }
                if flag == 's' {
                    let Some(user) = net.entities.get_mut(&target_id).and_then(|e| e.user_mut())
                    else {
                        continue;
                    };
                    if set {
                        let requested = snomask_param.trim_start_matches('+');
                        user.snomask = crate::modes::snomask::filter_valid(
                            &net.modes,
                            if requested.is_empty() { "s" } else { requested },
                        );
                    } else {
                        user.snomask.clear();
                    }
                }
                if flag == 'o' && !set {
                    deopered = true;
                }
                if set {
                    applied_plus.push(flag);
                } else {
                    applied_minus.push(flag);
                }
            }
        }
    }

    // Deoper sweeps the oper-coupled modes with it.
    if deopered {
        let sweep: Vec<char> = net
            .modes
            .user
            .iter()
            .filter(|d| d.unset_on_deoper && d.flag != 'o')
            .map(|d| d.flag)
            .collect();
        if let Some(user) = net.entities.get_mut(&target_id).and_then(|e| e.user_mut()) {
            user.oper = None;
            user.operclass = None;
            for flag in sweep {
                if user.modes.remove(&flag) {
                    applied_minus.push(flag);
                }
            }
            user.snomask.clear();
        }
    }

    if applied_plus.is_empty() && applied_minus.is_empty() {
        return Ok(());
    }
    let mut changes = String::new();
    if !applied_plus.is_empty() {
        changes.push('+');
        changes.push_str(&applied_plus);
    }
    if !applied_minus.is_empty() {
        changes.push('-');
        changes.push_str(&applied_minus);
    }

    let nick = net.entity(&target_id).map(|e| e.name.clone()).unwrap_or_default();
    if net.is_local(&target_id) {
        let line = format!(":{} MODE {} :{}", nick, nick, changes);
        net.send_to_entity(&target_id, &[], &line);
    }

    // Only globally synced flags cross the mesh.
    let global_plus: String = applied_plus
        .chars()
        .filter(|&f| net.modes.user_def(f).is_some_and(|d| d.is_global))
        .collect();
    let global_minus: String = applied_minus
        .chars()
        .filter(|&f| net.modes.user_def(f).is_some_and(|d| d.is_global))
        .collect();
    if !global_plus.is_empty() || !global_minus.is_empty() {
        let mut global = String::new();
        if !global_plus.is_empty() {
            global.push('+');
            global.push_str(&global_plus);
        }
        if !global_minus.is_empty() {
            global.push('-');
            global.push_str(&global_minus);
        }
        let line = format!(":{} MODE {} :{}", target_id, target_id, global);
        net.send_to_servers(Some(&ctx.direction), &[], &line);
    }
    Ok(())
}

// --- Channel modes ---

fn channel_mode(net: &mut Network, ctx: &CmdCtx, chan_name: &str) -> HandlerResult {
    if net.channel(chan_name).is_none() {
        net.send_numeric(&ctx.client, Numeric::ERR_NOSUCHCHANNEL, &[chan_name]);
        return Ok(());
    }

    if ctx.params.len() < 2 {
        send_channel_modes(net, &ctx.client.clone(), chan_name);
        return Ok(());
    }

    // A bare list flag queries the list.
    let modestr = ctx.param(1).to_string();
    let bare = modestr.trim_start_matches('+');
    if ctx.params.len() == 2 && bare.len() == 1 {
        let flag = bare.chars().next().unwrap();
        let is_list = matches!(
            net.modes.chan_def(flag).map(|d| d.kind),
            Some(ChanModeKind::List)
        );
        if is_list || flag == 'q' {
            send_list_query(net, &ctx.client.clone(), chan_name, flag);
            return Ok(());
        }
    }

    let params: Vec<String> = ctx.params[2..].to_vec();
    apply_mode_string(net, &ctx.client.clone(), chan_name, &modestr, &params, ctx.from_server());
    Ok(())
}

fn send_channel_modes(net: &mut Network, client: &str, chan_name: &str) {
    let Some(chan) = net.channel(chan_name) else { return };
    // Parameter flags render once, at the end, next to their values.
    let mut flags: String = chan
        .modes
        .iter()
        .filter(|f| !chan.params.contains_key(*f))
        .collect();
    let mut values = Vec::new();
    for (&flag, value) in &chan.params {
        flags.push(flag);
        values.push(value.clone());
    }
    let created = chan.remote_created;
    net.send_numeric(
        client,
        Numeric::RPL_CHANNELMODEIS,
        &[chan_name, &flags, &values.join(" ")],
    );
    net.send_numeric(
        client,
        Numeric::RPL_CREATIONTIME,
        &[chan_name, &created.to_string()],
    );
}

fn send_list_query(net: &mut Network, client: &str, chan_name: &str, flag: char) {
    // The owner listing reuses the member table, not a mask list.
    if flag == 'q' {
        let owners: Vec<String> = net
            .channel(chan_name)
            .map(|c| {
                c.members
                    .iter()
                    .filter(|(_, m)| m.status.contains(&'q'))
                    .filter_map(|(id, _)| net.entity(id).map(|e| e.name.clone()))
                    .collect()
            })
            .unwrap_or_default();
        for owner in owners {
            net.send_numeric(client, Numeric::RPL_QLIST, &[chan_name, &owner]);
        }
        net.send_numeric(client, Numeric::RPL_ENDOFQLIST, &[chan_name]);
        return;
    }

    let entries: Vec<ListEntry> = net
        .channel(chan_name)
        .map(|c| c.list(flag).to_vec())
        .unwrap_or_default();
    let (item, end) = match flag {
        'b' => (Numeric::RPL_BANLIST, Numeric::RPL_ENDOFBANLIST),
        'e' => (Numeric::RPL_EXLIST, Numeric::RPL_ENDOFEXLIST),
        _ => (Numeric::RPL_INVEXLIST, Numeric::RPL_ENDOFINVEXLIST),
    };
    for entry in entries {
        net.send_numeric(
            client,
            item,
            &[chan_name, &entry.mask, &entry.set_by, &entry.set_time.to_string()],
        );
    }
    net.send_numeric(client, end, &[chan_name]);
}

/// One applied change.
type Change = (bool, char, Option<String>);

/// Walk and apply a channel mode string; broadcasts whatever stuck.
pub fn apply_mode_string(
    net: &mut Network,
    source: &str,
    chan_name: &str,
    modestr: &str,
    params: &[String],
    from_server: bool,
) {
    let now = net.now();
    let setter_rank = net
        .channel(chan_name)
        .and_then(|c| c.members.get(source))
        .map(|m| net.modes.member_rank(&m.status))
        .unwrap_or(0);
    let setter_is_oper = net.entity(source).is_some_and(|e| e.is_oper());
    let setter_name = net.entity(source).map(|e| e.name.clone()).unwrap_or_default();

    let mut set = true;
    let mut param_idx = 0usize;
    let mut applied: Vec<Change> = Vec::new();
    let mut unknown: BTreeSet<char> = BTreeSet::new();

    let next_param = |idx: &mut usize| -> Option<String> {
        let p = params.get(*idx).cloned();
        if p.is_some() {
            *idx += 1;
        }
        p
    };

    for flag in modestr.chars() {
        match flag {
            '+' => {
                set = true;
                continue;
            }
            '-' => {
                set = false;
                continue;
            }
            _ => {}
        }
        let Some(def) = net.modes.chan_def(flag).cloned() else {
            // Once per unknown character.
            if unknown.insert(flag) && !from_server {
                net.send_numeric(source, Numeric::ERR_UNKNOWNMODE, &[&flag.to_string()]);
            }
            continue;
        };

        match def.kind {
            ChanModeKind::Member { rank, .. } => {
                let Some(target_nick) = next_param(&mut param_idx) else { continue };
                let Some(target_id) = net.resolve_user(&target_nick) else {
                    if !from_server {
                        net.send_numeric(source, Numeric::ERR_NOSUCHNICK, &[&target_nick]);
                    }
                    continue;
                };
                if !net.channel(chan_name).is_some_and(|c| c.has_member(&target_id)) {
                    if !from_server {
                        net.send_numeric(
                            source,
                            Numeric::ERR_USERNOTINCHANNEL,
                            &[&target_nick, chan_name],
                        );
                    }
                    continue;
                }
                if !from_server && !setter_is_oper {
                    let target_rank = net
                        .channel(chan_name)
                        .and_then(|c| c.members.get(&target_id))
                        .map(|m| net.modes.member_rank(&m.status))
                        .unwrap_or(0);
                    let denied = setter_rank < rank || (!set && setter_rank < target_rank);
                    if denied {
                        let numeric = if rank >= 50 {
                            Numeric::ERR_CHANOWNPRIVNEEDED
                        } else {
                            Numeric::ERR_CHANOPRIVSNEEDED
                        };
                        net.send_numeric(source, numeric, &[chan_name]);
                        continue;
                    }
                }
                let changed = net
                    .channel_mut(chan_name)
                    .and_then(|c| c.members.get_mut(&target_id))
                    .map(|m| {
                        if set {
                            m.status.insert(flag)
                        } else {
                            m.status.remove(&flag)
                        }
                    })
                    .unwrap_or(false);
                if changed {
                    let name = net
                        .entity(&target_id)
                        .map(|e| e.name.clone())
                        .unwrap_or(target_nick);
                    applied.push((set, flag, Some(name)));
                }
            }
            ChanModeKind::List => {
                let Some(raw_mask) = next_param(&mut param_idx) else {
                    send_list_query(net, source, chan_name, flag);
                    continue;
                };
                if !from_server && !permitted(net, source, setter_rank, setter_is_oper, &def, chan_name) {
                    continue;
                }
                let mask = if extban::is_extban(&raw_mask) {
                    match extban::normalize(&raw_mask) {
                        Some(mask) => mask,
                        None => {
                            if !from_server {
                                net.send_numeric(
                                    source,
                                    Numeric::ERR_INVALIDMODEPARAM,
                                    &[chan_name, &flag.to_string(), &raw_mask, "Invalid extban"],
                                );
                            }
                            continue;
                        }
                    }
                } else {
                    make_mask(&raw_mask)
                };
                if set {
                    let full = net
                        .channel(chan_name)
                        .is_some_and(|c| c.list(flag).len() >= net.conf.limits.max_list_entries);
                    if full {
                        if !from_server {
                            net.send_numeric(
                                source,
                                Numeric::ERR_BANLISTFULL,
                                &[chan_name, &mask, &flag.to_string()],
                            );
                        }
                        continue;
                    }
                    let entry = ListEntry {
                        mask: mask.clone(),
                        set_by: setter_name.clone(),
                        set_time: now,
                    };
                    let added = net
                        .channel_mut(chan_name)
                        .map(|c| c.add_list_entry(flag, entry))
                        .unwrap_or(false);
                    if added {
                        applied.push((true, flag, Some(mask)));
                    }
                } else {
                    let removed = net
                        .channel_mut(chan_name)
                        .map(|c| c.remove_list_entry(flag, &mask))
                        .unwrap_or(false);
                    if removed {
                        applied.push((false, flag, Some(mask)));
                    }
                }
            }
            ChanModeKind::ParamBoth | ChanModeKind::ParamSet => {
                if !from_server && !permitted(net, source, setter_rank, setter_is_oper, &def, chan_name) {
                    if def.takes_param(set) {
                        let _ = next_param(&mut param_idx);
                    }
                    continue;
                }
                if set {
                    let Some(raw) = next_param(&mut param_idx) else { continue };
                    let value = match def.normalize {
                        Some(normalize) => match normalize(&raw) {
                            Some(v) => v,
                            None => {
                                if !from_server {
                                    net.send_numeric(
                                        source,
                                        Numeric::ERR_INVALIDMODEPARAM,
                                        &[chan_name, &flag.to_string(), &raw, "Invalid parameter"],
                                    );
                                }
                                continue;
                            }
                        },
                        None => raw,
                    };
                    if let Some(chan) = net.channel_mut(chan_name) {
                        chan.modes.insert(flag);
                        chan.params.insert(flag, value.clone());
                    }
                    applied.push((true, flag, Some(value)));
                } else {
                    if def.takes_param(false) {
                        let _ = next_param(&mut param_idx);
                    }
                    let had = net
                        .channel_mut(chan_name)
                        .map(|c| {
                            let had = c.modes.remove(&flag);
                            c.params.remove(&flag);
                            had
                        })
                        .unwrap_or(false);
                    if had {
                        let echo = if def.kind == ChanModeKind::ParamBoth {
                            Some("*".to_string())
                        } else {
                            None
                        };
                        applied.push((false, flag, echo));
                    }
                }
            }
            ChanModeKind::Flag => {
                if !from_server && !permitted(net, source, setter_rank, setter_is_oper, &def, chan_name) {
                    continue;
                }
                let changed = net
                    .channel_mut(chan_name)
                    .map(|c| {
                        if set {
                            c.modes.insert(flag)
                        } else {
                            c.modes.remove(&flag)
                        }
                    })
                    .unwrap_or(false);
                if changed {
                    applied.push((set, flag, None));
                }
            }
        }
    }

    if applied.is_empty() {
        return;
    }

    let source_mask = net.entity(source).map(|e| e.fullmask()).unwrap_or_default();
    let local_only = net.channel(chan_name).is_some_and(|c| c.is_local_only());
    for (modebuf, parambuf) in group_changes(&applied, net.conf.limits.max_modes_per_line) {
        let tail = if parambuf.is_empty() {
            String::new()
        } else {
            format!(" {}", parambuf.join(" "))
        };
        let line = format!(":{} MODE {} {}{}", source_mask, chan_name, modebuf, tail);
        net.broadcast_to_channel(chan_name, None, None, &[], &line);
        if !local_only {
            let line = format!(":{} MODE {} {}{}", source, chan_name, modebuf, tail);
            net.send_to_servers(Some(source), &[], &line);
        }
    }
}

/// Non-member mode permission gate for local setters.
fn permitted(
    net: &mut Network,
    source: &str,
    setter_rank: u8,
    setter_is_oper: bool,
    def: &crate::modes::ChannelModeDef,
    chan_name: &str,
) -> bool {
    if def.server_only {
        return false;
    }
    if def.oper_only && !setter_is_oper {
        net.send_numeric(source, Numeric::ERR_NOPRIVILEGES, &[]);
        return false;
    }
    if setter_rank < def.needs_rank && !setter_is_oper {
        net.send_numeric(source, Numeric::ERR_CHANOPRIVSNEEDED, &[chan_name]);
        return false;
    }
    true
}

/// Group applied changes into wire lines of at most `limit` changes.
fn group_changes(applied: &[Change], limit: usize) -> Vec<(String, Vec<String>)> {
    let mut lines = Vec::new();
    for chunk in applied.chunks(limit.max(1)) {
        let mut modebuf = String::new();
        let mut parambuf = Vec::new();
        let mut sign: Option<bool> = None;
        for (set, flag, param) in chunk {
            if sign != Some(*set) {
                modebuf.push(if *set { '+' } else { '-' });
                sign = Some(*set);
            }
            modebuf.push(*flag);
            if let Some(p) = param {
                parambuf.push(p.clone());
            }
        }
        lines.push((modebuf, parambuf));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouping_respects_sign_runs_and_limit() {
        let applied: Vec<Change> = vec![
            (true, 'n', None),
            (true, 't', None),
            (false, 's', None),
            (true, 'l', Some("10".to_string())),
        ];
        let lines = group_changes(&applied, 12);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, "+nt-s+l");
        assert_eq!(lines[0].1, vec!["10"]);

        let lines = group_changes(&applied, 2);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, "+nt");
        assert_eq!(lines[1].0, "-s+l");
    }
}
