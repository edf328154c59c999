//! Informational queries: LUSERS, MOTD, LIST, WHO, WHOIS.

use crate::engine::dispatch::CmdCtx;
use crate::error::HandlerResult;
use crate::state::network::Network;
use weft_proto::Numeric;

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

pub fn h_lusers(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    send_lusers(net, &ctx.client.clone());
    Ok(())
}

/// The 251-255 and 265/266 block.
pub fn send_lusers(net: &mut Network, client: &str) {
    let users = net.global_user_count as usize;
    let invisible = net
        .entities
        .values()
        .filter(|e| e.user().is_some_and(|u| u.modes.contains(&'i')))
        .count();
    let visible = users.saturating_sub(invisible);
    let opers = net.entities.values().filter(|e| e.is_oper()).count();
    let unknown = net
        .entities
        .values()
        .filter(|e| e.is_local() && !e.flags.registered && !e.is_server())
        .count();
    let channels = net.channels.len();
    let servers = net.entities.values().filter(|e| e.is_server()).count();
    let local = net.local_user_count as usize;
    let local_servers = net.local_servers().len();

    net.send_numeric(
        client,
        Numeric::RPL_LUSERCLIENT,
        &[
            if visible == 1 { "is" } else { "are" },
            &visible.to_string(),
            plural(visible),
            &invisible.to_string(),
            &servers.to_string(),
            plural(servers),
        ],
    );
    if opers > 0 {
        net.send_numeric(
            client,
            Numeric::RPL_LUSEROP,
            &[&opers.to_string(), plural(opers)],
        );
    }
    if unknown > 0 {
        net.send_numeric(
            client,
            Numeric::RPL_LUSERUNKNOWN,
            &[&unknown.to_string(), plural(unknown)],
        );
    }
    if channels > 0 {
        net.send_numeric(
            client,
            Numeric::RPL_LUSERCHANNELS,
            &[&channels.to_string(), plural(channels)],
        );
    }
    net.send_numeric(
        client,
        Numeric::RPL_LUSERME,
        &[
            &local.to_string(),
            plural(local),
            &local_servers.to_string(),
            plural(local_servers),
        ],
    );
    net.send_numeric(
        client,
        Numeric::RPL_LOCALUSERS,
        &[
            &local.to_string(),
            plural(local),
            &net.max_local_users.to_string(),
        ],
    );
    net.send_numeric(
        client,
        Numeric::RPL_GLOBALUSERS,
        &[
            &users.to_string(),
            plural(users),
            &net.max_global_users.to_string(),
        ],
    );
}

pub fn h_motd(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    send_motd(net, &ctx.client.clone());
    Ok(())
}

pub fn send_motd(net: &mut Network, client: &str) {
    if net.motd.is_empty() {
        net.send_numeric(client, Numeric::ERR_NOMOTD, &[]);
        return;
    }
    let me = net.me_name();
    net.send_numeric(client, Numeric::RPL_MOTDSTART, &[&me]);
    for line in net.motd.clone() {
        net.send_numeric(client, Numeric::RPL_MOTD, &[&line]);
    }
    net.send_numeric(client, Numeric::RPL_ENDOFMOTD, &[]);
}

pub fn h_list(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    if let Some(conn_id) = ctx.conn {
        net.add_penalty(conn_id, 25_000);
        // LIST is throttled: follow-up lines wait, operators excepted.
        let now = net.now();
        if let Some(conn) = net.conns.get_mut(&conn_id) {
            conn.delay_next(now, 2);
        }
    }
    net.send_numeric(&ctx.client, Numeric::RPL_LISTSTART, &[]);
    let names: Vec<String> = net.channels.values().map(|c| c.name.clone()).collect();
    for name in names {
        let Some(chan) = net.channel(&name) else { continue };
        // Secret channels only list for their members.
        if chan.modes.contains(&'s') && !chan.has_member(&ctx.client) {
            continue;
        }
        let count = chan.member_count().to_string();
        let flags: String = chan.modes.iter().collect();
        let modes = if flags.is_empty() {
            String::new()
        } else {
            format!("[+{}]", flags)
        };
        let topic = chan.topic.clone();
        net.send_numeric(&ctx.client, Numeric::RPL_LIST, &[&name, &count, &modes, &topic]);
    }
    net.send_numeric(&ctx.client, Numeric::RPL_LISTEND, &[]);
    Ok(())
}

pub fn h_who(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let mask = ctx.param(0).to_string();
    if let Some(conn_id) = ctx.conn {
        net.add_penalty(conn_id, 25_000);
    }
    if mask.starts_with(['#', '&', '+']) {
        let members: Vec<String> = net
            .channel(&mask)
            .map(|c| c.members.keys().cloned().collect())
            .unwrap_or_default();
        for member in members {
            if !net.user_can_see_member(&ctx.client.clone(), &member, &mask) {
                continue;
            }
            send_who_reply(net, &ctx.client.clone(), &mask, &member);
        }
    } else if let Some(target) = net.resolve_user(&mask) {
        send_who_reply(net, &ctx.client.clone(), "*", &target);
    }
    net.send_numeric(&ctx.client, Numeric::RPL_ENDOFWHO, &[&mask]);
    Ok(())
}

fn send_who_reply(net: &mut Network, client: &str, chan_name: &str, target: &str) {
    let Some(entity) = net.entity(target) else { return };
    let Some(user) = entity.user() else { return };
    let server_name = net
        .entity(&entity.uplink)
        .map(|e| e.name.clone())
        .unwrap_or_else(|| net.me_name());
    let mut flags = if user.away.is_some() { "G".to_string() } else { "H".to_string() };
    if user.is_oper() {
        flags.push('*');
    }
    if let Some(sigil) = net
        .channel(chan_name)
        .and_then(|c| c.members.get(target))
        .and_then(|m| {
            m.status
                .iter()
                .max_by_key(|&&f| net.modes.rank_of(f))
                .and_then(|&f| net.modes.prefix_of(f))
        })
    {
        flags.push(sigil);
    }
    let args = [
        chan_name.to_string(),
        user.username.clone(),
        user.visible_host().to_string(),
        server_name,
        entity.name.clone(),
        flags,
        entity.hops.to_string(),
        entity.info.clone(),
    ];
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    net.send_numeric(client, Numeric::RPL_WHOREPLY, &arg_refs);
}

pub fn h_whois(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let token = ctx.param(0).to_string();
    let Some(target) = net.resolve_user(&token) else {
        net.send_numeric(&ctx.client, Numeric::ERR_NOSUCHNICK, &[&token]);
        return Ok(());
    };
    if let Some(conn_id) = ctx.conn {
        net.add_penalty(conn_id, 25_000);
    }

    let (nick, username, visible_host, realhost, info, account, modes, operclass, away, swhois, uplink, created, idle_since, is_local, secure) = {
        let Some(entity) = net.entity(&target) else { return Ok(()) };
        let Some(user) = entity.user() else { return Ok(()) };
        (
            entity.name.clone(),
            user.username.clone(),
            user.visible_host().to_string(),
            user.realhost.clone(),
            entity.info.clone(),
            user.account.clone(),
            user.mode_string(),
            user.operclass.clone(),
            user.away.clone(),
            user.swhois.clone(),
            entity.uplink.clone(),
            entity.created,
            entity.idle_since,
            entity.is_local(),
            user.modes.contains(&'z'),
        )
    };
    let client = ctx.client.clone();
    let asking_self = client == target;
    let asker_is_oper = net.entity(&client).is_some_and(|e| e.is_oper());

    net.send_numeric(
        &client,
        Numeric::RPL_WHOISUSER,
        &[&nick, &username, &visible_host, &info],
    );

    // Shared or non-secret channels, sigil-prefixed.
    let mut chans = Vec::new();
    for chan in net.channels.values() {
        if !chan.has_member(&target) {
            continue;
        }
        if chan.modes.contains(&'s') && !chan.has_member(&client) && !asker_is_oper {
            continue;
        }
        let sigil = chan
            .members
            .get(&target)
            .and_then(|m| {
                m.status
                    .iter()
                    .max_by_key(|&&f| net.modes.rank_of(f))
                    .and_then(|&f| net.modes.prefix_of(f))
            })
            .map(|c| c.to_string())
            .unwrap_or_default();
        chans.push(format!("{}{}", sigil, chan.name));
    }
    if !chans.is_empty() {
        net.send_numeric(&client, Numeric::RPL_WHOISCHANNELS, &[&nick, &chans.join(" ")]);
    }

    let server_name = net
        .entity(&uplink)
        .map(|e| e.name.clone())
        .unwrap_or_else(|| net.me_name());
    let server_info = net.entity(&uplink).map(|e| e.info.clone()).unwrap_or_default();
    net.send_numeric(
        &client,
        Numeric::RPL_WHOISSERVER,
        &[&nick, &server_name, &server_info],
    );

    if account != "*" {
        net.send_numeric(&client, Numeric::RPL_WHOISREGNICK, &[&nick]);
    }
    if let Some(operclass) = &operclass {
        net.send_numeric(
            &client,
            Numeric::RPL_WHOISOPERATOR,
            &[&nick, "an IRC Operator, class ", operclass],
        );
    }
    for entry in &swhois {
        net.send_numeric(&client, Numeric::RPL_WHOISSPECIAL, &[&nick, &entry.line]);
    }
    if secure {
        net.send_numeric(&client, Numeric::RPL_WHOISSECURE, &[&nick]);
    }
    if asking_self || asker_is_oper {
        net.send_numeric(
            &client,
            Numeric::RPL_WHOISHOST,
            &[&nick, &username, &realhost, &realhost],
        );
        net.send_numeric(
            &client,
            Numeric::RPL_WHOISMODES,
            &[&nick, modes.trim_start_matches('+'), ""],
        );
    }
    if let Some(away) = &away {
        net.send_numeric(&client, Numeric::RPL_AWAY, &[&nick, away]);
    }
    if is_local {
        let now = net.now();
        net.send_numeric(
            &client,
            Numeric::RPL_WHOISIDLE,
            &[&nick, &(now - idle_since).to_string(), &created.to_string()],
        );
    }
    net.send_numeric(&client, Numeric::RPL_ENDOFWHOIS, &[&nick]);
    Ok(())
}
