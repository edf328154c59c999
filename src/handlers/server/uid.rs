//! UID: a remote user introduced during or after a burst.

use crate::engine::dispatch::CmdCtx;
use crate::error::HandlerResult;
use crate::state::entity::{Entity, EntityFlags, EntityKind, UserInfo};
use crate::state::network::Network;
use tracing::{debug, warn};
use weft_proto::to_irc_lower;

/// `:<uplink> UID <nick> <hops> <ts> <ident> <realhost> <uid> <account>
/// +<modes> <cloak> <vhost> <b64ip-or-host> :<gecos>`
pub fn h_uid(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let nick = ctx.param(0).to_string();
    let hops: u32 = ctx.param(1).parse().unwrap_or(1);
    let ts: i64 = ctx.param(2).parse().unwrap_or_else(|_| net.now());
    let ident = ctx.param(3).to_string();
    let realhost = ctx.param(4).to_string();
    let uid = ctx.param(5).to_string();
    let account = ctx.param(6).to_string();
    let modes = ctx.param(7).to_string();
    let cloak = ctx.param(8).to_string();
    let gecos = ctx.param(11).to_string();

    if net.entities.contains_key(&uid) {
        warn!(uid = %uid, "duplicate UID introduction ignored");
        return Ok(());
    }

    // Nick collision: the older signon survives.
    if let Some(existing) = net.find_user_by_nick(&nick) {
        let existing_ts = net.entity(&existing).map(|e| e.created).unwrap_or(0);
        if existing_ts <= ts {
            debug!(nick = %nick, "collision, rejecting newer remote user");
            let line = format!(":{} KILL {} :Nick collision", net.me, uid);
            net.send_to_one_server(&ctx.direction, &[], &line);
            return Ok(());
        }
        debug!(nick = %nick, "collision, removing newer local user");
        if let Some(e) = net.entity_mut(&existing) {
            e.flags.killed = true;
        }
        net.exit_client(&existing, "Nick collision");
    }

    let mut user = UserInfo {
        account,
        username: ident.clone(),
        realhost: realhost.clone(),
        cloakhost: cloak,
        ..Default::default()
    };
    for flag in modes.trim_start_matches('+').chars() {
        if net.modes.user_def(flag).is_some() {
            user.modes.insert(flag);
        }
    }

    let entity = Entity {
        id: uid.clone(),
        name: nick.clone(),
        hops,
        created: ts,
        idle_since: ts,
        uplink: ctx.client.clone(),
        direction: ctx.direction.clone(),
        conn: None,
        info: gecos.clone(),
        flags: EntityFlags {
            registered: true,
            handshake_finished: true,
            ..Default::default()
        },
        kind: EntityKind::User(user),
        moddata: Default::default(),
        recv_mtags: Vec::new(),
        send_mtags: Vec::new(),
        remember: Default::default(),
    };
    net.entities.insert(uid.clone(), entity);
    net.nicks.insert(to_irc_lower(&nick), uid.clone());
    net.global_user_count += 1;
    net.max_global_users = net.max_global_users.max(net.global_user_count);
    debug!(uid = %uid, nick = %nick, via = %ctx.direction, "remote user introduced");

    // Relay onward, one hop further out.
    let line = format!(
        ":{} UID {} {} {} {} {} {} {} {} {} {} {} :{}",
        ctx.client,
        nick,
        hops + 1,
        ts,
        ident,
        realhost,
        uid,
        ctx.param(6),
        modes,
        ctx.param(8),
        ctx.param(9),
        ctx.param(10),
        gecos
    );
    net.send_to_servers(Some(&ctx.direction), &[], &line);
    Ok(())
}
