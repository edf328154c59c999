//! Registration completion: host assignment, allow-block classing and the
//! welcome burst.

use crate::hooks::{HookArgs, HookKind, HookVerdict};
use crate::state::entity::{EntityKind, UserInfo};
use crate::state::network::Network;
use weft_proto::{wildcard_match, Numeric};

/// Attempt to promote an unregistered local client to a full user.
///
/// Called whenever a precondition may have been satisfied: NICK, USER,
/// the nospoof PONG, CAP END and delay expiry. Does nothing until every
/// gate is clear.
pub fn try_register(net: &mut Network, id: &str) {
    let Some(entity) = net.entity(id) else { return };
    if entity.flags.registered || !matches!(entity.kind, EntityKind::Unregistered) {
        return;
    }
    if entity.name == "*" {
        return;
    }
    let Some(conn_id) = entity.conn else { return };
    {
        let Some(conn) = net.conns.get(&conn_id) else { return };
        if conn.pending_ident.is_none() || conn.nospoof.is_some() || conn.cap_negotiating {
            return;
        }
    }

    // Extensions may hold registration open (ident, TLS material, ...).
    if net.has_delays(id) {
        return;
    }
    let args = HookArgs { client: Some(id), ..Default::default() };
    net.run_hook(HookKind::IsHandshakeFinished, &args);
    if net.has_delays(id) {
        return;
    }

    assign_host(net, id, conn_id);

    // Server bans apply the moment the identity is known.
    if let Some(tkl) = net.tkl_find("KGZz", id) {
        let what = crate::security::tkl::flag_def(tkl.flag)
            .map(|d| d.name)
            .unwrap_or("banned");
        net.server_notice(id, &format!("You are banned: {}", tkl.reason));
        net.exit_client(id, &format!("{} ({})", what, tkl.reason));
        return;
    }

    if !assign_class(net, id, conn_id) {
        return;
    }

    welcome_user(net, id, conn_id);
}

/// Fill in the user record: ident, hosts and the computed cloak.
fn assign_host(net: &mut Network, id: &str, conn_id: u64) {
    let (ip, ident, gecos) = {
        let Some(conn) = net.conns.get(&conn_id) else { return };
        (
            conn.ip.clone(),
            conn.pending_ident.clone().unwrap_or_default(),
            conn.pending_gecos.clone().unwrap_or_default(),
        )
    };
    let cloak = crate::security::cloak::cloak_host(
        &ip,
        &ip,
        &net.conf.security.cloak_key,
        net.conf.security.cloak_prefix.as_deref(),
    );
    let Some(entity) = net.entity_mut(id) else { return };
    entity.info = gecos;
    entity.remember.ident = ident.clone();
    entity.remember.cloakhost = cloak.clone();
    entity.kind = EntityKind::User(UserInfo {
        username: ident,
        realhost: ip,
        cloakhost: cloak,
        ..Default::default()
    });
}

/// Walk the allow blocks in order; the first mask match decides.
/// Returns false when the client was refused (and exited).
fn assign_class(net: &mut Network, id: &str, conn_id: u64) -> bool {
    let (ident, host, ip, tls, pass) = {
        let Some(entity) = net.entity(id) else { return false };
        let Some(user) = entity.user() else { return false };
        let Some(conn) = net.conns.get(&conn_id) else { return false };
        (
            user.username.clone(),
            user.realhost.clone(),
            conn.ip.clone(),
            conn.tls,
            conn.pass.clone(),
        )
    };
    let userhost = format!("{}@{}", ident, host);
    let userip = format!("{}@{}", ident, ip);

    let blocks = net.conf.allow.clone();
    for block in &blocks {
        let matched = block
            .mask
            .iter()
            .any(|m| wildcard_match(m, &userhost) || wildcard_match(m, &userip));
        if !matched {
            continue;
        }
        if block
            .block
            .iter()
            .any(|m| wildcard_match(m, &userhost) || wildcard_match(m, &userip))
        {
            net.exit_client(id, "You are not authorised to connect to this server");
            return false;
        }
        if let Some(required) = &block.password {
            if pass.as_deref() != Some(required.as_str()) {
                if block.reject_on_auth_fail {
                    net.send_numeric(id, Numeric::ERR_PASSWDMISMATCH, &[]);
                    net.exit_client(id, "Password mismatch");
                    return false;
                }
                continue;
            }
        }
        if block.require_tls && !tls {
            continue;
        }
        if let Some(maxperip) = block.maxperip {
            let from_ip = net.conns.values().filter(|c| c.ip == ip).count();
            if from_ip > maxperip {
                net.exit_client(id, "Too many connections from your IP");
                return false;
            }
        }
        let in_class = net
            .conns
            .values()
            .filter(|c| c.class.as_deref() == Some(block.class.as_str()))
            .count();
        let class_max = net.conf.class(&block.class).map(|c| c.max).unwrap_or(usize::MAX);
        if in_class >= class_max {
            net.exit_client(id, "Maximum connections for this class reached");
            return false;
        }
        if let Some(conn) = net.conns.get_mut(&conn_id) {
            conn.class = Some(block.class.clone());
        }
        return true;
    }

    net.exit_client(id, "You are not authorised to connect to this server");
    false
}

/// The welcome burst: numerics 001-005 and 396, LUSERS, MOTD,
/// modes-on-connect, mesh introduction and the LOCAL_CONNECT hook.
fn welcome_user(net: &mut Network, id: &str, conn_id: u64) {
    let args = HookArgs { client: Some(id), ..Default::default() };
    if matches!(
        net.run_hook(HookKind::PreConnect, &args),
        HookVerdict::Deny | HookVerdict::Reject(_)
    ) {
        net.exit_client(id, "Connection closed by server");
        return;
    }

    let now = net.now();
    net.local_user_count += 1;
    net.max_local_users = net.max_local_users.max(net.local_user_count);
    net.global_user_count += 1;
    net.max_global_users = net.max_global_users.max(net.global_user_count);

    if let Some(entity) = net.entity_mut(id) {
        entity.created = now;
        entity.idle_since = now;
        entity.flags.registered = true;
    }
    if let Some(conn) = net.conns.get_mut(&conn_id) {
        conn.signon_at = now;
    }

    let (nick, ident, realhost, cloakhost) = {
        let entity = net.entity(id).expect("registering entity present");
        let user = entity.user().expect("user record present");
        (
            entity.name.clone(),
            user.username.clone(),
            user.realhost.clone(),
            user.cloakhost.clone(),
        )
    };
    let network = net.conf.server.network.clone();
    let me = net.me_name();
    let version = net.version_string();

    net.send_numeric(id, Numeric::RPL_WELCOME, &[&network, &nick, &ident, &realhost]);
    net.send_numeric(id, Numeric::RPL_YOURHOST, &[&me, &version]);
    let boot = chrono::DateTime::from_timestamp(net.boottime, 0).unwrap_or_default();
    net.send_numeric(
        id,
        Numeric::RPL_CREATED,
        &[
            &boot.format("%a %b %d %Y").to_string(),
            &boot.format("%H:%M:%S UTC").to_string(),
        ],
    );
    let umodes = net.modes.usermodes_str();
    let chmodes = net.modes.chanmodes_str();
    net.send_numeric(id, Numeric::RPL_MYINFO, &[&me, &version, &umodes, &chmodes]);

    // ISUPPORT in packets of at most fifteen tokens.
    let tokens = crate::modes::isupport_tokens(&net.conf, &net.modes);
    for chunk in tokens.chunks(15) {
        net.send_numeric(id, Numeric::RPL_ISUPPORT, &[&chunk.join(" ")]);
    }
    net.send_numeric(id, Numeric::RPL_HOSTHIDDEN, &[&cloakhost]);

    crate::handlers::query::send_lusers(net, id);
    crate::handlers::query::send_motd(net, id);

    // Configured connect modes, plus the TLS marker.
    let mut applied = String::new();
    let connect_modes = net.conf.server.modes_on_connect.clone();
    let tls = net.conns.get(&conn_id).is_some_and(|c| c.tls);
    {
        let modes = &net.modes;
        let Some(user) = net.entities.get_mut(id).and_then(|e| e.user_mut()) else {
            return;
        };
        for flag in connect_modes.chars() {
            if modes.user_def(flag).is_some() && user.modes.insert(flag) {
                applied.push(flag);
            }
        }
        if tls && user.modes.insert('z') {
            applied.push('z');
        }
    }
    if !applied.is_empty() {
        let line = format!(":{} MODE {} :+{}", nick, nick, applied);
        net.send_to_entity(id, &[], &line);
    }

    net.sync_user(id, None);

    net.send_snomask(
        None,
        'c',
        &format!("Client connecting: {} ({}@{}) [{}]", nick, ident, realhost, cloakhost),
        false,
    );
    let args = HookArgs { client: Some(id), ..Default::default() };
    net.run_hook(HookKind::LocalConnect, &args);
}
