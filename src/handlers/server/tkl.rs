//! TKL: add and remove server bans, locally or from the mesh.

use crate::engine::dispatch::CmdCtx;
use crate::error::HandlerResult;
use crate::security::tkl::{ext_ident, flag_def, Tkl};
use crate::state::network::Network;
use tracing::warn;

/// `TKL + <flag> <ident> <host> <set_by> <expire> <set_time> :[types:]<reason>`
/// `TKL - <flag> <ident> <host>`
///
/// Operators use the same grammar with the bookkeeping fields filled in
/// by this server.
pub fn h_tkl(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let sign = ctx.param(0).to_string();
    let flag = ctx.param(1).chars().next().unwrap_or(' ');
    let Some(def) = flag_def(flag) else {
        warn!(flag = %ctx.param(1), from = %ctx.client, "attempted to add non-existing TKL type");
        return Ok(());
    };

    let ident = ext_ident(ctx.param(2))
        .map(str::to_string)
        .unwrap_or_else(|| ctx.param(2).to_string());
    let host = ctx.param(3).to_string();

    match sign.as_str() {
        "+" => {
            let now = net.now();
            let from_server = ctx.from_server();
            let (set_by, expire, set_time, raw_reason) = if from_server && ctx.params.len() >= 8 {
                (
                    ctx.param(4).to_string(),
                    ctx.param(5).parse().unwrap_or(0),
                    ctx.param(6).parse().unwrap_or(now),
                    ctx.param(7).to_string(),
                )
            } else {
                let set_by = net.entity(&ctx.client).map(|e| e.fullmask()).unwrap_or_default();
                let expire = ctx.param(4).parse::<i64>().map(|d| if d == 0 { 0 } else { now + d }).unwrap_or(0);
                let reason = ctx.params.last().cloned().unwrap_or_default();
                (set_by, expire, now, reason)
            };

            // Exception entries carry their covered types glued to the
            // reason: "GZ:trusted host".
            let (bantypes, reason) = if flag == 'E' {
                match raw_reason.split_once(':') {
                    Some((types, text)) => (types.to_string(), text.to_string()),
                    None => (String::new(), raw_reason),
                }
            } else {
                (String::new(), raw_reason)
            };

            let tkl = Tkl {
                flag,
                ident,
                host,
                bantypes: bantypes.clone(),
                expire,
                set_by: set_by.clone(),
                set_time,
                reason: reason.clone(),
            };
            let mask = tkl.mask();
            let fresh = net.tkl.add(tkl);
            if fresh {
                let duration = if expire == 0 {
                    "permanent".to_string()
                } else {
                    format!("expires in {}s", expire - now)
                };
                net.send_snomask(
                    None,
                    't',
                    &format!("{} added for {} by {} ({}) [{}]", def.name, mask, set_by, reason, duration),
                    !def.is_global,
                );
            }

            if def.is_global {
                let tail = if flag == 'E' {
                    format!("{}:{}", bantypes, reason)
                } else {
                    reason.clone()
                };
                let line = format!(
                    ":{} TKL + {} {} {} {} {} {} :{}",
                    ctx.client,
                    flag,
                    ctx.param(2),
                    ctx.param(3),
                    set_by,
                    expire,
                    set_time,
                    tail
                );
                net.send_to_servers(Some(&ctx.direction), &[], &line);
            }

            enforce_tkl(net, flag);
        }
        "-" => {
            let Some(removed) = net.tkl.remove(flag, &ident, &host) else {
                return Ok(());
            };
            let remover = net.entity(&ctx.client).map(|e| e.fullmask()).unwrap_or_default();
            net.send_snomask(
                None,
                't',
                &format!("{} removed for {} by {}", def.name, removed.mask(), remover),
                !def.is_global,
            );
            if def.is_global {
                let line = format!(":{} TKL - {} {} {}", ctx.client, flag, ctx.param(2), ctx.param(3));
                net.send_to_servers(Some(&ctx.direction), &[], &line);
            }
            if flag == 's' {
                refresh_shuns(net);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Apply a freshly added ban to everyone already connected.
fn enforce_tkl(net: &mut Network, flag: char) {
    match flag {
        'K' | 'G' | 'Z' | 'z' => {
            let local_users: Vec<String> = net
                .entities
                .values()
                .filter(|e| e.is_local() && e.is_user() && e.flags.registered)
                .map(|e| e.id.clone())
                .collect();
            for id in local_users {
                if let Some(hit) = net.tkl_find(&flag.to_string(), &id) {
                    let what = flag_def(flag).map(|d| d.name).unwrap_or("banned");
                    net.server_notice(&id, &format!("You are banned: {}", hit.reason));
                    net.exit_client(&id, &format!("{} ({})", what, hit.reason));
                }
            }
        }
        's' => refresh_shuns(net),
        _ => {}
    }
}

/// Recompute the shunned flag across local users.
fn refresh_shuns(net: &mut Network) {
    let local_users: Vec<String> = net
        .entities
        .values()
        .filter(|e| e.is_local() && e.is_user())
        .map(|e| e.id.clone())
        .collect();
    for id in local_users {
        let shunned = net.tkl_find("s", &id).is_some();
        if let Some(entity) = net.entity_mut(&id) {
            entity.flags.shunned = shunned;
        }
    }
}
