//! Mesh plumbing: SENDSNO, SLOG and relayed BATCH frames.

use crate::engine::dispatch::CmdCtx;
use crate::error::HandlerResult;
use crate::state::network::Network;
use tracing::info;

/// `:<sid> SENDSNO <flag> :<text>` - a remote server notice for local
/// operators holding the flag, relayed onward.
pub fn h_sendsno(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let flag = ctx.param(0).chars().next().unwrap_or(' ');
    let text = ctx.param(1).to_string();

    let recipients: Vec<String> = net
        .entities
        .values()
        .filter(|e| {
            e.is_local()
                && e.user()
                    .is_some_and(|u| u.modes.contains(&'s') && u.snomask.contains(flag))
        })
        .map(|e| e.id.clone())
        .collect();
    for id in recipients {
        net.server_notice(&id, &text);
    }

    let line = format!(":{} SENDSNO {} :{}", ctx.client, flag, text);
    net.send_to_servers(Some(&ctx.direction), &[], &line);
    Ok(())
}

/// `:<source> SLOG <level> <subsystem> <event> :<line>` - remote log
/// records surface in the local log and the `s` snomask.
pub fn h_slog(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let level = ctx.param(0).to_string();
    let subsystem = ctx.param(1).to_string();
    let event = ctx.param(2).to_string();
    let text = ctx.param(3).to_string();
    let origin = net
        .entity(&ctx.client)
        .map(|e| e.name.clone())
        .unwrap_or_else(|| ctx.client.clone());

    info!(origin = %origin, level = %level, subsystem = %subsystem, event = %event, "{}", text);
    net.send_snomask(
        None,
        's',
        &format!("[{}] {}.{}: {}", origin, subsystem, event, text),
        false,
    );

    let line = format!(":{} SLOG {} {} {} :{}", ctx.client, level, subsystem, event, text);
    net.send_to_servers(Some(&ctx.direction), &[], &line);
    Ok(())
}

/// Relayed batch frames keep flowing outward; the local re-wrapping of
/// netjoin/netsplit happens where those events are synthesised.
pub fn h_batch(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let line = format!(":{} BATCH {}", ctx.client, ctx.params.join(" "));
    net.send_to_servers(Some(&ctx.direction), &[], &line);
    Ok(())
}
