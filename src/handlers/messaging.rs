//! PRIVMSG, NOTICE and TAGMSG delivery.

use crate::engine::dispatch::CmdCtx;
use crate::error::HandlerResult;
use crate::hooks::{HookArgs, HookKind, HookVerdict};
use crate::state::network::Network;
use rand::Rng;
use weft_proto::{Numeric, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MsgKind {
    Privmsg,
    Notice,
    Tagmsg,
}

impl MsgKind {
    fn verb(self) -> &'static str {
        match self {
            MsgKind::Privmsg => "PRIVMSG",
            MsgKind::Notice => "NOTICE",
            MsgKind::Tagmsg => "TAGMSG",
        }
    }

    /// NOTICE never generates error replies.
    fn reports_errors(self) -> bool {
        self == MsgKind::Privmsg
    }
}

pub fn h_privmsg(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    deliver(net, ctx, MsgKind::Privmsg)
}

pub fn h_notice(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    deliver(net, ctx, MsgKind::Notice)
}

pub fn h_tagmsg(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    deliver(net, ctx, MsgKind::Tagmsg)
}

/// A fresh message id for tagging.
fn new_msgid() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..16)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

fn server_time_now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn deliver(net: &mut Network, ctx: &CmdCtx, kind: MsgKind) -> HandlerResult {
    let target = ctx.param(0).to_string();
    let text = if kind == MsgKind::Tagmsg { String::new() } else { ctx.param(1).to_string() };

    if target.is_empty() {
        if kind.reports_errors() {
            net.send_numeric(&ctx.client, Numeric::ERR_NORECIPIENT, &[]);
        }
        return Ok(());
    }
    if text.is_empty() && kind != MsgKind::Tagmsg {
        if kind.reports_errors() {
            net.send_numeric(&ctx.client, Numeric::ERR_NOTEXTTOSEND, &[]);
        }
        return Ok(());
    }

    // Activity resets the idle clock.
    let now = net.now();
    if let Some(e) = net.entity_mut(&ctx.client) {
        e.idle_since = now;
    }
    if let Some(conn_id) = ctx.conn {
        net.add_penalty(conn_id, 5_000);
    }

    // Attach the generated tags plus surviving client-only tags.
    let time_value = server_time_now();
    let msgid_value = new_msgid();
    let mut tags: Vec<Tag> = vec![
        Tag::new("time", Some(time_value.as_str())),
        Tag::new("msgid", Some(msgid_value.as_str())),
    ];
    tags.extend(ctx.tags.iter().filter(|t| t.is_client_only()).cloned());

    if target.starts_with(['#', '&', '+']) {
        deliver_to_channel(net, ctx, kind, &target, &text, &tags)
    } else {
        deliver_to_user(net, ctx, kind, &target, &text, &tags)
    }
}

fn deliver_to_channel(
    net: &mut Network,
    ctx: &CmdCtx,
    kind: MsgKind,
    target: &str,
    text: &str,
    tags: &[Tag],
) -> HandlerResult {
    if net.channel(target).is_none() {
        if kind.reports_errors() {
            net.send_numeric(&ctx.client, Numeric::ERR_NOSUCHCHANNEL, &[target]);
        }
        return Ok(());
    }

    if !ctx.from_server() {
        let args = HookArgs {
            client: Some(&ctx.client),
            channel: Some(target),
            text: Some(text),
            ..Default::default()
        };
        match net.run_hook(HookKind::PreLocalChanmsg, &args) {
            HookVerdict::Reject(_) | HookVerdict::Deny => {
                if kind.reports_errors() {
                    net.send_numeric(
                        &ctx.client,
                        Numeric::ERR_CANNOTSENDTOCHAN,
                        &[target, "You cannot send messages to this channel"],
                    );
                }
                return Ok(());
            }
            _ => {}
        }
    }

    let source_mask = net.entity(&ctx.client).map(|e| e.fullmask()).unwrap_or_default();
    let line = if kind == MsgKind::Tagmsg {
        format!(":{} TAGMSG {}", source_mask, target)
    } else {
        format!(":{} {} {} :{}", source_mask, kind.verb(), target, text)
    };
    net.broadcast_to_channel(target, Some(&ctx.client), Some(&ctx.client), tags, &line);

    let local_only = net.channel(target).is_some_and(|c| c.is_local_only());
    if !local_only {
        let s2s = if kind == MsgKind::Tagmsg {
            format!(":{} TAGMSG {}", ctx.client, target)
        } else {
            format!(":{} {} {} :{}", ctx.client, kind.verb(), target, text)
        };
        net.send_to_servers(Some(&ctx.client), tags, &s2s);
    }
    Ok(())
}

fn deliver_to_user(
    net: &mut Network,
    ctx: &CmdCtx,
    kind: MsgKind,
    target: &str,
    text: &str,
    tags: &[Tag],
) -> HandlerResult {
    let Some(target_id) = net.resolve_user(target) else {
        if kind.reports_errors() {
            net.send_numeric(&ctx.client, Numeric::ERR_NOSUCHNICK, &[target]);
        }
        return Ok(());
    };

    if kind == MsgKind::Privmsg && !ctx.from_server() {
        let away = net
            .entity(&target_id)
            .and_then(|e| e.user())
            .and_then(|u| u.away.clone());
        if let Some(away) = away {
            let name = net.entity(&target_id).map(|e| e.name.clone()).unwrap_or_default();
            net.send_numeric(&ctx.client, Numeric::RPL_AWAY, &[&name, &away]);
        }
    }

    if net.is_local(&target_id) {
        let source_mask = net.entity(&ctx.client).map(|e| e.fullmask()).unwrap_or_default();
        let target_name = net.entity(&target_id).map(|e| e.name.clone()).unwrap_or_default();
        let line = if kind == MsgKind::Tagmsg {
            format!(":{} TAGMSG {}", source_mask, target_name)
        } else {
            format!(":{} {} {} :{}", source_mask, kind.verb(), target_name, text)
        };
        net.send_to_entity(&target_id, tags, &line);
    } else {
        // Each hop keeps the stable-id source prefix.
        let line = if kind == MsgKind::Tagmsg {
            format!(":{} TAGMSG {}", ctx.client, target_id)
        } else {
            format!(":{} {} {} :{}", ctx.client, kind.verb(), target_id, text)
        };
        net.send_to_one_server(&target_id, tags, &line);
    }
    Ok(())
}
