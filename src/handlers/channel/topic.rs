//! TOPIC: query, set, and burst-time merge.

use crate::engine::dispatch::CmdCtx;
use crate::error::HandlerResult;
use crate::state::network::Network;
use weft_proto::Numeric;

/// 331 or 332+333 for one channel.
pub fn send_topic_numerics(net: &mut Network, client: &str, chan_name: &str) {
    let Some(chan) = net.channel(chan_name) else { return };
    if chan.topic.is_empty() {
        net.send_numeric(client, Numeric::RPL_NOTOPIC, &[chan_name]);
        return;
    }
    let (topic, author, time) = (chan.topic.clone(), chan.topic_author.clone(), chan.topic_time);
    net.send_numeric(client, Numeric::RPL_TOPIC, &[chan_name, &topic]);
    net.send_numeric(
        client,
        Numeric::RPL_TOPICWHOTIME,
        &[chan_name, &author, &time.to_string()],
    );
}

pub fn h_topic(net: &mut Network, ctx: &CmdCtx) -> HandlerResult {
    let chan_name = ctx.param(0).to_string();
    let Some(chan) = net.channel(&chan_name) else {
        net.send_numeric(&ctx.client, Numeric::ERR_NOSUCHCHANNEL, &[&chan_name]);
        return Ok(());
    };

    // Query form.
    if ctx.params.len() == 1 {
        if !chan.has_member(&ctx.client) && chan.modes.contains(&'s') {
            net.send_numeric(&ctx.client, Numeric::ERR_NOTONCHANNEL, &[&chan_name]);
            return Ok(());
        }
        send_topic_numerics(net, &ctx.client.clone(), &chan_name);
        return Ok(());
    }

    // Burst form carries the original author and set time.
    let (author, set_time, text) = if ctx.from_server() && ctx.params.len() >= 4 {
        (
            ctx.param(1).to_string(),
            ctx.param(2).parse::<i64>().unwrap_or_else(|_| net.now()),
            ctx.param(3).to_string(),
        )
    } else {
        let author = net.entity(&ctx.client).map(|e| e.fullmask()).unwrap_or_default();
        (author, net.now(), ctx.param(1).to_string())
    };

    if !ctx.from_server() {
        if !chan.has_member(&ctx.client) {
            net.send_numeric(&ctx.client, Numeric::ERR_NOTONCHANNEL, &[&chan_name]);
            return Ok(());
        }
        if chan.modes.contains(&'t') {
            let rank = chan
                .members
                .get(&ctx.client)
                .map(|m| net.modes.member_rank(&m.status))
                .unwrap_or(0);
            if rank < 30 {
                net.send_numeric(&ctx.client, Numeric::ERR_CHANOPRIVSNEEDED, &[&chan_name]);
                return Ok(());
            }
        }
    } else {
        // Latest topic wins on a burst collision.
        if chan.topic_time > set_time {
            return Ok(());
        }
    }

    let mut text = text;
    text.truncate(net.conf.limits.topic_len);
    if let Some(chan) = net.channel_mut(&chan_name) {
        chan.topic = text.clone();
        chan.topic_author = author.clone();
        chan.topic_time = set_time;
    }

    let source_mask = net.entity(&ctx.client).map(|e| e.fullmask()).unwrap_or_default();
    let line = format!(":{} TOPIC {} :{}", source_mask, chan_name, text);
    net.broadcast_to_channel(&chan_name, None, None, &[], &line);

    let local_only = net.channel(&chan_name).is_some_and(|c| c.is_local_only());
    if !local_only {
        let s2s = format!(
            ":{} TOPIC {} {} {} :{}",
            ctx.client, chan_name, author, set_time, text
        );
        net.send_to_servers(Some(&ctx.client), &[], &s2s);
    }
    Ok(())
}
