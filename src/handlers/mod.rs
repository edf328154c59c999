//! Command handlers.
//!
//! One module per concern; [`register_all`] wires every handler into the
//! command table and registers the built-in join/message guards on the
//! hook bus.

pub mod attrs;
pub mod channel;
pub mod connection;
pub mod messaging;
pub mod mode;
pub mod oper;
pub mod query;
pub mod server;
pub mod welcome;

use crate::engine::dispatch::{CmdFlags, CommandDef, CommandTable};
use crate::hooks::HookBus;

/// Register every built-in command and hook.
pub fn register_all(commands: &mut CommandTable, hooks: &mut HookBus) {
    let defs: &[CommandDef] = &[
        // Link and liveness.
        CommandDef { name: "PASS", paramcount: 1, flags: CmdFlags::UNREGISTERED, handler: connection::h_pass },
        CommandDef { name: "PROTOCTL", paramcount: 1, flags: CmdFlags::UNREGISTERED, handler: server::link::h_protoctl },
        CommandDef { name: "SERVER", paramcount: 2, flags: CmdFlags::PRE_REG_OR_SERVER, handler: server::link::h_server },
        CommandDef { name: "SID", paramcount: 4, flags: CmdFlags::SERVER, handler: server::link::h_sid },
        CommandDef { name: "EOS", paramcount: 0, flags: CmdFlags::SERVER, handler: server::link::h_eos },
        CommandDef { name: "PING", paramcount: 1, flags: CmdFlags::ANY_DIRECTION, handler: connection::h_ping },
        CommandDef { name: "PONG", paramcount: 0, flags: CmdFlags::ANY_DIRECTION, handler: connection::h_pong },
        CommandDef { name: "ERROR", paramcount: 1, flags: CmdFlags::PRE_REG_OR_SERVER, handler: connection::h_error },

        // User lifecycle and attributes.
        CommandDef { name: "NICK", paramcount: 0, flags: CmdFlags::ANY_DIRECTION, handler: connection::h_nick },
        CommandDef { name: "USER", paramcount: 4, flags: CmdFlags::UNREGISTERED, handler: connection::h_user },
        CommandDef { name: "UID", paramcount: 12, flags: CmdFlags::SERVER, handler: server::uid::h_uid },
        CommandDef { name: "QUIT", paramcount: 0, flags: CmdFlags::ANY_DIRECTION, handler: connection::h_quit },
        CommandDef { name: "KILL", paramcount: 2, flags: CmdFlags::OPER_OR_SERVER, handler: oper::h_kill },
        CommandDef { name: "AWAY", paramcount: 0, flags: CmdFlags::USER_OR_SERVER, handler: attrs::h_away },
        CommandDef { name: "MODE", paramcount: 1, flags: CmdFlags::USER_OR_SERVER, handler: mode::h_mode },
        CommandDef { name: "SETHOST", paramcount: 1, flags: CmdFlags::OPER_OR_SERVER, handler: attrs::h_sethost },
        CommandDef { name: "SETIDENT", paramcount: 1, flags: CmdFlags::OPER_OR_SERVER, handler: attrs::h_setident },
        CommandDef { name: "SETNAME", paramcount: 1, flags: CmdFlags::USER_OR_SERVER, handler: attrs::h_setname },
        CommandDef { name: "CHGHOST", paramcount: 2, flags: CmdFlags::OPER_OR_SERVER, handler: attrs::h_chghost },
        CommandDef { name: "SWHOIS", paramcount: 3, flags: CmdFlags::SERVER, handler: attrs::h_swhois },
        CommandDef { name: "MD", paramcount: 4, flags: CmdFlags::SERVER, handler: attrs::h_md },

        // Channel operations.
        CommandDef { name: "JOIN", paramcount: 1, flags: CmdFlags::USER_OR_SERVER, handler: channel::join::h_join },
        CommandDef { name: "PART", paramcount: 1, flags: CmdFlags::USER_OR_SERVER, handler: channel::part::h_part },
        CommandDef { name: "KICK", paramcount: 2, flags: CmdFlags::USER_OR_SERVER, handler: channel::kick::h_kick },
        CommandDef { name: "SJOIN", paramcount: 3, flags: CmdFlags::SERVER, handler: server::sjoin::h_sjoin },
        CommandDef { name: "INVITE", paramcount: 2, flags: CmdFlags::USER_OR_SERVER, handler: channel::invite::h_invite },
        CommandDef { name: "TOPIC", paramcount: 1, flags: CmdFlags::USER_OR_SERVER, handler: channel::topic::h_topic },
        CommandDef { name: "NAMES", paramcount: 1, flags: CmdFlags::USER, handler: channel::names::h_names },
        CommandDef { name: "LIST", paramcount: 0, flags: CmdFlags::USER, handler: query::h_list },
        CommandDef { name: "WHO", paramcount: 1, flags: CmdFlags::USER, handler: query::h_who },
        CommandDef { name: "WHOIS", paramcount: 1, flags: CmdFlags::USER, handler: query::h_whois },

        // Messaging.
        CommandDef { name: "PRIVMSG", paramcount: 2, flags: CmdFlags::USER_OR_SERVER, handler: messaging::h_privmsg },
        CommandDef { name: "NOTICE", paramcount: 2, flags: CmdFlags::USER_OR_SERVER, handler: messaging::h_notice },
        CommandDef { name: "TAGMSG", paramcount: 1, flags: CmdFlags::USER_OR_SERVER, handler: messaging::h_tagmsg },

        // Administration and federation.
        CommandDef { name: "TKL", paramcount: 2, flags: CmdFlags::OPER_OR_SERVER, handler: server::tkl::h_tkl },
        CommandDef { name: "SENDSNO", paramcount: 2, flags: CmdFlags::SERVER, handler: server::misc::h_sendsno },
        CommandDef { name: "SLOG", paramcount: 4, flags: CmdFlags::SERVER, handler: server::misc::h_slog },
        CommandDef { name: "SQUIT", paramcount: 1, flags: CmdFlags::OPER_OR_SERVER, handler: server::link::h_squit },

        // Capability negotiation and batches.
        CommandDef { name: "CAP", paramcount: 1, flags: CmdFlags::PRE_REG_AND_USER, handler: connection::h_cap },
        CommandDef { name: "BATCH", paramcount: 1, flags: CmdFlags::SERVER, handler: server::misc::h_batch },

        // Queries invoked by the welcome flow.
        CommandDef { name: "LUSERS", paramcount: 0, flags: CmdFlags::USER, handler: query::h_lusers },
        CommandDef { name: "MOTD", paramcount: 0, flags: CmdFlags::USER, handler: query::h_motd },

        // Operator access.
        CommandDef { name: "OPER", paramcount: 2, flags: CmdFlags::USER, handler: oper::h_oper },
    ];
    for def in defs {
        commands.register(*def);
    }

    channel::guards::register_hooks(hooks);
}
