//! Hook bus.
//!
//! Named extension points with priority-ordered callbacks. Callbacks are
//! plain function pointers over the world; the list is copied before
//! invocation so a hook may mutate the registry it was called from.

use crate::state::network::Network;
use std::collections::HashMap;

/// Extension points the engine fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// A user is about to be welcomed; Deny refuses the connection.
    PreConnect,
    /// A local user finished registration.
    LocalConnect,
    /// Registration wants to finish; hooks may still hold it via delays.
    IsHandshakeFinished,
    /// A local user wants to join a channel; Reject carries the numeric.
    CanJoin,
    /// A local user wants to message a channel.
    PreLocalChanmsg,
    /// Whether a viewer may be shown a channel member.
    VisibleOnChannel,
    /// Before any command dispatch; Deny skips execution.
    PreCommand,
    /// After command dispatch.
    PostCommand,
    /// A neighbour finished its burst.
    ServerSynced,
    /// A server link completed negotiation.
    ServerLinkPostNegotiation,
    /// A server link went away.
    ServerDisconnect,
}

/// Result of one hook callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookVerdict {
    /// No opinion; keep asking.
    Continue,
    /// Explicitly allowed; stop asking.
    Allow,
    /// Denied.
    Deny,
    /// Denied with a numeric reply code for the caller to send.
    Reject(u16),
}

/// Arguments passed to a hook. Fields are filled per hook kind; unneeded
/// ones stay `None`.
#[derive(Debug, Default)]
pub struct HookArgs<'a> {
    pub client: Option<&'a str>,
    pub channel: Option<&'a str>,
    pub target: Option<&'a str>,
    pub text: Option<&'a str>,
    pub key: Option<&'a str>,
    pub command: Option<&'a str>,
}

/// A registered callback.
pub type HookFn = fn(&mut Network, &HookArgs) -> HookVerdict;

/// The hook registry.
#[derive(Debug, Default)]
pub struct HookBus {
    table: HashMap<HookKind, Vec<(i32, u64, HookFn)>>,
    seq: u64,
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Higher priority runs earlier; ties run in
    /// registration order.
    pub fn register(&mut self, kind: HookKind, priority: i32, callback: HookFn) {
        self.seq += 1;
        let seq = self.seq;
        let entry = self.table.entry(kind).or_default();
        entry.push((priority, seq, callback));
        entry.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    }

    /// Snapshot of callbacks for one kind, in invocation order.
    pub fn callbacks(&self, kind: HookKind) -> Vec<HookFn> {
        self.table
            .get(&kind)
            .map(|v| v.iter().map(|(_, _, f)| *f).collect())
            .unwrap_or_default()
    }
}

impl Network {
    /// Fire a hook; short-circuits on the first Deny, Reject or Allow.
    pub fn run_hook(&mut self, kind: HookKind, args: &HookArgs) -> HookVerdict {
        for callback in self.hooks.callbacks(kind) {
            match callback(self, args) {
                HookVerdict::Continue => continue,
                verdict => return verdict,
            }
        }
        HookVerdict::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow_all(_: &mut Network, _: &HookArgs) -> HookVerdict {
        HookVerdict::Allow
    }

    fn deny_all(_: &mut Network, _: &HookArgs) -> HookVerdict {
        HookVerdict::Deny
    }

    #[test]
    fn priority_orders_invocation() {
        let mut bus = HookBus::new();
        bus.register(HookKind::PreCommand, 0, allow_all);
        bus.register(HookKind::PreCommand, 10, deny_all);
        let callbacks = bus.callbacks(HookKind::PreCommand);
        assert_eq!(callbacks.len(), 2);
        // Higher priority first.
        assert_eq!(callbacks[0] as usize, deny_all as usize);
    }

    #[test]
    fn ties_break_by_registration_order() {
        let mut bus = HookBus::new();
        bus.register(HookKind::CanJoin, 5, allow_all);
        bus.register(HookKind::CanJoin, 5, deny_all);
        let callbacks = bus.callbacks(HookKind::CanJoin);
        assert_eq!(callbacks[0] as usize, allow_all as usize);
    }
}
