//! Channel mode descriptors and the built-in mode set.

use super::ModeTables;

/// What kind of channel mode a flag is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanModeKind {
    /// Member-status mode with a prefix sigil and a rank.
    Member { prefix: char, rank: u8 },
    /// Mask list (`+b` and friends).
    List,
    /// Takes a parameter on set and on unset.
    ParamBoth,
    /// Takes a parameter on set only.
    ParamSet,
    /// Plain toggle.
    Flag,
}

/// A registered channel mode.
#[derive(Debug, Clone)]
pub struct ChannelModeDef {
    pub flag: char,
    pub kind: ChanModeKind,
    /// Synced across the mesh.
    pub is_global: bool,
    /// Settable by IRC operators only.
    pub oper_only: bool,
    /// Settable by servers/services only.
    pub server_only: bool,
    /// Rank required to change this mode.
    pub needs_rank: u8,
    /// Parameter validation and canonicalisation.
    pub normalize: Option<fn(&str) -> Option<String>>,
    pub desc: &'static str,
}

impl ChannelModeDef {
    /// Rank when this is a member mode; 0 otherwise.
    pub fn rank(&self) -> u8 {
        match self.kind {
            ChanModeKind::Member { rank, .. } => rank,
            _ => 0,
        }
    }

    /// Whether setting (`true`) or unsetting needs a parameter consumed.
    pub fn takes_param(&self, set: bool) -> bool {
        match self.kind {
            ChanModeKind::Member { .. } | ChanModeKind::List | ChanModeKind::ParamBoth => true,
            ChanModeKind::ParamSet => set,
            ChanModeKind::Flag => false,
        }
    }

    fn member(flag: char, prefix: char, rank: u8, desc: &'static str) -> Self {
        Self {
            flag,
            kind: ChanModeKind::Member { prefix, rank },
            is_global: true,
            oper_only: false,
            server_only: false,
            needs_rank: 30,
            normalize: None,
            desc,
        }
    }

    fn list_mode(flag: char, desc: &'static str) -> Self {
        Self {
            flag,
            kind: ChanModeKind::List,
            is_global: true,
            oper_only: false,
            server_only: false,
            needs_rank: 20,
            normalize: None,
            desc,
        }
    }

    /// Plain toggle requiring op rank.
    pub fn flag_mode(flag: char, desc: &'static str) -> Self {
        Self {
            flag,
            kind: ChanModeKind::Flag,
            is_global: true,
            oper_only: false,
            server_only: false,
            needs_rank: 30,
            normalize: None,
            desc,
        }
    }
}

fn normalize_key(raw: &str) -> Option<String> {
    let key: String = raw.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    if key.is_empty() || key.len() > 23 {
        return None;
    }
    Some(key)
}

fn normalize_limit(raw: &str) -> Option<String> {
    let n: u32 = raw.parse().ok()?;
    if n == 0 {
        return None;
    }
    Some(n.to_string())
}

/// Register the built-in channel modes.
pub fn register_defaults(tables: &mut ModeTables) {
    // Member-status modes, descending rank.
    tables.register_channel_mode(ChannelModeDef::member('q', '~', 50, "channel owner"));
    tables.register_channel_mode(ChannelModeDef::member('a', '&', 40, "channel admin"));
    tables.register_channel_mode(ChannelModeDef::member('o', '@', 30, "channel operator"));
    tables.register_channel_mode(ChannelModeDef::member('h', '%', 20, "half-op"));
    tables.register_channel_mode(ChannelModeDef::member('v', '+', 10, "voice"));

    tables.register_channel_mode(ChannelModeDef::list_mode('b', "ban mask"));
    tables.register_channel_mode(ChannelModeDef::list_mode('e', "ban exemption"));
    tables.register_channel_mode(ChannelModeDef::list_mode('I', "invite exemption"));

    tables.register_channel_mode(ChannelModeDef {
        flag: 'k',
        kind: ChanModeKind::ParamBoth,
        is_global: true,
        oper_only: false,
        server_only: false,
        needs_rank: 30,
        normalize: Some(normalize_key),
        desc: "channel key",
    });
    tables.register_channel_mode(ChannelModeDef {
        flag: 'l',
        kind: ChanModeKind::ParamSet,
        is_global: true,
        oper_only: false,
        server_only: false,
        needs_rank: 30,
        normalize: Some(normalize_limit),
        desc: "member limit",
    });

    tables.register_channel_mode(ChannelModeDef::flag_mode('i', "invite only"));
    tables.register_channel_mode(ChannelModeDef::flag_mode('m', "moderated"));
    tables.register_channel_mode(ChannelModeDef::flag_mode('n', "no external messages"));
    tables.register_channel_mode(ChannelModeDef::flag_mode('p', "private"));
    tables.register_channel_mode(ChannelModeDef::flag_mode('s', "secret"));
    tables.register_channel_mode(ChannelModeDef::flag_mode('t', "topic locked to ops"));
    tables.register_channel_mode(ChannelModeDef::flag_mode('V', "invites disabled"));
    tables.register_channel_mode(ChannelModeDef::flag_mode('S', "TLS users only"));

    let mut oper_only_mode = ChannelModeDef::flag_mode('O', "IRC operators only");
    oper_only_mode.oper_only = true;
    tables.register_channel_mode(oper_only_mode);

    let mut registered_mode = ChannelModeDef::flag_mode('r', "registered users only");
    registered_mode.server_only = true;
    tables.register_channel_mode(registered_mode);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_rules_per_kind() {
        let key = ChannelModeDef {
            flag: 'k',
            kind: ChanModeKind::ParamBoth,
            is_global: true,
            oper_only: false,
            server_only: false,
            needs_rank: 30,
            normalize: Some(normalize_key),
            desc: "",
        };
        assert!(key.takes_param(true));
        assert!(key.takes_param(false));

        let limit = ChannelModeDef {
            kind: ChanModeKind::ParamSet,
            ..key.clone()
        };
        assert!(limit.takes_param(true));
        assert!(!limit.takes_param(false));

        let flag = ChannelModeDef::flag_mode('n', "");
        assert!(!flag.takes_param(true));
    }

    #[test]
    fn key_normalisation_strips_separators() {
        assert_eq!(normalize_key("se cr:et").as_deref(), Some("secret"));
        assert!(normalize_key("  ").is_none());
        assert!(normalize_key(&"x".repeat(40)).is_none());
    }

    #[test]
    fn limit_must_be_positive_integer() {
        assert_eq!(normalize_limit("10").as_deref(), Some("10"));
        assert_eq!(normalize_limit("010").as_deref(), Some("10"));
        assert!(normalize_limit("0").is_none());
        assert!(normalize_limit("ten").is_none());
    }
}
