//! Mode registries.
//!
//! User modes, channel modes (member-status, list, parameter and plain
//! flags), snomasks and extbans all self-register into tables at startup.
//! Registering the same flag twice is a programming error and panics during
//! boot. The tables also feed the ISUPPORT advertisement.

pub mod chanmodes;
pub mod extban;
pub mod snomask;
pub mod usermodes;

pub use chanmodes::{ChanModeKind, ChannelModeDef};
pub use snomask::SnomaskDef;
pub use usermodes::{SetterLevel, UserModeDef};

use crate::config::Config;

/// All registered mode descriptors.
#[derive(Debug)]
pub struct ModeTables {
    pub user: Vec<UserModeDef>,
    pub channel: Vec<ChannelModeDef>,
    pub snomasks: Vec<SnomaskDef>,
}

impl ModeTables {
    /// Tables with the built-in modes registered.
    pub fn with_defaults() -> Self {
        let mut tables = Self {
            user: Vec::new(),
            channel: Vec::new(),
            snomasks: Vec::new(),
        };
        usermodes::register_defaults(&mut tables);
        chanmodes::register_defaults(&mut tables);
        snomask::register_defaults(&mut tables);
        tables
    }

    pub fn register_user_mode(&mut self, def: UserModeDef) {
        assert!(
            !self.user.iter().any(|d| d.flag == def.flag),
            "duplicate user mode '{}'",
            def.flag
        );
        self.user.push(def);
    }

    pub fn register_channel_mode(&mut self, def: ChannelModeDef) {
        assert!(
            !self.channel.iter().any(|d| d.flag == def.flag),
            "duplicate channel mode '{}'",
            def.flag
        );
        self.channel.push(def);
    }

    pub fn register_snomask(&mut self, def: SnomaskDef) {
        assert!(
            !self.snomasks.iter().any(|d| d.flag == def.flag),
            "duplicate snomask '{}'",
            def.flag
        );
        self.snomasks.push(def);
    }

    pub fn user_def(&self, flag: char) -> Option<&UserModeDef> {
        self.user.iter().find(|d| d.flag == flag)
    }

    pub fn chan_def(&self, flag: char) -> Option<&ChannelModeDef> {
        self.channel.iter().find(|d| d.flag == flag)
    }

    pub fn snomask_def(&self, flag: char) -> Option<&SnomaskDef> {
        self.snomasks.iter().find(|d| d.flag == flag)
    }

    /// Member-status descriptors, highest rank first.
    pub fn member_modes(&self) -> Vec<&ChannelModeDef> {
        let mut defs: Vec<&ChannelModeDef> = self
            .channel
            .iter()
            .filter(|d| matches!(d.kind, ChanModeKind::Member { .. }))
            .collect();
        defs.sort_by(|a, b| b.rank().cmp(&a.rank()));
        defs
    }

    /// Rank of one status flag; 0 for non-member flags.
    pub fn rank_of(&self, flag: char) -> u8 {
        self.chan_def(flag).map(|d| d.rank()).unwrap_or(0)
    }

    /// Highest rank across a member's status flags.
    pub fn member_rank(&self, status: &std::collections::BTreeSet<char>) -> u8 {
        status.iter().map(|&f| self.rank_of(f)).max().unwrap_or(0)
    }

    /// Prefix sigil for a status flag (`o` -> `@`).
    pub fn prefix_of(&self, flag: char) -> Option<char> {
        match self.chan_def(flag)?.kind {
            ChanModeKind::Member { prefix, .. } => Some(prefix),
            _ => None,
        }
    }

    /// Status flag for a prefix sigil (`@` -> `o`).
    pub fn flag_for_prefix(&self, sigil: char) -> Option<char> {
        self.channel.iter().find_map(|d| match d.kind {
            ChanModeKind::Member { prefix, .. } if prefix == sigil => Some(d.flag),
            _ => None,
        })
    }

    /// `PREFIX=(qaohv)~&@%+` style token value.
    pub fn prefix_isupport(&self) -> String {
        let defs = self.member_modes();
        let flags: String = defs.iter().map(|d| d.flag).collect();
        let prefixes: String = defs
            .iter()
            .filter_map(|d| match d.kind {
                ChanModeKind::Member { prefix, .. } => Some(prefix),
                _ => None,
            })
            .collect();
        format!("({}){}", flags, prefixes)
    }

    /// `CHANMODES=<list>,<param-both>,<param-set>,<plain>` token value.
    pub fn chanmodes_isupport(&self) -> String {
        let pick = |want: fn(&ChanModeKind) -> bool| -> String {
            let mut flags: Vec<char> = self
                .channel
                .iter()
                .filter(|d| want(&d.kind))
                .map(|d| d.flag)
                .collect();
            flags.sort_unstable();
            flags.into_iter().collect()
        };
        format!(
            "{},{},{},{}",
            pick(|k| matches!(k, ChanModeKind::List)),
            pick(|k| matches!(k, ChanModeKind::ParamBoth)),
            pick(|k| matches!(k, ChanModeKind::ParamSet)),
            pick(|k| matches!(k, ChanModeKind::Flag)),
        )
    }

    /// All user mode flags, sorted.
    pub fn usermodes_str(&self) -> String {
        let mut flags: Vec<char> = self.user.iter().map(|d| d.flag).collect();
        flags.sort_unstable();
        flags.into_iter().collect()
    }

    /// All channel mode flags, member modes included, sorted.
    pub fn chanmodes_str(&self) -> String {
        let mut flags: Vec<char> = self.channel.iter().map(|d| d.flag).collect();
        flags.sort_unstable();
        flags.into_iter().collect()
    }
}

/// Assemble the ISUPPORT token list advertised during welcome.
pub fn isupport_tokens(conf: &Config, tables: &ModeTables) -> Vec<String> {
    vec![
        format!("NETWORK={}", conf.server.network.replace(' ', "-")),
        "CASEMAPPING=rfc1459".to_string(),
        format!("NICKLEN={}", conf.server.nick_len),
        "CHANNELLEN=32".to_string(),
        format!("CHANLIMIT=#&+:{}", conf.limits.max_channels_per_user),
        format!("TOPICLEN={}", conf.limits.topic_len),
        format!("MAXLIST=beI:{}", conf.limits.max_list_entries),
        format!("MODES={}", conf.limits.max_modes_per_line),
        format!("PREFIX={}", tables.prefix_isupport()),
        format!("CHANMODES={}", tables.chanmodes_isupport()),
        format!("USERMODES={}", tables.usermodes_str()),
        format!("EXTBAN=~,{}", extban::flags_str()),
        "CHANTYPES=#&+".to_string(),
        "TARGMAX=PRIVMSG:4,NOTICE:4".to_string(),
        "ELIST=U".to_string(),
        "KICKLEN=360".to_string(),
        "AWAYLEN=360".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_token_orders_by_rank() {
        let tables = ModeTables::with_defaults();
        assert_eq!(tables.prefix_isupport(), "(qaohv)~&@%+");
    }

    #[test]
    fn chanmodes_token_has_four_categories() {
        let tables = ModeTables::with_defaults();
        let token = tables.chanmodes_isupport();
        assert_eq!(token.split(',').count(), 4);
        assert!(token.starts_with("bIe") || token.starts_with("Ibe") || token.contains('b'));
    }

    #[test]
    #[should_panic(expected = "duplicate channel mode")]
    fn duplicate_registration_panics() {
        let mut tables = ModeTables::with_defaults();
        tables.register_channel_mode(ChannelModeDef::flag_mode('n', "again"));
    }

    #[test]
    fn isupport_fits_welcome_packets() {
        let conf = Config::for_testing();
        let tables = ModeTables::with_defaults();
        let tokens = isupport_tokens(&conf, &tables);
        assert!(tokens.len() > 15 && tokens.len() <= 30);
        assert!(tokens.iter().any(|t| t == "NETWORK=WeftNet"));
    }
}
