//! User mode descriptors and the built-in mode set.

use super::ModeTables;

/// Who may set a user mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetterLevel {
    /// Any user, on themselves.
    Anyone,
    /// IRC operators only.
    Oper,
    /// Servers only (never by MODE from a user).
    Server,
}

/// A registered user mode.
#[derive(Debug, Clone)]
pub struct UserModeDef {
    pub flag: char,
    /// Synced to peers in the UID burst and MODE propagation.
    pub is_global: bool,
    /// Removed automatically when the user deopers.
    pub unset_on_deoper: bool,
    pub level: SetterLevel,
    pub desc: &'static str,
}

/// Register the built-in user modes.
pub fn register_defaults(tables: &mut ModeTables) {
    let modes = [
        UserModeDef {
            flag: 'i',
            is_global: true,
            unset_on_deoper: false,
            level: SetterLevel::Anyone,
            desc: "invisible",
        },
        UserModeDef {
            flag: 'o',
            is_global: true,
            unset_on_deoper: true,
            level: SetterLevel::Oper,
            desc: "IRC operator",
        },
        UserModeDef {
            flag: 's',
            is_global: false,
            unset_on_deoper: true,
            level: SetterLevel::Oper,
            desc: "server notices",
        },
        UserModeDef {
            flag: 'x',
            is_global: true,
            unset_on_deoper: false,
            level: SetterLevel::Anyone,
            desc: "cloaked host",
        },
        UserModeDef {
            flag: 'z',
            is_global: true,
            unset_on_deoper: false,
            level: SetterLevel::Server,
            desc: "TLS connection",
        },
        UserModeDef {
            flag: 'r',
            is_global: true,
            unset_on_deoper: false,
            level: SetterLevel::Server,
            desc: "identified to an account",
        },
        UserModeDef {
            flag: 'B',
            is_global: true,
            unset_on_deoper: false,
            level: SetterLevel::Anyone,
            desc: "bot",
        },
        UserModeDef {
            flag: 'w',
            is_global: false,
            unset_on_deoper: false,
            level: SetterLevel::Anyone,
            desc: "wallops",
        },
        UserModeDef {
            flag: 'S',
            is_global: true,
            unset_on_deoper: false,
            level: SetterLevel::Server,
            desc: "network service",
        },
    ];
    for def in modes {
        tables.register_user_mode(def);
    }
}
