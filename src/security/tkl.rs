//! TKL: the timed kill-line family of server bans.
//!
//! Entries are keyed by a single-letter flag. `E` entries are exceptions:
//! their `bantypes` field names the primary flags they override. The
//! `~account:` and `~certfp:` ident sentinels switch an entry to extended
//! matching.

use weft_proto::wildcard_match;

/// Metadata for one TKL flag.
#[derive(Debug, Clone, Copy)]
pub struct TklFlagDef {
    pub flag: char,
    pub name: &'static str,
    pub what: &'static str,
    /// Whether notices show the mask as `ident@host` (vs. raw host).
    pub host_format: bool,
    /// Propagated across the mesh.
    pub is_global: bool,
    /// May be covered by an `E` exception.
    pub allow_eline: bool,
}

/// The built-in flag table.
pub const TKL_FLAGS: &[TklFlagDef] = &[
    TklFlagDef { flag: 'K', name: "K-line", what: "kill", host_format: true, is_global: false, allow_eline: true },
    TklFlagDef { flag: 'G', name: "G-line", what: "gban", host_format: true, is_global: true, allow_eline: true },
    TklFlagDef { flag: 'Z', name: "Global Z-line", what: "gzline", host_format: true, is_global: true, allow_eline: true },
    TklFlagDef { flag: 'z', name: "Z-line", what: "zline", host_format: true, is_global: false, allow_eline: true },
    TklFlagDef { flag: 's', name: "Shun", what: "shun", host_format: true, is_global: true, allow_eline: true },
    TklFlagDef { flag: 'Q', name: "Q-line", what: "qline", host_format: false, is_global: true, allow_eline: false },
    TklFlagDef { flag: 'E', name: "Exception", what: "except", host_format: true, is_global: false, allow_eline: false },
];

/// Look up a flag definition.
pub fn flag_def(flag: char) -> Option<&'static TklFlagDef> {
    TKL_FLAGS.iter().find(|d| d.flag == flag)
}

/// All flags that sync across the mesh.
pub fn global_flags() -> String {
    TKL_FLAGS.iter().filter(|d| d.is_global).map(|d| d.flag).collect()
}

/// Canonicalise an extended ident sentinel, short form included.
pub fn ext_ident(ident: &str) -> Option<&'static str> {
    match ident {
        "~account:" | "~a:" => Some("~account:"),
        "~certfp:" | "~S:" => Some("~certfp:"),
        _ => None,
    }
}

/// One server ban.
#[derive(Debug, Clone)]
pub struct Tkl {
    pub flag: char,
    pub ident: String,
    pub host: String,
    /// For `E` entries: the primary flags this exception covers.
    pub bantypes: String,
    /// Expiry epoch seconds; 0 is permanent.
    pub expire: i64,
    pub set_by: String,
    pub set_time: i64,
    pub reason: String,
}

impl Tkl {
    /// Extended entries match on account or certificate, not host.
    pub fn is_extended(&self) -> bool {
        ext_ident(&self.ident).is_some()
    }

    pub fn is_global(&self) -> bool {
        flag_def(self.flag).is_some_and(|d| d.is_global)
    }

    /// The display/storage mask for this entry.
    pub fn mask(&self) -> String {
        if let Some(sentinel) = ext_ident(&self.ident) {
            format!("{}{}", sentinel, self.host)
        } else if flag_def(self.flag).is_some_and(|d| d.host_format) {
            format!("{}@{}", self.ident, self.host)
        } else {
            self.host.clone()
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expire != 0 && now >= self.expire
    }
}

/// Attributes of a client a TKL can match against.
#[derive(Debug, Clone, Default)]
pub struct TklSubject<'a> {
    pub nick: &'a str,
    pub ident: &'a str,
    pub realhost: &'a str,
    pub ip: &'a str,
    pub cloakhost: &'a str,
    pub account: &'a str,
    pub certfp: Option<&'a str>,
}

/// Whether one entry matches a client.
pub fn tkl_matches(tkl: &Tkl, subject: &TklSubject<'_>) -> bool {
    if let Some(sentinel) = ext_ident(&tkl.ident) {
        return match sentinel {
            "~account:" => subject.account != "*" && wildcard_match(&tkl.host, subject.account),
            "~certfp:" => subject
                .certfp
                .is_some_and(|fp| wildcard_match(&tkl.host, fp)),
            _ => false,
        };
    }
    if tkl.flag == 'Q' {
        return wildcard_match(&tkl.host, subject.nick);
    }
    if !wildcard_match(&tkl.ident, subject.ident) {
        return false;
    }
    wildcard_match(&tkl.host, subject.realhost)
        || wildcard_match(&tkl.host, subject.ip)
        || wildcard_match(&tkl.host, subject.cloakhost)
}

/// The process-wide ban table.
#[derive(Debug, Default)]
pub struct TklTable {
    entries: Vec<Tkl>,
}

impl TklTable {
    /// Insert an entry; an existing entry with the same flag and mask is
    /// replaced (remote re-adds refresh expiry and reason).
    pub fn add(&mut self, tkl: Tkl) -> bool {
        let existed = self.remove(tkl.flag, &tkl.ident, &tkl.host).is_some();
        self.entries.push(tkl);
        !existed
    }

    /// Remove by flag + ident + host; returns the removed entry.
    pub fn remove(&mut self, flag: char, ident: &str, host: &str) -> Option<Tkl> {
        let pos = self
            .entries
            .iter()
            .position(|t| t.flag == flag && t.ident == ident && t.host == host)?;
        Some(self.entries.remove(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tkl> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry of one of `flags` matching the subject, exceptions
    /// applied.
    pub fn find_match(&self, flags: &str, subject: &TklSubject<'_>) -> Option<&Tkl> {
        let hit = self
            .entries
            .iter()
            .find(|t| flags.contains(t.flag) && tkl_matches(t, subject))?;
        let eline_ok = flag_def(hit.flag).is_some_and(|d| d.allow_eline);
        if eline_ok {
            let excepted = self.entries.iter().any(|e| {
                e.flag == 'E' && e.bantypes.contains(hit.flag) && tkl_matches(e, subject)
            });
            if excepted {
                return None;
            }
        }
        Some(hit)
    }

    /// Drop expired entries, returning them for notification.
    pub fn sweep_expired(&mut self, now: i64) -> Vec<Tkl> {
        let mut expired = Vec::new();
        self.entries.retain(|t| {
            if t.is_expired(now) {
                expired.push(t.clone());
                false
            } else {
                true
            }
        });
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject<'a>() -> TklSubject<'a> {
        TklSubject {
            nick: "bob",
            ident: "b",
            realhost: "host.example",
            ip: "1.2.3.4",
            cloakhost: "aa.bb.example",
            account: "*",
            certfp: None,
        }
    }

    fn gline(ident: &str, host: &str) -> Tkl {
        Tkl {
            flag: 'G',
            ident: ident.to_string(),
            host: host.to_string(),
            bantypes: String::new(),
            expire: 0,
            set_by: "oper".to_string(),
            set_time: 1000,
            reason: "no".to_string(),
        }
    }

    #[test]
    fn matches_any_of_three_host_forms() {
        let tkl = gline("*", "1.2.*");
        assert!(tkl_matches(&tkl, &subject()));
        let tkl = gline("*", "*.example");
        assert!(tkl_matches(&tkl, &subject()));
        let tkl = gline("other", "*");
        assert!(!tkl_matches(&tkl, &subject()));
    }

    #[test]
    fn qline_matches_nick_only() {
        let tkl = Tkl {
            flag: 'Q',
            ident: "*".to_string(),
            host: "b?b".to_string(),
            bantypes: String::new(),
            expire: 0,
            set_by: "-config-".to_string(),
            set_time: 0,
            reason: "reserved".to_string(),
        };
        assert!(tkl_matches(&tkl, &subject()));
        assert_eq!(tkl.mask(), "b?b");
    }

    #[test]
    fn extended_account_matching() {
        let mut tkl = gline("~account:", "alice");
        tkl.ident = "~account:".to_string();
        let mut s = subject();
        assert!(!tkl_matches(&tkl, &s));
        s.account = "alice";
        assert!(tkl_matches(&tkl, &s));
        assert_eq!(tkl.mask(), "~account:alice");
        assert_eq!(ext_ident("~a:"), Some("~account:"));
    }

    #[test]
    fn exceptions_cover_named_bantypes() {
        let mut table = TklTable::default();
        table.add(gline("*", "*.example"));
        table.add(Tkl {
            flag: 'E',
            ident: "*".to_string(),
            host: "host.example".to_string(),
            bantypes: "G".to_string(),
            expire: 0,
            set_by: "oper".to_string(),
            set_time: 1000,
            reason: "trusted".to_string(),
        });
        assert!(table.find_match("G", &subject()).is_none());
        // An exception for a different type does not help.
        assert!(table.find_match("K", &subject()).is_none());
        table.remove('E', "*", "host.example").unwrap();
        assert!(table.find_match("G", &subject()).is_some());
    }

    #[test]
    fn expiry_sweep() {
        let mut table = TklTable::default();
        let mut tkl = gline("*", "*.example");
        tkl.expire = 2000;
        table.add(tkl);
        table.add(gline("*", "*.other"));
        let expired = table.sweep_expired(3000);
        assert_eq!(expired.len(), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn re_add_replaces() {
        let mut table = TklTable::default();
        assert!(table.add(gline("*", "*.example")));
        let mut refreshed = gline("*", "*.example");
        refreshed.reason = "updated".to_string();
        assert!(!table.add(refreshed));
        assert_eq!(table.len(), 1);
        assert_eq!(table.iter().next().unwrap().reason, "updated");
    }
}
