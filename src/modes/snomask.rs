//! Snomask registry.
//!
//! Single-character notice classes addressable by `+s` operators. Global
//! snomasks relay across the mesh via `SENDSNO`.

use super::ModeTables;

/// A registered server-notice class.
#[derive(Debug, Clone)]
pub struct SnomaskDef {
    pub flag: char,
    /// Relayed to peers when raised with sendsno.
    pub is_global: bool,
    pub desc: &'static str,
}

/// Register the built-in snomask classes.
pub fn register_defaults(tables: &mut ModeTables) {
    let masks = [
        SnomaskDef { flag: 'c', is_global: false, desc: "local connects and disconnects" },
        SnomaskDef { flag: 'f', is_global: false, desc: "flood violations" },
        SnomaskDef { flag: 'k', is_global: true, desc: "kill notices" },
        SnomaskDef { flag: 'o', is_global: true, desc: "oper-up notices" },
        SnomaskDef { flag: 'q', is_global: false, desc: "reserved-nick rejections" },
        SnomaskDef { flag: 's', is_global: false, desc: "general server notices" },
        SnomaskDef { flag: 't', is_global: true, desc: "server ban changes" },
        SnomaskDef { flag: 'L', is_global: false, desc: "link state changes" },
    ];
    for def in masks {
        tables.register_snomask(def);
    }
}

/// Filter a requested snomask string down to registered flags.
pub fn filter_valid(tables: &ModeTables, requested: &str) -> String {
    let mut out = String::new();
    for c in requested.chars() {
        if tables.snomask_def(c).is_some() && !out.contains(c) {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_unknown_and_duplicate_flags() {
        let tables = ModeTables::with_defaults();
        assert_eq!(filter_valid(&tables, "cfXcz9k"), "cfk");
        assert_eq!(filter_valid(&tables, ""), "");
    }
}
