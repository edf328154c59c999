//! Message-tag registry and per-destination filtering.
//!
//! Tag classes declare where a tag may come from and where it may go.
//! Outgoing tags survive only when the destination negotiated
//! `message-tags`, the tag is not local-only (for server destinations),
//! and a required value is present; a class may additionally redact its
//! value per destination.

use weft_proto::{Line, Tag};

/// Destination description used when filtering outgoing tags.
#[derive(Debug, Clone, Copy)]
pub struct TagDestination {
    pub is_server: bool,
    pub has_message_tags_cap: bool,
    pub is_oper: bool,
}

/// A registered tag class.
#[derive(Debug, Clone, Copy)]
pub struct TagDef {
    /// Canonical name without the client-only `+` prefix.
    pub name: &'static str,
    /// Never relayed to server destinations.
    pub local: bool,
    /// A value must be present.
    pub value_required: bool,
    /// May arrive from local clients.
    pub client_ok: bool,
    /// May arrive from server links.
    pub server_ok: bool,
    /// Value validation.
    pub value_ok: Option<fn(&str) -> bool>,
    /// Per-destination redaction; `None` return drops the tag.
    pub filter_value: Option<fn(&Tag, &TagDestination) -> Option<String>>,
}

fn oper_only_value(tag: &Tag, dest: &TagDestination) -> Option<String> {
    if dest.is_oper || dest.is_server {
        tag.value.clone()
    } else {
        None
    }
}

fn nonempty(v: &str) -> bool {
    !v.is_empty()
}

/// The built-in tag classes.
pub const TAGS: &[TagDef] = &[
    TagDef {
        name: "time",
        local: false,
        value_required: true,
        client_ok: false,
        server_ok: true,
        value_ok: Some(nonempty),
        filter_value: None,
    },
    TagDef {
        name: "msgid",
        local: false,
        value_required: true,
        client_ok: false,
        server_ok: true,
        value_ok: Some(nonempty),
        filter_value: None,
    },
    TagDef {
        name: "account",
        local: false,
        value_required: true,
        client_ok: false,
        server_ok: true,
        value_ok: Some(nonempty),
        filter_value: None,
    },
    TagDef {
        name: "batch",
        local: false,
        value_required: true,
        client_ok: false,
        server_ok: true,
        value_ok: Some(nonempty),
        filter_value: None,
    },
    TagDef {
        name: "label",
        local: true,
        value_required: true,
        client_ok: true,
        server_ok: false,
        value_ok: Some(nonempty),
        filter_value: None,
    },
    TagDef {
        name: "typing",
        local: false,
        value_required: false,
        client_ok: true,
        server_ok: false,
        value_ok: None,
        filter_value: None,
    },
    // Operator audit trail attached to moderation actions.
    TagDef {
        name: "weft.chat/issued-by",
        local: false,
        value_required: true,
        client_ok: false,
        server_ok: true,
        value_ok: Some(nonempty),
        filter_value: Some(oper_only_value),
    },
];

/// Look up a tag class; the client-only `+` prefix is ignored for lookup.
pub fn tag_def(name: &str) -> Option<&'static TagDef> {
    let canonical = name.strip_prefix('+').unwrap_or(name);
    TAGS.iter().find(|d| d.name == canonical)
}

/// Validate tags arriving on a line. `from_server` selects which direction
/// may carry which classes; unknown client-only tags are kept as opaque.
pub fn accept_incoming(tags: Vec<Tag>, from_server: bool) -> Vec<Tag> {
    let mut accepted = Vec::with_capacity(tags.len());
    for tag in tags {
        let client_only = tag.is_client_only();
        // Client-only tags never come from a server direction, server tags
        // never from a user direction.
        if client_only && from_server {
            continue;
        }
        match tag_def(&tag.name) {
            Some(def) => {
                if from_server && !def.server_ok {
                    continue;
                }
                if !from_server && !def.client_ok {
                    continue;
                }
                if def.value_required && tag.value.as_deref().map_or(true, str::is_empty) {
                    continue;
                }
                if let (Some(check), Some(value)) = (def.value_ok, tag.value.as_deref()) {
                    if !check(value) {
                        continue;
                    }
                }
                accepted.push(tag);
            }
            // Unknown tags stay opaque only in the client-only namespace.
            None if client_only => accepted.push(tag),
            None => {}
        }
    }
    accepted
}

/// Filter and serialise tags for one destination. Returns the `@…` prefix
/// with trailing space, or an empty string when nothing survives.
pub fn filter_outgoing(tags: &[Tag], dest: &TagDestination) -> String {
    if tags.is_empty() || !dest.has_message_tags_cap {
        return String::new();
    }
    let mut survivors = Vec::new();
    for tag in tags {
        let def = tag_def(&tag.name);
        if let Some(def) = def {
            if def.local && dest.is_server {
                continue;
            }
            if def.value_required && tag.value.as_deref().map_or(true, str::is_empty) {
                continue;
            }
            if let Some(filter) = def.filter_value {
                match filter(tag, dest) {
                    Some(value) => survivors.push(Tag::new(tag.name.clone(), Some(value.as_str()))),
                    None => continue,
                }
                continue;
            }
        } else if dest.is_server {
            // Opaque client-only tags stay on the local server.
            continue;
        }
        survivors.push(tag.clone());
    }
    Line::serialize_tags(&survivors)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT: TagDestination = TagDestination {
        is_server: false,
        has_message_tags_cap: true,
        is_oper: false,
    };
    const SERVER: TagDestination = TagDestination {
        is_server: true,
        has_message_tags_cap: true,
        is_oper: false,
    };

    #[test]
    fn direction_rules() {
        // A server tag from a client direction is dropped.
        let from_client = accept_incoming(vec![Tag::new("time", Some("x"))], false);
        assert!(from_client.is_empty());

        // A client-only tag from a server direction is dropped.
        let from_server = accept_incoming(vec![Tag::new("+typing", Some("active"))], true);
        assert!(from_server.is_empty());

        let ok = accept_incoming(vec![Tag::new("time", Some("x"))], true);
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn required_values_enforced() {
        let tags = accept_incoming(vec![Tag::new("msgid", None)], true);
        assert!(tags.is_empty());
    }

    #[test]
    fn unknown_client_only_tags_stay_opaque() {
        let tags = accept_incoming(vec![Tag::new("+draft/react", Some("👍"))], false);
        assert_eq!(tags.len(), 1);
        // ...but never cross a server link.
        assert_eq!(filter_outgoing(&tags, &SERVER), "");
        assert!(!filter_outgoing(&tags, &CLIENT).is_empty());
    }

    #[test]
    fn local_tags_never_reach_servers() {
        let tags = vec![Tag::new("label", Some("abc"))];
        assert_eq!(filter_outgoing(&tags, &SERVER), "");
        assert_eq!(filter_outgoing(&tags, &CLIENT), "@label=abc ");
    }

    #[test]
    fn destination_without_cap_gets_nothing() {
        let tags = vec![Tag::new("msgid", Some("m1"))];
        let no_cap = TagDestination {
            has_message_tags_cap: false,
            ..CLIENT
        };
        assert_eq!(filter_outgoing(&tags, &no_cap), "");
    }

    #[test]
    fn redacting_class_filters_per_destination() {
        let tags = vec![Tag::new("weft.chat/issued-by", Some("oper1"))];
        assert_eq!(filter_outgoing(&tags, &CLIENT), "");
        let oper = TagDestination { is_oper: true, ..CLIENT };
        assert_eq!(filter_outgoing(&tags, &oper), "@weft.chat/issued-by=oper1 ");
    }
}
