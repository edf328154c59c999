//! Protocol line parsing and serialisation.
//!
//! A line on the wire is
//!
//! ```text
//! ['@' tag-list SP] [':' source SP] command [SP params] [SP ':' trailing]
//! ```
//!
//! The tag list is semicolon-separated `name[=value]` with the IRCv3 escape
//! rules applied to values. The body of a line (everything past the tag
//! section) is capped at 512 bytes, the tag section itself at 8192.

use thiserror::Error;

/// Maximum byte length of a line excluding the tag section.
pub const MAX_LINE_LEN: usize = 512;

/// Maximum byte length of the serialised tag section, `@` included.
pub const MAX_TAGS_LEN: usize = 8192;

/// A single message tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Tag name, possibly prefixed with `+` for client-only tags.
    pub name: String,
    /// Tag value with escapes resolved; `None` for valueless tags.
    pub value: Option<String>,
}

impl Tag {
    /// Construct a tag.
    pub fn new(name: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            name: name.into(),
            value: value.map(str::to_string),
        }
    }

    /// Whether this is a client-only (`+`-prefixed) tag.
    pub fn is_client_only(&self) -> bool {
        self.name.starts_with('+')
    }
}

/// A parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Message tags, in received order, first occurrence of each name only.
    pub tags: Vec<Tag>,
    /// Source token without the leading `:`, if present.
    pub source: Option<String>,
    /// The command verb exactly as received.
    pub command: String,
    /// Positional parameters; a trailing parameter is the last entry.
    pub params: Vec<String>,
}

/// Failure to parse a received line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineParseError {
    /// The line was empty or whitespace only.
    #[error("empty line")]
    Empty,
    /// The body exceeded [`MAX_LINE_LEN`].
    #[error("line too long ({0} bytes)")]
    TooLong(usize),
    /// The tag section exceeded [`MAX_TAGS_LEN`].
    #[error("tag section too long ({0} bytes)")]
    TagsTooLong(usize),
    /// A tag section was present but held no tags, or a name was empty.
    #[error("malformed tag section")]
    BadTags,
}

/// Resolve the IRCv3 tag-value escapes.
fn unescape_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Apply the IRCv3 tag-value escapes.
fn escape_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            ';' => out.push_str("\\:"),
            ' ' => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

fn parse_tag_section(section: &str) -> Result<Vec<Tag>, LineParseError> {
    let mut tags: Vec<Tag> = Vec::new();
    for item in section.split(';') {
        if item.is_empty() {
            continue;
        }
        let (name, value) = match item.split_once('=') {
            Some((n, v)) => (n, Some(unescape_value(v))),
            None => (item, None),
        };
        if name.is_empty() {
            return Err(LineParseError::BadTags);
        }
        // Duplicate names keep only the first occurrence.
        if tags.iter().any(|t| t.name == name) {
            continue;
        }
        tags.push(Tag {
            name: name.to_string(),
            value,
        });
    }
    if tags.is_empty() {
        return Err(LineParseError::BadTags);
    }
    Ok(tags)
}

impl Line {
    /// Parse a raw received line. CR/LF framing is assumed to be stripped
    /// already; leading whitespace is tolerated.
    pub fn parse(raw: &str) -> Result<Line, LineParseError> {
        let mut rest = raw.trim_start_matches([' ', '\t']).trim_end_matches(['\r', '\n']);
        if rest.is_empty() {
            return Err(LineParseError::Empty);
        }

        let mut tags = Vec::new();
        if let Some(stripped) = rest.strip_prefix('@') {
            let (section, after) = match stripped.split_once(' ') {
                Some((s, a)) => (s, a),
                None => (stripped, ""),
            };
            if section.len() + 1 > MAX_TAGS_LEN {
                return Err(LineParseError::TagsTooLong(section.len() + 1));
            }
            tags = parse_tag_section(section)?;
            rest = after.trim_start_matches(' ');
            if rest.is_empty() {
                return Err(LineParseError::Empty);
            }
        }

        if rest.len() > MAX_LINE_LEN {
            return Err(LineParseError::TooLong(rest.len()));
        }

        let mut source = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (src, after) = match stripped.split_once(' ') {
                Some((s, a)) => (s, a),
                None => (stripped, ""),
            };
            source = Some(src.to_string());
            rest = after.trim_start_matches(' ');
            if rest.is_empty() {
                return Err(LineParseError::Empty);
            }
        }

        let mut params = Vec::new();
        let command;
        match rest.split_once(' ') {
            None => command = rest.to_string(),
            Some((cmd, mut tail)) => {
                command = cmd.to_string();
                loop {
                    tail = tail.trim_start_matches(' ');
                    if tail.is_empty() {
                        break;
                    }
                    if let Some(trailing) = tail.strip_prefix(':') {
                        params.push(trailing.to_string());
                        break;
                    }
                    match tail.split_once(' ') {
                        Some((word, after)) => {
                            params.push(word.to_string());
                            tail = after;
                        }
                        None => {
                            params.push(tail.to_string());
                            break;
                        }
                    }
                }
            }
        }

        Ok(Line {
            tags,
            source,
            command,
            params,
        })
    }

    /// Serialise the tag prefix for a set of tags, trailing space included.
    /// Returns an empty string for an empty set.
    pub fn serialize_tags(tags: &[Tag]) -> String {
        if tags.is_empty() {
            return String::new();
        }
        let mut out = String::from("@");
        for (i, tag) in tags.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            out.push_str(&tag.name);
            if let Some(v) = &tag.value {
                out.push('=');
                out.push_str(&escape_value(v));
            }
        }
        out.push(' ');
        out
    }

    /// Serialise the line body (no tags, no CRLF).
    pub fn serialize_body(&self) -> String {
        let mut out = String::new();
        if let Some(src) = &self.source {
            out.push(':');
            out.push_str(src);
            out.push(' ');
        }
        out.push_str(&self.command);
        for (i, p) in self.params.iter().enumerate() {
            out.push(' ');
            let last = i + 1 == self.params.len();
            if last && (p.is_empty() || p.contains(' ') || p.starts_with(':')) {
                out.push(':');
            }
            out.push_str(p);
        }
        out
    }
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", Line::serialize_tags(&self.tags), self.serialize_body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_command() {
        let line = Line::parse("NICK alice").unwrap();
        assert!(line.tags.is_empty());
        assert!(line.source.is_none());
        assert_eq!(line.command, "NICK");
        assert_eq!(line.params, vec!["alice"]);
    }

    #[test]
    fn parses_source_and_trailing() {
        let line = Line::parse(":001AAAAAA PRIVMSG #weft :hello  world").unwrap();
        assert_eq!(line.source.as_deref(), Some("001AAAAAA"));
        assert_eq!(line.params, vec!["#weft", "hello  world"]);
    }

    #[test]
    fn parses_tags_with_escapes() {
        let line = Line::parse("@time=2026-01-01T00:00:00Z;+draft/reply=a\\sb PRIVMSG #w :hi").unwrap();
        assert_eq!(line.tags.len(), 2);
        assert_eq!(line.tags[0].name, "time");
        assert_eq!(line.tags[1].value.as_deref(), Some("a b"));
        assert!(line.tags[1].is_client_only());
    }

    #[test]
    fn duplicate_tags_keep_first() {
        let line = Line::parse("@msgid=one;msgid=two PING :x").unwrap();
        assert_eq!(line.tags.len(), 1);
        assert_eq!(line.tags[0].value.as_deref(), Some("one"));
    }

    #[test]
    fn rejects_empty_and_overlong() {
        assert_eq!(Line::parse("   "), Err(LineParseError::Empty));
        let long = format!("PRIVMSG #x :{}", "a".repeat(600));
        assert!(matches!(Line::parse(&long), Err(LineParseError::TooLong(_))));
    }

    #[test]
    fn round_trips_body() {
        let raw = ":001 SJOIN 1700000000 #weft :@001AAAAAA +001AAAAAB";
        let line = Line::parse(raw).unwrap();
        assert_eq!(line.serialize_body(), raw);
    }

    #[test]
    fn trailing_marker_added_when_needed() {
        let line = Line {
            tags: Vec::new(),
            source: Some("srv.weft".into()),
            command: "QUIT".into(),
            params: vec!["gone fishing".into()],
        };
        assert_eq!(line.to_string(), ":srv.weft QUIT :gone fishing");
    }
}
