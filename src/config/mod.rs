//! Configuration loading and validation.
//!
//! One `config.toml` describes the server identity, resource classes,
//! allow blocks, operator blocks, server links and command aliases.
//! Everything is deserialized up front; [`validate`] collects every problem
//! it can find before the daemon commits to starting.

use crate::error::Error;
use serde::Deserialize;
use std::path::Path;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Pretty
    }
}

/// `[server]` - this server's identity and global knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name, e.g. `hub.weft.example`.
    pub name: String,
    /// Three-character server id; first char a digit.
    pub sid: String,
    /// Network name advertised in ISUPPORT and the welcome numeric.
    pub network: String,
    /// Free-form description (GECOS of the server).
    pub info: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Path to the MOTD file; absent means ERR_NOMOTD.
    #[serde(default)]
    pub motd_file: Option<String>,
    /// Modes applied to every local user at registration, e.g. `"ix"`.
    #[serde(default)]
    pub modes_on_connect: String,
    /// Channel modes applied when a channel is first created, e.g. `"nt"`.
    #[serde(default = "default_modes_on_join")]
    pub modes_on_join: String,
    /// Accept throttle as `count:seconds`; empty disables.
    #[serde(default = "default_throttle")]
    pub throttle: String,
    /// Whether registration requires answering the anti-spoof PING cookie.
    #[serde(default)]
    pub nospoof: bool,
    /// Whether operators may walk through channel join restrictions.
    #[serde(default)]
    pub oper_override: bool,
    #[serde(default = "default_nick_len")]
    pub nick_len: usize,
}

fn default_modes_on_join() -> String {
    "nt".to_string()
}

fn default_throttle() -> String {
    "3:60".to_string()
}

fn default_nick_len() -> usize {
    30
}

/// `[security]` - cloaking and handshake policy.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Secret mixed into the cloak digest; must be identical network-wide.
    pub cloak_key: String,
    /// Optional label prefixed to hostname cloaks.
    #[serde(default)]
    pub cloak_prefix: Option<String>,
}

/// `[limits]` - output and resource ceilings.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_modes")]
    pub max_modes_per_line: usize,
    #[serde(default = "default_max_list")]
    pub max_list_entries: usize,
    #[serde(default = "default_max_channels")]
    pub max_channels_per_user: usize,
    #[serde(default = "default_topic_len")]
    pub topic_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_modes_per_line: default_max_modes(),
            max_list_entries: default_max_list(),
            max_channels_per_user: default_max_channels(),
            topic_len: default_topic_len(),
        }
    }
}

fn default_max_modes() -> usize {
    12
}

fn default_max_list() -> usize {
    100
}

fn default_max_channels() -> usize {
    24
}

fn default_topic_len() -> usize {
    360
}

/// `[[class]]` - a connection resource class.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassBlock {
    pub name: String,
    #[serde(default = "default_q")]
    pub sendq: usize,
    #[serde(default = "default_q")]
    pub recvq: usize,
    /// Maximum simultaneous connections in this class.
    #[serde(default = "default_class_max")]
    pub max: usize,
}

fn default_q() -> usize {
    65536
}

fn default_class_max() -> usize {
    1024
}

/// `[[allow]]` - who may connect, walked in order; first mask match wins.
#[derive(Debug, Clone, Deserialize)]
pub struct AllowBlock {
    /// Masks compared against `ident@host` and `ident@ip`.
    pub mask: Vec<String>,
    /// Class this block assigns.
    pub class: String,
    /// Required PASS value, if any.
    #[serde(default)]
    pub password: Option<String>,
    /// Reject instead of falling through when the password fails.
    #[serde(default)]
    pub reject_on_auth_fail: bool,
    /// Require a TLS connection.
    #[serde(default)]
    pub require_tls: bool,
    /// Deny masks: matching the block, then one of these, refuses.
    #[serde(default)]
    pub block: Vec<String>,
    /// Maximum connections per source IP.
    #[serde(default)]
    pub maxperip: Option<usize>,
}

/// `[[oper]]` - operator credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct OperBlock {
    pub name: String,
    pub password: String,
    /// Operator class label shown in WHOIS.
    #[serde(default = "default_oper_class")]
    pub operclass: String,
    /// Masks the candidate must match (`ident@host` shape).
    #[serde(default)]
    pub mask: Vec<String>,
    /// Snomask string granted on oper-up.
    #[serde(default = "default_oper_snomask")]
    pub snomask: String,
    /// Extra WHOIS line, if any.
    #[serde(default)]
    pub swhois: Option<String>,
}

fn default_oper_class() -> String {
    "netadmin".to_string()
}

fn default_oper_snomask() -> String {
    "cfkots".to_string()
}

/// `[[link]]` - a server peering block.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkBlock {
    /// Remote server name; must match what the peer announces.
    pub name: String,
    /// Remote host to connect to (outgoing links).
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub tls: bool,
    /// Shared link password, verified in both directions.
    pub password: String,
    #[serde(default)]
    pub autoconnect: bool,
}

/// Alias kinds: services aliases require the services server to be linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasType {
    Services,
    User,
    Channel,
}

/// `[[alias]]` - rewrite `/name text` into a PRIVMSG.
#[derive(Debug, Clone, Deserialize)]
pub struct AliasBlock {
    /// Command name, e.g. `NICKSERV`.
    pub name: String,
    /// Delivery target (nick or channel).
    pub target: String,
    #[serde(rename = "type")]
    pub alias_type: AliasType,
    /// Server the target must reside on, for services aliases.
    #[serde(default)]
    pub services_server: Option<String>,
}

/// `[[listen]]` - a listening socket.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenBlock {
    pub addr: String,
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
}

/// `[tls]` - certificate material for TLS listeners and links.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub cert: String,
    pub key: String,
}

/// The fully parsed configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub class: Vec<ClassBlock>,
    #[serde(default)]
    pub allow: Vec<AllowBlock>,
    #[serde(default)]
    pub oper: Vec<OperBlock>,
    #[serde(default)]
    pub link: Vec<LinkBlock>,
    #[serde(default)]
    pub alias: Vec<AliasBlock>,
    #[serde(default)]
    pub listen: Vec<ListenBlock>,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl Config {
    /// Load and parse a configuration file.
    pub fn load(path: &str) -> Result<Config, Error> {
        let raw = std::fs::read_to_string(Path::new(path))
            .map_err(|e| Error::Config(format!("{}: {}", path, e)))?;
        toml::from_str(&raw).map_err(|e| Error::Config(e.to_string()))
    }

    /// Parse `throttle = "count:seconds"`; `None` when disabled.
    pub fn throttle_policy(&self) -> Option<(usize, i64)> {
        let raw = self.server.throttle.trim();
        if raw.is_empty() {
            return None;
        }
        let (count, secs) = raw.split_once(':')?;
        Some((count.parse().ok()?, secs.parse().ok()?))
    }

    /// Look up a class block by name.
    pub fn class(&self, name: &str) -> Option<&ClassBlock> {
        self.class.iter().find(|c| c.name == name)
    }

    /// A minimal configuration for tests: one open allow block, one class.
    pub fn for_testing() -> Config {
        Config {
            server: ServerConfig {
                name: "hub.weft.test".to_string(),
                sid: "001".to_string(),
                network: "WeftNet".to_string(),
                info: "test hub".to_string(),
                log_format: LogFormat::Pretty,
                motd_file: None,
                modes_on_connect: "i".to_string(),
                modes_on_join: "nt".to_string(),
                throttle: String::new(),
                nospoof: false,
                oper_override: false,
                nick_len: default_nick_len(),
            },
            security: SecurityConfig {
                cloak_key: "test-cloak-key-0123456789".to_string(),
                cloak_prefix: None,
            },
            limits: LimitsConfig::default(),
            class: vec![ClassBlock {
                name: "clients".to_string(),
                sendq: 65536,
                recvq: 8192,
                max: 1024,
            }],
            allow: vec![AllowBlock {
                mask: vec!["*@*".to_string()],
                class: "clients".to_string(),
                password: None,
                reject_on_auth_fail: false,
                require_tls: false,
                block: Vec::new(),
                maxperip: Some(64),
            }],
            oper: vec![OperBlock {
                name: "root".to_string(),
                password: "letmein".to_string(),
                operclass: default_oper_class(),
                mask: vec!["*@*".to_string()],
                snomask: default_oper_snomask(),
                swhois: None,
            }],
            link: vec![LinkBlock {
                name: "leaf.weft.test".to_string(),
                host: None,
                port: None,
                tls: false,
                password: "linkpass".to_string(),
                autoconnect: false,
            }],
            alias: Vec::new(),
            listen: Vec::new(),
            tls: None,
        }
    }
}

/// Validate the configuration, collecting every error found.
pub fn validate(config: &Config) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() || !config.server.name.contains('.') {
        errors.push("server.name must be a dotted server name".to_string());
    }
    let sid = &config.server.sid;
    if sid.len() != 3
        || !sid.chars().next().is_some_and(|c| c.is_ascii_digit())
        || !sid.chars().all(|c| c.is_ascii_alphanumeric())
    {
        errors.push("server.sid must be three alphanumerics starting with a digit".to_string());
    }
    if config.security.cloak_key.len() < 16 {
        errors.push("security.cloak_key must be at least 16 characters".to_string());
    }

    for allow in &config.allow {
        if config.class(&allow.class).is_none() {
            errors.push(format!("allow block references unknown class '{}'", allow.class));
        }
        if allow.mask.is_empty() {
            errors.push("allow block without masks can never match".to_string());
        }
    }
    for link in &config.link {
        if link.autoconnect && (link.host.is_none() || link.port.is_none()) {
            errors.push(format!(
                "link '{}' is autoconnect but has no host/port",
                link.name
            ));
        }
        if link.password.is_empty() {
            errors.push(format!("link '{}' has an empty password", link.name));
        }
    }
    for alias in &config.alias {
        if alias.alias_type == AliasType::Services && alias.services_server.is_none() {
            errors.push(format!(
                "services alias '{}' needs services_server",
                alias.name
            ));
        }
    }
    if config.listen.iter().any(|l| l.tls) && config.tls.is_none() {
        errors.push("a TLS listener is configured but [tls] is missing".to_string());
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_valid() {
        let config = Config::for_testing();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn validation_collects_everything() {
        let mut config = Config::for_testing();
        config.server.sid = "XYZ".to_string();
        config.security.cloak_key = "short".to_string();
        config.allow[0].class = "nope".to_string();
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn throttle_parsing() {
        let mut config = Config::for_testing();
        config.server.throttle = "3:60".to_string();
        assert_eq!(config.throttle_policy(), Some((3, 60)));
        config.server.throttle = String::new();
        assert_eq!(config.throttle_policy(), None);
    }

    #[test]
    fn parses_minimal_toml() {
        let raw = r#"
            [server]
            name = "hub.weft.example"
            sid = "042"
            network = "WeftNet"
            info = "example hub"

            [security]
            cloak_key = "0123456789abcdef0123"

            [[class]]
            name = "clients"

            [[allow]]
            mask = ["*@*"]
            class = "clients"

            [[listen]]
            addr = "127.0.0.1"
            port = 6667
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.server.sid, "042");
        assert_eq!(config.limits.max_modes_per_line, 12);
        assert!(validate(&config).is_ok());
    }
}
