//! Host cloaking.
//!
//! The cloak is derived from the real host (or IP) and the network-wide
//! cloak key: the SHA-512 hex digest of `host ++ key` is split into 32-char
//! thirds and each third's CRC-32 is rendered as bare lowercase hex. For a
//! dotted-quad the cloak is `c1.c2.c3.IP`; for a hostname the leading one
//! or two labels are stripped up to the first alphabetic label and the
//! result is `[prefix-]c1.c2.rest`. Identical (host, key) pairs cloak
//! identically on every server that shares the key.

use sha2::{Digest, Sha512};

fn crc_hex(segment: &str) -> String {
    format!("{:x}", crc32fast::hash(segment.as_bytes()))
}

fn is_dotted_quad(host: &str) -> bool {
    !host.is_empty() && host.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Compute the cloaked form of a host.
///
/// `host` is the real hostname when one resolved, otherwise the IP.
/// Hosts that embed their IP (`static`, `.ip-`) fall back to cloaking the
/// raw IP so renumbering the reverse zone cannot change the cloak.
pub fn cloak_host(host: &str, ip: &str, key: &str, prefix: Option<&str>) -> String {
    let mut host = host;
    if host.contains("static") || host.contains(".ip-") {
        host = ip;
    }

    let digest = Sha512::digest(format!("{}{}", host, key).as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();

    let c1 = crc_hex(&hex[0..32]);
    let c2 = crc_hex(&hex[32..64]);

    if is_dotted_quad(host) {
        let c3 = crc_hex(&hex[64..96]);
        return format!("{}.{}.{}.IP", c1, c2, c3);
    }

    // Strip leading labels until the first alphabetic one, keeping at
    // least one stripped and never exposing the full host.
    let labels: Vec<&str> = host.split('.').collect();
    let mut cut = 0;
    for label in &labels {
        cut += 1;
        if label.replace('-', "").chars().all(|c| c.is_ascii_alphabetic())
            && !label.is_empty()
        {
            break;
        }
    }
    if cut == 1 {
        cut += 1;
    }
    let rest = labels
        .get(cut - 1..)
        .map(|tail| tail.join("."))
        .unwrap_or_default();

    let prefix = prefix.map(|p| format!("{}-", p)).unwrap_or_default();
    let cloaked = format!("{}{}.{}.{}", prefix, c1, c2, rest);
    cloaked.trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "test-cloak-key-0123456789";

    #[test]
    fn deterministic_per_host_and_key() {
        let a = cloak_host("1.2.3.4", "1.2.3.4", KEY, None);
        let b = cloak_host("1.2.3.4", "1.2.3.4", KEY, None);
        assert_eq!(a, b);
        assert_ne!(a, cloak_host("1.2.3.4", "1.2.3.4", "another-key-xyz", None));
        assert_ne!(a, cloak_host("1.2.3.5", "1.2.3.5", KEY, None));
    }

    #[test]
    fn ip_cloak_shape() {
        let cloak = cloak_host("1.2.3.4", "1.2.3.4", KEY, None);
        let parts: Vec<&str> = cloak.split('.').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[3], "IP");
        for part in &parts[..3] {
            assert!(part.chars().all(|c| c.is_ascii_hexdigit()));
            assert!(!part.is_empty());
        }
    }

    #[test]
    fn hostname_keeps_domain_tail() {
        let cloak = cloak_host("dsl-77-1.provider.example", "77.0.0.1", KEY, None);
        assert!(cloak.ends_with(".provider.example"));
        let hashed = cloak.trim_end_matches(".provider.example");
        assert_eq!(hashed.split('.').count(), 2);
    }

    #[test]
    fn prefix_is_applied() {
        let cloak = cloak_host("host.provider.example", "10.0.0.1", KEY, Some("weft"));
        assert!(cloak.starts_with("weft-"));
    }

    #[test]
    fn static_hosts_cloak_the_ip() {
        let via_host = cloak_host("static-9-8-7-6.isp.example", "6.7.8.9", KEY, None);
        let via_ip = cloak_host("6.7.8.9", "6.7.8.9", KEY, None);
        assert_eq!(via_host, via_ip);
    }
}
