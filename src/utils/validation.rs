/// Validation utilities for wizard input
use regex::Regex;
use std::sync::LazyLock;

static IPV4_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").ok());

static CIDR_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^([0-9.]+)/(\d{1,2})$").ok());

static URL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^https?://([A-Za-z0-9.-]+)(:[0-9]{1,5})?(/\S*)?$").ok());

/// Validates if a string is a valid SSH public key in OpenSSH format
pub fn is_valid_ssh_public_key(key: &str) -> bool {
    let trimmed = key.trim();

    // Empty keys are considered valid (optional field)
    if trimmed.is_empty() {
        return true;
    }

    // One key per line only
    if trimmed.contains('\n') {
        return false;
    }

    let valid_algorithms = [
        "ssh-rsa",
        "ssh-dss",
        "ssh-ed25519",
        "ecdsa-sha2-nistp256",
        "ecdsa-sha2-nistp384",
        "ecdsa-sha2-nistp521",
    ];

    // Algorithm, key data and an optional comment
    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.len() < 2 {
        return false;
    }

    if !valid_algorithms.contains(&parts[0]) {
        return false;
    }

    // The key data should be base64 encoded and reasonably long
    let key_data = parts[1];
    if key_data.len() < 50 {
        return false;
    }

    key_data
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
}

/// Dotted-quad IPv4 address
pub fn is_valid_ipv4(address: &str) -> bool {
    let Some(re) = IPV4_RE.as_ref() else {
        return false;
    };

    match re.captures(address.trim()) {
        Some(captures) => (1..=4).all(|i| {
            captures
                .get(i)
                .and_then(|octet| octet.as_str().parse::<u8>().ok())
                .is_some()
        }),
        None => false,
    }
}

/// IPv4 address with a prefix length, e.g. "192.168.1.50/24"
pub fn is_valid_ipv4_cidr(value: &str) -> bool {
    let Some(re) = CIDR_RE.as_ref() else {
        return false;
    };

    let Some(captures) = re.captures(value.trim()) else {
        return false;
    };

    let address_ok = captures.get(1).is_some_and(|m| is_valid_ipv4(m.as_str()));
    let prefix_ok = captures
        .get(2)
        .and_then(|m| m.as_str().parse::<u8>().ok())
        .is_some_and(|prefix| prefix <= 32);
    address_ok && prefix_ok
}

/// Comma-separated list of at least one IPv4 resolver
pub fn is_valid_dns_list(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return false;
    }
    trimmed.split(',').all(|server| is_valid_ipv4(server))
}

/// Master URL: http(s) with a host and optional port and path
pub fn is_valid_url(url: &str) -> bool {
    let Some(re) = URL_RE.as_ref() else {
        return false;
    };

    let Some(captures) = re.captures(url.trim()) else {
        return false;
    };

    let host = captures.get(1).map(|m| m.as_str()).unwrap_or("");
    if host.is_empty() || host.starts_with('.') || host.ends_with('.') {
        return false;
    }

    // If port is specified, validate it
    match captures.get(2) {
        Some(port) => port.as_str()[1..]
            .parse::<u16>()
            .is_ok_and(|port| port > 0),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ssh_keys() {
        assert!(is_valid_ssh_public_key(""));
        assert!(is_valid_ssh_public_key(
            "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABgQC7vbqajDhA3+oF8tP1oFqZ"
        ));
        assert!(is_valid_ssh_public_key(
            "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIG4rT3vTt99Ox5kndS4HmgTrKBT8SKzhK4rhGkEVGlCI user@example.com"
        ));
    }

    #[test]
    fn test_invalid_ssh_keys() {
        assert!(!is_valid_ssh_public_key("invalid-key"));
        assert!(!is_valid_ssh_public_key("ssh-rsa"));
        assert!(!is_valid_ssh_public_key("ssh-rsa short"));
        assert!(!is_valid_ssh_public_key(
            "invalid-algo AAAAB3NzaC1yc2EAAAADAQABAAABgQC7vbqajDhA3+oF8tP1oFqZ"
        ));
    }

    #[test]
    fn test_ipv4() {
        assert!(is_valid_ipv4("192.168.1.1"));
        assert!(is_valid_ipv4(" 10.0.0.254 "));
        assert!(!is_valid_ipv4("256.1.1.1"));
        assert!(!is_valid_ipv4("1.2.3"));
        assert!(!is_valid_ipv4("a.b.c.d"));
    }

    #[test]
    fn test_ipv4_cidr() {
        assert!(is_valid_ipv4_cidr("192.168.1.50/24"));
        assert!(is_valid_ipv4_cidr("10.0.0.1/32"));
        assert!(!is_valid_ipv4_cidr("192.168.1.50"));
        assert!(!is_valid_ipv4_cidr("192.168.1.50/33"));
        assert!(!is_valid_ipv4_cidr("300.168.1.50/24"));
    }

    #[test]
    fn test_dns_list() {
        assert!(is_valid_dns_list("1.1.1.1"));
        assert!(is_valid_dns_list("1.1.1.1,8.8.8.8"));
        assert!(is_valid_dns_list("1.1.1.1, 8.8.8.8"));
        assert!(!is_valid_dns_list(""));
        assert!(!is_valid_dns_list("1.1.1.1,"));
        assert!(!is_valid_dns_list("dns.example.com"));
    }

    #[test]
    fn test_valid_urls() {
        assert!(is_valid_url("https://master.local:8443"));
        assert!(is_valid_url("http://10.0.0.2:6443/join"));
        assert!(is_valid_url("https://master"));
    }

    #[test]
    fn test_invalid_urls() {
        assert!(!is_valid_url(""));
        assert!(!is_valid_url("not-a-url"));
        assert!(!is_valid_url("ftp://example.com"));
        assert!(!is_valid_url("https://"));
        assert!(!is_valid_url("http://no spaces allowed.com"));
        assert!(!is_valid_url("https://master:0"));
        assert!(!is_valid_url("https://master:99999"));
    }
}
