use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use url::{Host, Url};

use crate::error::ErrorKind;

/// Hostnames that are never fetched: loopback spellings and cloud metadata
/// endpoints.
const BLOCKED_HOSTS: &[&str] = &[
    "localhost",
    "127.0.0.1",
    "0.0.0.0",
    "::1",
    "::",
    "metadata.google.internal",
    "metadata.goog",
    "169.254.169.254",
    "100.100.100.200",
    "fd00:ec2::254",
];

/// Hostname suffixes reserved for internal networks.
const BLOCKED_SUFFIXES: &[&str] = &[".local", ".internal", ".localhost"];

/// Errors that can occur during URL validation.
///
/// These cover both parsing failures and the SSRF policy.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    Parse(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
    /// The host is on the block-list or uses an internal suffix.
    #[error("Host not allowed: {0}")]
    BlockedHost(String),
    /// The host is a private, loopback or link-local IP literal.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
}

impl UrlValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UrlValidationError::Parse(_)
            | UrlValidationError::UnsupportedScheme(_)
            | UrlValidationError::MissingHost => ErrorKind::InvalidUrl,
            UrlValidationError::BlockedHost(_) | UrlValidationError::PrivateIp(_) => {
                ErrorKind::BlockedUrl
            }
        }
    }
}

/// Decides whether a URL may be fetched by the proxy.
///
/// Only literal IPs and hostname patterns are checked. Hostnames are NOT
/// resolved, so a public name pointing at a private address passes.
#[derive(Debug, Clone)]
pub struct UrlSafetyValidator {
    blocked_hosts: HashSet<String>,
}

impl Default for UrlSafetyValidator {
    fn default() -> Self {
        Self::with_extra_hosts(std::iter::empty::<&str>())
    }
}

impl UrlSafetyValidator {
    /// Builds a validator that also blocks the given hostnames.
    pub fn with_extra_hosts<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let blocked_hosts = BLOCKED_HOSTS
            .iter()
            .map(|h| (*h).to_owned())
            .chain(extra.into_iter().map(|h| normalize_host(h.as_ref())))
            .collect();
        Self { blocked_hosts }
    }

    /// Validates a URL string for an outbound fetch.
    ///
    /// # Errors
    ///
    /// Returns [`UrlValidationError`] if:
    /// - The URL cannot be parsed or has no host (`InvalidUrl`)
    /// - The scheme is not `http` or `https` (`InvalidUrl`)
    /// - The host is block-listed or ends in `.local`, `.internal` or
    ///   `.localhost` (`BlockedUrl`)
    /// - The host is a private IPv4/IPv6 literal (`BlockedUrl`)
    ///
    /// # Examples
    ///
    /// ```
    /// use feedgate::util::UrlSafetyValidator;
    ///
    /// let validator = UrlSafetyValidator::default();
    /// assert!(validator.validate("https://example.com/feed.xml").is_ok());
    /// assert!(validator.validate("http://192.168.1.1/feed").is_err());
    /// assert!(validator.validate("http://printer.local/").is_err());
    /// ```
    pub fn validate(&self, url_str: &str) -> Result<Url, UrlValidationError> {
        let url = Url::parse(url_str)?;
        self.check(&url)?;
        Ok(url)
    }

    /// Same as [`validate`](Self::validate) for an already-parsed URL.
    pub fn check(&self, url: &Url) -> Result<(), UrlValidationError> {
        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
        }

        match url.host() {
            None => Err(UrlValidationError::MissingHost),
            Some(Host::Domain(domain)) => self.check_domain(domain),
            Some(Host::Ipv4(ip)) => {
                self.check_listed(&ip.to_string())?;
                if is_private_ipv4(ip) {
                    return Err(UrlValidationError::PrivateIp(ip.to_string()));
                }
                Ok(())
            }
            Some(Host::Ipv6(ip)) => {
                self.check_listed(&ip.to_string())?;
                if is_private_ipv6(ip) {
                    return Err(UrlValidationError::PrivateIp(ip.to_string()));
                }
                Ok(())
            }
        }
    }

    fn check_domain(&self, domain: &str) -> Result<(), UrlValidationError> {
        let host = normalize_host(domain);
        self.check_listed(&host)?;
        if BLOCKED_SUFFIXES.iter().any(|suffix| host.ends_with(suffix)) {
            return Err(UrlValidationError::BlockedHost(host));
        }
        Ok(())
    }

    fn check_listed(&self, host: &str) -> Result<(), UrlValidationError> {
        if self.blocked_hosts.contains(host) {
            return Err(UrlValidationError::BlockedHost(host.to_owned()));
        }
        Ok(())
    }
}

/// Lowercases and drops a single trailing dot (`localhost.` is `localhost`).
fn normalize_host(host: &str) -> String {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.strip_suffix('.').unwrap_or(host).to_ascii_lowercase()
}

fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, _, _] = ip.octets();
    a == 10
        || (a == 172 && (16..=31).contains(&b))
        || (a == 192 && b == 168)
        || a == 127
        || (a == 169 && b == 254)
        || a == 0
}

fn is_private_ipv6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_ipv4(v4);
    }
    let segments = ip.segments();
    // Unique Local (fc00::/7)
    let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
    // Link-Local (fe80::/10)
    let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
    is_unique_local || is_link_local
}
