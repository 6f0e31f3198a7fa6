//! Oracle endpoint validation
//!
//! Classifier and generation URLs come from configuration and are called with
//! prompt text attached, so they are checked for scheme and for hosts that
//! point back into the deployment (loopback, private ranges, cloud metadata).

use std::net::IpAddr;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("{role} endpoint is not a valid URL: {source}")]
    InvalidUrl {
        role: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("{role} endpoint uses scheme '{scheme}', only https is permitted")]
    InvalidScheme { role: &'static str, scheme: String },

    #[error("{role} endpoint host '{host}' is not allowed: {reason}")]
    BlockedHost {
        role: &'static str,
        host: String,
        reason: &'static str,
    },

    #[error("{role} endpoint has no host")]
    MissingHost { role: &'static str },
}

/// Hostnames that resolve inside the deployment or to metadata services
const INTERNAL_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "ip6-localhost",
    "ip6-loopback",
    "metadata.google.internal",
    "metadata.goog",
    "169.254.169.254",
    "fd00:ec2::254",
];

/// What an endpoint is allowed to look like
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointPolicy {
    pub allow_http: bool,
    pub allow_loopback: bool,
    pub allow_private_ips: bool,
    /// When set, the host must equal or be a subdomain of one of these
    pub allowed_domains: Option<Vec<String>>,
}

impl EndpointPolicy {
    /// Production defaults: https only, public hosts only
    pub fn strict() -> Self {
        Self::default()
    }

    /// Local development: plain http and local model servers allowed
    pub fn relaxed() -> Self {
        Self {
            allow_http: true,
            allow_loopback: true,
            allow_private_ips: true,
            allowed_domains: None,
        }
    }

    pub fn for_insecure(allow_insecure: bool) -> Self {
        if allow_insecure {
            Self::relaxed()
        } else {
            Self::strict()
        }
    }

    /// Parse and check `endpoint`, naming it `role` in errors
    pub fn check(&self, role: &'static str, endpoint: &str) -> Result<Url, EndpointError> {
        let url = Url::parse(endpoint).map_err(|source| EndpointError::InvalidUrl { role, source })?;

        match url.scheme() {
            "https" => {}
            "http" if self.allow_http => {}
            scheme => {
                return Err(EndpointError::InvalidScheme {
                    role,
                    scheme: scheme.to_string(),
                })
            }
        }

        let host = url.host_str().ok_or(EndpointError::MissingHost { role })?;
        let host_lower = host.trim_start_matches('[').trim_end_matches(']').to_lowercase();
        let blocked = |reason| EndpointError::BlockedHost {
            role,
            host: host.to_string(),
            reason,
        };

        if !self.allow_loopback && is_internal_hostname(&host_lower) {
            return Err(blocked("internal hostname"));
        }

        if let Ok(ip) = host_lower.parse::<IpAddr>() {
            if let Some(reason) = self.ip_block_reason(&ip) {
                return Err(blocked(reason));
            }
        }

        if let Some(domains) = &self.allowed_domains {
            if !domains.iter().any(|d| domain_matches(&host_lower, &d.to_lowercase())) {
                return Err(blocked("not in the allowed domains list"));
            }
        }

        Ok(url)
    }

    fn ip_block_reason(&self, ip: &IpAddr) -> Option<&'static str> {
        if is_link_local(ip) {
            // Metadata services live here; never relaxed.
            return Some("link-local address");
        }
        if !self.allow_loopback && ip.is_loopback() {
            return Some("loopback address");
        }
        if !self.allow_private_ips && is_private_ip(ip) {
            return Some("private address");
        }
        None
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain || host.strip_suffix(domain).is_some_and(|rest| rest.ends_with('.'))
}

fn is_internal_hostname(host: &str) -> bool {
    INTERNAL_HOSTNAMES.iter().any(|blocked| domain_matches(host, blocked))
}

/// RFC 1918, carrier-grade NAT, 0.0.0.0/8 and IPv6 unique-local
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            v4.is_private() || (a == 100 && (b & 0xC0) == 64) || a == 0
        }
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

fn is_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}
