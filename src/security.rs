use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr};

use tracing::warn;
use url::{Host, Url};

use crate::ProxyError;

/// Which targets the proxy is willing to fetch.
#[derive(Debug, Clone)]
pub struct TargetPolicyConfig {
    /// Schemes accepted as fetch targets (default: http, https)
    pub allowed_schemes: HashSet<String>,
    /// Refuse localhost and private/reserved IP literals (default: true)
    pub block_private_hosts: bool,
    /// Refused domains; subdomains are refused too
    pub blocked_domains: HashSet<String>,
}

impl Default for TargetPolicyConfig {
    fn default() -> Self {
        Self {
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            block_private_hosts: true,
            blocked_domains: HashSet::new(),
        }
    }
}

/// Validates decoded proxy targets before any network call.
#[derive(Debug, Clone)]
pub struct TargetPolicy {
    config: TargetPolicyConfig,
}

impl TargetPolicy {
    pub fn new(config: TargetPolicyConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::new(TargetPolicyConfig::default())
    }

    /// Parses `target` and checks it against the policy.
    ///
    /// Unparsable targets and disallowed schemes are
    /// [`ProxyError::InvalidTargetUrl`]; hosts refused by policy are
    /// [`ProxyError::TargetBlocked`].
    pub fn validate(&self, target: &str) -> Result<Url, ProxyError> {
        let url =
            Url::parse(target).map_err(|_| ProxyError::InvalidTargetUrl(target.to_string()))?;

        if !self.config.allowed_schemes.contains(url.scheme()) {
            return Err(ProxyError::InvalidTargetUrl(target.to_string()));
        }

        let host = url
            .host()
            .ok_or_else(|| ProxyError::InvalidTargetUrl(target.to_string()))?;

        let refused = match &host {
            Host::Domain(domain) => {
                self.is_domain_blocked(domain)
                    || (self.config.block_private_hosts && is_localhost(domain))
            }
            Host::Ipv4(ip) => self.config.block_private_hosts && is_private_v4(ip),
            Host::Ipv6(ip) => self.config.block_private_hosts && is_private_v6(ip),
        };

        if refused {
            warn!(target = %url, "Target refused by policy");
            return Err(ProxyError::TargetBlocked(host.to_string()));
        }

        Ok(url)
    }

    fn is_domain_blocked(&self, domain: &str) -> bool {
        self.config
            .blocked_domains
            .iter()
            .any(|blocked| domain == blocked || domain.ends_with(&format!(".{blocked}")))
    }
}

fn is_localhost(domain: &str) -> bool {
    domain == "localhost" || domain.ends_with(".localhost")
}

fn is_private_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || a == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (b & 0b1100_0000) == 0b0100_0000)
        // 224.0.0.0/4 multicast and 240.0.0.0/4 reserved
        || a >= 224
}

fn is_private_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_v4(&v4);
    }
    ip.is_loopback()
        || ip.is_unspecified()
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
}
