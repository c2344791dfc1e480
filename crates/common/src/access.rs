//! Request authorization.
//!
//! An [`AccessPolicy`] answers a single question for every inbound request:
//! may this client talk to us? A client is let in when its address falls
//! inside one of the configured ranges, or when it presents the shared secret
//! in its `Authorization` header. The policy is built once at startup and is
//! read-only afterwards, so it can be shared across request tasks without
//! locking.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// On-disk shape of the authorization config.
///
/// Field names are kept in their historical PascalCase form so existing
/// config files keep loading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// IP addresses or CIDR ranges that are always authorized
    #[serde(rename = "AuthorizedIPs", default)]
    pub authorized_ips: Vec<String>,
    /// Shared secret accepted in the `Authorization` header.
    /// An empty value disables token authorization.
    #[serde(rename = "AuthorizationHeader", default)]
    pub authorization_header: String,
}

impl AuthConfig {
    pub fn from_toml(source: &str) -> Result<Self, PolicyError> {
        Ok(toml::from_str(source)?)
    }
}

/// A single allowlist entry, always stored as a network range.
///
/// Plain addresses are widened to the narrowest range holding only that
/// host (`/32` for IPv4, `/128` for IPv6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllowRule(IpNet);

impl AllowRule {
    pub fn new(net: IpNet) -> Self {
        Self(net.trunc())
    }

    pub fn host(addr: IpAddr) -> Self {
        Self(IpNet::from(canonical(addr)))
    }

    pub fn network(&self) -> &IpNet {
        &self.0
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.0.contains(&canonical(*addr))
    }
}

impl FromStr for AllowRule {
    type Err = PolicyError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let trimmed = entry.trim();
        let invalid = || PolicyError::InvalidEntry(entry.to_string());

        if trimmed.contains('/') {
            let net = trimmed.parse::<IpNet>().map_err(|_| invalid())?;
            Ok(Self::new(net))
        } else {
            let addr = trimmed.parse::<IpAddr>().map_err(|_| invalid())?;
            Ok(Self::host(addr))
        }
    }
}

impl fmt::Display for AllowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The authorization strategy consulted by the request pipeline.
pub trait Authorize: Send + Sync {
    /// Decide whether a client at `client_ip` presenting `header` may proceed.
    ///
    /// `client_ip` is `None` when the transport could not tell us who is
    /// connecting; such a client can only get in with the shared secret.
    fn authorize(&self, client_ip: Option<IpAddr>, header: Option<&str>) -> bool;

    /// String form of [`Authorize::authorize`]. Unparsable addresses match
    /// no range.
    fn is_authorized(&self, client_ip: &str, header: Option<&str>) -> bool {
        self.authorize(client_ip.trim().parse().ok(), header)
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    rules: Vec<AllowRule>,
    secret: Option<String>,
}

impl AccessPolicy {
    /// Build a policy from its config. All-or-nothing: a single malformed
    /// entry fails the whole load.
    pub fn from_config(config: &AuthConfig) -> Result<Self, PolicyError> {
        let rules = config
            .authorized_ips
            .iter()
            .map(|entry| entry.parse::<AllowRule>())
            .collect::<Result<Vec<_>, _>>()?;

        let secret = if config.authorization_header.is_empty() {
            None
        } else {
            Some(config.authorization_header.clone())
        };

        Ok(Self { rules, secret })
    }

    pub fn from_toml(source: &str) -> Result<Self, PolicyError> {
        Self::from_config(&AuthConfig::from_toml(source)?)
    }

    pub fn rules(&self) -> &[AllowRule] {
        &self.rules
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    pub fn allows_ip(&self, addr: &IpAddr) -> bool {
        self.rules.iter().any(|rule| rule.contains(addr))
    }

    pub fn accepts_secret(&self, header: Option<&str>) -> bool {
        match (&self.secret, header) {
            (Some(secret), Some(presented)) => secret == presented,
            _ => false,
        }
    }
}

impl Authorize for AccessPolicy {
    fn authorize(&self, client_ip: Option<IpAddr>, header: Option<&str>) -> bool {
        client_ip.is_some_and(|ip| self.allows_ip(&ip)) || self.accepts_secret(header)
    }
}

// keep the secret out of logs
impl fmt::Debug for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPolicy")
            .field("rules", &self.rules)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// IPv4-mapped IPv6 addresses are matched as plain IPv4.
fn canonical(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("invalid authorized IP entry: {0:?}")]
    InvalidEntry(String),
    #[error("failed to parse auth config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read auth config: {0}")]
    Io(#[from] std::io::Error),
}
