use std::fmt;
use std::net::IpAddr;

use axum::http::HeaderMap;
use common::access::AllowRule;
use common::prelude::PolicyError;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// The address a request is attributed to, as seen by the handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub Option<IpAddr>);

impl fmt::Display for ClientIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ip) => write!(f, "{}", ip),
            None => f.write_str("unknown"),
        }
    }
}

/// Works out the client address from the TCP peer and, for trusted
/// proxies only, the forwarding headers.
#[derive(Debug, Clone, Default)]
pub struct ClientIpResolver {
    trusted: Vec<AllowRule>,
}

impl ClientIpResolver {
    pub fn new(trusted_proxies: &[String]) -> Result<Self, PolicyError> {
        let trusted = trusted_proxies
            .iter()
            .map(|entry| entry.parse::<AllowRule>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { trusted })
    }

    fn is_trusted(&self, addr: &IpAddr) -> bool {
        self.trusted.iter().any(|rule| rule.contains(addr))
    }

    pub fn resolve(&self, peer: Option<IpAddr>, headers: &HeaderMap) -> Option<IpAddr> {
        let peer = peer?;
        if !self.is_trusted(&peer) {
            return Some(peer);
        }

        if let Some(ip) = self.from_forwarded_for(headers) {
            return Some(ip);
        }

        headers
            .get(X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .or(Some(peer))
    }

    /// Walk `X-Forwarded-For` from the nearest hop outwards, skipping our own
    /// proxies. If every hop is trusted the furthest one is the client.
    fn from_forwarded_for(&self, headers: &HeaderMap) -> Option<IpAddr> {
        let hops = headers
            .get_all(X_FORWARDED_FOR)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
            .collect::<Vec<_>>();

        let mut furthest = None;
        for hop in hops.iter().rev() {
            let ip = hop.parse::<IpAddr>().ok()?;
            if !self.is_trusted(&ip) {
                return Some(ip);
            }
            furthest = Some(ip);
        }
        furthest
    }
}
