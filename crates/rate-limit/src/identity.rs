use std::net::IpAddr;

use http::HeaderMap;
use sha2::{Digest, Sha256};

/// Length of the hex fingerprint prefix embedded in identity keys.
pub const FINGERPRINT_LEN: usize = 16;

const UNKNOWN_ADDRESS: &str = "unknown";

/// Derives the per-client key attempts are counted under.
///
/// The key combines the client address with a truncated SHA-256 of
/// `"{address}:{user_agent}"`, so distinct agents behind one address are
/// tracked separately without the raw user agent ever being stored.
#[derive(Debug, Clone, Copy)]
pub struct IdentityResolver {
    trust_forwarded_headers: bool,
}

impl IdentityResolver {
    pub fn new(trust_forwarded_headers: bool) -> Self {
        Self {
            trust_forwarded_headers,
        }
    }

    /// Compute the identity key for a request.
    pub fn resolve(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> String {
        let address = self.client_address(headers, peer);
        let user_agent = header_str(headers, "user-agent").unwrap_or("");
        identity_key(&address, user_agent)
    }

    /// Resolve the originating address: `X-Forwarded-For` (first hop), then
    /// `X-Real-IP`, then the transport peer, then `"unknown"`.
    ///
    /// Header values that do not parse as an IP address are skipped. Accepted
    /// addresses are returned in canonical form.
    pub fn client_address(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> String {
        if self.trust_forwarded_headers {
            let forwarded = header_str(headers, "x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .and_then(parse_ip);
            let real_ip = || header_str(headers, "x-real-ip").and_then(parse_ip);

            if let Some(ip) = forwarded.or_else(real_ip) {
                return ip.to_string();
            }
        }

        peer.map(|ip| ip.to_string())
            .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Build `auth_{address}_{fingerprint}` for an address / user-agent pair.
pub fn identity_key(address: &str, user_agent: &str) -> String {
    format!("auth_{}_{}", address, fingerprint(address, user_agent))
}

/// First [`FINGERPRINT_LEN`] hex characters of SHA-256(`"{address}:{user_agent}"`).
pub fn fingerprint(address: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", address, user_agent).as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    digest
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    value.trim().parse().ok()
}
