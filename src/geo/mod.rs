//! IP geolocation with private-address fallback.
//!
//! Location lookups go to ip-api.com and are best-effort: every failure
//! path collapses to ("Unknown", "Unknown") so geolocation can never sink
//! an analysis run. The resolver sits behind a trait so tests drive the
//! fallback logic with a deterministic fake.

use std::cell::Cell;
use std::net::IpAddr;
use std::thread;
use std::time::Duration;

use color_eyre::eyre::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

const UNKNOWN: &str = "Unknown";

/// Maps an IP to (country, city). Implementations must be total.
pub trait GeoResolver {
    fn lookup(&self, ip: IpAddr) -> (String, String);
}

/// Errors internal to the HTTP resolver; swallowed at the trait boundary.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geolocation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geolocation lookup returned status {0:?}")]
    Failed(String),
}

#[derive(Debug, Deserialize)]
struct IpApiReply {
    #[serde(default)]
    status: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    city: String,
}

/// Blocking client for ip-api.com with built-in request pacing.
///
/// The free tier rate-limits by the minute, so the resolver sleeps for
/// `pause` after every `pause_every` lookups. The whole pipeline is
/// single-threaded by design; blocking here is intentional.
pub struct IpApiResolver {
    client: reqwest::blocking::Client,
    base_url: String,
    lookups: Cell<u32>,
    pause_every: u32,
    pause: Duration,
}

impl IpApiResolver {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build geolocation HTTP client")?;
        Ok(Self {
            client,
            base_url: "http://ip-api.com".to_string(),
            lookups: Cell::new(0),
            // ip-api.com free tier allows 45 req/min; stay under it.
            pause_every: 35,
            pause: Duration::from_secs(70),
        })
    }

    #[cfg(test)]
    fn with_pacing(mut self, pause_every: u32, pause: Duration) -> Self {
        self.pause_every = pause_every;
        self.pause = pause;
        self
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn query(&self, ip: IpAddr) -> std::result::Result<(String, String), GeoError> {
        let url = format!("{}/json/{}", self.base_url, ip);
        let reply: IpApiReply = self.client.get(&url).send()?.json()?;
        if reply.status == "success" {
            Ok((reply.country, reply.city))
        } else {
            Err(GeoError::Failed(reply.status))
        }
    }
}

impl GeoResolver for IpApiResolver {
    fn lookup(&self, ip: IpAddr) -> (String, String) {
        let count = self.lookups.get() + 1;
        self.lookups.set(count);
        if self.pause_every > 0 && count % self.pause_every == 0 {
            log::info!(
                "pausing {}s after {} geolocation lookups",
                self.pause.as_secs(),
                count
            );
            thread::sleep(self.pause);
        }

        match self.query(ip) {
            Ok(location) => location,
            Err(err) => {
                log::warn!("geolocation of {} failed: {}", ip, err);
                (UNKNOWN.to_string(), UNKNOWN.to_string())
            }
        }
    }
}

/// Resolver that never looks anything up; used by `--skip-geo` runs.
pub struct NullResolver;

impl GeoResolver for NullResolver {
    fn lookup(&self, _ip: IpAddr) -> (String, String) {
        (UNKNOWN.to_string(), UNKNOWN.to_string())
    }
}

/// Whether an address is globally routable enough to geolocate.
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            !(v4.is_loopback()
                || v4.is_unspecified()
                || v4.is_link_local()
                || v4.is_multicast()
                // RFC 1918 private ranges
                || octets[0] == 10
                || (octets[0] == 172 && (16..=31).contains(&octets[1]))
                || (octets[0] == 192 && octets[1] == 168))
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            !(v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                // fc00::/7 unique local, fe80::/10 link local
                || segments[0] & 0xfe00 == 0xfc00
                || segments[0] & 0xffc0 == 0xfe80)
        }
    }
}

/// Extract the IP component of a multiaddress like "/ip4/1.2.3.4/tcp/9000".
/// DNS and other non-literal addresses yield None.
pub fn multiaddr_ip(addr: &str) -> Option<IpAddr> {
    let mut parts = addr.split('/').filter(|p| !p.is_empty());
    match parts.next() {
        Some("ip4") | Some("ip6") => parts.next()?.parse().ok(),
        _ => None,
    }
}

/// Decide a peer's (country, city).
///
/// A peer whose reported IP is public and whose reported country is
/// non-empty keeps the crawler-reported values. Otherwise the advertised
/// multiaddrs are scanned in order and the first public IP is geolocated;
/// peers with no public address at all are ("Unknown", "Unknown").
pub fn resolve_peer_location(
    resolver: &dyn GeoResolver,
    ip: &str,
    reported: (&str, &str),
    addrs: &[String],
) -> (String, String) {
    let public = ip
        .parse::<IpAddr>()
        .map(is_public_ip)
        .unwrap_or(false);

    if public && !reported.0.is_empty() {
        return (reported.0.to_string(), reported.1.to_string());
    }

    for addr in addrs {
        if let Some(candidate) = multiaddr_ip(addr) {
            if is_public_ip(candidate) {
                log::debug!("resolving {} via advertised address {}", ip, candidate);
                return resolver.lookup(candidate);
            }
        }
    }

    (UNKNOWN.to_string(), UNKNOWN.to_string())
}
