//! AWS origin-IP validation against the published ip-ranges document.
//!
//! The document is fetched once and cached for 24 hours. A fetch or parse
//! failure allows the request through (fail open) with a warning - this
//! check backs up the shared secret and the SNS signature rather than
//! replacing them.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::cache::TtlCache;

/// Where AWS publishes its IP ranges.
pub const IP_RANGES_URL: &str = "https://ip-ranges.amazonaws.com/ip-ranges.json";

/// Cache lifetime for the parsed ranges.
pub const RANGES_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Service filter that matches every published range.
pub const SERVICE_ANY: &str = "AMAZON";

#[derive(Debug, Deserialize)]
struct RangesDocument {
    #[serde(default)]
    prefixes: Vec<Ipv4Prefix>,
    #[serde(default)]
    ipv6_prefixes: Vec<Ipv6Prefix>,
}

#[derive(Debug, Deserialize)]
struct Ipv4Prefix {
    ip_prefix: String,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    region: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Ipv6Prefix {
    ipv6_prefix: String,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    region: Option<String>,
}

/// A parsed IPv4 CIDR range.
#[derive(Debug, Clone)]
pub struct Ipv4Range {
    pub subnet: u32,
    pub prefix_len: u8,
    pub service: String,
    pub region: String,
}

/// A parsed IPv6 CIDR range.
#[derive(Debug, Clone)]
pub struct Ipv6Range {
    pub subnet: [u8; 16],
    pub prefix_len: u8,
    pub service: String,
    pub region: String,
}

/// The AWS IP-range set, keyed by address family.
#[derive(Debug, Clone, Default)]
pub struct IpRanges {
    pub ipv4: Vec<Ipv4Range>,
    pub ipv6: Vec<Ipv6Range>,
}

impl IpRanges {
    /// Parse the raw ip-ranges document, skipping malformed CIDR entries.
    fn from_document(doc: RangesDocument) -> Self {
        let mut ranges = IpRanges::default();

        for prefix in doc.prefixes {
            let Some((subnet, prefix_len)) = parse_ipv4_cidr(&prefix.ip_prefix) else {
                debug!(cidr = %prefix.ip_prefix, "aws_ip_range_skipped");
                continue;
            };
            ranges.ipv4.push(Ipv4Range {
                subnet,
                prefix_len,
                service: prefix.service.unwrap_or_else(|| SERVICE_ANY.to_string()),
                region: prefix.region.unwrap_or_else(|| "GLOBAL".to_string()),
            });
        }

        for prefix in doc.ipv6_prefixes {
            let Some((subnet, prefix_len)) = parse_ipv6_cidr(&prefix.ipv6_prefix) else {
                debug!(cidr = %prefix.ipv6_prefix, "aws_ip_range_skipped");
                continue;
            };
            ranges.ipv6.push(Ipv6Range {
                subnet,
                prefix_len,
                service: prefix.service.unwrap_or_else(|| SERVICE_ANY.to_string()),
                region: prefix.region.unwrap_or_else(|| "GLOBAL".to_string()),
            });
        }

        ranges
    }
}

fn parse_ipv4_cidr(cidr: &str) -> Option<(u32, u8)> {
    let (addr, len) = cidr.split_once('/')?;
    let subnet: std::net::Ipv4Addr = addr.parse().ok()?;
    let prefix_len: u8 = len.parse().ok()?;
    if prefix_len > 32 {
        return None;
    }
    Some((u32::from(subnet), prefix_len))
}

fn parse_ipv6_cidr(cidr: &str) -> Option<([u8; 16], u8)> {
    let (addr, len) = cidr.split_once('/')?;
    let subnet: std::net::Ipv6Addr = addr.parse().ok()?;
    let prefix_len: u8 = len.parse().ok()?;
    if prefix_len > 128 {
        return None;
    }
    Some((subnet.octets(), prefix_len))
}

fn ipv4_mask(prefix_len: u8) -> u32 {
    u32::MAX
        .checked_shl(32 - u32::from(prefix_len))
        .unwrap_or(0)
}

fn ipv4_in_range(ip: u32, range: &Ipv4Range) -> bool {
    let mask = ipv4_mask(range.prefix_len);
    (ip & mask) == (range.subnet & mask)
}

fn ipv6_in_range(ip: &[u8; 16], range: &Ipv6Range) -> bool {
    let full_bytes = usize::from(range.prefix_len / 8);
    let remainder = range.prefix_len % 8;

    if ip[..full_bytes] != range.subnet[..full_bytes] {
        return false;
    }

    if remainder > 0 {
        let mask = 0xffu8 << (8 - remainder);
        if (ip[full_bytes] & mask) != (range.subnet[full_bytes] & mask) {
            return false;
        }
    }

    true
}

/// Checks source-IP membership in AWS's published ranges.
pub struct AwsIpValidator {
    http: reqwest::Client,
    ranges_url: String,
    cache: TtlCache<(), Arc<IpRanges>>,
}

impl AwsIpValidator {
    pub fn new(http: reqwest::Client, ranges_url: String) -> Self {
        Self::with_cache(http, ranges_url, TtlCache::new(RANGES_CACHE_TTL))
    }

    /// Construct with an injected cache; tests pre-seed it to avoid the
    /// network entirely.
    pub fn with_cache(
        http: reqwest::Client,
        ranges_url: String,
        cache: TtlCache<(), Arc<IpRanges>>,
    ) -> Self {
        Self {
            http,
            ranges_url,
            cache,
        }
    }

    /// Whether `ip` belongs to any published AWS range.
    pub async fn is_aws_ip(&self, ip: IpAddr) -> bool {
        self.is_aws_ip_for_service(ip, SERVICE_ANY).await
    }

    /// Whether `ip` belongs to a published range for the given service.
    /// The `AMAZON` filter matches any range regardless of declared service.
    ///
    /// Fails open: if the range set cannot be loaded, the request is allowed.
    pub async fn is_aws_ip_for_service(&self, ip: IpAddr, service: &str) -> bool {
        let Some(ranges) = self.ranges().await else {
            warn!(ip = %ip, "aws_ip_ranges_unavailable");
            return true;
        };

        let matched = match ip {
            IpAddr::V4(v4) => {
                let ip_bits = u32::from(v4);
                ranges
                    .ipv4
                    .iter()
                    .filter(|r| service == SERVICE_ANY || r.service == service)
                    .any(|r| ipv4_in_range(ip_bits, r))
            }
            IpAddr::V6(v6) => {
                let octets = v6.octets();
                ranges
                    .ipv6
                    .iter()
                    .filter(|r| service == SERVICE_ANY || r.service == service)
                    .any(|r| ipv6_in_range(&octets, r))
            }
        };

        if !matched {
            warn!(ip = %ip, service = service, "aws_ip_not_in_ranges");
        }

        matched
    }

    async fn ranges(&self) -> Option<Arc<IpRanges>> {
        if let Some(cached) = self.cache.get(&()) {
            return Some(cached);
        }

        let response = match self.http.get(&self.ranges_url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, url = %self.ranges_url, "aws_ip_ranges_fetch_failed");
                return None;
            }
        };

        let doc: RangesDocument = match response.json().await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "aws_ip_ranges_parse_failed");
                return None;
            }
        };

        let ranges = Arc::new(IpRanges::from_document(doc));
        debug!(
            ipv4_ranges = ranges.ipv4.len(),
            ipv6_ranges = ranges.ipv6.len(),
            "aws_ip_ranges_loaded"
        );

        self.cache.insert((), ranges.clone());
        Some(ranges)
    }

    /// Drop the cached range set, forcing a refetch on the next check.
    pub fn clear_cache(&self) {
        self.cache.remove(&());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn seeded_validator(ranges: IpRanges) -> AwsIpValidator {
        let cache = TtlCache::new(RANGES_CACHE_TTL);
        cache.insert((), Arc::new(ranges));
        AwsIpValidator::with_cache(
            reqwest::Client::new(),
            "http://127.0.0.1:1/unreachable".to_string(),
            cache,
        )
    }

    fn v4_range(cidr: &str, service: &str) -> Ipv4Range {
        let (subnet, prefix_len) = parse_ipv4_cidr(cidr).unwrap();
        Ipv4Range {
            subnet,
            prefix_len,
            service: service.to_string(),
            region: "us-east-1".to_string(),
        }
    }

    fn v6_range(cidr: &str, service: &str) -> Ipv6Range {
        let (subnet, prefix_len) = parse_ipv6_cidr(cidr).unwrap();
        Ipv6Range {
            subnet,
            prefix_len,
            service: service.to_string(),
            region: "us-east-1".to_string(),
        }
    }

    #[test]
    fn test_parse_ipv4_cidr() {
        assert!(parse_ipv4_cidr("52.94.0.0/16").is_some());
        assert!(parse_ipv4_cidr("52.94.0.0/33").is_none());
        assert!(parse_ipv4_cidr("not-an-ip/16").is_none());
        assert!(parse_ipv4_cidr("52.94.0.0").is_none());
    }

    #[test]
    fn test_ipv4_mask_edge_cases() {
        assert_eq!(ipv4_mask(0), 0);
        assert_eq!(ipv4_mask(16), 0xffff_0000);
        assert_eq!(ipv4_mask(32), u32::MAX);
    }

    #[tokio::test]
    async fn test_ipv4_inside_range() {
        let validator = seeded_validator(IpRanges {
            ipv4: vec![v4_range("52.94.0.0/16", "AMAZON")],
            ipv6: vec![],
        });

        let inside = IpAddr::V4(Ipv4Addr::new(52, 94, 12, 34));
        assert!(validator.is_aws_ip(inside).await);
    }

    #[tokio::test]
    async fn test_ipv4_one_bit_outside_mask() {
        let validator = seeded_validator(IpRanges {
            ipv4: vec![v4_range("52.94.0.0/16", "AMAZON")],
            ipv6: vec![],
        });

        // 52.95.0.0 differs from 52.94.0.0 in the last masked bit.
        let outside = IpAddr::V4(Ipv4Addr::new(52, 95, 0, 0));
        assert!(!validator.is_aws_ip(outside).await);
    }

    #[tokio::test]
    async fn test_ipv6_partial_byte_masking() {
        let validator = seeded_validator(IpRanges {
            ipv4: vec![],
            ipv6: vec![v6_range("2600:1f00::/27", "AMAZON")],
        });

        // 2600:1f1f:: shares the first 27 bits with 2600:1f00::.
        let inside: Ipv6Addr = "2600:1f1f::1".parse().unwrap();
        assert!(validator.is_aws_ip(IpAddr::V6(inside)).await);

        // 2600:1f20:: flips a bit inside the 27-bit prefix.
        let outside: Ipv6Addr = "2600:1f20::1".parse().unwrap();
        assert!(!validator.is_aws_ip(IpAddr::V6(outside)).await);
    }

    #[tokio::test]
    async fn test_service_filter() {
        let validator = seeded_validator(IpRanges {
            ipv4: vec![
                v4_range("52.94.0.0/16", "EC2"),
                v4_range("54.240.0.0/18", "S3"),
            ],
            ipv6: vec![],
        });

        let ec2_ip = IpAddr::V4(Ipv4Addr::new(52, 94, 1, 1));

        // AMAZON matches any declared service.
        assert!(validator.is_aws_ip(ec2_ip).await);
        assert!(validator.is_aws_ip_for_service(ec2_ip, "EC2").await);
        // An explicit filter requires exact service match.
        assert!(!validator.is_aws_ip_for_service(ec2_ip, "S3").await);
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_open() {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap();
        let validator = AwsIpValidator::new(http, "http://127.0.0.1:1/unreachable".to_string());

        // No ranges available: any IP is allowed.
        let ip = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7));
        assert!(validator.is_aws_ip(ip).await);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let validator = seeded_validator(IpRanges {
            ipv4: vec![v4_range("52.94.0.0/16", "AMAZON")],
            ipv6: vec![],
        });

        let outside = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7));
        assert!(!validator.is_aws_ip(outside).await);

        // With the cache cleared the refetch fails and the check fails open.
        validator.clear_cache();
        assert!(validator.is_aws_ip(outside).await);
    }

    #[test]
    fn test_document_parsing_skips_malformed_entries() {
        let doc: RangesDocument = serde_json::from_str(
            r#"{
                "prefixes": [
                    {"ip_prefix": "52.94.0.0/16", "service": "AMAZON", "region": "us-east-1"},
                    {"ip_prefix": "garbage", "service": "AMAZON"}
                ],
                "ipv6_prefixes": [
                    {"ipv6_prefix": "2600:1f00::/27", "service": "AMAZON", "region": "us-east-1"}
                ]
            }"#,
        )
        .unwrap();

        let ranges = IpRanges::from_document(doc);
        assert_eq!(ranges.ipv4.len(), 1);
        assert_eq!(ranges.ipv6.len(), 1);
    }
}
