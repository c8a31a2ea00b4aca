//! Rate limiting middleware using governor and `tower_governor`.
//!
//! - `payment_rate_limiter`: strict limits for checkout submission and the
//!   charge relay (~10/min)
//! - `cart_rate_limiter`: relaxed limits for cart and checkout fragments
//!   (~100/min)

use std::net::IpAddr;
use std::sync::Arc;

use axum::http::Request;
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

/// Headers carrying the real client IP behind Fly.io or Cloudflare, in the
/// order they are trusted.
const CLIENT_IP_HEADERS: [&str; 3] = ["fly-client-ip", "cf-connecting-ip", "x-real-ip"];

/// Key extractor reading the client IP from proxy headers.
#[derive(Clone, Copy, Debug)]
pub struct ClientIpKeyExtractor;

impl ClientIpKeyExtractor {
    fn client_ip(headers: &axum::http::HeaderMap) -> Option<IpAddr> {
        let header_ip = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        };

        CLIENT_IP_HEADERS
            .into_iter()
            .find_map(header_ip)
            .or_else(|| {
                // First hop of X-Forwarded-For
                headers
                    .get("x-forwarded-for")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.split(',').next())
                    .and_then(|s| s.trim().parse::<IpAddr>().ok())
            })
    }
}

impl tower_governor::key_extractor::KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        Self::client_ip(req.headers()).ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Create rate limiter for payment endpoints: ~10 requests per minute per IP.
///
/// Configuration: 1 request every 6 seconds (replenish), burst of 5.
///
/// # Panics
///
/// This function will not panic. `per_second(6)` and `burst_size(5)` are
/// always accepted by `GovernorConfigBuilder`.
#[must_use]
pub fn payment_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor)
        .per_second(6)
        .burst_size(5)
        .finish()
        .expect("rate limiter config with per_second(6) and burst_size(5) is valid");
    GovernorLayer::new(Arc::new(config))
}

/// Create rate limiter for cart endpoints: ~100 requests per minute per IP.
///
/// Configuration: 1 request per second (replenish), burst of 50. Donation
/// inputs post on every keystroke, so the burst is generous.
///
/// # Panics
///
/// This function will not panic. `per_second(1)` and `burst_size(50)` are
/// always accepted by `GovernorConfigBuilder`.
#[must_use]
pub fn cart_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor)
        .per_second(1)
        .burst_size(50)
        .finish()
        .expect("rate limiter config with per_second(1) and burst_size(50) is valid");
    GovernorLayer::new(Arc::new(config))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderMap;

    use super::*;

    #[test]
    fn test_client_ip_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(
            ClientIpKeyExtractor::client_ip(&headers),
            Some("203.0.113.7".parse().unwrap())
        );

        headers.insert("fly-client-ip", "198.51.100.2".parse().unwrap());
        assert_eq!(
            ClientIpKeyExtractor::client_ip(&headers),
            Some("198.51.100.2".parse().unwrap())
        );

        assert_eq!(ClientIpKeyExtractor::client_ip(&HeaderMap::new()), None);
    }
}
