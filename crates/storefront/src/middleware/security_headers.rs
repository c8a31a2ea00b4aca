//! Security headers middleware for XSS, clickjacking, and isolation protection.
//!
//! Adds restrictive security headers to all responses. The policy is locked
//! down except for what the Square Web Payments SDK needs: its script and
//! iframe origins and the PCI endpoint the card widget posts to.

use axum::{
    extract::Request,
    http::{
        HeaderName, HeaderValue,
        header::{
            CACHE_CONTROL, CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS,
            X_FRAME_OPTIONS,
        },
    },
    middleware::Next,
    response::Response,
};

use super::CspNonce;

/// Origins serving the Square SDK script and card iframes.
const SQUARE_SCRIPT_ORIGINS: &str = "https://web.squarecdn.com https://sandbox.web.squarecdn.com";

/// Origins the card widget talks to.
const SQUARE_CONNECT_ORIGINS: &str = "https://pci-connect.squareup.com \
     https://pci-connect.squareupsandbox.com \
     https://connect.squareup.com \
     https://connect.squareupsandbox.com";

/// Build the `Content-Security-Policy` value.
///
/// ```text
/// default-src 'none';
/// script-src 'self' 'nonce-…' <square sdk>;
/// style-src 'self' 'unsafe-inline';
/// font-src 'self' <square sdk>;
/// img-src 'self' data: https:;
/// connect-src 'self' <square pci + api>;
/// frame-src <square sdk>;
/// object-src 'none';
/// base-uri 'self';
/// form-action 'self';
/// frame-ancestors 'none'
/// ```
#[must_use]
pub fn content_security_policy(nonce: Option<&CspNonce>) -> String {
    let nonce = nonce.and_then(CspNonce::source).map(|s| format!(" {s}")).unwrap_or_default();
    format!(
        "default-src 'none'; \
         script-src 'self'{nonce} {SQUARE_SCRIPT_ORIGINS}; \
         style-src 'self' 'unsafe-inline'; \
         font-src 'self' {SQUARE_SCRIPT_ORIGINS}; \
         img-src 'self' data: https:; \
         connect-src 'self' {SQUARE_CONNECT_ORIGINS}; \
         frame-src {SQUARE_SCRIPT_ORIGINS}; \
         object-src 'none'; \
         base-uri 'self'; \
         form-action 'self'; \
         frame-ancestors 'none'"
    )
}

/// Add security headers to all responses.
///
/// Headers applied:
/// - `X-Frame-Options: DENY`
/// - `X-Content-Type-Options: nosniff`
/// - `Referrer-Policy: strict-origin-when-cross-origin` (Square checks the origin)
/// - `Content-Security-Policy` from [`content_security_policy`]
/// - `Permissions-Policy` denying sensors and media, allowing `payment` for self
/// - `Cache-Control: no-store` unless the handler set one
/// - `Cross-Origin-Opener-Policy: same-origin-allow-popups` for 3-D Secure
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let policy = content_security_policy(response.extensions().get::<CspNonce>());
    let headers = response.headers_mut();

    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(
        REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    if let Ok(value) = HeaderValue::from_str(&policy) {
        headers.insert(CONTENT_SECURITY_POLICY, value);
    }

    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static(
            "accelerometer=(), \
             camera=(), \
             display-capture=(), \
             geolocation=(), \
             gyroscope=(), \
             magnetometer=(), \
             microphone=(), \
             payment=(self), \
             usb=()",
        ),
    );

    // Cart and checkout fragments are per-session
    if !headers.contains_key(CACHE_CONTROL) {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store, max-age=0"));
    }

    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin-allow-popups"),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_includes_nonce_and_square() {
        let nonce = CspNonce("abc123".to_string());
        let policy = content_security_policy(Some(&nonce));
        assert!(policy.contains("script-src 'self' 'nonce-abc123' https://web.squarecdn.com"));
        assert!(policy.contains("https://pci-connect.squareup.com"));
        assert!(policy.contains("frame-ancestors 'none'"));
    }

    #[test]
    fn test_policy_without_nonce() {
        let policy = content_security_policy(None);
        assert!(policy.contains("script-src 'self' https://web.squarecdn.com"));
        assert!(!policy.contains("nonce"));
    }
}
