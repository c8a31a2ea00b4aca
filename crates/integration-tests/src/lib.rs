//! Integration test harness for the GI Associates Foundation storefront.
//!
//! Tests drive the full [`app`](gi_foundation_storefront::app) router with
//! `tower::ServiceExt::oneshot`, so no listener or network is involved. Each
//! [`TestApp`] owns a temp directory holding its catalog and transaction log,
//! and carries the session cookie between requests like a browser would.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p gi-foundation-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_store` - Cart store, validation and persistence
//! - `checkout_flow` - Checkout state machine with a fake payment gateway
//! - `http_routes` - Routes, fragments, session and webhook handling

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode, header},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use gi_foundation_core::DonationPolicy;
use gi_foundation_storefront::config::{ManualPaymentConfig, SquareConfig, StorefrontConfig};
use gi_foundation_storefront::payments::SquareEnvironment;
use gi_foundation_storefront::state::AppState;
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde_json::Value;
use sha2::Sha256;
use tempfile::TempDir;
use tower::ServiceExt;

/// Webhook signature key configured for every test app.
pub const WEBHOOK_KEY: &str = "whk_test_9f3Kq2Lm8Xv4Rt7Z";

/// Notification URL configured for every test app.
pub const WEBHOOK_URL: &str = "https://donate.test/api/payments/webhook";

/// Address sent in `X-Forwarded-For` so the rate limiters can key requests.
pub const CLIENT_IP: &str = "203.0.113.7";

/// A small catalog covering priced, unpriced and optioned products.
pub const SAMPLE_CATALOG: &str = r#"{
  "products": [
    {
      "id": "hope-tee",
      "title": "Hope T-Shirt",
      "description": "Soft cotton tee.",
      "image": "/images/hope-tee.jpg",
      "price": "25.00",
      "category": "apparel",
      "tags": ["cotton"],
      "featured": true,
      "options": [
        { "name": "Size", "values": [ { "label": "M" }, { "label": "XL", "price_delta": "2.00" } ] }
      ]
    },
    {
      "id": "awareness-bracelet",
      "title": "Awareness Bracelet",
      "price": "15.00",
      "category": "accessories",
      "featured": true
    },
    {
      "id": "general-donation",
      "title": "General Donation",
      "category": "sponsorships"
    }
  ]
}"#;

/// Build a configuration rooted in `dir`.
///
/// Square points at a closed local port, so any real charge fails fast.
#[must_use]
pub fn test_config(dir: &Path) -> StorefrontConfig {
    StorefrontConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        base_url: "http://localhost:3000".to_string(),
        catalog_path: dir.join("products.json"),
        data_dir: dir.join("logs"),
        donation: DonationPolicy::default(),
        square: SquareConfig {
            environment: SquareEnvironment::Sandbox,
            app_id: "sandbox-sq0idb-test".to_string(),
            access_token: SecretString::from("EAAAl7Qp2VxN4mZr8KsT1wYb6HcJ3dFg".to_string()),
            location_id: "LTEST123".to_string(),
            api_base_url: "http://127.0.0.1:9".to_string(),
            webhook_signature_key: Some(SecretString::from(WEBHOOK_KEY.to_string())),
            webhook_url: Some(WEBHOOK_URL.to_string()),
        },
        manual_payments: ManualPaymentConfig {
            cashapp_handle: Some("$GIFoundation".to_string()),
            zelle_email: Some("give@gifoundation.test".to_string()),
            zelle_phone: None,
        },
        email: None,
        admin_email: None,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// Base64 HMAC-SHA256 over the notification URL and body.
#[must_use]
pub fn sign_webhook(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_KEY.as_bytes()).unwrap();
    mac.update(WEBHOOK_URL.as_bytes());
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// A buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    /// The `HX-Trigger` header parsed as JSON, or `Null` when absent.
    #[must_use]
    pub fn triggers(&self) -> Value {
        self.headers
            .get("hx-trigger")
            .map(|v| serde_json::from_slice(v.as_bytes()).unwrap())
            .unwrap_or(Value::Null)
    }

    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// One browser visiting one storefront instance.
pub struct TestApp {
    router: Router,
    state: AppState,
    cookie: Option<String>,
    dir: TempDir,
}

impl TestApp {
    /// App with [`SAMPLE_CATALOG`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_catalog(Some(SAMPLE_CATALOG))
    }

    /// App with the given catalog file contents, or no catalog file at all.
    #[must_use]
    pub fn with_catalog(catalog: Option<&str>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        if let Some(catalog) = catalog {
            std::fs::write(dir.path().join("products.json"), catalog).unwrap();
        }
        let state = AppState::new(test_config(dir.path())).unwrap();
        Self {
            router: gi_foundation_storefront::app(state.clone()),
            state,
            cookie: None,
            dir,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Forget the session cookie, as a new browser would.
    pub fn new_visitor(&mut self) {
        self.cookie = None;
    }

    pub async fn get(&mut self, path: &str) -> TestResponse {
        let request = self.request("GET", path).body(Body::empty()).unwrap();
        self.send(request).await
    }

    pub async fn post_form(&mut self, path: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let request = self
            .request("POST", path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("hx-request", "true")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_json(&mut self, path: &str, body: &Value) -> TestResponse {
        let request = self
            .request("POST", path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// POST a raw body with extra headers.
    pub async fn post_raw(
        &mut self,
        path: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> TestResponse {
        let mut builder = self
            .request("POST", path)
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    fn request(&self, method: &str, path: &str) -> axum::http::request::Builder {
        let builder = Request::builder()
            .method(method)
            .uri(path)
            .header("x-forwarded-for", CLIENT_IP);
        match &self.cookie {
            Some(cookie) => builder.header(header::COOKIE, cookie),
            None => builder,
        }
    }

    async fn send(&mut self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();

        if let Some(cookie) = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
        {
            self.cookie = Some(cookie.to_string());
        }

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        TestResponse {
            status,
            headers,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
