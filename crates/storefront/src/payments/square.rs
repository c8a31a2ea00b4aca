//! Square Payments API client.

use std::fmt;
use std::str::FromStr;

use gi_foundation_core::{CurrencyCode, PaymentStatus};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{ChargeRequest, PaymentError, PaymentGateway, PaymentReceipt};
use crate::config::SquareConfig;

/// Square API version pinned for every request.
pub const SQUARE_VERSION: &str = "2023-10-18";

/// Square environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SquareEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl SquareEnvironment {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }

    /// REST API origin.
    #[must_use]
    pub const fn api_base_url(self) -> &'static str {
        match self {
            Self::Sandbox => "https://connect.squareupsandbox.com",
            Self::Production => "https://connect.squareup.com",
        }
    }

    /// Web Payments SDK script.
    #[must_use]
    pub const fn sdk_url(self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.web.squarecdn.com/v1/square.js",
            Self::Production => "https://web.squarecdn.com/v1/square.js",
        }
    }
}

impl fmt::Display for SquareEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SquareEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "production" => Ok(Self::Production),
            other => Err(format!("expected sandbox or production, got {other:?}")),
        }
    }
}

/// Error body returned by Square.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Square `Payment` fields the storefront reads.
#[derive(Debug, Deserialize)]
pub struct SquarePayment {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub amount_money: Option<Money>,
}

/// Square `Money`.
#[derive(Debug, Clone, Deserialize)]
pub struct Money {
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Square Payments API client.
#[derive(Clone)]
pub struct SquareClient {
    client: reqwest::Client,
    base_url: String,
    location_id: String,
}

impl fmt::Debug for SquareClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SquareClient")
            .field("base_url", &self.base_url)
            .field("location_id", &self.location_id)
            .finish_non_exhaustive()
    }
}

impl SquareClient {
    /// Create a new Square client.
    ///
    /// # Errors
    ///
    /// Returns error if the access token is not a valid header value or the
    /// HTTP client fails to build.
    pub fn new(config: &SquareConfig) -> Result<Self, PaymentError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Bearer {}", config.access_token.expose_secret());
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&auth_value)
                .map_err(|e| PaymentError::Parse(format!("Invalid access token format: {e}")))?,
        );
        headers.insert("Square-Version", HeaderValue::from_static(SQUARE_VERSION));
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            location_id: config.location_id.clone(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn payment_body(&self, request: &ChargeRequest) -> Value {
        let mut body = json!({
            "source_id": request.token,
            "idempotency_key": request.idempotency_key,
            "amount_money": {
                "amount": request.amount_minor,
                "currency": CurrencyCode::USD.code(),
            },
            "location_id": self.location_id,
        });
        if let Some(email) = &request.buyer_email {
            body["buyer_email_address"] = json!(email);
        }
        if let Some(note) = &request.note {
            body["note"] = json!(note);
        }
        body
    }
}

impl PaymentGateway for SquareClient {
    async fn charge(&self, request: ChargeRequest) -> Result<PaymentReceipt, PaymentError> {
        let url = format!("{}/v2/payments", self.base_url);
        let body = self.payment_body(&request);

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), &text));
        }

        parse_payment_response(&text)
    }
}

/// Turn a non-2xx body into an error, keeping the first `detail` verbatim.
fn error_from_body(status: u16, body: &str) -> PaymentError {
    let parsed: Option<ErrorResponse> = serde_json::from_str(body).ok();
    let first = parsed.and_then(|r| r.errors.into_iter().next());
    match first {
        Some(ApiError {
            detail: Some(detail),
            ..
        }) if !detail.trim().is_empty() => PaymentError::Declined(detail),
        Some(ApiError {
            code: Some(code), ..
        }) => PaymentError::Api {
            status,
            message: code,
        },
        _ => PaymentError::Api {
            status,
            message: body.chars().take(200).collect(),
        },
    }
}

/// Parse a `{ "payment": { ... } }` success body.
fn parse_payment_response(body: &str) -> Result<PaymentReceipt, PaymentError> {
    let mut value: Value =
        serde_json::from_str(body).map_err(|e| PaymentError::Parse(e.to_string()))?;
    let raw = value
        .get_mut("payment")
        .map(Value::take)
        .ok_or_else(|| PaymentError::Parse("response has no payment".to_string()))?;
    let payment: SquarePayment =
        serde_json::from_value(raw.clone()).map_err(|e| PaymentError::Parse(e.to_string()))?;

    Ok(PaymentReceipt {
        payment_id: payment.id,
        status: PaymentStatus::from_processor(&payment.status),
        amount_minor: payment.amount_money.map(|m| m.amount),
        raw,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn config() -> SquareConfig {
        SquareConfig {
            environment: SquareEnvironment::Sandbox,
            app_id: "sandbox-sq0idb-test".to_string(),
            access_token: SecretString::from("EAAAtest-token"),
            location_id: "LOC123".to_string(),
            api_base_url: "https://connect.squareupsandbox.com/".to_string(),
            webhook_signature_key: None,
            webhook_url: None,
        }
    }

    #[test]
    fn test_environment_urls() {
        assert_eq!(
            SquareEnvironment::Production.api_base_url(),
            "https://connect.squareup.com"
        );
        assert!(SquareEnvironment::Sandbox.sdk_url().contains("sandbox.web.squarecdn.com"));
        assert_eq!("Production".parse::<SquareEnvironment>().unwrap(), SquareEnvironment::Production);
        assert!("staging".parse::<SquareEnvironment>().is_err());
    }

    #[test]
    fn test_payment_body() {
        let client = SquareClient::new(&config()).unwrap();
        assert_eq!(client.base_url(), "https://connect.squareupsandbox.com");

        let mut request = ChargeRequest::relay("cnon:card-nonce-ok", 2550);
        request.buyer_email = Some("ada@example.org".to_string());
        let body = client.payment_body(&request);

        assert_eq!(body["source_id"], "cnon:card-nonce-ok");
        assert_eq!(body["amount_money"]["amount"], 2550);
        assert_eq!(body["amount_money"]["currency"], "USD");
        assert_eq!(body["location_id"], "LOC123");
        assert_eq!(body["buyer_email_address"], "ada@example.org");
        assert!(body.get("note").is_none());
    }

    #[test]
    fn test_error_detail_passed_through() {
        let body = r#"{"errors":[{"category":"PAYMENT_METHOD_ERROR","code":"CVV_FAILURE","detail":"Authorization error: 'CVV_FAILURE'"}]}"#;
        let err = error_from_body(400, body);
        assert!(matches!(err, PaymentError::Declined(ref d) if d == "Authorization error: 'CVV_FAILURE'"));

        let err = error_from_body(401, r#"{"errors":[{"code":"UNAUTHORIZED"}]}"#);
        assert!(matches!(err, PaymentError::Api { status: 401, ref message } if message == "UNAUTHORIZED"));

        let err = error_from_body(502, "Bad Gateway");
        assert!(matches!(err, PaymentError::Api { status: 502, .. }));
    }

    #[test]
    fn test_parse_payment_response() {
        let body = r#"{"payment":{"id":"pay_1","status":"COMPLETED","amount_money":{"amount":1500,"currency":"USD"}}}"#;
        let receipt = parse_payment_response(body).unwrap();
        assert_eq!(receipt.payment_id, "pay_1");
        assert_eq!(receipt.status, PaymentStatus::Completed);
        assert_eq!(receipt.amount_minor, Some(1500));
        assert_eq!(receipt.raw["id"], "pay_1");

        assert!(parse_payment_response("{}").is_err());
    }
}
