//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `SQUARE_APP_ID` - Square application ID (public, used by the card widget)
//! - `SQUARE_ACCESS_TOKEN` - Square access token (high entropy)
//! - `SQUARE_LOCATION_ID` - Square location that receives payments
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_MIN_DONATION` - Minimum donation per item (default: 10.00)
//! - `STOREFRONT_MAX_DONATION` - Maximum donation per item (default and ceiling: 1000000)
//! - `STOREFRONT_CATALOG_PATH` - Product catalog JSON (default: crates/storefront/content/products.json)
//! - `STOREFRONT_DATA_DIR` - Transaction log directory (default: logs)
//! - `SQUARE_ENVIRONMENT` - `sandbox` or `production` (default: sandbox)
//! - `SQUARE_API_BASE_URL` - Override the Square API origin
//! - `SQUARE_WEBHOOK_SIGNATURE_KEY` - Webhook signature key; webhooks are rejected without it
//! - `SQUARE_WEBHOOK_URL` - Notification URL registered with Square (default: `<base>/api/payments/webhook`)
//! - `CASHAPP_HANDLE` - Cash App `$cashtag` shown for manual transfers
//! - `ZELLE_EMAIL` / `ZELLE_PHONE` - Zelle recipient shown for manual transfers
//! - `SMTP_HOST`, `SMTP_PORT` (default: 587), `SMTP_USERNAME`, `SMTP_PASSWORD`, `EMAIL_FROM` - E-mail delivery
//! - `ADMIN_EMAIL` - Receives new-payment notifications
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` / `SENTRY_TRACES_SAMPLE_RATE` - Sentry sampling (default: 1.0 / 0.1)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use gi_foundation_core::{DEFAULT_MIN_DONATION, DonationPolicy, MAX_DONATION, normalize_amount};
use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

use crate::payments::SquareEnvironment;
use crate::render::PaymentInstructions;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Product catalog file
    pub catalog_path: PathBuf,
    /// Root directory for transaction and order logs
    pub data_dir: PathBuf,
    /// Per-item donation minimum
    pub donation: DonationPolicy,
    /// Square payments configuration
    pub square: SquareConfig,
    /// Cash App / Zelle recipient details
    pub manual_payments: ManualPaymentConfig,
    /// SMTP settings; e-mail is disabled when absent
    pub email: Option<EmailConfig>,
    /// Recipient of admin notifications
    pub admin_email: Option<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 - 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate (0.0 - 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Square payments configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct SquareConfig {
    pub environment: SquareEnvironment,
    /// Application ID (safe to expose in browser)
    pub app_id: String,
    /// Access token (server-side only)
    pub access_token: SecretString,
    pub location_id: String,
    /// REST API origin, normally derived from `environment`
    pub api_base_url: String,
    pub webhook_signature_key: Option<SecretString>,
    /// URL Square posts notifications to, part of the signed payload
    pub webhook_url: Option<String>,
}

impl std::fmt::Debug for SquareConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SquareConfig")
            .field("environment", &self.environment)
            .field("app_id", &self.app_id)
            .field("access_token", &"[REDACTED]")
            .field("location_id", &self.location_id)
            .field("api_base_url", &self.api_base_url)
            .field(
                "webhook_signature_key",
                &self.webhook_signature_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}

/// Manual transfer recipients.
#[derive(Debug, Clone, Default)]
pub struct ManualPaymentConfig {
    pub cashapp_handle: Option<String>,
    pub zelle_email: Option<String>,
    pub zelle_phone: Option<String>,
}

/// SMTP configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("STOREFRONT_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_HOST".to_string(), e.to_string())
            })?;
        let port = get_env_or_default("STOREFRONT_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_PORT".to_string(), e.to_string())
            })?;
        let base_url = parse_base_url(&get_required_env("STOREFRONT_BASE_URL")?)?;
        let donation = DonationPolicy::new(parse_minimum(get_optional_env(
            "STOREFRONT_MIN_DONATION",
        ))?)
        .with_maximum(parse_maximum(get_optional_env("STOREFRONT_MAX_DONATION"))?);
        if donation.maximum < donation.minimum {
            return Err(ConfigError::InvalidEnvVar(
                "STOREFRONT_MAX_DONATION".to_string(),
                format!("must not be below the minimum of {}", donation.minimum_label()),
            ));
        }

        let square = SquareConfig::from_env(&base_url)?;
        let email = EmailConfig::from_env()?;

        Ok(Self {
            host,
            port,
            base_url,
            catalog_path: PathBuf::from(get_env_or_default(
                "STOREFRONT_CATALOG_PATH",
                "crates/storefront/content/products.json",
            )),
            data_dir: PathBuf::from(get_env_or_default("STOREFRONT_DATA_DIR", "logs")),
            donation,
            square,
            manual_payments: ManualPaymentConfig {
                cashapp_handle: get_optional_env("CASHAPP_HANDLE"),
                zelle_email: get_optional_env("ZELLE_EMAIL"),
                zelle_phone: get_optional_env("ZELLE_PHONE"),
            },
            email,
            admin_email: get_optional_env("ADMIN_EMAIL"),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: get_optional_env("SENTRY_SAMPLE_RATE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
            sentry_traces_sample_rate: get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.1),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` flag.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// Settings the checkout panel needs to render payment instructions.
    #[must_use]
    pub fn payment_instructions(&self) -> PaymentInstructions {
        PaymentInstructions {
            cashapp_handle: self.manual_payments.cashapp_handle.clone(),
            zelle_email: self.manual_payments.zelle_email.clone(),
            zelle_phone: self.manual_payments.zelle_phone.clone(),
            square_app_id: self.square.app_id.clone(),
            square_location_id: self.square.location_id.clone(),
            square_sdk_url: self.square.environment.sdk_url().to_string(),
        }
    }
}

impl SquareConfig {
    fn from_env(base_url: &str) -> Result<Self, ConfigError> {
        let environment = get_env_or_default("SQUARE_ENVIRONMENT", "sandbox")
            .parse::<SquareEnvironment>()
            .map_err(|e| ConfigError::InvalidEnvVar("SQUARE_ENVIRONMENT".to_string(), e))?;
        let api_base_url = match get_optional_env("SQUARE_API_BASE_URL") {
            Some(url) => parse_base_url(&url).map_err(|e| match e {
                ConfigError::InvalidEnvVar(_, msg) => {
                    ConfigError::InvalidEnvVar("SQUARE_API_BASE_URL".to_string(), msg)
                }
                other => other,
            })?,
            None => environment.api_base_url().to_string(),
        };

        Ok(Self {
            environment,
            app_id: get_required_env("SQUARE_APP_ID")?,
            access_token: get_validated_secret("SQUARE_ACCESS_TOKEN")?,
            location_id: get_required_env("SQUARE_LOCATION_ID")?,
            api_base_url,
            webhook_signature_key: get_optional_env("SQUARE_WEBHOOK_SIGNATURE_KEY")
                .map(SecretString::from),
            webhook_url: Some(
                get_optional_env("SQUARE_WEBHOOK_URL")
                    .unwrap_or_else(|| format!("{base_url}/api/payments/webhook")),
            ),
        })
    }
}

impl EmailConfig {
    /// SMTP settings, or `None` when `SMTP_HOST` is unset.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };
        let smtp_port = get_env_or_default("SMTP_PORT", "587")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SMTP_PORT".to_string(), e.to_string()))?;

        Ok(Some(Self {
            smtp_host,
            smtp_port,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_required_secret("SMTP_PASSWORD")?,
            from_address: get_required_env("EMAIL_FROM")?,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable. Blank values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Validate an absolute http(s) URL and strip the trailing slash.
fn parse_base_url(value: &str) -> Result<String, ConfigError> {
    let url = url::Url::parse(value.trim()).map_err(|e| {
        ConfigError::InvalidEnvVar("STOREFRONT_BASE_URL".to_string(), e.to_string())
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            "STOREFRONT_BASE_URL".to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Parse the per-item minimum, defaulting to $10.
fn parse_minimum(value: Option<String>) -> Result<Decimal, ConfigError> {
    let Some(raw) = value else {
        return Ok(DEFAULT_MIN_DONATION);
    };
    raw.trim()
        .parse::<Decimal>()
        .ok()
        .and_then(normalize_amount)
        .ok_or_else(|| {
            ConfigError::InvalidEnvVar(
                "STOREFRONT_MIN_DONATION".to_string(),
                format!("expected a positive amount, got '{raw}'"),
            )
        })
}

/// Parse the per-item maximum, defaulting to the hard ceiling.
fn parse_maximum(value: Option<String>) -> Result<Decimal, ConfigError> {
    let Some(raw) = value else {
        return Ok(MAX_DONATION);
    };
    raw.trim()
        .parse::<Decimal>()
        .ok()
        .and_then(normalize_amount)
        .ok_or_else(|| {
            ConfigError::InvalidEnvVar(
                "STOREFRONT_MAX_DONATION".to_string(),
                format!("expected a positive amount up to {MAX_DONATION}, got '{raw}'"),
            )
        })
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Real access tokens are long random strings
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the token issued by Square."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
