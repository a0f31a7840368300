//! Stripe integration: webhook signature verification and Checkout Session creation.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing timestamp in signature header")]
    MissingTimestamp,

    #[error("missing v1 signature in signature header")]
    MissingSignature,

    #[error("malformed signature header")]
    Malformed,

    #[error("timestamp outside the tolerance window")]
    TimestampOutOfTolerance,

    #[error("no signature matches the payload")]
    Mismatch,
}

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`) against the raw body.
///
/// The signed payload is `"{t}.{body}"`, HMAC-SHA256 keyed with the endpoint secret. `now` is
/// unix seconds; any timestamp further than `tolerance_secs` from it is refused.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        let (key, value) = part.trim().split_once('=').ok_or(SignatureError::Malformed)?;
        match key {
            "t" => timestamp = Some(value),
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(SignatureError::MissingSignature);
    }

    let signed_at: i64 = timestamp.parse().map_err(|_| SignatureError::Malformed)?;
    if now.abs_diff(signed_at) > tolerance_secs.unsigned_abs() {
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionCreated {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: Option<String>,
    price_id: Option<String>,
    webhook_secret: String,
    tolerance_secs: i64,
}

impl StripeClient {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        secret_key: Option<String>,
        price_id: Option<String>,
        webhook_secret: impl Into<String>,
        tolerance_secs: i64,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            secret_key,
            price_id,
            webhook_secret: webhook_secret.into(),
            tolerance_secs,
        }
    }

    pub fn verify_webhook_signature(&self, payload: &[u8], header: &str) -> Result<(), SignatureError> {
        verify_signature(
            &self.webhook_secret,
            payload,
            header,
            self.tolerance_secs,
            chrono::Utc::now().timestamp(),
        )
    }

    /// Creates a one-time-payment Checkout Session and returns its hosted URL.
    pub async fn create_checkout_session(&self, public_base_url: &str) -> AppResult<String> {
        let secret_key = self
            .secret_key
            .as_deref()
            .ok_or(AppError::NotConfigured("Stripe"))?;
        let price_id = self
            .price_id
            .as_deref()
            .ok_or(AppError::NotConfigured("Stripe price"))?;

        let base = public_base_url.trim_end_matches('/');
        let success_url = format!("{base}/success?session_id={{CHECKOUT_SESSION_ID}}");
        let cancel_url = format!("{base}/pricing");

        let res = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base.trim_end_matches('/')))
            .bearer_auth(secret_key)
            .form(&[
                ("mode", "payment"),
                ("payment_method_types[0]", "card"),
                ("line_items[0][price]", price_id),
                ("line_items[0][quantity]", "1"),
                ("success_url", success_url.as_str()),
                ("cancel_url", cancel_url.as_str()),
            ])
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let message = res
                .json::<StripeErrorEnvelope>()
                .await
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Stripe checkout creation failed ({status}): {message}"
            )));
        }

        let session: CheckoutSessionCreated = res.json().await?;
        session
            .url
            .ok_or_else(|| AppError::Upstream("Stripe returned a session without url".into()))
    }
}
