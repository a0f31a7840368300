use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct VerifyTokenRequest {
    #[serde(default)]
    pub token: Option<String>,
}

/// Body of both access endpoints.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AccessResponse {
    pub fn granted(email: String, is_admin: Option<bool>) -> Self {
        Self {
            valid: true,
            email: Some(email),
            is_admin,
            error: None,
        }
    }

    pub fn denied(error: Option<String>) -> Self {
        Self {
            valid: false,
            error,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

impl LoginResponse {
    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub url: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

// Stripe webhook payloads

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
}

impl CheckoutSessionObject {
    /// `customer_details.email`, falling back to `customer_email`.
    pub fn buyer_email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
            .or(self.customer_email.as_deref())
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    #[serde(default)]
    pub last_payment_error: Option<PaymentError>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentError {
    #[serde(default)]
    pub message: Option<String>,
}

pub mod stripe_event_type {
    pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
    pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
    pub const PAYMENT_INTENT_PAYMENT_FAILED: &str = "payment_intent.payment_failed";
}

// Strategy report produced by the generator

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StrategyReport {
    pub website_analysis: WebsiteAnalysis,
    pub subreddits: Vec<SubredditRecommendation>,
    pub reddit_post: RedditPost,
    pub realistic_estimates: RealisticEstimates,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteAnalysis {
    pub core_problem: String,
    pub target_audience: String,
    pub maturity_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub enum ModerationRisk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubredditRecommendation {
    pub name: String,
    /// 1 to 5. Any JSON number is accepted and rounded into range.
    #[serde(deserialize_with = "relevance_score_from_number")]
    pub relevance_score: u8,
    pub moderation_risk: ModerationRisk,
    pub recommended_angle: String,
    pub explanation: String,
}

fn relevance_score_from_number<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let score = f64::deserialize(deserializer)?;
    Ok(score.round().clamp(1.0, 5.0) as u8)
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct RedditPost {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RealisticEstimates {
    pub clicks_range: String,
    pub comments_range: String,
    pub worth_it: bool,
    pub warning: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buyer_email_prefers_customer_details() {
        let session: CheckoutSessionObject = serde_json::from_value(serde_json::json!({
            "id": "cs_test_1",
            "customer": null,
            "customer_email": "fallback@example.com",
            "customer_details": { "email": "Buyer@Example.com" }
        }))
        .unwrap();
        assert_eq!(session.buyer_email(), Some("Buyer@Example.com"));
        assert_eq!(session.customer, None);
    }

    #[test]
    fn buyer_email_falls_back_and_rejects_blank() {
        let session: CheckoutSessionObject = serde_json::from_value(serde_json::json!({
            "id": "cs_test_2",
            "customer_email": "fallback@example.com",
            "customer_details": { "email": null }
        }))
        .unwrap();
        assert_eq!(session.buyer_email(), Some("fallback@example.com"));

        let blank: CheckoutSessionObject = serde_json::from_value(serde_json::json!({
            "id": "cs_test_3",
            "customer_details": { "email": "  " }
        }))
        .unwrap();
        assert_eq!(blank.buyer_email(), None);
    }

    #[test]
    fn access_response_omits_absent_fields() {
        let body = serde_json::to_value(AccessResponse::denied(None)).unwrap();
        assert_eq!(body, serde_json::json!({ "valid": false }));

        let body = serde_json::to_value(AccessResponse::granted("a@b.c".into(), Some(true))).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "valid": true, "email": "a@b.c", "isAdmin": true })
        );
    }
}
