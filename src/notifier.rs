//! Delivery of access links by email.

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};

const RESEND_API_URL: &str = "https://api.resend.com/emails";
const ACCESS_EMAIL_SUBJECT: &str = "Your PostWithoutBan access";

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("email delivery is not configured")]
    NotConfigured,

    #[error("invalid access link base url: {0}")]
    InvalidBaseUrl(String),

    #[error("email provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("email provider rejected the message ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Provider receipt for a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailReceipt {
    pub message_id: Option<String>,
}

/// Sends the buyer a link that carries their access token.
///
/// Implementations never panic on provider failures; callers decide whether a failure is fatal.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_access_link(
        &self,
        to_address: &str,
        access_token: &str,
    ) -> Result<EmailReceipt, NotifyError>;
}

/// `<base>/access?token=<token>`
pub fn access_link(public_base_url: &str, access_token: &str) -> Result<Url, NotifyError> {
    let base =
        Url::parse(public_base_url).map_err(|e| NotifyError::InvalidBaseUrl(e.to_string()))?;
    let mut url = base
        .join("/access")
        .map_err(|e| NotifyError::InvalidBaseUrl(e.to_string()))?;
    url.query_pairs_mut().append_pair("token", access_token);
    Ok(url)
}

/// Used when no email provider key is configured: every send reports `NotConfigured`.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send_access_link(
        &self,
        _to_address: &str,
        _access_token: &str,
    ) -> Result<EmailReceipt, NotifyError> {
        Err(NotifyError::NotConfigured)
    }
}

#[derive(Debug, Serialize)]
struct ResendEmailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ResendEmailCreated {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResendErrorBody {
    message: Option<String>,
}

pub struct ResendNotifier {
    http: reqwest::Client,
    api_key: String,
    from: String,
    public_base_url: String,
}

impl ResendNotifier {
    pub fn new(
        http: reqwest::Client,
        api_key: impl Into<String>,
        from: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            from: from.into(),
            public_base_url: public_base_url.into(),
        }
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn send_access_link(
        &self,
        to_address: &str,
        access_token: &str,
    ) -> Result<EmailReceipt, NotifyError> {
        let link = access_link(&self.public_base_url, access_token)?;
        let body = ResendEmailBody {
            from: &self.from,
            to: [to_address],
            subject: ACCESS_EMAIL_SUBJECT,
            html: render_access_email_html(link.as_str()),
            text: render_access_email_text(link.as_str()),
        };

        let res = self
            .http
            .post(RESEND_API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let message = res
                .json::<ResendErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let created: ResendEmailCreated = res.json().await?;
        tracing::info!(message_id = ?created.id, "access email sent");
        Ok(EmailReceipt {
            message_id: created.id,
        })
    }
}

fn render_access_email_html(link: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="margin:0;padding:0;background-color:#09090b;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;">
  <div style="max-width:600px;margin:0 auto;padding:40px 20px;text-align:center;">
    <h1 style="color:#f4f4f5;font-size:24px;"><span style="color:#ea580c;">Post</span>WithoutBan</h1>
    <div style="background-color:#18181b;border-radius:12px;padding:32px;">
      <h2 style="color:#f4f4f5;font-size:20px;">Thanks for your purchase!</h2>
      <p style="color:#a1a1aa;font-size:16px;line-height:1.6;">You now have lifetime access to PostWithoutBan.</p>
      <a href="{link}" style="display:inline-block;background-color:#ea580c;color:white;text-decoration:none;padding:16px 32px;border-radius:8px;font-weight:600;">Open the app</a>
      <p style="color:#71717a;font-size:14px;">This link is personal. Do not share it.</p>
    </div>
  </div>
</body>
</html>"#
    )
}

fn render_access_email_text(link: &str) -> String {
    format!(
        "Thanks for your purchase!\n\nOpen PostWithoutBan with your personal link:\n{link}\n\nDo not share this link."
    )
}
