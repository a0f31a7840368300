#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use hmac::{Hmac, Mac};
use pwb_access::config::AppConfig;
use pwb_access::notifier::{access_link, EmailReceipt, Notifier, NotifyError};
use pwb_access::store::PurchaseStore;
use pwb_access::AppState;
use sha2::Sha256;
use tower::ServiceExt; // for `oneshot`

pub const WEBHOOK_SECRET: &str = "whsec_test123secret456";
pub const ADMIN_EMAIL: &str = "staff@example.com";
pub const BASE_URL: &str = "https://postwithoutban.test";

// Helper struct to ensure test database cleanup
pub struct TestDbGuard {
    db_path: PathBuf,
}

impl TestDbGuard {
    pub fn new() -> Self {
        let db_path = std::env::temp_dir().join(format!("pwb_test_{}.db", uuid::Uuid::new_v4()));
        Self { db_path }
    }

    pub fn database_url(&self) -> String {
        self.db_path.to_string_lossy().into_owned()
    }
}

impl Drop for TestDbGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = self.db_path.clone().into_os_string();
            sidecar.push(suffix);
            let _ = std::fs::remove_file(sidecar);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub token: String,
    pub link: String,
}

/// Records every access link instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentEmail>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_access_link(
        &self,
        to_address: &str,
        access_token: &str,
    ) -> Result<EmailReceipt, NotifyError> {
        let link = access_link(BASE_URL, access_token)?;
        self.sent.lock().unwrap().push(SentEmail {
            to: to_address.to_string(),
            token: access_token.to_string(),
            link: link.to_string(),
        });
        Ok(EmailReceipt {
            message_id: Some(format!("msg_{}", uuid::Uuid::new_v4())),
        })
    }
}

/// Provider that always rejects the message.
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send_access_link(
        &self,
        _to_address: &str,
        _access_token: &str,
    ) -> Result<EmailReceipt, NotifyError> {
        Err(NotifyError::Rejected {
            status: 503,
            message: "provider unavailable".into(),
        })
    }
}

pub fn test_config(database_url: String) -> AppConfig {
    AppConfig {
        database_url,
        database_max_connections: 4,
        port: 0,
        app_env: "test".into(),
        public_base_url: BASE_URL.into(),
        stripe_webhook_secret: WEBHOOK_SECRET.into(),
        stripe_secret_key: None,
        stripe_price_id: None,
        stripe_api_base: "http://127.0.0.1:9".into(),
        webhook_tolerance_secs: 300,
        resend_api_key: None,
        email_from: "test@postwithoutban.test".into(),
        admin_emails: format!("{ADMIN_EMAIL}, ops@example.com"),
        cookie_secret: "0123456789abcdef".repeat(4),
        gemini_api_key: None,
        gemini_model: "gemini-2.0-flash".into(),
        sentry_dsn: None,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
    _db: TestDbGuard,
}

impl TestApp {
    pub fn new() -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        Self::build(notifier.clone(), notifier)
    }

    pub fn with_notifier(notifier: Arc<dyn Notifier>) -> Self {
        Self::build(notifier, Arc::new(RecordingNotifier::default()))
    }

    fn build(notifier: Arc<dyn Notifier>, recording: Arc<RecordingNotifier>) -> Self {
        let db = TestDbGuard::new();
        let config = test_config(db.database_url());
        let store = PurchaseStore::connect(&config.database_url, config.database_max_connections)
            .expect("store connects");
        store.run_migrations().expect("migrations run");
        let state = AppState::new(config, store, notifier).expect("valid test config");
        Self {
            router: pwb_access::app(state.clone()),
            state,
            notifier: recording,
            _db: db,
        }
    }

    pub fn store(&self) -> &PurchaseStore {
        &self.state.store
    }

    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        TestResponse {
            status,
            headers,
            json,
        }
    }

    /// Delivers a correctly signed checkout-completed event.
    pub async fn complete_checkout(&self, email: &str, session_id: &str) -> TestResponse {
        let body = checkout_completed_event(email, session_id, Some("cus_test"));
        self.send(signed_webhook(&body)).await
    }

    pub async fn verify_token(&self, token: &str) -> TestResponse {
        self.send(json_request(
            "POST",
            "/api/access",
            serde_json::json!({ "token": token }),
            None,
        ))
        .await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: serde_json::Value,
}

impl TestResponse {
    /// Full `Set-Cookie` header for the named cookie.
    pub fn set_cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with(&format!("{name}=")))
            .map(str::to_string)
    }

    /// `name=value` part of the named cookie, ready to send back.
    pub fn cookie_pair(&self, name: &str) -> Option<String> {
        self.set_cookie(name)
            .and_then(|c| c.split(';').next().map(str::to_string))
    }
}

pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={signature}")
}

pub fn webhook_request(body: &[u8], signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }
    builder.body(Body::from(body.to_vec())).unwrap()
}

pub fn signed_webhook(body: &[u8]) -> Request<Body> {
    let signature = sign_payload(body, WEBHOOK_SECRET, chrono::Utc::now().timestamp());
    webhook_request(body, Some(signature))
}

pub fn checkout_completed_event(email: &str, session_id: &str, customer: Option<&str>) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": format!("evt_{}", uuid::Uuid::new_v4().simple()),
        "object": "event",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "object": "checkout.session",
                "customer": customer,
                "customer_details": { "email": email },
                "mode": "payment",
                "payment_status": "paid"
            }
        }
    }))
    .unwrap()
}

pub fn json_request(
    method: &str,
    uri: &str,
    body: serde_json::Value,
    cookie: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}
