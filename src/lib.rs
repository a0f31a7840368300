pub mod access;
pub mod config;
pub mod error;
pub mod gemini;
pub mod model;
pub mod notifier;
pub mod routes;
pub mod schema;
pub mod session;
pub mod store;
pub mod stripe;
pub mod token;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use access::AdminAllowList;
use axum::{
    extract::FromRef,
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::Key;
use crate::config::{AppConfig, ConfigError};
use gemini::GeminiClient;
use notifier::{DisabledNotifier, Notifier, ResendNotifier};
use routes::access::{check_session, verify_token};
use routes::analyze::analyze;
use routes::checkout::create_checkout;
use routes::login::{login, logout};
use routes::webhook::handle_stripe_webhook;
use store::PurchaseStore;
use stripe::StripeClient;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use types::{
    AccessResponse, AnalyzeRequest, CheckoutResponse, LoginRequest, LoginResponse,
    ModerationRisk, RealisticEstimates, RedditPost, StrategyReport, SubredditRecommendation,
    VerifyTokenRequest, WebhookAck, WebsiteAnalysis,
};
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: PurchaseStore,
    pub notifier: Arc<dyn Notifier>,
    pub stripe: Arc<StripeClient>,
    pub gemini: Option<Arc<GeminiClient>>,
    pub admins: Arc<AdminAllowList>,
    pub http: reqwest::Client,
    cookie_key: Key,
}

impl AppState {
    /// Wires the collaborators from a configuration; validates it first.
    pub fn new(
        config: AppConfig,
        store: PurchaseStore,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let http = reqwest::Client::new();
        let stripe = StripeClient::new(
            http.clone(),
            config.stripe_api_base.clone(),
            AppConfig::non_empty(&config.stripe_secret_key).map(str::to_owned),
            AppConfig::non_empty(&config.stripe_price_id).map(str::to_owned),
            config.stripe_webhook_secret.clone(),
            config.webhook_tolerance_secs,
        );
        let gemini = AppConfig::non_empty(&config.gemini_api_key)
            .map(|key| Arc::new(GeminiClient::new(http.clone(), key, config.gemini_model.clone())));

        Ok(Self {
            cookie_key: Key::derive_from(config.cookie_secret.as_bytes()),
            admins: Arc::new(config.admin_allow_list()),
            stripe: Arc::new(stripe),
            gemini,
            http,
            store,
            notifier,
            config: Arc::new(config),
        })
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::webhook::handle_stripe_webhook,
        routes::access::verify_token,
        routes::access::check_session,
        routes::login::login,
        routes::login::logout,
        routes::checkout::create_checkout,
        routes::analyze::analyze,
        health_check
    ),
    components(
        schemas(
            error::ErrorBody, AccessResponse, VerifyTokenRequest, LoginRequest, LoginResponse,
            WebhookAck, CheckoutResponse, AnalyzeRequest, StrategyReport, WebsiteAnalysis,
            SubredditRecommendation, ModerationRisk, RedditPost, RealisticEstimates
        )
    ),
    tags(
        (name = "Payments", description = "Stripe checkout and webhook endpoints"),
        (name = "Access", description = "Access token, session and login endpoints"),
        (name = "Strategy", description = "Reddit strategy generator"),
        (name = "Health", description = "Health check endpoints")
    ),
    info(
        title = "PostWithoutBan Access API",
        version = "1.0.0",
        description = "Purchase-to-access pipeline and strategy generator for PostWithoutBan"
    )
)]
struct ApiDoc;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = serde_json::Value)
    ),
    tag = "Health"
)]
async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(serde_json::json!({"status": "ok"})))
}

async fn openapi_spec() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

async fn swagger_ui() -> impl IntoResponse {
    Html(include_str!("../static/swagger.html"))
}

pub fn app(app_state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/analyze", post(analyze))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            session::require_access,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/webhook", post(handle_stripe_webhook))
        .route("/api/access", post(verify_token).get(check_session))
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/checkout", post(create_checkout))
        .merge(protected)
        .route("/api-doc/openapi.json", get(openapi_spec))
        .route("/explore", get(swagger_ui))
        .with_state(app_state)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn build_notifier(config: &AppConfig) -> Arc<dyn Notifier> {
    match AppConfig::non_empty(&config.resend_api_key) {
        Some(api_key) => Arc::new(ResendNotifier::new(
            reqwest::Client::new(),
            api_key,
            config.email_from.clone(),
            config.public_base_url.clone(),
        )),
        None => {
            warn!("RESEND_API_KEY not set, access emails will not be sent");
            Arc::new(DisabledNotifier)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = PurchaseStore::connect(&config.database_url, config.database_max_connections)?;
    store.run_migrations()?;

    let notifier = build_notifier(&config);
    let port = config.port;
    let app_state = AppState::new(config, store, notifier)?;
    if app_state.gemini.is_none() {
        warn!("GEMINI_API_KEY not set, strategy generation is disabled");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app(app_state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AppConfig::from_env()?;

    // Sentry has to be initialised before the runtime starts.
    let _sentry = AppConfig::non_empty(&config.sentry_dsn).map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tokio::runtime::Runtime::new()?.block_on(serve(config))
}
