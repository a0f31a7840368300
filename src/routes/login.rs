use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::{CookieJar, SignedCookieJar};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::model::normalize_email;
use crate::session::{admin_cookie, clear_sessions};
use crate::types::{LoginRequest, LoginResponse};
use crate::AppState;

fn failed(err: AppError) -> Response {
    err.report();
    let body = LoginResponse::failed(err.public_message());
    (err.status_code(), Json(body)).into_response()
}

/// Resend the access link for an existing purchase.
///
/// The stored token is re-sent as is; it is not rotated.
pub async fn resend_access_link(app_state: &AppState, email: &str) -> AppResult<()> {
    let purchase = app_state
        .store
        .find_by_email(email)?
        .ok_or(AppError::PurchaseNotFound)?;

    if !purchase.is_active {
        return Err(AppError::Forbidden);
    }

    app_state
        .notifier
        .send_access_link(&purchase.email, &purchase.access_token)
        .await?;

    info!(purchase_id = %purchase.id, "access link re-sent");
    Ok(())
}

/// Log in by email
///
/// Allow-listed staff get a signed admin cookie straight away. Buyers get their existing
/// access link emailed again.
#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access link sent, or admin session opened", body = LoginResponse),
        (status = 400, description = "Email missing", body = LoginResponse),
        (status = 403, description = "Access deactivated", body = LoginResponse),
        (status = 404, description = "No purchase for this email", body = LoginResponse),
        (status = 500, description = "Email could not be sent", body = LoginResponse)
    ),
    tag = "Access"
)]
pub async fn login(
    State(app_state): State<AppState>,
    signed: SignedCookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return failed(rejection.into()),
    };
    let email = payload
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|e| !e.is_empty());
    let Some(email) = email else {
        return failed(AppError::Validation("Email is required".into()));
    };

    if app_state.admins.contains(&email) {
        info!("admin login");
        let signed = signed.add(admin_cookie(&email, app_state.config.is_production()));
        let body = LoginResponse {
            success: true,
            message: Some("Admin login successful".into()),
            is_admin: Some(true),
            redirect: Some("/app".into()),
            ..Default::default()
        };
        return (signed, Json(body)).into_response();
    }

    match resend_access_link(&app_state, &email).await {
        Ok(()) => Json(LoginResponse {
            success: true,
            message: Some("Access link sent, check your email".into()),
            ..Default::default()
        })
        .into_response(),
        Err(e) => failed(e),
    }
}

/// Log out
///
/// Removes both session cookies.
#[utoipa::path(
    post,
    path = "/api/logout",
    responses(
        (status = 200, description = "Session cookies cleared", body = LoginResponse)
    ),
    tag = "Access"
)]
pub async fn logout(jar: CookieJar, signed: SignedCookieJar) -> impl IntoResponse {
    let (jar, signed) = clear_sessions(jar, signed);
    let body = LoginResponse {
        success: true,
        message: Some("Logged out".into()),
        ..Default::default()
    };
    (StatusCode::OK, jar, signed, Json(body))
}
