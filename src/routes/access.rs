use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::{CookieJar, SignedCookieJar};

use crate::access::{verify_by_session, verify_by_token, AccessGrant};
use crate::error::AppError;
use crate::session::{access_cookie, credentials_from};
use crate::types::{AccessResponse, VerifyTokenRequest};
use crate::AppState;

fn denied(err: AppError) -> Response {
    err.report();
    let body = AccessResponse::denied(Some(err.public_message()));
    (err.status_code(), Json(body)).into_response()
}

/// Verify an emailed access token
///
/// On success the token is stored in a 30-day http-only session cookie and usage
/// statistics are recorded.
#[utoipa::path(
    post,
    path = "/api/access",
    request_body = VerifyTokenRequest,
    responses(
        (status = 200, description = "Token valid, session cookie set", body = AccessResponse),
        (status = 400, description = "Token missing", body = AccessResponse),
        (status = 401, description = "Unknown token", body = AccessResponse),
        (status = 403, description = "Access deactivated", body = AccessResponse),
        (status = 500, description = "Internal server error", body = AccessResponse)
    ),
    tag = "Access"
)]
pub async fn verify_token(
    State(app_state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<VerifyTokenRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return denied(rejection.into()),
    };
    let Some(token) = payload.token.filter(|t| !t.trim().is_empty()) else {
        return denied(AppError::Validation("Missing token".into()));
    };

    match verify_by_token(&app_state.store, token.trim()) {
        Ok(purchase) => {
            let jar = jar.add(access_cookie(
                &purchase.access_token,
                app_state.config.is_production(),
            ));
            let body = AccessResponse::granted(purchase.email, None);
            (jar, Json(body)).into_response()
        }
        Err(e) => denied(e),
    }
}

/// Check the current session
///
/// The admin cookie is consulted first; otherwise the access cookie is looked up. Never
/// changes stored state.
#[utoipa::path(
    get,
    path = "/api/access",
    responses(
        (status = 200, description = "Session valid", body = AccessResponse),
        (status = 401, description = "No valid session", body = AccessResponse),
        (status = 403, description = "Access deactivated", body = AccessResponse),
        (status = 500, description = "Internal server error", body = AccessResponse)
    ),
    tag = "Access"
)]
pub async fn check_session(
    State(app_state): State<AppState>,
    jar: CookieJar,
    signed: SignedCookieJar,
) -> Response {
    let credentials = credentials_from(&jar, &signed);
    match verify_by_session(&app_state.store, &app_state.admins, &credentials) {
        Ok(grant) => {
            let is_admin = grant.is_admin();
            let email = match grant {
                AccessGrant::Admin { email } | AccessGrant::Purchaser { email, .. } => email,
            };
            Json(AccessResponse::granted(email, Some(is_admin))).into_response()
        }
        Err(e) => {
            e.report();
            (e.status_code(), Json(AccessResponse::denied(None))).into_response()
        }
    }
}
