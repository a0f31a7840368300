//! Cookie marshaling and the session gate.
//!
//! Cookies only exist at the HTTP boundary: handlers turn them into `SessionCredentials`
//! here and everything past that point works on the verified `AccessGrant`.

use axum::extract::{Request, State};
use axum::http::header::ACCEPT;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite, SignedCookieJar};

use crate::access::{verify_by_session, SessionCredentials};
use crate::AppState;

pub const ACCESS_COOKIE: &str = "pwb_access";
pub const ADMIN_COOKIE: &str = "pwb_admin";
pub const SESSION_MAX_AGE_DAYS: i64 = 30;
pub const PURCHASE_FUNNEL_PATH: &str = "/pricing";

fn session_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(SESSION_MAX_AGE_DAYS))
        .path("/")
        .build()
}

/// Cookie carrying the raw access token. Treat it like a password.
pub fn access_cookie(token: &str, secure: bool) -> Cookie<'static> {
    session_cookie(ACCESS_COOKIE, token.to_owned(), secure)
}

/// Staff cookie; its value is the normalized email and it is only ever set on a signed jar.
pub fn admin_cookie(email: &str, secure: bool) -> Cookie<'static> {
    session_cookie(ADMIN_COOKIE, email.to_owned(), secure)
}

pub fn credentials_from(jar: &CookieJar, signed: &SignedCookieJar) -> SessionCredentials {
    SessionCredentials {
        admin_email: signed.get(ADMIN_COOKIE).map(|c| c.value().to_owned()),
        access_token: jar.get(ACCESS_COOKIE).map(|c| c.value().to_owned()),
    }
}

pub fn clear_sessions(jar: CookieJar, signed: SignedCookieJar) -> (CookieJar, SignedCookieJar) {
    (
        jar.remove(Cookie::build(ACCESS_COOKIE).path("/")),
        signed.remove(Cookie::build(ADMIN_COOKIE).path("/")),
    )
}

fn wants_html(req: &Request) -> bool {
    req.headers()
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/html"))
}

/// Guards the protected surface. Browsers without a valid session are sent to the purchase
/// funnel; API clients get the error as JSON. The check has no side effects.
pub async fn require_access(
    State(state): State<AppState>,
    jar: CookieJar,
    signed: SignedCookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let credentials = credentials_from(&jar, &signed);
    match verify_by_session(&state.store, &state.admins, &credentials) {
        Ok(grant) => {
            req.extensions_mut().insert(grant);
            next.run(req).await
        }
        Err(err) if wants_html(&req) && !err.status_code().is_server_error() => {
            Redirect::to(PURCHASE_FUNNEL_PATH).into_response()
        }
        Err(err) => err.into_response(),
    }
}
