use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use reqwest::Url;
use tracing::info;

use crate::access::AccessGrant;
use crate::error::{AppError, AppResult};
use crate::routes::scrape_helpers::fetch_site_content;
use crate::types::{AnalyzeRequest, StrategyReport};
use crate::AppState;

/// Only absolute http(s) URLs are fetched.
pub fn parse_product_url(raw: Option<&str>) -> AppResult<Url> {
    let raw = raw
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::Validation("URL is required".into()))?;
    let url = Url::parse(raw).map_err(|_| AppError::Validation("URL is not valid".into()))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(AppError::Validation("URL must use http or https".into())),
    }
}

fn build_user_prompt(url: &Url, site_content: &str, description: Option<&str>) -> String {
    let mut prompt = format!(
        "Analyse this SaaS website and produce a Reddit strategy:\n\nURL: {url}\nExtracted content: {site_content}\n"
    );
    if let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) {
        prompt.push_str(&format!("Description provided by the user: {description}\n"));
    }
    prompt.push_str("\nReturn only the JSON, with no text before or after.");
    prompt
}

/// Generate a Reddit posting strategy
///
/// Requires a valid session; see the session gate.
#[utoipa::path(
    post,
    path = "/api/analyze",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Strategy generated", body = StrategyReport),
        (status = 400, description = "Missing or invalid URL", body = crate::error::ErrorBody),
        (status = 401, description = "No valid session", body = crate::error::ErrorBody),
        (status = 500, description = "Generator not configured or failed", body = crate::error::ErrorBody)
    ),
    tag = "Strategy"
)]
pub async fn analyze(
    State(app_state): State<AppState>,
    Extension(grant): Extension<AccessGrant>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> AppResult<Json<StrategyReport>> {
    let Json(payload) = payload?;
    let url = parse_product_url(payload.url.as_deref())?;
    let gemini = app_state
        .gemini
        .as_ref()
        .ok_or(AppError::NotConfigured("Strategy generator"))?;

    info!(admin = grant.is_admin(), host = url.host_str().unwrap_or_default(), "generating strategy");

    let site_content = fetch_site_content(&app_state.http, url.as_str()).await;
    let prompt = build_user_prompt(&url, &site_content.to_prompt_text(), payload.description.as_deref());
    let report = gemini.generate_strategy(&prompt).await?;

    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(parse_product_url(Some("https://shipfa.st")).is_ok());
        assert!(parse_product_url(Some(" http://localhost:8080/page ")).is_ok());
    }

    #[test]
    fn rejects_missing_and_non_web_urls() {
        for raw in [None, Some(""), Some("shipfa.st"), Some("ftp://files.example.com"), Some("file:///etc/passwd")] {
            assert!(
                matches!(parse_product_url(raw), Err(AppError::Validation(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn prompt_includes_description_only_when_given() {
        let url = Url::parse("https://shipfa.st").unwrap();
        let with = build_user_prompt(&url, "{}", Some("A boilerplate"));
        assert!(with.contains("Description provided by the user: A boilerplate"));
        let without = build_user_prompt(&url, "{}", Some("   "));
        assert!(!without.contains("Description provided"));
    }
}
