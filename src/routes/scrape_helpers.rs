use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

const SCRAPER_USER_AGENT: &str = "Mozilla/5.0 (compatible; RedditStrategyBot/1.0)";
const MAX_H1: usize = 3;
const MAX_H2: usize = 5;

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<title[^>]*>([^<]+)</title>").expect("valid regex"));
static META_DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]*name=["']description["'][^>]*content=["']([^"']+)["']"#)
        .expect("valid regex")
});
static H1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<h1[^>]*>([^<]+)</h1>").expect("valid regex"));
static H2_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<h2[^>]*>([^<]+)</h2>").expect("valid regex"));

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSummary {
    pub title: String,
    pub meta_description: String,
    pub h1: Vec<String>,
    pub h2: Vec<String>,
}

/// What could be learned about the site; an unreachable site is described, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteContent {
    Summary(SiteSummary),
    Unreachable(String),
}

impl SiteContent {
    pub fn to_prompt_text(&self) -> String {
        match self {
            SiteContent::Summary(summary) => {
                serde_json::to_string(summary).unwrap_or_default()
            }
            SiteContent::Unreachable(reason) => format!("Could not reach the website ({reason})"),
        }
    }
}

fn first_capture(re: &Regex, html: &str) -> String {
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn all_captures(re: &Regex, html: &str, limit: usize) -> Vec<String> {
    re.captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .take(limit)
        .collect()
}

/// Title, meta description, first three `<h1>` and first five `<h2>`.
pub fn extract_site_summary(html: &str) -> SiteSummary {
    SiteSummary {
        title: first_capture(&TITLE_RE, html),
        meta_description: first_capture(&META_DESCRIPTION_RE, html),
        h1: all_captures(&H1_RE, html, MAX_H1),
        h2: all_captures(&H2_RE, html, MAX_H2),
    }
}

pub async fn fetch_site_content(http: &reqwest::Client, url: &str) -> SiteContent {
    let res = http
        .get(url)
        .header(reqwest::header::USER_AGENT, SCRAPER_USER_AGENT)
        .timeout(Duration::from_secs(10))
        .send()
        .await;

    let res = match res {
        Ok(res) => res,
        Err(e) => {
            warn!(error = %e, "failed to fetch website");
            return SiteContent::Unreachable("request failed".into());
        }
    };

    if !res.status().is_success() {
        return SiteContent::Unreachable(format!("status {}", res.status().as_u16()));
    }

    match res.text().await {
        Ok(html) => SiteContent::Summary(extract_site_summary(&html)),
        Err(e) => {
            warn!(error = %e, "failed to read website body");
            SiteContent::Unreachable("unreadable body".into())
        }
    }
}
