//! Gemini `generateContent` client used by the strategy generator.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::types::StrategyReport;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const TEMPERATURE: f32 = 0.7;
const MAX_OUTPUT_TOKENS: u32 = 2048;
const API_KEY_HEADER: &str = "x-goog-api-key";
pub const MAX_SUBREDDITS: usize = 5;

pub const SYSTEM_PROMPT: &str = r#"You are a Reddit strategy expert for indie hackers and solo founders.
Help the user post on Reddit without getting banned or downvoted. Avoid marketing language,
favour humility and feedback requests, never promise virality, and keep estimates conservative.

Return only valid JSON (no markdown) with this exact structure:
{
  "websiteAnalysis": {"coreProblem": "", "targetAudience": "", "maturityLevel": "early idea | MVP | launched"},
  "subreddits": [{"name": "", "relevanceScore": 1, "moderationRisk": "Low | Medium | High", "recommendedAngle": "", "explanation": ""}],
  "redditPost": {"title": "", "body": ""},
  "realisticEstimates": {"clicksRange": "", "commentsRange": "", "worthIt": true, "warning": ""}
}
relevanceScore is between 1 and 5. At most 5 subreddits. Be honest, even if the answer is "do not post here"."#;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Strips a surrounding markdown code fence (```json ... ``` or ``` ... ```), if any.
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Parses the model reply into a report, keeping at most `MAX_SUBREDDITS` recommendations.
/// Scores are brought into 1..=5 while deserializing.
pub fn parse_strategy_reply(reply: &str) -> AppResult<StrategyReport> {
    let mut report: StrategyReport = serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| AppError::Upstream(format!("unparseable strategy reply: {e}")))?;
    report.subreddits.truncate(MAX_SUBREDDITS);
    Ok(report)
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn strategy_request(&self, prompt: &str) -> reqwest::RequestBuilder {
        let request = GenerateContentRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        // Never in the query string: request URLs end up in error messages.
        self.http
            .post(format!("{GEMINI_API_BASE}/models/{}:generateContent", self.model))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
    }

    pub async fn generate_strategy(&self, user_prompt: &str) -> AppResult<StrategyReport> {
        let prompt = format!("{SYSTEM_PROMPT}\n\n{user_prompt}");
        let res = self.strategy_request(&prompt).send().await?;

        if !res.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Gemini API returned error status: {}",
                res.status()
            )));
        }

        let body: GenerateContentResponse = res.json().await?;
        let text = body
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<String>();

        if text.trim().is_empty() {
            return Err(AppError::Upstream("Gemini returned an empty reply".into()));
        }

        parse_strategy_reply(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModerationRisk;

    const REPLY: &str = r#"{
        "websiteAnalysis": {"coreProblem": "Posting gets you banned", "targetAudience": "Indie hackers", "maturityLevel": "MVP"},
        "subreddits": [
            {"name": "SideProject", "relevanceScore": 9, "moderationRisk": "Low", "recommendedAngle": "Feedback request", "explanation": "Friendly to launches"},
            {"name": "a", "relevanceScore": 3, "moderationRisk": "High", "recommendedAngle": "x", "explanation": "y"},
            {"name": "b", "relevanceScore": 3, "moderationRisk": "High", "recommendedAngle": "x", "explanation": "y"},
            {"name": "c", "relevanceScore": 3, "moderationRisk": "Medium", "recommendedAngle": "x", "explanation": "y"},
            {"name": "d", "relevanceScore": 3, "moderationRisk": "Medium", "recommendedAngle": "x", "explanation": "y"},
            {"name": "e", "relevanceScore": 0, "moderationRisk": "Medium", "recommendedAngle": "x", "explanation": "y"}
        ],
        "redditPost": {"title": "I built a thing", "body": "Would love feedback"},
        "realisticEstimates": {"clicksRange": "10-30", "commentsRange": "2-8", "worthIt": true, "warning": "Do not expect virality"}
    }"#;

    #[test]
    fn strips_json_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }

    #[test]
    fn parses_and_clamps_report() {
        let fenced = format!("```json\n{REPLY}\n```");
        let report = parse_strategy_reply(&fenced).unwrap();
        assert_eq!(report.subreddits.len(), MAX_SUBREDDITS);
        assert_eq!(report.subreddits[0].relevance_score, 5);
        assert_eq!(report.subreddits[0].moderation_risk, ModerationRisk::Low);
        assert!(report.realistic_estimates.worth_it);
    }

    #[test]
    fn fractional_and_negative_scores_are_rounded_into_range() {
        let reply = REPLY
            .replacen(r#""relevanceScore": 9"#, r#""relevanceScore": 4.5"#, 1)
            .replacen(r#""relevanceScore": 3"#, r#""relevanceScore": -1"#, 1)
            .replacen(r#""relevanceScore": 3"#, r#""relevanceScore": 2.2"#, 1);
        let report = parse_strategy_reply(&reply).unwrap();
        let scores: Vec<u8> = report.subreddits.iter().map(|s| s.relevance_score).collect();
        assert_eq!(scores, vec![5, 1, 2, 3, 3]);
    }

    #[test]
    fn garbage_reply_is_upstream_error() {
        assert!(matches!(
            parse_strategy_reply("Sorry, I cannot help with that."),
            Err(AppError::Upstream(_))
        ));
    }

    #[test]
    fn api_key_is_sent_as_header_not_in_url() {
        let client = GeminiClient::new(reqwest::Client::new(), "SECRET_KEY_123", "gemini-2.0-flash");
        let request = client.strategy_request("prompt").build().unwrap();

        assert!(!request.url().as_str().contains("SECRET_KEY_123"));
        assert_eq!(request.url().query(), None);
        assert_eq!(request.headers()[API_KEY_HEADER], "SECRET_KEY_123");
    }
}
