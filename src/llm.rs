use std::sync::LazyLock;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::parser::records::{DirectiveRecord, WireRecord};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const MAX_TOKENS: u32 = 8000;
const MAX_PROMPT_CHARS: usize = 8000;

static TRAILING_COMMA_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",(\s*[}\]])").unwrap());

/// Client for the hosted-model alternative to the heuristic pipeline.
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct TimeFramesEnvelope {
    #[serde(default)]
    time_frames: Vec<WireRecord>,
}

impl LlmClient {
    /// Reads `ANTHROPIC_API_KEY` and, optionally, `DIRECTIVES_LLM_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow!("ANTHROPIC_API_KEY environment variable must be set"))?;
        let model = std::env::var("DIRECTIVES_LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Ok(LlmClient {
            client: reqwest::Client::new(),
            api_key,
            model,
        })
    }

    /// Ask the model for directives in the same record shape the heuristic
    /// pipeline produces. Single attempt; failures go straight to the caller.
    pub async fn extract(
        &self,
        text: &str,
        procedure: Option<DateTime<Utc>>,
    ) -> Result<Vec<DirectiveRecord>> {
        let prompt = build_prompt(text, procedure);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![json!({ "role": "user", "content": prompt })],
        };

        info!(model = %self.model, prompt_chars = prompt.chars().count(), "calling messages API");
        let resp = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .context("Messages API request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Messages API returned {}: {}", status.as_u16(), body);
        }

        let parsed: MessagesResponse = resp.json().await.context("Malformed messages API response")?;
        let reply: String = parsed
            .content
            .into_iter()
            .filter_map(|b| b.text)
            .collect();
        if reply.trim().is_empty() {
            bail!("Messages API returned no text content");
        }

        let records = parse_reply(&reply)?;
        info!(records = records.len(), "model reply parsed");
        Ok(records)
    }
}

pub fn build_prompt(text: &str, procedure: Option<DateTime<Utc>>) -> String {
    let excerpt: String = text.chars().take(MAX_PROMPT_CHARS).collect();
    let procedure_line = procedure
        .map(|t| format!("The time of the procedure is: {}\n", t.to_rfc3339()))
        .unwrap_or_default();

    format!(
        "You are a helpful assistant. The user has uploaded a PDF of discharge instructions.\n\
         Extract every rule that says what the patient should or should not do after the procedure,\n\
         with any associated time frame (e.g. 'for 3 days', 'after 12 hours').\n\
         Use type 0 for things the patient should do and type 1 for things the patient should not do.\n\
         Use time -1 and unit \"not found\" when no time frame is stated.\n\
         Units must be one of: second, seconds, minute, minutes, hour, hours, day, days, week, weeks, year, years.\n\
         Return ONLY JSON of the form:\n\
         {{\"time_frames\": [{{\"time\": int, \"unit\": str, \"message\": str, \"type\": int}}]}}\n\
         Do not modify any of the message text.\n\
         {procedure_line}\
         Here is the PDF text:\n\
         ```{excerpt}```\n"
    )
}

/// Strip fences, comments and trailing commas the model tends to add, then
/// pull out the outermost JSON object.
pub fn clean_json(reply: &str) -> String {
    let mut text = reply.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    let text = text.trim().trim_end_matches("```");

    let text = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    };

    if serde_json::from_str::<serde_json::Value>(text).is_ok() {
        return text.to_string();
    }
    let text = strip_comments(text);
    TRAILING_COMMA_RE.replace_all(&text, "$1").trim().to_string()
}

/// Drop `//` and `/* */` comments that sit outside JSON string literals.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match (c, chars.peek().copied()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                while chars.next_if(|&n| n != '\n').is_some() {}
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

pub fn parse_reply(reply: &str) -> Result<Vec<DirectiveRecord>> {
    let cleaned = clean_json(reply);
    let envelope: TimeFramesEnvelope =
        serde_json::from_str(&cleaned).context("Failed to parse model JSON")?;

    let records = envelope
        .time_frames
        .into_iter()
        .filter_map(|w| match DirectiveRecord::try_from(w) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!("Dropping model record: {}", e);
                None
            }
        })
        .collect();
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::classify::DirectiveKind;

    #[test]
    fn prompt_truncates_and_mentions_procedure() {
        let text = "x".repeat(MAX_PROMPT_CHARS + 500);
        let at = DateTime::parse_from_rfc3339("2025-06-21T08:00:00Z").unwrap().with_timezone(&Utc);
        let prompt = build_prompt(&text, Some(at));
        assert!(prompt.contains("2025-06-21T08:00:00+00:00"));
        assert!(prompt.contains(&"x".repeat(MAX_PROMPT_CHARS)));
        assert!(!prompt.contains(&"x".repeat(MAX_PROMPT_CHARS + 1)));
        assert!(!build_prompt("hi", None).contains("time of the procedure"));
    }

    #[test]
    fn cleans_fenced_commented_json() {
        let reply = "```json\n{\n  // directives\n  \"time_frames\": [\n    {\"type\": 1, \"time\": 24, \"unit\": \"hours\", \"message\": \"Do not drive\"}, /* x */\n  ],\n}\n```";
        let cleaned = clean_json(reply);
        let v: serde_json::Value = serde_json::from_str(&cleaned).unwrap();
        assert_eq!(v["time_frames"][0]["time"], 24);
    }

    #[test]
    fn keeps_outer_object_only() {
        let reply = "Here you go: {\"time_frames\": []} Hope that helps.";
        assert_eq!(clean_json(reply), "{\"time_frames\": []}");
    }

    #[test]
    fn parses_and_filters_records() {
        let reply = r#"{"time_frames": [
            {"type": 1, "time": 24, "unit": "hours", "message": "Do not drive for 24 hours"},
            {"type": 0, "time": 2, "unit": "months", "message": "Follow up in 2 months"},
            {"type": 5, "time": 1, "unit": "day", "message": "???"}
        ]}"#;
        let records = parse_reply(reply).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, DirectiveKind::DoNot);
        assert_eq!(records[0].unit(), "hours");
        assert_eq!(records[1].time(), -1);
    }

    #[test]
    fn urls_in_messages_survive_cleanup() {
        let records = parse_reply(
            r#"{"time_frames": [{"type": 0, "time": 2, "unit": "days", "message": "See https://example.org/care for 2 days"}]}"#,
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "See https://example.org/care for 2 days");

        // the comment goes, the URL and the escaped quote stay
        let reply = "{\"time_frames\": [ // list\n {\"type\": 1, \"time\": 3, \"unit\": \"days\", \"message\": \"No \\\"swim\\\" http://a.b/c /* not a comment */\"},\n]}";
        let records = parse_reply(reply).unwrap();
        assert_eq!(records[0].message, "No \"swim\" http://a.b/c /* not a comment */");
        assert_eq!(records[0].time(), 3);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_reply("no json here").is_err());
    }
}
