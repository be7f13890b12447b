//! Deep content inspection through a generative model.
//!
//! The model answers in free-form text that is expected to embed a JSON
//! report. Everything it says is untrusted: the report is located with a
//! bracket-matching search, every field is validated, and any failure is
//! reported as a failed analysis instead of an error.

use crate::config::ContentAnalysisConfig;
use crate::verdict::{ContentVerdict, VulnerabilityFinding};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on opening braces tried by the balanced scan.
const MAX_BRACE_STARTS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ContentAnalysisError {
    #[error("API key not configured")]
    NotConfigured,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("model returned no text")]
    EmptyResponse,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A text-in, text-out generative model.
#[async_trait]
pub trait ContentModel: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String, ContentAnalysisError>;
}

/// Outcome of reading a model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReport {
    Parsed(ContentVerdict),
    Unparsable,
}

impl ParsedReport {
    pub fn into_verdict(self) -> ContentVerdict {
        match self {
            ParsedReport::Parsed(verdict) => verdict,
            ParsedReport::Unparsable => ContentVerdict::empty(),
        }
    }
}

/// Locate and validate the report embedded in a model response.
pub fn parse_report(text: &str) -> ParsedReport {
    for block in candidate_blocks(text) {
        let Ok(Value::Object(object)) = serde_json::from_str::<Value>(block) else {
            continue;
        };
        if let Some(verdict) = verdict_from_object(&object) {
            return ParsedReport::Parsed(verdict);
        }
    }
    ParsedReport::Unparsable
}

/// Greedy span first (first `{` to last `}`), then each balanced block in
/// order of its opening brace.
fn candidate_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            blocks.push(&text[start..=end]);
        }
    }

    for (start, _) in text.match_indices('{').take(MAX_BRACE_STARTS) {
        if let Some(end) = matching_brace(text, start) {
            let block = &text[start..=end];
            if !blocks.contains(&block) {
                blocks.push(block);
            }
        }
    }

    blocks
}

/// Byte index of the `}` closing the `{` at `start`, skipping string literals.
fn matching_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn verdict_from_object(object: &Map<String, Value>) -> Option<ContentVerdict> {
    if !object.contains_key("score") && !object.contains_key("vulnerabilities") {
        return None;
    }

    let score = object.get("score").map(parse_score).unwrap_or(0);
    let vulnerabilities = match object.get("vulnerabilities") {
        Some(Value::Array(items)) => items.iter().filter_map(parse_vulnerability).collect(),
        _ => Vec::new(),
    };

    Some(ContentVerdict {
        score,
        vulnerabilities,
    })
}

fn parse_score(value: &Value) -> u8 {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(score) if score.is_finite() => score.round().clamp(0.0, 100.0) as u8,
        _ => {
            log::debug!("Ignoring non-numeric risk score: {value}");
            0
        }
    }
}

fn parse_vulnerability(value: &Value) -> Option<VulnerabilityFinding> {
    let item = value.as_object()?;
    let name = text_field(item, "vulnerability").or_else(|| text_field(item, "name"))?;

    Some(VulnerabilityFinding {
        name,
        confidence: text_field(item, "confidence")?,
        explanation: text_field(item, "explanation")?,
        recommendation: text_field(item, "recommendation")?,
    })
}

fn text_field(item: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match item.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Outcome of one analysis call. Only `Completed` reflects an answer from the
/// model; `Failed` carries no evidence either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Analysis {
    Completed(ContentVerdict),
    Failed,
}

impl Analysis {
    /// Verdict shown to callers; a failed analysis reports nothing found.
    pub fn into_verdict(self) -> ContentVerdict {
        match self {
            Analysis::Completed(verdict) => verdict,
            Analysis::Failed => ContentVerdict::empty(),
        }
    }
}

pub struct ContentAnalyzer {
    model: Arc<dyn ContentModel>,
    timeout: Duration,
    max_content_chars: usize,
}

impl ContentAnalyzer {
    pub fn new(model: Arc<dyn ContentModel>, config: &ContentAnalysisConfig) -> Self {
        Self {
            model,
            timeout: config.timeout(),
            max_content_chars: config.max_content_chars,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build_prompt(&self, url: &str, content: &str) -> String {
        let content: String = if content.chars().count() > self.max_content_chars {
            log::debug!(
                "Truncating content of {url} to {} characters",
                self.max_content_chars
            );
            content.chars().take(self.max_content_chars).collect()
        } else {
            content.to_string()
        };

        format!(
            "You are a web security analyst. Inspect the HTML of the page at {url} for \
malicious or exploitable code such as XSS, drive-by downloads, credential harvesting \
forms, cryptojacking scripts, hidden iframes and obfuscated JavaScript.\n\
Respond ONLY with a JSON object of the form \
{{\"score\": <integer 0-100>, \"vulnerabilities\": [{{\"vulnerability\": <name>, \
\"confidence\": <Low|Medium|High>, \"explanation\": <text>, \"recommendation\": <text>}}]}}. \
Use an empty vulnerabilities list and a low score for a benign page.\n\n\
--- PAGE HTML START ---\n{content}\n--- PAGE HTML END ---"
        )
    }

    /// Never returns an error: provider errors and unreadable answers come
    /// back as [`Analysis::Failed`].
    pub async fn analyze(&self, url: &str, content: &str) -> Analysis {
        let prompt = self.build_prompt(url, content);

        let response = match tokio::time::timeout(self.timeout, self.model.generate(&prompt)).await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                log::warn!("Content analysis of {url} via {} failed: {e}", self.model.name());
                return Analysis::Failed;
            }
            Err(_) => {
                log::warn!(
                    "Content analysis of {url} via {} failed: {}",
                    self.model.name(),
                    ContentAnalysisError::Timeout(self.timeout)
                );
                return Analysis::Failed;
            }
        };

        match parse_report(&response) {
            ParsedReport::Parsed(verdict) => {
                log::debug!(
                    "Content analysis of {url}: score {} with {} vulnerabilities",
                    verdict.score,
                    verdict.vulnerabilities.len()
                );
                Analysis::Completed(verdict)
            }
            ParsedReport::Unparsable => {
                log::warn!("Could not parse content analysis response for {url}");
                Analysis::Failed
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
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

/// Google Gemini `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiModel {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiModel {
    pub fn new(config: &ContentAnalysisConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("SafeTabGuard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ContentModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, ContentAnalysisError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ContentAnalysisError::NotConfigured)?;
        let endpoint = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&endpoint)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ContentAnalysisError::Status(response.status().as_u16()));
        }

        let parsed: GenerateResponse = response.json().await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ContentAnalysisError::EmptyResponse);
        }
        Ok(text)
    }
}
