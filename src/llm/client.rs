//! OpenRouter client for structured plan generation.
//!
//! One HTTP call per invocation: the grouping adapter owns the attempt
//! budget, and infrastructure failures (network, auth, provider) must reach
//! the caller on first occurrence rather than being retried here.

use super::models::{Model, Usage};
use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// OpenRouter direct API URL (BYOK mode)
const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Maximum length for error content in error messages
const MAX_ERROR_CONTENT_LEN: usize = 200;

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// The generation produced output that fails the expected shape, or declined
/// to produce a structured object at all. This is the retriable error class;
/// everything else the client raises is fatal to the current adapter call.
#[derive(Debug)]
pub struct SchemaMismatch(pub String);

impl std::fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SchemaMismatch {}

/// Sanitize API response content for error messages to prevent credential leakage.
fn sanitize_api_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "secret",
        "password",
        "credential",
        "bearer",
        "sk-", // OpenAI/OpenRouter key prefix
    ];

    let truncated = truncate_str(content, MAX_ERROR_CONTENT_LEN);

    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(response details redacted - may contain sensitive data)".to_string();
        }
    }

    truncated.to_string()
}

/// Truncate a string for display (Unicode-safe)
pub(crate) fn truncate_str(s: &str, max_chars: usize) -> &str {
    if s.chars().count() <= max_chars {
        s
    } else {
        let byte_idx = s
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        &s[..byte_idx]
    }
}

fn push_unique_candidate(candidates: &mut Vec<String>, candidate: impl Into<String>) {
    let candidate = candidate.into();
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return;
    }
    if !candidates.iter().any(|existing| existing == trimmed) {
        candidates.push(trimmed.to_string());
    }
}

fn strip_markdown_fences(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return None;
    }
    let without_open = trimmed.strip_prefix("```")?;
    let after_header = if let Some(newline_idx) = without_open.find('\n') {
        &without_open[newline_idx + 1..]
    } else {
        without_open
    };
    let end_idx = after_header.rfind("```")?;
    Some(after_header[..end_idx].trim().to_string())
}

fn extract_balanced_json_from(content: &str, start: usize) -> Option<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in content[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
                continue;
            }
            if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
                if stack.is_empty() {
                    let end = start + offset + ch.len_utf8();
                    return Some(content[start..end].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn extract_json_candidates(content: &str, max_candidates: usize) -> Vec<String> {
    let mut out = Vec::new();
    if max_candidates == 0 {
        return out;
    }
    for (idx, ch) in content.char_indices() {
        if ch == '{' || ch == '[' {
            if let Some(candidate) = extract_balanced_json_from(content, idx) {
                push_unique_candidate(&mut out, candidate);
                if out.len() >= max_candidates {
                    break;
                }
            }
        }
    }
    out
}

/// Deserialize structured model output, salvaging mildly malformed wrappers
/// (markdown fences, prose around a JSON object) before giving up.
///
/// A failure here is a `SchemaMismatch`: the model produced something, but
/// not the expected shape.
pub(crate) fn parse_structured_content<T>(content: &str) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let mut candidates = Vec::new();
    push_unique_candidate(&mut candidates, content);
    if let Some(stripped) = strip_markdown_fences(content) {
        push_unique_candidate(&mut candidates, stripped);
    }

    let mut idx = 0usize;
    while idx < candidates.len() {
        let current = candidates[idx].clone();
        for extracted in extract_json_candidates(&current, 4) {
            push_unique_candidate(&mut candidates, extracted);
        }
        idx += 1;
    }

    let mut last_err: Option<String> = None;
    for candidate in candidates {
        match serde_json::from_str::<T>(&candidate) {
            Ok(data) => return Ok(data),
            Err(err) => last_err = Some(err.to_string()),
        }
    }

    Err(anyhow::Error::new(SchemaMismatch(format!(
        "failed to parse structured response: {}\nContent: {}",
        last_err.unwrap_or_else(|| "unknown parse error".to_string()),
        sanitize_api_response(content)
    ))))
}

/// Get the configured OpenRouter API key, if any.
fn api_key() -> Option<String> {
    Config::load().get_api_key()
}

/// Stable anonymous identifier for OpenRouter's `user` field.
///
/// OpenRouter uses this for routing stickiness and caching. We store an
/// anonymous UUID in config so the same user gets consistent routing.
fn openrouter_user() -> Option<String> {
    if cfg!(test) {
        return None;
    }
    let mut config = Config::load();
    if let Some(id) = config.openrouter_user_id.clone() {
        return Some(id);
    }
    let id = format!("stepdiff_{}", Uuid::new_v4());
    config.openrouter_user_id = Some(id.clone());
    let _ = config.save();
    Some(id)
}

/// Check if the model path is available (an API key is configured)
pub fn is_available() -> bool {
    api_key().is_some()
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    max_tokens: u32,
    stream: bool,
    response_format: ResponseFormat,
}

/// Response format configuration for OpenRouter structured output
#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: JsonSchemaWrapper,
}

/// Wrapper for JSON Schema in structured output mode
#[derive(Serialize)]
struct JsonSchemaWrapper {
    /// Name of the schema (used for reference)
    name: String,
    /// Whether to strictly enforce the schema
    strict: bool,
    /// The JSON schema definition
    schema: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    /// Content can be null in some API responses (e.g., when refusal or error occurs)
    #[serde(default)]
    content: Option<String>,
    /// Refusal reason - set when content is blocked by content moderation
    #[serde(default)]
    refusal: Option<String>,
}

/// OpenRouter error response (can come with 200 status for upstream errors)
#[derive(Deserialize)]
struct OpenRouterError {
    error: OpenRouterApiError,
}

#[derive(Deserialize)]
struct OpenRouterApiError {
    message: String,
}

/// Response from structured output call - parsed JSON and usage stats
#[derive(Debug)]
pub struct StructuredResponse<T> {
    pub data: T,
    pub usage: Option<Usage>,
}

fn create_http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))
}

/// Call the LLM with structured output (strict JSON schema).
///
/// The configured model override, when present, takes precedence over the
/// tier default. Exactly one request is sent; the caller decides whether a
/// failure is worth another attempt.
pub(crate) async fn call_llm_structured<T>(
    system: &str,
    user: &str,
    model: Model,
    schema_name: &str,
    schema: serde_json::Value,
) -> anyhow::Result<StructuredResponse<T>>
where
    T: serde::de::DeserializeOwned,
{
    let api_key = api_key().ok_or_else(|| {
        anyhow::anyhow!("No API key configured. Set OPENROUTER_API_KEY to get started.")
    })?;

    if !model.supports_structured_outputs() {
        return Err(anyhow::anyhow!(
            "Structured outputs aren't supported for {}. Try a different model.",
            model.id()
        ));
    }

    let model_id = Config::load()
        .model
        .clone()
        .unwrap_or_else(|| model.id().to_string());

    let client = create_http_client(REQUEST_TIMEOUT_SECS)?;

    let request = ChatRequest {
        model: model_id,
        messages: vec![
            Message {
                role: "system".to_string(),
                content: system.to_string(),
            },
            Message {
                role: "user".to_string(),
                content: user.to_string(),
            },
        ],
        user: openrouter_user(),
        max_tokens: model.max_tokens(),
        stream: false,
        response_format: ResponseFormat {
            format_type: "json_schema".to_string(),
            json_schema: JsonSchemaWrapper {
                name: schema_name.to_string(),
                strict: true,
                schema,
            },
        },
    };

    let response = client
        .post(OPENROUTER_URL)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", api_key))
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let error_msg = match status.as_u16() {
            401 => "Invalid API key. Check OPENROUTER_API_KEY or the config file.".to_string(),
            429 => "Rate limited by OpenRouter. Try again in a few minutes.".to_string(),
            500..=599 => format!(
                "OpenRouter server error ({}). The service may be temporarily unavailable.",
                status
            ),
            _ => format!("API error {}: {}", status, sanitize_api_response(&text)),
        };
        return Err(anyhow::anyhow!("{}", error_msg));
    }

    // OpenRouter sometimes returns errors with 200 status (upstream provider issues)
    if let Ok(err_resp) = serde_json::from_str::<OpenRouterError>(&text) {
        return Err(anyhow::anyhow!(
            "OpenRouter error: {}",
            truncate_str(&err_resp.error.message, MAX_ERROR_CONTENT_LEN)
        ));
    }

    let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
        anyhow::anyhow!(
            "Failed to parse OpenRouter response: {}\n{}",
            e,
            sanitize_api_response(&text)
        )
    })?;

    let choice = parsed.choices.first();

    // Check for refusal (content moderation)
    if let Some(c) = choice {
        if let Some(refusal) = &c.message.refusal {
            return Err(anyhow::anyhow!(
                "Request was refused: {}",
                truncate_str(refusal, MAX_ERROR_CONTENT_LEN)
            ));
        }
    }

    let content = choice
        .and_then(|c| c.message.content.clone())
        .unwrap_or_default();

    if content.is_empty() {
        // The provider declined to produce a structured object; same error
        // class as output that fails the schema.
        return Err(anyhow::Error::new(SchemaMismatch(
            "no structured object generated: the model returned an empty response".to_string(),
        )));
    }

    let data: T = parse_structured_content(&content)?;

    Ok(StructuredResponse {
        data,
        usage: parsed.usage,
    })
}
