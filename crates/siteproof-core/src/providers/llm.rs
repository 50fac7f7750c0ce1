use std::fmt::Write as _;
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{DiscoveryExtractor, ProviderError, ProviderResult, RawClaim, StructuredExtractor};
use crate::schema::FieldSpec;

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("json object pattern"));

const STOP_SEQUENCES: &[&str] = &["```", "\n\n\n", "</json>"];

const DEFAULT_MODEL_ATTEMPTS: u32 = 2;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    temperature: f32,
    stop: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
}

/// Client for a llama.cpp server's `/completion` endpoint.
#[derive(Debug, Clone)]
pub struct LlamaCppClient {
    client: reqwest::Client,
    endpoint: String,
    max_tokens: u32,
    temperature: f32,
    /// Model calls per extraction, counting repair prompts
    model_attempts: u32,
}

impl LlamaCppClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        max_tokens: u32,
        temperature: f32,
    ) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/completion", base_url.trim_end_matches('/')),
            max_tokens,
            temperature,
            model_attempts: DEFAULT_MODEL_ATTEMPTS,
        })
    }

    #[must_use]
    pub fn with_model_attempts(mut self, attempts: u32) -> Self {
        self.model_attempts = attempts.max(1);
        self
    }

    async fn complete(&self, prompt: &str) -> ProviderResult<String> {
        let request = CompletionRequest {
            prompt,
            n_predict: self.max_tokens,
            temperature: self.temperature,
            stop: STOP_SEQUENCES,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("LLM server returned {status}: {}", body.trim());
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                ProviderError::Transient(message)
            } else {
                ProviderError::Failed(message)
            });
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("completion response: {e}")))?;

        debug!(chars = body.content.len(), "LLM completion received");
        Ok(body.content)
    }
}

#[async_trait::async_trait]
impl StructuredExtractor for LlamaCppClient {
    async fn structured_extract(
        &self,
        text: &str,
        schema: &[FieldSpec],
    ) -> ProviderResult<Vec<RawClaim>> {
        extract_with_repair(
            |prompt| async move { self.complete(&prompt).await },
            structured_prompt(text, schema),
            text,
            "claims",
            self.model_attempts,
        )
        .await
    }
}

#[async_trait::async_trait]
impl DiscoveryExtractor for LlamaCppClient {
    async fn discovery_extract(
        &self,
        text: &str,
        max_facts: usize,
    ) -> ProviderResult<Vec<RawClaim>> {
        extract_with_repair(
            |prompt| async move { self.complete(&prompt).await },
            discovery_prompt(text, max_facts),
            text,
            "facts",
            self.model_attempts,
        )
        .await
    }
}

/// Ask the model, and when its answer cannot be parsed ask again with the
/// parse error and a request for bare JSON. Transport errors are returned
/// as-is; only malformed output is repaired.
async fn extract_with_repair<C, F>(
    mut complete: C,
    prompt: String,
    text: &str,
    list_key: &str,
    attempts: u32,
) -> ProviderResult<Vec<RawClaim>>
where
    C: FnMut(String) -> F,
    F: Future<Output = ProviderResult<String>>,
{
    let mut prompt = prompt;
    let mut attempt = 1;
    loop {
        let output = complete(prompt).await?;
        match claims_from_output(&output, list_key) {
            Ok(claims) => return Ok(claims),
            Err(ProviderError::Malformed(reason)) if attempt < attempts => {
                warn!(attempt, list_key, %reason, "model output malformed, sending repair prompt");
                prompt = repair_prompt(text, list_key, &reason);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn classify_request_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() || e.is_connect() {
        ProviderError::Transient(format!("LLM request: {e}"))
    } else {
        ProviderError::Failed(format!("LLM request: {e}"))
    }
}

fn structured_prompt(text: &str, schema: &[FieldSpec]) -> String {
    let mut keys = String::new();
    for field in schema {
        match field.unit {
            Some(unit) => {
                let _ = writeln!(keys, "- {} ({}, unit: {unit})", field.key, field.value_type.as_str());
            }
            None => {
                let _ = writeln!(keys, "- {} ({})", field.key, field.value_type.as_str());
            }
        }
    }

    format!(
        r#"Extract facts about a site from the document below.

Use only these keys. Never invent keys and never guess values.
{keys}
Answer with JSON only, shaped like:
{{"claims": [{{"key": "...", "value": ..., "confidence": 0.0, "evidence": "short exact quote"}}]}}

Document:
"""{text}"""

JSON:
"#
    )
}

fn discovery_prompt(text: &str, max_facts: usize) -> String {
    format!(
        r#"List facts from the document below that matter when judging a site for power, interconnection or battery storage readiness.

Return at most {max_facts} facts. Prefer concrete numbers, identifiers, voltages, capacities, distances, dates, utilities and substations. Omit anything you are unsure of.

Answer with JSON only, shaped like:
{{"facts": [{{"label": "short name", "value": ..., "category": "power|interconnection|zoning|real_estate|equipment|contacts|other", "confidence": 0.0, "evidence": "short exact quote"}}]}}

Document:
"""{text}"""

JSON:
"#
    )
}

fn repair_prompt(text: &str, list_key: &str, reason: &str) -> String {
    format!(
        r#"The previous answer could not be used: {reason}

Answer again with ONLY a JSON object holding a "{list_key}" list. No other text.

Document:
"""{text}"""

JSON:
"#
    )
}

/// First `{...}` span in free-form model output, parsed as JSON.
pub fn parse_json_loose(output: &str) -> ProviderResult<Value> {
    let span = JSON_OBJECT
        .find(output)
        .ok_or_else(|| ProviderError::Malformed("no JSON object in model output".to_string()))?;
    serde_json::from_str(span.as_str())
        .map_err(|e| ProviderError::Malformed(format!("invalid JSON in model output: {e}")))
}

fn claims_from_output(output: &str, list_key: &str) -> ProviderResult<Vec<RawClaim>> {
    let data = parse_json_loose(output)?;
    let items = data
        .get(list_key)
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Malformed(format!("'{list_key}' must be a list")))?;

    Ok(items.iter().filter_map(raw_claim_from_value).collect())
}

/// Lenient field-by-field read; models often quote numbers.
fn raw_claim_from_value(item: &Value) -> Option<RawClaim> {
    let obj = item.as_object()?;
    let text = |name: &str| {
        obj.get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let key = text("key").or_else(|| text("label")).unwrap_or_default();
    let confidence = match obj.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };

    Some(RawClaim {
        key,
        value: obj.get("value").cloned().unwrap_or(Value::Null),
        unit: text("unit"),
        confidence,
        evidence: text("evidence"),
        category: text("category"),
    })
}
