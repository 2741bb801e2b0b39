//! Semantic link judge backed by an OpenAI-compatible chat completions API

use super::{ValidationRequest, ValidatorBackend};
use crate::error::{LinkError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Verdict format the model is asked to return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkVerdict {
    pub valid: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone)]
pub struct LlmValidator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmValidator {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
        }
    }

    /// `OPENAI_API_KEY` (required), `OPENAI_MODEL`, `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| LinkError::Config("OPENAI_API_KEY is not set".to_string()))?;
        Ok(Self::new(
            api_key,
            std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4".to_string()),
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        ))
    }

    pub fn build_prompt(request: &ValidationRequest<'_>) -> String {
        let scored = request.scored;
        let (from_samples, to_samples) = request.samples();
        let render = |samples: Vec<(&str, &[String])>| -> String {
            samples
                .iter()
                .map(|(col, values)| {
                    let shown: Vec<&str> = values.iter().take(5).map(String::as_str).collect();
                    format!("{}: [{}]", col, shown.join(", "))
                })
                .collect::<Vec<_>>()
                .join("; ")
        };

        format!(
            r#"Decide whether these columns form a real foreign-key relationship or a coincidental value overlap.
Table 1: {} columns {:?} samples {}
Table 2: {} columns {:?} samples {}
Shared distinct values: {} (coverage {:.2} / {:.2})
Return JSON only: {{"valid": true|false, "message": "short reason"}}"#,
            scored.candidate.dataset_a,
            scored.candidate.columns_a,
            render(from_samples),
            scored.candidate.dataset_b,
            scored.candidate.columns_b,
            render(to_samples),
            scored.intersect_count,
            scored.intersect_ratio_from_col,
            scored.intersect_ratio_to_col,
        )
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "Return JSON only, no text."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.1,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LinkError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LinkError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LinkError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        response_json["choices"][0]["message"]["content"]
            .as_str()
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .ok_or_else(|| LinkError::Llm(format!("No content in LLM response: {}", response_json)))
    }
}

/// Parse a verdict, tolerating markdown code fences around the JSON.
pub fn parse_verdict(raw: &str) -> Result<LinkVerdict> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str(cleaned)
        .map_err(|e| LinkError::Validation(format!("Failed to parse verdict: {}. Response: {}", e, cleaned)))
}

#[async_trait]
impl ValidatorBackend for LlmValidator {
    async fn validate(&self, request: &ValidationRequest<'_>) -> Result<bool> {
        let prompt = Self::build_prompt(request);
        let raw = self.call_llm(&prompt).await?;
        let verdict = parse_verdict(&raw)?;
        if verdict.valid {
            debug!("LLM accepted link: {}", verdict.message);
        } else {
            info!(
                "LLM rejected link {}.{:?} <-> {}.{:?}: {}",
                request.scored.candidate.dataset_a,
                request.scored.candidate.columns_a,
                request.scored.candidate.dataset_b,
                request.scored.candidate.columns_b,
                verdict.message
            );
        }
        Ok(verdict.valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_verdict() {
        let verdict = parse_verdict("```json\n{\"valid\": false, \"message\": \"dates\"}\n```").unwrap();
        assert!(!verdict.valid);
        assert_eq!(verdict.message, "dates");
    }

    #[test]
    fn test_message_is_optional() {
        assert!(parse_verdict(r#"{"valid": true}"#).unwrap().valid);
    }

    #[test]
    fn test_garbage_is_a_validation_error() {
        let err = parse_verdict("Sure! These look related.").unwrap_err();
        assert!(matches!(err, LinkError::Validation(_)));
    }
}
