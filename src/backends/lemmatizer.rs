//! LLM lemmatizer backend using OpenAI-compatible chat APIs.
//!
//! Asks the model for the dictionary form and a translation of a word or
//! multi-word expression, returned as a small JSON object.

use super::{
    BackendKind, BackendResponse, EnrichmentBackend, Lookup, LookupRequest, create_http_client,
    failed_response, non_empty,
};
use crate::config::LemmatizerConfig;
use crate::error::BackendError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Regex to extract JSON from markdown code fences.
static CODE_FENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").expect("Invalid CODE_FENCE_REGEX")
});

/// Refusal phrases that indicate the model declined to answer.
const REFUSAL_PHRASES: &[&str] = &[
    "i'm sorry",
    "i cannot",
    "i am unable",
    "as an ai",
    "my apologies",
];

/// Request body for the chat completions API.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

/// A message in the conversation.
#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Response from the chat completions API.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

/// A single choice in the response.
#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

/// Message content in a response.
#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// JSON object the model is asked to produce.
#[derive(Debug, Deserialize)]
struct ParsedEntry {
    #[serde(default)]
    not_found: bool,
    lemma: Option<String>,
    translation: Option<String>,
    #[serde(default)]
    synonyms: Vec<String>,
    #[serde(default)]
    examples: Vec<String>,
}

/// LLM-based lemmatizer and contextual translator.
pub struct LemmatizerBackend {
    client: Client,
    config: LemmatizerConfig,
}

impl LemmatizerBackend {
    /// Creates a new lemmatizer backend.
    pub fn new(config: LemmatizerConfig) -> Result<Self, BackendError> {
        Ok(Self {
            client: create_http_client()?,
            config,
        })
    }

    fn system_prompt(&self, request: &LookupRequest) -> String {
        self.config
            .prompt
            .replace("{source}", &request.source_language)
            .replace("{target}", &request.target_language)
    }

    /// Call the model and return its raw answer, or the lookup outcome an
    /// HTTP failure stands for.
    async fn call_model(
        &self,
        request: &LookupRequest,
    ) -> Result<Result<String, Lookup>, BackendError> {
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: self.system_prompt(request),
                },
                Message {
                    role: "user".to_string(),
                    content: request.text.clone(),
                },
            ],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return failed_response(response).await.map(Err);
        }

        let response_body: ChatResponse = response.json().await.map_err(|e| {
            BackendError::ParseError(format!("Failed to parse API response: {}", e))
        })?;

        let content = response_body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BackendError::ParseError("No choices in API response".to_string()))?;

        Ok(Ok(content.trim().to_string()))
    }
}

#[async_trait]
impl EnrichmentBackend for LemmatizerBackend {
    fn name(&self) -> &str {
        "LLM lemmatizer"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Lemmatizer
    }

    async fn lookup(&self, request: &LookupRequest) -> Result<Lookup, BackendError> {
        match self.call_model(request).await? {
            Ok(raw) => parse_response(&raw),
            Err(lookup) => Ok(lookup),
        }
    }
}

/// Parse the model answer into a lookup outcome.
fn parse_response(raw: &str) -> Result<Lookup, BackendError> {
    let trimmed = raw.trim();

    let lower = trimmed.to_lowercase();
    if REFUSAL_PHRASES.iter().any(|p| lower.starts_with(p)) {
        return Ok(Lookup::NotFound);
    }

    // Remove markdown code fence if present
    let json_str = match CODE_FENCE_REGEX.captures(trimmed) {
        Some(captures) => captures.get(1).map_or(trimmed, |m| m.as_str()),
        None => trimmed,
    };

    let json_content = match (json_str.find('{'), json_str.rfind('}')) {
        (Some(s), Some(e)) if s < e => &json_str[s..=e],
        _ => {
            return Err(BackendError::ParseError(
                "No valid JSON object found".to_string(),
            ));
        }
    };

    let parsed: ParsedEntry = serde_json::from_str(json_content)
        .map_err(|e| BackendError::ParseError(format!("JSON parse error: {}", e)))?;

    let translation = parsed.translation.as_deref().and_then(non_empty);
    if parsed.not_found || translation.is_none() {
        return Ok(Lookup::NotFound);
    }

    Ok(Lookup::Found(BackendResponse {
        lemma: parsed.lemma.as_deref().and_then(non_empty),
        translation,
        transcription: None,
        synonyms: parsed.synonyms,
        examples: parsed.examples,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_json() {
        let raw = r#"{"lemma":"give up","translation":"сдаваться","synonyms":["бросать"],"examples":["Never give up - Никогда не сдавайся"]}"#;

        let Lookup::Found(response) = parse_response(raw).unwrap() else {
            panic!("expected a result");
        };
        assert_eq!(response.lemma.as_deref(), Some("give up"));
        assert_eq!(response.translation.as_deref(), Some("сдаваться"));
        assert_eq!(response.synonyms, vec!["бросать"]);
        assert_eq!(response.examples.len(), 1);
        assert!(response.transcription.is_none());
    }

    #[test]
    fn test_parse_json_with_code_fence() {
        let raw = "```json\n{\"lemma\":\"good\",\"translation\":\"хороший\"}\n```";

        let Lookup::Found(response) = parse_response(raw).unwrap() else {
            panic!("expected a result");
        };
        assert_eq!(response.lemma.as_deref(), Some("good"));
    }

    #[test]
    fn test_parse_json_with_surrounding_text() {
        let raw = "Sure! Here it is:\n{\"lemma\":\"run\",\"translation\":\"бежать\"}\nHope this helps.";
        assert!(matches!(parse_response(raw).unwrap(), Lookup::Found(_)));
    }

    #[test]
    fn test_not_found_flag() {
        assert_eq!(
            parse_response(r#"{"not_found":true}"#).unwrap(),
            Lookup::NotFound
        );
    }

    #[test]
    fn test_missing_translation_is_not_found() {
        assert_eq!(
            parse_response(r#"{"lemma":"x","translation":"  "}"#).unwrap(),
            Lookup::NotFound
        );
    }

    #[test]
    fn test_refusal_is_not_found() {
        assert_eq!(
            parse_response("I'm sorry, but I cannot help with that.").unwrap(),
            Lookup::NotFound
        );
    }

    #[test]
    fn test_parse_invalid_json() {
        let result = parse_response("This is not JSON at all");
        assert!(matches!(result, Err(BackendError::ParseError(_))));
    }

    #[test]
    fn test_prompt_substitution() {
        let backend = LemmatizerBackend::new(LemmatizerConfig::default()).unwrap();
        let prompt = backend.system_prompt(&LookupRequest {
            text: "better".to_string(),
            source_language: "en".to_string(),
            target_language: "de".to_string(),
        });
        assert!(prompt.contains("\"en\""));
        assert!(prompt.contains("de translation"));
        assert!(!prompt.contains("{target}"));
    }
}
