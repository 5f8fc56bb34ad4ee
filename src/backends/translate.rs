//! Machine translation backend over Yandex Cloud Translate (v2).
//!
//! Handles any length of text but only returns a bare translation.

use super::{
    BackendKind, BackendResponse, EnrichmentBackend, Lookup, LookupRequest, create_http_client,
    failed_response, non_empty,
};
use crate::config::TranslationApiConfig;
use crate::error::BackendError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Request body for the translate endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateRequest<'a> {
    folder_id: &'a str,
    texts: Vec<&'a str>,
    source_language_code: &'a str,
    target_language_code: &'a str,
}

/// Response from the translate endpoint.
#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    translations: Vec<TranslatedText>,
}

#[derive(Debug, Deserialize)]
struct TranslatedText {
    text: String,
}

/// Machine translation backend.
pub struct TranslationBackend {
    client: Client,
    config: TranslationApiConfig,
}

impl TranslationBackend {
    /// Creates a new translation backend.
    pub fn new(config: TranslationApiConfig) -> Result<Self, BackendError> {
        Ok(Self {
            client: create_http_client()?,
            config,
        })
    }
}

#[async_trait]
impl EnrichmentBackend for TranslationBackend {
    fn name(&self) -> &str {
        "Yandex Translate"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Translation
    }

    async fn lookup(&self, request: &LookupRequest) -> Result<Lookup, BackendError> {
        let body = TranslateRequest {
            folder_id: &self.config.folder_id,
            texts: vec![request.text.as_str()],
            source_language_code: &request.source_language,
            target_language_code: &request.target_language,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Api-Key {}", self.config.key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return failed_response(response).await;
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))?;

        Ok(parse_translation(&request.text, parsed))
    }
}

/// An empty result, or one that just echoes the input, counts as not found.
fn parse_translation(source: &str, response: TranslateResponse) -> Lookup {
    let translation = response
        .translations
        .into_iter()
        .find_map(|t| non_empty(&t.text));

    match translation {
        Some(text) if !text.eq_ignore_ascii_case(source.trim()) => {
            Lookup::Found(BackendResponse {
                translation: Some(text),
                ..BackendResponse::default()
            })
        }
        _ => Lookup::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str, json: &str) -> Lookup {
        parse_translation(source, serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_parse_translation() {
        let lookup = parse(
            "break the ice",
            r#"{"translations":[{"text":"растопить лёд","detectedLanguageCode":"en"}]}"#,
        );
        let Lookup::Found(response) = lookup else {
            panic!("expected a translation");
        };
        assert_eq!(response.translation.as_deref(), Some("растопить лёд"));
        assert!(response.lemma.is_none());
        assert!(response.synonyms.is_empty());
    }

    #[test]
    fn test_echo_is_not_found() {
        assert_eq!(
            parse("Qwzx", r#"{"translations":[{"text":"qwzx"}]}"#),
            Lookup::NotFound
        );
    }

    #[test]
    fn test_empty_is_not_found() {
        assert_eq!(parse("word", r#"{"translations":[]}"#), Lookup::NotFound);
        assert_eq!(parse("word", r#"{}"#), Lookup::NotFound);
    }

    #[test]
    fn test_request_shape() {
        let body = TranslateRequest {
            folder_id: "b1g",
            texts: vec!["word"],
            source_language_code: "en",
            target_language_code: "ru",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"folderId\":\"b1g\""));
        assert!(json.contains("\"sourceLanguageCode\":\"en\""));
    }
}
