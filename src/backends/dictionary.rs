//! Dictionary backend over the Yandex Dictionary `lookup` API.
//!
//! Supplies lemma, transcription, translation, synonyms and usage examples
//! for single words and short collocations.

use super::{
    BackendKind, BackendResponse, EnrichmentBackend, Lookup, LookupRequest, create_http_client,
    failed_response, non_empty,
};
use crate::config::DictionaryConfig;
use crate::error::BackendError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Maximum usage examples kept from one lookup.
const MAX_EXAMPLES: usize = 3;

/// Top-level lookup response.
#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    def: Vec<Definition>,
}

/// One dictionary article (per part of speech).
#[derive(Debug, Deserialize)]
struct Definition {
    text: String,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    tr: Vec<Translation>,
}

/// One translation of an article.
#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
    #[serde(default)]
    syn: Vec<TextItem>,
    #[serde(default)]
    ex: Vec<Example>,
}

#[derive(Debug, Deserialize)]
struct TextItem {
    text: String,
}

/// Usage example with its translations.
#[derive(Debug, Deserialize)]
struct Example {
    text: String,
    #[serde(default)]
    tr: Vec<TextItem>,
}

/// Dictionary backend.
pub struct DictionaryBackend {
    client: Client,
    config: DictionaryConfig,
}

impl DictionaryBackend {
    /// Creates a new dictionary backend.
    pub fn new(config: DictionaryConfig) -> Result<Self, BackendError> {
        Ok(Self {
            client: create_http_client()?,
            config,
        })
    }

    fn lookup_url(&self, request: &LookupRequest) -> Result<url::Url, BackendError> {
        let lang = format!("{}-{}", request.source_language, request.target_language);
        url::Url::parse_with_params(
            &self.config.endpoint,
            &[
                ("key", self.config.key.as_str()),
                ("lang", lang.as_str()),
                ("text", request.text.as_str()),
            ],
        )
        .map_err(|e| BackendError::Fatal(format!("Invalid dictionary endpoint: {}", e)))
    }
}

#[async_trait]
impl EnrichmentBackend for DictionaryBackend {
    fn name(&self) -> &str {
        "Yandex Dictionary"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Dictionary
    }

    async fn lookup(&self, request: &LookupRequest) -> Result<Lookup, BackendError> {
        let url = self.lookup_url(request)?;
        let response = self.client.get(url).send().await?;

        // 501 means the language pair is unsupported, which retrying won't fix.
        if response.status().as_u16() == 501 {
            return Err(BackendError::Fatal(format!(
                "Language pair {}-{} not supported",
                request.source_language, request.target_language
            )));
        }
        if !response.status().is_success() {
            return failed_response(response).await;
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))?;

        Ok(parse_lookup(body))
    }
}

/// Converts a lookup response into the common backend shape.
fn parse_lookup(body: LookupResponse) -> Lookup {
    let Some(first) = body.def.first() else {
        return Lookup::NotFound;
    };

    let mut translations = body
        .def
        .iter()
        .flat_map(|def| def.tr.iter())
        .filter_map(|tr| non_empty(&tr.text));

    let Some(translation) = translations.next() else {
        return Lookup::NotFound;
    };

    // Remaining translations first, then the listed synonyms.
    let mut synonyms: Vec<String> = translations.collect();
    synonyms.extend(
        body.def
            .iter()
            .flat_map(|def| def.tr.iter())
            .flat_map(|tr| tr.syn.iter())
            .filter_map(|syn| non_empty(&syn.text)),
    );

    let examples = body
        .def
        .iter()
        .flat_map(|def| def.tr.iter())
        .flat_map(|tr| tr.ex.iter())
        .filter_map(|ex| {
            let source = non_empty(&ex.text)?;
            match ex.tr.first().and_then(|t| non_empty(&t.text)) {
                Some(target) => Some(format!("{} - {}", source, target)),
                None => Some(source),
            }
        })
        .take(MAX_EXAMPLES)
        .collect();

    Lookup::Found(BackendResponse {
        lemma: non_empty(&first.text),
        translation: Some(translation),
        transcription: body
            .def
            .iter()
            .find_map(|def| def.ts.as_deref().and_then(non_empty)),
        synonyms,
        examples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Lookup {
        parse_lookup(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_parse_full_article() {
        let json = r#"{"head":{},"def":[
            {"text":"good","pos":"adjective","ts":"ɡʊd","tr":[
                {"text":"хороший","pos":"adjective","syn":[{"text":"добрый"}],
                 "ex":[{"text":"good book","tr":[{"text":"хорошая книга"}]}]},
                {"text":"полезный","pos":"adjective"}
            ]},
            {"text":"good","pos":"noun","tr":[{"text":"благо","pos":"noun"}]}
        ]}"#;

        let Lookup::Found(response) = parse(json) else {
            panic!("expected a result");
        };
        assert_eq!(response.lemma.as_deref(), Some("good"));
        assert_eq!(response.translation.as_deref(), Some("хороший"));
        assert_eq!(response.transcription.as_deref(), Some("ɡʊd"));
        assert_eq!(response.synonyms, vec!["полезный", "благо", "добрый"]);
        assert_eq!(response.examples, vec!["good book - хорошая книга"]);
    }

    #[test]
    fn test_empty_def_is_not_found() {
        assert_eq!(parse(r#"{"head":{},"def":[]}"#), Lookup::NotFound);
        assert_eq!(parse(r#"{"head":{}}"#), Lookup::NotFound);
    }

    #[test]
    fn test_article_without_translations_is_not_found() {
        assert_eq!(
            parse(r#"{"def":[{"text":"zzz","tr":[]}]}"#),
            Lookup::NotFound
        );
    }

    #[test]
    fn test_lookup_url_encodes_text() {
        let backend = DictionaryBackend::new(DictionaryConfig {
            key: "k".to_string(),
            ..DictionaryConfig::default()
        })
        .unwrap();

        let url = backend
            .lookup_url(&LookupRequest {
                text: "give up".to_string(),
                source_language: "en".to_string(),
                target_language: "ru".to_string(),
            })
            .unwrap();
        let query = url.query().unwrap();
        assert!(query.contains("lang=en-ru"));
        assert!(query.contains("text=give+up"));
    }
}
