//! Merges backend responses into one canonical record.

use crate::backends::{BackendKind, BackendResponse};
use crate::classifier::ClassifiedEntry;
use crate::utils::collapse_whitespace;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Precedence for lemma and translation.
const MEANING_PRECEDENCE: [BackendKind; 3] = [
    BackendKind::Lemmatizer,
    BackendKind::Translation,
    BackendKind::Dictionary,
];

/// Precedence for transcription, synonyms and examples.
const DETAIL_PRECEDENCE: [BackendKind; 3] = [
    BackendKind::Dictionary,
    BackendKind::Lemmatizer,
    BackendKind::Translation,
];

/// Final record ready for export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedEntry {
    /// Position of the source block in the export.
    pub index: usize,
    /// Book the clipping came from.
    pub book_title: String,
    /// Cleaned highlight text.
    pub source_text: String,
    /// Dictionary base form; equals `source_text` when unknown.
    pub lemma: String,
    /// Never empty.
    pub translation: String,
    pub transcription: Option<String>,
    pub synonyms: Vec<String>,
    pub examples: Vec<String>,
    /// Backend that supplied the translation.
    pub backend_used: BackendKind,
}

/// Builds an [`EnrichedEntry`] from the responses collected for `entry`.
///
/// Returns `None` when no response carries a translation.
pub fn normalize(
    entry: &ClassifiedEntry,
    responses: &[(BackendKind, BackendResponse)],
) -> Option<EnrichedEntry> {
    let (translation, backend_used) =
        pick(responses, &MEANING_PRECEDENCE, |r| r.translation.as_deref())?;
    let lemma = pick(responses, &MEANING_PRECEDENCE, |r| r.lemma.as_deref())
        .map(|(lemma, _)| lemma)
        .unwrap_or_else(|| entry.text.clone());
    let transcription =
        pick(responses, &DETAIL_PRECEDENCE, |r| r.transcription.as_deref()).map(|(t, _)| t);

    let excluded = [translation.to_lowercase(), entry.text.to_lowercase()];
    let synonyms = merge_lists(responses, |r| &r.synonyms, &excluded);
    let examples = merge_lists(responses, |r| &r.examples, &[]);

    Some(EnrichedEntry {
        index: entry.index,
        book_title: entry.book_title.clone(),
        source_text: entry.text.clone(),
        lemma,
        translation,
        transcription,
        synonyms,
        examples,
        backend_used,
    })
}

/// Ordered view of the responses following a precedence list. Responses of
/// the same kind keep their arrival order.
fn ordered<'a>(
    responses: &'a [(BackendKind, BackendResponse)],
    precedence: &'a [BackendKind],
) -> impl Iterator<Item = &'a (BackendKind, BackendResponse)> + 'a {
    precedence
        .iter()
        .flat_map(move |kind| responses.iter().filter(move |(k, _)| k == kind))
}

/// First non-empty value of a field, with the backend that supplied it.
fn pick<F>(
    responses: &[(BackendKind, BackendResponse)],
    precedence: &[BackendKind],
    field: F,
) -> Option<(String, BackendKind)>
where
    F: Fn(&BackendResponse) -> Option<&str>,
{
    ordered(responses, precedence).find_map(|(kind, response)| {
        let value = collapse_whitespace(field(response)?);
        (!value.is_empty()).then_some((value, *kind))
    })
}

/// Merges a list field from every response, dictionary first, dropping
/// empties, case-insensitive duplicates and excluded values.
fn merge_lists<F>(
    responses: &[(BackendKind, BackendResponse)],
    field: F,
    excluded: &[String],
) -> Vec<String>
where
    F: Fn(&BackendResponse) -> &Vec<String>,
{
    let mut seen: HashSet<String> = excluded.iter().cloned().collect();
    let mut merged = Vec::new();

    for (_, response) in ordered(responses, &DETAIL_PRECEDENCE) {
        for item in field(response) {
            let value = collapse_whitespace(item);
            if value.is_empty() {
                continue;
            }
            if seen.insert(value.to_lowercase()) {
                merged.push(value);
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Category;

    fn entry(text: &str) -> ClassifiedEntry {
        ClassifiedEntry {
            index: 3,
            book_title: "Book".to_string(),
            text: text.to_string(),
            category: Category::SingleWord,
            word_count: 1,
            idiomatic: false,
        }
    }

    fn response(lemma: Option<&str>, translation: Option<&str>) -> BackendResponse {
        BackendResponse {
            lemma: lemma.map(str::to_string),
            translation: translation.map(str::to_string),
            ..BackendResponse::default()
        }
    }

    #[test]
    fn test_single_dictionary_response() {
        let mut dict = response(Some("good"), Some("лучше"));
        dict.transcription = Some(" ˈbetə ".to_string());
        dict.synonyms = vec!["лучший".to_string(), "Лучший".to_string(), "лучше".to_string()];

        let result = normalize(&entry("better"), &[(BackendKind::Dictionary, dict)]).unwrap();
        assert_eq!(result.lemma, "good");
        assert_eq!(result.translation, "лучше");
        assert_eq!(result.transcription.as_deref(), Some("ˈbetə"));
        assert_eq!(result.synonyms, vec!["лучший"]);
        assert_eq!(result.backend_used, BackendKind::Dictionary);
        assert_eq!(result.index, 3);
    }

    #[test]
    fn test_llm_wins_meaning_dictionary_wins_details() {
        let mut dict = response(Some("bettered"), Some("улучшенный"));
        dict.transcription = Some("ˈbetə".to_string());
        dict.examples = vec!["a better life - лучшая жизнь".to_string()];

        let mut llm = response(Some("good"), Some("лучше"));
        llm.examples = vec!["much better - гораздо лучше".to_string()];

        let result = normalize(
            &entry("better"),
            &[(BackendKind::Dictionary, dict), (BackendKind::Lemmatizer, llm)],
        )
        .unwrap();

        assert_eq!(result.lemma, "good");
        assert_eq!(result.translation, "лучше");
        assert_eq!(result.backend_used, BackendKind::Lemmatizer);
        assert_eq!(result.transcription.as_deref(), Some("ˈbetə"));
        assert_eq!(
            result.examples,
            vec!["a better life - лучшая жизнь", "much better - гораздо лучше"]
        );
        assert!(result.synonyms.is_empty());
    }

    #[test]
    fn test_empty_values_never_override() {
        let dict = response(Some("run"), Some("бежать"));
        let llm = response(Some("   "), Some(""));

        let result = normalize(
            &entry("ran"),
            &[(BackendKind::Dictionary, dict), (BackendKind::Lemmatizer, llm)],
        )
        .unwrap();
        assert_eq!(result.lemma, "run");
        assert_eq!(result.translation, "бежать");
        assert_eq!(result.backend_used, BackendKind::Dictionary);
    }

    #[test]
    fn test_lemma_defaults_to_source() {
        let result = normalize(
            &entry("give up"),
            &[(BackendKind::Translation, response(None, Some("сдаться")))],
        )
        .unwrap();
        assert_eq!(result.lemma, "give up");
        assert!(result.transcription.is_none());
    }

    #[test]
    fn test_no_translation_yields_none() {
        assert!(normalize(&entry("x"), &[]).is_none());
        assert!(
            normalize(
                &entry("x"),
                &[(BackendKind::Dictionary, response(Some("x"), None))]
            )
            .is_none()
        );
    }

    #[test]
    fn test_text_collapsed() {
        let result = normalize(
            &entry("w"),
            &[(BackendKind::Translation, response(None, Some("  два \n слова ")))],
        )
        .unwrap();
        assert_eq!(result.translation, "два слова");
    }
}
