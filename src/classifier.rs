//! Entry classification: single word, short phrase, or sentence.
//!
//! Pure and deterministic. Runs on every block before any I/O happens.

use crate::clippings::ClippingBlock;
use crate::config::ClassifierConfig;
use crate::utils::{clean_text, is_word_token};
use std::collections::HashSet;

/// How an entry should be treated by the rest of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// One or two words, looked up in the dictionary.
    SingleWord,
    /// An idiom, phrasal verb or short phrase, translated as a unit.
    ShortPhrase,
    /// Too long to be vocabulary; dropped before enrichment.
    Sentence,
}

/// A clipping annotated with its category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedEntry {
    /// Position of the source block in the export.
    pub index: usize,
    /// Book the clipping came from.
    pub book_title: String,
    /// Highlight with edge punctuation stripped and whitespace collapsed.
    pub text: String,
    /// Assigned category.
    pub category: Category,
    /// Number of word tokens in `text`.
    pub word_count: usize,
    /// Matched one of the configured multi-word expressions.
    pub idiomatic: bool,
}

/// Classifies clippings using configured thresholds and expressions.
#[derive(Debug, Clone)]
pub struct Classifier {
    single_word_max_words: usize,
    max_phrase_words: usize,
    expressions: HashSet<String>,
}

impl Classifier {
    /// Builds a classifier, normalizing every configured expression.
    pub fn new(config: &ClassifierConfig) -> Self {
        let expressions = config
            .expressions
            .iter()
            .map(|e| clean_text(e).to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Self {
            single_word_max_words: config.single_word_max_words,
            max_phrase_words: config.max_phrase_words,
            expressions,
        }
    }

    /// Classifies one clipping.
    pub fn classify(&self, block: &ClippingBlock) -> ClassifiedEntry {
        let text = clean_text(&block.highlight_text);
        let word_count = count_words(&text);
        let idiomatic = self.is_expression(&text);

        let category = if idiomatic {
            Category::ShortPhrase
        } else if word_count <= self.single_word_max_words {
            Category::SingleWord
        } else if word_count <= self.max_phrase_words {
            Category::ShortPhrase
        } else {
            Category::Sentence
        };

        ClassifiedEntry {
            index: block.index,
            book_title: block.book_title.clone(),
            text,
            category,
            word_count,
            idiomatic,
        }
    }

    /// Whether the text is a known expression, ignoring case and a leading "to".
    fn is_expression(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        if self.expressions.contains(&lower) {
            return true;
        }
        lower
            .strip_prefix("to ")
            .is_some_and(|rest| self.expressions.contains(rest.trim()))
    }
}

/// Counts whitespace-separated tokens that contain a letter or digit.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().filter(|t| is_word_token(t)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clippings::ClipKind;

    fn block(text: &str) -> ClippingBlock {
        ClippingBlock {
            index: 0,
            book_title: "Book".to_string(),
            location_info: String::new(),
            timestamp_raw: String::new(),
            highlight_text: text.to_string(),
            kind: ClipKind::Highlight,
        }
    }

    fn classifier() -> Classifier {
        Classifier::new(&ClassifierConfig::default())
    }

    #[test]
    fn test_single_word() {
        let entry = classifier().classify(&block("better,"));
        assert_eq!(entry.category, Category::SingleWord);
        assert_eq!(entry.word_count, 1);
        assert_eq!(entry.text, "better");
        assert!(!entry.idiomatic);
    }

    #[test]
    fn test_two_words_without_idiom_is_single_word() {
        let entry = classifier().classify(&block("wooden spoon"));
        assert_eq!(entry.category, Category::SingleWord);
        assert_eq!(entry.word_count, 2);
    }

    #[test]
    fn test_idiom_forces_phrase() {
        let entry = classifier().classify(&block("Give  up"));
        assert_eq!(entry.category, Category::ShortPhrase);
        assert!(entry.idiomatic);

        let entry = classifier().classify(&block("to give up."));
        assert_eq!(entry.category, Category::ShortPhrase);
        assert!(entry.idiomatic);
    }

    #[test]
    fn test_phrase_range() {
        let entry = classifier().classify(&block("a stone's throw away"));
        assert_eq!(entry.category, Category::ShortPhrase);
        assert_eq!(entry.word_count, 4);
    }

    #[test]
    fn test_sentence_above_threshold() {
        let entry =
            classifier().classify(&block("It was the best of times, it was the worst of times."));
        assert_eq!(entry.category, Category::Sentence);
        assert!(entry.word_count > 6);
    }

    #[test]
    fn test_punctuation_tokens_ignored() {
        assert_eq!(count_words("well \u{2014} then -- ok"), 3);
        assert_eq!(count_words(""), 0);
    }

    #[test]
    fn test_long_idiom_still_phrase() {
        let mut config = ClassifierConfig::default();
        config.max_phrase_words = 3;
        let classifier = Classifier::new(&config);

        let entry = classifier.classify(&block("once in a blue moon"));
        assert_eq!(entry.category, Category::ShortPhrase);
    }

    #[test]
    fn test_deterministic() {
        let c = classifier();
        let b = block("look forward to");
        assert_eq!(c.classify(&b), c.classify(&b));
    }
}
