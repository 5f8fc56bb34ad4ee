//! CSV emitter producing one flashcard file per book.
//!
//! Files follow the ReWord import layout: UTF-8 with BOM, `;` delimited,
//! every field quoted, CRLF line endings.

use crate::config::{CsvLayout, OutputConfig};
use crate::error::EmitError;
use crate::normalize::EnrichedEntry;
use crate::utils::sanitize_filename;
use chrono::Local;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::info;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

const REWORD_HEADER: [&str; 5] = [
    "Word",
    "Transcription",
    "Translation",
    "Example",
    "Ex.Translation",
];

const EXTENDED_HEADER: [&str; 5] = ["Word", "Translation", "Transcription", "Synonyms", "Example"];

/// Date stamp appended to written file names.
const FILE_DATE_FORMAT: &str = "%d.%m.%Y__%H-%M";

/// Separator between an example and its translation.
const EXAMPLE_SEPARATOR: &str = " - ";

/// The CSV document for one book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSection {
    /// Book title as it appeared in the export.
    pub title: String,
    /// File name, unique within one emission.
    pub file_name: String,
    /// Number of cards in the document.
    pub entries: usize,
    /// Encoded document, BOM included.
    pub content: Vec<u8>,
}

/// Groups entries by book and renders each group as CSV.
///
/// Books appear in order of their first entry; entries keep file order.
pub fn emit(
    entries: &[EnrichedEntry],
    config: &OutputConfig,
) -> Result<Vec<BookSection>, EmitError> {
    let mut ordered: Vec<&EnrichedEntry> = entries.iter().collect();
    ordered.sort_by_key(|e| e.index);

    let mut groups: Vec<(&str, Vec<&EnrichedEntry>)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for entry in ordered {
        if entry.translation.trim().is_empty() {
            return Err(EmitError::EmptyTranslation {
                book: entry.book_title.clone(),
                text: entry.source_text.clone(),
            });
        }

        let title = entry.book_title.as_str();
        let position = *positions.entry(title).or_insert_with(|| {
            groups.push((title, Vec::new()));
            groups.len() - 1
        });
        groups[position].1.push(entry);
    }

    let mut used_names = HashSet::new();
    let mut sections = Vec::with_capacity(groups.len());
    for (title, group) in groups {
        sections.push(BookSection {
            title: title.to_string(),
            file_name: unique_file_name(title, &mut used_names),
            entries: group.len(),
            content: render(&group, config)?,
        });
    }

    Ok(sections)
}

/// Writes every section into `directory`, returning the created paths.
///
/// Names get the current date and time, `Dune_03.06.2024__10-15.csv`, and
/// never replace an existing file: a taken name is numbered instead.
pub async fn write_sections(
    sections: &[BookSection],
    directory: &Path,
) -> Result<Vec<PathBuf>, EmitError> {
    tokio::fs::create_dir_all(directory).await?;
    let stamp = Local::now().format(FILE_DATE_FORMAT).to_string();

    let mut written = Vec::with_capacity(sections.len());
    for section in sections {
        let path = free_path(directory, &section.file_name, &stamp).await?;
        tokio::fs::write(&path, &section.content).await?;
        info!(path = %path.display(), cards = section.entries, "CSV saved");
        written.push(path);
    }
    Ok(written)
}

/// First `<stem>_<stamp>.csv` in `directory` that does not exist yet.
async fn free_path(
    directory: &Path,
    file_name: &str,
    stamp: &str,
) -> Result<PathBuf, EmitError> {
    let stem = file_name.strip_suffix(".csv").unwrap_or(file_name);
    let mut path = directory.join(format!("{}_{}.csv", stem, stamp));
    let mut counter = 2;
    while tokio::fs::try_exists(&path).await? {
        path = directory.join(format!("{}_{} ({}).csv", stem, stamp, counter));
        counter += 1;
    }
    Ok(path)
}

/// Meanings for the Translation column: the main translation, then synonyms
/// not already present.
fn meanings(entry: &EnrichedEntry, max_synonyms: usize) -> String {
    let mut seen = HashSet::from([entry.translation.to_lowercase()]);
    let synonyms = entry
        .synonyms
        .iter()
        .filter(|s| !s.trim().is_empty() && seen.insert(s.to_lowercase()))
        .take(max_synonyms);

    std::iter::once(&entry.translation)
        .chain(synonyms)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Splits `"Never give up - Никогда не сдавайся"` into its two sides.
fn split_example(example: &str) -> (String, String) {
    match example.split_once(EXAMPLE_SEPARATOR) {
        Some((source, target)) => (source.trim().to_string(), target.trim().to_string()),
        None => (example.trim().to_string(), String::new()),
    }
}

/// One CSV row for an entry.
fn card(entry: &EnrichedEntry, config: &OutputConfig) -> [String; 5] {
    let transcription = entry.transcription.clone().unwrap_or_default();
    let example = entry.examples.first().map(String::as_str).unwrap_or_default();

    match config.layout {
        CsvLayout::Reword => {
            let (example, example_translation) = split_example(example);
            [
                entry.lemma.clone(),
                transcription,
                meanings(entry, config.max_synonyms),
                example,
                example_translation,
            ]
        }
        CsvLayout::Extended => {
            let synonyms: Vec<&str> = entry
                .synonyms
                .iter()
                .take(config.max_synonyms)
                .map(String::as_str)
                .collect();
            [
                entry.lemma.clone(),
                entry.translation.clone(),
                transcription,
                synonyms.join(", "),
                example.to_string(),
            ]
        }
    }
}

fn render(entries: &[&EnrichedEntry], config: &OutputConfig) -> Result<Vec<u8>, EmitError> {
    let mut writer = WriterBuilder::new()
        .delimiter(b';')
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::CRLF)
        .from_writer(UTF8_BOM.to_vec());

    if config.include_header {
        writer.write_record(match config.layout {
            CsvLayout::Reword => REWORD_HEADER,
            CsvLayout::Extended => EXTENDED_HEADER,
        })?;
    }
    for entry in entries {
        writer.write_record(card(entry, config))?;
    }

    writer
        .into_inner()
        .map_err(|e| EmitError::Buffer(e.to_string()))
}

/// Sanitized `<title>.csv`, numbered when two titles collide.
fn unique_file_name(title: &str, used: &mut HashSet<String>) -> String {
    let stem = sanitize_filename(title);
    let mut name = format!("{}.csv", stem);
    let mut counter = 2;
    while !used.insert(name.to_lowercase()) {
        name = format!("{} ({}).csv", stem, counter);
        counter += 1;
    }
    name
}
