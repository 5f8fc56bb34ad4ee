//! Parser for the Kindle `My Clippings.txt` export.
//!
//! The export is a log of blocks separated by a line of `=` characters:
//!
//! ```text
//! Short Story (Jane Doe)
//! - Your Highlight on Location 10-10 | Added on Monday, 3 June 2024 10:15:02
//!
//! better
//! ==========
//! ```
//!
//! Blocks are split at the byte level and decoded one at a time, so a single
//! badly encoded entry never spoils its neighbours. A segment that is not
//! valid UTF-8 is read as Windows-1251, which older Russian-locale devices and
//! converters produce.

use crate::utils::is_word_token;
use encoding_rs::WINDOWS_1251;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Byte-order mark, which the device writes at the start of many titles.
const BOM: char = '\u{feff}';

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Minimum run of `=` characters recognised as a block separator.
const SEPARATOR_MIN_LEN: usize = 5;

/// Trailing parenthesised annotation on a title line, usually the author.
static TITLE_ANNOTATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^()]*\)\s*$").expect("Invalid TITLE_ANNOTATION_REGEX"));

/// What kind of clipping a block holds, read from its metadata line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipKind {
    Highlight,
    Note,
    Bookmark,
    Unknown,
}

impl ClipKind {
    fn from_metadata(metadata: &str) -> Self {
        let lower = metadata.to_lowercase();
        if lower.contains("highlight") {
            ClipKind::Highlight
        } else if lower.contains("note") {
            ClipKind::Note
        } else if lower.contains("bookmark") {
            ClipKind::Bookmark
        } else {
            ClipKind::Unknown
        }
    }
}

/// One raw clipping extracted from the export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClippingBlock {
    /// Position among the blocks yielded by the parser (0-based).
    pub index: usize,
    /// Book title without the trailing author annotation.
    pub book_title: String,
    /// Metadata describing the clipping type and location.
    pub location_info: String,
    /// The "Added on ..." part of the metadata line, unparsed.
    pub timestamp_raw: String,
    /// Highlighted text, lines joined by single spaces.
    pub highlight_text: String,
    /// Highlight, note or bookmark.
    pub kind: ClipKind,
}

/// Counters describing how the segments of an export were handled.
///
/// `segments == blocks + malformed + empty` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Non-blank separator-delimited segments seen.
    pub segments: usize,
    /// Segments turned into blocks.
    pub blocks: usize,
    /// Segments with fewer than two non-empty lines.
    pub malformed: usize,
    /// Segments without any highlighted text (bookmarks and the like).
    pub empty: usize,
}

/// Lazy iterator over the clipping blocks of an export.
///
/// Call [`ClippingParser::stats`] once iteration has finished to read the
/// skip counters.
pub struct ClippingParser<'a> {
    lines: std::slice::Split<'a, u8, fn(&u8) -> bool>,
    stats: ParseStats,
    finished: bool,
}

impl<'a> ClippingParser<'a> {
    /// Creates a parser over the raw bytes of an export.
    pub fn new(raw: &'a [u8]) -> Self {
        let is_newline: fn(&u8) -> bool = |b| *b == b'\n';
        Self {
            lines: raw.split(is_newline),
            stats: ParseStats::default(),
            finished: false,
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    /// Collects the byte lines of the next segment, or `None` at end of input.
    fn next_segment(&mut self) -> Option<Vec<&'a [u8]>> {
        if self.finished {
            return None;
        }

        let mut segment = Vec::new();
        loop {
            match self.lines.next() {
                Some(line) if is_separator(line) => return Some(segment),
                Some(line) => segment.push(line),
                None => {
                    self.finished = true;
                    return Some(segment);
                }
            }
        }
    }
}

impl Iterator for ClippingParser<'_> {
    type Item = ClippingBlock;

    fn next(&mut self) -> Option<ClippingBlock> {
        while let Some(raw_lines) = self.next_segment() {
            let lines = decode_segment(&raw_lines);

            if lines.is_empty() {
                continue;
            }
            self.stats.segments += 1;

            match parse_segment(&lines, self.stats.blocks) {
                Segment::Block(block) => {
                    self.stats.blocks += 1;
                    return Some(block);
                }
                Segment::Malformed => self.stats.malformed += 1,
                Segment::Empty => self.stats.empty += 1,
            }
        }
        None
    }
}

/// Parses a whole export eagerly, returning the blocks and the final stats.
pub fn parse_clippings(raw: &[u8]) -> (Vec<ClippingBlock>, ParseStats) {
    let mut parser = ClippingParser::new(raw);
    let blocks: Vec<ClippingBlock> = parser.by_ref().collect();
    (blocks, parser.stats())
}

enum Segment {
    Block(ClippingBlock),
    Malformed,
    Empty,
}

fn parse_segment(lines: &[String], index: usize) -> Segment {
    if lines.len() < 2 {
        return Segment::Malformed;
    }

    let book_title = clean_title(&lines[0]);
    let metadata = &lines[1];
    let highlight_text = lines[2..].join(" ");

    if !is_word_token(&highlight_text) {
        return Segment::Empty;
    }

    let (location_info, timestamp_raw) = split_metadata(metadata);

    Segment::Block(ClippingBlock {
        index,
        book_title,
        location_info,
        timestamp_raw,
        highlight_text,
        kind: ClipKind::from_metadata(metadata),
    })
}

/// Decodes the non-empty lines of a segment, dropping BOMs and edge whitespace.
///
/// The segment is UTF-8 when every line is, otherwise the whole segment is
/// read as Windows-1251. Bytes that encoding cannot map become U+FFFD.
fn decode_segment(raw_lines: &[&[u8]]) -> Vec<String> {
    let utf8 = raw_lines
        .iter()
        .all(|line| std::str::from_utf8(line).is_ok());

    raw_lines
        .iter()
        .map(|line| {
            let line = line.strip_prefix(UTF8_BOM).unwrap_or(line);
            let text: Cow<'_, str> = if utf8 {
                String::from_utf8_lossy(line)
            } else {
                WINDOWS_1251.decode_without_bom_handling(line).0
            };
            text.trim_start_matches(BOM).trim().to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

fn is_separator(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim_start_matches(BOM).trim();
    trimmed.len() >= SEPARATOR_MIN_LEN && trimmed.bytes().all(|b| b == b'=')
}

fn clean_title(line: &str) -> String {
    let stripped = TITLE_ANNOTATION_REGEX.replace(line, "");
    if stripped.trim().is_empty() {
        line.trim().to_string()
    } else {
        stripped.trim().to_string()
    }
}

/// Splits the metadata line into location info and the "Added on" timestamp.
fn split_metadata(metadata: &str) -> (String, String) {
    let mut location = Vec::new();
    let mut timestamp = String::new();

    for part in metadata.split('|').map(str::trim) {
        if timestamp.is_empty() && part.to_lowercase().starts_with("added on") {
            timestamp = part.to_string();
        } else if !part.is_empty() {
            location.push(part);
        }
    }

    (location.join(" | "), timestamp)
}
