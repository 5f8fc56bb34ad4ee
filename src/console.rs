//! Console output formatting with ANSI color support.
//!
//! Provides styled terminal output with automatic TTY detection
//! and respect for the NO_COLOR environment variable.

use crate::pipeline::BatchReport;
use std::io::{self, IsTerminal};

/// ANSI style codes for terminal formatting.
#[derive(Debug, Clone, Copy)]
pub enum Style {
    Bold,
    Dim,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    Gray,
}

impl Style {
    fn code(self) -> &'static str {
        match self {
            Style::Bold => "1",
            Style::Dim => "2",
            Style::Red => "31",
            Style::Green => "32",
            Style::Yellow => "33",
            Style::Blue => "34",
            Style::Magenta => "35",
            Style::Cyan => "36",
            Style::Gray => "90",
        }
    }
}

const RESET: &str = "\x1b[0m";

/// Console output handler with color support detection.
#[derive(Debug)]
pub struct Console {
    colors_enabled: bool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    /// Creates a new Console, disabling colors when `NO_COLOR` is set or
    /// stdout is not a terminal.
    pub fn new() -> Self {
        let colors_enabled = std::env::var("NO_COLOR").is_err() && io::stdout().is_terminal();

        Self { colors_enabled }
    }

    /// Creates a Console with colors explicitly enabled or disabled.
    pub fn with_colors(enabled: bool) -> Self {
        Self {
            colors_enabled: enabled,
        }
    }

    /// Applies ANSI styles to text if colors are enabled.
    pub fn style(&self, text: &str, styles: &[Style]) -> String {
        if !self.colors_enabled || styles.is_empty() {
            return text.to_string();
        }

        let codes: Vec<&str> = styles.iter().map(|s| s.code()).collect();
        format!("\x1b[{}m{}{}", codes.join(";"), text, RESET)
    }

    /// Creates a colored label like `[INFO]`.
    pub fn label(&self, label: &str, color: Style) -> String {
        let styled = self.style(label, &[color, Style::Bold]);
        format!("[{}]", styled)
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", self.label("INFO", Style::Blue), message);
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", self.label("OK", Style::Green), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", self.label("WARN", Style::Yellow), message);
    }

    /// Prints to stderr with a red `[ERROR]` label.
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", self.label("ERROR", Style::Red), message);
    }

    pub fn step(&self, message: &str) {
        println!("{} {}", self.label("STEP", Style::Cyan), message);
    }

    /// Prints a section header in magenta bold.
    pub fn section(&self, message: &str) {
        println!();
        println!("{}", self.style(message, &[Style::Magenta, Style::Bold]));
    }

    /// Returns text styled as muted (dim gray).
    pub fn muted(&self, text: &str) -> String {
        self.style(text, &[Style::Gray, Style::Dim])
    }

    /// Formats a count with styling.
    pub fn count(&self, n: usize) -> String {
        self.style(&n.to_string(), &[Style::Green, Style::Bold])
    }

    /// Summary lines for a batch report.
    pub fn report_lines(&self, report: &BatchReport) -> Vec<String> {
        let mut lines = vec![
            format!(
                "Parsed {} clippings {}",
                self.count(report.blocks),
                self.muted(&format!(
                    "({} malformed, {} empty, {} notes skipped)",
                    report.malformed, report.empty, report.notes_skipped
                ))
            ),
            format!(
                "Skipped {} sentences and {} duplicates {}",
                self.count(report.sentences),
                self.count(report.duplicates()),
                self.muted(&format!(
                    "({} in history, {} repeated, {} in progress elsewhere)",
                    report.duplicates_history,
                    report.duplicates_batch,
                    report.duplicates_in_flight
                ))
            ),
        ];

        if report.cards() > 0 || report.failed > 0 {
            lines.push(format!(
                "Created {} cards {}",
                self.count(report.cards()),
                self.muted(&format!(
                    "({} from cache, {} looked up)",
                    report.cached, report.enriched
                ))
            ));
        }

        lines
    }

    /// Prints the batch summary, failures included.
    pub fn report(&self, report: &BatchReport) {
        for line in self.report_lines(report) {
            self.info(&line);
        }

        for backend in &report.disabled_backends {
            self.warning(&format!("{} was disabled after a fatal error", backend));
        }

        if report.failed > 0 {
            self.warning(&format!("{} entries could not be translated:", report.failed));
            for failure in &report.failures {
                println!(
                    "  {} {}",
                    self.style(&failure.text, &[Style::Yellow]),
                    self.muted(&failure.reason)
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::EnrichmentFailure;

    #[test]
    fn test_style_disabled() {
        let console = Console::with_colors(false);
        assert_eq!(console.style("hello", &[Style::Red]), "hello");
    }

    #[test]
    fn test_style_enabled() {
        let console = Console::with_colors(true);
        let styled = console.style("hello", &[Style::Bold, Style::Red]);
        assert!(styled.starts_with("\x1b[1;31m"));
        assert!(styled.ends_with(RESET));
    }

    #[test]
    fn test_label() {
        let console = Console::with_colors(false);
        assert_eq!(console.label("INFO", Style::Blue), "[INFO]");
    }

    #[test]
    fn test_report_lines() {
        let console = Console::with_colors(false);
        let report = BatchReport {
            blocks: 12,
            malformed: 1,
            sentences: 3,
            duplicates_history: 2,
            duplicates_batch: 1,
            cached: 2,
            enriched: 3,
            failed: 1,
            failures: vec![EnrichmentFailure {
                index: 4,
                book_title: "Dune".to_string(),
                text: "qwzx".to_string(),
                reason: "mt: not found".to_string(),
            }],
            ..BatchReport::default()
        };

        let lines = console.report_lines(&report);
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "Parsed 12 clippings (1 malformed, 0 empty, 0 notes skipped)"
        );
        assert!(lines[1].starts_with("Skipped 3 sentences and 3 duplicates"));
        assert_eq!(lines[2], "Created 5 cards (2 from cache, 3 looked up)");
    }

    #[test]
    fn test_report_lines_nothing_new() {
        let console = Console::with_colors(false);
        let lines = console.report_lines(&BatchReport::default());
        assert_eq!(lines.len(), 2);
    }
}
