use std::fmt::Display;
use std::io::Write;

use owo_colors::{OwoColorize, Style};
use studynotes_core::{CleanupReport, NoteCollection, QueryResult};
use studynotes_reporting::{CollectionSummary, WrittenFiles};

/// Terminal output, with or without ANSI colors.
pub struct Printer {
    color: bool,
}

impl Printer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if self.color {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn info(&self, message: impl Display) {
        println!("{}", message);
    }

    pub fn success(&self, message: impl Display) {
        println!("{} {}", self.paint("✓", Style::new().green().bold()), message);
    }

    pub fn warn(&self, message: impl Display) {
        eprintln!("{} {}", self.paint("warning:", Style::new().yellow().bold()), message);
    }

    pub fn error(&self, message: impl Display) {
        eprintln!("{} {}", self.paint("error:", Style::new().red().bold()), message);
    }

    /// Print `text` without a newline and flush, for interactive prompts.
    pub fn prompt(&self, text: &str) {
        print!("{}", self.paint(text, Style::new().cyan().bold()));
        let _ = std::io::stdout().flush();
    }

    pub fn answer(&self, result: &QueryResult) {
        println!();
        println!("{}", result.text);
        println!();
        if !result.has_citations() {
            println!("{}", self.paint("No citations found.", Style::new().dimmed()));
            return;
        }
        println!("{}", self.paint("Citations:", Style::new().bold()));
        for (i, citation) in result.citations.iter().enumerate() {
            let name = citation.filename.as_deref().unwrap_or("unknown source");
            println!(
                "  [{}] {} {}",
                i + 1,
                name,
                self.paint(&format!("({})", citation.file_id), Style::new().dimmed())
            );
        }
    }

    pub fn summary(&self, summary: &CollectionSummary) {
        println!("{}", self.paint("Summary", Style::new().bold().underline()));
        println!("  {:<23}{}", "Total notes:", summary.total);
        println!("  {:<23}{}", "With source reference:", summary.with_source_reference);
        println!(
            "  {:<23}{:.1} chars",
            "Average summary:", summary.average_summary_chars
        );
        println!();
    }

    pub fn notes(&self, collection: &NoteCollection) {
        for (i, note) in collection.iter().enumerate() {
            println!(
                "{} {}",
                self.paint(&format!("{:>2}.", i + 1), Style::new().cyan().bold()),
                self.paint(note.title(), Style::new().bold())
            );
            println!("    {}", note.summary());
            if let Some(source) = note.source_reference() {
                println!(
                    "    {}",
                    self.paint(&format!("Source: {}", source), Style::new().dimmed())
                );
            }
            println!();
        }
    }

    pub fn written(&self, files: &WrittenFiles) {
        self.success(format!(
            "Wrote {} and {}",
            files.json.display(),
            files.markdown.display()
        ));
    }

    pub fn rejected_payload(&self, raw: &str) {
        eprintln!("{}", self.paint("Raw response:", Style::new().bold()));
        eprintln!("{}", raw);
    }

    pub fn cleanup(&self, report: &CleanupReport) {
        if report.deleted_vector_stores.is_empty() && report.deleted_files.is_empty() {
            self.info("Nothing to clean up.");
        } else {
            self.success(format!(
                "Deleted {} vector store(s) and {} file(s)",
                report.deleted_vector_stores.len(),
                report.deleted_files.len()
            ));
        }
        for failure in &report.failures {
            self.warn(format!("could not delete {}", failure));
        }
    }
}
