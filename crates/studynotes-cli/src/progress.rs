use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use studynotes_core::IngestEvent;

/// Spinner on stderr while waiting on the provider. Hidden when stderr is not
/// a terminal.
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    #[must_use]
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());
        Self { bar }
    }

    pub fn ingest_event(&self, event: &IngestEvent) {
        match event {
            IngestEvent::Uploading {
                index,
                total,
                filename,
            } => self
                .bar
                .set_message(format!("Uploading {} ({}/{})", filename, index + 1, total)),
            IngestEvent::Uploaded { filename, file_id } => {
                self.bar.println(format!("  uploaded {} as {}", filename, file_id));
            }
            IngestEvent::Indexing { completed, total } => self
                .bar
                .set_message(format!("Indexing ({}/{} files ready)", completed, total)),
            IngestEvent::Ready { .. } => self.bar.set_message("Sources ready"),
        }
    }

    pub fn finish(self) {
        self.bar.finish_and_clear();
    }
}
