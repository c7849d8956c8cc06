//! Rendering and writing note collections.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use studynotes_core::{NoteCollection, StudyNote};
use tempfile::NamedTempFile;

use crate::ExportError;
use crate::types::{CollectionSummary, ExportFormat, WrittenFiles};

const MARKDOWN_HEADING: &str = "# Study Notes";

/// Pretty-printed JSON array, one object per note.
pub fn to_json(collection: &NoteCollection) -> Result<String, ExportError> {
    let mut out = serde_json::to_string_pretty(collection)?;
    out.push('\n');
    Ok(out)
}

/// Markdown document with one numbered section per note.
pub fn to_markdown(collection: &NoteCollection) -> String {
    let mut out = String::new();
    out.push_str(MARKDOWN_HEADING);
    out.push('\n');
    for (i, note) in collection.iter().enumerate() {
        write_markdown_note(&mut out, i + 1, note);
    }
    out
}

fn write_markdown_note(out: &mut String, number: usize, note: &StudyNote) {
    // Writing to a String cannot fail
    let _ = write!(
        out,
        "\n## {}. {}\n\n{}\n",
        number,
        single_line(note.title()),
        paragraph(note.summary())
    );
    if let Some(source) = note.source_reference() {
        let _ = write!(out, "\n*Source: {}*\n", single_line(source));
    }
}

/// Collapse internal whitespace so a value cannot break out of its heading.
fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A summary as one paragraph line that cannot start a heading.
fn paragraph(s: &str) -> String {
    let line = single_line(s);
    if line.starts_with('#') {
        format!("\\{}", line)
    } else {
        line
    }
}

pub fn render(collection: &NoteCollection, format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => to_json(collection),
        ExportFormat::Markdown => Ok(to_markdown(collection)),
    }
}

pub fn summarize(collection: &NoteCollection) -> CollectionSummary {
    let total = collection.len();
    let with_source_reference = collection
        .iter()
        .filter(|n| n.source_reference().is_some())
        .count();
    let summary_chars: usize = collection.iter().map(|n| n.summary().chars().count()).sum();
    CollectionSummary {
        total,
        with_source_reference,
        average_summary_chars: summary_chars as f64 / total as f64,
    }
}

/// Write `notes.json` and `notes.md` into `dir`.
///
/// Both documents are rendered and staged as temporary files in `dir` before
/// either is moved into place. If the second move fails the first target is
/// put back the way it was: restored to its previous contents, or removed if
/// it did not exist. A failure never leaves a mismatched pair behind.
pub fn write_notes(collection: &NoteCollection, dir: &Path) -> Result<WrittenFiles, ExportError> {
    let mut staged = Vec::with_capacity(ExportFormat::ALL.len());
    for format in ExportFormat::ALL {
        let contents = render(collection, format)?;
        let target = dir.join(format.file_name());
        let tmp = stage(dir, contents.as_bytes()).map_err(|source| ExportError::Io {
            path: target.clone(),
            source,
        })?;
        let previous = previous_contents(&target).map_err(|source| ExportError::Io {
            path: target.clone(),
            source,
        })?;
        staged.push((tmp, target, previous));
    }

    let mut placed: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::with_capacity(staged.len());
    for (tmp, target, previous) in staged {
        if let Err(e) = tmp.persist(&target) {
            for (path, previous) in &placed {
                roll_back(dir, path, previous.as_deref());
            }
            return Err(ExportError::Io {
                path: target,
                source: e.error,
            });
        }
        log::info!("wrote {}", target.display());
        placed.push((target, previous));
    }

    Ok(WrittenFiles {
        json: dir.join(ExportFormat::Json.file_name()),
        markdown: dir.join(ExportFormat::Markdown.file_name()),
    })
}

/// Contents of an existing regular file at `path`, if any.
fn previous_contents(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => std::fs::read(path).map(Some),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn roll_back(dir: &Path, path: &Path, previous: Option<&[u8]>) {
    let restored = match previous {
        Some(bytes) => stage(dir, bytes)
            .and_then(|tmp| tmp.persist(path).map(|_| ()).map_err(|e| e.error)),
        None => std::fs::remove_file(path),
    };
    if let Err(e) = restored {
        log::warn!("could not roll back {}: {}", path.display(), e);
    }
}

fn stage(dir: &Path, contents: &[u8]) -> std::io::Result<NamedTempFile> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn collection() -> NoteCollection {
        let notes = (1..=10)
            .map(|i| {
                let reference = (i % 2 == 0).then(|| format!("p. {i}"));
                StudyNote::new(format!("Concept {i}"), format!("Summary {i}."), reference).unwrap()
            })
            .collect();
        NoteCollection::build(notes).unwrap()
    }

    fn mitosis_collection() -> NoteCollection {
        let mut notes = vec![
            StudyNote::new("Mitosis", "Cell division producing two identical nuclei.", None)
                .unwrap(),
        ];
        notes.extend(
            (2..=10).map(|i| StudyNote::new(format!("Topic {i}"), "Filler.", None).unwrap()),
        );
        NoteCollection::build(notes).unwrap()
    }

    #[test]
    fn json_round_trips_in_order() {
        let c = collection();
        let json = to_json(&c).unwrap();
        let parsed: Vec<StudyNote> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_slice(), c.notes());
    }

    #[test]
    fn json_keeps_field_order_and_omits_missing_reference() {
        let json = to_json(&mitosis_collection()).unwrap();
        let first = json.find("\"title\"").unwrap();
        let summary = json.find("\"summary\"").unwrap();
        assert!(first < summary);

        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["title"], "Mitosis");
        assert!(value[0].get("source_reference").is_none());
        assert_eq!(value.as_array().unwrap().len(), 10);
    }

    #[test]
    fn markdown_is_idempotent() {
        let c = collection();
        assert_eq!(to_markdown(&c), to_markdown(&c));
    }

    #[test]
    fn markdown_layout() {
        let md = to_markdown(&collection());
        assert!(md.starts_with("# Study Notes\n"));
        assert!(md.contains("\n## 1. Concept 1\n\nSummary 1.\n"));
        assert!(md.contains("\n## 2. Concept 2\n\nSummary 2.\n\n*Source: p. 2*\n"));
        let first = md.find("## 1. ").unwrap();
        let last = md.find("## 10. ").unwrap();
        assert!(first < last);
        assert_eq!(md.matches("\n## ").count(), 10);
    }

    #[test]
    fn summary_counts() {
        let s = summarize(&collection());
        assert_eq!(s.total, 10);
        assert_eq!(s.with_source_reference, 5);
        // "Summary 1." .. "Summary 9." are 10 chars, "Summary 10." is 11
        assert!((s.average_summary_chars - 10.1).abs() < 1e-9);
    }

    #[test]
    fn writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let c = collection();
        let written = write_notes(&c, dir.path()).unwrap();

        assert_eq!(written.json, dir.path().join("notes.json"));
        assert_eq!(std::fs::read_to_string(&written.json).unwrap(), to_json(&c).unwrap());
        assert_eq!(std::fs::read_to_string(&written.markdown).unwrap(), to_markdown(&c));

        // No staging files left behind
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 2);
    }

    #[test]
    fn missing_directory_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let err = write_notes(&collection(), &missing).unwrap_err();
        assert!(matches!(err, ExportError::Io { .. }));
        assert!(!missing.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn multi_line_summary_stays_in_its_section() {
        let mut notes: Vec<StudyNote> = (1..=9)
            .map(|i| StudyNote::new(format!("Topic {i}"), "Filler.", None).unwrap())
            .collect();
        notes.push(
            StudyNote::new(
                "Mitosis",
                "Phases:\n## Prophase\nchromosomes condense",
                None,
            )
            .unwrap(),
        );
        notes[0] = StudyNote::new("Headings", "# not a heading", None).unwrap();
        let md = to_markdown(&NoteCollection::build(notes).unwrap());

        assert_eq!(md.matches("\n## ").count(), 10);
        assert!(md.contains("\n## 10. Mitosis\n\nPhases: ## Prophase chromosomes condense\n"));
        assert!(md.contains("\n\\# not a heading\n"));
        assert!(!md.contains("\n# not"));
    }

    #[test]
    fn failed_write_restores_previous_pair() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("notes.json");
        std::fs::write(&json, "old json").unwrap();
        // A directory in the way makes the second move fail
        std::fs::create_dir(dir.path().join("notes.md")).unwrap();

        let err = write_notes(&collection(), dir.path()).unwrap_err();
        assert!(matches!(err, ExportError::Io { ref path, .. } if path.ends_with("notes.md")));
        assert_eq!(std::fs::read_to_string(&json).unwrap(), "old json");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn failed_write_removes_new_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("notes.md")).unwrap();

        assert!(write_notes(&collection(), dir.path()).is_err());
        assert!(!dir.path().join("notes.json").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn file_names() {
        assert_eq!(ExportFormat::Json.file_name(), "notes.json");
        assert_eq!(ExportFormat::Markdown.extension(), "md");
    }
}
