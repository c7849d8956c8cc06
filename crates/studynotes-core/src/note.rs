//! Study note records and the fixed-size collection they are exported in.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::CoreError;

/// Number of notes in every collection.
pub const NOTE_COUNT: usize = 10;
/// Maximum title length, in characters.
pub const TITLE_MAX_CHARS: usize = 100;
/// Maximum summary length, in characters.
pub const SUMMARY_MAX_CHARS: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteField {
    Title,
    Summary,
    SourceReference,
}

impl NoteField {
    pub fn as_str(self) -> &'static str {
        match self {
            NoteField::Title => "title",
            NoteField::Summary => "summary",
            NoteField::SourceReference => "source_reference",
        }
    }
}

impl fmt::Display for NoteField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is wrong with a note field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    #[error("is missing")]
    Missing,
    #[error("is not a string")]
    WrongType,
    #[error("is empty")]
    Empty,
    #[error("is {actual} characters long (max {max})")]
    TooLong { max: usize, actual: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("field `{field}` {problem}")]
pub struct NoteFieldError {
    pub field: NoteField,
    pub problem: FieldProblem,
}

impl NoteFieldError {
    pub fn new(field: NoteField, problem: FieldProblem) -> Self {
        Self { field, problem }
    }
}

/// One exam-relevant concept.
///
/// Only constructible through [`StudyNote::new`] (deserialization goes through
/// it too), so a `StudyNote` always has a non-empty title and summary within
/// the length bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawNote")]
pub struct StudyNote {
    title: String,
    summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_reference: Option<String>,
}

#[derive(Deserialize)]
struct RawNote {
    title: String,
    summary: String,
    #[serde(default)]
    source_reference: Option<String>,
}

impl TryFrom<RawNote> for StudyNote {
    type Error = NoteFieldError;

    fn try_from(raw: RawNote) -> Result<Self, Self::Error> {
        StudyNote::new(raw.title, raw.summary, raw.source_reference)
    }
}

impl StudyNote {
    /// Build a note. Surrounding whitespace is trimmed; a blank source
    /// reference is treated as absent.
    pub fn new(
        title: impl Into<String>,
        summary: impl Into<String>,
        source_reference: Option<String>,
    ) -> Result<Self, NoteFieldError> {
        let title = checked(NoteField::Title, title.into(), TITLE_MAX_CHARS)?;
        let summary = checked(NoteField::Summary, summary.into(), SUMMARY_MAX_CHARS)?;
        let source_reference = source_reference
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            title,
            summary,
            source_reference,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn source_reference(&self) -> Option<&str> {
        self.source_reference.as_deref()
    }

    /// Re-run the field checks on an existing note.
    pub fn check(&self) -> Result<(), NoteFieldError> {
        checked(NoteField::Title, self.title.clone(), TITLE_MAX_CHARS)?;
        checked(NoteField::Summary, self.summary.clone(), SUMMARY_MAX_CHARS)?;
        Ok(())
    }
}

fn checked(field: NoteField, value: String, max: usize) -> Result<String, NoteFieldError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(NoteFieldError::new(field, FieldProblem::Empty));
    }
    let actual = value.chars().count();
    if actual > max {
        return Err(NoteFieldError::new(
            field,
            FieldProblem::TooLong { max, actual },
        ));
    }
    Ok(value.to_string())
}

/// Exactly [`NOTE_COUNT`] validated notes, in the order the model produced
/// them. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NoteCollection {
    notes: [StudyNote; NOTE_COUNT],
}

impl NoteCollection {
    /// Wrap validated notes into a collection.
    ///
    /// The schema validator has already enforced the count and the field
    /// rules; both are checked again here and a mismatch is reported as an
    /// internal invariant failure.
    pub fn build(notes: Vec<StudyNote>) -> Result<Self, CoreError> {
        let notes: [StudyNote; NOTE_COUNT] = notes.try_into().map_err(|rejected: Vec<_>| {
            CoreError::InternalInvariant(format!(
                "a note collection holds exactly {} notes, got {}",
                NOTE_COUNT,
                rejected.len()
            ))
        })?;

        for (index, note) in notes.iter().enumerate() {
            note.check()
                .map_err(|e| CoreError::InternalInvariant(format!("note {}: {}", index, e)))?;
        }

        Ok(Self { notes })
    }

    pub fn notes(&self) -> &[StudyNote] {
        &self.notes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StudyNote> {
        self.notes.iter()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl<'a> IntoIterator for &'a NoteCollection {
    type Item = &'a StudyNote;
    type IntoIter = std::slice::Iter<'a, StudyNote>;

    fn into_iter(self) -> Self::IntoIter {
        self.notes.iter()
    }
}
