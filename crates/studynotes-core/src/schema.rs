//! Schema descriptor sent to the model, and strict validation of what comes
//! back.
//!
//! Validation is all-or-nothing: parse the payload, check every element in
//! order and stop at the first bad one, then require exactly [`NOTE_COUNT`]
//! elements. Nothing partial is ever returned.

use std::fmt;

use serde_json::{Map, Value, json};

use crate::CoreError;
use crate::note::{
    FieldProblem, NOTE_COUNT, NoteCollection, NoteField, NoteFieldError, SUMMARY_MAX_CHARS,
    StudyNote, TITLE_MAX_CHARS,
};
use crate::provider::{OutputSchema, QueryResult};

/// Key of the array in the envelope object the model is asked to return.
pub const ENVELOPE_KEY: &str = "notes";

/// Describes the notes the model must produce.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteSchema {
    /// Optional topic to emphasize (e.g. "derivatives and integrals").
    pub focus: Option<String>,
}

impl NoteSchema {
    pub const NAME: &'static str = "study_notes";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_focus(mut self, focus: Option<String>) -> Self {
        self.focus = focus.map(|f| f.trim().to_string()).filter(|f| !f.is_empty());
        self
    }

    pub fn count(&self) -> usize {
        NOTE_COUNT
    }

    /// JSON Schema for strict structured output. The root has to be an
    /// object, so the notes array sits under [`ENVELOPE_KEY`].
    pub fn json_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                ENVELOPE_KEY: {
                    "type": "array",
                    "minItems": NOTE_COUNT,
                    "maxItems": NOTE_COUNT,
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": {
                                "type": "string",
                                "description": format!("Concept name, at most {} characters", TITLE_MAX_CHARS),
                            },
                            "summary": {
                                "type": "string",
                                "description": format!("Concise explanation, at most {} characters", SUMMARY_MAX_CHARS),
                            },
                            "source_reference": {
                                "type": ["string", "null"],
                                "description": "Source file and page the concept comes from, if known",
                            },
                        },
                        "required": ["title", "summary", "source_reference"],
                        "additionalProperties": false,
                    },
                },
            },
            "required": [ENVELOPE_KEY],
            "additionalProperties": false,
        })
    }

    pub fn output_schema(&self) -> OutputSchema {
        OutputSchema {
            name: Self::NAME.to_string(),
            schema: self.json_schema(),
        }
    }

    /// The notes-generation instruction sent as user input.
    pub fn prompt(&self) -> String {
        let mut prompt = format!(
            "Analyze the attached study material and create exactly {count} concise study notes \
             for exam preparation. Each note needs a clear title (the concept name, at most \
             {title} characters), a summary of at most {summary} characters, and a source \
             reference naming the file and page when available (null otherwise). Return a JSON \
             object with a '{key}' array containing exactly {count} notes.",
            count = NOTE_COUNT,
            title = TITLE_MAX_CHARS,
            summary = SUMMARY_MAX_CHARS,
            key = ENVELOPE_KEY,
        );
        if let Some(focus) = &self.focus {
            prompt.push_str(&format!(" Focus on: {}.", focus));
        }
        prompt
    }
}

/// Why a payload does not match the note schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    /// The payload is neither an array nor an object with a notes array.
    NotASequence { found: &'static str },
    NotAnObject { index: usize },
    Field { index: usize, error: NoteFieldError },
}

impl SchemaViolation {
    /// Position of the offending element, if the violation is element-level.
    pub fn index(&self) -> Option<usize> {
        match self {
            SchemaViolation::NotASequence { .. } => None,
            SchemaViolation::NotAnObject { index } | SchemaViolation::Field { index, .. } => {
                Some(*index)
            }
        }
    }

    /// Offending field, if any.
    pub fn field(&self) -> Option<NoteField> {
        match self {
            SchemaViolation::Field { error, .. } => Some(error.field),
            _ => None,
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaViolation::NotASequence { found } => {
                write!(f, "expected an array of notes, found {}", found)
            }
            SchemaViolation::NotAnObject { index } => {
                write!(f, "note {} is not an object", index)
            }
            SchemaViolation::Field { index, error } => write!(f, "note {}: {}", index, error),
        }
    }
}

/// Validate a notes-mode response into a collection.
pub fn validate(result: QueryResult) -> Result<NoteCollection, CoreError> {
    validate_payload(&result.text)
}

/// Validate a raw JSON payload into a collection.
pub fn validate_payload(payload: &str) -> Result<NoteCollection, CoreError> {
    let notes = parse_notes(payload)?;
    NoteCollection::build(notes)
}

/// Parse and check every element, then the count. Stops short of building
/// the collection.
pub fn parse_notes(payload: &str) -> Result<Vec<StudyNote>, CoreError> {
    let value: Value = serde_json::from_str(payload).map_err(CoreError::MalformedPayload)?;
    let elements = note_elements(&value).map_err(CoreError::SchemaViolation)?;

    let notes = elements
        .iter()
        .enumerate()
        .map(|(index, element)| note_from_value(index, element))
        .collect::<Result<Vec<_>, _>>()
        .map_err(CoreError::SchemaViolation)?;

    if notes.len() != NOTE_COUNT {
        return Err(CoreError::CountMismatch {
            expected: NOTE_COUNT,
            actual: notes.len(),
        });
    }

    log::debug!("validated {} notes", notes.len());
    Ok(notes)
}

/// Accept a bare array or the `{"notes": [...]}` envelope.
fn note_elements(value: &Value) -> Result<&Vec<Value>, SchemaViolation> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(map) => match map.get(ENVELOPE_KEY) {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(SchemaViolation::NotASequence {
                found: json_type(other),
            }),
            None => Err(SchemaViolation::NotASequence { found: "object" }),
        },
        other => Err(SchemaViolation::NotASequence {
            found: json_type(other),
        }),
    }
}

fn note_from_value(index: usize, value: &Value) -> Result<StudyNote, SchemaViolation> {
    let obj = value
        .as_object()
        .ok_or(SchemaViolation::NotAnObject { index })?;
    let field_error = |error: NoteFieldError| SchemaViolation::Field { index, error };

    let title = required_string(obj, NoteField::Title).map_err(field_error)?;
    let summary = required_string(obj, NoteField::Summary).map_err(field_error)?;
    let source_reference = optional_reference(obj).map_err(field_error)?;

    StudyNote::new(title, summary, source_reference).map_err(field_error)
}

fn required_string(obj: &Map<String, Value>, field: NoteField) -> Result<String, NoteFieldError> {
    match obj.get(field.as_str()) {
        None | Some(Value::Null) => Err(NoteFieldError::new(field, FieldProblem::Missing)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(NoteFieldError::new(field, FieldProblem::WrongType)),
    }
}

/// A page number is accepted in place of a string reference.
fn optional_reference(obj: &Map<String, Value>) -> Result<Option<String>, NoteFieldError> {
    let field = NoteField::SourceReference;
    match obj.get(field.as_str()) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(NoteFieldError::new(field, FieldProblem::WrongType)),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
