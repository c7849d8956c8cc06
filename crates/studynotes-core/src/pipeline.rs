//! Notes generation as an explicit state machine.
//!
//! ```text
//! Idle -> AwaitingResponse -> Validating -> Valid -> Exported
//!                                        \-> Invalid -> Reported
//! ```
//!
//! Provider and input failures return to `Idle`. Validation failures end in
//! `Reported`. Nothing is retried automatically: [`NotesPipeline::regenerate`]
//! is the only way back from a terminal state.

use std::fmt;

use crate::CoreError;
use crate::dispatch::Dispatcher;
use crate::note::NoteCollection;
use crate::provider::ModelProvider;
use crate::schema::{NoteSchema, validate_payload};
use crate::source::DocumentRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    AwaitingResponse,
    Validating,
    Valid,
    Invalid,
    Exported,
    Reported,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Exported | PipelineState::Reported)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::AwaitingResponse => "awaiting response",
            PipelineState::Validating => "validating",
            PipelineState::Valid => "valid",
            PipelineState::Invalid => "invalid",
            PipelineState::Exported => "exported",
            PipelineState::Reported => "reported",
        };
        f.write_str(name)
    }
}

/// Drives one notes request at a time through dispatch, validation and
/// collection building.
pub struct NotesPipeline<P> {
    dispatcher: Dispatcher<P>,
    schema: NoteSchema,
    state: PipelineState,
    history: Vec<PipelineState>,
    /// Raw text of the last response that failed validation.
    rejected_payload: Option<String>,
}

impl<P: ModelProvider + Sync> NotesPipeline<P> {
    pub fn new(dispatcher: Dispatcher<P>, schema: NoteSchema) -> Self {
        Self {
            dispatcher,
            schema,
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
            rejected_payload: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn rejected_payload(&self) -> Option<&str> {
        self.rejected_payload.as_deref()
    }

    pub fn dispatcher(&self) -> &Dispatcher<P> {
        &self.dispatcher
    }

    /// Generate and validate one collection. Only allowed from `Idle`.
    ///
    /// Dropping the returned future before it completes (for example under
    /// `tokio::time::timeout`) puts the pipeline back in `Idle`.
    pub async fn run(&mut self, sources: &[DocumentRef]) -> Result<NoteCollection, CoreError> {
        self.require(PipelineState::Idle)?;
        self.rejected_payload = None;

        self.transition(PipelineState::AwaitingResponse);
        let mut guard = ResetOnDrop {
            pipeline: self,
            armed: true,
        };
        let outcome = guard
            .pipeline
            .dispatcher
            .generate_notes(sources, &guard.pipeline.schema)
            .await;
        guard.armed = false;
        let this = &mut *guard.pipeline;

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                this.transition(PipelineState::Idle);
                return Err(e);
            }
        };

        this.transition(PipelineState::Validating);
        match validate_payload(&result.text) {
            Ok(collection) => {
                this.transition(PipelineState::Valid);
                Ok(collection)
            }
            Err(e) => {
                this.transition(PipelineState::Invalid);
                log::warn!("notes response rejected: {}", e);
                this.rejected_payload = Some(result.text);
                this.transition(PipelineState::Reported);
                Err(e)
            }
        }
    }

    /// Record that the collection from the last run was written out.
    pub fn mark_exported(&mut self) -> Result<(), CoreError> {
        self.require(PipelineState::Valid)?;
        self.transition(PipelineState::Exported);
        Ok(())
    }

    /// Explicit retry: discard whatever the last run produced, return to
    /// `Idle`, and run again. Allowed from `Idle`, `Reported` or `Exported`.
    pub async fn regenerate(
        &mut self,
        sources: &[DocumentRef],
    ) -> Result<NoteCollection, CoreError> {
        self.reset()?;
        self.run(sources).await
    }

    /// Return to `Idle` from `Idle` or a terminal state. A `Valid`
    /// collection has to be exported first.
    pub fn reset(&mut self) -> Result<(), CoreError> {
        match self.state {
            PipelineState::Idle => {}
            state if state.is_terminal() => self.transition(PipelineState::Idle),
            actual => {
                return Err(CoreError::InvalidState {
                    expected: PipelineState::Exported,
                    actual,
                });
            }
        }
        self.rejected_payload = None;
        Ok(())
    }

    fn require(&self, expected: PipelineState) -> Result<(), CoreError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CoreError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }
}

impl<P> NotesPipeline<P> {
    fn transition(&mut self, next: PipelineState) {
        log::debug!("notes pipeline: {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }
}

/// Returns the pipeline to `Idle` if a run is abandoned mid-request.
struct ResetOnDrop<'a, P> {
    pipeline: &'a mut NotesPipeline<P>,
    armed: bool,
}

impl<P> Drop for ResetOnDrop<'_, P> {
    fn drop(&mut self) {
        if self.armed {
            log::debug!("notes pipeline: run abandoned");
            self.pipeline.transition(PipelineState::Idle);
        }
    }
}
