//! The request/execute/respond loop.
//!
//! ```text
//! AwaitingModel --(no step requests)--> Done
//! AwaitingModel --(step requests)-----> Executing --> AwaitingModel
//! ```
//!
//! The controller owns the transcript and the [`ExecutionState`] for one
//! run. Every requested step in a turn runs, in the order requested, before
//! the assistant message and the batch of results are appended together.

use std::path::PathBuf;

use tracing::{debug, info, instrument, warn};

use distill_shared::DistillError;

use crate::llm::{ChatMessage, ContentBlock, ModelTurn};
use crate::state::{ExecutionState, RunId};
use crate::steps::{StepCatalog, StepError, initial_message};

/// Where the loop is. There is no other state and no timeout between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    AwaitingModel,
    Executing,
    Done,
}

/// What the operator asked for.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source: String,
    pub output_dir: String,
    pub vault_path: Option<String>,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub turns: usize,
    /// Steps that succeeded. Rejected requests are not counted.
    pub steps_executed: usize,
    /// Text of the final assistant turn.
    pub final_text: String,
    pub note_path: Option<PathBuf>,
    pub linked_concepts: Vec<String>,
}

/// A run that could not finish.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: DistillError,
    },

    #[error("reasoning service failed: {0}")]
    Model(#[source] DistillError),
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// Callback for reporting run progress.
pub trait RunObserver: Send + Sync {
    fn turn_started(&self, _turn: usize) {}
    fn assistant_text(&self, _text: &str) {}
    fn step_started(&self, _name: &str) {}
    /// `error` is set when the step failed recoverably.
    fn step_finished(&self, _name: &str, _error: Option<&str>) {}
    fn finished(&self, _outcome: &RunOutcome) {}
}

/// No-op observer for headless runs and tests.
pub struct SilentObserver;

impl RunObserver for SilentObserver {}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Drives one run against a [`StepCatalog`].
pub struct ConversationController<'a> {
    catalog: &'a StepCatalog,
    observer: &'a dyn RunObserver,
    transcript: Vec<ChatMessage>,
    state: ExecutionState,
    phase: ControllerState,
}

impl<'a> ConversationController<'a> {
    pub fn new(catalog: &'a StepCatalog, observer: &'a dyn RunObserver) -> Self {
        Self {
            catalog,
            observer,
            transcript: Vec::new(),
            state: ExecutionState::new(),
            phase: ControllerState::AwaitingModel,
        }
    }

    pub fn phase(&self) -> ControllerState {
        self.phase
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    /// Run until the reasoning service stops requesting steps.
    #[instrument(skip_all, fields(run_id = %self.state.run_id(), source = %request.source))]
    pub async fn run(&mut self, request: &RunRequest) -> Result<RunOutcome, RunError> {
        let catalog = self.catalog;
        let model = catalog.model();
        let system = catalog.system_prompt();
        let tools = catalog.schemas();

        let vault = request
            .vault_path
            .as_deref()
            .filter(|_| catalog.vault_enabled());
        self.transcript = vec![ChatMessage::user_text(initial_message(
            &request.source,
            &request.output_dir,
            vault,
        ))];
        self.phase = ControllerState::AwaitingModel;

        let mut turns = 0;
        let mut steps_executed = 0;
        let final_text = loop {
            turns += 1;
            self.observer.turn_started(turns);

            let turn = model
                .converse(&system, &tools, &self.transcript)
                .await
                .map_err(RunError::Model)?;

            let text = turn.text();
            if !text.is_empty() {
                self.observer.assistant_text(&text);
            }

            if turn.invocations().is_empty() {
                debug!(turn = turns, stop_reason = ?turn.stop_reason, "no step requests");
                self.transcript.push(ChatMessage::assistant(turn.content));
                self.phase = ControllerState::Done;
                break text;
            }

            self.phase = ControllerState::Executing;
            let (results, succeeded) = self.execute_batch(&turn).await?;
            steps_executed += succeeded;

            self.transcript.push(ChatMessage::assistant(turn.content));
            self.transcript.push(ChatMessage::tool_results(results));
            self.phase = ControllerState::AwaitingModel;
        };

        let outcome = RunOutcome {
            run_id: self.state.run_id(),
            turns,
            steps_executed,
            final_text,
            note_path: self.state.note_path().map(PathBuf::from),
            linked_concepts: self
                .state
                .linked_concepts()
                .map(<[String]>::to_vec)
                .unwrap_or_default(),
        };

        info!(turns, steps = steps_executed, "run complete");
        self.observer.finished(&outcome);
        Ok(outcome)
    }

    /// Execute every requested step in order, returning the results and how
    /// many steps succeeded. Recoverable failures become error results; the
    /// first fatal one aborts the run before anything from this turn reaches
    /// the transcript.
    async fn execute_batch(
        &mut self,
        turn: &ModelTurn,
    ) -> Result<(Vec<ContentBlock>, usize), RunError> {
        let mut results = Vec::new();
        let mut succeeded = 0;

        for call in turn.invocations() {
            self.observer.step_started(&call.name);

            match self.catalog.execute(&call.name, &call.input, &mut self.state).await {
                Ok(summary) => {
                    self.observer.step_finished(&call.name, None);
                    succeeded += 1;
                    results.push(ContentBlock::tool_result(&call.id, summary.to_string(), false));
                }
                Err(StepError::Fatal(source)) => {
                    return Err(RunError::StepFailed {
                        step: call.name,
                        source,
                    });
                }
                Err(e) => {
                    warn!(step = %call.name, error = %e, "step rejected");
                    let message = e.to_string();
                    self.observer.step_finished(&call.name, Some(&message));
                    results.push(ContentBlock::tool_result(
                        &call.id,
                        e.to_tool_result().to_string(),
                        true,
                    ));
                }
            }
        }

        Ok((results, succeeded))
    }
}
