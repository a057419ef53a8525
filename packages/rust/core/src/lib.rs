//! Orchestration and analysis for distill.
//!
//! A [`ConversationController`] lets a reasoning service pick steps from a
//! [`StepCatalog`]. The catalog gates each step on its preconditions and
//! records outputs in a per-run [`ExecutionState`]. The analysis steps
//! (digest, gaps, linking) share the [`budget`] and [`relevance`] helpers.

pub mod budget;
pub mod controller;
pub mod digest;
pub mod gaps;
pub mod linker;
pub mod llm;
pub mod relevance;
pub mod state;
pub mod steps;
pub mod vault;

pub use budget::prepare_content;
pub use controller::{
    ControllerState, ConversationController, RunError, RunObserver, RunOutcome, RunRequest,
    SilentObserver,
};
pub use llm::{AnthropicClient, LanguageModel};
pub use relevance::filter_candidates;
pub use state::{ExecutionState, RunId, StepOutput};
pub use steps::{StepCatalog, StepError, StepName, StepServices};
