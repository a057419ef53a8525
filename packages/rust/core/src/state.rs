//! Run-scoped store of completed step outputs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use distill_shared::{PaperData, PaperDigest, ResearchGaps};

use crate::steps::StepName;

/// A UUID v7 identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output of one successful step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    Paper(PaperData),
    VaultNotes(Vec<String>),
    Digest(PaperDigest),
    Linked {
        digest: PaperDigest,
        concepts: Vec<String>,
    },
    Gaps(ResearchGaps),
    Note(PathBuf),
}

impl StepOutput {
    /// The step this output belongs to.
    pub fn step(&self) -> StepName {
        match self {
            Self::Paper(_) => StepName::ParsePaper,
            Self::VaultNotes(_) => StepName::ScanVault,
            Self::Digest(_) => StepName::DigestPaper,
            Self::Linked { .. } => StepName::LinkConcepts,
            Self::Gaps(_) => StepName::IdentifyGaps,
            Self::Note(_) => StepName::WriteNote,
        }
    }

    /// Compact JSON summary returned to the reasoning service.
    pub fn summary(&self) -> Value {
        match self {
            Self::Paper(paper) => json!({
                "status": "success",
                "title": paper.metadata.title,
                "sections": paper.section_names().len(),
                "tables": paper.tables.len(),
            }),
            Self::VaultNotes(notes) => json!({
                "status": "success",
                "note_count": notes.len(),
                "sample": notes.iter().take(10).collect::<Vec<_>>(),
            }),
            Self::Digest(digest) => json!({
                "status": "success",
                "title": digest.title,
                "tags": digest.tags,
                "key_contribution": digest.key_contribution.chars().take(200).collect::<String>(),
                "connections": digest.connections,
            }),
            Self::Linked { concepts, .. } => json!({
                "status": "success",
                "linked_concepts": concepts,
                "count": concepts.len(),
            }),
            Self::Gaps(gaps) => json!({
                "status": "success",
                "open_questions": gaps.open_questions.len(),
                "extension_ideas": gaps.extension_ideas.len(),
                "methodological_gaps": gaps.methodological_gaps.len(),
            }),
            Self::Note(path) => json!({
                "status": "success",
                "note_path": path.display().to_string(),
            }),
        }
    }
}

/// Mapping from step name to its most recent successful output.
///
/// Only [`ExecutionState::record`] mutates it, and only the step catalog
/// calls that after a step has succeeded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionState {
    run_id: RunId,
    outputs: BTreeMap<StepName, StepOutput>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn has(&self, step: StepName) -> bool {
        self.outputs.contains_key(&step)
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Completed steps in catalog order.
    pub fn completed(&self) -> Vec<StepName> {
        self.outputs.keys().copied().collect()
    }

    /// Store `output` under its step. A fresh digest invalidates an earlier
    /// linked digest, since links were placed in the old text.
    pub(crate) fn record(&mut self, output: StepOutput) {
        let step = output.step();
        if step == StepName::DigestPaper {
            self.outputs.remove(&StepName::LinkConcepts);
        }
        self.outputs.insert(step, output);
    }

    pub fn paper(&self) -> Option<&PaperData> {
        match self.outputs.get(&StepName::ParsePaper) {
            Some(StepOutput::Paper(paper)) => Some(paper),
            _ => None,
        }
    }

    pub fn vault_notes(&self) -> Option<&[String]> {
        match self.outputs.get(&StepName::ScanVault) {
            Some(StepOutput::VaultNotes(notes)) => Some(notes),
            _ => None,
        }
    }

    /// The digest later steps should see: the linked one when linking ran.
    pub fn digest(&self) -> Option<&PaperDigest> {
        match self.outputs.get(&StepName::LinkConcepts) {
            Some(StepOutput::Linked { digest, .. }) => Some(digest),
            _ => match self.outputs.get(&StepName::DigestPaper) {
                Some(StepOutput::Digest(digest)) => Some(digest),
                _ => None,
            },
        }
    }

    pub fn linked_concepts(&self) -> Option<&[String]> {
        match self.outputs.get(&StepName::LinkConcepts) {
            Some(StepOutput::Linked { concepts, .. }) => Some(concepts),
            _ => None,
        }
    }

    pub fn gaps(&self) -> Option<&ResearchGaps> {
        match self.outputs.get(&StepName::IdentifyGaps) {
            Some(StepOutput::Gaps(gaps)) => Some(gaps),
            _ => None,
        }
    }

    pub fn note_path(&self) -> Option<&Path> {
        match self.outputs.get(&StepName::WriteNote) {
            Some(StepOutput::Note(path)) => Some(path),
            _ => None,
        }
    }
}
