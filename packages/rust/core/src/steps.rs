//! The fixed step catalog and its dependency gate.
//!
//! Each [`StepName`] declares the steps that must already have produced
//! output, a JSON input schema for the reasoning service, and a handler.
//! [`StepCatalog::execute`] checks the gate, runs the handler against a
//! read-only view of the [`ExecutionState`], and records the output only
//! once the handler has succeeded.

use std::fmt;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use distill_parser::{FetchOptions, LayoutExtractor, parse_paper};
use distill_shared::{DistillError, LimitsConfig, expand_home};
use distill_storage::ResultCache;

use crate::digest::digest_paper;
use crate::gaps::identify_gaps;
use crate::linker::link_concepts;
use crate::llm::{LanguageModel, ToolSchema};
use crate::relevance::{filter_candidates, keyword_set};
use crate::state::{ExecutionState, StepOutput};
use crate::vault::scan_vault;

// ---------------------------------------------------------------------------
// Step names
// ---------------------------------------------------------------------------

/// Every step the pipeline knows, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepName {
    ParsePaper,
    ScanVault,
    DigestPaper,
    LinkConcepts,
    IdentifyGaps,
    WriteNote,
}

impl StepName {
    pub const ALL: [StepName; 6] = [
        Self::ParsePaper,
        Self::ScanVault,
        Self::DigestPaper,
        Self::LinkConcepts,
        Self::IdentifyGaps,
        Self::WriteNote,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParsePaper => "parse_paper",
            Self::ScanVault => "scan_vault",
            Self::DigestPaper => "digest_paper",
            Self::LinkConcepts => "link_concepts",
            Self::IdentifyGaps => "identify_gaps",
            Self::WriteNote => "write_note",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.as_str() == name)
    }

    /// Steps that must have succeeded before this one may run.
    pub fn preconditions(self) -> &'static [StepName] {
        match self {
            Self::ParsePaper | Self::ScanVault => &[],
            Self::DigestPaper => &[Self::ParsePaper],
            Self::LinkConcepts => &[Self::DigestPaper, Self::ScanVault],
            Self::IdentifyGaps => &[Self::DigestPaper],
            Self::WriteNote => &[Self::DigestPaper],
        }
    }

    /// Steps that only make sense with a vault to link against.
    pub fn needs_vault(self) -> bool {
        matches!(self, Self::ScanVault | Self::LinkConcepts)
    }

    fn description(self) -> &'static str {
        match self {
            Self::ParsePaper => {
                "Parse an academic paper from an ArXiv URL or local PDF path. Extracts \
                 text, sections, metadata, and tables using a layout analysis service. \
                 Must be called first."
            }
            Self::ScanVault => {
                "Scan an Obsidian vault directory to discover existing note titles. \
                 Returns a list of note titles that can be used for concept linking. \
                 Should be called after parse_paper if a vault_path is available."
            }
            Self::DigestPaper => {
                "Generate a structured digest of the parsed paper: key contribution, \
                 methodology, results, limitations, tags, and connections. Requires \
                 parse_paper to have been called first."
            }
            Self::LinkConcepts => {
                "Embed [[wikilinks]] to existing vault notes inline within the paper \
                 digest text fields. Requires both digest_paper and scan_vault to have \
                 been called first."
            }
            Self::IdentifyGaps => {
                "Identify research gaps, open questions, extension ideas, and \
                 methodological weaknesses. Requires digest_paper to have been called first."
            }
            Self::WriteNote => {
                "Write the final Obsidian markdown note combining all analysis. Requires \
                 digest_paper; includes identify_gaps output when available."
            }
        }
    }

    fn input_schema(self) -> Value {
        match self {
            Self::ParsePaper => json!({
                "type": "object",
                "properties": {
                    "source": {
                        "type": "string",
                        "description": "ArXiv URL (e.g. https://arxiv.org/abs/2301.12345) or local PDF path"
                    },
                    "output_dir": {
                        "type": "string",
                        "description": "Output directory for this run"
                    }
                },
                "required": ["source"]
            }),
            Self::ScanVault => json!({
                "type": "object",
                "properties": {
                    "vault_path": {
                        "type": "string",
                        "description": "Path to the root of the Obsidian vault directory"
                    }
                },
                "required": ["vault_path"]
            }),
            Self::WriteNote => json!({
                "type": "object",
                "properties": {
                    "output_dir": {
                        "type": "string",
                        "description": "Directory to write the Obsidian note into"
                    }
                },
                "required": ["output_dir"]
            }),
            Self::DigestPaper | Self::LinkConcepts | Self::IdentifyGaps => json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    pub fn schema(self) -> ToolSchema {
        ToolSchema {
            name: self.as_str().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a step invocation did not produce output.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("{step} requires {missing} to have completed first")]
    MissingPrecondition { step: StepName, missing: StepName },

    #[error("unknown step '{name}'; available steps: {available}")]
    UnknownStep { name: String, available: String },

    #[error("invalid parameters for {step}: {message}")]
    InvalidParameters { step: StepName, message: String },

    #[error(transparent)]
    Fatal(#[from] DistillError),
}

impl StepError {
    /// Recoverable errors are reported back to the reasoning service; the
    /// rest abort the run.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Fatal(_))
    }

    /// JSON body of the error tool result.
    pub fn to_tool_result(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// External collaborators and limits the step handlers need.
#[derive(Clone)]
pub struct StepServices {
    pub model: Arc<dyn LanguageModel>,
    pub extractor: Arc<dyn LayoutExtractor>,
    pub cache: ResultCache,
    pub fetch: FetchOptions,
    pub limits: LimitsConfig,
}

/// The active subset of steps for one run.
pub struct StepCatalog {
    services: StepServices,
    active: Vec<StepName>,
}

impl StepCatalog {
    /// All steps when a vault is available, otherwise the subset without
    /// vault scanning and linking.
    pub fn new(services: StepServices, vault_enabled: bool) -> Self {
        let active = StepName::ALL
            .into_iter()
            .filter(|step| vault_enabled || !step.needs_vault())
            .collect();
        Self { services, active }
    }

    pub fn model(&self) -> &dyn LanguageModel {
        self.services.model.as_ref()
    }

    pub fn active(&self) -> &[StepName] {
        &self.active
    }

    pub fn vault_enabled(&self) -> bool {
        self.active.contains(&StepName::ScanVault)
    }

    /// Tool schemas for the active steps only.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.active.iter().map(|step| step.schema()).collect()
    }

    /// System instruction listing the active steps in order.
    pub fn system_prompt(&self) -> String {
        if self.vault_enabled() {
            VAULT_SYSTEM_PROMPT.to_string()
        } else {
            NO_VAULT_SYSTEM_PROMPT.to_string()
        }
    }

    /// Resolve `name` to an active step.
    pub fn resolve(&self, name: &str) -> Result<StepName, StepError> {
        StepName::from_name(name)
            .filter(|step| self.active.contains(step))
            .ok_or_else(|| StepError::UnknownStep {
                name: name.to_string(),
                available: self
                    .active
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Check that every precondition of `step` has output in `state`.
    pub fn check_preconditions(
        &self,
        step: StepName,
        state: &ExecutionState,
    ) -> Result<(), StepError> {
        match step.preconditions().iter().find(|dep| !state.has(**dep)) {
            Some(missing) => Err(StepError::MissingPrecondition {
                step,
                missing: *missing,
            }),
            None => Ok(()),
        }
    }

    /// Run one step. On success the output is recorded in `state` and its
    /// summary returned; on any error `state` is left untouched.
    #[instrument(skip_all, fields(step = %name))]
    pub async fn execute(
        &self,
        name: &str,
        params: &Value,
        state: &mut ExecutionState,
    ) -> Result<Value, StepError> {
        let step = self.resolve(name)?;
        self.check_preconditions(step, state)?;

        let output = self.run_handler(step, params, state).await?;
        let summary = output.summary();
        state.record(output);

        info!("step complete");
        Ok(summary)
    }

    async fn run_handler(
        &self,
        step: StepName,
        params: &Value,
        state: &ExecutionState,
    ) -> Result<StepOutput, StepError> {
        let svc = &self.services;
        match step {
            StepName::ParsePaper => {
                let source = required_str(step, params, "source")?;
                if let Some(dir) = optional_str(step, params, "output_dir")? {
                    debug!(output_dir = dir, "parse_paper produces no files of its own");
                }
                let paper =
                    parse_paper(source, &svc.fetch, svc.extractor.as_ref(), &svc.cache).await?;
                Ok(StepOutput::Paper(paper))
            }
            StepName::ScanVault => {
                let raw = required_str(step, params, "vault_path")?;
                let notes = scan_vault(&expand_home(raw)).map_err(|e| match e {
                    DistillError::Validation { message } => {
                        StepError::InvalidParameters { step, message }
                    }
                    other => StepError::Fatal(other),
                })?;
                Ok(StepOutput::VaultNotes(self.narrow_vault(notes, state)))
            }
            StepName::DigestPaper => {
                let paper = state.paper().ok_or(StepError::MissingPrecondition {
                    step,
                    missing: StepName::ParsePaper,
                })?;
                let digest =
                    digest_paper(svc.model.as_ref(), paper, svc.limits.digest_max_chars).await?;
                Ok(StepOutput::Digest(digest))
            }
            StepName::LinkConcepts => {
                let digest = require_digest(step, state)?;
                let notes = state.vault_notes().ok_or(StepError::MissingPrecondition {
                    step,
                    missing: StepName::ScanVault,
                })?;
                let (digest, concepts) = link_concepts(svc.model.as_ref(), digest, notes).await?;
                Ok(StepOutput::Linked { digest, concepts })
            }
            StepName::IdentifyGaps => {
                let digest = require_digest(step, state)?;
                let sections = state.paper().map(|p| p.sections.as_slice()).unwrap_or(&[]);
                let gaps = identify_gaps(
                    svc.model.as_ref(),
                    digest,
                    sections,
                    svc.limits.gaps_max_chars,
                )
                .await?;
                Ok(StepOutput::Gaps(gaps))
            }
            StepName::WriteNote => {
                let output_dir = expand_home(required_str(step, params, "output_dir")?);
                let digest = require_digest(step, state)?;
                let paper = state.paper().ok_or(StepError::MissingPrecondition {
                    step,
                    missing: StepName::ParsePaper,
                })?;
                let markdown = distill_artifacts::render_note(
                    paper,
                    digest,
                    state.gaps(),
                    state.linked_concepts(),
                );
                let path = distill_artifacts::write_note(&output_dir, &digest.title, &markdown)?;
                Ok(StepOutput::Note(path))
            }
        }
    }

    /// Relevance-filter a large vault against the parsed paper, when there
    /// is one.
    fn narrow_vault(&self, notes: Vec<String>, state: &ExecutionState) -> Vec<String> {
        let max = self.services.limits.max_vault_notes;
        let Some(paper) = state.paper() else {
            if notes.len() > max {
                warn!(notes = notes.len(), "vault scanned before the paper; not filtered");
            }
            return notes;
        };
        if notes.len() <= max {
            return notes;
        }

        let tags = state.digest().map(|d| d.tags.as_slice()).unwrap_or(&[]);
        let keywords = keyword_set(
            std::iter::once(paper.metadata.title.as_str())
                .chain(paper.section_names())
                .chain(tags.iter().map(String::as_str)),
        );
        let kept = filter_candidates(&notes, &keywords, max);
        info!(from = notes.len(), to = kept.len(), "vault notes filtered for relevance");
        kept
    }
}

fn require_digest(
    step: StepName,
    state: &ExecutionState,
) -> Result<&distill_shared::PaperDigest, StepError> {
    state.digest().ok_or(StepError::MissingPrecondition {
        step,
        missing: StepName::DigestPaper,
    })
}

fn required_str<'a>(step: StepName, params: &'a Value, key: &str) -> Result<&'a str, StepError> {
    match params.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::String(_)) => Err(StepError::InvalidParameters {
            step,
            message: format!("'{key}' must not be empty"),
        }),
        Some(_) => Err(StepError::InvalidParameters {
            step,
            message: format!("'{key}' must be a string"),
        }),
        None => Err(StepError::InvalidParameters {
            step,
            message: format!("missing required parameter '{key}'"),
        }),
    }
}

fn optional_str<'a>(
    step: StepName,
    params: &'a Value,
    key: &str,
) -> Result<Option<&'a str>, StepError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(StepError::InvalidParameters {
            step,
            message: format!("'{key}' must be a string"),
        }),
    }
}

/// Build the opening user message for a run.
pub fn initial_message(source: &str, output_dir: &str, vault_path: Option<&str>) -> String {
    let mut msg = format!(
        "Analyze this paper and create an Obsidian note: {source}\nOutput directory: {output_dir}"
    );
    if let Some(vault) = vault_path {
        msg.push_str(&format!("\nObsidian vault path: {vault}"));
    }
    msg
}

const VAULT_SYSTEM_PROMPT: &str = "\
You are Distill, a research paper analysis agent. Your job is to take an \
academic paper and produce a structured Obsidian markdown note with links to \
existing vault concepts.

You have 6 tools available. Use them in this order:
1. parse_paper: extract text, sections, tables, and metadata from the PDF
2. scan_vault: scan the Obsidian vault for existing note titles
3. digest_paper: generate a structured analysis (key contribution, methodology, results, etc.)
4. link_concepts: embed [[wikilinks]] to vault concepts inline in the digest text
5. identify_gaps: find research gaps, open questions, and extension ideas
6. write_note: render everything into an Obsidian markdown note

Call each tool in sequence. After write_note completes, summarize what you created \
and list which vault concepts were linked.";

const NO_VAULT_SYSTEM_PROMPT: &str = "\
You are Distill, a research paper analysis agent. Your job is to take an \
academic paper and produce a structured Obsidian markdown note.

You have 4 tools available. Use them in this order:
1. parse_paper: extract text, sections, tables, and metadata from the PDF
2. digest_paper: generate a structured analysis (key contribution, methodology, results, etc.)
3. identify_gaps: find research gaps, open questions, and extension ideas
4. write_note: render everything into an Obsidian markdown note

Call each tool in sequence. After write_note completes, summarize what you created.";
