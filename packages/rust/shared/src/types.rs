//! Core domain types for Distill.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Name of the reserved pseudo-block holding the document title.
pub const TITLE_BLOCK: &str = "Title";

// ---------------------------------------------------------------------------
// Extraction output
// ---------------------------------------------------------------------------

/// Role assigned to a paragraph by the layout extraction service.
///
/// Paragraphs without a role are body text. Roles this enum does not know
/// deserialize to [`ParagraphRole::Unrecognized`] and are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParagraphRole {
    Title,
    SectionHeading,
    Footnote,
    FormulaBlock,
    PageHeader,
    PageFooter,
    PageNumber,
    #[serde(other)]
    Unrecognized,
}

impl ParagraphRole {
    /// Running headers, footers, and page numbers.
    pub fn is_noise(self) -> bool {
        matches!(self, Self::PageHeader | Self::PageFooter | Self::PageNumber)
    }
}

/// One paragraph as tagged by the extraction service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawParagraph {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ParagraphRole>,
    pub content: String,
}

impl RawParagraph {
    /// Convenience constructor, mostly for tests and fixtures.
    pub fn new(role: Option<ParagraphRole>, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A (name, text) pair for one logical unit of source content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedTextBlock {
    pub name: String,
    pub text: String,
}

impl NamedTextBlock {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Full structured result of one extraction call. This is what the result
/// cache persists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContent {
    /// Sections in encounter order.
    pub sections: Vec<NamedTextBlock>,
    /// Markdown-formatted tables.
    pub tables: Vec<String>,
    /// Whole-document text, order preserving.
    pub full_text: String,
    /// Tagged paragraphs, kept for metadata heuristics.
    pub raw_paragraphs: Vec<RawParagraph>,
}

// ---------------------------------------------------------------------------
// Parsed paper
// ---------------------------------------------------------------------------

/// Bibliographic metadata recovered from the paper and its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub title: String,
    pub authors: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,
    pub source_url: String,
}

/// Structured representation of a parsed paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperData {
    pub metadata: PaperMetadata,
    pub sections: Vec<NamedTextBlock>,
    pub full_text: String,
    pub tables: Vec<String>,
    /// Original URL or file path as given by the user.
    pub source: String,
    /// Resolved local PDF path (the cache identity).
    pub pdf_path: PathBuf,
}

impl PaperData {
    /// Section names, excluding the title pseudo-block.
    pub fn section_names(&self) -> Vec<&str> {
        self.sections
            .iter()
            .map(|s| s.name.as_str())
            .filter(|name| *name != TITLE_BLOCK)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Analysis output
// ---------------------------------------------------------------------------

/// Structured digest of a paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperDigest {
    pub title: String,
    pub authors: Vec<String>,
    pub date: String,
    /// Conference or journal if detectable, else "ArXiv".
    pub venue: String,
    pub arxiv_id: Option<String>,
    pub tags: Vec<String>,
    pub key_contribution: String,
    pub methodology: String,
    pub core_results: String,
    pub limitations: String,
    /// Related concepts phrased as potential note titles.
    pub connections: Vec<String>,
}

/// Research gaps and extension opportunities for a paper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchGaps {
    pub open_questions: Vec<String>,
    pub extension_ideas: Vec<String>,
    pub scaling_considerations: String,
    pub methodological_gaps: Vec<String>,
}
