//! Best-effort bibliographic metadata from tagged paragraphs and the source.

use std::sync::LazyLock;

use regex::Regex;

use distill_shared::{ExtractedContent, PaperMetadata, ParagraphRole};

const UNKNOWN: &str = "Unknown";

static ARXIV_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"arxiv\.org/(?:abs|pdf)/(\d+\.\d+)").expect("valid arXiv id regex")
});

/// Derive title, authors, arXiv id and date.
///
/// The first title-tagged paragraph wins, else the first line of the flat
/// text. Authors are the non-noise paragraphs between the title and the first
/// heading or paragraph starting with "abstract"; they are only looked for
/// when a title paragraph exists.
pub fn extract_metadata(content: &ExtractedContent, source: &str) -> PaperMetadata {
    let paragraphs = &content.raw_paragraphs;
    let title_idx = paragraphs
        .iter()
        .position(|p| p.role == Some(ParagraphRole::Title));

    let title = match title_idx {
        Some(idx) => paragraphs[idx].content.trim().to_string(),
        None => content
            .full_text
            .lines()
            .next()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string(),
    };

    let authors = title_idx
        .map(|idx| {
            let mut parts = Vec::new();
            for para in &paragraphs[idx + 1..] {
                let text = para.content.trim();
                if para.role == Some(ParagraphRole::SectionHeading)
                    || text.to_lowercase().starts_with("abstract")
                {
                    break;
                }
                if para.role.is_some_and(ParagraphRole::is_noise) {
                    continue;
                }
                if !text.is_empty() {
                    parts.push(text);
                }
            }
            parts.join(" ")
        })
        .filter(|joined| !joined.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string());

    let arxiv_id = ARXIV_ID_RE
        .captures(source)
        .map(|caps| caps[1].to_string());
    let date = arxiv_id.as_deref().and_then(date_from_arxiv_id);

    PaperMetadata {
        title,
        authors,
        date,
        arxiv_id,
        source_url: source.to_string(),
    }
}

/// `2301.02111` → `2023-01`. New-style ids start with YYMM.
fn date_from_arxiv_id(id: &str) -> Option<String> {
    let yymm = id.get(..4)?;
    let year: u32 = yymm.get(..2)?.parse().ok()?;
    let month: u32 = yymm.get(2..4)?.parse().ok()?;
    Some(format!("{}-{month:02}", 2000 + year))
}
