//! Obsidian note rendering for Distill.
//!
//! Turns a parsed paper, its digest, and the optional gap analysis and vault
//! links into a single markdown note with YAML frontmatter, and writes it
//! under a filename derived from the paper title.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{Local, NaiveDate};
use regex::Regex;
use tracing::{info, instrument};

use distill_shared::{DistillError, PaperData, PaperDigest, ResearchGaps, Result};

/// Longest filename stem produced by [`sanitize_filename`].
pub const MAX_FILENAME_CHARS: usize = 60;

/// Stem used when a title sanitizes to nothing.
const FALLBACK_STEM: &str = "untitled";

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render the note, stamping today's date as its creation date.
pub fn render_note(
    paper: &PaperData,
    digest: &PaperDigest,
    gaps: Option<&ResearchGaps>,
    linked_concepts: Option<&[String]>,
) -> String {
    render_note_on(Local::now().date_naive(), paper, digest, gaps, linked_concepts)
}

/// Render the note with an explicit creation date.
pub fn render_note_on(
    created: NaiveDate,
    paper: &PaperData,
    digest: &PaperDigest,
    gaps: Option<&ResearchGaps>,
    linked_concepts: Option<&[String]>,
) -> String {
    let mut out = build_frontmatter(created, paper, digest);

    let _ = writeln!(out, "\n# {}\n", digest.title);
    let _ = writeln!(out, "**Authors:** {}  ", digest.authors.join(", "));
    let _ = writeln!(out, "**Venue:** {}  ", digest.venue);
    let _ = writeln!(out, "**Date:** {}", digest.date);
    if let Some(id) = &digest.arxiv_id {
        let _ = writeln!(out, "**arXiv:** [{id}](https://arxiv.org/abs/{id})");
    }

    push_section(&mut out, "Key Contribution", &digest.key_contribution);
    push_section(&mut out, "Methodology", &digest.methodology);
    push_section(&mut out, "Results", &digest.core_results);
    push_section(&mut out, "Limitations", &digest.limitations);

    if let Some(gaps) = gaps {
        out.push_str("\n## Research Gaps\n");
        push_list(&mut out, "### Open Questions", &gaps.open_questions);
        push_list(&mut out, "### Extension Ideas", &gaps.extension_ideas);
        if !gaps.scaling_considerations.trim().is_empty() {
            let _ = writeln!(
                out,
                "\n### Scaling Considerations\n\n{}",
                gaps.scaling_considerations.trim()
            );
        }
        push_list(&mut out, "### Methodological Gaps", &gaps.methodological_gaps);
    }

    if !digest.connections.is_empty() {
        out.push_str("\n## Connections\n\n");
        for concept in &digest.connections {
            let _ = writeln!(out, "- [[{concept}]]");
        }
    }

    if let Some(linked) = linked_concepts.filter(|l| !l.is_empty()) {
        out.push_str("\n## Linked Vault Concepts\n\n");
        for concept in linked {
            let _ = writeln!(out, "- [[{concept}]]");
        }
    }

    if !paper.tables.is_empty() {
        out.push_str("\n## Tables\n");
        for (idx, table) in paper.tables.iter().enumerate() {
            let _ = writeln!(out, "\n### Table {}\n\n{table}", idx + 1);
        }
    }

    out
}

fn build_frontmatter(created: NaiveDate, paper: &PaperData, digest: &PaperDigest) -> String {
    let mut fm = String::from("---\n");
    let _ = writeln!(fm, "title: \"{}\"", escape_yaml_string(&digest.title));
    let _ = writeln!(fm, "authors: {}", yaml_list(&digest.authors));
    let _ = writeln!(fm, "date: \"{}\"", escape_yaml_string(&digest.date));
    let _ = writeln!(fm, "venue: \"{}\"", escape_yaml_string(&digest.venue));
    if let Some(id) = &digest.arxiv_id {
        let _ = writeln!(fm, "arxiv_id: \"{}\"", escape_yaml_string(id));
    }
    let _ = writeln!(fm, "tags: {}", yaml_list(&digest.tags));
    let _ = writeln!(fm, "source: \"{}\"", escape_yaml_string(&paper.source));
    let _ = writeln!(fm, "created: \"{}\"", created.format("%Y-%m-%d"));
    fm.push_str("---\n");
    fm
}

fn push_section(out: &mut String, heading: &str, body: &str) {
    let body = body.trim();
    if body.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n## {heading}\n\n{body}");
}

fn push_list(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{heading}\n");
    for item in items {
        let _ = writeln!(out, "- {item}");
    }
}

fn yaml_list(items: &[String]) -> String {
    let quoted: Vec<String> = items
        .iter()
        .map(|s| format!("\"{}\"", escape_yaml_string(s)))
        .collect();
    format!("[{}]", quoted.join(", "))
}

/// Escape special characters in a YAML string value.
fn escape_yaml_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Convert a paper title into a clean filename stem.
///
/// `Neural Codec Language Models are Zero-Shot Text to Speech Synthesizers`
/// → `neural-codec-language-models-are-zero-shot-text-to-speech`
pub fn sanitize_filename(title: &str) -> String {
    static DISALLOWED_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^a-z0-9\s-]").expect("valid regex"));
    static WHITESPACE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
    static DASHES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").expect("valid regex"));

    let lowered = title.to_lowercase();
    let kept = DISALLOWED_RE.replace_all(&lowered, "");
    let dashed = WHITESPACE_RE.replace_all(&kept, "-");
    let mut name = DASHES_RE
        .replace_all(dashed.trim_matches('-'), "-")
        .into_owned();

    // Only ASCII survives the filters above, so byte slicing is safe.
    if name.len() > MAX_FILENAME_CHARS {
        let head = &name[..MAX_FILENAME_CHARS];
        name = match head.rfind('-') {
            Some(cut) => head[..cut].to_string(),
            None => head.to_string(),
        };
    }

    name.trim_matches('-').to_string()
}

/// Write `markdown` to `<output_dir>/<sanitized title>.md`, creating the
/// directory if needed. Returns the note path.
#[instrument(skip_all, fields(output_dir = %output_dir.display()))]
pub fn write_note(output_dir: &Path, title: &str, markdown: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir).map_err(|e| DistillError::io(output_dir, e))?;

    let mut stem = sanitize_filename(title);
    if stem.is_empty() {
        stem = FALLBACK_STEM.to_string();
    }
    let path = output_dir.join(format!("{stem}.md"));

    std::fs::write(&path, markdown).map_err(|e| DistillError::io(&path, e))?;
    info!(path = %path.display(), bytes = markdown.len(), "note written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use distill_shared::{NamedTextBlock, PaperMetadata};

    fn paper() -> PaperData {
        PaperData {
            metadata: PaperMetadata {
                title: "VALL-E".into(),
                authors: "Chengyi Wang".into(),
                date: Some("2023-01".into()),
                arxiv_id: Some("2301.02111".into()),
                source_url: "https://arxiv.org/abs/2301.02111".into(),
            },
            sections: vec![NamedTextBlock::new("Abstract", "...")],
            full_text: String::new(),
            tables: vec!["| a |\n| --- |\n| 1 |".into()],
            source: "https://arxiv.org/abs/2301.02111".into(),
            pdf_path: PathBuf::from("/tmp/vall-e.pdf"),
        }
    }

    fn digest() -> PaperDigest {
        PaperDigest {
            title: "Neural Codec Language Models are \"Zero-Shot\" TTS".into(),
            authors: vec!["Chengyi Wang".into(), "Sanyuan Chen".into()],
            date: "2023-01".into(),
            venue: "ArXiv".into(),
            arxiv_id: Some("2301.02111".into()),
            tags: vec!["text-to-speech".into(), "neural-codec".into()],
            key_contribution: "Treats TTS as [[Language Modeling]].".into(),
            methodology: "Discrete codec tokens.".into(),
            core_results: "Beats baselines.".into(),
            limitations: "".into(),
            connections: vec!["Audio Codecs".into()],
        }
    }

    fn created() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn frontmatter_is_escaped_yaml() {
        let note = render_note_on(created(), &paper(), &digest(), None, None);
        assert!(note.starts_with("---\n"));
        assert!(note.contains("title: \"Neural Codec Language Models are \\\"Zero-Shot\\\" TTS\"\n"));
        assert!(note.contains("authors: [\"Chengyi Wang\", \"Sanyuan Chen\"]\n"));
        assert!(note.contains("tags: [\"text-to-speech\", \"neural-codec\"]\n"));
        assert!(note.contains("arxiv_id: \"2301.02111\"\n"));
        assert!(note.contains("created: \"2024-03-09\"\n"));
    }

    #[test]
    fn body_sections_and_links() {
        let linked = vec!["Language Modeling".to_string()];
        let note = render_note_on(created(), &paper(), &digest(), None, Some(&linked));

        assert!(note.contains("## Key Contribution\n\nTreats TTS as [[Language Modeling]]."));
        assert!(note.contains("## Connections\n\n- [[Audio Codecs]]\n"));
        assert!(note.contains("## Linked Vault Concepts\n\n- [[Language Modeling]]\n"));
        assert!(note.contains("### Table 1\n\n| a |"));
        // Empty prose fields are omitted.
        assert!(!note.contains("## Limitations"));
        assert!(!note.contains("## Research Gaps"));
    }

    #[test]
    fn gaps_render_when_present() {
        let gaps = ResearchGaps {
            open_questions: vec!["Does it scale to music?".into()],
            extension_ideas: vec![],
            scaling_considerations: "Codec bitrate dominates.".into(),
            methodological_gaps: vec!["No MOS confidence intervals.".into()],
        };
        let note = render_note_on(created(), &paper(), &digest(), Some(&gaps), None);

        assert!(note.contains("## Research Gaps\n"));
        assert!(note.contains("### Open Questions\n\n- Does it scale to music?\n"));
        assert!(!note.contains("### Extension Ideas"));
        assert!(note.contains("### Scaling Considerations\n\nCodec bitrate dominates."));
        assert!(note.contains("### Methodological Gaps\n\n- No MOS confidence intervals.\n"));
    }

    #[test]
    fn sanitizes_long_titles_on_word_boundary() {
        assert_eq!(
            sanitize_filename(
                "Neural Codec Language Models are Zero-Shot Text to Speech Synthesizers"
            ),
            "neural-codec-language-models-are-zero-shot-text-to-speech"
        );
    }

    #[test]
    fn sanitize_drops_punctuation_and_collapses_dashes() {
        assert_eq!(sanitize_filename("  BERT: Pre-training -- of Deep (Bidirectional) Transformers! "),
            "bert-pre-training-of-deep-bidirectional-transformers");
        assert_eq!(sanitize_filename("Ünïcode & Symbols"), "ncode-symbols");
        assert_eq!(sanitize_filename("!!!"), "");
    }

    #[test]
    fn sanitize_caps_unbroken_names() {
        let name = sanitize_filename(&"a".repeat(80));
        assert_eq!(name.len(), MAX_FILENAME_CHARS);
    }

    #[test]
    fn write_note_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("notes/papers");

        let path = write_note(&out, "Attention Is All You Need", "# hi\n").unwrap();
        assert_eq!(path, out.join("attention-is-all-you-need.md"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# hi\n");

        let fallback = write_note(&out, "???", "x").unwrap();
        assert_eq!(fallback, out.join("untitled.md"));
    }
}
