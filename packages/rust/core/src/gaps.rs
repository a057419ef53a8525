//! Research-gap analysis via the generative service.

use tracing::{info, instrument};

use distill_shared::{NamedTextBlock, PaperDigest, ResearchGaps, Result};

use crate::budget::prepare_content;
use crate::llm::{LanguageModel, parse_llm_json};

/// Reply size cap for the gaps call.
pub const GAPS_MAX_TOKENS: u32 = 1500;

const SYSTEM_PROMPT: &str = "\
You are a research advisor helping identify opportunities for follow-up work \
on an academic paper. Think critically and constructively.

Return a single JSON object with exactly these keys:
- \"open_questions\": array of 3-5 strings, important unanswered questions \
raised by this work
- \"extension_ideas\": array of 2-4 strings, concrete, actionable project ideas \
that extend this work. Be specific: not \"do more experiments\" but \"apply X method \
to Y domain to test Z hypothesis\"
- \"scaling_considerations\": string, what happens when this approach is applied \
at larger scale, to different domains, or with more data? What assumptions break?
- \"methodological_gaps\": array of 1-3 strings, weaknesses in the methodology, \
missing baselines, questionable assumptions, or evaluation gaps. Be constructive.

Return ONLY the JSON object. No markdown fencing, no explanation.";

/// Identify open questions and extension ideas for a digested paper.
///
/// The raw sections are budgeted to `max_chars` without a fallback text, so
/// a paper with too little structure is analysed from the digest alone.
#[instrument(skip_all, fields(title = %digest.title))]
pub async fn identify_gaps(
    model: &dyn LanguageModel,
    digest: &PaperDigest,
    sections: &[NamedTextBlock],
    max_chars: usize,
) -> Result<ResearchGaps> {
    let prompt = build_prompt(digest, sections, max_chars);
    info!(chars = prompt.chars().count(), "prompt prepared");

    let raw = model.complete(SYSTEM_PROMPT, &prompt, GAPS_MAX_TOKENS).await?;
    let gaps: ResearchGaps = parse_llm_json("gaps", &raw)?;

    info!(
        open_questions = gaps.open_questions.len(),
        extension_ideas = gaps.extension_ideas.len(),
        "gap analysis complete"
    );
    Ok(gaps)
}

fn build_prompt(digest: &PaperDigest, sections: &[NamedTextBlock], max_chars: usize) -> String {
    let mut parts = vec![
        format!("Paper: {}", digest.title),
        format!("Authors: {}", digest.authors.join(", ")),
        format!("Venue: {}", digest.venue),
        String::new(),
        format!("Key Contribution: {}", digest.key_contribution),
        String::new(),
        format!("Methodology: {}", digest.methodology),
        String::new(),
        format!("Core Results: {}", digest.core_results),
        String::new(),
        format!("Known Limitations: {}", digest.limitations),
        String::new(),
        format!("Tags: {}", digest.tags.join(", ")),
    ];

    let content = prepare_content(sections, "", max_chars);
    if !content.trim().is_empty() {
        parts.push(String::new());
        parts.push("--- RAW PAPER SECTIONS (for deeper analysis) ---".to_string());
        parts.push(content);
    }

    parts.join("\n")
}
