//! Structured paper digest via the generative service.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{info, instrument};

use distill_shared::{PaperData, PaperDigest, Result};

use crate::budget::prepare_content;
use crate::llm::{LanguageModel, parse_llm_json};

/// Reply size cap for the digest call.
pub const DIGEST_MAX_TOKENS: u32 = 1500;

const DEFAULT_VENUE: &str = "ArXiv";

const SYSTEM_PROMPT: &str = "\
You are a research paper analysis assistant. Given the extracted content of an \
academic paper, produce a structured analysis.

Be concise and precise. Write for a researcher who wants to quickly understand \
what this paper contributes without reading the whole thing.

Return a single JSON object with exactly these keys:
- \"tags\": array of 3-5 topic tags (lowercase, hyphenated, e.g. [\"text-to-speech\", \"neural-codec\", \"zero-shot-learning\"])
- \"key_contribution\": string, 1-2 sentences on the ONE novel contribution
- \"methodology\": string, 1 concise paragraph summarizing the approach
- \"core_results\": string, 1 paragraph on key findings with specific metrics if available
- \"limitations\": string, both acknowledged limitations and any you identify
- \"connections\": array of 3-7 strings, related concepts, methods, or research areas \
formatted as potential note titles (e.g. \"Transformer Architecture\", \"Self-Supervised Learning\")
- \"venue\": string, the conference or journal if detectable from the text, otherwise \"ArXiv\"

Return ONLY the JSON object. No markdown fencing, no explanation.";

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DigestReply {
    tags: Vec<String>,
    key_contribution: String,
    methodology: String,
    core_results: String,
    limitations: String,
    connections: Vec<String>,
    venue: String,
}

impl Default for DigestReply {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            key_contribution: String::new(),
            methodology: String::new(),
            core_results: String::new(),
            limitations: String::new(),
            connections: Vec::new(),
            venue: DEFAULT_VENUE.to_string(),
        }
    }
}

/// Summarize `paper`. Bibliographic fields come from the parsed metadata;
/// the analysis fields come from the model.
#[instrument(skip_all, fields(title = %paper.metadata.title))]
pub async fn digest_paper(
    model: &dyn LanguageModel,
    paper: &PaperData,
    max_chars: usize,
) -> Result<PaperDigest> {
    let content = prepare_content(&paper.sections, &paper.full_text, max_chars);
    info!(chars = content.chars().count(), "content prepared");

    let raw = model
        .complete(SYSTEM_PROMPT, &build_prompt(paper, &content), DIGEST_MAX_TOKENS)
        .await?;
    let reply: DigestReply = parse_llm_json("digest", &raw)?;

    let meta = &paper.metadata;
    let digest = PaperDigest {
        title: meta.title.clone(),
        authors: split_authors(&meta.authors),
        date: meta.date.clone().unwrap_or_else(|| "Unknown".to_string()),
        venue: reply.venue,
        arxiv_id: meta.arxiv_id.clone(),
        tags: reply.tags,
        key_contribution: reply.key_contribution,
        methodology: reply.methodology,
        core_results: reply.core_results,
        limitations: reply.limitations,
        connections: reply.connections,
    };

    info!(tags = digest.tags.len(), connections = digest.connections.len(), "digest complete");
    Ok(digest)
}

fn build_prompt(paper: &PaperData, content: &str) -> String {
    let meta = &paper.metadata;
    let mut parts = vec![
        format!("Paper Title: {}", meta.title),
        format!("Authors: {}", meta.authors),
    ];
    if let Some(id) = &meta.arxiv_id {
        parts.push(format!("ArXiv ID: {id}"));
    }
    if let Some(date) = &meta.date {
        parts.push(format!("Date: {date}"));
    }
    parts.push(String::new());
    parts.push("--- PAPER CONTENT ---".to_string());
    parts.push(content.to_string());
    parts.join("\n")
}

/// Split an author line on commas, semicolons and the word "and".
pub fn split_authors(raw: &str) -> Vec<String> {
    static SEPARATOR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r",|;|\band\b").expect("valid regex"));

    SEPARATOR_RE
        .split(raw)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use distill_shared::{DistillError, NamedTextBlock, PaperMetadata};

    use crate::llm::{ChatMessage, ModelTurn, ToolSchema};

    struct CannedModel {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn converse(&self, _: &str, _: &[ToolSchema], _: &[ChatMessage]) -> Result<ModelTurn> {
            unreachable!("digest only uses complete")
        }

        async fn complete(&self, _system: &str, prompt: &str, max_tokens: u32) -> Result<String> {
            assert_eq!(max_tokens, DIGEST_MAX_TOKENS);
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    fn paper() -> PaperData {
        PaperData {
            metadata: PaperMetadata {
                title: "VALL-E".into(),
                authors: "Chengyi Wang, Sanyuan Chen; Yu Wu and Ziqiang Zhang".into(),
                date: Some("2023-01".into()),
                arxiv_id: Some("2301.02111".into()),
                source_url: "https://arxiv.org/abs/2301.02111".into(),
            },
            sections: vec![
                NamedTextBlock::new("Abstract", "We train a codec LM."),
                NamedTextBlock::new("1 Introduction", "TTS is hard."),
                NamedTextBlock::new("2 Method", "Tokens."),
            ],
            full_text: "fallback".into(),
            tables: vec![],
            source: "https://arxiv.org/abs/2301.02111".into(),
            pdf_path: PathBuf::from("/tmp/x.pdf"),
        }
    }

    #[test]
    fn splits_author_lines() {
        assert_eq!(
            split_authors("Chengyi Wang, Sanyuan Chen; Yu Wu and Ziqiang Zhang"),
            vec!["Chengyi Wang", "Sanyuan Chen", "Yu Wu", "Ziqiang Zhang"]
        );
        assert_eq!(split_authors("Alexander Anderson"), vec!["Alexander Anderson"]);
        assert_eq!(split_authors("Unknown"), vec!["Unknown"]);
    }

    #[tokio::test]
    async fn merges_metadata_with_model_fields() {
        let model = CannedModel {
            reply: "```json\n{\"tags\": [\"tts\"], \"key_contribution\": \"Codec LM.\", \
                    \"connections\": [\"Language Models\"]}\n```"
                .into(),
            prompts: Mutex::new(vec![]),
        };

        let digest = digest_paper(&model, &paper(), 10_000).await.unwrap();
        assert_eq!(digest.title, "VALL-E");
        assert_eq!(digest.authors.len(), 4);
        assert_eq!(digest.date, "2023-01");
        assert_eq!(digest.venue, "ArXiv");
        assert_eq!(digest.tags, vec!["tts"]);
        assert_eq!(digest.key_contribution, "Codec LM.");
        assert!(digest.methodology.is_empty());

        let prompt = &model.prompts.lock().unwrap()[0];
        assert!(prompt.starts_with("Paper Title: VALL-E\n"));
        assert!(prompt.contains("ArXiv ID: 2301.02111"));
        assert!(prompt.contains("--- PAPER CONTENT ---\n## Abstract"));
    }

    #[tokio::test]
    async fn prose_reply_is_malformed() {
        let model = CannedModel {
            reply: "Sorry, I can't help with that.".into(),
            prompts: Mutex::new(vec![]),
        };
        let err = digest_paper(&model, &paper(), 10_000).await.unwrap_err();
        assert!(matches!(err, DistillError::MalformedServiceOutput { .. }));
    }
}
