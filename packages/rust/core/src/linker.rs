//! Embed `[[wikilinks]]` to existing vault notes into digest prose.

use serde::Deserialize;
use tracing::{info, instrument};

use distill_shared::{PaperDigest, Result};

use crate::llm::{LanguageModel, parse_llm_json};

/// Reply size cap for the linker call.
pub const LINKER_MAX_TOKENS: u32 = 2000;

const SYSTEM_PROMPT: &str = "\
You are a knowledge graph linker for an Obsidian vault. Given a paper digest \
and a list of existing vault note titles, your job is to embed [[wikilinks]] \
into the digest text where concepts naturally appear.

Rules:
1. Only link to notes that exist in the provided vault list. Do NOT invent links.
2. Use the EXACT note title with [[double brackets]]: e.g. [[Transformer Architecture]].
3. Link each concept at most ONCE per field (first natural occurrence only).
4. Insert links inline within the existing prose. Do NOT alter the meaning or wording.
5. Only link when the text genuinely discusses that concept, not superficial mentions.
6. If a concept is a close match (e.g. vault has \"Attention\" and text says \
\"attention mechanism\"), link it as [[Attention]] at the appropriate point.
7. Preserve all original text. Only add [[ and ]] around matching concept names.

Return a JSON object with exactly these keys:
- \"key_contribution\": string with [[wikilinks]] embedded
- \"methodology\": string with [[wikilinks]] embedded
- \"core_results\": string with [[wikilinks]] embedded
- \"limitations\": string with [[wikilinks]] embedded
- \"linked_concepts\": array of strings, the vault note titles you actually linked

Return ONLY the JSON object. No markdown fencing, no explanation.";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LinkReply {
    key_contribution: Option<String>,
    methodology: Option<String>,
    core_results: Option<String>,
    limitations: Option<String>,
    linked_concepts: Vec<String>,
}

/// Rewrite the digest's prose fields with links to `vault_notes`.
///
/// Returns the linked digest and the titles actually linked. With no vault
/// notes the digest comes back unchanged and the model is not called. Fields
/// the model leaves out keep their original text.
#[instrument(skip_all, fields(title = %digest.title, notes = vault_notes.len()))]
pub async fn link_concepts(
    model: &dyn LanguageModel,
    digest: &PaperDigest,
    vault_notes: &[String],
) -> Result<(PaperDigest, Vec<String>)> {
    if vault_notes.is_empty() {
        info!("no vault notes, skipping linking");
        return Ok((digest.clone(), Vec::new()));
    }

    let raw = model
        .complete(SYSTEM_PROMPT, &build_prompt(digest, vault_notes), LINKER_MAX_TOKENS)
        .await?;
    let reply: LinkReply = parse_llm_json("link", &raw)?;

    let linked = PaperDigest {
        key_contribution: reply
            .key_contribution
            .unwrap_or_else(|| digest.key_contribution.clone()),
        methodology: reply.methodology.unwrap_or_else(|| digest.methodology.clone()),
        core_results: reply.core_results.unwrap_or_else(|| digest.core_results.clone()),
        limitations: reply.limitations.unwrap_or_else(|| digest.limitations.clone()),
        ..digest.clone()
    };

    info!(linked = reply.linked_concepts.len(), "concepts linked");
    Ok((linked, reply.linked_concepts))
}

fn build_prompt(digest: &PaperDigest, vault_notes: &[String]) -> String {
    let notes = vault_notes
        .iter()
        .map(|title| format!("- {title}"))
        .collect::<Vec<_>>()
        .join("\n");

    [
        format!("Paper: {}", digest.title),
        format!("Tags: {}", digest.tags.join(", ")),
        String::new(),
        "--- EXISTING VAULT NOTES ---".to_string(),
        notes,
        String::new(),
        "--- DIGEST TEXT FIELDS TO LINK ---".to_string(),
        String::new(),
        "key_contribution:".to_string(),
        digest.key_contribution.clone(),
        String::new(),
        "methodology:".to_string(),
        digest.methodology.clone(),
        String::new(),
        "core_results:".to_string(),
        digest.core_results.clone(),
        String::new(),
        "limitations:".to_string(),
        digest.limitations.clone(),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::llm::{ChatMessage, ModelTurn, ToolSchema};

    struct CannedModel {
        reply: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn converse(&self, _: &str, _: &[ToolSchema], _: &[ChatMessage]) -> Result<ModelTurn> {
            unreachable!("linker only uses complete")
        }

        async fn complete(&self, _: &str, prompt: &str, _: u32) -> Result<String> {
            assert!(prompt.contains("--- EXISTING VAULT NOTES ---\n- Attention\n- Transformers"));
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.to_string())
        }
    }

    fn digest() -> PaperDigest {
        PaperDigest {
            title: "Attention Is All You Need".into(),
            authors: vec!["A. Vaswani".into()],
            date: "2017-06".into(),
            venue: "NeurIPS".into(),
            arxiv_id: Some("1706.03762".into()),
            tags: vec!["transformers".into()],
            key_contribution: "Self-attention replaces recurrence.".into(),
            methodology: "Multi-head attention.".into(),
            core_results: "SOTA BLEU.".into(),
            limitations: "Quadratic cost.".into(),
            connections: vec!["Attention".into()],
        }
    }

    fn notes() -> Vec<String> {
        vec!["Attention".into(), "Transformers".into()]
    }

    #[tokio::test]
    async fn empty_vault_skips_the_model() {
        let model = CannedModel { reply: "{}", calls: AtomicUsize::new(0) };
        let (linked, concepts) = link_concepts(&model, &digest(), &[]).await.unwrap();
        assert_eq!(linked, digest());
        assert!(concepts.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_fields_keep_original_text() {
        let model = CannedModel {
            reply: r#"{"key_contribution": "Self-[[Attention]] replaces recurrence.",
                       "linked_concepts": ["Attention"]}"#,
            calls: AtomicUsize::new(0),
        };
        let (linked, concepts) = link_concepts(&model, &digest(), &notes()).await.unwrap();

        assert_eq!(linked.key_contribution, "Self-[[Attention]] replaces recurrence.");
        assert_eq!(linked.methodology, "Multi-head attention.");
        assert_eq!(linked.limitations, "Quadratic cost.");
        assert_eq!(linked.connections, digest().connections);
        assert_eq!(concepts, vec!["Attention"]);
    }
}
