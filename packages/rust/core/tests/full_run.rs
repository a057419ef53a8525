//! End-to-end runs of the controller with scripted services.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use distill_core::llm::{ChatMessage, ContentBlock, ModelTurn, ToolSchema};
use distill_core::{
    ConversationController, LanguageModel, RunRequest, SilentObserver, StepCatalog, StepServices,
};
use distill_parser::{AnalyzeResult, FetchOptions, LayoutExtractor, LayoutTable, TableCell};
use distill_shared::{LimitsConfig, ParagraphRole, RawParagraph, Result};
use distill_storage::ResultCache;

/// Plays the reasoning service: a fixed sequence of turns for `converse` and
/// a fixed sequence of JSON replies for `complete`.
struct ScriptedModel {
    turns: Mutex<Vec<ModelTurn>>,
    completions: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn full_pipeline(pdf: &Path, vault: &Path, out: &Path) -> Self {
        let turns = vec![
            tool_turn(vec![
                ("p1", "parse_paper", json!({"source": pdf})),
                ("v1", "scan_vault", json!({"vault_path": vault})),
            ]),
            tool_turn(vec![("d1", "digest_paper", json!({}))]),
            tool_turn(vec![
                ("l1", "link_concepts", json!({})),
                ("g1", "identify_gaps", json!({})),
                ("w1", "write_note", json!({"output_dir": out})),
            ]),
            ModelTurn {
                content: vec![ContentBlock::text("Created the note and linked [[Attention]].")],
                stop_reason: Some("end_turn".into()),
            },
        ];

        let completions = vec![
            json!({
                "tags": ["transformers", "attention"],
                "key_contribution": "Attention replaces recurrence.",
                "methodology": "Stacked self-attention layers.",
                "core_results": "28.4 BLEU on WMT14 En-De.",
                "limitations": "Quadratic in sequence length.",
                "connections": ["Sequence Modeling"],
                "venue": "NeurIPS"
            }),
            json!({
                "key_contribution": "[[Attention]] replaces recurrence.",
                "linked_concepts": ["Attention"]
            }),
            json!({
                "open_questions": ["Can attention be made linear?"],
                "extension_ideas": ["Apply to speech."],
                "scaling_considerations": "Memory grows quadratically.",
                "methodological_gaps": ["Few ablations."]
            }),
        ]
        .into_iter()
        .map(|v| v.to_string())
        .collect();

        Self {
            turns: Mutex::new(turns),
            completions: Mutex::new(completions),
        }
    }

    fn parse_only(pdf: &Path) -> Self {
        Self {
            turns: Mutex::new(vec![
                tool_turn(vec![("p1", "parse_paper", json!({"source": pdf}))]),
                ModelTurn {
                    content: vec![ContentBlock::text("Parsed.")],
                    stop_reason: Some("end_turn".into()),
                },
            ]),
            completions: Mutex::new(vec![]),
        }
    }
}

fn tool_turn(calls: Vec<(&str, &str, Value)>) -> ModelTurn {
    ModelTurn {
        content: calls
            .into_iter()
            .map(|(id, name, input)| ContentBlock::ToolUse {
                id: id.into(),
                name: name.into(),
                input,
            })
            .collect(),
        stop_reason: Some("tool_use".into()),
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn converse(&self, _: &str, _: &[ToolSchema], _: &[ChatMessage]) -> Result<ModelTurn> {
        Ok(self.turns.lock().unwrap().remove(0))
    }

    async fn complete(&self, _: &str, _: &str, _: u32) -> Result<String> {
        Ok(self.completions.lock().unwrap().remove(0))
    }
}

/// Layout service stand-in that counts how often it is called.
#[derive(Default)]
struct CountingExtractor {
    calls: AtomicUsize,
}

#[async_trait]
impl LayoutExtractor for CountingExtractor {
    async fn analyze(&self, _pdf: &[u8]) -> Result<AnalyzeResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let paragraphs = vec![
            RawParagraph::new(Some(ParagraphRole::Title), "Attention Is All You Need"),
            RawParagraph::new(None, "Ashish Vaswani, Noam Shazeer"),
            RawParagraph::new(Some(ParagraphRole::SectionHeading), "Abstract"),
            RawParagraph::new(None, "We propose the Transformer."),
            RawParagraph::new(Some(ParagraphRole::SectionHeading), "1 Introduction"),
            RawParagraph::new(None, "Recurrent models are sequential."),
            RawParagraph::new(Some(ParagraphRole::PageNumber), "1"),
            RawParagraph::new(Some(ParagraphRole::SectionHeading), "3 Model Architecture"),
            RawParagraph::new(None, "Encoder and decoder stacks."),
        ];
        let content = paragraphs
            .iter()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(AnalyzeResult {
            content,
            paragraphs,
            tables: vec![LayoutTable {
                row_count: 2,
                column_count: 2,
                cells: vec![
                    cell(0, 0, "Model"),
                    cell(0, 1, "BLEU"),
                    cell(1, 0, "Transformer"),
                    cell(1, 1, "28.4"),
                ],
            }],
        })
    }
}

fn cell(row: usize, column: usize, content: &str) -> TableCell {
    TableCell {
        row_index: row,
        column_index: column,
        row_span: None,
        column_span: None,
        content: content.into(),
    }
}

fn catalog(
    model: ScriptedModel,
    extractor: Arc<CountingExtractor>,
    dir: &Path,
    vault: bool,
) -> StepCatalog {
    StepCatalog::new(
        StepServices {
            model: Arc::new(model),
            extractor,
            cache: ResultCache::new(),
            fetch: FetchOptions::new(dir.join("downloads")),
            limits: LimitsConfig::default(),
        },
        vault,
    )
}

fn workspace() -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("attention.pdf");
    std::fs::write(&pdf, b"%PDF-1.4 fake").unwrap();

    let vault = dir.path().join("vault");
    std::fs::create_dir_all(vault.join(".obsidian")).unwrap();
    std::fs::write(vault.join("Attention.md"), "").unwrap();
    std::fs::write(vault.join("Gardening.md"), "").unwrap();
    std::fs::write(vault.join(".obsidian/app.md"), "").unwrap();

    (dir, pdf, vault)
}

#[tokio::test]
async fn full_run_writes_a_linked_note() {
    let (dir, pdf, vault) = workspace();
    let out = dir.path().join("notes");
    let extractor = Arc::new(CountingExtractor::default());

    let catalog = catalog(
        ScriptedModel::full_pipeline(&pdf, &vault, &out),
        extractor.clone(),
        dir.path(),
        true,
    );
    let mut controller = ConversationController::new(&catalog, &SilentObserver);
    let request = RunRequest {
        source: pdf.display().to_string(),
        output_dir: out.display().to_string(),
        vault_path: Some(vault.display().to_string()),
    };

    let outcome = controller.run(&request).await.unwrap();

    assert_eq!(outcome.turns, 4);
    assert_eq!(outcome.steps_executed, 6);
    assert_eq!(outcome.linked_concepts, vec!["Attention"]);
    assert!(outcome.final_text.contains("Created the note"));
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);

    // Opening instruction, then (assistant, results) per tool turn, then the
    // closing assistant turn.
    assert_eq!(controller.transcript().len(), 1 + 2 * 3 + 1);

    let note_path = outcome.note_path.unwrap();
    assert_eq!(note_path, out.join("attention-is-all-you-need.md"));
    let note = std::fs::read_to_string(&note_path).unwrap();
    assert!(note.starts_with("---\ntitle: \"Attention Is All You Need\"\n"));
    assert!(note.contains("## Key Contribution\n\n[[Attention]] replaces recurrence."));
    assert!(note.contains("Can attention be made linear?"));
    assert!(note.contains("## Linked Vault Concepts\n\n- [[Attention]]"));
    assert!(note.contains("| Transformer | 28.4 |"));

    // The extraction was cached next to the source.
    assert!(dir.path().join("attention.pdf.cache.json").exists());
}

#[tokio::test]
async fn second_run_on_same_source_uses_the_cache() {
    let (dir, pdf, _vault) = workspace();
    let extractor = Arc::new(CountingExtractor::default());

    for _ in 0..2 {
        let catalog = catalog(
            ScriptedModel::parse_only(&pdf),
            extractor.clone(),
            dir.path(),
            false,
        );
        let mut controller = ConversationController::new(&catalog, &SilentObserver);
        let request = RunRequest {
            source: pdf.display().to_string(),
            output_dir: dir.path().join("notes").display().to_string(),
            vault_path: None,
        };

        controller.run(&request).await.unwrap();
        let paper = controller.state().paper().unwrap();
        assert_eq!(paper.metadata.title, "Attention Is All You Need");
        assert_eq!(paper.metadata.authors, "Ashish Vaswani, Noam Shazeer");
    }

    assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
}
