//! PDF acquisition and structural extraction for Distill.
//!
//! [`parse_paper`] resolves a source (URL or path), runs it through a
//! [`LayoutExtractor`] unless the [`ResultCache`] already holds a record for
//! that path, and assembles a [`PaperData`]:
//!
//! 1. [`fetch`] downloads or locates the PDF
//! 2. [`layout`] asks the extraction service for tagged paragraphs and tables
//! 3. [`sections`] folds paragraphs into named blocks and renders tables
//! 4. [`metadata`] recovers title, authors and arXiv id

pub mod fetch;
pub mod layout;
pub mod metadata;
pub mod sections;

use std::path::Path;

use tracing::{info, instrument, warn};

use distill_shared::{DistillError, ExtractedContent, PaperData, Result};
use distill_storage::{ResultCache, sha256_hex};

pub use fetch::{FetchOptions, Source, fetch_pdf};
pub use layout::{AnalyzeResult, AzureLayoutClient, LayoutExtractor, LayoutTable, TableCell};
pub use metadata::extract_metadata;
pub use sections::{group_sections, table_to_markdown};

/// Extract structured content from a local PDF, consulting the cache first.
///
/// A usable cache record short-circuits the extraction service entirely.
/// After a fresh extraction the result is stored; a failed store is logged
/// and does not fail the call.
#[instrument(skip_all, fields(pdf = %pdf_path.display()))]
pub async fn extract_content(
    pdf_path: &Path,
    extractor: &dyn LayoutExtractor,
    cache: &ResultCache,
) -> Result<ExtractedContent> {
    if let Some(record) = cache.load(pdf_path) {
        return Ok(record.content);
    }

    let bytes = std::fs::read(pdf_path).map_err(|e| DistillError::io(pdf_path, e))?;
    let analysis = extractor.analyze(&bytes).await?;

    let content = ExtractedContent {
        sections: group_sections(&analysis.paragraphs),
        tables: analysis.tables.iter().map(table_to_markdown).collect(),
        full_text: analysis.content,
        raw_paragraphs: analysis.paragraphs,
    };

    if let Err(e) = cache.store(pdf_path, &content, Some(sha256_hex(&bytes))) {
        warn!(error = %e, "failed to save extraction to cache");
    }

    Ok(content)
}

/// Fetch, extract and assemble one paper.
#[instrument(skip_all, fields(source = %source))]
pub async fn parse_paper(
    source: &str,
    opts: &FetchOptions,
    extractor: &dyn LayoutExtractor,
    cache: &ResultCache,
) -> Result<PaperData> {
    let resolved = Source::parse(source)?;
    let pdf_path = fetch_pdf(&resolved, opts).await?;

    let content = extract_content(&pdf_path, extractor, cache).await?;
    let metadata = extract_metadata(&content, source);

    info!(
        title = %metadata.title,
        sections = content.sections.len(),
        tables = content.tables.len(),
        "paper parsed"
    );

    Ok(PaperData {
        metadata,
        sections: content.sections,
        full_text: content.full_text,
        tables: content.tables,
        source: source.to_string(),
        pdf_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use distill_shared::{ParagraphRole, RawParagraph};

    struct CountingExtractor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LayoutExtractor for CountingExtractor {
        async fn analyze(&self, _pdf: &[u8]) -> Result<AnalyzeResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AnalyzeResult {
                content: "Sparse Mixtures\nBody".into(),
                paragraphs: vec![
                    RawParagraph::new(Some(ParagraphRole::Title), "Sparse Mixtures"),
                    RawParagraph::new(None, "N. Shazeer"),
                    RawParagraph::new(Some(ParagraphRole::SectionHeading), "Abstract"),
                    RawParagraph::new(None, "Experts route tokens."),
                ],
                tables: vec![LayoutTable {
                    row_count: 1,
                    column_count: 1,
                    cells: vec![TableCell {
                        row_index: 0,
                        column_index: 0,
                        row_span: None,
                        column_span: None,
                        content: "x".into(),
                    }],
                }],
            })
        }
    }

    struct FailingExtractor;

    #[async_trait]
    impl LayoutExtractor for FailingExtractor {
        async fn analyze(&self, _pdf: &[u8]) -> Result<AnalyzeResult> {
            Err(DistillError::external("layout extraction", "boom"))
        }
    }

    #[tokio::test]
    async fn second_parse_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("moe.pdf");
        std::fs::write(&pdf, b"%PDF-1.5").unwrap();
        let source = pdf.to_string_lossy().to_string();

        let extractor = CountingExtractor {
            calls: AtomicUsize::new(0),
        };
        let cache = ResultCache::new();
        let opts = FetchOptions::new(dir.path());

        let first = parse_paper(&source, &opts, &extractor, &cache).await.unwrap();
        let second = parse_paper(&source, &opts, &extractor, &cache).await.unwrap();

        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.sections, second.sections);
        assert_eq!(first.metadata.title, "Sparse Mixtures");
        assert_eq!(first.metadata.authors, "N. Shazeer");
        assert_eq!(first.tables, vec!["| x |\n| --- |"]);
        assert!(cache.record_path(&first.pdf_path).exists());
    }

    #[tokio::test]
    async fn extraction_failure_propagates_and_caches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("bad.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();
        let cache = ResultCache::new();

        let err = extract_content(&pdf, &FailingExtractor, &cache)
            .await
            .unwrap_err();
        assert!(matches!(err, DistillError::ExternalService { .. }));
        assert!(!cache.record_path(&pdf).exists());
    }

    #[tokio::test]
    async fn missing_source_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_paper(
            "/no/such/paper.pdf",
            &FetchOptions::new(dir.path()),
            &FailingExtractor,
            &ResultCache::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DistillError::SourceUnavailable(_)));
    }
}
