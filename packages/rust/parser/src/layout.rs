//! Layout extraction service client.
//!
//! [`LayoutExtractor`] is the seam the rest of the crate depends on;
//! [`AzureLayoutClient`] implements it against Azure Document Intelligence's
//! `prebuilt-layout` model (submit, then poll the operation until it settles).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use distill_shared::{AzureConfig, DistillError, RawParagraph, Result, read_secret};

const SERVICE: &str = "layout extraction";

/// Layout model used for every analysis.
const LAYOUT_MODEL: &str = "prebuilt-layout";

/// Header carrying the subscription key.
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Response header naming the operation to poll.
const OPERATION_HEADER: &str = "Operation-Location";

// ---------------------------------------------------------------------------
// Result model
// ---------------------------------------------------------------------------

/// The part of an analysis result this crate consumes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResult {
    /// Flat, reading-order text of the whole document.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub paragraphs: Vec<RawParagraph>,
    #[serde(default)]
    pub tables: Vec<LayoutTable>,
}

/// One detected table as a sparse list of cells.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutTable {
    pub row_count: usize,
    pub column_count: usize,
    #[serde(default)]
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCell {
    pub row_index: usize,
    pub column_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_span: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_span: Option<usize>,
    #[serde(default)]
    pub content: String,
}

// ---------------------------------------------------------------------------
// Extractor trait
// ---------------------------------------------------------------------------

/// Converts raw PDF bytes into tagged paragraphs and tables.
#[async_trait]
pub trait LayoutExtractor: Send + Sync {
    async fn analyze(&self, pdf: &[u8]) -> Result<AnalyzeResult>;
}

// ---------------------------------------------------------------------------
// Azure Document Intelligence
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationStatus {
    status: String,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Azure Document Intelligence REST client.
#[derive(Debug, Clone)]
pub struct AzureLayoutClient {
    client: Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl AzureLayoutClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        let defaults = AzureConfig::default();
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_version: api_version.into(),
            poll_interval: Duration::from_millis(defaults.poll_interval_ms),
            max_polls: defaults.max_polls,
        }
    }

    /// Build a client from configuration, reading the endpoint and key from
    /// the environment variables it names.
    pub fn from_config(config: &AzureConfig) -> Result<Self> {
        let endpoint = read_secret(&config.endpoint_env)?;
        let key = read_secret(&config.key_env)?;
        Ok(Self::new(endpoint, key, config.api_version.clone())
            .with_polling(Duration::from_millis(config.poll_interval_ms), config.max_polls))
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/documentintelligence/documentModels/{LAYOUT_MODEL}:analyze?api-version={}",
            self.endpoint, self.api_version
        )
    }

    async fn submit(&self, pdf: &[u8]) -> Result<String> {
        let response = self
            .client
            .post(self.analyze_url())
            .header(KEY_HEADER, &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(pdf.to_vec())
            .send()
            .await
            .map_err(|e| DistillError::external(SERVICE, e.to_string()))?;

        let status = response.status();
        if status != StatusCode::ACCEPTED && !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DistillError::external(SERVICE, status_message(status, &body)));
        }

        response
            .headers()
            .get(OPERATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                DistillError::external(SERVICE, format!("response has no {OPERATION_HEADER} header"))
            })
    }

    async fn poll(&self, operation: &str) -> Result<AnalyzeResult> {
        for attempt in 1..=self.max_polls {
            let response = self
                .client
                .get(operation)
                .header(KEY_HEADER, &self.api_key)
                .send()
                .await
                .map_err(|e| DistillError::external(SERVICE, e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(DistillError::external(SERVICE, status_message(status, &body)));
            }

            let op: OperationStatus = response
                .json()
                .await
                .map_err(|e| DistillError::external(SERVICE, format!("undecodable status: {e}")))?;

            match op.status.as_str() {
                "succeeded" => {
                    return op.analyze_result.ok_or_else(|| {
                        DistillError::external(SERVICE, "succeeded without an analyzeResult")
                    });
                }
                "failed" | "canceled" => {
                    let detail = op.error.map(|e| e.to_string()).unwrap_or_default();
                    return Err(DistillError::external(
                        SERVICE,
                        format!("analysis {}: {detail}", op.status),
                    ));
                }
                other => {
                    debug!(attempt, status = other, "analysis still running");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        Err(DistillError::external(
            SERVICE,
            format!("analysis did not finish after {} polls", self.max_polls),
        ))
    }
}

#[async_trait]
impl LayoutExtractor for AzureLayoutClient {
    #[instrument(skip_all, fields(bytes = pdf.len()))]
    async fn analyze(&self, pdf: &[u8]) -> Result<AnalyzeResult> {
        info!("submitting document for layout analysis");
        let operation = self.submit(pdf).await?;
        let result = self.poll(&operation).await?;
        info!(
            paragraphs = result.paragraphs.len(),
            tables = result.tables.len(),
            "layout analysis complete"
        );
        Ok(result)
    }
}

fn status_message(status: StatusCode, body: &str) -> String {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            format!("authentication failed ({status}): check the endpoint and key")
        }
        StatusCode::TOO_MANY_REQUESTS => format!("rate limited ({status})"),
        _ => format!("HTTP {status}: {body}"),
    }
}
