//! Source acquisition: resolve a URL or local path to a PDF on disk.
//!
//! The resolved path is the document's identity for the result cache, so
//! remote downloads land under a file name derived from the full URL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tracing::{info, instrument};
use url::Url;

use distill_shared::{DistillError, Result, expand_home};
use distill_storage::{sha256_hex, write_atomic};

/// User-Agent string for download requests.
const USER_AGENT: &str = concat!(
    "Distill/",
    env!("CARGO_PKG_VERSION"),
    " (academic research tool)"
);

/// Default timeout in seconds for PDF downloads.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Hex digits of the URL digest kept in download file names.
const NAME_HASH_LEN: usize = 12;

/// Where a document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Remote(Url),
    Local(PathBuf),
}

impl Source {
    /// Classify a user-supplied source string.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            let url = Url::parse(trimmed)
                .map_err(|e| DistillError::SourceUnavailable(format!("invalid URL '{raw}': {e}")))?;
            return Ok(Self::Remote(url));
        }
        Ok(Self::Local(expand_home(trimmed)))
    }
}

/// Configuration for source acquisition.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Directory remote PDFs are downloaded into.
    pub download_dir: PathBuf,
    /// Timeout for HTTP requests in seconds.
    pub timeout_secs: u64,
}

impl FetchOptions {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Resolve `source` to a local PDF path, downloading it if remote.
#[instrument(skip_all, fields(source = ?source))]
pub async fn fetch_pdf(source: &Source, opts: &FetchOptions) -> Result<PathBuf> {
    match source {
        Source::Local(path) => resolve_local(path),
        Source::Remote(url) => download(url, opts).await,
    }
}

/// Rewrite an arXiv abstract URL to its PDF form.
///
/// `https://arxiv.org/abs/2301.02111` → `https://arxiv.org/pdf/2301.02111.pdf`
pub fn pdf_url(url: &Url) -> Url {
    let mut rewritten = url.clone();
    let mut path = url.path().replace("/abs/", "/pdf/");
    if !path.ends_with(".pdf") {
        path.push_str(".pdf");
    }
    rewritten.set_path(&path);
    rewritten
}

/// Deterministic download file name for a PDF URL.
///
/// Host and last path segment keep the name readable. A short digest of the
/// whole URL (path and query, fragment dropped) keeps distinct URLs apart.
pub fn download_file_name(url: &Url) -> String {
    let host = url.host_str().unwrap_or("remote");
    let last = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .unwrap_or("download");
    let stem = last.strip_suffix(".pdf").unwrap_or(last);

    let mut identity = url.clone();
    identity.set_fragment(None);
    let digest = sha256_hex(identity.as_str().as_bytes());

    let readable: String = format!("{host}_{stem}")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!("{readable}_{}.pdf", &digest[..NAME_HASH_LEN])
}

fn resolve_local(path: &Path) -> Result<PathBuf> {
    if !path.is_file() {
        return Err(DistillError::SourceUnavailable(format!(
            "local PDF not found: {}",
            path.display()
        )));
    }
    let resolved = std::fs::canonicalize(path).map_err(|e| {
        DistillError::SourceUnavailable(format!("cannot resolve {}: {e}", path.display()))
    })?;
    info!(path = %resolved.display(), "using local file");
    Ok(resolved)
}

async fn download(url: &Url, opts: &FetchOptions) -> Result<PathBuf> {
    let pdf = pdf_url(url);
    let target = opts.download_dir.join(download_file_name(&pdf));

    if target.is_file() && std::fs::metadata(&target).map(|m| m.len() > 0).unwrap_or(false) {
        info!(path = %target.display(), "reusing previous download");
        return Ok(target);
    }

    std::fs::create_dir_all(&opts.download_dir)
        .map_err(|e| DistillError::io(&opts.download_dir, e))?;

    info!(url = %pdf, "downloading PDF");
    let client = build_client(opts)?;
    let response = client
        .get(pdf.as_str())
        .send()
        .await
        .map_err(|e| DistillError::SourceUnavailable(format!("{pdf}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DistillError::SourceUnavailable(format!("{pdf}: HTTP {status}")));
    }

    // arXiv sometimes answers with an HTML error page and status 200.
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !content_type.contains("pdf") && !content_type.contains("octet-stream") {
        return Err(DistillError::SourceUnavailable(format!(
            "{pdf}: expected a PDF but got Content-Type '{content_type}'"
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| DistillError::SourceUnavailable(format!("{pdf}: failed to read body: {e}")))?;

    write_atomic(&target, &bytes)?;
    info!(bytes = bytes.len(), path = %target.display(), "download complete");

    Ok(target)
}

fn build_client(opts: &FetchOptions) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(opts.timeout_secs))
        .build()
        .map_err(|e| DistillError::SourceUnavailable(format!("failed to build HTTP client: {e}")))
}
