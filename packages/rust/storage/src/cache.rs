use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use distill_shared::{DistillError, ExtractedContent, Result};

/// Suffix appended to the source path to form the record path.
pub const CACHE_SUFFIX: &str = ".cache.json";

/// Record layout version. Records with any other version are misses.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// One persisted extraction result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub schema_version: u32,
    /// Resolved source path this record belongs to.
    pub source: PathBuf,
    /// SHA-256 of the source bytes at extraction time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_sha256: Option<String>,
    pub cached_at: DateTime<Utc>,
    pub content: ExtractedContent,
}

/// File-backed cache storing each record adjacent to its source.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultCache;

impl ResultCache {
    pub fn new() -> Self {
        Self
    }

    /// Path of the record for `source`.
    pub fn record_path(&self, source: &Path) -> PathBuf {
        let mut os = source.as_os_str().to_os_string();
        os.push(CACHE_SUFFIX);
        PathBuf::from(os)
    }

    /// Look up the record for `source`. Corrupt records are logged and
    /// treated as absent.
    pub fn load(&self, source: &Path) -> Option<CacheRecord> {
        let record = match self.try_load(source) {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(source = %source.display(), "cache miss");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "cache record unusable, ignoring");
                return None;
            }
        };

        if let Some(stored) = &record.source_sha256 {
            if let Ok(bytes) = std::fs::read(source) {
                if &sha256_hex(&bytes) != stored {
                    warn!(
                        source = %source.display(),
                        "source changed since it was cached; reusing the stale extraction"
                    );
                }
            }
        }

        info!(path = %self.record_path(source).display(), "loaded cached extraction");
        Some(record)
    }

    /// Strict lookup: `Ok(None)` when no record exists, `CacheCorruption` when
    /// one exists but cannot be used.
    pub fn try_load(&self, source: &Path) -> Result<Option<CacheRecord>> {
        let path = self.record_path(source);
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(&path).map_err(|e| DistillError::CacheCorruption {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let record: CacheRecord =
            serde_json::from_str(&raw).map_err(|e| DistillError::CacheCorruption {
                path: path.clone(),
                message: e.to_string(),
            })?;

        if record.schema_version != CACHE_SCHEMA_VERSION {
            return Err(DistillError::CacheCorruption {
                path,
                message: format!(
                    "schema_version {} (expected {CACHE_SCHEMA_VERSION})",
                    record.schema_version
                ),
            });
        }

        Ok(Some(record))
    }

    /// Persist `content` as the record for `source`, overwriting any previous
    /// record. Returns the record path.
    pub fn store(
        &self,
        source: &Path,
        content: &ExtractedContent,
        source_sha256: Option<String>,
    ) -> Result<PathBuf> {
        let path = self.record_path(source);
        let record = CacheRecord {
            schema_version: CACHE_SCHEMA_VERSION,
            source: source.to_path_buf(),
            source_sha256,
            cached_at: Utc::now(),
            content: content.clone(),
        };

        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| DistillError::validation(format!("cache record: {e}")))?;
        write_atomic(&path, json.as_bytes())?;

        info!(path = %path.display(), "saved extraction to cache");
        Ok(path)
    }
}

/// Write `bytes` to `path` through a sibling `.{name}.tmp` file and a rename,
/// so readers never observe a half-written file at `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| DistillError::validation(format!("no file name in {}", path.display())))?;
    let temp = path.with_file_name(format!(".{name}.tmp"));

    if let Err(e) = std::fs::write(&temp, bytes) {
        let _ = std::fs::remove_file(&temp);
        return Err(DistillError::io(&temp, e));
    }
    std::fs::rename(&temp, path).map_err(|e| DistillError::io(path, e))
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
