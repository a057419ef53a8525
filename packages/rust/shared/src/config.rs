//! Application configuration for Distill.
//!
//! User config lives at `~/.distill/distill.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DistillError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "distill.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".distill";

// ---------------------------------------------------------------------------
// Config structs (matching distill.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Generative (reasoning) service settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Layout extraction service settings.
    #[serde(default)]
    pub azure: AzureConfig,

    /// Content and candidate-set limits.
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Where rendered notes are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Obsidian vault used for concept linking. Unset disables linking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_path: Option<String>,

    /// Where remote PDFs are downloaded to.
    #[serde(default = "default_download_dir")]
    pub download_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            vault_path: None,
            download_dir: default_download_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "~/distill-notes".into()
}
fn default_download_dir() -> String {
    "~/.distill/downloads".into()
}

/// `[anthropic]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_anthropic_key_env")]
    pub api_key_env: String,

    /// Model used for the control loop and the analysis steps.
    #[serde(default = "default_model")]
    pub model: String,

    /// Messages API base URL.
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    /// Output token cap for control-loop turns.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_anthropic_key_env(),
            model: default_model(),
            base_url: default_anthropic_base_url(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_anthropic_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".into()
}
fn default_max_tokens() -> u32 {
    4096
}

/// `[azure]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    /// Name of the env var holding the Document Intelligence endpoint.
    #[serde(default = "default_azure_endpoint_env")]
    pub endpoint_env: String,

    /// Name of the env var holding the Document Intelligence key.
    #[serde(default = "default_azure_key_env")]
    pub key_env: String,

    /// REST API version.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Delay between polls of a running analysis.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Maximum number of polls before giving up on an analysis.
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            endpoint_env: default_azure_endpoint_env(),
            key_env: default_azure_key_env(),
            api_version: default_api_version(),
            poll_interval_ms: default_poll_interval(),
            max_polls: default_max_polls(),
        }
    }
}

fn default_azure_endpoint_env() -> String {
    "AZURE_DOC_INTEL_ENDPOINT".into()
}
fn default_azure_key_env() -> String {
    "AZURE_DOC_INTEL_KEY".into()
}
fn default_api_version() -> String {
    "2024-11-30".into()
}
fn default_poll_interval() -> u64 {
    1000
}
fn default_max_polls() -> u32 {
    300
}

/// `[limits]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Character budget for paper content in the digest prompt.
    #[serde(default = "default_digest_max_chars")]
    pub digest_max_chars: usize,

    /// Character budget for raw sections in the gaps prompt.
    #[serde(default = "default_gaps_max_chars")]
    pub gaps_max_chars: usize,

    /// Vault size above which note titles are relevance-filtered.
    #[serde(default = "default_max_vault_notes")]
    pub max_vault_notes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            digest_max_chars: default_digest_max_chars(),
            gaps_max_chars: default_gaps_max_chars(),
            max_vault_notes: default_max_vault_notes(),
        }
    }
}

fn default_digest_max_chars() -> usize {
    200_000
}
fn default_gaps_max_chars() -> usize {
    100_000
}
fn default_max_vault_notes() -> usize {
    500
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.distill/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| DistillError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.distill/distill.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DistillError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DistillError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DistillError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DistillError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DistillError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

/// Read a secret from the named env var, rejecting unset or empty values.
pub fn read_secret(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(DistillError::config(format!(
            "environment variable {var_name} is not set. Export it or add it to a .env file."
        ))),
    }
}

/// Check that every credential both services need is present.
pub fn validate_credentials(config: &AppConfig) -> Result<()> {
    read_secret(&config.anthropic.api_key_env)?;
    read_secret(&config.azure.endpoint_env)?;
    read_secret(&config.azure.key_env)?;
    Ok(())
}
