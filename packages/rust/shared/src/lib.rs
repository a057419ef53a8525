//! Shared types, error model, and configuration for Distill.
//!
//! This crate is the foundation depended on by all other Distill crates.
//! It provides:
//! - [`DistillError`], the unified error type
//! - Domain types ([`NamedTextBlock`], [`ExtractedContent`], [`PaperData`],
//!   [`PaperDigest`], [`ResearchGaps`])
//! - Configuration ([`AppConfig`], config loading, credential checks)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AnthropicConfig, AppConfig, AzureConfig, DefaultsConfig, LimitsConfig, config_dir,
    config_file_path, expand_home, init_config, load_config, load_config_from, read_secret,
    validate_credentials,
};
pub use error::{DistillError, Result};
pub use types::{
    ExtractedContent, NamedTextBlock, PaperData, PaperDigest, PaperMetadata, ParagraphRole,
    RawParagraph, ResearchGaps, TITLE_BLOCK,
};
