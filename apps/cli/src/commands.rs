//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use distill_core::{
    AnthropicClient, ConversationController, RunObserver, RunOutcome, RunRequest, StepCatalog,
    StepServices,
};
use distill_parser::{AzureLayoutClient, FetchOptions};
use distill_shared::{
    AppConfig, config_file_path, expand_home, init_config, load_config, validate_credentials,
};
use distill_storage::ResultCache;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Distill: turn academic papers into structured Obsidian notes.
#[derive(Parser)]
#[command(
    name = "distill",
    version,
    about = "Distill an academic paper into a structured Obsidian note.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Analyze a paper and write an Obsidian note.
    Run {
        /// ArXiv URL (e.g. https://arxiv.org/abs/2301.12345) or local PDF path.
        source: String,

        /// Output directory for the note (defaults to `defaults.output_dir`).
        #[arg(short, long)]
        output: Option<String>,

        /// Obsidian vault for concept linking (defaults to `defaults.vault_path`).
        #[arg(long)]
        vault: Option<String>,

        /// Skip vault scanning and concept linking.
        #[arg(long, conflicts_with = "vault")]
        no_vault: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "distill=info",
        1 => "distill=debug",
        _ => "distill=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so stdout carries only the run summary.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            source,
            output,
            vault,
            no_vault,
        } => cmd_run(&source, output, vault, no_vault).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    source: &str,
    output: Option<String>,
    vault: Option<String>,
    no_vault: bool,
) -> Result<()> {
    let config = load_config()?;
    validate_credentials(&config)?;

    let output_dir = output.unwrap_or_else(|| config.defaults.output_dir.clone());
    let vault_path = if no_vault {
        None
    } else {
        vault.or_else(|| config.defaults.vault_path.clone())
    };

    let catalog = build_catalog(&config, vault_path.is_some())?;
    let request = RunRequest {
        source: source.to_string(),
        output_dir,
        vault_path,
    };

    info!(
        source,
        output_dir = %request.output_dir,
        vault = request.vault_path.as_deref().unwrap_or("-"),
        "starting run"
    );

    let observer = CliProgress::new();
    let mut controller = ConversationController::new(&catalog, &observer);
    let outcome = controller.run(&request).await.map_err(|e| {
        observer.abandon();
        eyre!(e)
    })?;

    print_summary(&outcome);
    Ok(())
}

/// Wire the external services named in `config`.
fn build_catalog(config: &AppConfig, vault_enabled: bool) -> Result<StepCatalog> {
    let model = AnthropicClient::from_config(&config.anthropic)?;
    let extractor = AzureLayoutClient::from_config(&config.azure)?;

    let services = StepServices {
        model: Arc::new(model),
        extractor: Arc::new(extractor),
        cache: ResultCache::new(),
        fetch: FetchOptions::new(expand_home(&config.defaults.download_dir)),
        limits: config.limits.clone(),
    };
    Ok(StepCatalog::new(services, vault_enabled))
}

fn print_summary(outcome: &RunOutcome) {
    println!();
    println!("  Run:      {}", outcome.run_id);
    println!("  Turns:    {}", outcome.turns);
    println!("  Steps:    {}", outcome.steps_executed);
    match &outcome.note_path {
        Some(path) => println!("  Note:     {}", path.display()),
        None => println!("  Note:     (not written)"),
    }
    if !outcome.linked_concepts.is_empty() {
        println!("  Linked:   {}", outcome.linked_concepts.join(", "));
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Run observer rendering an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn abandon(&self) {
        self.spinner.abandon_with_message("run failed");
    }
}

impl RunObserver for CliProgress {
    fn turn_started(&self, turn: usize) {
        self.spinner.set_message(format!("Waiting for the model (turn {turn})"));
    }

    fn assistant_text(&self, text: &str) {
        self.spinner.suspend(|| println!("{}", text.trim()));
    }

    fn step_started(&self, name: &str) {
        self.spinner.set_message(format!("Running {name}"));
    }

    fn step_finished(&self, name: &str, error: Option<&str>) {
        match error {
            None => self.spinner.println(format!("  ✓ {name}")),
            Some(message) => self.spinner.println(format!("  ✗ {name}: {message}")),
        }
    }

    fn finished(&self, _outcome: &RunOutcome) {
        self.spinner.finish_and_clear();
    }
}

fn cmd_config_init() -> Result<()> {
    let path = config_file_path()?;
    if path.exists() {
        return Err(eyre!("config already exists at {}", path.display()));
    }
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
