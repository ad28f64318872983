//! aitest - concurrent prompt evaluation CLI
//!
//! ## Commands
//!
//! - `run`: Execute selected prompts against their test cases for N rounds
//! - `list`: Show known prompts and how many cases each has

use std::collections::BTreeSet;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{MultiSelect, Password};
use tracing::{info, warn, Level};

use aitest_core::{
    hold_logs, init_tracing, Catalog, ConcurrencyLimits, ExecutionEngine, InterruptController,
    LiveRenderer, LogFormat, ReportFormat, RunOptions, RunState, RunSummary,
};
use aitest_providers::{Credentials, ProviderRouter, Vendor, DEFAULT_CREDENTIALS_FILE};

/// Exit status for a run stopped by Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "aitest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Concurrent prompt evaluation against model providers", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run prompts against their test cases
    Run(RunArgs),

    /// List prompts with their vendor, model and case count
    List(SourceArgs),
}

#[derive(Args, Debug, Clone)]
struct SourceArgs {
    /// Prompt configuration file
    #[arg(long, default_value = "prompts.json")]
    prompts: PathBuf,

    /// Directory of case files
    #[arg(long, default_value = "cases")]
    cases_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Directory reports are written to
    #[arg(long, default_value = "testLog")]
    output_dir: PathBuf,

    /// Credentials file
    #[arg(long, default_value = DEFAULT_CREDENTIALS_FILE)]
    config: PathBuf,

    /// Prompt to run (repeatable)
    #[arg(short, long = "prompt", value_name = "NAME")]
    selected: Vec<String>,

    /// Run every known prompt
    #[arg(long, conflicts_with = "selected")]
    all: bool,

    /// Number of rounds
    #[arg(short, long, default_value_t = 1)]
    rounds: u32,

    /// Rounds running at once
    #[arg(long, default_value_t = 1)]
    round_concurrency: usize,

    /// Prompts running at once within a round
    #[arg(long, default_value_t = 2)]
    prompt_concurrency: usize,

    /// Cases running at once across the whole run
    #[arg(long, default_value_t = 4)]
    case_concurrency: usize,

    /// Report format: html, xml or json
    #[arg(long, default_value = "html")]
    format: ReportFormat,

    /// Seconds in-flight cases get to finish after Ctrl-C
    #[arg(long, default_value_t = 5)]
    grace_secs: u64,

    /// Disable the live progress view
    #[arg(long)]
    no_live: bool,
}

impl RunArgs {
    fn options(&self) -> RunOptions {
        RunOptions::default()
            .with_rounds(self.rounds)
            .with_limits(ConcurrencyLimits::new(
                self.round_concurrency,
                self.prompt_concurrency,
                self.case_concurrency,
            ))
            .with_grace(Duration::from_secs(self.grace_secs))
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing(format, level);

    match cli.command {
        Commands::Run(args) => {
            let state = cmd_run(&args).await?;
            Ok(ExitCode::from(exit_status(state)))
        }
        Commands::List(args) => {
            cmd_list(&args)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_status(state: RunState) -> u8 {
    match state {
        RunState::Interrupted => EXIT_INTERRUPTED,
        RunState::FatalError => 1,
        _ => 0,
    }
}

fn load_catalog(source: &SourceArgs) -> Result<Catalog> {
    Catalog::load(&source.prompts, &source.cases_dir).with_context(|| {
        format!(
            "Failed to load prompts from {} and cases from {}",
            source.prompts.display(),
            source.cases_dir.display()
        )
    })
}

async fn cmd_run(args: &RunArgs) -> Result<RunState> {
    let catalog = Arc::new(load_catalog(&args.source)?);
    let selected = select_prompts(args, &catalog)?;
    info!(prompts = ?selected, rounds = args.rounds, "starting run");

    let credentials = ensure_credentials(&args.config, &vendors_for(&catalog, &selected))?;
    let router = ProviderRouter::from_credentials(&credentials)
        .context("Failed to configure model providers")?;

    let options = args.options();
    let live = !args.no_live && std::io::stdout().is_terminal();
    let renderer = if live {
        LiveRenderer::stdout(options.refresh)
    } else {
        LiveRenderer::disabled()
    };
    let engine = ExecutionEngine::new(Arc::new(router), catalog).with_renderer(Arc::new(renderer));

    let interrupt = InterruptController::new(options.grace);
    let watcher = interrupt.watch_ctrl_c();
    let logs = live.then(hold_logs);
    let outcome = engine.run(&selected, &options, &interrupt).await;
    drop(logs);
    watcher.abort();
    let outcome = outcome.context("Run failed")?;

    let renderer = args.format.renderer();
    let path = interrupt
        .publish(&outcome, renderer.as_ref(), &args.output_dir)
        .context("Failed to write report")?;

    let summary = RunSummary::from_run(&outcome.result);
    println!();
    if outcome.state == RunState::Interrupted {
        println!("Run interrupted: partial results kept.");
    }
    println!(
        "{} cases ({} failed) across {} round(s) in {:.1}s",
        summary.total_cases,
        summary.failed_cases,
        summary.round_count,
        outcome.elapsed.as_secs_f64()
    );
    println!("  avg response: {:.3}s", summary.average_response_secs);
    println!("  tokens:       {}", summary.total_tokens);
    println!("Report written to {}", path.display());

    Ok(outcome.state)
}

fn cmd_list(args: &SourceArgs) -> Result<()> {
    let catalog = load_catalog(args)?;
    if catalog.prompts().is_empty() {
        println!("No prompts found in {}", args.prompts.display());
        return Ok(());
    }
    for prompt in catalog.prompts() {
        println!(
            "{:<24} {:<10} {:<24} {} case(s)",
            prompt.name,
            prompt.vendor,
            prompt.model,
            catalog.cases_for(&prompt.name).len()
        );
    }
    Ok(())
}

/// Prompts named on the command line, all prompts, or an interactive pick.
fn select_prompts(args: &RunArgs, catalog: &Catalog) -> Result<Vec<String>> {
    if args.all {
        return Ok(catalog.prompt_names());
    }
    if !args.selected.is_empty() {
        return Ok(args.selected.clone());
    }
    if !std::io::stdin().is_terminal() {
        bail!("No prompts selected: pass --prompt <NAME> or --all when not running interactively");
    }

    let names = catalog.prompt_names();
    if names.is_empty() {
        bail!("No prompts found in {}", args.source.prompts.display());
    }
    let mut items = vec!["All prompts".to_string()];
    items.extend(names.iter().cloned());

    let chosen = MultiSelect::with_theme(&ColorfulTheme::default())
        .with_prompt("Select prompts to run (space to toggle, enter to confirm)")
        .items(&items)
        .interact()
        .context("Prompt selection was aborted")?;

    Ok(expand_selection(&chosen, &names))
}

/// Index 0 is the "all prompts" entry; the rest map onto `names`.
fn expand_selection(chosen: &[usize], names: &[String]) -> Vec<String> {
    if chosen.contains(&0) {
        return names.to_vec();
    }
    chosen
        .iter()
        .filter_map(|i| names.get(i.wrapping_sub(1)).cloned())
        .collect()
}

/// Known vendors the selected prompts need, in a stable order.
fn vendors_for(catalog: &Catalog, selected: &[String]) -> Vec<Vendor> {
    let vendors: BTreeSet<_> = selected
        .iter()
        .filter_map(|name| catalog.prompt(name))
        .filter_map(|p| match p.vendor.parse::<Vendor>() {
            Ok(v) => Some(v.as_str()),
            Err(_) => {
                warn!(prompt = %p.name, vendor = %p.vendor, "prompt uses an unsupported vendor");
                None
            }
        })
        .collect();
    Vendor::ALL
        .into_iter()
        .filter(|v| vendors.contains(v.as_str()))
        .collect()
}

/// Loads credentials and asks for any missing key a selected vendor needs.
///
/// New keys are saved back to `path`. Without a terminal, missing keys are
/// left missing and the affected cases fail as not configured.
fn ensure_credentials(path: &Path, needed: &[Vendor]) -> Result<Credentials> {
    let mut credentials = Credentials::load(path)
        .with_context(|| format!("Failed to read credentials from {}", path.display()))?
        .with_env();

    let missing: Vec<Vendor> = needed
        .iter()
        .copied()
        .filter(|v| credentials.key_for(*v).is_none())
        .collect();
    if missing.is_empty() {
        return Ok(credentials);
    }
    if !std::io::stdin().is_terminal() {
        for vendor in &missing {
            warn!(%vendor, env = vendor.key_env(), "no API key configured");
        }
        return Ok(credentials);
    }

    for vendor in missing {
        let key = Password::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("{vendor} API key"))
            .interact()
            .context("API key entry was aborted")?;
        credentials.set_key(vendor, key.trim());
    }

    // Keys from the environment are not written to disk.
    let mut stored = Credentials::load(path)?;
    for vendor in Vendor::ALL {
        if std::env::var(vendor.key_env()).is_err() {
            if let Some(key) = credentials.key_for(vendor) {
                stored.set_key(vendor, key);
            }
        }
    }
    stored
        .save(path)
        .with_context(|| format!("Failed to save credentials to {}", path.display()))?;
    info!(path = %path.display(), "saved credentials");

    Ok(credentials)
}
