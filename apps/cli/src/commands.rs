//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use harvester_core::pipeline::{Pipeline, ProgressReporter};
use harvester_core::scheduler::{RunKind, RunSummary, Scheduler, TriggerOutcome};
use harvester_shared::{AppConfig, GridCell, init_config, load_config, load_config_from};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Harvester: keep a business directory fed from public web sources.
#[derive(Parser)]
#[command(
    name = "harvester",
    version,
    about = "Collect, normalize, validate, and merge business listings into a directory.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.harvester/harvester.toml).
    #[arg(long, global = true, env = "HARVESTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
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
    /// Collect raw candidates across the location grid.
    Collect {
        /// Only the first N locations.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Normalize every raw file into canonical records.
    Normalize,

    /// Validate the current canonical snapshot.
    Validate,

    /// Merge the current valid snapshot into the directory.
    Merge,

    /// Run collect → normalize → validate → merge over every location.
    Full,

    /// Scheduler controls.
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum ScheduleAction {
    /// Run the recurring schedule until interrupted.
    Start,
    /// Run one full cycle now.
    RunOnce,
    /// Run one incremental cycle now.
    RunIncremental,
    /// Run maintenance (normalize + validate) now.
    RunMaintenance,
    /// Show run state and next fire times.
    Status,
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
        0 => "harvester=info",
        1 => "harvester=debug",
        _ => "harvester=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Collect { limit } => cmd_collect(config, limit).await,
        Command::Normalize => cmd_normalize(config),
        Command::Validate => cmd_validate(config),
        Command::Merge => cmd_merge(config).await,
        Command::Full => cmd_trigger(config, RunKind::Full).await,
        Command::Schedule { action } => match action {
            ScheduleAction::Start => cmd_schedule_start(config).await,
            ScheduleAction::RunOnce => cmd_trigger(config, RunKind::Full).await,
            ScheduleAction::RunIncremental => cmd_trigger(config, RunKind::Incremental).await,
            ScheduleAction::RunMaintenance => cmd_trigger(config, RunKind::Maintenance).await,
            ScheduleAction::Status => cmd_schedule_status(config),
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

// ---------------------------------------------------------------------------
// Stage commands
// ---------------------------------------------------------------------------

async fn cmd_collect(config: AppConfig, limit: Option<usize>) -> Result<()> {
    let start = Instant::now();
    let reporter = Arc::new(CliProgress::new());
    let pipeline = Pipeline::new(config).with_progress(reporter.clone());

    let mut cells = pipeline.cells_for(RunKind::Full);
    if let Some(n) = limit {
        cells.truncate(n);
    }
    info!(locations = cells.len(), "collecting");

    let result = pipeline.collect(&cells).await;
    reporter.clear();
    let out = result?;
    let s = &out.stats;

    println!();
    println!("  Collection finished");
    println!("  Locations:    {} ({} failed)", s.locations_processed, s.locations_failed);
    println!("  Pairs:        {} ({} failed)", s.cells_processed, s.cells_failed);
    println!("  Source calls: {} ok, {} failed", s.source_calls_ok, s.source_calls_failed);
    println!("  Pages:        {} fetched, {} failed", s.pages_fetched, s.fetch_failures);
    println!("  Extraction:   {} failed", s.extraction_failures);
    println!("  Checkpoints:  {} failed", s.checkpoint_failures);
    println!("  Skipped URLs: {}", s.urls_skipped);
    println!("  Candidates:   {}", s.candidates);
    println!("  Output:       {}", pipeline.artifacts().root().display());
    println!("  Time:         {:.1}s", start.elapsed().as_secs_f64());
    println!();
    Ok(())
}

fn cmd_normalize(config: AppConfig) -> Result<()> {
    let start = Instant::now();
    let pipeline = Pipeline::new(config);
    let out = pipeline.normalize_from_disk()?;
    let s = &out.stats;

    println!();
    println!("  Normalization finished");
    println!("  Input:         {}", s.input);
    println!("  Canonical:     {}", s.output);
    println!("  Duplicates:    {}", s.duplicates);
    println!("  Dropped:       {}", s.dropped);
    println!("  Field defects: {}", s.field_defects);
    println!("  Bad raw files: {}", s.unreadable_files);
    println!("  Time:          {:.1}s", start.elapsed().as_secs_f64());
    println!();
    Ok(())
}

fn cmd_validate(config: AppConfig) -> Result<()> {
    let start = Instant::now();
    let pipeline = Pipeline::new(config);
    let outcome = pipeline.validate_from_disk()?;
    let report = &outcome.report;
    let s = &report.summary;

    println!();
    println!("  Validation finished");
    println!("  Total:    {}", s.total);
    println!("  Valid:    {}", s.valid);
    println!("  Invalid:  {}", s.invalid);
    println!("  Warnings: {}", s.warned);
    println!("  Quality:  {:.1}%", report.data_quality.overall * 100.0);
    for (field, count) in &report.error_histogram {
        println!("    error   {:<10} {count}", field.as_str());
    }
    for (field, count) in &report.warning_histogram {
        println!("    warning {:<10} {count}", field.as_str());
    }
    for rec in &report.recommendations {
        println!("  - {rec}");
    }
    println!("  Time:     {:.1}s", start.elapsed().as_secs_f64());
    println!();
    Ok(())
}

async fn cmd_merge(config: AppConfig) -> Result<()> {
    let start = Instant::now();
    let pipeline = Pipeline::new(config);
    let report = pipeline.merge_from_disk().await?;

    println!();
    println!("  Merge finished");
    println!("  Created:  {}", report.created);
    println!("  Updated:  {}", report.updated);
    println!("  Failed:   {}", report.failed);
    for failure in &report.failures {
        println!("    {}: {}", failure.slug, failure.error);
    }
    println!(
        "  Directory: {} entries, {:.0}% verified, {:.0}% featured, {:.0}% active",
        report.stats.total,
        report.stats.verified_rate * 100.0,
        report.stats.featured_rate * 100.0,
        report.stats.active_rate * 100.0
    );
    println!("  Time:     {:.1}s", start.elapsed().as_secs_f64());
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Scheduler commands
// ---------------------------------------------------------------------------

async fn cmd_trigger(config: AppConfig, kind: RunKind) -> Result<()> {
    let reporter = Arc::new(CliProgress::new());
    let schedule = config.schedule.clone();
    let pipeline = Pipeline::new(config).with_progress(reporter.clone());
    let scheduler = Scheduler::new(Arc::new(pipeline), schedule);

    let outcome = scheduler.trigger(kind).await;
    reporter.clear();
    match outcome {
        TriggerOutcome::Completed(summary) => {
            print_summary(&summary);
            Ok(())
        }
        TriggerOutcome::Failed { kind, message } => Err(eyre!("{kind} run failed: {message}")),
        TriggerOutcome::Skipped { active } => {
            println!("A {active} run is already in progress; nothing started.");
            Ok(())
        }
    }
}

async fn cmd_schedule_start(config: AppConfig) -> Result<()> {
    let schedule = config.schedule.clone();
    let scheduler = Arc::new(Scheduler::new(Arc::new(Pipeline::new(config)), schedule));
    print_status(&scheduler);

    tokio::select! {
        _ = Arc::clone(&scheduler).start() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("interrupt received, stopping scheduler");
        }
    }
    Ok(())
}

fn cmd_schedule_status(config: AppConfig) -> Result<()> {
    let schedule = config.schedule.clone();
    let scheduler = Scheduler::new(Arc::new(Pipeline::new(config)), schedule);
    print_status(&scheduler);
    Ok(())
}

fn print_status(scheduler: &Scheduler) {
    let status = scheduler.status();
    println!();
    match status.active {
        Some(kind) => println!("  State:            running ({kind})"),
        None => println!("  State:            idle"),
    }
    match &status.last_run {
        Some(last) => println!(
            "  Last run:         {} at {} ({})",
            last.kind,
            last.finished_at,
            if last.succeeded { "ok" } else { "failed" }
        ),
        None => println!("  Last run:         none in this process"),
    }
    println!("  Next full:        {}", status.next_full);
    println!("  Next incremental: {}", status.next_incremental);
    println!("  Next maintenance: {}", status.next_maintenance);
    println!();
}

fn print_summary(summary: &RunSummary) {
    let e = &summary.errors;
    println!();
    println!("  {} run finished ({})", summary.kind, summary.run_id);
    println!("  Locations:   {}", summary.locations);
    println!("  Candidates:  {}", summary.candidates);
    println!(
        "  Canonical:   {} ({} duplicates, {} dropped)",
        summary.canonical, summary.duplicates, summary.dropped
    );
    println!(
        "  Valid:       {} ({} invalid, {} with warnings)",
        summary.valid, summary.invalid, summary.warned
    );
    println!("  Created:     {}", summary.created);
    println!("  Updated:     {}", summary.updated);
    println!("  Errors:");
    println!("    source:      {}", e.source_failures);
    println!("    extraction:  {}", e.extraction_failures);
    println!("    field:       {}", e.field_defects);
    println!("    record:      {}", e.invalid_records);
    println!("    persistence: {}", e.persistence_failures);
    println!("    artifacts:   {}", e.artifact_failures);
    println!("  Time:        {:.1}s", summary.elapsed_ms as f64 / 1000.0);
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("static template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn clear(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn location_started(&self, cell: &GridCell, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Collecting [{current}/{total}] {cell}"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
