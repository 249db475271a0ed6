use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use spacetool_core::config::{Credentials, ToolConfig, load_config};
use spacetool_core::confluence::{ConfluenceClient, ConfluenceClientConfig};
use spacetool_core::extract::ContentExtractor;
use spacetool_core::ingest::IngestOptions;
use spacetool_core::orchestrate::{
    CopyOptions, RunReport, UnitOutcome, UnitStatus, ensure_no_failures, preview_keys, run_copy,
    run_docs_root, run_ingest,
};
use spacetool_core::replicate::ReplicationOptions;
use spacetool_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, init_layout, normalize_for_display,
    resolve_paths,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "spacetool",
    version,
    about = "Provision per-unit spaces in a wiki content store and import local documents"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(long, global = true, help = "Print the run report as JSON")]
    json: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
    json: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
            json: cli.json,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create .spacetool/ and a config template")]
    Init(InitArgs),
    #[command(about = "Print the space key derived for each unit name")]
    Key(KeyArgs),
    #[command(about = "Create missing unit spaces and copy the source space into them")]
    Copy(UnitArgs),
    #[command(about = "Import each unit's local documents into its space")]
    Ingest(UnitArgs),
    #[command(
        name = "docs-root",
        about = "Ensure every unit space has its documentation root page"
    )]
    DocsRoot(UnitArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

#[derive(Debug, Args)]
struct KeyArgs {
    #[arg(value_name = "NAME", help = "Unit names (defaults to the configured units)")]
    names: Vec<String>,
}

#[derive(Debug, Args)]
struct UnitArgs {
    #[arg(
        long = "unit",
        value_name = "NAME",
        help = "Only process this configured unit (repeatable)"
    )]
    units: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);
    init_logging();

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Key(args)) => run_key(&runtime, args),
        Some(Commands::Copy(args)) => run_copy_command(&runtime, args),
        Some(Commands::Ingest(args)) => run_ingest_command(&runtime, args),
        Some(Commands::DocsRoot(args)) => run_docs_root_command(&runtime, args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(&paths, args.force)?;

    println!("Initialized spacetool runtime layout");
    println!("project_root: {}", normalize_for_display(&paths.project_root));
    println!("state_dir: {}", normalize_for_display(&paths.state_dir));
    println!("config_path: {}", normalize_for_display(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_key(runtime: &RuntimeOptions, args: KeyArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let names = if args.names.is_empty() {
        load_config(&paths.config_path)?.selected_units(&[])?
    } else {
        args.names
    };

    let keys = preview_keys(&names);
    if runtime.json {
        let rows: Vec<serde_json::Value> = keys
            .iter()
            .map(|(name, key)| serde_json::json!({ "unit": name, "space": key }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for (name, key) in &keys {
            println!("{name}: {key}");
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_copy_command(runtime: &RuntimeOptions, args: UnitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let units = config.selected_units(&args.units)?;
    config.validate_for_copy()?;
    let Some(source) = config.source_space() else {
        bail!("[copy].source_space is required for `copy`");
    };
    let mut client = build_client(&config)?;

    let options = CopyOptions {
        source,
        replication: ReplicationOptions {
            page_size: config.page_size(),
            excluded_titles: config.excluded_titles(),
        },
    };
    let report = run_copy(&mut client, &units, &options)?;
    finish(runtime, &paths, &report)
}

fn run_ingest_command(runtime: &RuntimeOptions, args: UnitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let units = config.selected_units(&args.units)?;
    let base_dir = config.validate_for_ingest()?;
    let mut client = build_client(&config)?;

    let options = IngestOptions {
        base_dir,
        documentation_title: config.documentation_title().to_string(),
        documentation_body: config.documentation_body().to_string(),
    };
    let extractor = ContentExtractor::default();
    let report = run_ingest(&mut client, &extractor, &units, &options)?;
    finish(runtime, &paths, &report)
}

fn run_docs_root_command(runtime: &RuntimeOptions, args: UnitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let units = config.selected_units(&args.units)?;
    config.require_base_url()?;
    let mut client = build_client(&config)?;

    let report = run_docs_root(
        &mut client,
        &units,
        config.documentation_title(),
        config.documentation_body(),
    )?;
    finish(runtime, &paths, &report)
}

fn build_client(config: &ToolConfig) -> Result<ConfluenceClient> {
    let credentials = Credentials::from_env()?;
    let client_config = ConfluenceClientConfig::from_config(config, credentials)?;
    ConfluenceClient::new(client_config)
}

fn finish(runtime: &RuntimeOptions, paths: &ResolvedPaths, report: &RunReport) -> Result<()> {
    if runtime.json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("failed to render run report")?
        );
    } else {
        print_report(report);
    }
    print_diagnostics(runtime, paths);
    ensure_no_failures(report)
}

fn print_report(report: &RunReport) {
    println!("{}", report.command);
    println!("units: {}", report.units.len());
    for status in [
        UnitStatus::Copied,
        UnitStatus::Ingested,
        UnitStatus::RootReady,
        UnitStatus::Skipped,
        UnitStatus::Failed,
    ] {
        let count = report.count(status);
        if count > 0 {
            println!("units.{}: {count}", status.as_str());
        }
    }
    println!("request_count: {}", report.request_count);
    for outcome in &report.units {
        println!();
        print_outcome(outcome);
    }
}

fn print_outcome(outcome: &UnitOutcome) {
    println!("unit: {}", outcome.unit);
    println!("space: {}", outcome.space);
    println!("status: {}", outcome.status.as_str());
    if let Some(reason) = &outcome.reason {
        println!("reason: {reason}");
    }
    if let Some(root) = &outcome.documentation_root {
        println!("documentation_root: {}", root.id);
    }
    if let Some(replication) = &outcome.replication {
        println!("pages.discovered: {}", replication.discovered);
        println!("pages.copied: {}", replication.copied);
        for title in &replication.reparented_to_root {
            println!("pages.reparented_to_root: {title}");
        }
        for failure in &replication.failures {
            println!("pages.failed: {} ({})", failure.title, failure.detail);
        }
    }
    if let Some(ingestion) = &outcome.ingestion {
        println!("ingest.status: {}", ingestion.status.as_str());
        if let Some(directory) = &ingestion.directory {
            println!("directory: {}", normalize_for_display(directory));
        }
        if let Some(matched) = ingestion.directory_match {
            println!("directory.match: {}", matched.as_str());
        }
        println!("files.processed: {}", ingestion.files_processed);
        println!("files.unsupported: {}", ingestion.skipped_unsupported);
        println!("pages.created: {}", ingestion.pages_created);
        println!("attachments.uploaded: {}", ingestion.attachments_uploaded);
        for failure in &ingestion.failures {
            println!(
                "files.failed: {} ({})",
                normalize_for_display(&failure.file),
                failure.detail
            );
        }
    }
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        eprintln!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}
