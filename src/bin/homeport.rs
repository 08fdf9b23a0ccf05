use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::{
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use homeport::{
    Catalog, MigrateConfig, Pipeline,
    parse::{CatalogParser, builtin_parsers, detect_all, parse_path},
};

#[derive(Parser, Debug)]
#[command(
    name = "homeport",
    version,
    about = "Convert cloud infrastructure into self-hosted compose stacks"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a catalog and write the deployment files.
    Convert(ConvertArgs),
    /// Print stack and service start order without writing anything.
    Plan(PlanArgs),
    /// List resource kinds with a registered converter.
    Kinds,
    /// Show how confident each parser is about an input file.
    Detect(DetectArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Auto,
    Catalog,
    Terraform,
}

impl Format {
    fn as_str(self) -> &'static str {
        match self {
            Format::Auto => "auto",
            Format::Catalog => "catalog",
            Format::Terraform => "terraform",
        }
    }
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Catalog document or Terraform state file.
    #[arg(long, short)]
    input: PathBuf,
    /// Input format.
    #[arg(long, value_enum, default_value_t = Format::Auto)]
    format: Format,
    /// Config file (JSON or YAML). Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Maximum concurrent conversions.
    #[arg(long)]
    workers: Option<usize>,
    /// Give up after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Emitter name (compose, compose-stacks).
    #[arg(long)]
    emitter: Option<String>,
    /// Output directory.
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Compose project name.
    #[arg(long)]
    project_name: Option<String>,
    /// Skip MIGRATION.md.
    #[arg(long)]
    no_report: bool,
    /// Run everything but write no files.
    #[arg(long)]
    dry_run: bool,
    /// Print a machine-readable summary on stdout.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct PlanArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Print the plan as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct DetectArgs {
    #[arg(long, short)]
    input: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Convert(args) => handle_convert(args).await,
        Commands::Plan(args) => handle_plan(args).await,
        Commands::Kinds => handle_kinds(),
        Commands::Detect(args) => handle_detect(args),
    }
}

/// Logs go to stderr so stdout stays machine readable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_config(args: &InputArgs) -> Result<MigrateConfig> {
    let mut config = match &args.config {
        Some(path) => MigrateConfig::load_from_file(path)?,
        None => MigrateConfig::default(),
    };
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    if args.timeout_secs.is_some() {
        config.timeout_secs = args.timeout_secs;
    }
    config.normalized()
}

fn load_catalog(args: &InputArgs) -> Result<Catalog> {
    let parsers = builtin_parsers();
    let catalog = parse_path(&parsers, &args.input, args.format.as_str())
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    info!(
        provider = %catalog.provider,
        resources = catalog.len(),
        "catalog loaded"
    );
    Ok(catalog)
}

fn pipeline_for(config: &MigrateConfig) -> Pipeline {
    let pipeline = Pipeline::builtin();
    match config.workers {
        Some(workers) => pipeline.with_workers(workers),
        None => pipeline,
    }
}

async fn handle_convert(args: ConvertArgs) -> Result<()> {
    let mut config = load_config(&args.input)?;
    if let Some(emitter) = args.emitter {
        config.emitter = emitter;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if let Some(project) = args.project_name {
        config.project_name = project;
    }
    if args.no_report {
        config.include_report = false;
    }
    let config = config.normalized()?;
    let catalog = load_catalog(&args.input)?;

    let output = pipeline_for(&config)
        .run(
            &config.run_context(),
            &catalog,
            &config.emitter,
            &config.emit_config(),
        )
        .await
        .context("conversion failed")?;

    if !args.dry_run {
        output
            .artifacts
            .write_to(&config.output_dir)
            .with_context(|| format!("failed to write {}", config.output_dir.display()))?;
        info!(dir = %config.output_dir.display(), files = output.artifacts.len(), "artifacts written");
    }

    let mut stdout = io::stdout().lock();
    if args.json {
        let summary = json!({
            "emitter": config.emitter,
            "output_dir": config.output_dir,
            "dry_run": args.dry_run,
            "digest": output.artifacts.digest(),
            "files": output.artifacts.paths().collect::<Vec<_>>(),
            "metadata": output.result.metadata,
            "deployment_order": output.plan.services,
            "passthrough": output.result.passthrough,
            "skipped": output.result.skipped,
            "warnings": output.artifacts.warnings,
            "manual_steps": output.artifacts.manual_steps,
        });
        writeln!(stdout, "{}", serde_json::to_string_pretty(&summary)?)?;
        return Ok(());
    }

    let verb = if args.dry_run { "would write" } else { "wrote" };
    writeln!(
        stdout,
        "{verb} {} files to {} (digest {})",
        output.artifacts.len(),
        config.output_dir.display(),
        output.artifacts.digest()
    )?;
    for path in output.artifacts.paths() {
        writeln!(stdout, "  {path}")?;
    }
    let meta = &output.result.metadata;
    writeln!(
        stdout,
        "{} resources: {} converted, {} passed through, {} skipped",
        meta.resource_count, meta.converted_count, meta.passthrough_count, meta.skipped_count
    )?;
    for warning in &output.artifacts.warnings {
        writeln!(stdout, "warning: {warning}")?;
    }
    Ok(())
}

async fn handle_plan(args: PlanArgs) -> Result<()> {
    let config = load_config(&args.input)?;
    let catalog = load_catalog(&args.input)?;
    let pipeline = pipeline_for(&config);
    let result = pipeline
        .consolidate(&config.run_context(), &catalog)
        .await
        .context("conversion failed")?;
    let plan = homeport::ordering::plan_deployment(&result).context("ordering failed")?;

    let mut stdout = io::stdout().lock();
    if args.json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&plan)?)?;
        return Ok(());
    }
    for (index, stack) in plan.stacks.iter().enumerate() {
        writeln!(stdout, "{}. {}", index + 1, stack.stack)?;
        for service in &stack.services {
            writeln!(stdout, "   - {service}")?;
        }
    }
    for entry in &result.passthrough {
        writeln!(stdout, "passthrough: {} ({})", entry.resource_id, entry.kind)?;
    }
    for entry in &result.skipped {
        writeln!(stdout, "skipped: {} ({}): {}", entry.resource_id, entry.kind, entry.error)?;
    }
    Ok(())
}

fn handle_kinds() -> Result<()> {
    let registry = homeport::ConverterRegistry::builtin();
    let mut stdout = io::stdout().lock();
    for kind in registry.kinds() {
        let converter = registry.get(kind)?;
        let note = if converter.containerizable() {
            ""
        } else {
            " (passthrough)"
        };
        writeln!(stdout, "{kind}{note}")?;
    }
    Ok(())
}

fn handle_detect(args: DetectArgs) -> Result<()> {
    let source = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let parsers: Vec<Arc<dyn CatalogParser>> = builtin_parsers();
    let mut stdout = io::stdout().lock();
    for (name, detection) in detect_all(&parsers, &source) {
        writeln!(
            stdout,
            "{name}: {} (confidence {:.2})",
            if detection.matched { "match" } else { "no match" },
            detection.confidence
        )?;
    }
    Ok(())
}
