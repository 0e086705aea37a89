use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use photoseq_core::{
    app_paths, generate_plan, load_config, load_config_from, run, save_config_to, AppConfig,
    ExifTimestampResolver, RenameOptions, RenamePlan, RunReport,
};
use std::path::PathBuf;
use std::process::ExitCode;

const EXIT_OK: u8 = 0;
const EXIT_FATAL: u8 = 1;
const EXIT_PARTIAL: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "photoseq")]
#[command(about = "Rename images with a sequence number in capture-time order")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Rename(RenameArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    /// Write a config file with default values if none exists.
    Init,
}

#[derive(Debug, Args)]
struct RenameArgs {
    /// Rename images in this directory.
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,
    /// The resulting files will have this prefix.
    #[arg(short = 's', long)]
    prefix: Option<String>,
    /// The number of digits to use.
    #[arg(short = 'd', long)]
    digits: Option<usize>,
    #[arg(short = 'v', long, default_value_t = false)]
    verbose: bool,
    /// Don't rename sidecar (.xmp) files.
    #[arg(long, alias = "skip-xmp", default_value_t = false)]
    skip_sidecar: bool,
    /// Don't alter the case of the extension.
    #[arg(long, default_value_t = false)]
    keep_case: bool,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Exit non-zero when files were skipped for lack of a capture time.
    #[arg(long, default_value_t = false)]
    strict: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = matches!(&cli.command, Commands::Rename(args) if args.verbose);
    init_logger(verbose);

    let outcome = match cli.command {
        Commands::Rename(args) => cmd_rename(args),
        Commands::Config(config) => match config.action {
            ConfigAction::Show => cmd_config_show(),
            ConfigAction::Init => cmd_config_init(),
        },
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn init_logger(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn cmd_rename(args: RenameArgs) -> Result<ExitCode> {
    let config = match &args.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let options = merge_options(&config, &args)?;
    let strict = args.strict || config.strict;

    let input = match args.input {
        Some(input) => input,
        None => {
            info!("No input directory specified, using current working directory.");
            PathBuf::from(".")
        }
    };
    if args.digits.is_none() {
        info!("Number of digits not specified, using {}.", options.digits);
    }

    if args.dry_run {
        let plan = generate_plan(&input, &options, &ExifTimestampResolver)?;
        match args.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
            OutputFormat::Table => print_plan(&plan),
        }
        eprintln!("dry-run: no files were changed");
        return Ok(ExitCode::from(plan_exit_status(&plan, strict)));
    }

    eprintln!("Renaming files...");
    let report = run(&input, &options)?;
    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_report(&report),
    }

    Ok(ExitCode::from(run_exit_status(&report, strict)))
}

fn merge_options(config: &AppConfig, args: &RenameArgs) -> Result<RenameOptions> {
    let mut options = config.rename_options();
    if let Some(prefix) = &args.prefix {
        options.prefix = prefix.clone();
    }
    if let Some(digits) = args.digits {
        options.digits = digits;
    }
    if args.skip_sidecar {
        options.sidecars = false;
    }
    if args.keep_case {
        options.keep_case = true;
    }
    Ok(options)
}

/// A dry run changes nothing, so only skipped files under `strict` count.
fn plan_exit_status(plan: &RenamePlan, strict: bool) -> u8 {
    if strict && !plan.skipped.is_empty() {
        EXIT_PARTIAL
    } else {
        EXIT_OK
    }
}

fn run_exit_status(report: &RunReport, strict: bool) -> u8 {
    if !report.is_clean() || (strict && report.has_skipped()) {
        EXIT_PARTIAL
    } else {
        EXIT_OK
    }
}

fn cmd_config_show() -> Result<ExitCode> {
    let config = load_config()?;
    let paths = app_paths()?;
    println!("config file: {}", paths.config_path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_config_init() -> Result<ExitCode> {
    let paths = app_paths()?;
    if paths.config_path.exists() {
        eprintln!("config file already exists: {}", paths.config_path.display());
        return Ok(ExitCode::SUCCESS);
    }
    save_config_to(&paths.config_path, &AppConfig::default())?;
    println!("wrote {}", paths.config_path.display());
    Ok(ExitCode::SUCCESS)
}

fn print_plan(plan: &RenamePlan) {
    println!("source -> target (capture time)");
    for entry in &plan.entries {
        println!(
            "{} -> {} ({})",
            entry.source.display(),
            entry.target.display(),
            entry.key.moment
        );
        if let Some(sidecar) = &entry.sidecar {
            println!("  {} -> {}", sidecar.source.display(), sidecar.target.display());
        }
    }
    for skipped in &plan.skipped {
        println!("skip {} ({})", skipped.path.display(), skipped.reason);
    }

    println!(
        "\nsummary: scanned={} images={} skipped={} planned={} unchanged={}",
        plan.stats.scanned,
        plan.stats.candidates,
        plan.stats.skipped,
        plan.stats.planned,
        plan.stats.unchanged
    );
}

fn print_report(report: &RunReport) {
    let result = &report.result;
    for failure in &result.failures {
        println!(
            "failed {} -> {}: {}",
            failure.from.display(),
            failure.to.display(),
            failure.message
        );
    }
    for stranded in &result.stranded {
        println!(
            "stranded {} (now {})",
            stranded.original.display(),
            stranded.temp.display()
        );
    }

    println!(
        "summary: renamed={} unchanged={} staged={} sidecars={} skipped={} failed={} stranded={}",
        result.renamed,
        result.unchanged,
        result.staged,
        result.sidecars_renamed,
        report.plan.stats.skipped,
        result.failures.len(),
        result.stranded.len()
    );
}
