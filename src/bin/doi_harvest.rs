use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use doi_harvest::app::{App, CancelFlag, RunOptions};
use doi_harvest::catalog::{Catalog, default_output_path};
use doi_harvest::config::{ConfigLoader, ResolvedConfig};
use doi_harvest::domain::{AcquisitionStatus, Doi};
use doi_harvest::error::HarvestError;
use doi_harvest::filename::canonical_filename;
use doi_harvest::output::{ConsoleOutput, JsonOutput, OutputMode};
use doi_harvest::store::Store;

#[derive(Parser)]
#[command(name = "doi-harvest")]
#[command(about = "Download research paper PDFs for a DOI catalog, resumably")]
#[command(version, author)]
struct Cli {
    /// Print machine-readable JSON instead of progress lines
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Config file (defaults to ./doi-harvest.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Acquire PDFs for every row of a CSV catalog and write an updated catalog")]
    Fetch(FetchArgs),
    #[command(about = "Acquire the PDF for a single DOI")]
    Get(GetArgs),
    #[command(about = "Print the canonical filename for a DOI")]
    Filename(FilenameArgs),
    #[command(about = "Rename files saved under the old '/'->'_' naming to canonical names")]
    Migrate(MigrateArgs),
}

#[derive(Args, Clone)]
struct FetchArgs {
    /// CSV catalog with a DOI column
    catalog: PathBuf,

    /// Updated catalog path (default: <catalog stem>_Updated.csv)
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long)]
    doi_column: Option<String>,

    #[arg(long)]
    status_column: Option<String>,

    /// Rows processed in parallel
    #[arg(long)]
    jobs: Option<usize>,

    #[command(flatten)]
    acquisition: AcquisitionArgs,
}

#[derive(Args, Clone)]
struct GetArgs {
    doi: String,

    #[command(flatten)]
    acquisition: AcquisitionArgs,
}

#[derive(Args, Clone)]
struct FilenameArgs {
    doi: String,
}

#[derive(Args, Clone)]
struct MigrateArgs {
    catalog: PathBuf,

    #[arg(long)]
    save_dir: Option<PathBuf>,

    #[arg(long)]
    doi_column: Option<String>,
}

#[derive(Args, Clone, Default)]
struct AcquisitionArgs {
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Seconds before the external tool is killed
    #[arg(long)]
    tool_timeout: Option<u64>,

    /// Seconds allowed per HTTP request in direct resolution
    #[arg(long)]
    http_timeout: Option<u64>,

    /// Program used by the external-tool strategy
    #[arg(long)]
    tool_program: Option<PathBuf>,

    #[arg(long)]
    no_external: bool,

    #[arg(long)]
    no_direct: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<HarvestError>() {
                return ExitCode::from(map_exit_code(err));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::InvalidDoi(_) => 2,
        HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_)
        | HarvestError::ConfigValue(_)
        | HarvestError::MissingDoiColumn(_) => 2,
        HarvestError::CatalogRead { .. } | HarvestError::CatalogWrite { .. } => 3,
        HarvestError::SaveDirUnwritable { .. } | HarvestError::Filesystem(_) => 3,
        HarvestError::HttpClient(_) => 4,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, config, output_mode),
        Commands::Get(args) => run_get(args, config, output_mode),
        Commands::Filename(args) => {
            println!("{}", canonical_filename(&args.doi));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Migrate(args) => run_migrate(args, config, output_mode),
    }
}

fn run_fetch(
    args: FetchArgs,
    mut config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<ExitCode> {
    apply_acquisition_overrides(&mut config, &args.acquisition)?;
    if let Some(column) = args.doi_column {
        config.doi_column = column;
    }
    if let Some(column) = args.status_column {
        config.status_column = column;
    }
    if let Some(jobs) = args.jobs {
        if jobs == 0 {
            return Err(HarvestError::ConfigValue("--jobs must be at least 1".to_string()).into());
        }
        config.jobs = jobs;
    }

    let catalog = Catalog::load(&args.catalog)?;
    let output_path = args
        .output
        .unwrap_or_else(|| default_output_path(&args.catalog));
    let app = App::from_config(&config)?;
    let cancel = CancelFlag::new();
    install_signal_handlers(&cancel);

    let options = RunOptions::from(&config);
    let result = match output_mode {
        OutputMode::Interactive => app.run(&catalog, &options, &cancel, &ConsoleOutput)?,
        OutputMode::NonInteractive => app.run(&catalog, &options, &cancel, &JsonOutput)?,
    };
    result.catalog.save(&output_path)?;

    match output_mode {
        OutputMode::Interactive => {
            ConsoleOutput::print_run_summary(&result);
            println!("Updated catalog saved to {}", output_path.display());
        }
        OutputMode::NonInteractive => JsonOutput::print_run(&result).into_diagnostic()?,
    }

    if cancel.is_cancelled() {
        return Ok(ExitCode::from(130));
    }
    Ok(ExitCode::SUCCESS)
}

fn run_get(
    args: GetArgs,
    mut config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<ExitCode> {
    apply_acquisition_overrides(&mut config, &args.acquisition)?;
    let doi: Doi = args.doi.parse()?;
    let app = App::from_config(&config)?;

    let record = match output_mode {
        OutputMode::Interactive => {
            let record = app.acquire_one(&doi, &ConsoleOutput)?;
            ConsoleOutput::print_record(&record);
            record
        }
        OutputMode::NonInteractive => {
            let record = app.acquire_one(&doi, &JsonOutput)?;
            JsonOutput::print_record(&record).into_diagnostic()?;
            record
        }
    };

    if record.status == AcquisitionStatus::Success {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(5))
    }
}

fn run_migrate(
    args: MigrateArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<ExitCode> {
    let save_dir = args.save_dir.unwrap_or(config.save_dir);
    let column = args.doi_column.unwrap_or(config.doi_column);
    let catalog = Catalog::load(&args.catalog)?;
    let dois = catalog
        .dois(&column)?
        .into_iter()
        .filter_map(Result::ok)
        .collect::<Vec<_>>();

    let store = Store::new(save_dir)?;
    let report = store.migrate_legacy(&dois)?;
    match output_mode {
        OutputMode::Interactive => ConsoleOutput::print_migration(&report),
        OutputMode::NonInteractive => JsonOutput::print_migration(&report).into_diagnostic()?,
    }
    Ok(ExitCode::SUCCESS)
}

fn apply_acquisition_overrides(
    config: &mut ResolvedConfig,
    args: &AcquisitionArgs,
) -> Result<(), HarvestError> {
    if let Some(dir) = &args.save_dir {
        config.save_dir = dir.clone();
    }
    if let Some(secs) = args.tool_timeout {
        config.external_tool.timeout = positive_timeout("--tool-timeout", secs)?;
    }
    if let Some(secs) = args.http_timeout {
        config.direct.timeout = positive_timeout("--http-timeout", secs)?;
    }
    if let Some(program) = &args.tool_program {
        config.external_tool.command.program = program.clone();
    }
    if args.no_external {
        config.external_tool.enabled = false;
    }
    if args.no_direct {
        config.direct.enabled = false;
    }
    Ok(())
}

fn positive_timeout(flag: &str, secs: u64) -> Result<Duration, HarvestError> {
    if secs == 0 {
        return Err(HarvestError::ConfigValue(format!(
            "{flag} must be greater than zero"
        )));
    }
    Ok(Duration::from_secs(secs))
}

// First signal asks the batch to stop after the rows in flight; a second one exits.
fn install_signal_handlers(cancel: &CancelFlag) {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::flag;

    for signal in [SIGINT, SIGTERM] {
        let registered = flag::register_conditional_shutdown(signal, 130, cancel.as_atomic())
            .and_then(|_| flag::register(signal, cancel.as_atomic()));
        if let Err(err) = registered {
            warn!(signal, error = %err, "failed to install signal handler");
        }
    }
}
