//! stackctl CLI entrypoint.
//!
//! This is the main entrypoint for the stackctl command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use stackctl::cli::{Cli, Commands, LogFormat, OutputFormatter, Target};
use stackctl::config::{
    ConfigParser, ConfigValidator, ProjectConfig, YamlConfigProvider, find_config_file,
};
use stackctl::error::Result;
use stackctl::planner::{DEFAULT_TIMEOUT, DiffOptions, Reporter};
use stackctl::prompt::{AutoApprove, CancellationToken, ConfirmationPrompter, StdinPrompter};
use stackctl::provider::{AwsProvisioningClient, ProvisioningClient};
use stackctl::resolve::{ParameterResolver, StackResolver};
use stackctl::runner::StackRunner;
use stackctl::template::FileTemplateReader;

use clap::Parser;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            if e.is_retryable() {
                eprintln!("Error: {e} (transient, the command can be retried)");
            } else {
                eprintln!("Error: {e}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool, format: LogFormat) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point. Returns whether every stack succeeded.
async fn run(cli: Cli) -> Result<bool> {
    let formatter = Arc::new(OutputFormatter::new(cli.output));
    let config_file = resolve_config_path(cli.config.as_ref())?;
    let base_dir = config_file
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let config = load_config(&config_file, &base_dir)?;

    let cancel = CancellationToken::new();
    watch_interrupt(cancel.clone());

    match cli.command {
        Commands::List => {
            emit(&formatter.format_list(&config))?;
            Ok(true)
        }
        Commands::Validate { target } => {
            let result = ConfigValidator::new().check(&config);
            emit(&formatter.format_validation(&result))?;
            if !result.is_valid() {
                return Ok(false);
            }

            let runner = build_runner(config, &base_dir, cli.yes, &formatter, cancel, DEFAULT_TIMEOUT)?;
            let report = runner.validate(&target.context, stack(&target)).await?;
            emit(&formatter.format_report("Validate", &report))?;
            Ok(report.is_success())
        }
        Commands::Deploy { target, timeout } => {
            let timeout = Duration::from_secs(timeout);
            let runner = build_runner(config, &base_dir, cli.yes, &formatter, cancel, timeout)?;
            let report = runner.deploy(&target.context, stack(&target)).await?;
            emit(&formatter.format_report("Deploy", &report))?;
            Ok(report.is_success())
        }
        Commands::Delete { target, timeout } => {
            let timeout = Duration::from_secs(timeout);
            let runner = build_runner(config, &base_dir, cli.yes, &formatter, cancel, timeout)?;
            let report = runner.delete(&target.context, stack(&target)).await?;
            emit(&formatter.format_report("Delete", &report))?;
            Ok(report.is_success())
        }
        Commands::Diff {
            target,
            template,
            parameters,
            tags,
        } => {
            let options = DiffOptions {
                scope: Commands::diff_scope(template, parameters, tags),
                keep_change_set: false,
            };
            let runner = build_runner(config, &base_dir, cli.yes, &formatter, cancel, DEFAULT_TIMEOUT)?;
            let report = runner.diff(&target.context, stack(&target), options).await?;
            emit(&formatter.format_diff_report(&report))?;
            Ok(report.is_success())
        }
        Commands::Describe { target } => {
            let runner = build_runner(config, &base_dir, cli.yes, &formatter, cancel, DEFAULT_TIMEOUT)?;
            let described = runner.describe(&target.context, stack(&target)).await?;
            emit(&formatter.format_describe(&described))?;
            Ok(true)
        }
    }
}

fn stack(target: &Target) -> Option<&str> {
    target.stack.as_deref()
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads `.env` and the configuration file.
fn load_config(config_file: &Path, base_dir: &Path) -> Result<ProjectConfig> {
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(base_dir);
    parser.load_dotenv()?;
    parser.load_with_env(config_file)
}

/// Validates the configuration and wires the collaborators together.
fn build_runner(
    config: ProjectConfig,
    base_dir: &Path,
    yes: bool,
    formatter: &Arc<OutputFormatter>,
    cancel: CancellationToken,
    timeout: Duration,
) -> Result<StackRunner> {
    ConfigValidator::new().validate(&config)?;

    let client: Arc<dyn ProvisioningClient> = Arc::new(AwsProvisioningClient::default());
    let prompter: Arc<dyn ConfirmationPrompter> = if yes {
        Arc::new(AutoApprove)
    } else {
        Arc::new(StdinPrompter::new())
    };

    let resolver = StackResolver::new(
        Arc::new(YamlConfigProvider::new(config, base_dir)),
        Arc::new(FileTemplateReader::new()),
        ParameterResolver::new(Arc::clone(&client)),
    );

    let reporter: Arc<dyn Reporter> = Arc::<OutputFormatter>::clone(formatter);

    Ok(StackRunner::new(
        resolver, client, prompter, reporter, cancel, timeout,
    ))
}

/// Cancels the run on Ctrl-C.
///
/// A mutating call already issued keeps running on the service; the run
/// stops before the next stack.
fn watch_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            cancel.cancel("interrupted by user");
        }
    });
}

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
