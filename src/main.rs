use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gitlab_cloner::config::{self, CliOverrides, CloneMethod, RunOptions};
use gitlab_cloner::error::{ClonerError, EXIT_EXECUTION_ERROR};
use gitlab_cloner::{Config, Reporter, SyncEngine};

#[derive(Parser)]
#[command(name = "gitlab-cloner")]
#[command(about = "Clone or update every repository of a GitLab namespace")]
#[command(version)]
#[command(after_help = "Examples:
  gitlab-cloner -n mygroup
  gitlab-cloner -n mygroup -p ~/src --disable-root
  gitlab-cloner -u https://gitlab.example.com -n platform -e legacy --dry-run

The token is read from GITLAB_TOKEN when --token is not given.")]
struct Cli {
    /// Base URL of the GitLab instance [default: https://gitlab.com]
    #[arg(short, long)]
    url: Option<String>,

    /// GitLab API token (prefer the GITLAB_TOKEN environment variable)
    #[arg(short, long)]
    token: Option<String>,

    /// Namespace (group path) to clone
    #[arg(short, long)]
    namespace: String,

    /// Destination directory [default: current directory]
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// Do not create the root namespace folder in the destination
    #[arg(long)]
    disable_root: bool,

    /// List the repositories without cloning or fetching
    #[arg(short, long)]
    dry_run: bool,

    /// Exclude subgroups and projects matching this pattern
    #[arg(short, long)]
    exclude: Option<String>,

    /// Protocol used for clone URLs
    #[arg(long, value_enum)]
    clone_method: Option<CloneMethod>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            let mut reporter = Reporter::stdio(use_color(cli.no_color, true));
            reporter.error(format!("error: {:#}", e));
            return exit(EXIT_EXECUTION_ERROR);
        }
    };

    let mut reporter = Reporter::stdio(use_color(cli.no_color, config.logging.color));

    if let Err(e) = init_logging(cli.verbose, &config.logging.level) {
        reporter.error(format!("error: {:#}", e));
        return exit(EXIT_EXECUTION_ERROR);
    }
    info!("Starting gitlab-cloner v{}", env!("CARGO_PKG_VERSION"));

    let code = match run(cli, &config, &mut reporter).await {
        Ok(()) => reporter.exit_code(),
        Err(e) => {
            reporter.error(format!("error: {:#}", e));
            e.downcast_ref::<ClonerError>()
                .map(ClonerError::exit_code)
                .unwrap_or(EXIT_EXECUTION_ERROR)
        }
    };

    exit(code)
}

async fn run(cli: Cli, config: &Config, reporter: &mut Reporter) -> Result<()> {
    let overrides = CliOverrides {
        url: cli.url,
        token: cli.token,
        namespace: cli.namespace,
        path: cli.path,
        disable_root: cli.disable_root,
        dry_run: cli.dry_run,
        exclude: cli.exclude,
        clone_method: cli.clone_method,
    };

    let options = RunOptions::resolve(overrides, config, config::token_from_env())?;
    debug!("Resolved options: {:?}", options);

    let dry_run = options.dry_run;
    let namespace = options.namespace.clone();
    let engine = SyncEngine::from_options(options)?;

    engine
        .run(reporter)
        .await
        .with_context(|| format!("failed to mirror namespace '{}'", namespace))?;

    reporter.finish(dry_run);
    Ok(())
}

/// Diagnostics go to stderr so they never mix with progress lines.
/// RUST_LOG wins over --verbose, which wins over the configured level.
fn init_logging(verbose: bool, configured_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::new("debug"),
        Err(_) => EnvFilter::try_new(configured_level)
            .with_context(|| format!("Invalid log level: {}", configured_level))?,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(path),
        None => Config::load_or_default(),
    }
}

fn use_color(no_color_flag: bool, configured: bool) -> bool {
    !no_color_flag
        && configured
        && std::env::var_os("NO_COLOR").is_none()
        && std::io::stdout().is_terminal()
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
