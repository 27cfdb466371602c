//! execbox CLI
//!
//! A command-line tool and HTTP service for running code in Docker sandboxes.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use execbox::{
    Config, DockerRuntime, EXAMPLE_CONFIG, ExecuteError, ExecutionRequest, Language,
    PendingExecution, Runner, SandboxLimits, TIMEOUT_EXIT_CODE,
};
use tracing::{Level, debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::server::{AppState, DEFAULT_BIND_ADDR, DEFAULT_STORE_CAPACITY, MemoryStore};

mod server;

/// Exit code when the program was killed at the wall-clock deadline
const EXIT_TIMED_OUT: i32 = 124;

#[derive(Parser)]
#[command(name = "execbox")]
#[command(about = "A tool for running untrusted code in Docker sandboxes")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: execbox.toml)
        #[arg(short, long, default_value = "execbox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a program once in a sandbox
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language (python, javascript, go, ruby, java)
        #[arg(short, long)]
        language: String,

        /// File fed to the program as standard input
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Print the execution record as JSON instead of the program output
        #[arg(long)]
        json: bool,
    },

    /// Pull sandbox images
    Pull {
        /// Only pull the image for this language
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Serve the HTTP API
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = DEFAULT_BIND_ADDR)]
        bind: SocketAddr,

        /// Number of finished executions kept for lookup
        #[arg(long, default_value_t = DEFAULT_STORE_CAPACITY)]
        max_records: usize,
    },

    /// List available languages
    Languages,

    /// Show effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            source,
            language,
            input,
            json,
        } => run_execute(config, &source, language, input.as_deref(), json).await,
        Commands::Pull { language } => pull_images(&config, language.as_deref()).await,
        Commands::Serve { bind, max_records } => {
            let runner = Runner::connect(config)
                .await
                .context("failed to connect to Docker")?;
            let store = MemoryStore::with_capacity(max_records);
            let state = AppState::new(runner, Arc::new(store));
            server::serve(state, bind).await
        }
        Commands::Languages => {
            list_languages();
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn run_execute(
    config: Config,
    source: &Path,
    language: String,
    input: Option<&Path>,
    json: bool,
) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let mut request = ExecutionRequest::new(code, language);
    if let Some(input_path) = input {
        let input = tokio::fs::read_to_string(input_path)
            .await
            .context("failed to read input file")?;
        request = request.with_input(input);
    }

    // Reject bad requests before touching Docker
    let pending = match PendingExecution::accept(request) {
        Ok(pending) => pending,
        Err(e) => exit_with(ExecuteError::from(e)),
    };

    info!(id = %pending.id, language = %pending.language, "running program");

    let runner = Runner::connect(config)
        .await
        .context("failed to connect to Docker")?;
    let execution = match runner.execute_pending(pending).await {
        Ok(execution) => execution,
        Err(e) => exit_with(e),
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&execution).context("failed to encode record")?
        );
    } else {
        print!("{}", execution.output);
        if !execution.error.is_empty() {
            eprint!("{}", execution.error);
        }
    }

    // Log execution info via tracing (stderr), keeping stdout clean for piping
    info!(
        id = %execution.id,
        status = ?execution.status,
        duration = format_args!("{:.3}s", execution.duration),
        exit_code = execution.exit_code,
        "execution result"
    );

    match execution.exit_code {
        0 => Ok(()),
        TIMEOUT_EXIT_CODE => std::process::exit(EXIT_TIMED_OUT),
        code => std::process::exit(i32::try_from(code).unwrap_or(1)),
    }
}

/// Report an execution error and exit with a code distinct per error kind
fn exit_with(e: ExecuteError) -> ! {
    error!("{e}");
    let code = match e {
        ExecuteError::Validation(_) => 2,
        ExecuteError::Staging(_) => 3,
        ExecuteError::Sandbox(_) => 4,
    };
    std::process::exit(code)
}

async fn pull_images(config: &Config, language: Option<&str>) -> Result<()> {
    let docker = DockerRuntime::connect(config).context("failed to connect to Docker")?;

    match language {
        Some(tag) => {
            let language: Language = tag.parse()?;
            docker
                .pull_image(language.profile().image)
                .await
                .context("failed to pull image")?;
        }
        None => docker
            .prefetch_images()
            .await
            .context("failed to pull images")?,
    }

    println!("Images ready");
    Ok(())
}

fn list_languages() {
    println!("Available languages:\n");

    for language in Language::ALL {
        let profile = language.profile();
        println!(
            "  {:<12} {:<20} {}",
            language.as_str(),
            profile.image,
            profile.entry_file
        );
    }
}

fn show_config(config: &Config) {
    let limits = SandboxLimits::default();
    println!("Sandbox limits (fixed):");
    println!("  Wall time limit: {:?}", limits.wall_time);
    println!("  Memory limit: {} MiB", limits.memory_bytes / (1024 * 1024));
    println!("  CPU share: {} core", limits.cpu_share());
    println!("  Max processes: {}", limits.pids);
    println!("  Network: disabled");
    println!();
    match config.docker_socket {
        Some(ref socket) => println!("Docker socket: {}", socket.display()),
        None => println!("Docker socket: (local default)"),
    }
    println!("Docker API timeout: {}s", config.docker_timeout);
    println!("Workspace root: {}", config.workspace_root().display());
    println!("Image policy: {:?}", config.image_policy);
    println!();
    println!("Languages configured: {}", Language::ALL.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
