// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Panopticon Launcher
//!
//! Asks for the keys and backends the Panopticon app needs, then starts it
//! directly or in Docker by replacing this process.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

use panopticon_launcher::config::{env, names, suggest, Defaults, LaunchMode};
use panopticon_launcher::docker::DockerRuntime;
use panopticon_launcher::launcher::{LaunchOptions, Launcher, LiveOllamaCheck};
use panopticon_launcher::ollama::{OllamaClient, ServiceProbe};
use panopticon_launcher::preflight::tool_available;
use panopticon_launcher::prompt::TerminalPrompter;
use panopticon_launcher::resolve::EnvSnapshot;
use panopticon_launcher::Result;

/// Panopticon launcher - resolve keys and backends, then start the app
#[derive(Parser, Debug)]
#[command(name = "panopticon-launch")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Interactive launcher for the Panopticon web app", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// How to start the app
    #[arg(short, long, value_enum, default_value_t = LaunchMode::Docker, global = true)]
    mode: LaunchMode,

    /// Preset values file (JSON format)
    #[arg(short, long, default_value = names::DEFAULTS_FILE, global = true)]
    config: PathBuf,

    /// Directory containing app.py (and the Dockerfile)
    #[arg(short, long, default_value = ".", global = true)]
    workdir: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve settings and start the app (default)
    Launch {
        /// Reuse the existing image instead of running docker build
        #[arg(long)]
        skip_build: bool,
    },

    /// Show container and Ollama status
    Status,

    /// Stop the app container and the companion Ollama container
    Stop,

    /// Preset values management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the preset values in effect (keys masked)
    Show,

    /// Write an empty preset file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = names::DEFAULTS_FILE)]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Launch { skip_build }) => run_launch(&cli.config, cli.mode, cli.workdir, skip_build).await,
        Some(Commands::Status) => run_status().await,
        Some(Commands::Stop) => run_stop(),
        Some(Commands::Config { action }) => run_config_command(action, &cli.config),
        None => run_launch(&cli.config, cli.mode, cli.workdir, false).await,
    }
}

/// Run the launch pipeline; on success this process is replaced
async fn run_launch(config: &Path, mode: LaunchMode, workdir: PathBuf, skip_build: bool) -> Result<()> {
    info!("Panopticon launcher ({:?} mode)", mode);

    let defaults = Defaults::load(config)?;
    let env: EnvSnapshot = std::env::vars().collect();
    let docker = DockerRuntime::default();

    let options = LaunchOptions {
        mode,
        workdir,
        docker: docker.clone(),
        skip_build,
    };
    let launcher = Launcher::new(options, defaults, env);
    let check = LiveOllamaCheck::new(mode, docker);
    let mut prompter = TerminalPrompter::new();

    match launcher.run(&mut prompter, &check).await {
        Ok(never) => match never {},
        Err(e) => Err(e),
    }
}

/// Show container state and Ollama reachability
async fn run_status() -> Result<()> {
    println!("Panopticon Status");
    println!("=================");

    if tool_available("docker") {
        let docker = DockerRuntime::default();
        match docker.ps(names::CONTAINER) {
            Ok(lines) if lines.is_empty() => println!("Containers: none"),
            Ok(lines) => {
                println!("Containers:");
                for line in lines {
                    println!("  {}", line);
                }
            }
            Err(e) => println!("Containers: Error - {}", e),
        }
    } else {
        println!("Containers: docker not installed");
    }

    let host = std::env::var(env::OLLAMA_HOST).unwrap_or_else(|_| suggest::OLLAMA_HOST.to_string());
    let client = OllamaClient::new(&host)?;
    if client.is_reachable().await {
        println!("Ollama ({}): Running", client.base_url());
        match client.list_models().await {
            Ok(models) => {
                for m in models {
                    println!("  {}", m);
                }
            }
            Err(e) => println!("  Error listing models: {}", e),
        }
    } else {
        println!("Ollama ({}): Not reachable", client.base_url());
    }

    Ok(())
}

/// Stop the app and companion containers, if present
fn run_stop() -> Result<()> {
    let docker = DockerRuntime::default();
    for name in [names::CONTAINER, names::OLLAMA_CONTAINER] {
        if docker.stop(name)? {
            println!("Stopped {}", name);
        }
    }
    Ok(())
}

/// Run config commands
fn run_config_command(action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let mut defaults = Defaults::load(config_path)?;
            for key in [
                &mut defaults.openai_api_key,
                &mut defaults.pixabay_api_key,
                &mut defaults.news_api_key,
            ] {
                if !key.is_empty() {
                    *key = "****".to_string();
                }
            }
            println!("{}", serde_json::to_string_pretty(&defaults)?);
        }
        ConfigCommands::Generate { output, force } => {
            if output.exists() && !force {
                return Err(panopticon_launcher::LauncherError::Config(format!(
                    "{:?} already exists. Use --force to overwrite",
                    output
                )));
            }
            Defaults::default().save(&output)?;
            println!("Generated presets at {:?}", output);
        }
    }

    Ok(())
}
