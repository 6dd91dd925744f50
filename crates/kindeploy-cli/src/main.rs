mod cmd;
mod output;
mod prompt;
mod root;

use clap::{Parser, Subcommand};
use cmd::deploy::DeployArgs;
use kindeploy_core::DeployError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "kindeploy",
    about = "Build a Go service into an image, deploy it to a local kind cluster and forward it to localhost",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: ./kindeploy.yaml when present)
    #[arg(long, global = true, env = "KINDEPLOY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: tools, build, load, apply, wait, forward (default)
    Deploy(DeployArgs),

    /// Only write the Dockerfile, manifests and missing defaults
    Generate {
        /// Folder containing the Go service (default: current directory)
        #[arg(long)]
        folder: Option<PathBuf>,

        /// Port the app listens on (default: from config)
        #[arg(long)]
        port: Option<String>,

        /// Output as JSON
        #[arg(long, short = 'j')]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Commands::Deploy(DeployArgs::default()));

    let default_level = match &command {
        Commands::Deploy(_) => tracing::Level::INFO,
        Commands::Generate { .. } => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = cli.config.as_deref();

    let result = match command {
        Commands::Deploy(args) => cmd::deploy::run(config, &cwd, args),
        Commands::Generate { folder, port, json } => {
            cmd::generate::run(config, &cwd, folder, port, json)
        }
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        if let Some(err) = e.downcast_ref::<DeployError>() {
            if let Some(output) = err.captured_output().filter(|o| !o.is_empty()) {
                eprint!("{output}");
            }
            if let Some(hint) = err.hint() {
                eprintln!("hint: {hint}");
            }
        }
        std::process::exit(1);
    }
}
