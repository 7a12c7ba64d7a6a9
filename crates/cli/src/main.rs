//! xcauto CLI - Main Entry Point
//!
//! Drives Xcode builds, tests and runs from the command line and digs into
//! the result bundles they leave behind.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

use commands::{action, config, log, results, Context};
use xcauto_driver::XcautoConfig;

/// xcauto - Xcode automation and test-result analysis
#[derive(Parser)]
#[command(name = "xcauto")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "XCAUTO_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a scheme and report decoded errors and warnings
    Build(action::BuildArgs),

    /// Clean the project's build products
    Clean(action::ProjectArgs),

    /// Run tests and summarize the result bundle
    Test(action::TestArgs),

    /// Build and launch a scheme
    Run(action::RunArgs),

    /// Start a debug session
    Debug(action::DebugArgs),

    /// Stop the running action
    Stop(action::ProjectArgs),

    /// Open a project in Xcode and wait for it to load
    Open(action::ProjectArgs),

    /// Show the workspace's active scheme and destination
    Info(action::ProjectArgs),

    /// List schemes
    Schemes(action::ProjectArgs),

    /// List run destinations
    Destinations(action::ProjectArgs),

    /// Inspect a result bundle
    #[command(subcommand)]
    Results(results::ResultsCommands),

    /// Decode a build log without building
    DecodeLog(log::DecodeLogArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout stays clean for structured output
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(xcauto_common::default_config_path);
    let settings = XcautoConfig::load(&config_path)?;

    let command = match cli.command {
        Commands::Config(cmd) => return config::execute(cmd, &settings, &config_path, cli.format),
        command => command,
    };

    let ctx = Context::new(settings, cli.format);
    match command {
        Commands::Build(args) => action::build(args, &ctx).await?,
        Commands::Clean(args) => action::clean(args, &ctx).await?,
        Commands::Test(args) => action::test(args, &ctx).await?,
        Commands::Run(args) => action::run(args, &ctx).await?,
        Commands::Debug(args) => action::debug_session(args, &ctx).await?,
        Commands::Stop(args) => action::stop(args, &ctx).await?,
        Commands::Open(args) => action::open(args, &ctx).await?,
        Commands::Info(args) => action::info(args, &ctx).await?,
        Commands::Schemes(args) => action::schemes(args, &ctx).await?,
        Commands::Destinations(args) => action::destinations(args, &ctx).await?,
        Commands::Results(cmd) => results::execute(cmd, &ctx).await?,
        Commands::DecodeLog(args) => log::decode(args, &ctx).await?,
        Commands::Config(_) => unreachable!("handled before the context is built"),
    }

    Ok(())
}
