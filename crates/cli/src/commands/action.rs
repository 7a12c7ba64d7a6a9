//! Xcode action commands

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use xcauto_driver::{BuildRequest, DebugRequest, Destination, RunRequest, TestRequest};

use super::{emit, emit_outcome, Context};
use crate::output::{print_list, print_success, TableDisplay};

#[derive(Args, Clone)]
pub struct ProjectArgs {
    /// Path to the .xcodeproj, .xcworkspace or Package.swift
    #[arg(short, long, env = "XCAUTO_PROJECT")]
    pub project: PathBuf,
}

impl ProjectArgs {
    /// The project path made absolute against the working directory
    pub fn path(&self) -> Result<PathBuf> {
        absolute(&self.project)
    }
}

pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Scheme to build
    #[arg(short, long)]
    pub scheme: String,

    /// Run destination, e.g. "iPhone 15 Pro"
    #[arg(short, long)]
    pub destination: Option<String>,
}

#[derive(Args)]
pub struct TestArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Scheme to test; the active scheme when omitted
    #[arg(short, long)]
    pub scheme: Option<String>,

    /// Run destination
    #[arg(short, long)]
    pub destination: Option<String>,

    /// Launch arguments passed to the test runner
    #[arg(last = true)]
    pub arguments: Vec<String>,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Scheme to run
    #[arg(short, long)]
    pub scheme: String,

    /// Launch arguments passed to the app
    #[arg(last = true)]
    pub arguments: Vec<String>,
}

#[derive(Args)]
pub struct DebugArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Scheme to debug; the active scheme when omitted
    #[arg(short, long)]
    pub scheme: Option<String>,

    /// Launch without building first
    #[arg(long)]
    pub skip_building: bool,
}

/// Destination row for table output
#[derive(Serialize)]
struct DestinationRow<'a>(&'a Destination);

impl TableDisplay for DestinationRow<'_> {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Platform", "Architecture"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.0.name.clone(),
            self.0.platform.clone().unwrap_or_default(),
            self.0.architecture.clone().unwrap_or_default(),
        ]
    }
}

pub async fn build(args: BuildArgs, ctx: &Context) -> Result<()> {
    let request = BuildRequest {
        project: args.project.path()?,
        scheme: args.scheme,
        destination: args.destination,
    };
    debug!("build {:?}", request);
    emit_outcome(ctx.orchestrator.build(&request).await, ctx.format)
}

pub async fn clean(args: ProjectArgs, ctx: &Context) -> Result<()> {
    emit(ctx.orchestrator.clean(&args.path()?).await, ctx.format)
}

pub async fn test(args: TestArgs, ctx: &Context) -> Result<()> {
    let request = TestRequest {
        project: args.project.path()?,
        scheme: args.scheme,
        destination: args.destination,
        arguments: args.arguments,
    };
    debug!("test {:?}", request);
    emit_outcome(ctx.orchestrator.test(&request).await, ctx.format)
}

pub async fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    let request = RunRequest {
        project: args.project.path()?,
        scheme: args.scheme,
        arguments: args.arguments,
    };
    emit_outcome(ctx.orchestrator.run(&request).await, ctx.format)
}

pub async fn debug_session(args: DebugArgs, ctx: &Context) -> Result<()> {
    let request = DebugRequest {
        project: args.project.path()?,
        scheme: args.scheme,
        skip_building: args.skip_building,
    };
    emit_outcome(ctx.orchestrator.debug(&request).await, ctx.format)
}

pub async fn stop(args: ProjectArgs, ctx: &Context) -> Result<()> {
    ctx.orchestrator.stop(&args.path()?).await?;
    if !ctx.format.is_structured() {
        print_success("Stop requested");
        return Ok(());
    }
    emit(Ok("Stop requested".to_string()), ctx.format)
}

pub async fn open(args: ProjectArgs, ctx: &Context) -> Result<()> {
    let project = args.path()?;
    emit(ctx.orchestrator.open_project(&project).await, ctx.format)
}

pub async fn info(args: ProjectArgs, ctx: &Context) -> Result<()> {
    emit(ctx.orchestrator.workspace_info(&args.path()?).await, ctx.format)
}

pub async fn schemes(args: ProjectArgs, ctx: &Context) -> Result<()> {
    emit(ctx.orchestrator.list_schemes(&args.path()?).await, ctx.format)
}

pub async fn destinations(args: ProjectArgs, ctx: &Context) -> Result<()> {
    let destinations = ctx.orchestrator.list_destinations(&args.path()?).await;
    match destinations {
        Ok(list) if !ctx.format.is_structured() => {
            let rows: Vec<DestinationRow> = list.iter().map(DestinationRow).collect();
            print_list(&rows, ctx.format)
        }
        other => emit(other, ctx.format),
    }
}
