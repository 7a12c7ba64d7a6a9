//! Build log commands

use anyhow::{anyhow, Result};
use clap::Args;
use std::path::PathBuf;

use super::action::absolute;
use super::{emit, Context};

#[derive(Args)]
pub struct DecodeLogArgs {
    /// An .xcactivitylog to decode
    #[arg(conflicts_with = "project")]
    pub log: Option<PathBuf>,

    /// Decode the newest build log recorded for this project
    #[arg(short, long, env = "XCAUTO_PROJECT")]
    pub project: Option<PathBuf>,
}

/// Decode a build log without triggering anything in Xcode
pub async fn decode(args: DecodeLogArgs, ctx: &Context) -> Result<()> {
    let log = match (args.log, args.project) {
        (Some(log), _) => absolute(&log)?,
        (None, Some(project)) => {
            let project = absolute(&project)?;
            let cache = ctx
                .orchestrator
                .locator()
                .project_cache_dir(&project)
                .await?
                .ok_or_else(|| anyhow!("no DerivedData folder found for {}", project.display()))?;
            xcauto_driver::locator::latest_build_log(&cache)
                .ok_or_else(|| anyhow!("no build logs in {}", cache.display()))?
                .path
        }
        (None, None) => return Err(anyhow!("pass a log path or --project")),
    };

    tracing::info!("Decoding {}", log.display());
    emit(ctx.orchestrator.decoder().decode(&log).await, ctx.format)
}
