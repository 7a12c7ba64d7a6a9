//! Configuration commands

use anyhow::{anyhow, Result};
use clap::Subcommand;
use std::path::Path;

use xcauto_driver::XcautoConfig;

use crate::output::{print_serialized, print_success, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn execute(
    cmd: ConfigCommands,
    config: &XcautoConfig,
    path: &Path,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            if format.is_structured() {
                return print_serialized(config, format);
            }
            println!("# {}", path.display());
            print!("{}", config.to_toml()?);
            Ok(())
        }
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                return Err(anyhow!(
                    "{} already exists; pass --force to overwrite",
                    path.display()
                ));
            }
            XcautoConfig::default().save(path)?;
            print_success(&format!("Wrote {}", path.display()));
            Ok(())
        }
    }
}
