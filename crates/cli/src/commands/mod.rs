//! CLI Commands

pub mod action;
pub mod config;
pub mod log;
pub mod results;

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use xcauto_common::{Error, ProcessRunner, TracingDiagnostics};
use xcauto_driver::{respond, ActionOutcome, IntoToolOutput, Orchestrator, XcautoConfig};

use crate::output::{print_output, print_serialized, OutputFormat};

/// Everything a command needs to talk to Xcode and its tools
pub struct Context {
    pub orchestrator: Orchestrator,
    pub format: OutputFormat,
}

impl Context {
    pub fn new(config: XcautoConfig, format: OutputFormat) -> Self {
        let orchestrator = Orchestrator::new(
            Arc::new(ProcessRunner),
            config,
            TracingDiagnostics::shared(),
        );
        Self {
            orchestrator,
            format,
        }
    }

    pub fn config(&self) -> &XcautoConfig {
        self.orchestrator.config()
    }
}

/// Structured payload for errors that are reported rather than raised
#[derive(Serialize)]
struct ReportedError {
    code: &'static str,
    message: String,
}

/// Print an operation's result in the selected format.
///
/// Structured formats serialize the value itself; the envelope still decides
/// whether the command fails (a build with errors does).
pub fn emit<T>(result: xcauto_common::Result<T>, format: OutputFormat) -> Result<()>
where
    T: Serialize + IntoToolOutput,
{
    if !format.is_structured() {
        let output = respond(result)?;
        return print_output(&output, format);
    }

    match result {
        Ok(value) => {
            print_serialized(&value, format)?;
            value.into_tool_output()?;
            Ok(())
        }
        Err(e) if e.is_reportable() => print_serialized(
            &ReportedError {
                code: e.code(),
                message: e.to_string(),
            },
            format,
        ),
        Err(e) => Err(e.into()),
    }
}

/// Like [`emit`], for actions that may stop at an unresolved name
pub fn emit_outcome<T>(
    outcome: xcauto_common::Result<ActionOutcome<T>>,
    format: OutputFormat,
) -> Result<()>
where
    T: Serialize + IntoToolOutput,
{
    match outcome {
        Ok(ActionOutcome::Completed(value)) => emit(Ok(value), format),
        Ok(ActionOutcome::NameNotFound(miss)) => emit::<String>(Err(Error::NameNotFound(miss)), format),
        Err(e) => emit::<String>(Err(e), format),
    }
}
