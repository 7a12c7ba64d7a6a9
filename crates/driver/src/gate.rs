//! Making sure Xcode has a project open before scripting it

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use xcauto_common::{Error, Result};

use crate::bridge::ScriptBridge;
use crate::scripts;

/// Invoked before any scripted action against a project
#[async_trait]
pub trait ProjectGate: Send + Sync {
    async fn ensure_open(&self, project: &Path) -> Result<()>;
}

/// Opens the project in Xcode and waits for it to finish loading
pub struct XcodeProjectGate {
    bridge: ScriptBridge,
    interval: Duration,
    attempts: u32,
}

impl XcodeProjectGate {
    pub fn new(bridge: ScriptBridge, interval: Duration, attempts: u32) -> Self {
        Self {
            bridge,
            interval,
            attempts,
        }
    }

    async fn is_loaded(&self, project: &Path) -> Result<bool> {
        let out = self.bridge.run(&scripts::project_loaded(project)).await?;
        Ok(out == "true")
    }
}

#[async_trait]
impl ProjectGate for XcodeProjectGate {
    async fn ensure_open(&self, project: &Path) -> Result<()> {
        if !project.is_absolute() {
            return Err(Error::Validation(format!(
                "project path must be absolute: {}",
                project.display()
            )));
        }
        if !project.exists() {
            return Err(Error::not_found("Project", project.display().to_string()));
        }
        if self.is_loaded(project).await? {
            return Ok(());
        }

        info!("Opening {} in Xcode", project.display());
        self.bridge.run(&scripts::open_project(project)).await?;

        for attempt in 1..=self.attempts {
            if self.is_loaded(project).await? {
                debug!("Project loaded after {} checks", attempt);
                return Ok(());
            }
            sleep(self.interval).await;
        }
        Err(Error::Timeout {
            what: format!("Xcode to load {}", project.display()),
            seconds: (self.interval * self.attempts).as_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use xcauto_common::{CommandOutput, CommandRunner, CommandSpec};

    /// Reports "false" for the first `loads_after` loaded checks
    struct SlowXcode {
        checks: AtomicUsize,
        opened: AtomicUsize,
        loads_after: usize,
    }

    #[async_trait]
    impl CommandRunner for SlowXcode {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            let script = spec.args.last().cloned().unwrap_or_default();
            if script.contains("app.open(") {
                self.opened.fetch_add(1, Ordering::SeqCst);
                return Ok(CommandOutput::ok("opened"));
            }
            let n = self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(CommandOutput::ok(if n >= self.loads_after { "true" } else { "false" }))
        }
    }

    fn gate(loads_after: usize) -> (XcodeProjectGate, Arc<SlowXcode>) {
        let xcode = Arc::new(SlowXcode {
            checks: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
            loads_after,
        });
        let bridge = ScriptBridge::new(xcode.clone(), "osascript", Duration::from_secs(1));
        (XcodeProjectGate::new(bridge, Duration::from_millis(1), 5), xcode)
    }

    #[tokio::test]
    async fn test_already_open_project_is_not_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, xcode) = gate(0);
        gate.ensure_open(dir.path()).await.unwrap();
        assert_eq!(xcode.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_opens_and_waits_for_load() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, xcode) = gate(3);
        gate.ensure_open(dir.path()).await.unwrap();
        assert_eq!(xcode.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, _) = gate(100);
        assert!(matches!(gate.ensure_open(dir.path()).await, Err(Error::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_relative_path_is_rejected() {
        let (gate, _) = gate(0);
        let err = gate.ensure_open(Path::new("MyApp.xcodeproj")).await.unwrap_err();
        assert!(err.is_reportable());
    }
}
