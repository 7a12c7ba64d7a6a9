//! Build, clean, test, run, debug and stop state machines
//!
//! ```text
//! Idle -> SchemeSet -> DestinationSet? -> ActionTriggered
//!      -> AwaitingArtifact -> AwaitingStability -> Parsed
//!      -> Success | Warnings | Failure | TimedOut
//! ```
//!
//! Every wait is a bounded loop of `tokio::time::sleep` intervals. Artifacts
//! are matched against a snapshot and trigger instant taken by the operation
//! itself, never against "whatever file is newest".

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::sleep;

use xcauto_common::{
    BuildClassification, CommandRunner, Diagnostics, Error, NameMiss,
    ParsedBuildResults, Result,
};
use xcauto_results::{
    bundle::wait_until_ready, FrameExtractor, ResultBundle, TestRunReport, XcResultTool,
};

use crate::bridge::ScriptBridge;
use crate::config::XcautoConfig;
use crate::gate::{ProjectGate, XcodeProjectGate};
use crate::locator::{ArtifactLocator, BundleInfo};
use crate::log_decoder::{LogDecoder, RetryPolicy};
use crate::names;
use crate::scripts;

/// Where an action currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationState {
    Idle,
    SchemeSet,
    DestinationSet,
    ActionTriggered,
    AwaitingArtifact,
    AwaitingStability,
    Parsed,
    Finished(BuildClassification),
}

/// An action either ran or stopped at a name that did not resolve
#[derive(Debug, Clone)]
pub enum ActionOutcome<T> {
    Completed(T),
    NameNotFound(NameMiss),
}

impl<T> ActionOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::NameNotFound(_) => None,
        }
    }
}

/// Outcome of a build or run
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub action_id: Option<String>,
    pub scheme: String,
    pub destination: Option<String>,
    pub classification: BuildClassification,
    pub results: ParsedBuildResults,
    pub log: Option<PathBuf>,
    pub log_modified: Option<DateTime<Local>>,
    pub states: Vec<OrchestrationState>,
    pub notes: Vec<String>,
}

impl BuildReport {
    pub fn to_text(&self) -> String {
        let mut out = format!("Build {} (scheme '{}'", self.classification, self.scheme);
        if let Some(destination) = &self.destination {
            out.push_str(&format!(", destination '{}'", destination));
        }
        out.push(')');

        if !self.results.errors.is_empty() {
            out.push_str(&format!("\nErrors ({}):", self.results.errors.len()));
            for error in &self.results.errors {
                out.push_str(&format!("\n  - {}", error));
            }
        }
        if !self.results.warnings.is_empty() {
            out.push_str(&format!("\nWarnings ({}):", self.results.warnings.len()));
            for warning in &self.results.warnings {
                out.push_str(&format!("\n  - {}", warning));
            }
        }
        if let Some(log) = &self.log {
            out.push_str(&format!("\nLog: {}", log.display()));
            if let Some(modified) = &self.log_modified {
                out.push_str(&format!(" ({})", modified.format("%Y-%m-%d %H:%M:%S")));
            }
        }
        for note in &self.notes {
            out.push_str(&format!("\nNote: {}", note));
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub action_id: String,
    pub completed: bool,
    pub status: Option<String>,
    pub error: Option<String>,
}

impl CleanReport {
    pub fn to_text(&self) -> String {
        match (self.completed, &self.error) {
            (true, None) => "Clean completed".to_string(),
            (true, Some(error)) => format!("Clean finished with error: {}", error),
            (false, _) => "Clean was triggered but did not report completion in time".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub action_id: String,
    pub status: Option<String>,
    pub bundle: Option<PathBuf>,
    pub run: Option<TestRunReport>,
    /// Rendered test tree with case indices
    pub tree: Option<String>,
    pub timed_out: bool,
    pub states: Vec<OrchestrationState>,
    pub notes: Vec<String>,
}

impl TestReport {
    pub fn to_text(&self) -> String {
        let mut out = match &self.run {
            Some(run) => run.to_text(),
            None => match &self.bundle {
                Some(bundle) => format!("Result bundle: {}", bundle.display()),
                None => "No result bundle available".to_string(),
            },
        };
        if let Some(tree) = &self.tree {
            out.push_str("\n\n");
            out.push_str(tree.trim_end());
        }
        for note in &self.notes {
            out.push_str(&format!("\nNote: {}", note));
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugReport {
    pub action_id: String,
    pub scheme: Option<String>,
    pub skip_building: bool,
}

/// A run destination as Xcode lists it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub name: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceInfo {
    pub name: String,
    pub path: String,
    pub loaded: bool,
    pub active_scheme: Option<String>,
    pub active_run_destination: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ActionStatus {
    completed: bool,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub project: PathBuf,
    pub scheme: String,
    pub destination: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TestRequest {
    pub project: PathBuf,
    pub scheme: Option<String>,
    pub destination: Option<String>,
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub project: PathBuf,
    pub scheme: String,
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DebugRequest {
    pub project: PathBuf,
    pub scheme: Option<String>,
    pub skip_building: bool,
}

/// A new bundle: absent from the snapshot and written no earlier than
/// `trigger - slack`. The newest qualifying bundle wins.
pub fn pick_new_bundle(
    bundles: &[BundleInfo],
    snapshot: &HashSet<PathBuf>,
    trigger: SystemTime,
    slack: Duration,
) -> Option<PathBuf> {
    let floor = trigger.checked_sub(slack).unwrap_or(SystemTime::UNIX_EPOCH);
    bundles
        .iter()
        .filter(|b| !snapshot.contains(&b.path) && b.modified >= floor)
        .max_by_key(|b| b.modified)
        .map(|b| b.path.clone())
}

/// Most recently modified bundle, if younger than `max_age`
pub fn fallback_bundle(bundles: &[BundleInfo], now: SystemTime, max_age: Duration) -> Option<PathBuf> {
    bundles
        .iter()
        .max_by_key(|b| b.modified)
        .filter(|b| {
            now.duration_since(b.modified)
                .map(|age| age < max_age)
                .unwrap_or(true)
        })
        .map(|b| b.path.clone())
}

async fn file_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}

/// Drives Xcode through its scripting bridge
pub struct Orchestrator {
    runner: Arc<dyn CommandRunner>,
    bridge: ScriptBridge,
    decoder: LogDecoder,
    locator: ArtifactLocator,
    gate: Arc<dyn ProjectGate>,
    config: XcautoConfig,
    diagnostics: Arc<dyn Diagnostics>,
}

impl Orchestrator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        config: XcautoConfig,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        let bridge = ScriptBridge::new(
            runner.clone(),
            &config.tools.osascript,
            config.timeouts.script(),
        );
        let decoder = LogDecoder::new(
            runner.clone(),
            &config.tools.xclogparser,
            config.timeouts.decoder(),
            RetryPolicy::from_config(&config.decoder),
            diagnostics.clone(),
        );
        let locator = ArtifactLocator::new(
            runner.clone(),
            &config.tools.defaults,
            config.derived_data.clone(),
        );
        let gate = Arc::new(XcodeProjectGate::new(
            bridge.clone(),
            config.polling.interval(),
            config.polling.open_attempts,
        ));
        Self {
            runner,
            bridge,
            decoder,
            locator,
            gate,
            config,
            diagnostics,
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn ProjectGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn config(&self) -> &XcautoConfig {
        &self.config
    }

    pub fn decoder(&self) -> &LogDecoder {
        &self.decoder
    }

    pub fn locator(&self) -> &ArtifactLocator {
        &self.locator
    }

    /// Query tool for a bundle, using configured program and timeout
    pub fn result_tool(&self, bundle: &Path) -> XcResultTool {
        XcResultTool::new(self.runner.clone(), bundle)
            .with_program(&self.config.tools.xcrun)
            .with_timeout(self.config.timeouts.query())
    }

    pub fn frame_extractor(&self) -> FrameExtractor {
        FrameExtractor::new(self.runner.clone())
            .with_program(&self.config.tools.ffmpeg)
            .with_timeout(self.config.timeouts.frame())
    }

    fn enter(&self, action: &str, states: &mut Vec<OrchestrationState>, next: OrchestrationState) {
        self.diagnostics.debug(&format!("{}: {:?}", action, next));
        states.push(next);
    }

    pub async fn open_project(&self, project: &Path) -> Result<()> {
        self.gate.ensure_open(project).await
    }

    pub async fn list_schemes(&self, project: &Path) -> Result<Vec<String>> {
        self.gate.ensure_open(project).await?;
        let out = self.bridge.run(&scripts::list_schemes(project)).await?;
        serde_json::from_str(&out).map_err(|e| Error::unexpected("osascript", format!("scheme list: {}", e)))
    }

    pub async fn list_destinations(&self, project: &Path) -> Result<Vec<Destination>> {
        self.gate.ensure_open(project).await?;
        let out = self.bridge.run(&scripts::list_destinations(project)).await?;
        serde_json::from_str(&out)
            .map_err(|e| Error::unexpected("osascript", format!("destination list: {}", e)))
    }

    pub async fn workspace_info(&self, project: &Path) -> Result<WorkspaceInfo> {
        self.gate.ensure_open(project).await?;
        let out = self.bridge.run(&scripts::workspace_info(project)).await?;
        serde_json::from_str(&out)
            .map_err(|e| Error::unexpected("osascript", format!("workspace info: {}", e)))
    }

    /// Newest result bundle in the project's cache
    pub async fn latest_result_bundle(&self, project: &Path) -> Result<Option<PathBuf>> {
        let bundles = self.locator.for_project(project).bundles().await?;
        Ok(bundles.into_iter().next().map(|b| b.path))
    }

    async fn select_scheme(
        &self,
        project: &Path,
        requested: &str,
    ) -> Result<std::result::Result<String, NameMiss>> {
        let schemes = self.list_schemes(project).await?;
        match names::resolve("Scheme", requested, &schemes, names::normalize_scheme) {
            Ok(scheme) => {
                self.bridge.run(&scripts::set_scheme(project, &scheme)).await?;
                Ok(Ok(scheme))
            }
            Err(miss) => Ok(Err(miss)),
        }
    }

    async fn select_destination(
        &self,
        project: &Path,
        requested: &str,
    ) -> Result<std::result::Result<String, NameMiss>> {
        let destinations: Vec<String> = self
            .list_destinations(project)
            .await?
            .into_iter()
            .map(|d| d.name)
            .collect();
        match names::resolve("Destination", requested, &destinations, names::normalize_destination) {
            Ok(destination) => {
                self.bridge
                    .run(&scripts::set_destination(project, &destination))
                    .await?;
                Ok(Ok(destination))
            }
            Err(miss) => Ok(Err(miss)),
        }
    }

    /// Poll the scheme action until it reports completion; `None` on timeout
    async fn wait_for_action(
        &self,
        project: &Path,
        action_id: &str,
        attempts: u32,
    ) -> Result<Option<ActionStatus>> {
        let script = scripts::action_status(project, action_id);
        for _ in 0..attempts {
            let out = self.bridge.run(&script).await?;
            let status: Option<ActionStatus> = serde_json::from_str(&out)
                .map_err(|e| Error::unexpected("osascript", format!("action status: {}", e)))?;
            if let Some(status) = status.filter(|s| s.completed) {
                return Ok(Some(status));
            }
            sleep(self.config.polling.interval()).await;
        }
        Ok(None)
    }

    pub async fn build(&self, request: &BuildRequest) -> Result<ActionOutcome<BuildReport>> {
        let project = request.project.as_path();
        let mut states = vec![OrchestrationState::Idle];
        self.gate.ensure_open(project).await?;

        let scheme = match self.select_scheme(project, &request.scheme).await? {
            Ok(scheme) => scheme,
            Err(miss) => return Ok(ActionOutcome::NameNotFound(miss)),
        };
        self.enter("build", &mut states, OrchestrationState::SchemeSet);

        let destination = match &request.destination {
            Some(requested) => match self.select_destination(project, requested).await? {
                Ok(destination) => {
                    self.enter("build", &mut states, OrchestrationState::DestinationSet);
                    Some(destination)
                }
                Err(miss) => return Ok(ActionOutcome::NameNotFound(miss)),
            },
            None => None,
        };

        let mut artifacts = self.locator.for_project(project);
        let trigger = SystemTime::now();
        let action_id = self.bridge.run(&scripts::build(project)).await?;
        self.enter("build", &mut states, OrchestrationState::ActionTriggered);
        self.diagnostics
            .info(&format!("Build of '{}' triggered ({})", scheme, action_id));

        let mut report = BuildReport {
            action_id: Some(action_id),
            scheme,
            destination,
            classification: BuildClassification::TimedOut,
            results: ParsedBuildResults::default(),
            log: None,
            log_modified: None,
            states: Vec::new(),
            notes: Vec::new(),
        };

        self.enter("build", &mut states, OrchestrationState::AwaitingArtifact);
        let polling = &self.config.polling;
        let mut found = None;
        for _ in 0..polling.build_log_attempts {
            if let Some(log) = artifacts.latest_log().await?.filter(|l| l.modified > trigger) {
                found = Some(log);
                break;
            }
            sleep(polling.interval()).await;
        }
        let Some(mut current) = found else {
            report.notes.push(format!(
                "no build log newer than the trigger appeared within {} polls",
                polling.build_log_attempts
            ));
            return Ok(ActionOutcome::Completed(self.finish("build", report, states)));
        };

        self.enter("build", &mut states, OrchestrationState::AwaitingStability);
        let mut last_size = file_size(&current.path).await;
        for _ in 0..polling.build_stability_attempts {
            sleep(polling.interval()).await;

            if let Some(latest) = artifacts.latest_log().await? {
                if latest.path != current.path && latest.modified > trigger {
                    self.diagnostics
                        .debug(&format!("Newer build log appeared: {}", latest.path.display()));
                    last_size = file_size(&latest.path).await;
                    current = latest;
                    continue;
                }
            }

            let size = file_size(&current.path).await;
            if size.is_some() && size == last_size {
                let results = self.decoder.decode(&current.path).await?;
                if !results.decoder_failed {
                    self.enter("build", &mut states, OrchestrationState::Parsed);
                    report.classification = results.classify();
                    report.results = results;
                    report.log = Some(current.path.clone());
                    report.log_modified = Some(DateTime::<Local>::from(current.modified));
                    return Ok(ActionOutcome::Completed(self.finish("build", report, states)));
                }
                report.results = results;
            }
            last_size = size;
        }

        report.log = Some(current.path.clone());
        report.notes.push(format!(
            "build log did not settle into a decodable state within {} polls",
            polling.build_stability_attempts
        ));
        Ok(ActionOutcome::Completed(self.finish("build", report, states)))
    }

    fn finish(
        &self,
        action: &str,
        mut report: BuildReport,
        mut states: Vec<OrchestrationState>,
    ) -> BuildReport {
        self.enter(action, &mut states, OrchestrationState::Finished(report.classification));
        match report.classification {
            BuildClassification::Failure => self.diagnostics.warn(&format!(
                "{} failed with {} error(s)",
                action,
                report.results.errors.len()
            )),
            BuildClassification::TimedOut => self.diagnostics.warn(&format!("{} timed out", action)),
            _ => self.diagnostics.info(&format!("{} {}", action, report.classification)),
        }
        report.states = states;
        report
    }

    pub async fn clean(&self, project: &Path) -> Result<CleanReport> {
        self.gate.ensure_open(project).await?;
        let action_id = self.bridge.run(&scripts::clean(project)).await?;
        let status = self
            .wait_for_action(project, &action_id, self.config.polling.clean_attempts)
            .await?;
        Ok(CleanReport {
            action_id,
            completed: status.is_some(),
            status: status.as_ref().and_then(|s| s.status.clone()),
            error: status.and_then(|s| s.error),
        })
    }

    pub async fn test(&self, request: &TestRequest) -> Result<ActionOutcome<TestReport>> {
        let project = request.project.as_path();
        let mut states = vec![OrchestrationState::Idle];
        self.gate.ensure_open(project).await?;

        if let Some(requested) = &request.scheme {
            if let Err(miss) = self.select_scheme(project, requested).await? {
                return Ok(ActionOutcome::NameNotFound(miss));
            }
            self.enter("test", &mut states, OrchestrationState::SchemeSet);
        }
        if let Some(requested) = &request.destination {
            if let Err(miss) = self.select_destination(project, requested).await? {
                return Ok(ActionOutcome::NameNotFound(miss));
            }
            self.enter("test", &mut states, OrchestrationState::DestinationSet);
        }

        let mut artifacts = self.locator.for_project(project);
        let snapshot: HashSet<PathBuf> = artifacts
            .bundles()
            .await?
            .into_iter()
            .map(|b| b.path)
            .collect();
        let trigger = SystemTime::now();
        let action_id = self
            .bridge
            .run(&scripts::test(project, &request.arguments))
            .await?;
        self.enter("test", &mut states, OrchestrationState::ActionTriggered);

        let mut report = TestReport {
            action_id: action_id.clone(),
            status: None,
            bundle: None,
            run: None,
            tree: None,
            timed_out: false,
            states: Vec::new(),
            notes: Vec::new(),
        };

        let polling = &self.config.polling;
        match self
            .wait_for_action(project, &action_id, polling.test_completion_attempts)
            .await?
        {
            Some(status) => {
                report.status = status.status;
                if let Some(error) = status.error {
                    report.notes.push(format!("Xcode reported: {}", error));
                }
            }
            None => {
                report.timed_out = true;
                report.notes.push(format!(
                    "test action did not complete within {} polls",
                    polling.test_completion_attempts
                ));
                report.states = states;
                return Ok(ActionOutcome::Completed(report));
            }
        }

        self.enter("test", &mut states, OrchestrationState::AwaitingArtifact);
        let mut chosen = None;
        let mut bundles = Vec::new();
        for _ in 0..polling.bundle_attempts {
            bundles = artifacts.bundles().await?;
            chosen = pick_new_bundle(&bundles, &snapshot, trigger, polling.bundle_slack());
            if chosen.is_some() {
                break;
            }
            sleep(polling.interval()).await;
        }
        if chosen.is_none() {
            chosen = fallback_bundle(&bundles, SystemTime::now(), polling.bundle_fallback_max_age());
            if let Some(bundle) = &chosen {
                report.notes.push(format!(
                    "no new result bundle appeared; using the most recent one ({})",
                    bundle.display()
                ));
            }
        }
        let Some(bundle) = chosen else {
            report.notes.push("no result bundle found for this run".to_string());
            report.states = states;
            return Ok(ActionOutcome::Completed(report));
        };
        report.bundle = Some(bundle.clone());

        self.enter("test", &mut states, OrchestrationState::AwaitingStability);
        if let Err(e) = wait_until_ready(&bundle, polling.interval(), polling.bundle_ready_attempts).await {
            report.timed_out = true;
            report.notes.push(format!("result bundle not ready: {}", e));
            report.states = states;
            return Ok(ActionOutcome::Completed(report));
        }

        match ResultBundle::open(self.result_tool(&bundle)).await {
            Ok(opened) => match opened.report().await {
                Ok(run) => {
                    self.enter("test", &mut states, OrchestrationState::Parsed);
                    report.tree = Some(opened.tree().render());
                    report.run = Some(run);
                }
                Err(e) => {
                    report.tree = Some(opened.tree().render());
                    report.notes.push(format!("could not read the test summary: {}", e));
                }
            },
            Err(e) => report
                .notes
                .push(format!("could not read the result bundle: {}", e)),
        }
        report.states = states;
        Ok(ActionOutcome::Completed(report))
    }

    pub async fn run(&self, request: &RunRequest) -> Result<ActionOutcome<BuildReport>> {
        let project = request.project.as_path();
        let mut states = vec![OrchestrationState::Idle];
        self.gate.ensure_open(project).await?;

        let scheme = match self.select_scheme(project, &request.scheme).await? {
            Ok(scheme) => scheme,
            Err(miss) => return Ok(ActionOutcome::NameNotFound(miss)),
        };
        self.enter("run", &mut states, OrchestrationState::SchemeSet);

        let mut artifacts = self.locator.for_project(project);
        let before = artifacts.latest_log().await?;
        let action_id = self
            .bridge
            .run(&scripts::run(project, &request.arguments))
            .await?;
        self.enter("run", &mut states, OrchestrationState::ActionTriggered);

        let mut report = BuildReport {
            action_id: Some(action_id),
            scheme,
            destination: None,
            classification: BuildClassification::TimedOut,
            results: ParsedBuildResults::default(),
            log: None,
            log_modified: None,
            states: Vec::new(),
            notes: Vec::new(),
        };

        self.enter("run", &mut states, OrchestrationState::AwaitingArtifact);
        let polling = &self.config.polling;
        let mut changed = None;
        for _ in 0..polling.run_change_attempts {
            sleep(polling.run_interval()).await;
            let latest = artifacts.latest_log().await?;
            if latest.is_some() && latest != before {
                changed = latest;
                break;
            }
        }
        let Some(mut current) = changed else {
            report.notes.push(format!(
                "no build log activity within {} polls; the app may have launched without a build",
                polling.run_change_attempts
            ));
            return Ok(ActionOutcome::Completed(self.finish("run", report, states)));
        };

        self.enter("run", &mut states, OrchestrationState::AwaitingStability);
        let mut stable = 0;
        let mut settled = false;
        for _ in 0..polling.run_stability_attempts {
            sleep(polling.run_interval()).await;
            let Some(latest) = artifacts.latest_log().await? else {
                continue;
            };
            if latest.path == current.path && latest.modified == current.modified {
                stable += 1;
                if stable >= polling.run_stable_samples {
                    settled = true;
                    break;
                }
            } else {
                stable = 0;
                current = latest;
            }
        }

        report.log = Some(current.path.clone());
        report.log_modified = Some(DateTime::<Local>::from(current.modified));
        if !settled {
            report.notes.push(format!(
                "build log kept changing for {} polls",
                polling.run_stability_attempts
            ));
            return Ok(ActionOutcome::Completed(self.finish("run", report, states)));
        }

        let results = self.decoder.decode(&current.path).await?;
        self.enter("run", &mut states, OrchestrationState::Parsed);
        if results.decoder_failed {
            report.notes.push("build log could not be decoded".to_string());
        }
        report.classification = results.classify();
        report.results = results;
        Ok(ActionOutcome::Completed(self.finish("run", report, states)))
    }

    pub async fn debug(&self, request: &DebugRequest) -> Result<ActionOutcome<DebugReport>> {
        let project = request.project.as_path();
        self.gate.ensure_open(project).await?;

        let scheme = match &request.scheme {
            Some(requested) => {
                let schemes = self.list_schemes(project).await?;
                match names::resolve("Scheme", requested, &schemes, names::normalize_scheme) {
                    Ok(scheme) => Some(scheme),
                    Err(miss) => return Ok(ActionOutcome::NameNotFound(miss)),
                }
            }
            None => None,
        };

        let action_id = self
            .bridge
            .run(&scripts::debug(project, scheme.as_deref(), request.skip_building))
            .await?;
        self.diagnostics
            .info(&format!("Debug session started ({})", action_id));
        Ok(ActionOutcome::Completed(DebugReport {
            action_id,
            scheme,
            skip_building: request.skip_building,
        }))
    }

    /// Fire-and-forget; nothing is awaited after the signal is sent
    pub async fn stop(&self, project: &Path) -> Result<()> {
        self.bridge.run(&scripts::stop(project)).await?;
        self.diagnostics.info("Stop requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(path: &str, modified: SystemTime) -> BundleInfo {
        BundleInfo {
            path: PathBuf::from(path),
            modified,
        }
    }

    #[test]
    fn test_new_bundle_requires_absence_from_snapshot() {
        let t = SystemTime::now();
        let bundles = vec![
            bundle("/dd/Logs/Test/After.xcresult", t + Duration::from_secs(1)),
            bundle("/dd/Logs/Test/Before.xcresult", t - Duration::from_secs(1)),
        ];
        let snapshot: HashSet<PathBuf> = [PathBuf::from("/dd/Logs/Test/Before.xcresult")].into();

        assert_eq!(
            pick_new_bundle(&bundles, &snapshot, t, Duration::from_secs(5)),
            Some(PathBuf::from("/dd/Logs/Test/After.xcresult"))
        );
        assert_eq!(
            pick_new_bundle(&bundles[1..], &snapshot, t, Duration::from_secs(5)),
            None
        );
    }

    #[test]
    fn test_slack_only_reaches_back_five_seconds() {
        let t = SystemTime::now();
        let bundles = vec![
            bundle("/a.xcresult", t - Duration::from_secs(4)),
            bundle("/b.xcresult", t - Duration::from_secs(30)),
        ];
        let empty = HashSet::new();
        assert_eq!(
            pick_new_bundle(&bundles, &empty, t, Duration::from_secs(5)),
            Some(PathBuf::from("/a.xcresult"))
        );
        assert_eq!(pick_new_bundle(&bundles[1..], &empty, t, Duration::from_secs(5)), None);
    }

    #[test]
    fn test_fallback_respects_max_age() {
        let now = SystemTime::now();
        let fresh = vec![bundle("/fresh.xcresult", now - Duration::from_secs(600))];
        let stale = vec![bundle("/stale.xcresult", now - Duration::from_secs(7200))];
        let hour = Duration::from_secs(3600);
        assert_eq!(fallback_bundle(&fresh, now, hour), Some(PathBuf::from("/fresh.xcresult")));
        assert_eq!(fallback_bundle(&stale, now, hour), None);
        assert_eq!(fallback_bundle(&[], now, hour), None);
    }

    #[test]
    fn test_report_text() {
        let report = BuildReport {
            action_id: Some("A1".into()),
            scheme: "MyApp".into(),
            destination: Some("iPhone 15".into()),
            classification: BuildClassification::Warnings,
            results: ParsedBuildResults {
                warnings: vec!["/src/App.swift:3: Unused variable".into()],
                ..Default::default()
            },
            log: None,
            log_modified: None,
            states: vec![],
            notes: vec!["slow".into()],
        };
        let text = report.to_text();
        assert!(text.starts_with("Build success with warnings (scheme 'MyApp', destination 'iPhone 15')"));
        assert!(text.contains("Warnings (1):\n  - /src/App.swift:3: Unused variable"));
        assert!(text.ends_with("Note: slow"));
    }
}
