//! Scripted stand-in for Xcode and its command-line tools

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use xcauto_common::{CapturingDiagnostics, CommandOutput, CommandRunner, CommandSpec, Result};
use xcauto_driver::{Orchestrator, XcautoConfig};

pub const TESTS_JSON: &str = r#"{"testNodes":[{"name":"MyAppTests","nodeType":"Unit test bundle","result":"Failed","children":[
  {"name":"LoginTests","nodeType":"Test Suite","nodeIdentifier":"LoginTests","children":[
    {"name":"testValidLogin()","nodeType":"Test Case","nodeIdentifier":"LoginTests/testValidLogin()","result":"Passed","durationInSeconds":0.1},
    {"name":"testBadPassword()","nodeType":"Test Case","nodeIdentifier":"LoginTests/testBadPassword()","result":"Failed","durationInSeconds":0.4,"children":[
      {"name":"XCTAssertEqual failed: (\"401\") is not equal to (\"200\")","nodeType":"Failure Message"}
    ]}
  ]}
]}]}"#;

pub const SUMMARY_JSON: &str = r#"{"title":"Test - MyApp","result":"Failed","totalTestCount":2,"passedTests":1,"failedTests":1,"skippedTests":0,"expectedFailures":0,"startTime":100.0,"finishTime":103.0,"testFailures":[]}"#;

pub fn issues(errors: usize, warnings: usize) -> String {
    let issue = |i: usize, kind: &str| {
        format!(
            r#"{{"documentURL":"file:///src/MyApp/File{i}.swift","startingLineNumber":{line},"startingColumnNumber":3,"title":"{kind} {i}"}}"#,
            i = i,
            line = i + 1,
            kind = kind
        )
    };
    let errors: Vec<String> = (0..errors).map(|i| issue(i, "error")).collect();
    let warnings: Vec<String> = (0..warnings).map(|i| issue(i, "warning")).collect();
    format!(
        r#"{{"errors":[{}],"warnings":[{}]}}"#,
        errors.join(","),
        warnings.join(",")
    )
}

pub fn corrupted() -> CommandOutput {
    CommandOutput::failed(1, "Error: The log file is corrupted or incomplete")
}

pub struct FakeXcode {
    pub derived: PathBuf,
    pub cache: PathBuf,
    pub schemes: Vec<String>,
    pub destinations: Vec<String>,
    pub decoder_replies: Mutex<VecDeque<CommandOutput>>,
    pub decoder_default: Mutex<CommandOutput>,
    pub scripts: Mutex<Vec<String>>,
    pub decode_calls: AtomicUsize,
    pub defaults_calls: AtomicUsize,
    /// Build, run and test actions leave logs and bundles behind
    pub writes_artifacts: AtomicBool,
    logs_written: AtomicUsize,
}

impl FakeXcode {
    pub fn scripts_containing(&self, needle: &str) -> usize {
        self.scripts
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.contains(needle))
            .count()
    }

    pub fn write_log(&self, modified: SystemTime) -> PathBuf {
        let n = self.logs_written.fetch_add(1, Ordering::SeqCst);
        let dir = self.cache.join("Logs/Build");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{:04}-BUILD.xcactivitylog", n));
        fs::write(&path, b"SLF010#").unwrap();
        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(modified).unwrap();
        path
    }

    pub fn write_bundle(&self, name: &str) -> PathBuf {
        let bundle = self.cache.join("Logs/Test").join(name);
        fs::create_dir_all(&bundle).unwrap();
        fs::write(bundle.join("Info.plist"), "<plist><dict/></plist>").unwrap();
        bundle
    }

    /// A bundle last written `age` ago
    pub fn write_aged_bundle(&self, name: &str, age: Duration) -> PathBuf {
        let bundle = self.write_bundle(name);
        let modified = SystemTime::now() - age;
        fs::File::open(&bundle).unwrap().set_modified(modified).unwrap();
        bundle
    }

    fn leaves_artifacts(&self) -> bool {
        self.writes_artifacts.load(Ordering::SeqCst)
    }

    fn script_reply(&self, script: &str) -> CommandOutput {
        let later = SystemTime::now() + Duration::from_secs(1);
        let reply = if script.contains("String(ws.loaded())") {
            "true".to_string()
        } else if script.contains("ws.schemes().map") {
            serde_json::to_string(&self.schemes).unwrap()
        } else if script.contains("ws.runDestinations().map") {
            let list: Vec<serde_json::Value> = self
                .destinations
                .iter()
                .map(|d| serde_json::json!({"name": d, "platform": "iOS Simulator", "architecture": "arm64"}))
                .collect();
            serde_json::to_string(&list).unwrap()
        } else if script.contains("ws.activeScheme = scheme") || script.contains("ws.activeRunDestination = dest") {
            "ok".to_string()
        } else if script.contains("ws.build().id()") {
            if self.leaves_artifacts() {
                self.write_log(later);
            }
            "build-1".to_string()
        } else if script.contains("ws.run(") {
            if self.leaves_artifacts() {
                self.write_log(later);
            }
            "run-1".to_string()
        } else if script.contains("ws.clean().id()") {
            "clean-1".to_string()
        } else if script.contains("ws.test(") {
            if self.leaves_artifacts() {
                self.write_bundle("Test-MyApp-new.xcresult");
            }
            "test-1".to_string()
        } else if script.contains("schemeActionResults()") {
            r#"{"completed":true,"status":"succeeded","error":null}"#.to_string()
        } else if script.contains("ws.debug(") {
            "debug-1".to_string()
        } else if script.contains("ws.stop()") {
            "stopped".to_string()
        } else {
            return CommandOutput::failed(1, "Error: unrecognized script");
        };
        CommandOutput::ok(format!("{}\n", reply))
    }
}

#[async_trait]
impl CommandRunner for FakeXcode {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        match spec.program.as_str() {
            "osascript" => {
                let script = spec.args.last().cloned().unwrap_or_default();
                self.scripts.lock().unwrap().push(script.clone());
                Ok(self.script_reply(&script))
            }
            "xclogparser" => {
                self.decode_calls.fetch_add(1, Ordering::SeqCst);
                let next = self.decoder_replies.lock().unwrap().pop_front();
                Ok(next.unwrap_or_else(|| self.decoder_default.lock().unwrap().clone()))
            }
            "defaults" => {
                self.defaults_calls.fetch_add(1, Ordering::SeqCst);
                Ok(CommandOutput::ok(format!("{}\n", self.derived.display())))
            }
            "xcrun" => {
                let has = |s: &str| spec.args.iter().any(|a| a == s);
                if has("summary") {
                    Ok(CommandOutput::ok(SUMMARY_JSON))
                } else if has("tests") {
                    Ok(CommandOutput::ok(TESTS_JSON))
                } else {
                    Ok(CommandOutput::failed(64, "unsupported"))
                }
            }
            _ => Ok(CommandOutput::failed(127, "not installed")),
        }
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub project: PathBuf,
    pub xcode: Arc<FakeXcode>,
    pub diagnostics: Arc<CapturingDiagnostics>,
    pub orchestrator: Orchestrator,
}

pub fn harness(decoder_default: CommandOutput) -> Harness {
    harness_with(decoder_default, |config, derived| {
        config.derived_data.location = Some(derived.to_path_buf());
    })
}

/// DerivedData found through Xcode's own preference instead of an override
pub fn harness_reading_preference(decoder_default: CommandOutput) -> Harness {
    harness_with(decoder_default, |config, _| {
        config.derived_data.location = None;
        config.derived_data.read_xcode_preference = true;
    })
}

pub fn harness_with(
    decoder_default: CommandOutput,
    configure: impl FnOnce(&mut XcautoConfig, &Path),
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("src/MyApp.xcodeproj");
    fs::create_dir_all(&project).unwrap();
    let derived = dir.path().join("DerivedData");
    let cache = derived.join("MyApp-bxqzfgnmhqnvzdcrxqodkgrdrzwb");
    fs::create_dir_all(&cache).unwrap();

    let xcode = Arc::new(FakeXcode {
        derived: derived.clone(),
        cache,
        schemes: vec!["MyApp".to_string(), "MyApp Widgets".to_string()],
        destinations: vec!["iPhone 15 Pro".to_string(), "My Mac".to_string()],
        decoder_replies: Mutex::new(VecDeque::new()),
        decoder_default: Mutex::new(decoder_default),
        scripts: Mutex::new(Vec::new()),
        decode_calls: AtomicUsize::new(0),
        defaults_calls: AtomicUsize::new(0),
        writes_artifacts: AtomicBool::new(true),
        logs_written: AtomicUsize::new(0),
    });

    let mut config = XcautoConfig::fast();
    configure(&mut config, &derived);

    let diagnostics = CapturingDiagnostics::new();
    let orchestrator = Orchestrator::new(xcode.clone(), config, diagnostics.clone());
    Harness {
        dir,
        project,
        xcode,
        diagnostics,
        orchestrator,
    }
}

pub fn project_path(h: &Harness) -> &Path {
    &h.project
}
