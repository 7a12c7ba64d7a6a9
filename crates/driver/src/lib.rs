//! xcauto Driver
//!
//! Orchestrates Xcode through its JXA scripting bridge and watches the
//! artifacts it leaves in DerivedData:
//!
//! - `bridge` / `scripts` - osascript invocation and script text
//! - `names` - scheme and destination resolution with suggestions
//! - `locator` - DerivedData root, project cache, logs, result bundles
//! - `log_decoder` - xclogparser with a fixed retry schedule
//! - `orchestrator` - the build/clean/test/run/debug/stop state machines
//! - `envelope` - rendering into output content or coded errors

pub mod bridge;
pub mod config;
pub mod envelope;
pub mod gate;
pub mod locator;
pub mod log_decoder;
pub mod names;
pub mod orchestrator;
pub mod scripts;

pub use bridge::ScriptBridge;
pub use config::XcautoConfig;
pub use envelope::{respond, IntoToolOutput};
pub use gate::{ProjectGate, XcodeProjectGate};
pub use locator::{ArtifactLocator, BundleInfo, ProjectArtifacts};
pub use log_decoder::{LogDecoder, RetryPolicy};
pub use orchestrator::{
    ActionOutcome, BuildReport, BuildRequest, CleanReport, DebugReport, DebugRequest, Destination,
    OrchestrationState, Orchestrator, RunRequest, TestReport, TestRequest, WorkspaceInfo,
};
