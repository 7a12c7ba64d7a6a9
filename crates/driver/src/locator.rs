//! DerivedData discovery: artifact root, per-project cache, logs, bundles

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;
use walkdir::WalkDir;

use xcauto_common::{BuildLogInfo, CommandRunner, CommandSpec, Error, Result};

use crate::config::DerivedDataConfig;

const BUILD_LOG_EXT: &str = "xcactivitylog";
const RESULT_BUNDLE_EXT: &str = "xcresult";

/// A result bundle and when it was last written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfo {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Resolves DerivedData paths for a project
#[derive(Clone)]
pub struct ArtifactLocator {
    runner: Arc<dyn CommandRunner>,
    defaults_program: String,
    config: DerivedDataConfig,
}

impl ArtifactLocator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        defaults_program: impl Into<String>,
        config: DerivedDataConfig,
    ) -> Self {
        Self {
            runner,
            defaults_program: defaults_program.into(),
            config,
        }
    }

    /// Configured location, then Xcode's own preference, then the default
    pub async fn artifact_root(&self, project: &Path) -> PathBuf {
        let override_location = match &self.config.location {
            Some(location) => Some(location.clone()),
            None if self.config.read_xcode_preference => self.xcode_preference().await,
            None => None,
        };
        find_artifact_root(project, override_location.as_deref())
    }

    pub async fn project_cache_dir(&self, project: &Path) -> Result<Option<PathBuf>> {
        let root = self.artifact_root(project).await;
        let name = project_name(project)?;
        Ok(find_project_cache_dir(&root, &name, project))
    }

    /// Artifact view for one operation on `project`
    pub fn for_project<'a>(&'a self, project: &'a Path) -> ProjectArtifacts<'a> {
        ProjectArtifacts {
            locator: self,
            project,
            cache_dir: None,
        }
    }

    async fn xcode_preference(&self) -> Option<PathBuf> {
        let spec = CommandSpec::new(&self.defaults_program, Duration::from_secs(5)).args([
            "read",
            "com.apple.dt.Xcode",
            "IDECustomDerivedDataLocation",
        ]);
        match self.runner.run(&spec).await {
            Ok(output) if output.success() => {
                let value = output.stdout.trim();
                (!value.is_empty()).then(|| PathBuf::from(value))
            }
            Ok(_) => None,
            Err(e) => {
                debug!("Could not read Xcode DerivedData preference: {}", e);
                None
            }
        }
    }
}

/// A project's logs and bundles as seen by one polling operation. The cache
/// directory is looked up until it exists, then reused for every poll.
pub struct ProjectArtifacts<'a> {
    locator: &'a ArtifactLocator,
    project: &'a Path,
    cache_dir: Option<PathBuf>,
}

impl ProjectArtifacts<'_> {
    pub async fn cache_dir(&mut self) -> Result<Option<&Path>> {
        if self.cache_dir.is_none() {
            self.cache_dir = self.locator.project_cache_dir(self.project).await?;
        }
        Ok(self.cache_dir.as_deref())
    }

    pub async fn latest_log(&mut self) -> Result<Option<BuildLogInfo>> {
        Ok(self.cache_dir().await?.and_then(latest_build_log))
    }

    pub async fn bundles(&mut self) -> Result<Vec<BundleInfo>> {
        Ok(self
            .cache_dir()
            .await?
            .map(list_result_bundles)
            .unwrap_or_default())
    }
}

/// Absolute override, override relative to the project's directory, or the
/// per-user default
pub fn find_artifact_root(project: &Path, override_location: Option<&Path>) -> PathBuf {
    match override_location {
        Some(location) if location.is_absolute() => location.to_path_buf(),
        Some(location) => project
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(location),
        None => xcauto_common::default_derived_data_path(),
    }
}

/// `<root>/<ProjectName>-<hash>` belonging to `project`
pub fn find_project_cache_dir(root: &Path, project_name: &str, project: &Path) -> Option<PathBuf> {
    let prefix = format!("{}-", project_name);
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(root)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .map(|entry| entry.path())
        .collect();
    candidates.sort();

    match candidates.len() {
        0 => None,
        1 => candidates.pop(),
        _ => {
            let wanted = canonical(project);
            candidates.into_iter().find(|candidate| {
                recorded_workspace_path(&candidate.join("info.plist"))
                    .map(|recorded| {
                        let recorded = canonical(&recorded);
                        recorded == wanted
                            || recorded.starts_with(&wanted)
                            || wanted.starts_with(&recorded)
                    })
                    .unwrap_or(false)
            })
        }
    }
}

/// `WorkspacePath` recorded in a cache directory's `info.plist`
pub fn recorded_workspace_path(info_plist: &Path) -> Option<PathBuf> {
    let value = match plist::Value::from_file(info_plist) {
        Ok(value) => value,
        Err(e) => {
            debug!("Unreadable {}: {}", info_plist.display(), e);
            return None;
        }
    };
    value
        .as_dictionary()?
        .get("WorkspacePath")?
        .as_string()
        .map(PathBuf::from)
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn entries_with_ext(dir: &Path, ext: &str) -> Vec<(PathBuf, SystemTime)> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == ext).unwrap_or(false))
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((e.into_path(), modified))
        })
        .collect()
}

/// Build logs, newest first
pub fn list_build_logs(cache_dir: &Path) -> Vec<BuildLogInfo> {
    let mut logs: Vec<BuildLogInfo> = entries_with_ext(&cache_dir.join("Logs/Build"), BUILD_LOG_EXT)
        .into_iter()
        .map(|(path, modified)| BuildLogInfo { path, modified })
        .collect();
    logs.sort_by(|a, b| b.modified.cmp(&a.modified));
    logs
}

pub fn latest_build_log(cache_dir: &Path) -> Option<BuildLogInfo> {
    list_build_logs(cache_dir).into_iter().next()
}

/// Result bundles, newest first
pub fn list_result_bundles(cache_dir: &Path) -> Vec<BundleInfo> {
    let mut bundles: Vec<BundleInfo> = entries_with_ext(&cache_dir.join("Logs/Test"), RESULT_BUNDLE_EXT)
        .into_iter()
        .map(|(path, modified)| BundleInfo { path, modified })
        .collect();
    bundles.sort_by(|a, b| b.modified.cmp(&a.modified));
    bundles
}

/// `MyApp` for `.../MyApp.xcodeproj`, `.../MyApp.xcworkspace` or `.../MyApp/Package.swift`
pub fn project_name(project: &Path) -> Result<String> {
    let target = if project.file_name().map(|n| n == "Package.swift").unwrap_or(false) {
        project.parent().unwrap_or(project)
    } else {
        project
    };
    target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Validation(format!("cannot derive a project name from {}", project.display())))
}
