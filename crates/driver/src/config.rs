//! xcauto configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use xcauto_common::{Error, Result};
use xcauto_results::FallbackPolicy;

/// Top-level configuration, read from `~/.xcauto/config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XcautoConfig {
    /// External tool locations
    pub tools: ToolConfig,

    /// Per-invocation subprocess timeouts
    pub timeouts: TimeoutConfig,

    /// Polling intervals and caps
    pub polling: PollingConfig,

    /// Build-log decoder retry schedule
    pub decoder: DecoderConfig,

    /// DerivedData location
    pub derived_data: DerivedDataConfig,

    /// Screenshot selection
    pub screenshots: ScreenshotConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub osascript: String,
    pub xclogparser: String,
    pub xcrun: String,
    pub ffmpeg: String,
    pub defaults: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            osascript: "osascript".to_string(),
            xclogparser: "xclogparser".to_string(),
            xcrun: "xcrun".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            defaults: "defaults".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub script_secs: u64,
    pub decoder_secs: u64,
    pub query_secs: u64,
    pub frame_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            script_secs: 30,
            decoder_secs: 120,
            query_secs: 60,
            frame_secs: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn script(&self) -> Duration {
        Duration::from_secs(self.script_secs)
    }

    pub fn decoder(&self) -> Duration {
        Duration::from_secs(self.decoder_secs)
    }

    pub fn query(&self) -> Duration {
        Duration::from_secs(self.query_secs)
    }

    pub fn frame(&self) -> Duration {
        Duration::from_secs(self.frame_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Base interval for build, clean, and test polling
    pub interval_ms: u64,

    pub build_log_attempts: u32,
    pub build_stability_attempts: u32,
    pub clean_attempts: u32,
    pub test_completion_attempts: u32,
    pub bundle_attempts: u32,
    /// A bundle modified this long before the trigger still counts as new
    pub bundle_slack_secs: u64,
    /// Newest bundle younger than this is used when no new one appears
    pub bundle_fallback_max_age_secs: u64,
    pub bundle_ready_attempts: u32,

    /// Interval for run polling
    pub run_interval_ms: u64,
    pub run_change_attempts: u32,
    pub run_stable_samples: u32,
    pub run_stability_attempts: u32,

    /// Waiting for Xcode to finish loading a project
    pub open_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            build_log_attempts: 1800,
            build_stability_attempts: 1200,
            clean_attempts: 120,
            test_completion_attempts: 3600,
            bundle_attempts: 30,
            bundle_slack_secs: 5,
            bundle_fallback_max_age_secs: 3600,
            bundle_ready_attempts: 60,
            run_interval_ms: 500,
            run_change_attempts: 60,
            run_stable_samples: 6,
            run_stability_attempts: 600,
            open_attempts: 60,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn run_interval(&self) -> Duration {
        Duration::from_millis(self.run_interval_ms)
    }

    pub fn bundle_slack(&self) -> Duration {
        Duration::from_secs(self.bundle_slack_secs)
    }

    pub fn bundle_fallback_max_age(&self) -> Duration {
        Duration::from_secs(self.bundle_fallback_max_age_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Wait after each transient failure, in order
    pub retry_delays_ms: Vec<u64>,

    /// Total decode attempts, first one included
    pub max_attempts: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            retry_delays_ms: vec![1000, 2000, 3000, 5000, 8000, 13000],
            max_attempts: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivedDataConfig {
    /// Absolute, or relative to the project's directory
    pub location: Option<PathBuf>,

    /// Consult Xcode's `IDECustomDerivedDataLocation` when no location is set
    pub read_xcode_preference: bool,
}

impl Default for DerivedDataConfig {
    fn default() -> Self {
        Self {
            location: None,
            read_xcode_preference: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotConfig {
    pub fallback: FallbackPolicy,
}

impl XcautoConfig {
    /// Load configuration from file, defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)
                .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.decoder.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "decoder.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.decoder.retry_delays_ms.len() + 1 < self.decoder.max_attempts as usize {
            return Err(Error::InvalidConfig(format!(
                "decoder.retry_delays_ms needs {} entries for {} attempts",
                self.decoder.max_attempts - 1,
                self.decoder.max_attempts
            )));
        }
        if self.polling.run_stable_samples == 0 {
            return Err(Error::InvalidConfig(
                "polling.run_stable_samples must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Millisecond-scale timings for tests and dry runs
    pub fn fast() -> Self {
        let mut config = Self::default();
        config.polling.interval_ms = 5;
        config.polling.run_interval_ms = 5;
        config.polling.build_log_attempts = 200;
        config.polling.build_stability_attempts = 50;
        config.polling.clean_attempts = 50;
        config.polling.test_completion_attempts = 50;
        config.polling.bundle_attempts = 20;
        config.polling.bundle_ready_attempts = 20;
        config.polling.run_change_attempts = 200;
        config.polling.run_stability_attempts = 100;
        config.polling.open_attempts = 20;
        config.decoder.retry_delays_ms = vec![0; 6];
        config.derived_data.read_xcode_preference = false;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let config = XcautoConfig::default();
        assert_eq!(
            config.decoder.retry_delays_ms,
            vec![1000, 2000, 3000, 5000, 8000, 13000]
        );
        assert_eq!(config.polling.build_log_attempts, 1800);
        assert_eq!(config.polling.bundle_slack(), Duration::from_secs(5));
        config.validate().unwrap();
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut config = XcautoConfig::default();
        config.derived_data.location = Some(PathBuf::from("build/DerivedData"));
        config.screenshots.fallback = FallbackPolicy::Last;
        config.save(&path).unwrap();

        assert_eq!(XcautoConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[polling]\ninterval_ms = 250\n").unwrap();

        let config = XcautoConfig::load(&path).unwrap();
        assert_eq!(config.polling.interval_ms, 250);
        assert_eq!(config.polling.clean_attempts, 120);
        assert_eq!(config.tools.xcrun, "xcrun");
    }

    #[test]
    fn test_rejects_short_delay_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[decoder]\nretry_delays_ms = [1]\nmax_attempts = 6\n").unwrap();
        assert!(matches!(
            XcautoConfig::load(&path),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = XcautoConfig::load(Path::new("/nonexistent/xcauto.toml")).unwrap();
        assert_eq!(config, XcautoConfig::default());
    }
}
