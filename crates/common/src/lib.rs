//! xcauto Common Library
//!
//! Shared types, errors and subprocess plumbing used by the orchestration
//! driver and the result-analysis engine.

pub mod diagnostics;
pub mod error;
pub mod process;
pub mod types;

// Re-export commonly used types
pub use diagnostics::{CapturingDiagnostics, Diagnostics, TracingDiagnostics};
pub use error::{Error, NameMiss, Result};
pub use process::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use types::*;

/// xcauto version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default config/state directory
pub fn default_store_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".xcauto")
}

/// Default configuration file path
pub fn default_config_path() -> std::path::PathBuf {
    default_store_path().join("config.toml")
}

/// Xcode's default DerivedData location for the current user
pub fn default_derived_data_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("Library/Developer/Xcode/DerivedData")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths_live_under_home() {
        let home = dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        assert_eq!(default_config_path(), home.join(".xcauto/config.toml"));
        assert!(default_derived_data_path().starts_with(&home));
    }
}
