//! Decoder retry budget: transient corruption never escapes as an error

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use test_case::test_case;
use tracing::Level;

use xcauto_common::{
    CapturingDiagnostics, CommandOutput, CommandRunner, CommandSpec, Error, Result,
};
use xcauto_driver::{LogDecoder, RetryPolicy};

/// Fails with a corruption message for the first `failures` calls
struct FlakyDecoder {
    failures: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl CommandRunner for FlakyDecoder {
    async fn run(&self, _spec: &CommandSpec) -> Result<CommandOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Ok(CommandOutput::failed(1, "Error: the log is truncated"))
        } else {
            Ok(CommandOutput::ok(
                r#"{"errors":[],"warnings":[{"documentURL":"file:///a.swift","startingLineNumber":2,"title":"unused"}]}"#,
            ))
        }
    }
}

fn decoder(failures: usize) -> (LogDecoder, Arc<FlakyDecoder>, Arc<CapturingDiagnostics>) {
    let runner = Arc::new(FlakyDecoder {
        failures,
        calls: AtomicUsize::new(0),
    });
    let diagnostics = CapturingDiagnostics::new();
    let decoder = LogDecoder::new(
        runner.clone(),
        "xclogparser",
        Duration::from_secs(5),
        RetryPolicy::new(vec![Duration::ZERO; 6], 6),
        diagnostics.clone(),
    );
    (decoder, runner, diagnostics)
}

#[test_case(0 ; "clean log")]
#[test_case(1 ; "one transient failure")]
#[test_case(5 ; "last attempt succeeds")]
#[tokio::test]
async fn recovers_within_budget(failures: usize) {
    let (decoder, runner, _) = decoder(failures);
    let results = decoder.decode(Path::new("/dd/Logs/Build/1.xcactivitylog")).await.unwrap();

    assert!(!results.decoder_failed);
    assert_eq!(results.warnings, vec!["/a.swift:2: unused".to_string()]);
    assert_eq!(runner.calls.load(Ordering::SeqCst), failures + 1);
}

#[test_case(6 ; "exactly the budget")]
#[test_case(9 ; "beyond the budget")]
#[tokio::test]
async fn gives_up_with_a_synthesized_error(failures: usize) {
    let (decoder, runner, diagnostics) = decoder(failures);
    let results = decoder.decode(Path::new("/dd/Logs/Build/1.xcactivitylog")).await.unwrap();

    assert!(results.decoder_failed);
    assert_eq!(results.errors.len(), 1);
    assert!(results.errors[0].starts_with("Unknown file: build log could not be decoded after 6 attempts"));
    assert_eq!(runner.calls.load(Ordering::SeqCst), 6);
    assert!(diagnostics.contains(Level::WARN, "Giving up on"));
}

#[tokio::test]
async fn missing_decoder_is_an_error() {
    struct Missing;

    #[async_trait]
    impl CommandRunner for Missing {
        async fn run(&self, _spec: &CommandSpec) -> Result<CommandOutput> {
            Ok(CommandOutput::failed(127, "xclogparser: command not found"))
        }
    }

    let decoder = LogDecoder::new(
        Arc::new(Missing),
        "xclogparser",
        Duration::from_secs(5),
        RetryPolicy::new(vec![Duration::ZERO; 6], 6),
        CapturingDiagnostics::new(),
    );
    let err = decoder.decode(Path::new("/x.xcactivitylog")).await.unwrap_err();
    assert!(matches!(err, Error::ExternalToolFailure { .. }));
}
