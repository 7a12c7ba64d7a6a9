//! JXA scripting bridge to Xcode via `osascript`

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use xcauto_common::{CommandRunner, CommandSpec, Error, Result};

/// Sends scripts to the scripting host and returns their trimmed output
#[derive(Clone)]
pub struct ScriptBridge {
    runner: Arc<dyn CommandRunner>,
    program: String,
    default_timeout: Duration,
}

impl ScriptBridge {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>, default_timeout: Duration) -> Self {
        Self {
            runner,
            program: program.into(),
            default_timeout,
        }
    }

    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        self.runner.clone()
    }

    /// Run a script with the default timeout
    pub async fn run(&self, script: &str) -> Result<String> {
        self.execute(script, self.default_timeout).await
    }

    pub async fn execute(&self, script: &str, timeout: Duration) -> Result<String> {
        let spec = CommandSpec::new(&self.program, timeout)
            .arg("-l")
            .arg("JavaScript")
            .arg("-e")
            .arg(script);
        debug!("Running script ({} bytes)", script.len());

        let output = self.runner.run(&spec).await?;
        if output.success() {
            return Ok(output.stdout.trim().to_string());
        }

        let stderr = output.stderr.trim();
        let message = if stderr.is_empty() {
            format!("exit code {:?}", output.exit_code)
        } else {
            stderr.to_string()
        };
        Err(Error::external("osascript", with_guidance(&message)))
    }
}

/// Append recovery hints for recognized failure signatures
pub fn with_guidance(message: &str) -> String {
    let lower = message.to_lowercase();
    let hint = if lower.contains("not running") || lower.contains("-600") {
        Some("Xcode is not running. Launch Xcode and open the project, then retry.")
    } else if lower.contains("not authorized")
        || lower.contains("-1743")
        || lower.contains("permission denied")
    {
        Some(
            "Automation permission denied. Allow this terminal to control Xcode in \
             System Settings > Privacy & Security > Automation.",
        )
    } else if lower.contains("can't get") || lower.contains("-1728") {
        Some("Xcode could not find the requested object. Make sure the project is open and has finished loading.")
    } else {
        None
    };

    match hint {
        Some(hint) => format!("{}\n{}", message, hint),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use test_case::test_case;
    use xcauto_common::CommandOutput;

    struct Canned {
        reply: CommandOutput,
        seen: Mutex<Option<CommandSpec>>,
    }

    #[async_trait]
    impl CommandRunner for Canned {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            *self.seen.lock().unwrap() = Some(spec.clone());
            Ok(self.reply.clone())
        }
    }

    fn bridge(reply: CommandOutput) -> (ScriptBridge, Arc<Canned>) {
        let canned = Arc::new(Canned {
            reply,
            seen: Mutex::new(None),
        });
        (
            ScriptBridge::new(canned.clone(), "osascript", Duration::from_secs(5)),
            canned,
        )
    }

    #[tokio::test]
    async fn test_success_is_trimmed_and_args_fixed() {
        let (bridge, canned) = bridge(CommandOutput::ok("  MyApp\n"));
        let out = bridge.run("Application('Xcode').name()").await.unwrap();
        assert_eq!(out, "MyApp");

        let spec = canned.seen.lock().unwrap().clone().unwrap();
        assert_eq!(spec.program, "osascript");
        assert_eq!(spec.args, vec!["-l", "JavaScript", "-e", "Application('Xcode').name()"]);
    }

    #[tokio::test]
    async fn test_failure_carries_stderr_and_hint() {
        let (bridge, _) = bridge(CommandOutput::failed(
            1,
            "execution error: Error: Application isn't running. (-600)",
        ));
        let err = bridge.run("x").await.unwrap_err();
        assert_eq!(err.code(), "external_tool_failure");
        assert!(err.to_string().contains("Launch Xcode"));
    }

    #[test_case("Not authorized to send Apple events to Xcode. (-1743)", "Automation permission" ; "automation")]
    #[test_case("Error: Can't get object. (-1728)", "finished loading" ; "missing object")]
    fn test_guidance(message: &str, expected: &str) {
        assert!(with_guidance(message).contains(expected));
    }

    #[test]
    fn test_unknown_message_unchanged() {
        assert_eq!(with_guidance("syntax error"), "syntax error");
    }
}
