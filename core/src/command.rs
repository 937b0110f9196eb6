//! Execution of external diagnostic tools.

use crate::ExporterError;
use std::process::Command;
use tracing::{debug, warn};

/// Runs an external program and hands back its trimmed standard output.
///
/// Implementations must be shareable across collectors, which the
/// `prometheus` registry may drive from several threads.
pub trait CommandRunner: Send + Sync {
    /// Execute `program` with `args` and return stdout without its trailing
    /// newline.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned, exits
    /// unsuccessfully, or prints something that is not UTF-8.
    fn run(&self, program: &str, args: &[String]) -> Result<String, ExporterError>;
}

/// [`CommandRunner`] backed by [`std::process::Command`].
///
/// Arguments are passed as a list, never through a shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    /// Create a new system runner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<String, ExporterError> {
        debug!(program, ?args, "executing command");

        let output = Command::new(program).args(args).output().map_err(|e| {
            warn!(program, error = %e, "failed to spawn command");
            if e.kind() == std::io::ErrorKind::NotFound {
                ExporterError::unavailable(format!("{program} command not found"))
            } else {
                ExporterError::Io(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            warn!(program, status = %output.status, %stderr, "command failed");
            return Err(ExporterError::CommandFailed {
                program: program.to_owned(),
                status: output.status.to_string(),
                stderr,
            });
        }

        let stdout = String::from_utf8(output.stdout).map_err(|e| {
            warn!(program, "command printed invalid UTF-8");
            ExporterError::parse_with_source(format!("Invalid UTF-8 in {program} output"), e)
        })?;

        Ok(strip_trailing_newline(&stdout).to_owned())
    }
}

/// Remove one trailing line terminator (`\n` or `\r\n`).
#[must_use]
pub fn strip_trailing_newline(text: &str) -> &str {
    text.strip_suffix('\n')
        .map(|rest| rest.strip_suffix('\r').unwrap_or(rest))
        .unwrap_or(text)
}
