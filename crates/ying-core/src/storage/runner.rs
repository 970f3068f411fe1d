//! External command execution for CLI-backed storage queries.

use crate::{Result, YingError};
use std::io::ErrorKind;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Runs a program to completion and returns its stdout.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<String>;
}

/// Runs commands on the local system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

fn display_args(args: &[String]) -> String {
    args.iter()
        .map(|a| if a.contains(' ') { format!("\"{}\"", a) } else { a.clone() })
        .collect::<Vec<_>>()
        .join(" ")
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<String> {
        debug!(target: "ying::storage", "Running {} {}", program, display_args(args));
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                let message = if e.kind() == ErrorKind::NotFound {
                    format!("not found; make sure '{}' is installed and on PATH", program)
                } else {
                    e.to_string()
                };
                YingError::CommandFailed {
                    program: program.to_string(),
                    message,
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr.trim().to_string()
            };
            warn!(
                target: "ying::storage",
                "Command '{} {}' failed: {}",
                program,
                display_args(args),
                message
            );
            return Err(YingError::CommandFailed {
                program: program.to_string(),
                message,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
