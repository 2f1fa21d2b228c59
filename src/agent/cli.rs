//! Claude Code CLI backend
//!
//! Runs `claude -p` with `stream-json` output and tools auto-approved. The
//! child is killed if the event stream is dropped before it exits.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use futures::{StreamExt, future, stream};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio_stream::wrappers::LinesStream;

use super::backend::{Backend, EventStream, TurnRequest};
use super::events::ProtocolEvent;
use crate::{Error, Result};

/// Default binary name looked up on `PATH`
pub const DEFAULT_BINARY: &str = "claude";

const STDERR_PREVIEW_CHARS: usize = 500;

/// Full tool-enabled backend driving the Claude Code CLI
#[derive(Debug, Clone)]
pub struct ClaudeCli {
    binary: PathBuf,
    cwd: PathBuf,
}

impl ClaudeCli {
    /// Use an explicit binary and working directory
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cwd: cwd.into(),
        }
    }

    /// Resolve `binary` (a path or a name on `PATH`)
    ///
    /// # Errors
    ///
    /// Returns error if the binary cannot be found
    pub fn locate(binary: &str, cwd: impl Into<PathBuf>) -> Result<Self> {
        let resolved = which::which(binary)
            .map_err(|e| Error::Backend(format!("claude binary \"{binary}\" not found: {e}")))?;
        tracing::debug!(binary = %resolved.display(), "claude cli located");
        Ok(Self::new(resolved, cwd))
    }

    /// Working directory the CLI runs in
    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Command-line arguments for a turn
    #[must_use]
    pub fn args(request: &TurnRequest) -> Vec<String> {
        let mut args: Vec<String> = [
            "-p",
            request.prompt.as_str(),
            "--dangerously-skip-permissions",
            "--output-format",
            "stream-json",
            "--verbose",
            "--include-partial-messages",
            "--append-system-prompt",
            request.system_prompt.as_str(),
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        if let Some(handle) = &request.continuity_handle {
            args.push("--resume".to_string());
            args.push(handle.clone());
        }
        if let Some(model) = &request.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args
    }
}

#[async_trait]
impl Backend for ClaudeCli {
    fn name(&self) -> &'static str {
        "claude-cli"
    }

    async fn run(&self, request: TurnRequest) -> Result<EventStream> {
        let mut child = Command::new(&self.binary)
            .args(Self::args(&request))
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Backend(format!("failed to start {}: {e}", self.binary.display()))
            })?;

        tracing::debug!(
            resume = request.continuity_handle.as_deref().unwrap_or_default(),
            model = request.model.as_deref().unwrap_or_default(),
            "claude cli started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Backend("claude cli stdout unavailable".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr));
        }

        let events = LinesStream::new(BufReader::new(stdout).lines()).flat_map(|line| {
            let items: Vec<Result<ProtocolEvent>> = match line {
                Ok(line) => match ProtocolEvent::decode_line(&line) {
                    Ok(events) => events.into_iter().map(Ok).collect(),
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping backend output");
                        Vec::new()
                    }
                },
                Err(e) => vec![Err(Error::Io(e))],
            };
            stream::iter(items)
        });

        let reap = stream::once(async move {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    tracing::warn!(%status, "claude cli exited with failure");
                }
                Err(e) => tracing::warn!(error = %e, "failed to reap claude cli"),
                Ok(_) => {}
            }
            None::<Result<ProtocolEvent>>
        })
        .filter_map(future::ready);

        Ok(Box::pin(events.chain(reap)))
    }
}

/// Log stderr only when it looks like a real failure
async fn drain_stderr(mut stderr: ChildStderr) {
    let mut output = String::new();
    if let Err(e) = stderr.read_to_string(&mut output).await {
        tracing::debug!(error = %e, "failed to read claude cli stderr");
        return;
    }

    let lower = output.to_lowercase();
    if ["error", "failed", "exception"].iter().any(|w| lower.contains(w)) {
        let preview: String = output.trim().chars().take(STDERR_PREVIEW_CHARS).collect();
        tracing::warn!(stderr = %preview, "claude cli reported an error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_for_first_turn() {
        let args = ClaudeCli::args(&TurnRequest {
            prompt: "what time is it".to_string(),
            system_prompt: "be brief".to_string(),
            continuity_handle: None,
            model: None,
        });
        assert_eq!(
            args,
            [
                "-p",
                "what time is it",
                "--dangerously-skip-permissions",
                "--output-format",
                "stream-json",
                "--verbose",
                "--include-partial-messages",
                "--append-system-prompt",
                "be brief",
            ]
        );
    }

    #[test]
    fn args_resume_with_model() {
        let args = ClaudeCli::args(&TurnRequest {
            prompt: "and now?".to_string(),
            system_prompt: String::new(),
            continuity_handle: Some("abc".to_string()),
            model: Some("claude-haiku-4-5".to_string()),
        });
        assert!(args.ends_with(&[
            "--resume".to_string(),
            "abc".to_string(),
            "--model".to_string(),
            "claude-haiku-4-5".to_string(),
        ]));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streams_events_from_child_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-claude");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             echo 'starting up'\n\
             echo '{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"<SPEAK>hi</SPEAK>\"}]}}'\n\
             echo '{\"type\":\"result\",\"subtype\":\"success\",\"session_id\":\"s1\",\"result\":\"<SPEAK>hi</SPEAK>\"}'\n",
        )
        .unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let backend = ClaudeCli::new(&script, dir.path());
        let events: Vec<ProtocolEvent> = backend
            .run(TurnRequest::default())
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            ProtocolEvent::Result { session_id: Some(s), .. } if s == "s1"
        ));
    }

    #[tokio::test]
    async fn missing_binary_is_a_backend_error() {
        let backend = ClaudeCli::new("/nonexistent/claude", ".");
        assert!(matches!(
            backend.run(TurnRequest::default()).await,
            Err(Error::Backend(_))
        ));
    }
}
