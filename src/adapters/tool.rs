// External tool process management
// Spawns the configured bioinformatics tools and turns a bad exit into an
// error message carrying the stderr tail.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::error::AdapterError;

const STDERR_TAIL_BYTES: usize = 2048;

/// Run `command` (program + leading args from configuration) with
/// `extra_args` appended. Succeeds only on exit code 0.
pub async fn run_tool(command: &[String], extra_args: &[String]) -> Result<(), AdapterError> {
    let (program, leading) = command
        .split_first()
        .ok_or_else(|| AdapterError::Tool("Empty tool command".to_string()))?;

    let mut cmd = Command::new(program);
    cmd.args(leading)
        .args(extra_args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    log::debug!("Spawning tool: {} {:?} {:?}", program, leading, extra_args);

    let mut child = cmd
        .spawn()
        .map_err(|e| AdapterError::Tool(format!("Failed to spawn {}: {}", program, e)))?;

    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        let _ = pipe.read_to_string(&mut stderr).await;
    }

    let status = child
        .wait()
        .await
        .map_err(|e| AdapterError::Tool(format!("Failed to wait for {}: {}", program, e)))?;

    if !status.success() {
        let code = status.code().unwrap_or(-1);
        let tail = stderr_tail(&stderr);
        return Err(AdapterError::Tool(format!(
            "{} exited with code {}: {}",
            program, code, tail
        )));
    }

    Ok(())
}

fn stderr_tail(stderr: &str) -> &str {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed;
    }
    let start = trimmed.len() - STDERR_TAIL_BYTES;
    // Stay on a char boundary
    let mut start = start;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    &trimmed[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command() {
        let command = vec!["true".to_string()];
        assert!(run_tool(&command, &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_command_reports_code() {
        let command = vec!["false".to_string()];
        let err = run_tool(&command, &[]).await.unwrap_err();
        match err {
            AdapterError::Tool(msg) => assert!(msg.contains("exited with code")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let command = vec!["definitely-not-a-real-binary-xyz".to_string()];
        let err = run_tool(&command, &[]).await.unwrap_err();
        match err {
            AdapterError::Tool(msg) => assert!(msg.contains("Failed to spawn")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_stderr_tail_truncates() {
        let long = "x".repeat(5000);
        assert_eq!(stderr_tail(&long).len(), STDERR_TAIL_BYTES);
        assert_eq!(stderr_tail("short"), "short");
    }
}
