use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{ProviderError, ProviderResult};

const STDERR_TAIL: usize = 2000;

/// Run an external tool to completion and return its stdout. A missing binary
/// is `Unavailable`; a non-zero exit is `Failed` with the tail of stderr.
pub(crate) async fn run_tool(
    program: &str,
    args: &[&str],
    stdin: Option<&[u8]>,
) -> ProviderResult<Vec<u8>> {
    debug!(program, ?args, "running tool");

    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ProviderError::Unavailable(format!("{program}: {e}"))
            }
            _ => ProviderError::Transient(format!("{program}: failed to start: {e}")),
        })?;

    // Feed stdin while stdout is drained so a tool that streams output
    // cannot stall on a full pipe.
    let pipe = child.stdin.take();
    let feed = async move {
        if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
            pipe.write_all(input).await?;
            pipe.shutdown().await?;
        }
        Ok::<_, std::io::Error>(())
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());

    let output = output.map_err(|e| ProviderError::Transient(format!("{program}: {e}")))?;
    if let Err(e) = fed {
        // A tool that exits without reading all input closes the pipe early;
        // its exit status below is what matters then.
        if output.status.success() {
            return Err(ProviderError::Transient(format!("{program}: stdin: {e}")));
        }
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr
            .chars()
            .rev()
            .take(STDERR_TAIL)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        return Err(ProviderError::Failed(format!(
            "{program} exited with {}: {}",
            output.status,
            tail.trim()
        )));
    }

    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let result = run_tool("siteproof-no-such-tool", &[], None).await;
        assert!(matches!(result, Err(ProviderError::Unavailable(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdin_is_forwarded() {
        let out = run_tool("cat", &[], Some(b"piped")).await.unwrap();
        assert_eq!(out, b"piped");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_stdin_with_streaming_output() {
        let input = vec![b'x'; 1 << 20];
        let out = run_tool("cat", &[], Some(&input)).await.unwrap();
        assert_eq!(out.len(), input.len());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let result = run_tool("sh", &["-c", "echo broken >&2; exit 3"], None).await;
        match result {
            Err(ProviderError::Failed(msg)) => assert!(msg.contains("broken")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
