//! Child process transport for stdio MCP servers.
//!
//! Owns the child and its pipes. The executable is resolved via PATH and the
//! env overlay is merged onto the inherited environment, overlay winning on
//! key conflict. stderr is drained by a detached task so the child can never
//! block on writes to it.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use omnisearch_core::{OmniError, OmniResult};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Grace period between signaling termination and force-killing the child.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct ChildTransport {
    name: String,
    child: Mutex<Option<Child>>,
}

impl ChildTransport {
    /// Spawn the server child with piped stdio and start the stderr drain.
    ///
    /// Returns the transport plus the stdin/stdout handles the client drives.
    pub fn spawn(
        name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> OmniResult<(Self, ChildStdin, ChildStdout)> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            OmniError::Process(format!("failed to spawn '{command}': {e}"))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| OmniError::Process("child stdin not available".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OmniError::Process("child stdout not available".into()))?;

        if let Some(stderr) = child.stderr.take() {
            let source = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(source = %source, line = %line, "server stderr");
                }
            });
        }

        Ok((
            Self {
                name: name.to_string(),
                child: Mutex::new(Some(child)),
            },
            stdin,
            stdout,
        ))
    }

    /// Wait out the grace period for the child to exit, then force-kill.
    ///
    /// The caller is expected to have dropped the child's stdin first; EOF on
    /// stdin is the terminate signal for stdio MCP servers. Idempotent.
    pub async fn shutdown(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };

        match timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(source = %self.name, %status, "server child exited");
            }
            Ok(Err(e)) => {
                warn!(source = %self.name, error = %e, "failed waiting on server child");
                let _ = child.kill().await;
            }
            Err(_) => {
                warn!(source = %self.name, "server child did not exit in time, killing");
                let _ = child.kill().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_nonexistent_command_fails() {
        let err = ChildTransport::spawn(
            "test",
            "/nonexistent/mcp-server-binary",
            &[],
            &HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, OmniError::Process(_)));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (transport, stdin, _stdout) =
            ChildTransport::spawn("test", "cat", &[], &HashMap::new()).unwrap();

        drop(stdin);
        transport.shutdown().await;
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_env_overlay_reaches_child() {
        let mut env = HashMap::new();
        env.insert("OMNI_TEST_MARKER".to_string(), "overlay".to_string());

        let (transport, stdin, stdout) = ChildTransport::spawn(
            "test",
            "sh",
            &["-c".to_string(), "printf '%s\\n' \"$OMNI_TEST_MARKER\"".to_string()],
            &env,
        )
        .unwrap();

        drop(stdin);
        let mut lines = BufReader::new(stdout).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, "overlay");
        transport.shutdown().await;
    }
}
