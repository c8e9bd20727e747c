//! Helper subprocess and its request/response loop.

use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::instrument::WithSubscriber;
use tracing::{Instrument, debug, warn};

use crate::protocol::{Operation, Request, Response};
use crate::{BridgeConfig, BridgeError, Result};

/// A running helper. Requests are answered strictly in order.
pub struct BridgeProcess {
    child: Option<Child>,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    request_timeout: Duration,
}

impl BridgeProcess {
    /// Start the helper described by `config`.
    pub fn spawn(config: &BridgeConfig) -> Result<Self> {
        debug!(command = %config.command, args = ?config.args, "Starting converter helper");

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref cwd) = config.cwd {
            cmd.current_dir(cwd);
        }

        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| BridgeError::Spawn {
            command: config.command.clone(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or(BridgeError::Closed)?;
        let stdout = child.stdout.take().ok_or(BridgeError::Closed)?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(
                async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        debug!(stderr = %line, "Converter helper stderr");
                    }
                }
                .in_current_span()
                .with_current_subscriber(),
            );
        }

        Ok(Self {
            child: Some(child),
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            request_timeout: config.request_timeout,
        })
    }

    /// Send `op` and wait for its result.
    pub async fn request(&mut self, op: Operation) -> Result<Value> {
        if self.child.is_none() {
            return Err(BridgeError::Closed);
        }

        let id = self.next_id;
        self.next_id += 1;
        let name = op.name();

        let line = serde_json::to_string(&Request { id, op })?;
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;

        let limit = self.request_timeout;
        let response = tokio::time::timeout(limit, self.read_response(id))
            .await
            .map_err(|_| BridgeError::Timeout(limit))??;

        if response.ok {
            debug!(op = name, id, "Helper request succeeded");
            Ok(response.result)
        } else {
            let message = response
                .error
                .unwrap_or_else(|| format!("{name} failed without a reason"));
            Err(BridgeError::Rejected(message))
        }
    }

    async fn read_response(&mut self, id: u64) -> Result<Response> {
        loop {
            let Some(line) = self.stdout.next_line().await? else {
                return Err(BridgeError::Exited);
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<Response>(trimmed) {
                Ok(response) if response.id == id => return Ok(response),
                Ok(response) => {
                    warn!(expected = id, got = response.id, "Ignoring stale helper response");
                }
                Err(_) => debug!(line = %trimmed, "Ignoring non-protocol helper output"),
            }
        }
    }

    /// Stop the helper. Safe to call more than once.
    pub async fn shutdown(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if child.try_wait()?.is_none() {
            child.kill().await?;
        }
        debug!("Converter helper terminated");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }
}
