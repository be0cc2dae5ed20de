use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::adapter::CommandSpec;
use crate::error::RunError;
use crate::output::{OutputEvent, OutputHub, OutputLine, OutputSource};

// ─── ProcessRunner ────────────────────────────────────────────────────────

/// Launches runner processes and streams their output into an [`OutputHub`].
///
/// One hub serves every run started through this runner; records carry the
/// run ID so subscribers can tell concurrent runs apart.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    hub: OutputHub,
    drain_timeout: Duration,
}

/// How long the readers may keep forwarding after the runner has exited.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(OutputHub::default())
    }
}

impl ProcessRunner {
    pub fn new(hub: OutputHub) -> Self {
        Self {
            hub,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Bound the wait for end of output once the runner has exited. A
    /// descendant that inherited the pipes can otherwise hold them open.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn hub(&self) -> &OutputHub {
        &self.hub
    }

    /// Run `spec` to completion.
    ///
    /// Two reader tasks, one per stream, publish each line as it arrives and
    /// a `Closed` event when their stream ends. The call returns once the
    /// child has exited and both readers have stopped, so every record of
    /// this run is published before it returns. Readers still open after the
    /// drain timeout are stopped.
    ///
    /// A token already cancelled on entry returns [`RunError::Cancelled`]
    /// without spawning anything. Cancellation after start kills the child,
    /// stops both readers, and also returns `Cancelled`.
    ///
    /// The run is marked finished on the hub on every return path.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        run_id: &str,
        spec: &CommandSpec,
    ) -> Result<(), RunError> {
        let result = self.run_child(cancel, run_id, spec).await;
        self.hub.finish(run_id);
        result
    }

    async fn run_child(
        &self,
        cancel: &CancellationToken,
        run_id: &str,
        spec: &CommandSpec,
    ) -> Result<(), RunError> {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| RunError::Launch {
            program: spec.program.clone(),
            source,
        })?;
        debug!(run_id, pid = ?child.id(), program = %spec.program, "runner started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr not captured"))?;

        let stop = cancel.child_token();
        let stdout_task = tokio::spawn(forward_lines(
            stdout,
            self.hub.clone(),
            run_id.to_string(),
            OutputSource::Stdout,
            stop.clone(),
        ));
        let stderr_task = tokio::spawn(forward_lines(
            stderr,
            self.hub.clone(),
            run_id.to_string(),
            OutputSource::Stderr,
            stop.clone(),
        ));

        let result = tokio::select! {
            status = child.wait() => match status {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(RunError::Exited { status }),
                Err(e) => Err(RunError::Io(e)),
            },
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!(run_id, error = %e, "failed to kill cancelled runner");
                }
                Err(RunError::Cancelled)
            }
        };

        let mut readers = Box::pin(async move { tokio::join!(stdout_task, stderr_task) });
        let (out, err) = match tokio::time::timeout(self.drain_timeout, &mut readers).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(run_id, timeout = ?self.drain_timeout, "output still open after runner exit, stopping readers");
                stop.cancel();
                readers.await
            }
        };
        for joined in [out, err] {
            if let Err(e) = joined {
                warn!(run_id, error = %e, "output reader task failed");
            }
        }

        debug!(run_id, ok = result.is_ok(), "runner finished");
        result
    }
}

/// Publish each line of `reader` until end of input or `stop`, then publish
/// the stream's `Closed` event.
///
/// Lines are split on `\n`, a trailing `\r` is dropped, and invalid UTF-8 is
/// replaced rather than ending the stream.
async fn forward_lines<R>(
    reader: R,
    hub: OutputHub,
    run_id: String,
    source: OutputSource,
    stop: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(reader).split(b'\n');
    loop {
        let next = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            next = segments.next_segment() => next,
        };
        match next {
            Ok(Some(mut bytes)) => {
                if bytes.last() == Some(&b'\r') {
                    bytes.pop();
                }
                hub.publish(OutputEvent::Line(OutputLine {
                    run_id: run_id.clone(),
                    source,
                    line: String::from_utf8_lossy(&bytes).into_owned(),
                }));
            }
            Ok(None) => break,
            Err(e) => {
                warn!(run_id = %run_id, source = source.as_str(), error = %e, "output read failed");
                break;
            }
        }
    }
    hub.publish(OutputEvent::Closed { run_id, source });
}

// ─── Tests ────────────────────────────────────────────────────────────────
