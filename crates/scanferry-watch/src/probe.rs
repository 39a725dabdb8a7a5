//! Open-handle probing through `lsof`.

use crate::error::{Error, Result};
use crate::poll::IntervalPoll;
use crate::traits::HandleProbe;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Name of the tool looked up on `PATH` when no explicit program is set.
pub const LSOF: &str = "lsof";

/// Probe backed by `lsof -w -F p <path>`.
///
/// `lsof` exits non-zero with nothing on stderr when no process has the file
/// open, which is read as "closed". A non-zero exit with diagnostics, or a
/// host without `lsof`, is an error: the caller must not upload on the
/// strength of a probe that did not actually run.
#[derive(Debug, Clone, Default)]
pub struct LsofProbe {
    program: Option<PathBuf>,
}

impl LsofProbe {
    /// Probe using the `lsof` found on `PATH` at call time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe using an explicit `lsof`-compatible program.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    fn resolve_program(&self) -> Result<PathBuf> {
        match &self.program {
            Some(program) => Ok(program.clone()),
            None => which::which(LSOF).map_err(|_| Error::ProbeUnavailable(LSOF.to_string())),
        }
    }

    /// Map a finished `lsof` run to open/closed/error.
    fn interpret(output: &Output) -> Result<bool> {
        if output.status.success() {
            return Ok(output.stdout.iter().any(|b| !b.is_ascii_whitespace()));
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if stderr.is_empty() {
            Ok(false)
        } else {
            Err(Error::Probe(format!("{} ({})", stderr, output.status)))
        }
    }
}

#[async_trait]
impl HandleProbe for LsofProbe {
    fn name(&self) -> &'static str {
        LSOF
    }

    async fn is_open(&self, path: &Path, cancel: &CancellationToken) -> Result<bool> {
        let program = self.resolve_program()?;
        let mut command = Command::new(&program);
        command.args(["-w", "-F", "p"]).arg(path).kill_on_drop(true);

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            output = command.output() => output.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ProbeUnavailable(program.display().to_string())
                } else {
                    Error::Io(e)
                }
            })?,
        };

        let open = Self::interpret(&output)?;
        debug!(path = %path.display(), open, "Probed open handles");
        Ok(open)
    }
}

/// Poll `probe` every `interval` until no process holds `path` open.
pub async fn wait_until_closed(
    probe: &dyn HandleProbe,
    path: &Path,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut poll = IntervalPoll::new(interval, cancel);
    loop {
        poll.tick().await?;
        if !probe.is_open(path, cancel).await? {
            return Ok(());
        }
        if poll.ticks() == 1 {
            info!(path = %path.display(), probe = probe.name(), "Waiting for file to be closed");
        }
    }
}
