//! File following for monitor jobs.
//!
//! One tailer task runs per job. It reads complete lines, matches them
//! against the job's rules under the job's read lock, then releases the lock
//! and pushes the extracted records. Pushes wait while a rule's queue is
//! full, so a lagging aggregator slows the tailer down instead of losing
//! records.
//!
//! A tailer notices rotation (the path now names a different file) and
//! truncation (the file shrank below the read offset) at end of file, and
//! reopens the path from the beginning. A path that disappears is waited
//! for. Any other I/O failure ends the task.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{TailStart, TailerConfig};
use crate::error::{LogMonError, Result};
use crate::rule::Rule;

/// A job's rule list, shared between the registry, tailer, and aggregator.
pub type SharedRules = Arc<RwLock<Vec<Rule>>>;

/// Handle to a running tailer task. Dropping the handle stops the task.
#[derive(Debug)]
pub struct TailerHandle {
    task: JoinHandle<()>,
}

impl TailerHandle {
    /// Returns false once the task has stopped or failed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the task. Records already extracted are not recalled.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for TailerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts following `path`, feeding lines to `rules`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_tailer(path: PathBuf, rules: SharedRules, config: TailerConfig) -> TailerHandle {
    let task = tokio::spawn(async move {
        info!(path = %path.display(), "tailer started");
        if let Err(e) = follow(&path, &rules, &config).await {
            error!(path = %path.display(), error = %e, "tailer stopped");
        }
    });
    TailerHandle { task }
}

struct OpenFile {
    reader: BufReader<File>,
    identity: Option<u64>,
    offset: u64,
}

impl OpenFile {
    async fn open(path: &Path, start: TailStart) -> Result<Self> {
        let mut file = File::open(path).await.map_err(LogMonError::tailer_io(path))?;
        let metadata = file.metadata().await.map_err(LogMonError::tailer_io(path))?;
        let offset = match start {
            TailStart::Beginning => 0,
            TailStart::End => file
                .seek(SeekFrom::End(0))
                .await
                .map_err(LogMonError::tailer_io(path))?,
        };

        Ok(Self {
            reader: BufReader::new(file),
            identity: file_identity(&metadata),
            offset,
        })
    }

    fn was_replaced(&self, current: &std::fs::Metadata) -> bool {
        let moved = match (self.identity, file_identity(current)) {
            (Some(ours), Some(theirs)) => ours != theirs,
            _ => false,
        };
        moved || current.len() < self.offset
    }
}

async fn follow(path: &Path, rules: &SharedRules, config: &TailerConfig) -> Result<()> {
    let mut current = OpenFile::open(path, config.start).await?;
    let mut buf = Vec::new();
    let mut oversized = false;

    loop {
        // At most one byte past the limit is buffered.
        let room = config
            .max_line_bytes
            .saturating_add(1)
            .saturating_sub(buf.len())
            .max(1);
        let read = (&mut current.reader)
            .take(room as u64)
            .read_until(b'\n', &mut buf)
            .await
            .map_err(LogMonError::tailer_io(path))?;

        if read > 0 {
            current.offset += read as u64;
            let complete = buf.last() == Some(&b'\n');
            if oversized || buf.len() > config.max_line_bytes {
                if !oversized {
                    warn!(
                        path = %path.display(),
                        limit = config.max_line_bytes,
                        "line exceeds length limit, dropped"
                    );
                }
                oversized = !complete;
                buf.clear();
            } else if complete {
                {
                    let line = String::from_utf8_lossy(&buf);
                    dispatch(rules, trim_line_ending(&line)).await;
                }
                buf.clear();
            }
            continue;
        }

        tokio::time::sleep(config.poll_interval).await;

        match tokio::fs::metadata(path).await {
            Ok(metadata) if current.was_replaced(&metadata) => {
                match OpenFile::open(path, TailStart::Beginning).await {
                    Ok(reopened) => {
                        info!(path = %path.display(), "file rotated or truncated, reopened");
                        current = reopened;
                        buf.clear();
                        oversized = false;
                    }
                    Err(e) if is_not_found(&e) => {
                        debug!(path = %path.display(), "file vanished while reopening");
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "file missing, waiting for it to reappear");
            }
            Err(e) => return Err(LogMonError::tailer_io(path)(e)),
        }
    }
}

async fn dispatch(rules: &SharedRules, line: &str) {
    let deliveries: Vec<_> = {
        let rules = rules.read();
        rules
            .iter()
            .filter_map(|rule| rule.extract(line).map(|record| (rule.queue().sender(), record)))
            .collect()
    };

    for (tx, record) in deliveries {
        if tx.send(record).await.is_err() {
            debug!("rule removed before delivery, record dropped");
        }
    }
}

fn trim_line_ending(line: &str) -> &str {
    line.strip_suffix('\n')
        .map_or(line, |l| l.strip_suffix('\r').unwrap_or(l))
}

fn is_not_found(err: &LogMonError) -> bool {
    matches!(
        err,
        LogMonError::TailerIo { source, .. } if source.kind() == std::io::ErrorKind::NotFound
    )
}

#[cfg(unix)]
fn file_identity(metadata: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ino())
}

#[cfg(not(unix))]
fn file_identity(_metadata: &std::fs::Metadata) -> Option<u64> {
    None
}
