//! Saved job configuration.
//!
//! The state file holds configuration only: paths, rule templates, tag keys
//! and last tag values, metric configs, and string fallbacks. Queue contents
//! and compiled patterns are never written. The encoding is CBOR inside a
//! small versioned envelope.

use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LogMonError, Result};
use crate::types::{MetricConfig, StringMapping};

/// Envelope format tag.
pub const STATE_FORMAT: &str = "claw-logmon/business-monitor";

/// Envelope version written by this build.
pub const STATE_VERSION: u32 = 1;

/// Saved configuration of one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRule {
    /// Rule template.
    pub regular: String,
    /// Tag keys in order.
    pub tags_key: Vec<String>,
    /// Last observed tag values, parallel to `tags_key`.
    pub tags_value: Vec<String>,
    /// Metric definitions.
    pub metric_config: Vec<MetricConfig>,
    /// String fallback table.
    pub string_map: Vec<StringMapping>,
}

/// Saved configuration of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedJob {
    /// Watched file path.
    pub path: String,
    /// Rules in evaluation order.
    pub rules: Vec<PersistedRule>,
}

/// Everything written to the state file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Jobs in registry order.
    pub jobs: Vec<PersistedJob>,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    format: String,
    version: u32,
    jobs: Vec<PersistedJob>,
}

impl PersistedState {
    /// Encodes the state as CBOR.
    ///
    /// # Errors
    ///
    /// Returns [`LogMonError::Persistence`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let envelope = Envelope {
            format: STATE_FORMAT.to_string(),
            version: STATE_VERSION,
            jobs: self.jobs.clone(),
        };
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&envelope, &mut bytes)
            .map_err(|e| LogMonError::Persistence(format!("encode: {e}")))?;
        Ok(bytes)
    }

    /// Decodes a state previously produced by [`Self::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`LogMonError::Persistence`] on malformed bytes or an unknown
    /// format or version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let envelope: Envelope = ciborium::de::from_reader(bytes)
            .map_err(|e| LogMonError::Persistence(format!("decode: {e}")))?;
        if envelope.format != STATE_FORMAT {
            return Err(LogMonError::Persistence(format!(
                "unexpected state format {:?}",
                envelope.format
            )));
        }
        if envelope.version != STATE_VERSION {
            return Err(LogMonError::Persistence(format!(
                "unsupported state version {}",
                envelope.version
            )));
        }
        Ok(Self {
            jobs: envelope.jobs,
        })
    }
}

/// Writes `state` to `path`, replacing any previous contents.
///
/// The bytes go to a uniquely named sibling temporary file first, which is
/// then renamed over `path`. Missing parent directories are created.
///
/// # Errors
///
/// Returns [`LogMonError::Persistence`] if encoding or any file operation fails.
pub fn save(path: &Path, state: &PersistedState) -> Result<()> {
    let bytes = state.to_bytes()?;

    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            std::fs::create_dir_all(parent).map_err(|e| io_error("create", parent, &e))?;
            parent
        }
        None => Path::new("."),
    };

    let mut prefix = path.file_name().unwrap_or_default().to_os_string();
    prefix.push(".tmp.");
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .tempfile_in(dir)
        .map_err(|e| io_error("create temp in", dir, &e))?;
    tmp.write_all(&bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| io_error("write", tmp.path(), &e))?;
    tmp.persist(path).map_err(|e| io_error("rename", path, &e.error))?;

    debug!(path = %path.display(), jobs = state.jobs.len(), bytes = bytes.len(), "state saved");
    Ok(())
}

/// Reads the state at `path`. A missing file yields an empty state.
///
/// # Errors
///
/// Returns [`LogMonError::Persistence`] if the file exists but cannot be read
/// or decoded.
pub fn load(path: &Path) -> Result<PersistedState> {
    match std::fs::read(path) {
        Ok(bytes) => PersistedState::from_bytes(&bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no saved state");
            Ok(PersistedState::default())
        }
        Err(e) => Err(io_error("read", path, &e)),
    }
}

fn io_error(op: &str, path: &Path, err: &std::io::Error) -> LogMonError {
    LogMonError::Persistence(format!("{op} {}: {err}", path.display()))
}
