//! Persisting step outputs.
//!
//! Whether a destination may be (re)written is decided by a `WritePolicy`,
//! so the executor loop never hard-codes the rule. Writes go through a temp
//! file in the destination directory and are renamed into place.
use crate::error::{FlowError, FlowResult};
use crate::util::display_path;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// What kind of payload is about to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Text,
    Structured,
}

pub trait WritePolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// `existing` is the destination's metadata, `None` when it does not exist.
    fn should_write(&self, existing: Option<&fs::Metadata>, kind: PayloadKind) -> bool;
}

/// Structured payloads always overwrite; free text only fills a destination
/// that is missing or empty, so content populated by another collaborator
/// survives a re-run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreserveExisting;

impl WritePolicy for PreserveExisting {
    fn name(&self) -> &'static str {
        "preserve-existing"
    }

    fn should_write(&self, existing: Option<&fs::Metadata>, kind: PayloadKind) -> bool {
        if kind == PayloadKind::Structured {
            return true;
        }
        match existing {
            // A directory is let through so the write itself reports the error.
            Some(meta) => meta.is_dir() || meta.len() == 0,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOverwrite;

impl WritePolicy for AlwaysOverwrite {
    fn name(&self) -> &'static str {
        "always-overwrite"
    }

    fn should_write(&self, _existing: Option<&fs::Metadata>, _kind: PayloadKind) -> bool {
        true
    }
}

/// Applies a policy and remembers every file it actually wrote.
pub struct OutputWriter<'a> {
    base_dir: &'a Path,
    policy: &'a dyn WritePolicy,
    written: Vec<String>,
}

impl<'a> OutputWriter<'a> {
    pub fn new(base_dir: &'a Path, policy: &'a dyn WritePolicy) -> Self {
        Self {
            base_dir,
            policy,
            written: Vec::new(),
        }
    }

    /// Write `contents` to `dest` if the policy allows it. Returns whether a
    /// write happened.
    pub async fn write(
        &mut self,
        dest: &Path,
        contents: &str,
        kind: PayloadKind,
    ) -> FlowResult<bool> {
        let existing = match tokio::fs::metadata(dest).await {
            Ok(meta) => Some(meta),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(FlowError::io(dest, err)),
        };
        if !self.policy.should_write(existing.as_ref(), kind) {
            tracing::info!(
                path = %dest.display(),
                policy = self.policy.name(),
                "destination already populated, leaving it untouched"
            );
            return Ok(false);
        }
        persist(dest.to_path_buf(), contents.as_bytes().to_vec()).await?;

        let shown = display_path(dest, Some(self.base_dir));
        tracing::info!(path = %shown, bytes = contents.len(), "wrote output");
        if !self.written.contains(&shown) {
            self.written.push(shown);
        }
        Ok(true)
    }

    pub fn into_written(self) -> Vec<String> {
        self.written
    }
}

/// `write_atomic` on the blocking pool, for callers on the async runtime.
pub async fn persist(dest: PathBuf, bytes: Vec<u8>) -> FlowResult<()> {
    let path = dest.clone();
    tokio::task::spawn_blocking(move || write_atomic(&dest, &bytes))
        .await
        .map_err(|err| FlowError::io(&path, std::io::Error::other(err)))?
}

pub fn write_atomic(dest: &Path, bytes: &[u8]) -> FlowResult<()> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|err| FlowError::io(&parent, err))?;
    let mut tmp =
        tempfile::NamedTempFile::new_in(&parent).map_err(|err| FlowError::io(&parent, err))?;
    tmp.write_all(bytes).map_err(|err| FlowError::io(dest, err))?;
    tmp.persist(dest).map_err(|err| FlowError::io(dest, err.error))?;
    Ok(())
}
