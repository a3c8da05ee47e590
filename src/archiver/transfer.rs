//! Remote storage capability and backend selection.

use crate::archiver::config::TransferConfig;
use crate::archiver::exec::SystemRunner;
use crate::archiver::globus::GlobusTransfer;
use crate::error::ArchiveError;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// A remote storage tier that archived items are pushed to.
pub trait TransferClient {
    fn backend_name(&self) -> &'static str;

    /// Push `item` (relative to the working directory) to its remote location.
    fn send(&self, item: &str) -> Result<()>;

    /// Pull `item` back from the remote location into the working directory.
    fn receive(&self, item: &str) -> Result<()>;
}

impl<T: TransferClient + ?Sized> TransferClient for Box<T> {
    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }

    fn send(&self, item: &str) -> Result<()> {
        (**self).send(item)
    }

    fn receive(&self, item: &str) -> Result<()> {
        (**self).receive(item)
    }
}

/// Deterministic mapping from local items to remote paths:
/// `<remote_base>/<workdir basename>/<item>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    pub local_dir: PathBuf,
    pub local_base: String,
    pub remote_base: String,
}

impl RemoteLayout {
    pub fn new(local_dir: &Path, remote_base: &str) -> Result<Self> {
        let local_base = local_dir
            .file_name()
            .and_then(|s| s.to_str())
            .map(ToOwned::to_owned)
            .ok_or_else(|| {
                ArchiveError::Validation(format!(
                    "working directory {} has no usable basename",
                    local_dir.display()
                ))
            })?;
        let remote_base = remote_base.trim().trim_end_matches('/');
        if remote_base.is_empty() {
            return Err(ArchiveError::Validation("remote base directory is empty".into()).into());
        }
        Ok(Self {
            local_dir: local_dir.to_path_buf(),
            local_base,
            remote_base: remote_base.to_string(),
        })
    }

    pub fn local_path(&self, item: &str) -> String {
        format!("{}/{}", self.local_dir.display(), item)
    }

    pub fn remote_path(&self, item: &str) -> String {
        format!("{}/{}/{}", self.remote_base, self.local_base, item)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Globus,
}

impl BackendKind {
    pub fn parse(raw: &str) -> Result<Self, ArchiveError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "globus" => Ok(Self::Globus),
            other => Err(ArchiveError::Validation(format!(
                "unknown transfer backend `{other}`; supported: globus"
            ))),
        }
    }
}

pub fn build_client(
    cfg: &TransferConfig,
    workdir: &Path,
    remote_base: &str,
) -> Result<Box<dyn TransferClient>> {
    let layout = RemoteLayout::new(workdir, remote_base)?;
    match BackendKind::parse(&cfg.backend)? {
        BackendKind::Globus => {
            let runner = SystemRunner {
                timeout_secs: cfg.command_timeout_secs,
            };
            let client = GlobusTransfer::from_config(cfg, layout, runner)
                .context("failed to set up globus transfer backend")?;
            Ok(Box::new(client))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_path_nests_under_workdir_basename() {
        let layout = RemoteLayout::new(Path::new("/scratch/run42"), "/projects/sim/").expect("layout");
        assert_eq!(layout.local_base, "run42");
        assert_eq!(layout.remote_path("chk00010/"), "/projects/sim/run42/chk00010/");
        assert_eq!(layout.local_path("chk00010/"), "/scratch/run42/chk00010/");
    }

    #[test]
    fn empty_remote_base_is_rejected() {
        let err = RemoteLayout::new(Path::new("/scratch/run42"), "  ").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArchiveError>(),
            Some(ArchiveError::Validation(_))
        ));
    }

    #[test]
    fn backend_names_are_case_insensitive() {
        assert_eq!(BackendKind::parse("Globus").expect("parse"), BackendKind::Globus);
        assert!(matches!(
            BackendKind::parse("rsync"),
            Err(ArchiveError::Validation(_))
        ));
    }
}
