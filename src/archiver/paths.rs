use crate::archiver::config::{ArchiverConfig, CategoryConfig};
use crate::error::ArchiveErrorCode;
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ArchivePaths {
    pub workdir: PathBuf,
    pub lock_file: PathBuf,
    pub audit_file: PathBuf,
}

impl ArchivePaths {
    pub fn new(workdir: &Path, cfg: &ArchiverConfig) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            lock_file: workdir.join(&cfg.layout.lock_file),
            audit_file: workdir.join(&cfg.layout.audit_file),
        }
    }

    pub fn processed_dir(&self, category: &CategoryConfig) -> PathBuf {
        self.workdir.join(&category.processed_dir)
    }

    pub fn ledger(&self, category: &CategoryConfig, cfg: &ArchiverConfig) -> PathBuf {
        self.processed_dir(category).join(&cfg.layout.ledger_file)
    }
}

/// `--workdir`, then `SIMARCHIVE_WORKDIR`, then the current directory, made
/// absolute so its basename can name the remote directory.
pub fn resolve_workdir(explicit: Option<&Path>) -> Result<PathBuf> {
    let raw = match explicit {
        Some(path) => path.to_path_buf(),
        None => match env::var("SIMARCHIVE_WORKDIR") {
            Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
            _ => env::current_dir().with_context(|| {
                format!(
                    "{}: current directory is unavailable",
                    ArchiveErrorCode::E005CwdInvalid.as_str()
                )
            })?,
        },
    };
    let canonical = raw.canonicalize().with_context(|| {
        format!(
            "{}: working directory {} is not accessible",
            ArchiveErrorCode::E005CwdInvalid.as_str(),
            raw.display()
        )
    })?;
    if !canonical.is_dir() {
        anyhow::bail!(
            "{}: working directory {} is not a directory",
            ArchiveErrorCode::E005CwdInvalid.as_str(),
            canonical.display()
        );
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ledgers_live_inside_processed_dirs() {
        let cfg = ArchiverConfig::default();
        let paths = ArchivePaths::new(Path::new("/scratch/run42"), &cfg);
        assert_eq!(
            paths.ledger(&cfg.checkpoints, &cfg),
            PathBuf::from("/scratch/run42/checkfiles/processed.out")
        );
        assert_eq!(paths.lock_file, PathBuf::from("/scratch/run42/simarchive.lock"));
    }

    #[test]
    fn explicit_workdir_is_canonicalized() {
        let tmp = tempdir().expect("tempdir");
        let nested = tmp.path().join("run42");
        std::fs::create_dir_all(&nested).expect("mkdir");
        let got = resolve_workdir(Some(&nested.join("."))).expect("resolve");
        assert_eq!(got.file_name().and_then(|s| s.to_str()), Some("run42"));
    }

    #[test]
    fn missing_workdir_reports_code() {
        let tmp = tempdir().expect("tempdir");
        let err = resolve_workdir(Some(&tmp.path().join("nope"))).unwrap_err();
        assert!(format!("{err:#}").contains("E005_CWD_INVALID"));
    }
}
