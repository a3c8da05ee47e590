use crate::archiver::exec::{CommandRunner, CommandSpec};
use crate::archiver::timestamp::format_timestamp;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

pub fn bundle_name(prefix: &str, at: &NaiveDateTime) -> String {
    format!("{prefix}{}.tar", format_timestamp(at))
}

/// Tar `files` (names relative to `workdir`) into `workdir/<bundle>`.
pub fn create_bundle<R: CommandRunner + ?Sized>(
    runner: &R,
    tar_bin: &Path,
    workdir: &Path,
    bundle: &str,
    files: &[String],
) -> Result<PathBuf> {
    if files.is_empty() {
        anyhow::bail!("refusing to create empty diagnostic bundle {bundle}");
    }
    let spec = CommandSpec::new(tar_bin)
        .arg("cf")
        .arg(bundle)
        .args(files.iter().cloned())
        .current_dir(workdir);
    let out = runner
        .run(&spec)
        .with_context(|| format!("failed to bundle diagnostics into {bundle}"))?;
    if !out.success() {
        anyhow::bail!(
            "tar of diagnostic files failed (exit {})\nstdout: {}\nstderr: {}",
            out.describe_code(),
            out.stdout.trim(),
            out.stderr.trim()
        );
    }
    Ok(workdir.join(bundle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archiver::exec::{CommandOutcome, SystemRunner};
    use chrono::NaiveDate;
    use std::cell::RefCell;

    struct RecordingRunner {
        code: i32,
        calls: RefCell<Vec<CommandSpec>>,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
            self.calls.borrow_mut().push(spec.clone());
            Ok(CommandOutcome {
                code: Some(self.code),
                stdout: String::new(),
                stderr: "tar: boom".into(),
            })
        }
    }

    #[test]
    fn bundle_name_embeds_stamp() {
        let at = NaiveDate::from_ymd_opt(2014, 3, 12)
            .and_then(|d| d.and_hms_opt(9, 45, 31))
            .expect("instant");
        assert_eq!(bundle_name("diag_files_", &at), "diag_files_20140312_0945.tar");
    }

    #[test]
    fn tar_runs_in_workdir_with_all_files() {
        let runner = RecordingRunner {
            code: 0,
            calls: RefCell::new(Vec::new()),
        };
        let files = vec!["a_diag.out".to_string(), "b_diag.out".to_string()];
        let path = create_bundle(
            &runner,
            Path::new("tar"),
            Path::new("/scratch/run42"),
            "diag_files_20140312_0945.tar",
            &files,
        )
        .expect("bundle");

        assert_eq!(path, PathBuf::from("/scratch/run42/diag_files_20140312_0945.tar"));
        let calls = runner.calls.borrow();
        assert_eq!(
            calls[0].args,
            vec!["cf", "diag_files_20140312_0945.tar", "a_diag.out", "b_diag.out"]
        );
        assert_eq!(calls[0].cwd.as_deref(), Some(Path::new("/scratch/run42")));
    }

    #[test]
    fn failed_tar_surfaces_stderr() {
        let runner = RecordingRunner {
            code: 2,
            calls: RefCell::new(Vec::new()),
        };
        let err = create_bundle(
            &runner,
            Path::new("tar"),
            Path::new("/tmp"),
            "x.tar",
            &["a_diag.out".to_string()],
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("tar: boom"));
    }

    #[cfg(unix)]
    #[test]
    fn real_tar_produces_archive() {
        let Ok(tar) = which::which("tar") else {
            return;
        };
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("run_diag.out"), "t=1\n").expect("write");

        let path = create_bundle(
            &SystemRunner::default(),
            &tar,
            tmp.path(),
            "diag_files_20140312_0945.tar",
            &["run_diag.out".to_string()],
        )
        .expect("bundle");
        assert!(path.is_file());
    }
}
