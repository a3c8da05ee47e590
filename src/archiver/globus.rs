//! Globus CLI backend, driven over ssh.
//!
//! Every control-channel call is `ssh <control_host> <command...>`. Transfers
//! are submitted under a task id generated up front, so a resubmission after a
//! dropped connection is recognised by Globus as the same transfer and
//! converges instead of duplicating data.

use crate::archiver::config::TransferConfig;
use crate::archiver::exec::{CommandOutcome, CommandRunner, CommandSpec, resolve_bin};
use crate::archiver::transfer::{RemoteLayout, TransferClient};
use crate::archiver::warn::{self, WarnEvent};
use crate::error::ArchiveError;
use anyhow::Result;
use std::path::PathBuf;

pub const BACKEND_NAME: &str = "globus";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const SSH_TRANSIENT_EXIT: i32 = 255;

/// Globus `-s` sync levels. Archiving always uses `Checksum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncLevel {
    Missing = 0,
    Size = 1,
    Mtime = 2,
    Checksum = 3,
}

impl SyncLevel {
    pub fn from_level(level: u8) -> Result<Self, ArchiveError> {
        match level {
            0 => Ok(Self::Missing),
            1 => Ok(Self::Size),
            2 => Ok(Self::Mtime),
            3 => Ok(Self::Checksum),
            other => Err(ArchiveError::Validation(format!(
                "sync level must be 0..=3, got {other}"
            ))),
        }
    }

    pub fn as_arg(self) -> String {
        (self as u8).to_string()
    }
}

#[derive(Debug, Clone)]
pub struct GlobusSettings {
    pub ssh_bin: PathBuf,
    pub control_host: String,
    pub local_endpoint: String,
    pub storage_endpoint: String,
    pub sync_level: SyncLevel,
    pub max_attempts: u32,
    pub transient_exit_code: i32,
}

impl Default for GlobusSettings {
    fn default() -> Self {
        Self {
            ssh_bin: PathBuf::from("ssh"),
            control_host: "cli.globusonline.org".to_string(),
            local_endpoint: "ncsa#BlueWaters".to_string(),
            storage_endpoint: "ncsa#Nearline".to_string(),
            sync_level: SyncLevel::Checksum,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            transient_exit_code: SSH_TRANSIENT_EXIT,
        }
    }
}

/// What a submission looks like once the item has been classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub item: String,
    pub recursive: bool,
    pub source: String,
    pub destination: String,
    pub label: String,
}

/// Globus labels reject `.` and `/`.
pub fn task_label(item: &str) -> String {
    format!("Archive {item}").replace('.', "-").replace('/', "")
}

pub struct GlobusTransfer<R> {
    settings: GlobusSettings,
    layout: RemoteLayout,
    runner: R,
}

impl<R: CommandRunner> GlobusTransfer<R> {
    pub fn new(settings: GlobusSettings, layout: RemoteLayout, runner: R) -> Self {
        Self {
            settings,
            layout,
            runner,
        }
    }

    pub fn from_config(cfg: &TransferConfig, layout: RemoteLayout, runner: R) -> Result<Self> {
        let settings = GlobusSettings {
            ssh_bin: resolve_bin(&cfg.ssh_bin)?,
            control_host: cfg.control_host.clone(),
            local_endpoint: cfg.local_endpoint.clone(),
            storage_endpoint: cfg.storage_endpoint.clone(),
            sync_level: SyncLevel::from_level(cfg.sync_level)?,
            max_attempts: cfg.max_attempts,
            transient_exit_code: cfg.transient_exit_code,
        };
        Ok(Self::new(settings, layout, runner))
    }

    fn control(&self) -> CommandSpec {
        CommandSpec::new(&self.settings.ssh_bin).arg(&self.settings.control_host)
    }

    /// Ask Globus for a fresh task id. Any failed call is retried up to the
    /// attempt bound.
    pub fn generate_task_id(&self) -> Result<String> {
        let spec = self.control().args(["transfer", "--generate-id"]);
        let mut last: Option<CommandOutcome> = None;

        for attempt in 1..=self.settings.max_attempts {
            let out = self.runner.run(&spec)?;
            let id = out.stdout.replace('\n', "").trim().to_string();
            if out.success() && !id.is_empty() {
                tracing::debug!(task_id = %id, attempt, "generated globus task id");
                return Ok(id);
            }
            warn::emit(WarnEvent {
                code: "TASK_ID_FAILED",
                stage: "transfer",
                action: "generate-id",
                item: "-",
                retry: &format!("{attempt}/{}", self.settings.max_attempts),
                reason: "generate-id-nonzero-or-empty",
                err: &format!("exit={} {}", out.describe_code(), out.stderr.trim()),
            });
            last = Some(out);
        }

        let stderr = last.map(|o| o.stderr.trim().to_string()).unwrap_or_default();
        Err(ArchiveError::BackendUnavailable(format!(
            "failed to generate a task id after {} attempts; make sure all endpoints are activated: {stderr}",
            self.settings.max_attempts
        ))
        .into())
    }

    pub fn prepare(&self, item: &str) -> Result<TransferRequest> {
        let item = item.trim_start_matches("./");
        let local = self.layout.local_dir.join(item.trim_end_matches('/'));
        let (item, recursive) = if local.is_dir() {
            let item = if item.ends_with('/') {
                item.to_string()
            } else {
                format!("{item}/")
            };
            (item, true)
        } else if local.is_file() {
            (item.to_string(), false)
        } else {
            return Err(ArchiveError::Validation(format!(
                "{} is neither a local file nor a directory",
                local.display()
            ))
            .into());
        };

        Ok(TransferRequest {
            source: format!(
                "{}{}",
                self.settings.local_endpoint,
                self.layout.local_path(&item)
            ),
            destination: format!(
                "{}{}",
                self.settings.storage_endpoint,
                self.layout.remote_path(&item)
            ),
            label: task_label(&item),
            recursive,
            item,
        })
    }

    fn submit_spec(&self, task_id: &str, req: &TransferRequest) -> CommandSpec {
        let mut spec = self.control().args([
            "transfer".to_string(),
            "--verify-checksum".to_string(),
            format!("--taskid={task_id}"),
            // Quoted for the remote shell that ssh hands the line to.
            format!("--label=\"{}\"", req.label),
            "-s".to_string(),
            self.settings.sync_level.as_arg(),
            "--".to_string(),
            req.source.clone(),
            req.destination.clone(),
        ]);
        if req.recursive {
            spec = spec.arg("-r");
        }
        spec
    }

    /// Submit under `task_id`, retrying only the transient ssh exit code.
    pub fn submit(&self, task_id: &str, req: &TransferRequest) -> Result<()> {
        let spec = self.submit_spec(task_id, req);
        tracing::debug!(command = %spec, "submitting transfer");

        for attempt in 1..=self.settings.max_attempts {
            let out = self.runner.run(&spec)?;
            match out.code {
                Some(0) => {
                    tracing::debug!(task_id, item = %req.item, "transfer successfully established");
                    return Ok(());
                }
                Some(code) if code == self.settings.transient_exit_code => {
                    warn::emit(WarnEvent {
                        code: "SSH_TRANSIENT",
                        stage: "transfer",
                        action: "submit",
                        item: &req.item,
                        retry: &format!("{attempt}/{}", self.settings.max_attempts),
                        reason: "ssh-connection-error",
                        err: out.stderr.trim(),
                    });
                }
                _ => {
                    return Err(ArchiveError::Backend(format!(
                        "transfer of {} failed fatally (exit {}); make sure endpoints are activated\nstdout: {}\nstderr: {}",
                        req.item,
                        out.describe_code(),
                        out.stdout.trim(),
                        out.stderr.trim()
                    ))
                    .into());
                }
            }
        }

        Err(ArchiveError::BackendUnavailable(format!(
            "failed to submit transfer of {} after {} attempts",
            req.item, self.settings.max_attempts
        ))
        .into())
    }

    /// Block until Globus reports the task finished. Never retried: a
    /// half-applied transfer must surface.
    pub fn wait(&self, task_id: &str) -> Result<()> {
        let spec = self.control().args(["wait", task_id]);
        let out = self.runner.run(&spec)?;
        if out.success() {
            return Ok(());
        }
        Err(ArchiveError::Backend(format!(
            "globus wait failed on task {task_id} (exit {})\nstdout: {}\nstderr: {}",
            out.describe_code(),
            out.stdout.trim(),
            out.stderr.trim()
        ))
        .into())
    }
}

impl<R: CommandRunner> TransferClient for GlobusTransfer<R> {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn send(&self, item: &str) -> Result<()> {
        let req = self.prepare(item)?;
        let task_id = self.generate_task_id()?;
        self.submit(&task_id, &req)?;
        self.wait(&task_id)?;
        tracing::info!(
            task_id = %task_id,
            item = %req.item,
            destination = %req.destination,
            "archived to remote storage"
        );
        Ok(())
    }

    fn receive(&self, _item: &str) -> Result<()> {
        Err(ArchiveError::NotImplemented {
            backend: BACKEND_NAME,
            operation: "receive",
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    #[derive(Default)]
    struct ScriptedRunner {
        replies: RefCell<VecDeque<CommandOutcome>>,
        calls: RefCell<Vec<CommandSpec>>,
    }

    impl ScriptedRunner {
        fn reply(self, code: i32, stdout: &str) -> Self {
            self.replies.borrow_mut().push_back(CommandOutcome {
                code: Some(code),
                stdout: stdout.to_string(),
                stderr: String::new(),
            });
            self
        }

        fn calls_matching(&self, needle: &str) -> Vec<CommandSpec> {
            self.calls
                .borrow()
                .iter()
                .filter(|c| c.args.iter().any(|a| a == needle))
                .cloned()
                .collect()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
            self.calls.borrow_mut().push(spec.clone());
            self.replies
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("unexpected command: {spec}"))
        }
    }

    fn workdir() -> (TempDir, RemoteLayout) {
        let tmp = tempdir().expect("tempdir");
        let run = tmp.path().join("run42");
        fs::create_dir_all(run.join("chk00010")).expect("mkdir item");
        fs::write(run.join("chk00010/HEADER"), "hdr").expect("header");
        fs::write(run.join("diag_files_20140312_0945.tar"), "tar").expect("bundle");
        let layout = RemoteLayout::new(&run, "/projects/sim").expect("layout");
        (tmp, layout)
    }

    fn client(layout: RemoteLayout, runner: &ScriptedRunner) -> GlobusTransfer<&ScriptedRunner> {
        GlobusTransfer::new(GlobusSettings::default(), layout, runner)
    }

    #[test]
    fn label_strips_dots_and_slashes() {
        assert_eq!(task_label("chk00010/"), "Archive chk00010");
        assert_eq!(
            task_label("diag_files_20140312_0945.tar"),
            "Archive diag_files_20140312_0945-tar"
        );
    }

    #[test]
    fn directories_are_slash_terminated_and_recursive() {
        let (_tmp, layout) = workdir();
        let local_dir = layout.local_dir.display().to_string();
        let runner = ScriptedRunner::default();
        let req = client(layout, &runner).prepare("chk00010").expect("prepare");

        assert!(req.recursive);
        assert_eq!(req.item, "chk00010/");
        assert_eq!(req.source, format!("ncsa#BlueWaters{local_dir}/chk00010/"));
        assert_eq!(req.destination, "ncsa#Nearline/projects/sim/run42/chk00010/");
    }

    #[test]
    fn plain_files_are_not_recursive() {
        let (_tmp, layout) = workdir();
        let runner = ScriptedRunner::default();
        let req = client(layout, &runner)
            .prepare("diag_files_20140312_0945.tar")
            .expect("prepare");
        assert!(!req.recursive);
        assert_eq!(
            req.destination,
            "ncsa#Nearline/projects/sim/run42/diag_files_20140312_0945.tar"
        );
    }

    #[test]
    fn missing_item_is_validation_error_without_commands() {
        let (_tmp, layout) = workdir();
        let runner = ScriptedRunner::default();
        let err = client(layout, &runner).send("chk99999").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArchiveError>(),
            Some(ArchiveError::Validation(_))
        ));
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn transient_submission_failures_reuse_one_task_id() {
        let (_tmp, layout) = workdir();
        let runner = ScriptedRunner::default()
            .reply(0, "task-abc\n")
            .reply(255, "")
            .reply(255, "")
            .reply(0, "")
            .reply(0, "");

        client(layout, &runner).send("chk00010").expect("send succeeds");

        assert_eq!(runner.calls_matching("--generate-id").len(), 1);
        let submissions = runner.calls_matching("--verify-checksum");
        assert_eq!(submissions.len(), 3);
        for sub in &submissions {
            assert!(sub.args.contains(&"--taskid=task-abc".to_string()));
            assert!(sub.args.contains(&"--label=\"Archive chk00010\"".to_string()));
            assert_eq!(sub.args.last().map(String::as_str), Some("-r"));
        }
        let waits = runner.calls_matching("wait");
        assert_eq!(waits.len(), 1);
        assert_eq!(waits[0].args, vec!["cli.globusonline.org", "wait", "task-abc"]);
        assert!(runner.replies.borrow().is_empty());
    }

    #[test]
    fn fatal_submission_error_is_not_retried() {
        let (_tmp, layout) = workdir();
        let runner = ScriptedRunner::default().reply(0, "task-abc\n").reply(1, "denied");

        let err = client(layout, &runner).send("chk00010").unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ArchiveError>(),
            Some(ArchiveError::Backend(_))
        ));
        assert_eq!(runner.calls_matching("--verify-checksum").len(), 1);
        assert!(runner.calls_matching("wait").is_empty());
    }

    #[test]
    fn exhausted_transient_retries_report_backend_unavailable() {
        let (_tmp, layout) = workdir();
        let runner = ScriptedRunner::default()
            .reply(0, "task-abc\n")
            .reply(255, "")
            .reply(255, "")
            .reply(255, "")
            .reply(255, "");

        let err = client(layout, &runner).send("chk00010").unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ArchiveError>(),
            Some(ArchiveError::BackendUnavailable(_))
        ));
        assert_eq!(runner.calls_matching("--verify-checksum").len(), 4);
    }

    #[test]
    fn task_id_generation_gives_up_after_four_attempts() {
        let (_tmp, layout) = workdir();
        let runner = ScriptedRunner::default()
            .reply(255, "")
            .reply(1, "")
            .reply(255, "")
            .reply(0, "\n");

        let err = client(layout, &runner).send("chk00010").unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ArchiveError>(),
            Some(ArchiveError::BackendUnavailable(_))
        ));
        assert_eq!(runner.calls.borrow().len(), 4);
    }

    #[test]
    fn task_id_generation_recovers_within_bound() {
        let (_tmp, layout) = workdir();
        let runner = ScriptedRunner::default().reply(255, "").reply(0, "task-xyz\n");
        let id = client(layout, &runner).generate_task_id().expect("id");
        assert_eq!(id, "task-xyz");
    }

    #[test]
    fn failed_wait_is_fatal() {
        let (_tmp, layout) = workdir();
        let runner = ScriptedRunner::default()
            .reply(0, "task-abc\n")
            .reply(0, "")
            .reply(1, "");

        let err = client(layout, &runner).send("chk00010").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArchiveError>(),
            Some(ArchiveError::Backend(_))
        ));
        assert_eq!(runner.calls.borrow().len(), 3);
    }

    #[test]
    fn receive_is_not_implemented() {
        let (_tmp, layout) = workdir();
        let runner = ScriptedRunner::default();
        let err = client(layout, &runner).receive("chk00010").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArchiveError>(),
            Some(ArchiveError::NotImplemented { .. })
        ));
    }
}
