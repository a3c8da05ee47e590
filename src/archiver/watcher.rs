use crate::archiver::audit;
use crate::archiver::config::ArchiverConfig;
use crate::archiver::exec::{CommandRunner, SystemRunner, resolve_bin};
use crate::archiver::paths::ArchivePaths;
use crate::archiver::pipeline::{Archiver, CycleOutcome};
use crate::archiver::transfer::{TransferClient, build_client};
use anyhow::{Context, Result};
use std::thread;
use std::time::Duration;

pub type DaemonArchiver = Archiver<Box<dyn TransferClient>, SystemRunner>;

#[derive(Debug, Clone)]
pub struct WatchCycleOutcome {
    pub cycle: u64,
    pub found_work: bool,
    pub archived: CycleOutcome,
}

pub fn build_archiver(
    cfg: &ArchiverConfig,
    paths: &ArchivePaths,
    remote_base: &str,
) -> Result<DaemonArchiver> {
    let transfer = build_client(&cfg.transfer, &paths.workdir, remote_base)?;
    let mut cfg = cfg.clone();
    cfg.transfer.tar_bin = resolve_bin(&cfg.transfer.tar_bin)
        .context("failed to locate tar for diagnostic bundles")?;
    Ok(Archiver::new(
        cfg,
        paths.clone(),
        transfer,
        SystemRunner::default(),
    ))
}

pub fn run_cycle<T: TransferClient, R: CommandRunner>(
    archiver: &Archiver<T, R>,
    cycle: u64,
) -> Result<WatchCycleOutcome> {
    if !archiver.has_pending_work()? {
        tracing::debug!(cycle, "found no new files");
        return Ok(WatchCycleOutcome {
            cycle,
            found_work: false,
            archived: CycleOutcome::default(),
        });
    }

    tracing::info!(cycle, "found new files");
    let archived = archiver.archive_pending()?;
    audit::append_event(
        &archiver.paths().audit_file,
        "watcher",
        "ok",
        &format!(
            "cycle={} archived={} bundle={}",
            cycle,
            archived.archived_count(),
            archived.diag_bundle.as_deref().unwrap_or("-")
        ),
    )?;
    Ok(WatchCycleOutcome {
        cycle,
        found_work: true,
        archived,
    })
}

/// Poll until a cycle fails; the error ends the daemon.
pub fn run_daemon<T: TransferClient, R: CommandRunner>(
    archiver: &Archiver<T, R>,
    poll_interval_secs: u64,
) -> Result<()> {
    let sleep_for = Duration::from_secs(poll_interval_secs);
    let mut cycle = 0u64;
    loop {
        cycle += 1;
        let outcome = run_cycle(archiver, cycle)?;
        if outcome.found_work {
            tracing::info!(
                cycle,
                archived = outcome.archived.archived_count(),
                "cycle complete"
            );
        }
        thread::sleep(sleep_for);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn fake_bin(dir: &std::path::Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\nexit 0\n").expect("write fake bin");
        path
    }

    #[test]
    fn missing_tar_is_reported_before_any_cycle() {
        let tmp = tempdir().expect("tempdir");
        let mut cfg = ArchiverConfig::default();
        cfg.transfer.ssh_bin = fake_bin(tmp.path(), "ssh");
        cfg.transfer.tar_bin = tmp.path().join("no-such-tar");
        let paths = ArchivePaths::new(tmp.path(), &cfg);

        let err = build_archiver(&cfg, &paths, "/projects/sim")
            .err()
            .expect("missing tar must fail");
        assert!(format!("{err:#}").contains("failed to locate tar"));
    }

    #[test]
    fn configured_tar_file_is_accepted() {
        let tmp = tempdir().expect("tempdir");
        let mut cfg = ArchiverConfig::default();
        cfg.transfer.ssh_bin = fake_bin(tmp.path(), "ssh");
        cfg.transfer.tar_bin = fake_bin(tmp.path(), "tar");
        let paths = ArchivePaths::new(tmp.path(), &cfg);

        build_archiver(&cfg, &paths, "/projects/sim").expect("archiver");
    }
}
