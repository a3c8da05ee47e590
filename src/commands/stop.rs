use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use crate::archiver::lock;
use crate::archiver::util::pid_alive;
use crate::commands::{CommandContext, CommandReport};

const STOP_TIMEOUT: Duration = Duration::from_secs(8);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// `kill -0` succeeds for zombies, so ask `ps` for the state too.
fn process_running(pid: u32) -> Result<bool> {
    if !pid_alive(pid) {
        return Ok(false);
    }
    let out = Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "stat="])
        .output()
        .context("failed to inspect process state with `ps`")?;
    if !out.status.success() {
        return Ok(false);
    }
    Ok(!String::from_utf8_lossy(&out.stdout).trim().starts_with('Z'))
}

fn process_command_line(pid: u32) -> Result<String> {
    let out = Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "command="])
        .output()
        .context("failed to inspect process command line with `ps`")?;
    if !out.status.success() {
        return Ok(String::new());
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

fn looks_like_watcher(command_line: &str) -> bool {
    command_line.contains("simarchive") && command_line.contains("watch")
}

fn send_sigterm(pid: u32) -> Result<()> {
    let status = Command::new("kill")
        .arg("-TERM")
        .arg(pid.to_string())
        .status()
        .context("failed to send SIGTERM with `kill -TERM`")?;
    if !status.success() && process_running(pid)? {
        anyhow::bail!("`kill -TERM {pid}` failed and process is still alive");
    }
    Ok(())
}

fn cleanup_lock_file(lock_path: &Path, report: &mut CommandReport) {
    match fs::remove_file(lock_path) {
        Ok(()) => report.detail(format!("removed lock {}", lock_path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => report.issue(format!(
            "failed to remove lock {}: {}",
            lock_path.display(),
            err
        )),
    }
}

pub fn run(ctx: &CommandContext) -> Result<CommandReport> {
    let mut report = CommandReport::new("stop");
    let lock_path = &ctx.paths.lock_file;
    report.detail(format!("lock_file={}", lock_path.display()));

    if !lock_path.exists() {
        report.detail("archiver already stopped (lock file not found)");
        return Ok(report);
    }

    let pid = match lock::read_payload(lock_path) {
        Ok(payload) => payload.pid,
        Err(err) => {
            report.issue(format!(
                "failed to read daemon pid from {}: {err:#}; remove it by hand if no archiver is running",
                lock_path.display()
            ));
            return Ok(report);
        }
    };
    report.detail(format!("daemon_pid={pid}"));

    if !process_running(pid)? {
        report.detail(format!("daemon pid {pid} is not running"));
        cleanup_lock_file(lock_path, &mut report);
        return Ok(report);
    }

    let command_line = process_command_line(pid)?;
    if !looks_like_watcher(&command_line) {
        report.issue(format!(
            "refusing to stop pid {pid}; command does not look like a simarchive watcher: {}",
            if command_line.is_empty() {
                "<unknown>"
            } else {
                command_line.as_str()
            }
        ));
        return Ok(report);
    }

    send_sigterm(pid)?;
    let deadline = Instant::now() + STOP_TIMEOUT;
    while Instant::now() < deadline {
        if !process_running(pid)? {
            report.detail(format!("stopped archiver pid={pid}"));
            // The daemon removes its own lock on SIGTERM; this covers a kill
            // that landed mid-exit.
            cleanup_lock_file(lock_path, &mut report);
            return Ok(report);
        }
        thread::sleep(STOP_POLL_INTERVAL);
    }

    report.issue(format!(
        "timed out waiting for archiver pid {pid} to stop after {}s",
        STOP_TIMEOUT.as_secs()
    ));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::looks_like_watcher;

    #[test]
    fn only_watch_invocations_are_signalled() {
        assert!(looks_like_watcher(
            "/usr/local/bin/simarchive watch /projects/sim"
        ));
        assert!(!looks_like_watcher("/usr/local/bin/simarchive status"));
        assert!(!looks_like_watcher("vim simarchive.toml"));
    }
}
