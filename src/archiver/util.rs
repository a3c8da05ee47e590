use anyhow::{Context, Result};
use std::process::{Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before UNIX_EPOCH")?
        .as_secs())
}

pub fn pid_alive(pid: u32) -> bool {
    if cfg!(windows) {
        // The fs2 lock probe in `status` is authoritative there.
        true
    } else {
        let Ok(status) = Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .stderr(Stdio::null())
            .status()
        else {
            return false;
        };
        status.success()
    }
}
