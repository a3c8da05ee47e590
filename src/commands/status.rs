use anyhow::Result;
use std::env;

use crate::archiver::audit;
use crate::archiver::ledger::load_processed;
use crate::archiver::lock;
use crate::archiver::pipeline::Category;
use crate::archiver::util::pid_alive;
use crate::commands::{CommandContext, CommandReport};

mod generated {
    include!(concat!(env!("OUT_DIR"), "/simarchive_env_allowlist.rs"));
}

fn report_lock(ctx: &CommandContext, report: &mut CommandReport) {
    let lock_path = &ctx.paths.lock_file;
    if !lock_path.exists() {
        report.detail("daemon.lock=not_found (daemon likely not running)");
        return;
    }

    let payload = match lock::read_payload(lock_path) {
        Ok(payload) => payload,
        Err(err) => {
            report.issue(format!("daemon.lock=corrupt ({err:#})"));
            return;
        }
    };
    report.detail("daemon.lock=found");
    report.detail(format!("daemon.pid={}", payload.pid));
    report.detail(format!("daemon.start_time={}", payload.start_time));
    report.detail(format!("daemon.remote_base={}", payload.remote_base));

    if pid_alive(payload.pid) {
        report.detail("daemon.process=alive");
    } else {
        report.issue("daemon.process=dead (stale lock; run `simarchive stop`)");
    }
    match lock::is_held(lock_path) {
        Ok(true) => report.detail("daemon.flock=held"),
        Ok(false) => report.detail("daemon.flock=free"),
        Err(err) => report.detail(format!("daemon.flock=unknown ({err:#})")),
    }

    let current = env!("BUILD_UUID");
    if payload.build_uuid == current {
        report.detail("daemon.build_match=ok");
    } else {
        report.issue(format!(
            "daemon.build_mismatch=found (lock={} current={})",
            payload.build_uuid, current
        ));
    }
}

pub fn run(ctx: &CommandContext) -> Result<CommandReport> {
    let mut report = CommandReport::new("status");
    report.detail(format!("workdir={}", ctx.workdir.display()));
    report.detail(format!(
        "config_path={}",
        ctx.config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<defaults>".to_string())
    ));
    report.detail(format!("transfer.backend={}", ctx.cfg.transfer.backend));
    report.detail(format!(
        "transfer.endpoints={} -> {}",
        ctx.cfg.transfer.local_endpoint, ctx.cfg.transfer.storage_endpoint
    ));

    report_lock(ctx, &mut report);

    for category in Category::ALL {
        let cat = category.config(&ctx.cfg);
        let ledger = ctx.paths.ledger(cat, &ctx.cfg);
        match load_processed(&ledger) {
            Ok(items) => report.detail(format!("ledger.{}={}", category.as_str(), items.len())),
            Err(err) => report.issue(format!("ledger.{}=unreadable ({err:#})", category.as_str())),
        }
    }

    match audit::read_events(&ctx.paths.audit_file) {
        Ok(events) => match events.last() {
            Some(last) => report.detail(format!(
                "audit.last={} {} at={} {}",
                last.phase, last.status, last.at_epoch_secs, last.message
            )),
            None => report.detail("audit.last=none"),
        },
        Err(err) => report.issue(format!("audit=unreadable ({err:#})")),
    }

    for key in generated::GENERATED_SIMARCHIVE_ENV_ALLOWLIST {
        if let Ok(value) = env::var(key) {
            report.detail(format!("env.{key}={value}"));
        }
    }

    Ok(report)
}
