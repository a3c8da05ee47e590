use anyhow::Result;

use crate::archiver::watcher::{self, WatchCycleOutcome};
use crate::archiver::{audit, lock};
use crate::commands::{CommandContext, CommandReport};

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub remote_base: String,
    pub once: bool,
}

fn report_cycle(report: &mut CommandReport, cycle: &WatchCycleOutcome) {
    report.detail(format!("cycle={}", cycle.cycle));
    report.detail(format!("found_work={}", cycle.found_work));
    if let Some(bundle) = &cycle.archived.diag_bundle {
        report.detail(format!("archived.diagnostics={bundle}"));
    }
    for item in &cycle.archived.checkpoints {
        report.detail(format!("archived.checkpoints={item}"));
    }
    for item in &cycle.archived.plotfiles {
        report.detail(format!("archived.plotfiles={item}"));
    }
    report.detail(format!("archived.count={}", cycle.archived.archived_count()));
}

pub fn run(ctx: &CommandContext, opts: &WatchOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("watch");
    report.detail(format!("workdir={}", ctx.workdir.display()));
    report.detail(format!("remote_base={}", opts.remote_base));

    let archiver = watcher::build_archiver(&ctx.cfg, &ctx.paths, &opts.remote_base)?;
    let guard = lock::acquire(&ctx.paths.lock_file, &ctx.workdir, &opts.remote_base)?;
    lock::install_shutdown_hook(&guard)?;
    report.detail(format!("lock_file={}", guard.path().display()));
    audit::append_event(
        &ctx.paths.audit_file,
        "watch",
        "started",
        &format!("pid={} remote_base={}", std::process::id(), opts.remote_base),
    )?;
    tracing::info!(
        workdir = %ctx.workdir.display(),
        remote_base = %opts.remote_base,
        once = opts.once,
        "archiver started"
    );

    let result = if opts.once {
        watcher::run_cycle(&archiver, 1).map(|cycle| report_cycle(&mut report, &cycle))
    } else {
        watcher::run_daemon(&archiver, ctx.cfg.watcher.poll_interval_secs)
    };

    if let Err(err) = &result {
        let _ = audit::append_event(&ctx.paths.audit_file, "watch", "failed", &format!("{err:#}"));
    }
    guard.release();
    result?;
    Ok(report)
}
