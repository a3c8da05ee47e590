use anyhow::Result;
use chrono::Local;

use crate::archiver::pipeline::{self, Category};
use crate::commands::{CommandContext, CommandReport};

pub fn run(ctx: &CommandContext) -> Result<CommandReport> {
    let mut report = CommandReport::new("scan");
    report.detail(format!("workdir={}", ctx.workdir.display()));

    let pending = pipeline::pending_work_at(&ctx.cfg, &ctx.paths, Local::now().naive_local())?;
    report.detail(format!("pending.diagnostics={}", pending.diagnostics));
    for category in Category::ALL {
        let items = match category {
            Category::Checkpoints => &pending.checkpoints,
            Category::Plotfiles => &pending.plotfiles,
        };
        report.detail(format!(
            "pending.{}={}",
            category.as_str(),
            if items.is_empty() {
                "-".to_string()
            } else {
                items.join(",")
            }
        ));
    }
    report.detail(format!("pending.any={}", pending.any()));
    Ok(report)
}
