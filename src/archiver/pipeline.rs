//! The archiving cycle: diagnostics first, then checkpoints, then plotfiles.

use crate::archiver::audit;
use crate::archiver::classify::{find_eligible, has_new_diagnostics, matching_names, scan_listing};
use crate::archiver::config::{ArchiverConfig, CategoryConfig};
use crate::archiver::diag::{bundle_name, create_bundle};
use crate::archiver::exec::CommandRunner;
use crate::archiver::ledger::{load_processed, record_processed};
use crate::archiver::paths::ArchivePaths;
use crate::archiver::transfer::TransferClient;
use crate::archiver::warn::{self, WarnEvent};
use crate::error::ArchiveError;
use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDateTime};
use std::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Checkpoints,
    Plotfiles,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Checkpoints, Category::Plotfiles];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checkpoints => "checkpoints",
            Self::Plotfiles => "plotfiles",
        }
    }

    pub fn config(self, cfg: &ArchiverConfig) -> &CategoryConfig {
        match self {
            Self::Checkpoints => &cfg.checkpoints,
            Self::Plotfiles => &cfg.plotfiles,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingWork {
    pub diagnostics: bool,
    pub checkpoints: Vec<String>,
    pub plotfiles: Vec<String>,
}

impl PendingWork {
    pub fn any(&self) -> bool {
        self.diagnostics || !self.checkpoints.is_empty() || !self.plotfiles.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    pub diag_bundle: Option<String>,
    pub checkpoints: Vec<String>,
    pub plotfiles: Vec<String>,
}

impl CycleOutcome {
    pub fn archived_count(&self) -> usize {
        usize::from(self.diag_bundle.is_some()) + self.checkpoints.len() + self.plotfiles.len()
    }
}

fn diag_interval(cfg: &ArchiverConfig) -> Result<Duration, ArchiveError> {
    i64::try_from(cfg.diagnostics.interval_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| {
            ArchiveError::Validation(format!(
                "diagnostics interval of {}s is out of range",
                cfg.diagnostics.interval_secs
            ))
        })
}

pub fn diagnostics_pending(
    cfg: &ArchiverConfig,
    paths: &ArchivePaths,
    now: NaiveDateTime,
) -> Result<bool> {
    let bundles = matching_names(&paths.workdir, &cfg.diagnostics.bundle_glob())?;
    let loose = matching_names(&paths.workdir, &cfg.diagnostics.pattern)?;
    let pending = has_new_diagnostics(now, &bundles, &loose, diag_interval(cfg)?)
        .context("failed to decide whether diagnostics need bundling")?;
    Ok(pending)
}

pub fn eligible_items(
    cfg: &ArchiverConfig,
    paths: &ArchivePaths,
    category: Category,
) -> Result<Vec<String>> {
    let cat = category.config(cfg);
    let processed = load_processed(&paths.ledger(cat, cfg))?;
    let listing = scan_listing(&paths.workdir, &cfg.layout.marker_file)?;
    let eligible = find_eligible(&cat.prefix, &processed, &listing, cat.keep_recent)?;
    Ok(eligible)
}

/// What a cycle started at `now` would archive. Reads only.
pub fn pending_work_at(
    cfg: &ArchiverConfig,
    paths: &ArchivePaths,
    now: NaiveDateTime,
) -> Result<PendingWork> {
    Ok(PendingWork {
        diagnostics: diagnostics_pending(cfg, paths, now)?,
        checkpoints: eligible_items(cfg, paths, Category::Checkpoints)?,
        plotfiles: eligible_items(cfg, paths, Category::Plotfiles)?,
    })
}

pub struct Archiver<T, R> {
    cfg: ArchiverConfig,
    paths: ArchivePaths,
    transfer: T,
    tools: R,
}

impl<T: TransferClient, R: CommandRunner> Archiver<T, R> {
    pub fn new(cfg: ArchiverConfig, paths: ArchivePaths, transfer: T, tools: R) -> Self {
        Self {
            cfg,
            paths,
            transfer,
            tools,
        }
    }

    pub fn paths(&self) -> &ArchivePaths {
        &self.paths
    }

    fn loose_diagnostics(&self) -> Result<Vec<String>> {
        matching_names(&self.paths.workdir, &self.cfg.diagnostics.pattern)
    }

    pub fn diagnostics_pending(&self, now: NaiveDateTime) -> Result<bool> {
        diagnostics_pending(&self.cfg, &self.paths, now)
    }

    pub fn eligible_items(&self, category: Category) -> Result<Vec<String>> {
        eligible_items(&self.cfg, &self.paths, category)
    }

    pub fn pending_work_at(&self, now: NaiveDateTime) -> Result<PendingWork> {
        pending_work_at(&self.cfg, &self.paths, now)
    }

    pub fn has_pending_work(&self) -> Result<bool> {
        Ok(self.pending_work_at(Local::now().naive_local())?.any())
    }

    pub fn archive_pending(&self) -> Result<CycleOutcome> {
        self.archive_pending_at(Local::now().naive_local())
    }

    pub fn archive_pending_at(&self, now: NaiveDateTime) -> Result<CycleOutcome> {
        let mut out = CycleOutcome::default();

        if self.diagnostics_pending(now)? {
            out.diag_bundle = self.archive_diagnostics(now)?;
        }
        for category in Category::ALL {
            let archived = self.archive_category(category)?;
            match category {
                Category::Checkpoints => out.checkpoints = archived,
                Category::Plotfiles => out.plotfiles = archived,
            }
        }

        Ok(out)
    }

    fn archive_diagnostics(&self, now: NaiveDateTime) -> Result<Option<String>> {
        let loose = self.loose_diagnostics()?;
        if loose.is_empty() {
            warn::emit(WarnEvent {
                code: "DIAG_NONE",
                stage: "diagnostics",
                action: "bundle",
                item: &self.cfg.diagnostics.pattern,
                retry: "next-interval",
                reason: "interval-elapsed-but-no-loose-diagnostic-files",
                err: "",
            });
            audit::append_event(
                &self.paths.audit_file,
                "diagnostics",
                "skipped",
                "interval elapsed but no loose diagnostic files",
            )?;
            return Ok(None);
        }

        let bundle = bundle_name(&self.cfg.diagnostics.bundle_prefix, &now);
        create_bundle(
            &self.tools,
            &self.cfg.transfer.tar_bin,
            &self.paths.workdir,
            &bundle,
            &loose,
        )?;
        tracing::info!(bundle = %bundle, files = loose.len(), "bundled diagnostics");

        self.transfer
            .send(&bundle)
            .with_context(|| format!("failed to archive diagnostic bundle {bundle}"))?;
        audit::append_event(
            &self.paths.audit_file,
            "diagnostics",
            "ok",
            &format!("bundle={} files={}", bundle, loose.len()),
        )?;
        Ok(Some(bundle))
    }

    fn archive_category(&self, category: Category) -> Result<Vec<String>> {
        let items = self.eligible_items(category)?;
        let mut archived = Vec::with_capacity(items.len());
        for item in items {
            self.archive_item(category, &item)?;
            archived.push(item);
        }
        Ok(archived)
    }

    /// Send, then relocate and record. A failed send leaves the item where it
    /// was and unrecorded, so the next cycle picks it up again.
    pub fn archive_item(&self, category: Category, item: &str) -> Result<()> {
        let cat = category.config(&self.cfg);
        self.transfer
            .send(item)
            .with_context(|| format!("failed to archive {} item {item}", category.as_str()))?;

        let processed_dir = self.paths.processed_dir(cat);
        fs::create_dir_all(&processed_dir)
            .with_context(|| format!("failed to create {}", processed_dir.display()))?;
        let from = self.paths.workdir.join(item);
        let to = processed_dir.join(item);
        fs::rename(&from, &to).with_context(|| {
            format!("failed to move {} to {}", from.display(), to.display())
        })?;
        record_processed(&self.paths.ledger(cat, &self.cfg), item)?;

        tracing::info!(category = category.as_str(), item, "marked processed");
        audit::append_event(
            &self.paths.audit_file,
            category.as_str(),
            "ok",
            &format!(
                "item={} backend={} moved_to={}",
                item,
                self.transfer.backend_name(),
                to.display()
            ),
        )?;
        Ok(())
    }
}
