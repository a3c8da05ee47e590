use crate::archiver::globus::{DEFAULT_MAX_ATTEMPTS, SSH_TRANSIENT_EXIT};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "simarchive.toml";
/// Largest interval chrono can represent as a millisecond-backed delta.
pub const MAX_DIAG_INTERVAL_SECS: u64 = i64::MAX as u64 / 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub debug: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    pub pattern: String,
    pub bundle_prefix: String,
    pub interval_secs: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            pattern: "*diag.out".to_string(),
            bundle_prefix: "diag_files_".to_string(),
            interval_secs: 4 * 3600,
        }
    }
}

impl DiagnosticsConfig {
    pub fn bundle_glob(&self) -> String {
        format!("{}*.tar", self.bundle_prefix)
    }
}

/// One family of `<prefix><timestep>` output directories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryConfig {
    pub prefix: String,
    pub processed_dir: String,
    pub keep_recent: usize,
}

impl CategoryConfig {
    pub fn checkpoints() -> Self {
        Self {
            prefix: "chk".to_string(),
            processed_dir: "checkfiles".to_string(),
            keep_recent: 2,
        }
    }

    pub fn plotfiles() -> Self {
        Self {
            prefix: "plt".to_string(),
            processed_dir: "plotfiles".to_string(),
            keep_recent: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub marker_file: String,
    pub ledger_file: String,
    pub lock_file: String,
    pub audit_file: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            marker_file: "HEADER".to_string(),
            ledger_file: "processed.out".to_string(),
            lock_file: "simarchive.lock".to_string(),
            audit_file: "simarchive-audit.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    pub backend: String,
    pub ssh_bin: PathBuf,
    pub tar_bin: PathBuf,
    pub control_host: String,
    pub local_endpoint: String,
    pub storage_endpoint: String,
    pub sync_level: u8,
    pub max_attempts: u32,
    pub transient_exit_code: i32,
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            backend: "globus".to_string(),
            ssh_bin: PathBuf::from("ssh"),
            tar_bin: PathBuf::from("tar"),
            control_host: "cli.globusonline.org".to_string(),
            local_endpoint: "ncsa#BlueWaters".to_string(),
            storage_endpoint: "ncsa#Nearline".to_string(),
            sync_level: 3,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            transient_exit_code: SSH_TRANSIENT_EXIT,
            command_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiverConfig {
    pub watcher: WatcherConfig,
    pub diagnostics: DiagnosticsConfig,
    pub checkpoints: CategoryConfig,
    pub plotfiles: CategoryConfig,
    pub layout: LayoutConfig,
    pub transfer: TransferConfig,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            watcher: WatcherConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            checkpoints: CategoryConfig::checkpoints(),
            plotfiles: CategoryConfig::plotfiles(),
            layout: LayoutConfig::default(),
            transfer: TransferConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialArchiverConfig {
    watcher: Option<WatcherConfig>,
    diagnostics: Option<DiagnosticsConfig>,
    checkpoints: Option<CategoryConfig>,
    plotfiles: Option<CategoryConfig>,
    layout: Option<LayoutConfig>,
    transfer: Option<TransferConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_u32(var: &str, fallback: u32) -> u32 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u32>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_i32(var: &str, fallback: i32) -> i32 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<i32>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_u8(var: &str, fallback: u8) -> u8 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u8>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => {
            let trimmed = v.trim();
            match trimmed {
                "1" | "true" | "TRUE" | "yes" | "on" => true,
                "0" | "false" | "FALSE" | "no" | "off" => false,
                _ => fallback,
            }
        }
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_path(var: &str, fallback: &Path) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback.to_path_buf(),
    }
}

fn validate_category(name: &str, cat: &CategoryConfig) -> Result<()> {
    if cat.prefix.trim().is_empty() {
        return Err(anyhow!("invalid {name} prefix: cannot be empty"));
    }
    if cat.processed_dir.trim().is_empty() {
        return Err(anyhow!("invalid {name} processed dir: cannot be empty"));
    }
    if cat.processed_dir.contains('/') {
        return Err(anyhow!(
            "invalid {name} processed dir `{}`: must be a plain directory name",
            cat.processed_dir
        ));
    }
    Ok(())
}

pub fn validate(cfg: &ArchiverConfig) -> Result<()> {
    if cfg.watcher.poll_interval_secs == 0 {
        return Err(anyhow!(
            "invalid watcher poll interval: must be >= 1 second"
        ));
    }
    if cfg.diagnostics.interval_secs > MAX_DIAG_INTERVAL_SECS {
        return Err(anyhow!(
            "invalid diagnostics interval: must be <= {MAX_DIAG_INTERVAL_SECS} seconds"
        ));
    }
    if cfg.diagnostics.pattern.trim().is_empty() {
        return Err(anyhow!("invalid diagnostics pattern: cannot be empty"));
    }
    if cfg.diagnostics.bundle_prefix.trim().is_empty() {
        return Err(anyhow!("invalid diagnostics bundle prefix: cannot be empty"));
    }
    validate_category("checkpoints", &cfg.checkpoints)?;
    validate_category("plotfiles", &cfg.plotfiles)?;
    if cfg.checkpoints.processed_dir == cfg.plotfiles.processed_dir {
        return Err(anyhow!(
            "invalid processed dirs: checkpoints and plotfiles must not share `{}`",
            cfg.checkpoints.processed_dir
        ));
    }
    if cfg.checkpoints.prefix == cfg.plotfiles.prefix {
        return Err(anyhow!(
            "invalid prefixes: checkpoints and plotfiles must not share `{}`",
            cfg.checkpoints.prefix
        ));
    }
    if cfg.layout.marker_file.trim().is_empty() || cfg.layout.ledger_file.trim().is_empty() {
        return Err(anyhow!("invalid layout: marker and ledger file names are required"));
    }
    if cfg.layout.lock_file.trim().is_empty() {
        return Err(anyhow!("invalid layout: lock file name is required"));
    }
    if cfg.transfer.max_attempts == 0 {
        return Err(anyhow!("invalid transfer max attempts: must be >= 1"));
    }
    if cfg.transfer.sync_level > 3 {
        return Err(anyhow!("invalid transfer sync level: use 0, 1, 2 or 3"));
    }
    if cfg.transfer.control_host.trim().is_empty() {
        return Err(anyhow!("invalid transfer control host: cannot be empty"));
    }
    if cfg.transfer.command_timeout_secs == Some(0) {
        return Err(anyhow!("invalid transfer command timeout: must be >= 1 second"));
    }
    Ok(())
}

/// Explicit `SIMARCHIVE_CONFIG_PATH`, then `<workdir>/simarchive.toml`, then the
/// per-user config dir.
pub fn resolve_config_path(workdir: &Path) -> Option<PathBuf> {
    if let Ok(custom) = env::var("SIMARCHIVE_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let local = workdir.join(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }

    let config_dir = dirs::config_dir()?;
    Some(config_dir.join("simarchive").join(CONFIG_FILE_NAME))
}

fn merge_file_config(base: &mut ArchiverConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path)
        .map_err(|err| anyhow!("failed to read config {}: {err}", path.display()))?;
    let parsed: PartialArchiverConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse config {}: {err}", path.display()))?;
    if let Some(watcher) = parsed.watcher {
        base.watcher = watcher;
    }
    if let Some(diagnostics) = parsed.diagnostics {
        base.diagnostics = diagnostics;
    }
    if let Some(checkpoints) = parsed.checkpoints {
        base.checkpoints = checkpoints;
    }
    if let Some(plotfiles) = parsed.plotfiles {
        base.plotfiles = plotfiles;
    }
    if let Some(layout) = parsed.layout {
        base.layout = layout;
    }
    if let Some(transfer) = parsed.transfer {
        base.transfer = transfer;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut ArchiverConfig) {
    cfg.watcher.poll_interval_secs = env_or_u64(
        "SIMARCHIVE_POLL_INTERVAL_SECS",
        cfg.watcher.poll_interval_secs,
    );
    cfg.watcher.debug = env_or_bool("SIMARCHIVE_DEBUG", cfg.watcher.debug);

    cfg.diagnostics.pattern = env_or_string("SIMARCHIVE_DIAG_PATTERN", &cfg.diagnostics.pattern);
    cfg.diagnostics.interval_secs = env_or_u64(
        "SIMARCHIVE_DIAG_INTERVAL_SECS",
        cfg.diagnostics.interval_secs,
    );

    cfg.checkpoints.prefix = env_or_string("SIMARCHIVE_CHK_PREFIX", &cfg.checkpoints.prefix);
    cfg.checkpoints.keep_recent =
        env_or_usize("SIMARCHIVE_CHK_KEEP_RECENT", cfg.checkpoints.keep_recent);
    cfg.plotfiles.prefix = env_or_string("SIMARCHIVE_PLT_PREFIX", &cfg.plotfiles.prefix);
    cfg.plotfiles.keep_recent = env_or_usize("SIMARCHIVE_PLT_KEEP_RECENT", cfg.plotfiles.keep_recent);

    cfg.transfer.backend = env_or_string("SIMARCHIVE_TRANSFER_BACKEND", &cfg.transfer.backend);
    cfg.transfer.ssh_bin = env_or_path("SIMARCHIVE_SSH_BIN", &cfg.transfer.ssh_bin);
    cfg.transfer.tar_bin = env_or_path("SIMARCHIVE_TAR_BIN", &cfg.transfer.tar_bin);
    cfg.transfer.control_host =
        env_or_string("SIMARCHIVE_CONTROL_HOST", &cfg.transfer.control_host);
    cfg.transfer.local_endpoint =
        env_or_string("SIMARCHIVE_LOCAL_ENDPOINT", &cfg.transfer.local_endpoint);
    cfg.transfer.storage_endpoint =
        env_or_string("SIMARCHIVE_STORAGE_ENDPOINT", &cfg.transfer.storage_endpoint);
    cfg.transfer.sync_level = env_or_u8("SIMARCHIVE_SYNC_LEVEL", cfg.transfer.sync_level);
    cfg.transfer.max_attempts = env_or_u32("SIMARCHIVE_MAX_ATTEMPTS", cfg.transfer.max_attempts);
    cfg.transfer.transient_exit_code = env_or_i32(
        "SIMARCHIVE_TRANSIENT_EXIT_CODE",
        cfg.transfer.transient_exit_code,
    );
    if let Ok(raw) = env::var("SIMARCHIVE_COMMAND_TIMEOUT_SECS") {
        cfg.transfer.command_timeout_secs = raw.trim().parse::<u64>().ok().filter(|v| *v > 0);
    }
}

pub fn load_config(workdir: &Path) -> Result<ArchiverConfig> {
    let mut cfg = ArchiverConfig::default();
    if let Some(path) = resolve_config_path(workdir) {
        merge_file_config(&mut cfg, &path)?;
    }
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}
