pub mod scan;
pub mod status;
pub mod stop;
pub mod watch;

use crate::archiver::config::ArchiverConfig;
use crate::archiver::paths::ArchivePaths;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

/// Resolved working directory and configuration shared by every subcommand.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub workdir: PathBuf,
    pub config_path: Option<PathBuf>,
    pub cfg: ArchiverConfig,
    pub paths: ArchivePaths,
}
