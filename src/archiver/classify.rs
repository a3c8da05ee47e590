use crate::archiver::timestamp::parse_timestamp;
use crate::error::ArchiveError;
use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime};
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// One entry of a working-directory listing, as far as the classifier cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
    pub has_marker: bool,
}

#[cfg(test)]
impl ListingEntry {
    pub fn complete_dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            has_marker: true,
        }
    }
}

pub fn scan_listing(dir: &Path, marker_file: &str) -> Result<Vec<ListingEntry>> {
    let read_dir =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    let mut out = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(ToOwned::to_owned) else {
            continue;
        };
        let path = entry.path();
        let is_dir = path.is_dir();
        let has_marker = is_dir && path.join(marker_file).is_file();
        out.push(ListingEntry {
            name,
            is_dir,
            has_marker,
        });
    }
    Ok(out)
}

/// Plain file names in `dir` matching a shell glob such as `*diag.out`, sorted.
pub fn matching_names(dir: &Path, pattern: &str) -> Result<Vec<String>> {
    let pattern = glob::Pattern::new(pattern)
        .map_err(|err| ArchiveError::Validation(format!("bad glob `{pattern}`: {err}")))?;
    let read_dir =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    let mut out = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        if !entry.path().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if pattern.matches(name) {
                out.push(name.to_string());
            }
        }
    }
    out.sort();
    Ok(out)
}

fn item_regex(prefix: &str) -> Result<Regex, ArchiveError> {
    Regex::new(&format!("^.*{}[0-9]{{5,6}}$", regex::escape(prefix)))
        .map_err(|err| ArchiveError::Validation(format!("bad item prefix `{prefix}`: {err}")))
}

/// Complete, unprocessed `<prefix><timestep>` directories, oldest first, with
/// the `keep_recent` newest held back for the simulation.
pub fn find_eligible(
    prefix: &str,
    processed: &BTreeSet<String>,
    listing: &[ListingEntry],
    keep_recent: usize,
) -> Result<Vec<String>, ArchiveError> {
    let re = item_regex(prefix)?;
    let mut survivors = listing
        .iter()
        .filter(|entry| entry.is_dir && entry.has_marker)
        .filter(|entry| re.is_match(&entry.name))
        .filter(|entry| !processed.contains(&entry.name))
        .map(|entry| entry.name.clone())
        .collect::<Vec<_>>();
    // Lexicographic order is chronological because timesteps are zero padded.
    survivors.sort();
    let eligible = survivors.len().saturating_sub(keep_recent);
    survivors.truncate(eligible);
    Ok(survivors)
}

/// The interval gate only applies once a first bundle exists; before that any
/// loose diagnostic file is enough.
pub fn has_new_diagnostics(
    now: NaiveDateTime,
    bundles: &[String],
    loose: &[String],
    interval: Duration,
) -> Result<bool, ArchiveError> {
    let Some(latest) = bundles.iter().max() else {
        return Ok(!loose.is_empty());
    };
    let bundled_at = parse_timestamp(latest)?;
    Ok(now - bundled_at > interval)
}
