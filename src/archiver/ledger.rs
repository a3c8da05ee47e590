use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Names already archived for one category. A missing ledger is an empty set.
pub fn load_processed(path: &Path) -> Result<BTreeSet<String>> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect())
}

/// Append one archived name. Callers only record names the classifier let
/// through, so no deduplication happens here.
pub fn record_processed(path: &Path, name: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(format!("{name}\n").as_bytes())
        .with_context(|| format!("failed to append to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_ledger_loads_empty() {
        let tmp = tempdir().expect("tempdir");
        let set = load_processed(&tmp.path().join("nope/processed.out")).expect("load");
        assert!(set.is_empty());
    }

    #[test]
    fn record_appends_without_truncating() {
        let tmp = tempdir().expect("tempdir");
        let ledger = tmp.path().join("checkfiles/processed.out");

        record_processed(&ledger, "chk00010").expect("record 1");
        record_processed(&ledger, "chk00020").expect("record 2");

        let raw = fs::read_to_string(&ledger).expect("read");
        assert_eq!(raw, "chk00010\nchk00020\n");

        let set = load_processed(&ledger).expect("load");
        assert!(set.contains("chk00010"));
        assert!(set.contains("chk00020"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn load_trims_and_skips_blank_lines() {
        let tmp = tempdir().expect("tempdir");
        let ledger = tmp.path().join("processed.out");
        fs::write(&ledger, "plt00010  \n\n  plt00020\n").expect("write");

        let set = load_processed(&ledger).expect("load");
        assert_eq!(
            set.into_iter().collect::<Vec<_>>(),
            vec!["plt00010".to_string(), "plt00020".to_string()]
        );
    }
}
