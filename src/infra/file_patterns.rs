// ============================================================
// Layer 6 — File Pattern Expansion
// ============================================================
// Command-line inputs name files with a comma-separated list of
// glob patterns, e.g.
//
//   --input-file-pattern "data/train-?????-of-00008,extra/*.shard"
//
// This expands them into a sorted, de-duplicated path list.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;

pub fn expand_file_patterns(patterns: &str) -> Result<Vec<PathBuf>> {
    let mut found = BTreeSet::new();

    for pattern in patterns.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let matches = glob::glob(pattern)
            .with_context(|| format!("Invalid file pattern '{pattern}'"))?;
        let before = found.len();
        for entry in matches {
            match entry {
                Ok(path) if path.is_file() => {
                    found.insert(path);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping unreadable path: {e}"),
            }
        }
        if found.len() == before {
            tracing::warn!("Found no files matching '{}'", pattern);
        }
    }

    Ok(found.into_iter().collect())
}
