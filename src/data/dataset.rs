use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use std::fs::File;
use std::path::PathBuf;

use crate::data::shard::{index_shard, read_record, RecordSpan, SequenceExample};
use crate::infra::file_patterns::expand_file_patterns;

/// Random-access view over every readable record of a set of shards.
///
/// Opening the dataset reads each record once and keeps only those
/// that decode, so `get` succeeds for every index below `len()`
/// (Burn's DataLoader stops at the first `None`). `get` then seeks
/// straight to the record. The DataLoader shuffles the global index
/// in Train mode, which interleaves examples from every shard.
pub struct ShardDataset {
    shards: Vec<PathBuf>,
    /// (shard index, span) for every record, in file order
    index:  Vec<(usize, RecordSpan)>,
}

impl ShardDataset {
    /// Open every shard matching a comma-separated list of globs.
    pub fn open(file_patterns: &str) -> Result<Self> {
        let shards = expand_file_patterns(file_patterns)?;
        if shards.is_empty() {
            anyhow::bail!("No input shards match '{file_patterns}'");
        }
        Self::from_paths(shards)
    }

    pub fn from_paths(shards: Vec<PathBuf>) -> Result<Self> {
        let mut index = Vec::new();
        for (i, path) in shards.iter().enumerate() {
            let spans = index_shard(path)?;
            let mut file = File::open(path)
                .with_context(|| format!("Cannot open shard '{}'", path.display()))?;

            let mut skipped = 0;
            for span in spans {
                match read_record(&mut file, span) {
                    Ok(_) => index.push((i, span)),
                    Err(e) => {
                        tracing::warn!(
                            "Skipping corrupt record at byte {} of '{}': {e:#}",
                            span.offset,
                            path.display()
                        );
                        skipped += 1;
                    }
                }
            }
            tracing::debug!(
                "Indexed '{}' ({} corrupt records skipped)",
                path.display(),
                skipped
            );
        }
        tracing::info!(
            "Input pipeline: {} records across {} shards",
            index.len(),
            shards.len()
        );
        Ok(Self { shards, index })
    }

    pub fn num_shards(&self) -> usize { self.shards.len() }
}

impl Dataset<SequenceExample> for ShardDataset {
    fn get(&self, index: usize) -> Option<SequenceExample> {
        let &(shard, span) = self.index.get(index)?;
        let path = &self.shards[shard];

        let record = File::open(path)
            .map_err(anyhow::Error::from)
            .and_then(|mut f| read_record(&mut f, span));
        match record {
            Ok(example) => Some(example),
            Err(e) => {
                tracing::warn!("Cannot read record {} of '{}': {e:#}", index, path.display());
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}
