// ============================================================
// Layer 4 — Shard Storage
// ============================================================
// Training examples are stored across several shard files so
// that dataset building can write them in parallel and the
// loader can interleave them.
//
// File naming:   train-00000-of-00008, train-00001-of-00008, ...
//
// File layout:
//   ┌──────────┬──────────────┬──────────────────┬─────┐
//   │ "SATS"   │ u64 LE len_0 │ bincode record_0 │ ... │
//   └──────────┴──────────────┴──────────────────┴─────┘
//
// Records are length-prefixed so a shard can be indexed by
// scanning the headers only, then read at random offsets.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::CaptionError;

const SHARD_MAGIC: &[u8; 4] = b"SATS";
const LEN_PREFIX:  u64      = 8;

/// One image/caption pair as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceExample {
    pub image_id:      u64,
    pub filename:      String,
    /// Encoded (jpeg/png) image bytes, exactly as read from disk
    pub encoded_image: Vec<u8>,
    /// Caption words including the start and end words
    pub caption:       Vec<String>,
    /// Vocabulary ids of `caption`
    pub caption_ids:   Vec<u32>,
}

pub fn shard_name(name: &str, index: usize, total: usize) -> String {
    format!("{name}-{index:05}-of-{total:05}")
}

// ─── Writer ───────────────────────────────────────────────────────────────────
pub struct ShardWriter {
    path:   PathBuf,
    writer: BufWriter<File>,
    count:  usize,
}

impl ShardWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .with_context(|| format!("Cannot create shard '{}'", path.display()))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(SHARD_MAGIC)?;
        Ok(Self { path, writer, count: 0 })
    }

    pub fn write(&mut self, example: &SequenceExample) -> Result<()> {
        let bytes = bincode::serialize(example)
            .with_context(|| format!("Cannot serialise example for '{}'", example.filename))?;
        self.writer.write_all(&(bytes.len() as u64).to_le_bytes())?;
        self.writer.write_all(&bytes)?;
        self.count += 1;
        Ok(())
    }

    /// Flush and return the number of records written.
    pub fn finish(mut self) -> Result<usize> {
        self.writer
            .flush()
            .with_context(|| format!("Cannot flush shard '{}'", self.path.display()))?;
        Ok(self.count)
    }
}

// ─── Reader ───────────────────────────────────────────────────────────────────
/// Position of one record inside a shard file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSpan {
    pub offset: u64,
    pub len:    u64,
}

/// Scan a shard's length prefixes and return every record span.
pub fn index_shard(path: &Path) -> Result<Vec<RecordSpan>> {
    let malformed = |reason: &str| CaptionError::MalformedShard {
        path:   path.to_path_buf(),
        reason: reason.to_string(),
    };

    let mut file = File::open(path)
        .with_context(|| format!("Cannot open shard '{}'", path.display()))?;
    let size = file.metadata()?.len();

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).map_err(|_| malformed("file too short"))?;
    if &magic != SHARD_MAGIC {
        return Err(malformed("bad magic").into());
    }

    let mut spans = Vec::new();
    let mut pos   = SHARD_MAGIC.len() as u64;
    while pos < size {
        if pos + LEN_PREFIX > size {
            return Err(malformed("truncated length prefix").into());
        }
        let mut len_buf = [0u8; 8];
        file.read_exact(&mut len_buf)?;
        let len = u64::from_le_bytes(len_buf);

        let offset = pos + LEN_PREFIX;
        if offset + len > size {
            return Err(malformed("truncated record").into());
        }
        spans.push(RecordSpan { offset, len });

        pos = offset + len;
        file.seek(SeekFrom::Start(pos))?;
    }
    Ok(spans)
}

/// Read a single record from an open shard.
pub fn read_record(file: &mut File, span: RecordSpan) -> Result<SequenceExample> {
    file.seek(SeekFrom::Start(span.offset))?;
    let mut buf = vec![0u8; span.len as usize];
    file.read_exact(&mut buf)?;
    Ok(bincode::deserialize(&buf)?)
}

/// Read every record of a shard in order.
pub fn read_shard(path: &Path) -> Result<Vec<SequenceExample>> {
    let spans    = index_shard(path)?;
    let mut file = File::open(path)?;
    spans.into_iter().map(|s| read_record(&mut file, s)).collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn example(id: u64, words: &[&str]) -> SequenceExample {
        SequenceExample {
            image_id:      id,
            filename:      format!("{id}.jpg"),
            encoded_image: vec![id as u8; 10 + id as usize],
            caption:       words.iter().map(|w| w.to_string()).collect(),
            caption_ids:   (0..words.len() as u32).collect(),
        }
    }

    #[test]
    fn test_shard_name_format() {
        assert_eq!(shard_name("train", 3, 256), "train-00003-of-00256");
    }

    #[test]
    fn test_write_then_index_and_read() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join(shard_name("val", 0, 1));

        let examples = vec![
            example(1, &["<S>", "a", "</S>"]),
            example(2, &["<S>", "a", "dog", "</S>"]),
        ];
        let mut w = ShardWriter::create(&path).unwrap();
        for e in &examples {
            w.write(e).unwrap();
        }
        assert_eq!(w.finish().unwrap(), 2);

        let spans = index_shard(&path).unwrap();
        assert_eq!(spans.len(), 2);

        let mut f = File::open(&path).unwrap();
        assert_eq!(read_record(&mut f, spans[1]).unwrap(), examples[1]);
        assert_eq!(read_shard(&path).unwrap(), examples);
    }

    #[test]
    fn test_empty_shard_has_no_records() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        ShardWriter::create(&path).unwrap().finish().unwrap();
        assert!(index_shard(&path).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_shard_is_malformed() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad");
        let mut w = ShardWriter::create(&path).unwrap();
        w.write(&example(1, &["<S>", "</S>"])).unwrap();
        w.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        let err = index_shard(&path).unwrap_err();
        assert!(err.downcast_ref::<CaptionError>().is_some());
    }

    #[test]
    fn test_bad_magic_is_malformed() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk");
        std::fs::write(&path, b"JUNKJUNK").unwrap();
        assert!(index_shard(&path).is_err());
    }
}
