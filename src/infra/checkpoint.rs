// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// Directory layout:
//   model/train/
//     model-1000.mpk        ← weights after global step 1000
//     optimizer-1000.mpk    ← optimizer state at the same step
//     model-2000.mpk
//     ...
//     checkpoint.json       ← { "latest_step": 2000, "all_steps": [1000, 2000] }
//     train_config.json     ← TrainConfig used to build the model
//     encoder.mpk           ← encoder weights from the last step
//     metrics.csv
//
// A checkpoint is addressed either by its file path (with or
// without the recorder extension) or by its directory, in which
// case checkpoint.json picks the latest one. Only the newest
// `max_to_keep` checkpoints survive a save.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Record, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::config::TrainConfig;
use crate::error::CaptionError;
use crate::ml::model::{ImageEncoder, ShowAndTellModel};

const STATE_FILE:   &str = "checkpoint.json";
const CONFIG_FILE:  &str = "train_config.json";
const PREFIX:       &str = "model-";
const OPTIM_PREFIX: &str = "optimizer-";
const ENCODER_FILE: &str = "encoder";
/// Extension CompactRecorder appends
const RECORD_EXT:   &str = "mpk";

/// Contents of checkpoint.json
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub latest_step: usize,
    /// Retained checkpoints, oldest first
    pub all_steps:   Vec<usize>,
}

pub struct CheckpointManager {
    dir:         PathBuf,
    max_to_keep: usize,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl AsRef<Path>, max_to_keep: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir, max_to_keep: max_to_keep.max(1) })
    }

    /// Encoder weights exported at the end of a run; usable as
    /// `inception_checkpoint_file` for a later one.
    pub fn encoder_path(&self) -> PathBuf {
        self.dir.join(ENCODER_FILE)
    }

    pub fn checkpoint_path(&self, step: usize) -> PathBuf {
        self.dir.join(format!("{PREFIX}{step}"))
    }

    pub fn optimizer_path(&self, step: usize) -> PathBuf {
        self.dir.join(format!("{OPTIM_PREFIX}{step}"))
    }

    /// Save weights and optimizer state for `step`, update
    /// checkpoint.json and prune checkpoints beyond `max_to_keep`.
    pub fn save_training_state<B: Backend, R: Record<B>>(
        &self,
        model:     &ShowAndTellModel<B>,
        optimizer: R,
        step:      usize,
    ) -> Result<PathBuf> {
        let path       = self.record_model(model, step)?;
        let optim_path = self.optimizer_path(step);
        CompactRecorder::new()
            .record(optimizer, optim_path.clone())
            .with_context(|| format!("Failed to save optimizer state to '{}'", optim_path.display()))?;
        self.commit(step)?;
        Ok(path)
    }

    /// Optimizer state saved at `step`, or None when that checkpoint
    /// was written without one.
    pub fn load_optimizer<B: Backend, R: Record<B>>(
        &self,
        step:   usize,
        device: &B::Device,
    ) -> Result<Option<R>> {
        let path = self.optimizer_path(step);
        if !path.with_extension(RECORD_EXT).exists() {
            return Ok(None);
        }
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load optimizer state '{}'", path.display()))?;
        Ok(Some(record))
    }

    fn record_model<B: Backend>(&self, model: &ShowAndTellModel<B>, step: usize) -> Result<PathBuf> {
        let path = self.checkpoint_path(step);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;
        Ok(path)
    }

    /// Point checkpoint.json at `step` and prune old checkpoints.
    fn commit(&self, step: usize) -> Result<()> {
        let mut state = self.state()?.unwrap_or_default();
        state.all_steps.retain(|&s| s != step);
        state.all_steps.push(step);
        state.latest_step = step;

        while state.all_steps.len() > self.max_to_keep {
            let old = state.all_steps.remove(0);
            self.delete_checkpoint(old);
        }

        write_state(&self.dir, &state)?;
        tracing::debug!("Saved checkpoint: step {}", step);
        Ok(())
    }

    /// Current checkpoint.json, or None before the first save.
    pub fn state(&self) -> Result<Option<CheckpointState>> {
        read_state(&self.dir)
    }

    pub fn latest_step(&self) -> Result<Option<usize>> {
        Ok(self.state()?.map(|s| s.latest_step))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    fn delete_checkpoint(&self, step: usize) {
        let escaped = |p: PathBuf| format!("{}.*", glob::Pattern::escape(&p.to_string_lossy()));
        let patterns = [escaped(self.checkpoint_path(step)), escaped(self.optimizer_path(step))];
        let paths = patterns
            .iter()
            .filter_map(|pattern| glob::glob(pattern).ok())
            .flatten();
        for path in paths.flatten() {
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!("Removed old checkpoint '{}'", path.display()),
                Err(e) => tracing::warn!("Cannot remove '{}': {e}", path.display()),
            }
        }
    }
}

// ─── checkpoint.json ──────────────────────────────────────────────────────────
fn read_state(dir: &Path) -> Result<Option<CheckpointState>> {
    let path = dir.join(STATE_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(&path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    let state = serde_json::from_str(&json)
        .with_context(|| format!("Malformed '{}'", path.display()))?;
    Ok(Some(state))
}

fn write_state(dir: &Path, state: &CheckpointState) -> Result<()> {
    let path = dir.join(STATE_FILE);
    fs::write(&path, serde_json::to_string_pretty(state)?)
        .with_context(|| format!("Cannot write '{}'", path.display()))
}

// ─── Resolution ───────────────────────────────────────────────────────────────
/// Turn a checkpoint file or directory into the recorder path.
///
/// A directory resolves to its latest checkpoint and fails with
/// [`CaptionError::NoCheckpoint`] when it has none. A file path
/// has any recorder extension stripped.
pub fn resolve_checkpoint(path: &Path) -> Result<PathBuf> {
    if path.is_dir() {
        return match read_state(path)? {
            Some(state) => Ok(path.join(format!("{PREFIX}{}", state.latest_step))),
            None        => Err(CaptionError::NoCheckpoint(path.to_path_buf()).into()),
        };
    }

    let text = path.to_string_lossy();
    let stem = text
        .strip_suffix(".mpk.gz")
        .or_else(|| text.strip_suffix(".mpk"))
        .unwrap_or(&text);
    Ok(PathBuf::from(stem))
}

/// Global step encoded in a `model-<step>` path.
pub fn step_of(checkpoint: &Path) -> Option<usize> {
    checkpoint
        .file_name()?
        .to_str()?
        .strip_prefix(PREFIX)?
        .split('.')
        .next()?
        .parse()
        .ok()
}

/// train_config.json sits in the same directory as the weights.
pub fn load_config_for(checkpoint: &Path) -> Result<TrainConfig> {
    let dir = checkpoint.parent().unwrap_or_else(|| Path::new("."));
    load_config_from_dir(dir)
}

fn load_config_from_dir(dir: &Path) -> Result<TrainConfig> {
    let path = dir.join(CONFIG_FILE);
    let json = fs::read_to_string(&path).with_context(|| {
        format!(
            "Cannot read config from '{}'. Make sure you have run 'train' first.",
            path.display()
        )
    })?;
    Ok(serde_json::from_str(&json)?)
}

// ─── Loading ──────────────────────────────────────────────────────────────────
/// Load weights from a resolved checkpoint path into `model`.
pub fn load_model<B: Backend>(
    model:      ShowAndTellModel<B>,
    checkpoint: &Path,
    device:     &B::Device,
) -> Result<ShowAndTellModel<B>> {
    let record = CompactRecorder::new()
        .load(checkpoint.to_path_buf(), device)
        .with_context(|| format!("Cannot load checkpoint '{}'", checkpoint.display()))?;
    Ok(model.load_record(record))
}

/// Load pretrained encoder weights, e.g. before the first step.
pub fn load_encoder<B: Backend>(
    encoder:    ImageEncoder<B>,
    checkpoint: &Path,
    device:     &B::Device,
) -> Result<ImageEncoder<B>> {
    let path   = resolve_checkpoint(checkpoint)?;
    let record = CompactRecorder::new()
        .load(path.clone(), device)
        .with_context(|| format!("Cannot load encoder weights '{}'", path.display()))?;
    Ok(encoder.load_record(record))
}

/// Save encoder weights alone, in the format `load_encoder` reads.
pub fn save_encoder<B: Backend>(encoder: &ImageEncoder<B>, path: &Path) -> Result<()> {
    CompactRecorder::new()
        .record(encoder.clone().into_record(), path.to_path_buf())
        .with_context(|| format!("Cannot save encoder weights '{}'", path.display()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::ShowAndTellConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn tiny_model() -> ShowAndTellModel<TestBackend> {
        ShowAndTellConfig::new(7)
            .with_embedding_size(4)
            .with_num_lstm_units(4)
            .with_encoder_base_channels(2)
            .init(&Default::default())
    }

    #[test]
    fn test_empty_dir_has_no_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_checkpoint(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CaptionError>(),
            Some(CaptionError::NoCheckpoint(_))
        ));
        assert!(err.to_string().starts_with("No checkpoint file found in:"));
    }

    #[test]
    fn test_file_path_strips_extension() {
        let p = resolve_checkpoint(Path::new("/no/such/model-42.mpk")).unwrap();
        assert_eq!(p, PathBuf::from("/no/such/model-42"));
        assert_eq!(step_of(&p), Some(42));
        assert_eq!(step_of(Path::new("weights.bin")), None);
    }

    #[test]
    fn test_save_prunes_and_resolves_latest() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path(), 2).unwrap();
        let model = tiny_model();

        for step in [10, 20, 30] {
            mgr.save_training_state(&model, (), step).unwrap();
        }

        let state = mgr.state().unwrap().unwrap();
        assert_eq!(state.latest_step, 30);
        assert_eq!(state.all_steps, vec![20, 30]);

        let files: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(PREFIX))
            .collect();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|n| !n.starts_with("model-10.")));

        let latest = resolve_checkpoint(dir.path()).unwrap();
        assert_eq!(step_of(&latest), Some(30));
        load_model(tiny_model(), &latest, &Default::default()).unwrap();
    }

    #[test]
    fn test_pruning_in_dir_with_glob_characters() {
        let dir  = tempfile::tempdir().unwrap();
        let root = dir.path().join("run [a]");
        let mgr  = CheckpointManager::new(&root, 1).unwrap();
        let model = tiny_model();

        mgr.save_training_state(&model, (), 1).unwrap();
        mgr.save_training_state(&model, (), 2).unwrap();

        let mut names: Vec<String> = fs::read_dir(&root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".mpk"))
            .collect();
        names.sort();
        assert_eq!(names, vec!["model-2.mpk", "optimizer-2.mpk"]);
    }

    #[test]
    fn test_config_is_found_next_to_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path(), 5).unwrap();
        let mut cfg = TrainConfig::default();
        cfg.model.vocab_size = 77;
        mgr.save_config(&cfg).unwrap();

        let loaded = load_config_for(&mgr.checkpoint_path(5)).unwrap();
        assert_eq!(loaded.model.vocab_size, 77);
    }

    #[test]
    fn test_encoder_weights_roundtrip() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("inception");
        let device = Default::default();

        let trained = tiny_model().encoder;
        save_encoder(&trained, &path).unwrap();

        let fresh  = ImageEncoder::<TestBackend>::new(2, &device);
        let loaded = load_encoder(fresh, &dir.path().join("inception.mpk"), &device).unwrap();

        let images = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        let a = trained.forward(images.clone()).into_data().to_vec::<f32>().unwrap();
        let b = loaded.forward(images).into_data().to_vec::<f32>().unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-2);
        }
    }
}
