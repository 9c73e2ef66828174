// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores a pretraining run with Burn's
// CompactRecorder plus two JSON files.
//
// File layout:
//   checkpoints/
//     model_epoch_1.mpk.gz   ← weights after epoch 1
//     model_epoch_2.mpk.gz
//     ...
//     latest_epoch.json      ← number of the newest weights file
//     pretrain_config.json   ← run configuration (model shape etc.)
//     lars_config.json       ← optimizer configuration export
//
// The two configs are enough to rebuild the exact model and an
// identical optimizer. Momentum accumulators are not written;
// a resumed run starts with zero slots.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    config::Config,
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use std::{fs, path::{Path, PathBuf}};

use crate::application::pretrain_use_case::PretrainConfig;
use crate::ml::lars::LarsConfig;
use crate::ml::model::BertForPreTraining;

const LATEST_EPOCH_FILE:    &str = "latest_epoch.json";
const PRETRAIN_CONFIG_FILE: &str = "pretrain_config.json";
const LARS_CONFIG_FILE:     &str = "lars_config.json";

/// Manages saving and loading of checkpoints in one directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create the manager, creating `dir` (like `mkdir -p`) if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing checkpoint directory without creating it.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            anyhow::bail!(
                "Checkpoint dir '{}' does not exist. Have you run 'pretrain' first?",
                dir.display()
            );
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // ─── Model weights ────────────────────────────────────────────────────────

    /// Save model weights for `epoch` and point latest_epoch.json at them.
    pub fn save_model<B: Backend>(&self, model: &BertForPreTraining<B>, epoch: usize) -> Result<()> {
        let path = self.dir.join(format!("model_epoch_{epoch}"));

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let latest_path = self.dir.join(LATEST_EPOCH_FILE);
        fs::write(&latest_path, serde_json::to_string(&epoch)?)
            .with_context(|| format!("Failed to write {LATEST_EPOCH_FILE}"))?;

        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Load the newest weights into `model` (which must have the
    /// saved architecture).
    pub fn load_model<B: Backend>(
        &self,
        model:  BertForPreTraining<B>,
        device: &B::Device,
    ) -> Result<BertForPreTraining<B>> {
        let epoch = self
            .latest_epoch()?
            .context("No weights saved yet. Have you run 'pretrain' first?")?;
        let path = self.dir.join(format!("model_epoch_{epoch}"));

        tracing::info!("Loading checkpoint from epoch {}", epoch);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;

        Ok(model.load_record(record))
    }

    /// Newest saved epoch, or None before the first save.
    pub fn latest_epoch(&self) -> Result<Option<usize>> {
        let path = self.dir.join(LATEST_EPOCH_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        Ok(Some(serde_json::from_str::<usize>(&s)?))
    }

    // ─── Configs ──────────────────────────────────────────────────────────────

    pub fn save_config(&self, cfg: &PretrainConfig) -> Result<()> {
        let path = self.dir.join(PRETRAIN_CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved pretraining config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<PretrainConfig> {
        let path = self.dir.join(PRETRAIN_CONFIG_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config in '{}'", path.display()))
    }

    /// Write the optimizer's configuration export.
    pub fn save_lars_config(&self, cfg: &LarsConfig) -> Result<()> {
        let path = self.dir.join(LARS_CONFIG_FILE);
        cfg.save(&path)
            .with_context(|| format!("Cannot write optimizer config to '{}'", path.display()))?;
        tracing::debug!("Saved LARS config to '{}'", path.display());
        Ok(())
    }

    pub fn load_lars_config(&self) -> Result<LarsConfig> {
        let path = self.dir.join(LARS_CONFIG_FILE);
        LarsConfig::load(&path)
            .with_context(|| format!("Cannot read optimizer config from '{}'", path.display()))
    }
}
