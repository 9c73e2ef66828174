// ============================================================
// Layer 2 — PretrainUseCase
// ============================================================
// Orchestrates a pretraining run in order:
//
//   Step 1: Generate tokenised documents   (Layer 4 - data)
//   Step 2: Build masked-LM / NSP instances (Layer 4 - data)
//   Step 3: Split train/validation          (Layer 4 - data)
//   Step 4: Build datasets                  (Layer 4 - data)
//   Step 5: Save run config                 (Layer 6 - infra)
//   Step 6: Run training loop               (Layer 5 - ml)
//
// Every random choice (corpus, masking, split, shuffling) is
// derived from `seed`, so a config file reproduces a run.

use anyhow::{bail, Result};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::{
    corpus::SyntheticCorpus,
    dataset::PretrainingDataset,
    masking::{create_instances, MaskingConfig},
    splitter::split_train_val,
};
use crate::domain::traits::CorpusSource;
use crate::infra::{checkpoint::CheckpointManager, metrics::MetricsLogger};
use crate::ml::lars::LarsConfig;
use crate::ml::model::BertConfig;
use crate::ml::schedule::LearningRateSchedule;
use crate::ml::trainer::{run_training, TrainingSummary};

/// Which Burn backend the training loop runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Wgpu,
    NdArray,
}

// ─── Pretraining Configuration ───────────────────────────────────────────────
// Saved as pretrain_config.json next to the checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PretrainConfig {
    pub checkpoint_dir: String,
    pub backend:        BackendKind,
    pub seed:           u64,

    // ── corpus ──
    pub num_documents: usize,
    pub vocab_size:    usize,

    // ── instances ──
    pub max_seq_len:             usize,
    pub max_predictions_per_seq: usize,
    pub masked_lm_prob:          f64,
    pub train_fraction:          f64,

    // ── model ──
    pub hidden_size:       usize,
    pub num_layers:        usize,
    pub num_heads:         usize,
    pub intermediate_size: usize,
    pub dropout:           f64,
    pub partition_ways:    usize,
    pub partition_axis:    usize,

    // ── training ──
    pub batch_size: usize,
    pub epochs:     usize,

    // ── LARS ──
    pub learning_rate:     f64,
    pub end_learning_rate: f64,
    /// 0 keeps the learning rate constant
    pub decay_steps:       usize,
    pub warmup_steps:      usize,
    pub momentum:          f64,
    pub weight_decay:      f64,
    pub eeta:              f64,
    pub epsilon:           Option<f64>,
    pub use_nesterov:      bool,
    pub exclude_from_weight_decay:     Vec<String>,
    pub exclude_from_layer_adaptation: Vec<String>,
}

impl Default for PretrainConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: "checkpoints".to_string(),
            backend:        BackendKind::Wgpu,
            seed:           42,

            num_documents: 200,
            vocab_size:    2048,

            max_seq_len:             64,
            max_predictions_per_seq: 10,
            masked_lm_prob:          0.15,
            train_fraction:          0.9,

            hidden_size:       128,
            num_layers:        2,
            num_heads:         4,
            intermediate_size: 512,
            dropout:           0.1,
            partition_ways:    4,
            partition_axis:    1,

            batch_size: 16,
            epochs:     3,

            learning_rate:     1.0,
            end_learning_rate: 0.0,
            decay_steps:       0,
            warmup_steps:      0,
            momentum:          0.9,
            weight_decay:      1e-4,
            eeta:              1e-3,
            epsilon:           None,
            use_nesterov:      false,
            exclude_from_weight_decay:     vec!["LayerNorm".to_string(), "bias".to_string()],
            exclude_from_layer_adaptation: vec!["LayerNorm".to_string(), "bias".to_string()],
        }
    }
}

impl PretrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be positive");
        }
        if self.max_predictions_per_seq == 0 {
            bail!("max_predictions_per_seq must be positive");
        }
        if !(0.0..=1.0).contains(&self.train_fraction) {
            bail!("train_fraction {} must lie in [0, 1]", self.train_fraction);
        }
        if !(0.0..=1.0).contains(&self.masked_lm_prob) {
            bail!("masked_lm_prob {} must lie in [0, 1]", self.masked_lm_prob);
        }
        if !(0.0..=1.0).contains(&self.dropout) {
            bail!("dropout {} must lie in [0, 1]", self.dropout);
        }
        self.bert_config().validate()?;
        Ok(())
    }

    pub fn corpus(&self) -> SyntheticCorpus {
        SyntheticCorpus {
            num_documents: self.num_documents,
            vocab_size:    self.vocab_size,
            seed:          self.seed,
            ..Default::default()
        }
    }

    pub fn masking_config(&self) -> MaskingConfig {
        MaskingConfig {
            max_seq_len:             self.max_seq_len,
            max_predictions_per_seq: self.max_predictions_per_seq,
            masked_lm_prob:          self.masked_lm_prob,
            vocab_size:              self.vocab_size,
            ..Default::default()
        }
    }

    pub fn bert_config(&self) -> BertConfig {
        BertConfig::new(
            self.vocab_size,
            self.hidden_size,
            self.num_layers,
            self.num_heads,
            self.intermediate_size,
        )
        .with_max_position_embeddings(self.max_seq_len)
        .with_hidden_dropout_prob(self.dropout)
        .with_attention_probs_dropout_prob(self.dropout)
        .with_partition_ways(self.partition_ways)
        .with_partition_axis(self.partition_axis)
    }

    pub fn learning_rate_schedule(&self) -> LearningRateSchedule {
        if self.decay_steps == 0 && self.warmup_steps == 0 {
            LearningRateSchedule::Constant { value: self.learning_rate }
        } else {
            LearningRateSchedule::PolynomialDecay {
                initial:      self.learning_rate,
                end:          self.end_learning_rate,
                decay_steps:  self.decay_steps,
                power:        1.0,
                warmup_steps: self.warmup_steps,
            }
        }
    }

    pub fn lars_config(&self) -> LarsConfig {
        LarsConfig::new()
            .with_learning_rate(self.learning_rate_schedule())
            .with_momentum(self.momentum)
            .with_weight_decay(self.weight_decay)
            .with_eeta(self.eeta)
            .with_epsilon(self.epsilon)
            .with_use_nesterov(self.use_nesterov)
            .with_exclude_from_weight_decay(self.exclude_from_weight_decay.clone())
            .with_exclude_from_layer_adaptation(self.exclude_from_layer_adaptation.clone())
    }
}

// ─── PretrainUseCase ──────────────────────────────────────────────────────────
pub struct PretrainUseCase {
    config: PretrainConfig,
}

impl PretrainUseCase {
    pub fn new(config: PretrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TrainingSummary> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1: Tokenised documents ───────────────────────────────────────
        let documents = cfg.corpus().load_all()?;

        // ── Step 2: Masked-LM / next-sentence instances ───────────────────────
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let instances = create_instances(&documents, &cfg.masking_config(), &mut rng);
        if instances.is_empty() {
            bail!("No pretraining instances could be built; increase num_documents or max_seq_len");
        }
        tracing::info!("Built {} pretraining instances", instances.len());

        // ── Step 3: Train / validation split ──────────────────────────────────
        let (train, val) = split_train_val(instances, cfg.train_fraction, &mut rng);
        tracing::info!("Split: {} train, {} validation", train.len(), val.len());

        // ── Step 4: Burn datasets ─────────────────────────────────────────────
        let train_dataset = PretrainingDataset::new(train);
        let val_dataset   = PretrainingDataset::new(val);

        // ── Step 5: Save config ───────────────────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir)?;
        ckpt_manager.save_config(cfg)?;
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;

        // ── Step 6: Training loop (Layer 5) ───────────────────────────────────
        run_training(cfg, train_dataset, val_dataset, &ckpt_manager, &metrics)
    }
}
