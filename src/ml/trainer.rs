// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Train + validation loop using Burn's DataLoader and LARS.
//
// Key Burn 0.20 points:
//   - Training runs on an Autodiff<_> backend for gradients
//   - model.valid() returns the model on B::InnerBackend, so
//     the validation loader uses the inner backend as well
//   - argmax keeps the reduced axis, so predictions are
//     reshaped before .equal()
//
// One step:  forward (gathered MLM head) → loss → backward →
//            LarsOptimizer::step over every named parameter
//
// Reference: Burn Book §5, You et al. (2017) LARS

use anyhow::{anyhow, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::pretrain_use_case::{BackendKind, PretrainConfig};
use crate::data::{
    batcher::{PretrainingBatch, PretrainingBatcher},
    dataset::PretrainingDataset,
};
use crate::domain::instance::{PretrainingInstance, PAD_ID};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::model::{BertForPreTraining, PretrainingInput};
use crate::ml::optimizer::{LarsOptimizer, TrustRatioStats};

type WgpuBackend    = burn::backend::Autodiff<burn::backend::Wgpu>;
type NdArrayBackend = burn::backend::Autodiff<burn::backend::NdArray>;

/// What a finished run reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub epochs:        usize,
    pub steps:         usize,
    pub best_val_loss: f64,
    pub last:          Option<EpochMetrics>,
}

pub fn run_training(
    cfg:           &PretrainConfig,
    train_dataset: PretrainingDataset,
    val_dataset:   PretrainingDataset,
    ckpt_manager:  &CheckpointManager,
    metrics:       &MetricsLogger,
) -> Result<TrainingSummary> {
    match cfg.backend {
        BackendKind::Wgpu => {
            let device = burn::backend::wgpu::WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            train_loop::<WgpuBackend>(cfg, train_dataset, val_dataset, ckpt_manager, metrics, device)
        }
        BackendKind::NdArray => {
            let device = burn::backend::ndarray::NdArrayDevice::default();
            tracing::info!("Using NdArray device: {:?}", device);
            train_loop::<NdArrayBackend>(cfg, train_dataset, val_dataset, ckpt_manager, metrics, device)
        }
    }
}

/// Turn a batch into model input with labels attached.
pub fn batch_input<B: Backend>(batch: PretrainingBatch<B>, training: bool) -> PretrainingInput<B> {
    PretrainingInput::from_ids(batch.input_ids, batch.masked_lm_positions)
        .with_attention_mask(batch.attention_mask)
        .with_token_type_ids(batch.token_type_ids)
        .with_labels(batch.masked_lm_labels, batch.next_sentence_label)
        .training(training)
}

/// Loss and trust ratios of one optimizer step.
#[derive(Debug, Clone, Copy)]
pub struct StepReport {
    pub loss:  f64,
    pub trust: TrustRatioStats,
}

/// Forward, backward and one LARS update.
pub fn train_step<B: AutodiffBackend>(
    model:     BertForPreTraining<B>,
    optimizer: &mut LarsOptimizer<B>,
    batch:     PretrainingBatch<B>,
) -> Result<(BertForPreTraining<B>, StepReport)> {
    let output = model
        .forward(batch_input(batch, true))?
        .into_output()
        .ok_or_else(|| anyhow!("forward pass returned no logits"))?;
    let loss = output
        .loss
        .ok_or_else(|| anyhow!("forward pass returned no loss although labels were given"))?;

    let loss_value: f64 = loss.clone().into_scalar().elem::<f64>();
    if !loss_value.is_finite() {
        return Err(anyhow!("loss became {loss_value} at step {}", optimizer.iteration()));
    }

    let grads = GradientsParams::from_grads(loss.backward(), &model);
    let (model, trust) = optimizer.step(model, grads)?;
    Ok((model, StepReport { loss: loss_value, trust }))
}

/// Validation totals over a number of batches.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvalCounts {
    pub loss_sum:    f64,
    pub batches:     usize,
    pub mlm_correct: usize,
    pub mlm_total:   usize,
    pub nsp_correct: usize,
    pub nsp_total:   usize,
}

impl EvalCounts {
    pub fn add(&mut self, other: EvalCounts) {
        self.loss_sum    += other.loss_sum;
        self.batches     += other.batches;
        self.mlm_correct += other.mlm_correct;
        self.mlm_total   += other.mlm_total;
        self.nsp_correct += other.nsp_correct;
        self.nsp_total   += other.nsp_total;
    }

    pub fn mean_loss(&self) -> f64 {
        if self.batches > 0 { self.loss_sum / self.batches as f64 } else { f64::NAN }
    }

    pub fn mlm_accuracy(&self) -> f64 {
        if self.mlm_total > 0 { self.mlm_correct as f64 / self.mlm_total as f64 } else { 0.0 }
    }

    pub fn nsp_accuracy(&self) -> f64 {
        if self.nsp_total > 0 { self.nsp_correct as f64 / self.nsp_total as f64 } else { 0.0 }
    }
}

/// Loss and accuracies of `model` on one batch, without dropout.
pub fn evaluate_batch<B: Backend>(
    model: &BertForPreTraining<B>,
    batch: PretrainingBatch<B>,
) -> Result<EvalCounts> {
    let mlm_labels = batch.masked_lm_labels.clone();
    let nsp_labels = batch.next_sentence_label.clone();
    let [batch_size, num_masked] = mlm_labels.dims();

    let output = model
        .forward(batch_input(batch, false))?
        .into_output()
        .ok_or_else(|| anyhow!("forward pass returned no logits"))?;
    let loss = output
        .loss
        .ok_or_else(|| anyhow!("forward pass returned no loss"))?
        .into_scalar()
        .elem::<f64>();

    let active = mlm_labels.clone().not_equal_elem(PAD_ID as i64).int();
    let mlm_pred = output
        .prediction_logits
        .argmax(2)
        .reshape([batch_size, num_masked]);
    let mlm_correct: i64 = (mlm_pred.equal(mlm_labels).int() * active.clone())
        .sum()
        .into_scalar()
        .elem::<i64>();
    let mlm_total: i64 = active.sum().into_scalar().elem::<i64>();

    let nsp_pred = output.seq_relationship_logits.argmax(1).reshape([batch_size]);
    let nsp_correct: i64 = nsp_pred.equal(nsp_labels).int().sum().into_scalar().elem::<i64>();

    Ok(EvalCounts {
        loss_sum:    loss,
        batches:     1,
        mlm_correct: mlm_correct as usize,
        mlm_total:   mlm_total as usize,
        nsp_correct: nsp_correct as usize,
        nsp_total:   batch_size,
    })
}

fn train_loop<B: AutodiffBackend>(
    cfg:           &PretrainConfig,
    train_dataset: PretrainingDataset,
    val_dataset:   PretrainingDataset,
    ckpt_manager:  &CheckpointManager,
    metrics:       &MetricsLogger,
    device:        B::Device,
) -> Result<TrainingSummary> {
    // ── Build model ───────────────────────────────────────────────────────────
    let model_cfg = cfg.bert_config();
    model_cfg.validate()?;
    let model: BertForPreTraining<B> = model_cfg.init(&device);
    tracing::info!(
        "Model ready: {} layers, hidden={}, {} parameters",
        cfg.num_layers,
        cfg.hidden_size,
        model.num_params()
    );

    // ── LARS optimiser ────────────────────────────────────────────────────────
    // trust = η‖w‖ / (‖g‖ + λ‖w‖ + ε)
    // accum = μ·accum + lr·trust·(g + λw)
    // w     = w − accum
    let lars_cfg = cfg.lars_config();
    let mut optimizer = LarsOptimizer::<B>::new(lars_cfg.init()?);
    let mut model = optimizer.init_slots(model)?;
    ckpt_manager.save_lars_config(optimizer.lars().config())?;

    // ── Data loaders ──────────────────────────────────────────────────────────
    let train_loader = DataLoaderBuilder::<B, PretrainingInstance, PretrainingBatch<B>>::new(
        PretrainingBatcher::new(),
    )
    .batch_size(cfg.batch_size)
    .shuffle(cfg.seed)
    .num_workers(1)
    .set_device(device.clone())
    .build(train_dataset);

    // Validation runs on the inner backend, no autodiff overhead
    let val_loader = DataLoaderBuilder::<
        B::InnerBackend,
        PretrainingInstance,
        PretrainingBatch<B::InnerBackend>,
    >::new(PretrainingBatcher::new())
    .batch_size(cfg.batch_size)
    .num_workers(1)
    .set_device(device.clone())
    .build(val_dataset);

    // ── Epoch loop ────────────────────────────────────────────────────────────
    let mut best_val_loss = f64::INFINITY;
    let mut last = None;

    for epoch in 1..=cfg.epochs {
        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut train_batches  = 0usize;
        let mut trust          = TrustRatioStats::default();

        for batch in train_loader.iter() {
            let (next, report) = train_step(model, &mut optimizer, batch)?;
            model = next;

            train_loss_sum += report.loss;
            train_batches  += 1;
            trust.merge(&report.trust);
        }

        let avg_train_loss = if train_batches > 0 {
            train_loss_sum / train_batches as f64
        } else {
            f64::NAN
        };

        // ── Validation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();
        let mut counts = EvalCounts::default();
        for batch in val_loader.iter() {
            counts.add(evaluate_batch(&model_valid, batch)?);
        }

        let epoch_metrics = EpochMetrics {
            epoch,
            train_loss:       avg_train_loss,
            val_loss:         counts.mean_loss(),
            mlm_acc:          counts.mlm_accuracy(),
            nsp_acc:          counts.nsp_accuracy(),
            mean_trust_ratio: trust.mean(),
        };

        tracing::info!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | mlm_acc={:.1}% | nsp_acc={:.1}% | trust={:.2e} [{:.2e}, {:.2e}]",
            epoch,
            cfg.epochs,
            epoch_metrics.train_loss,
            epoch_metrics.val_loss,
            epoch_metrics.mlm_acc * 100.0,
            epoch_metrics.nsp_acc * 100.0,
            trust.mean(),
            trust.min,
            trust.max,
        );

        if epoch_metrics.is_improvement(best_val_loss) {
            best_val_loss = epoch_metrics.val_loss;
        }
        metrics.log(&epoch_metrics)?;
        ckpt_manager.save_model(&model, epoch)?;
        tracing::info!("Checkpoint saved for epoch {}", epoch);
        last = Some(epoch_metrics);
    }

    tracing::info!("Training complete after {} optimizer steps", optimizer.iteration());
    Ok(TrainingSummary {
        epochs: cfg.epochs,
        steps: optimizer.iteration(),
        best_val_loss,
        last,
    })
}
