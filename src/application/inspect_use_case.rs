// ============================================================
// Layer 2 — InspectUseCase
// ============================================================
// Reads a finished (or running) pretraining directory and shows
// how LARS treats every variable of the saved model:
//
//   Step 1: Load pretrain_config.json and lars_config.json
//   Step 2: Rebuild the optimizer (recompiles exclusion regexes)
//   Step 3: Rebuild the model, load the newest weights if any
//   Step 4: Walk the named parameters
//
// Runs on the NdArray backend; no GPU is needed to inspect.

use anyhow::{Context, Result};
use burn::{backend::NdArray, module::Param, prelude::*};

use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    lars::l2_norm,
    model::BertForPreTraining,
    params::{NamedParams, ParamVisitor},
};

type InspectBackend = NdArray;

/// How the optimizer handles one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamReport {
    pub name:             String,
    pub dims:             Vec<usize>,
    pub norm:             f64,
    pub weight_decay:     bool,
    pub layer_adaptation: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InspectReport {
    /// Epoch of the loaded weights, None for a fresh init
    pub epoch:  Option<usize>,
    pub params: Vec<ParamReport>,
}

impl InspectReport {
    pub fn total_params(&self) -> usize {
        self.params.iter().map(|p| p.dims.iter().product::<usize>()).sum()
    }

    pub fn decayed(&self) -> usize {
        self.params.iter().filter(|p| p.weight_decay).count()
    }

    pub fn adapted(&self) -> usize {
        self.params.iter().filter(|p| p.layer_adaptation).count()
    }
}

struct NormCollector {
    params: Vec<(String, Vec<usize>, f64)>,
}

impl<B: Backend> ParamVisitor<B> for NormCollector {
    fn visit<const D: usize>(
        &mut self,
        name:  &str,
        param: Param<Tensor<B, D>>,
    ) -> crate::domain::error::Result<Param<Tensor<B, D>>> {
        let value = param.val();
        self.params.push((name.to_string(), value.dims().to_vec(), l2_norm(&value)));
        Ok(param)
    }
}

// ─── InspectUseCase ───────────────────────────────────────────────────────────
pub struct InspectUseCase {
    checkpoint_dir: String,
}

impl InspectUseCase {
    pub fn new(checkpoint_dir: String) -> Self {
        Self { checkpoint_dir }
    }

    pub fn execute(&self) -> Result<InspectReport> {
        // ── Step 1: Configs ───────────────────────────────────────────────────
        let ckpt = CheckpointManager::open(&self.checkpoint_dir)?;
        let cfg = ckpt.load_config()?;
        let lars_cfg = ckpt
            .load_lars_config()
            .context("No optimizer config found; the run never reached its first step")?;

        // ── Step 2: Optimizer ─────────────────────────────────────────────────
        let lars = lars_cfg.init()?;

        // ── Step 3: Model ─────────────────────────────────────────────────────
        let device = Default::default();
        let bert_cfg = cfg.bert_config();
        bert_cfg.validate()?;
        let mut model: BertForPreTraining<InspectBackend> = bert_cfg.init(&device);
        let epoch = ckpt.latest_epoch()?;
        if epoch.is_some() {
            model = ckpt.load_model(model, &device)?;
        } else {
            tracing::warn!("No weights saved yet, inspecting a fresh initialisation");
        }

        // ── Step 4: Walk parameters ───────────────────────────────────────────
        let mut collector = NormCollector { params: Vec::new() };
        model.visit_params("", &mut collector)?;

        let params = collector
            .params
            .into_iter()
            .map(|(name, dims, norm)| ParamReport {
                weight_decay:     lars.uses_weight_decay(&name),
                layer_adaptation: lars.uses_layer_adaptation(&name),
                name,
                dims,
                norm,
            })
            .collect();

        Ok(InspectReport { epoch, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pretrain_use_case::PretrainConfig;

    fn write_run(dir: &std::path::Path) -> PretrainConfig {
        let cfg = PretrainConfig {
            checkpoint_dir:    dir.display().to_string(),
            vocab_size:        1100,
            max_seq_len:       16,
            hidden_size:       8,
            num_layers:        1,
            num_heads:         2,
            intermediate_size: 16,
            ..Default::default()
        };
        let ckpt = CheckpointManager::new(dir).unwrap();
        ckpt.save_config(&cfg).unwrap();
        ckpt.save_lars_config(&cfg.lars_config()).unwrap();
        cfg
    }

    #[test]
    fn test_inspect_fresh_run_reports_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = write_run(dir.path());

        let report = InspectUseCase::new(cfg.checkpoint_dir.clone()).execute().unwrap();
        assert_eq!(report.epoch, None);

        let expected: BertForPreTraining<InspectBackend> = cfg.bert_config().init(&Default::default());
        assert_eq!(report.total_params(), expected.num_params());

        let find = |name: &str| report.params.iter().find(|p| p.name == name).unwrap();
        let gamma = find("bert/embeddings/LayerNorm/gamma");
        assert!(!gamma.weight_decay && !gamma.layer_adaptation);
        assert!((gamma.norm - (8.0f64).sqrt()).abs() < 1e-5);

        let kernel = find("bert/encoder/layer_0/attention/self/query/kernel");
        assert!(kernel.weight_decay && kernel.layer_adaptation);
        assert_eq!(kernel.dims, vec![8, 8]);

        assert!(!find("cls/seq_relationship/bias").weight_decay);
        assert!(report.decayed() < report.params.len());
        assert_eq!(report.decayed(), report.adapted());
    }

    #[test]
    fn test_inspect_loads_saved_weights() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = write_run(dir.path());
        let model: BertForPreTraining<InspectBackend> = cfg.bert_config().init(&Default::default());
        CheckpointManager::new(dir.path()).unwrap().save_model(&model, 4).unwrap();

        let report = InspectUseCase::new(cfg.checkpoint_dir).execute().unwrap();
        assert_eq!(report.epoch, Some(4));
    }

    #[test]
    fn test_inspect_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing").display().to_string();
        assert!(InspectUseCase::new(missing).execute().is_err());
    }
}
