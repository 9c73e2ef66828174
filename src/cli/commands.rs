// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `pretrain` and `inspect`
// and all their configurable flags.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};
use crate::application::pretrain_use_case::{BackendKind, PretrainConfig};

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pretrain a BERT model with LARS on a synthetic corpus
    Pretrain(PretrainArgs),

    /// Show how LARS treats each variable of a saved run
    Inspect(InspectArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    Wgpu,
    Ndarray,
}

impl From<BackendArg> for BackendKind {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Wgpu    => BackendKind::Wgpu,
            BackendArg::Ndarray => BackendKind::NdArray,
        }
    }
}

/// All arguments for the `pretrain` command.
#[derive(Args, Debug)]
pub struct PretrainArgs {
    /// Directory to save checkpoints, configs and metrics
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,

    /// Seed for corpus generation, masking, splitting and shuffling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value_t = 200)]
    pub num_documents: usize,

    /// Ids below 1000 are reserved for special tokens
    #[arg(long, default_value_t = 2048)]
    pub vocab_size: usize,

    /// Format: [CLS] A [SEP] B [SEP] + padding
    #[arg(long, default_value_t = 64)]
    pub max_seq_len: usize,

    /// Width of the gathered masked-LM head input
    #[arg(long, default_value_t = 10)]
    pub max_predictions_per_seq: usize,

    #[arg(long, default_value_t = 0.15)]
    pub masked_lm_prob: f64,

    #[arg(long, default_value_t = 128)]
    pub hidden_size: usize,

    #[arg(long, default_value_t = 2)]
    pub num_layers: usize,

    /// hidden_size must be divisible by num_heads
    #[arg(long, default_value_t = 4)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 512)]
    pub intermediate_size: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 3)]
    pub epochs: usize,

    /// Peak learning rate, scaled per variable by the trust ratio
    #[arg(long, default_value_t = 1.0)]
    pub lr: f64,

    /// Linear decay target; only used with --decay-steps
    #[arg(long, default_value_t = 0.0)]
    pub end_lr: f64,

    /// 0 keeps the learning rate constant
    #[arg(long, default_value_t = 0)]
    pub decay_steps: usize,

    #[arg(long, default_value_t = 0)]
    pub warmup_steps: usize,

    #[arg(long, default_value_t = 0.9)]
    pub momentum: f64,

    #[arg(long, default_value_t = 1e-4)]
    pub weight_decay: f64,

    /// LARS trust coefficient
    #[arg(long, default_value_t = 1e-3)]
    pub eeta: f64,

    /// Trust ratio denominator term; 1e-7 when omitted
    #[arg(long)]
    pub epsilon: Option<f64>,

    #[arg(long)]
    pub nesterov: bool,

    /// Regex; matching variables skip weight decay (repeatable)
    #[arg(long = "exclude-from-weight-decay", default_values_t = vec!["LayerNorm".to_string(), "bias".to_string()])]
    pub exclude_from_weight_decay: Vec<String>,

    /// Regex; matching variables use trust ratio 1 (repeatable)
    #[arg(long = "exclude-from-layer-adaptation", default_values_t = vec!["LayerNorm".to_string(), "bias".to_string()])]
    pub exclude_from_layer_adaptation: Vec<String>,
}

/// Convert CLI PretrainArgs into the application-layer PretrainConfig.
/// The application layer never sees clap types.
impl From<PretrainArgs> for PretrainConfig {
    fn from(a: PretrainArgs) -> Self {
        PretrainConfig {
            checkpoint_dir:                a.checkpoint_dir,
            backend:                       a.backend.into(),
            seed:                          a.seed,
            num_documents:                 a.num_documents,
            vocab_size:                    a.vocab_size,
            max_seq_len:                   a.max_seq_len,
            max_predictions_per_seq:       a.max_predictions_per_seq,
            masked_lm_prob:                a.masked_lm_prob,
            hidden_size:                   a.hidden_size,
            num_layers:                    a.num_layers,
            num_heads:                     a.num_heads,
            intermediate_size:             a.intermediate_size,
            dropout:                       a.dropout,
            batch_size:                    a.batch_size,
            epochs:                        a.epochs,
            learning_rate:                 a.lr,
            end_learning_rate:             a.end_lr,
            decay_steps:                   a.decay_steps,
            warmup_steps:                  a.warmup_steps,
            momentum:                      a.momentum,
            weight_decay:                  a.weight_decay,
            eeta:                          a.eeta,
            epsilon:                       a.epsilon,
            use_nesterov:                  a.nesterov,
            exclude_from_weight_decay:     a.exclude_from_weight_decay,
            exclude_from_layer_adaptation: a.exclude_from_layer_adaptation,
            ..Default::default()
        }
    }
}

/// All arguments for the `inspect` command
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Directory written by a previous `pretrain` run
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Print one line per variable, not just the totals
    #[arg(long)]
    pub verbose: bool,
}
