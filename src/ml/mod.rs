// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that runs tensor math lives here.
//
//   gather.rs      — masked-position gather: picks the rows of
//                    a [batch, seq, hidden] tensor named by a
//                    [batch, masked] index tensor
//   sharding.rs    — SPMD partition annotation for the input
//                    embeddings (recorded, single device)
//   encoder.rs     — embeddings, self-attention and encoder
//                    layer building blocks
//   model.rs       — BertForPreTraining: encoder, pooler,
//                    gathered masked-LM head, next-sentence head
//   output.rs      — dict / tuple view of the forward outputs
//   params.rs      — hierarchical parameter names
//
//   schedule.rs    — learning rate schedules
//   apply_state.rs — per-step coefficients keyed by
//                    (device, dtype)
//   momentum.rs    — named momentum accumulators
//   lars.rs        — the LARS update rule
//   optimizer.rs   — LARS driven over a whole module
//   trainer.rs     — train / validation loop
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Devlin et al. (2019) BERT
//            You et al. (2017) Large Batch Training of
//            Convolutional Networks

/// Gather vectors at masked positions
pub mod gather;

/// Partition annotations
pub mod sharding;

/// Encoder building blocks
pub mod encoder;

/// BERT pretraining model
pub mod model;

/// Forward output containers
pub mod output;

/// Parameter naming and visiting
pub mod params;

/// Learning rate schedules
pub mod schedule;

/// Per-step LARS coefficients
pub mod apply_state;

/// Momentum slot storage
pub mod momentum;

/// LARS optimizer rule
pub mod lars;

/// LARS over a Burn module
pub mod optimizer;

/// Full training loop with validation and checkpointing
pub mod trainer;
