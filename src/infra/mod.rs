// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// File persistence used by the application and ml layers:
//
//   checkpoint.rs — model weights (Burn CompactRecorder), the
//                   run config and the LARS config export, so a
//                   run can be inspected or rebuilt later.
//
//   metrics.rs    — per-epoch CSV log (loss, masked-LM and
//                   next-sentence accuracy, mean trust ratio).
//
// Reference: Burn Book §5 (Checkpointing)
//            Rust Book §9 (Error Handling with anyhow)

/// Model checkpoint and config saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;
