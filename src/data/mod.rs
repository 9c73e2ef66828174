// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from tokenised documents to tensor batches.
//
//   CorpusSource (SyntheticCorpus)  → Vec<Document>
//       │
//       ▼
//   create_instances               → [CLS] A [SEP] B [SEP], masked
//       │
//       ▼
//   split_train_val                → train / validation
//       │
//       ▼
//   PretrainingDataset             → Burn Dataset
//       │
//       ▼
//   PretrainingBatcher             → PretrainingBatch tensors
//       │
//       ▼
//   DataLoader                     → the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Devlin et al. (2019) BERT, §3.1 (pre-training tasks)

/// Seeded generator of tokenised documents
pub mod corpus;

/// Masked-LM / next-sentence instance creation
pub mod masking;

/// Implements Burn's Dataset trait for pretraining instances
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
