// ============================================================
// Layer 3 — Pretraining Instance
// ============================================================
// One fully prepared BERT pretraining example:
//
//   [CLS] segment A [SEP] segment B [SEP] [PAD] ...
//
// `masked_lm_positions` and `masked_lm_labels` are padded to
// max_predictions_per_seq with zeros. Position 0 is always
// [CLS] (never masked) and label 0 is [PAD], which the loss
// ignores, so padded slots contribute nothing.

use serde::{Deserialize, Serialize};

pub const PAD_ID:  u32 = 0;
pub const CLS_ID:  u32 = 101;
pub const SEP_ID:  u32 = 102;
pub const MASK_ID: u32 = 103;

/// Lowest id used for ordinary word pieces.
pub const FIRST_WORD_ID: u32 = 1000;

/// Next-sentence label: segment B really follows segment A.
pub const IS_NEXT: u32 = 0;
/// Next-sentence label: segment B was drawn from another document.
pub const IS_RANDOM_NEXT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PretrainingInstance {
    /// Token ids, padded to max_seq_len
    pub input_ids:           Vec<u32>,
    /// 1 for real tokens, 0 for padding
    pub attention_mask:      Vec<u32>,
    /// 0 for [CLS] A [SEP], 1 for B [SEP], 0 for padding
    pub token_type_ids:      Vec<u32>,
    /// Offsets of masked tokens, padded to max_predictions_per_seq
    pub masked_lm_positions: Vec<u32>,
    /// Original ids at the masked offsets, padded with PAD_ID
    pub masked_lm_labels:    Vec<u32>,
    /// IS_NEXT or IS_RANDOM_NEXT
    pub next_sentence_label: u32,
}

impl PretrainingInstance {
    pub fn seq_len(&self) -> usize {
        self.input_ids.len()
    }

    /// Number of real (non-padding) masked predictions
    pub fn num_predictions(&self) -> usize {
        self.masked_lm_labels.iter().filter(|&&l| l != PAD_ID).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_predictions_ignores_padding() {
        let inst = PretrainingInstance {
            input_ids:           vec![CLS_ID, MASK_ID, SEP_ID, PAD_ID],
            attention_mask:      vec![1, 1, 1, 0],
            token_type_ids:      vec![0, 0, 0, 0],
            masked_lm_positions: vec![1, 0, 0],
            masked_lm_labels:    vec![1234, PAD_ID, PAD_ID],
            next_sentence_label: IS_NEXT,
        };
        assert_eq!(inst.seq_len(), 4);
        assert_eq!(inst.num_predictions(), 1);
    }
}
