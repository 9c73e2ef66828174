// ============================================================
// Layer 4 — Pretraining Batcher
// ============================================================
// Implements Burn's Batcher trait to stack PretrainingInstances
// into tensors.
//
//   Input:  N instances, sequences of length S, M prediction slots
//   Output: PretrainingBatch
//             input_ids / attention_mask / token_type_ids  [N, S]
//             masked_lm_positions / masked_lm_labels       [N, M]
//             next_sentence_label                          [N]
//
// Each field is flattened row by row into one Vec<i32> and
// reshaped. Instances are already padded to a common S and M,
// so no dynamic padding happens here.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::domain::instance::PretrainingInstance;

// ─── PretrainingBatch ─────────────────────────────────────────────────────────
/// A batch of pretraining instances. All tensors have the batch
/// size as their first dimension.
#[derive(Debug, Clone)]
pub struct PretrainingBatch<B: Backend> {
    /// [batch, seq_len]
    pub input_ids: Tensor<B, 2, Int>,

    /// [batch, seq_len]: 1 = real token, 0 = padding
    pub attention_mask: Tensor<B, 2, Int>,

    /// [batch, seq_len]: 0 = segment A, 1 = segment B
    pub token_type_ids: Tensor<B, 2, Int>,

    /// [batch, max_predictions]: offsets of the masked tokens
    pub masked_lm_positions: Tensor<B, 2, Int>,

    /// [batch, max_predictions]: original ids, 0 in padded slots
    pub masked_lm_labels: Tensor<B, 2, Int>,

    /// [batch]
    pub next_sentence_label: Tensor<B, 1, Int>,
}

// ─── PretrainingBatcher ───────────────────────────────────────────────────────
#[derive(Clone, Debug, Default)]
pub struct PretrainingBatcher;

impl PretrainingBatcher {
    pub fn new() -> Self {
        Self
    }
}

fn stack<B: Backend>(
    items:  &[PretrainingInstance],
    width:  usize,
    field:  impl Fn(&PretrainingInstance) -> &[u32],
    device: &B::Device,
) -> Tensor<B, 2, Int> {
    if items.is_empty() {
        return Tensor::zeros([0, width], device);
    }
    let flat: Vec<i32> = items
        .iter()
        .flat_map(|item| field(item).iter().map(|&x| x as i32))
        .collect();
    Tensor::<B, 1, Int>::from_ints(flat.as_slice(), device).reshape([items.len(), width])
}

impl<B: Backend> Batcher<B, PretrainingInstance, PretrainingBatch<B>> for PretrainingBatcher {
    fn batch(&self, items: Vec<PretrainingInstance>, device: &B::Device) -> PretrainingBatch<B> {
        let seq_len   = items.first().map(PretrainingInstance::seq_len).unwrap_or(0);
        let num_slots = items.first().map(|i| i.masked_lm_positions.len()).unwrap_or(0);

        let labels: Vec<i32> = items.iter().map(|i| i.next_sentence_label as i32).collect();
        let next_sentence_label = if labels.is_empty() {
            Tensor::zeros([0], device)
        } else {
            Tensor::<B, 1, Int>::from_ints(labels.as_slice(), device)
        };

        PretrainingBatch {
            input_ids:           stack(&items, seq_len, |i| &i.input_ids, device),
            attention_mask:      stack(&items, seq_len, |i| &i.attention_mask, device),
            token_type_ids:      stack(&items, seq_len, |i| &i.token_type_ids, device),
            masked_lm_positions: stack(&items, num_slots, |i| &i.masked_lm_positions, device),
            masked_lm_labels:    stack(&items, num_slots, |i| &i.masked_lm_labels, device),
            next_sentence_label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn instance(offset: u32) -> PretrainingInstance {
        PretrainingInstance {
            input_ids:           vec![101, 1000 + offset, 103, 102, 0],
            attention_mask:      vec![1, 1, 1, 1, 0],
            token_type_ids:      vec![0, 0, 0, 0, 0],
            masked_lm_positions: vec![2, 0],
            masked_lm_labels:    vec![1500 + offset, 0],
            next_sentence_label: offset % 2,
        }
    }

    #[test]
    fn test_batch_shapes_and_values() {
        let device = Default::default();
        let batch: PretrainingBatch<B> =
            PretrainingBatcher::new().batch(vec![instance(0), instance(1), instance(2)], &device);

        assert_eq!(batch.input_ids.dims(), [3, 5]);
        assert_eq!(batch.token_type_ids.dims(), [3, 5]);
        assert_eq!(batch.masked_lm_positions.dims(), [3, 2]);
        assert_eq!(batch.next_sentence_label.dims(), [3]);

        let ids: Vec<i64> = batch.input_ids.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(ids[1], 1000);
        assert_eq!(ids[6], 1001);
        assert_eq!(ids[11], 1002);

        let labels: Vec<i64> = batch
            .masked_lm_labels
            .into_data()
            .convert::<i64>()
            .to_vec()
            .unwrap();
        assert_eq!(labels, vec![1500, 0, 1501, 0, 1502, 0]);

        let nsp: Vec<i64> = batch.next_sentence_label.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(nsp, vec![0, 1, 0]);
    }

    #[test]
    fn test_empty_batch() {
        let device = Default::default();
        let batch: PretrainingBatch<B> = PretrainingBatcher::new().batch(vec![], &device);
        assert_eq!(batch.input_ids.dims(), [0, 0]);
        assert_eq!(batch.attention_mask.dims(), [0, 0]);
        assert_eq!(batch.masked_lm_positions.dims(), [0, 0]);
        assert_eq!(batch.masked_lm_labels.dims(), [0, 0]);
        assert_eq!(batch.next_sentence_label.dims(), [0]);
        assert_eq!(batch.input_ids.into_data().num_elements(), 0);
    }
}
