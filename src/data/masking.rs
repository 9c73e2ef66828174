// ============================================================
// Layer 4 — Pretraining Instance Builder
// ============================================================
// Turns documents into masked-LM / next-sentence examples:
//
//   1. accumulate sentences until the token budget is reached
//   2. split the chunk at a random sentence boundary → A | B
//   3. half the time replace B with text from another document
//      (next-sentence label IS_RANDOM_NEXT)
//   4. trim the longer side until [CLS] A [SEP] B [SEP] fits
//   5. mask ~15% of the non-special tokens:
//        80% → [MASK], 10% → random word, 10% → unchanged
//   6. pad tokens to max_seq_len and predictions to
//      max_predictions_per_seq
//
// Sentences that a random-next pair did not use are put back
// and start the next chunk.

use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

use crate::domain::document::Document;
use crate::domain::instance::{
    PretrainingInstance, CLS_ID, FIRST_WORD_ID, IS_NEXT, IS_RANDOM_NEXT, MASK_ID, PAD_ID, SEP_ID,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskingConfig {
    pub max_seq_len:             usize,
    pub max_predictions_per_seq: usize,
    pub masked_lm_prob:          f64,
    pub random_next_prob:        f64,
    /// Random replacements are drawn from FIRST_WORD_ID..vocab_size
    pub vocab_size:              usize,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            max_seq_len:             64,
            max_predictions_per_seq: 10,
            masked_lm_prob:          0.15,
            random_next_prob:        0.5,
            vocab_size:              2048,
        }
    }
}

/// Build instances from every document, in document order.
pub fn create_instances<R: Rng>(
    documents: &[Document],
    config:    &MaskingConfig,
    rng:       &mut R,
) -> Vec<PretrainingInstance> {
    let instances: Vec<PretrainingInstance> = (0..documents.len())
        .flat_map(|i| instances_from_document(documents, i, config, rng))
        .collect();

    tracing::debug!(
        documents = documents.len(),
        instances = instances.len(),
        "created pretraining instances"
    );
    instances
}

fn instances_from_document<R: Rng>(
    documents: &[Document],
    index:     usize,
    config:    &MaskingConfig,
    rng:       &mut R,
) -> Vec<PretrainingInstance> {
    let document = &documents[index];
    // [CLS], [SEP], [SEP]
    let max_tokens = config.max_seq_len.saturating_sub(3);
    if max_tokens < 2 {
        return Vec::new();
    }

    let mut instances = Vec::new();
    let mut chunk: Vec<&Vec<u32>> = Vec::new();
    let mut chunk_len = 0;
    let mut i = 0;

    while i < document.sentences.len() {
        let sentence = &document.sentences[i];
        chunk.push(sentence);
        chunk_len += sentence.len();

        let last = i + 1 == document.sentences.len();
        if last || chunk_len >= max_tokens {
            let a_end = if chunk.len() >= 2 { rng.gen_range(1..chunk.len()) } else { 1 };
            let mut tokens_a: Vec<u32> = chunk[..a_end].iter().flat_map(|s| s.iter().copied()).collect();

            let can_sample_other = documents.len() > 1;
            let random_next = can_sample_other
                && (chunk.len() == 1 || rng.gen_bool(config.random_next_prob));

            let mut tokens_b: Vec<u32> = Vec::new();
            if random_next {
                let target_b = max_tokens.saturating_sub(tokens_a.len()).max(1);
                let other = pick_other_document(documents.len(), index, rng);
                let other = &documents[other];
                if !other.sentences.is_empty() {
                    let start = rng.gen_range(0..other.sentences.len());
                    for s in &other.sentences[start..] {
                        tokens_b.extend_from_slice(s);
                        if tokens_b.len() >= target_b {
                            break;
                        }
                    }
                }
                // sentences after A were not used; revisit them
                let unused = chunk.len() - a_end;
                i -= unused;
            } else {
                tokens_b = chunk[a_end..].iter().flat_map(|s| s.iter().copied()).collect();
            }

            truncate_seq_pair(&mut tokens_a, &mut tokens_b, max_tokens, rng);
            if !tokens_a.is_empty() && !tokens_b.is_empty() {
                let label = if random_next { IS_RANDOM_NEXT } else { IS_NEXT };
                instances.push(build_instance(&tokens_a, &tokens_b, label, config, rng));
            }

            chunk.clear();
            chunk_len = 0;
        }
        i += 1;
    }
    instances
}

fn pick_other_document<R: Rng>(count: usize, current: usize, rng: &mut R) -> usize {
    // uniform over every index except `current`
    let pick = rng.gen_range(0..count - 1);
    if pick >= current { pick + 1 } else { pick }
}

/// Drop tokens from the longer segment, at a random end, until
/// the pair fits in `max_tokens`.
pub fn truncate_seq_pair<R: Rng>(
    tokens_a:   &mut Vec<u32>,
    tokens_b:   &mut Vec<u32>,
    max_tokens: usize,
    rng:        &mut R,
) {
    while tokens_a.len() + tokens_b.len() > max_tokens {
        let longer = if tokens_a.len() > tokens_b.len() { &mut *tokens_a } else { &mut *tokens_b };
        if rng.gen_bool(0.5) {
            longer.remove(0);
        } else {
            longer.pop();
        }
    }
}

/// Lay out `[CLS] A [SEP] B [SEP]`, mask it and pad it.
pub fn build_instance<R: Rng>(
    tokens_a:            &[u32],
    tokens_b:            &[u32],
    next_sentence_label: u32,
    config:              &MaskingConfig,
    rng:                 &mut R,
) -> PretrainingInstance {
    let mut tokens = Vec::with_capacity(config.max_seq_len);
    let mut token_type_ids = Vec::with_capacity(config.max_seq_len);

    tokens.push(CLS_ID);
    token_type_ids.push(0);
    for &t in tokens_a {
        tokens.push(t);
        token_type_ids.push(0);
    }
    tokens.push(SEP_ID);
    token_type_ids.push(0);
    for &t in tokens_b {
        tokens.push(t);
        token_type_ids.push(1);
    }
    tokens.push(SEP_ID);
    token_type_ids.push(1);

    let (positions, labels) = mask_tokens(&mut tokens, config, rng);

    let real = tokens.len();
    let mut attention_mask = vec![1; real];
    tokens.resize(config.max_seq_len, PAD_ID);
    token_type_ids.resize(config.max_seq_len, 0);
    attention_mask.resize(config.max_seq_len, 0);

    let mut masked_lm_positions = positions;
    let mut masked_lm_labels    = labels;
    masked_lm_positions.resize(config.max_predictions_per_seq, 0);
    masked_lm_labels.resize(config.max_predictions_per_seq, PAD_ID);

    PretrainingInstance {
        input_ids: tokens,
        attention_mask,
        token_type_ids,
        masked_lm_positions,
        masked_lm_labels,
        next_sentence_label,
    }
}

/// Mask tokens in place. Returns (positions, original ids), sorted by position.
fn mask_tokens<R: Rng>(
    tokens: &mut [u32],
    config: &MaskingConfig,
    rng:    &mut R,
) -> (Vec<u32>, Vec<u32>) {
    let mut candidates: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|&(_, &t)| t != CLS_ID && t != SEP_ID)
        .map(|(i, _)| i)
        .collect();
    candidates.shuffle(rng);

    let wanted = ((tokens.len() as f64) * config.masked_lm_prob).round() as usize;
    let num_to_predict = wanted.max(1).min(config.max_predictions_per_seq).min(candidates.len());

    let mut picked: Vec<(usize, u32)> = Vec::with_capacity(num_to_predict);
    for &index in candidates.iter().take(num_to_predict) {
        let original = tokens[index];
        let roll: f64 = rng.gen();
        tokens[index] = if roll < 0.8 {
            MASK_ID
        } else if roll < 0.9 {
            original
        } else {
            rng.gen_range(FIRST_WORD_ID..config.vocab_size.max(FIRST_WORD_ID as usize + 1) as u32)
        };
        picked.push((index, original));
    }
    picked.sort_by_key(|&(index, _)| index);

    picked.into_iter().map(|(index, label)| (index as u32, label)).unzip()
}
