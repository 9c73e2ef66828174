// ============================================================
// Layer 4 — Synthetic Corpus
// ============================================================
// Generates tokenised documents directly as id sequences, so
// the pretraining pipeline runs end to end without a tokenizer
// or a text corpus on disk.
//
// Each document draws its words from a small per-document
// "topic" window of the vocabulary. Consecutive sentences of a
// document therefore share vocabulary while a random sentence
// from another document usually does not, which gives the
// next-sentence head something real to learn.

use anyhow::{bail, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::domain::document::Document;
use crate::domain::instance::FIRST_WORD_ID;
use crate::domain::traits::CorpusSource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticCorpus {
    pub num_documents:      usize,
    pub min_sentences:      usize,
    pub max_sentences:      usize,
    pub min_sentence_len:   usize,
    pub max_sentence_len:   usize,
    /// Ids are drawn from FIRST_WORD_ID..vocab_size
    pub vocab_size:         usize,
    /// Width of each document's vocabulary window
    pub topic_width:        usize,
    pub seed:               u64,
}

impl Default for SyntheticCorpus {
    fn default() -> Self {
        Self {
            num_documents:    200,
            min_sentences:    4,
            max_sentences:    12,
            min_sentence_len: 4,
            max_sentence_len: 16,
            vocab_size:       2048,
            topic_width:      64,
            seed:             42,
        }
    }
}

impl SyntheticCorpus {
    fn validate(&self) -> Result<()> {
        let first = FIRST_WORD_ID as usize;
        if self.vocab_size <= first {
            bail!("vocab_size {} must exceed the first word id {first}", self.vocab_size);
        }
        if self.min_sentences == 0 || self.min_sentences > self.max_sentences {
            bail!(
                "sentence count range [{}, {}] is empty",
                self.min_sentences, self.max_sentences
            );
        }
        if self.min_sentence_len == 0 || self.min_sentence_len > self.max_sentence_len {
            bail!(
                "sentence length range [{}, {}] is empty",
                self.min_sentence_len, self.max_sentence_len
            );
        }
        if self.topic_width == 0 {
            bail!("topic_width must be positive");
        }
        Ok(())
    }

    fn document(&self, index: usize, rng: &mut StdRng) -> Document {
        let first = FIRST_WORD_ID as usize;
        let words = self.vocab_size - first;
        let width = self.topic_width.min(words);
        let topic_start = first + rng.gen_range(0..=words - width);

        let sentence_count = rng.gen_range(self.min_sentences..=self.max_sentences);
        let sentences = (0..sentence_count)
            .map(|_| {
                let len = rng.gen_range(self.min_sentence_len..=self.max_sentence_len);
                (0..len)
                    .map(|_| (topic_start + rng.gen_range(0..width)) as u32)
                    .collect()
            })
            .collect();

        Document::new(format!("synthetic-{}-{index}", self.seed), sentences)
    }
}

impl CorpusSource for SyntheticCorpus {
    fn load_all(&self) -> Result<Vec<Document>> {
        self.validate()?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let documents: Vec<Document> = (0..self.num_documents)
            .map(|i| self.document(i, &mut rng))
            .collect();

        tracing::info!(
            documents = documents.len(),
            tokens = documents.iter().map(Document::token_count).sum::<usize>(),
            "generated synthetic corpus"
        );
        Ok(documents)
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}
