// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer only sees CorpusSource, so the
// synthetic generator can be swapped for a real tokenised
// corpus without touching the masking or training code.

use anyhow::Result;
use crate::domain::document::Document;

// ─── CorpusSource ─────────────────────────────────────────────────────────────
/// Anything that can produce tokenised documents for pretraining.
///
/// Implementations:
///   - SyntheticCorpus → random sentences over a fixed vocabulary
pub trait CorpusSource {
    /// Load every available document.
    fn load_all(&self) -> Result<Vec<Document>>;

    /// Vocabulary size the produced ids are drawn from.
    fn vocab_size(&self) -> usize;
}
