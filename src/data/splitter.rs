// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles instances and splits them into a training set and a
// held-out validation set. Instances from one document sit next
// to each other, so the shuffle keeps validation from being a
// single contiguous slice of documents.
//
// The caller passes the RNG: a seeded StdRng makes the split
// reproducible across runs.

use rand::{seq::SliceRandom, Rng};

/// Shuffle `samples` with `rng` and split into (train, validation).
///
/// `train_fraction` of the samples (rounded) go to training.
pub fn split_train_val<T, R: Rng>(
    mut samples:    Vec<T>,
    train_fraction: f64,
    rng:            &mut R,
) -> (Vec<T>, Vec<T>) {
    samples.shuffle(rng);

    let total    = samples.len();
    let split_at = ((total as f64) * train_fraction.clamp(0.0, 1.0)).round() as usize;
    let split_at = split_at.min(total);

    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation ({}% / {}%)",
        samples.len(),
        val.len(),
        (samples.len() * 100) / total.max(1),
        (val.len()     * 100) / total.max(1),
    );

    (samples, val)
}
