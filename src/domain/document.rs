// ============================================================
// Layer 3 — Document Domain Type
// ============================================================
// A tokenised document: an ordered list of sentences, each a
// list of vocabulary ids. Sentence order matters: the
// next-sentence task pairs a segment with the text that
// actually follows it in the same document.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    /// Where the document came from (file name, generator seed, ...)
    pub source: String,

    /// Sentences in reading order
    pub sentences: Vec<Vec<u32>>,
}

impl Document {
    pub fn new(source: impl Into<String>, sentences: Vec<Vec<u32>>) -> Self {
        Self {
            source: source.into(),
            sentences,
        }
    }

    /// Total number of tokens across all sentences
    pub fn token_count(&self) -> usize {
        self.sentences.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.iter().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_count() {
        let doc = Document::new("d", vec![vec![1, 2, 3], vec![], vec![4]]);
        assert_eq!(doc.token_count(), 4);
        assert!(!doc.is_empty());
        assert!(Document::new("e", vec![vec![]]).is_empty());
    }
}
