// ============================================================
// Layer 3 — Variable Names and Exclusion Lists
// ============================================================
// Trainable variables are identified by hierarchical names such
// as "bert/encoder/layer_3/output/LayerNorm/gamma". A name may
// carry a trailing ":<index>" output suffix; matching always
// happens on the base name with that suffix removed.
//
// An ExclusionList holds regexes compiled once when the
// optimizer is built. A variable is excluded when ANY pattern
// matches ANYWHERE in its base name (search, not full match).

use regex::Regex;

use crate::domain::error::{Error, Result};

/// Strip a trailing ":<digits>" suffix from a variable name.
///
/// "dense/kernel:0" → "dense/kernel", "dense/kernel" → unchanged.
/// A colon followed by anything other than digits is kept.
pub fn base_name(name: &str) -> &str {
    match name.rsplit_once(':') {
        Some((base, index))
            if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base
        }
        _ => name,
    }
}

/// Precompiled list of regex patterns.
#[derive(Debug, Clone, Default)]
pub struct ExclusionList {
    patterns: Vec<Regex>,
}

impl ExclusionList {
    /// Compile every pattern, failing on the first invalid one.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|source| Error::Pattern {
                    pattern: p.as_ref().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// True if any pattern is found in `name`.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(name))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }
}
