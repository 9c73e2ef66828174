// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types shared by every other layer.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only structs, enums, traits and pure functions
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

/// Typed errors for the numerical core
pub mod error;

/// Floating point formats and host-side rounding
pub mod precision;

/// Variable names and regex exclusion lists
pub mod variable;

/// A tokenised document (ordered sentences)
pub mod document;

/// One masked-LM / next-sentence pretraining example
pub mod instance;

/// Core abstractions (traits) that other layers implement
pub mod traits;
