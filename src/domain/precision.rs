// ============================================================
// Layer 3 — Numeric Precision
// ============================================================
// The floating point formats the optimizer can compute in or
// store momentum in. Kept free of Burn types; the ml layer
// maps these to Burn's DType / FloatDType.
//
// `round` models a cast to the precision and back to f64, so
// host-side scalar arithmetic (norms, trust ratio, step size)
// sees the same rounding the device would.

use half::{bf16, f16};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    F64,
    F32,
    F16,
    BF16,
}

impl Precision {
    /// Round `value` to this precision, returned widened to f64.
    pub fn round(self, value: f64) -> f64 {
        match self {
            Precision::F64  => value,
            Precision::F32  => value as f32 as f64,
            Precision::F16  => f16::from_f64(value).to_f64(),
            Precision::BF16 => bf16::from_f64(value).to_f64(),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Precision::F64  => "f64",
            Precision::F32  => "f32",
            Precision::F16  => "f16",
            Precision::BF16 => "bf16",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f64_is_exact() {
        assert_eq!(Precision::F64.round(0.1), 0.1);
    }

    #[test]
    fn test_f32_rounds_like_a_cast() {
        assert_eq!(Precision::F32.round(0.1), 0.1f32 as f64);
        assert_ne!(Precision::F32.round(0.1), 0.1);
    }

    #[test]
    fn test_half_precisions_lose_more_bits() {
        let x = 1.0 + 1e-3;
        // f16 has a 10-bit mantissa, bf16 only 7
        assert!((Precision::F16.round(x) - x).abs() < 1e-3);
        assert_eq!(Precision::BF16.round(x), 1.0);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Precision::BF16).unwrap();
        assert_eq!(json, "\"bf16\"");
        let back: Precision = serde_json::from_str("\"f32\"").unwrap();
        assert_eq!(back, Precision::F32);
    }
}
