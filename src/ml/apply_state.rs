// ============================================================
// Layer 5 — Per-Step Coefficient Cache
// ============================================================
// Hyperparameters are materialised once per step for every
// (device, precision) pair in use, then shared read-only by
// all variable updates of that step.
//
// ApplyState is plain data: Send + Sync, cloned cheaply, never
// mutated after `Lars::prepare` builds it.

use burn::prelude::*;
use burn::tensor::DType;
use std::collections::HashMap;

use crate::domain::precision::Precision;

/// Hyperparameter values for one (device, precision) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    /// Decayed learning rate, in the variable's precision
    pub lr_t:         f64,
    /// Momentum coefficient μ
    pub momentum:     f64,
    /// LARS coefficient η
    pub eeta:         f64,
    /// Weight decay rate λ
    pub weight_decay: f64,
    /// Trust-ratio denominator epsilon ε
    pub epsilon:      f64,
}

/// Cache key: the device a variable lives on and its storage precision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoefficientKey {
    pub device:    String,
    pub precision: Precision,
}

impl CoefficientKey {
    pub fn new(device: impl Into<String>, precision: Precision) -> Self {
        Self { device: device.into(), precision }
    }

    /// Key for the device and dtype of `tensor`.
    pub fn of<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> Self {
        Self::new(format!("{:?}", tensor.device()), precision_of(tensor))
    }
}

/// Storage precision of a float tensor.
pub fn precision_of<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> Precision {
    match tensor.dtype() {
        DType::F64  => Precision::F64,
        DType::F16  => Precision::F16,
        DType::BF16 => Precision::BF16,
        // F32, Flex32 and anything exotic compute as f32
        _           => Precision::F32,
    }
}

/// Coefficients for every key seen in one step.
#[derive(Debug, Clone, Default)]
pub struct ApplyState {
    iteration: usize,
    entries:   HashMap<CoefficientKey, Coefficients>,
}

impl ApplyState {
    pub fn new(iteration: usize) -> Self {
        Self { iteration, entries: HashMap::new() }
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn get(&self, key: &CoefficientKey) -> Option<&Coefficients> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &CoefficientKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn insert(&mut self, key: CoefficientKey, coefficients: Coefficients) {
        self.entries.insert(key, coefficients);
    }
}
