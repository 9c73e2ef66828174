// ============================================================
// Layer 5 — Momentum Apply and Slot Storage
// ============================================================
// `apply_momentum` is the fused momentum-update primitive:
//
//   accum ← μ·accum + g
//   var   ← var − lr·accum                 (standard)
//   var   ← var − lr·g − lr·μ·accum        (Nesterov)
//
// LARS calls it with lr = 1 and g already multiplied by the
// trust-ratio-scaled step size.
//
// MomentumSlots owns one accumulator per variable name. Slots
// are stored flattened with their original dims so variables
// of any rank share one map.

use burn::prelude::*;
use burn::tensor::FloatDType;
use std::collections::HashMap;

use crate::domain::error::{Error, Result};
use crate::domain::precision::Precision;
use crate::ml::apply_state::precision_of;

pub(crate) fn float_dtype(precision: Precision) -> FloatDType {
    match precision {
        Precision::F64  => FloatDType::F64,
        Precision::F32  => FloatDType::F32,
        Precision::F16  => FloatDType::F16,
        Precision::BF16 => FloatDType::BF16,
    }
}

/// Cast `tensor` to `precision` unless it is already stored that way.
pub(crate) fn cast_to<B: Backend, const D: usize>(
    tensor:    Tensor<B, D>,
    precision: Precision,
) -> Tensor<B, D> {
    if precision_of(&tensor) == precision {
        tensor
    } else {
        tensor.cast(float_dtype(precision))
    }
}

/// Fused momentum update. Returns `(var, accum)`.
///
/// The accumulator may be stored in a different precision than
/// the variable; `grad` is cast to the accumulator's precision
/// and the step is cast back to the variable's.
pub fn apply_momentum<B: Backend, const D: usize>(
    var:          Tensor<B, D>,
    accum:        Tensor<B, D>,
    lr:           f64,
    grad:         Tensor<B, D>,
    momentum:     f64,
    use_nesterov: bool,
) -> (Tensor<B, D>, Tensor<B, D>) {
    let var_precision   = precision_of(&var);
    let accum_precision = precision_of(&accum);

    let grad  = cast_to(grad, accum_precision);
    let accum = accum.mul_scalar(momentum) + grad.clone();

    let step = if use_nesterov {
        grad.mul_scalar(lr) + accum.clone().mul_scalar(lr * momentum)
    } else {
        accum.clone().mul_scalar(lr)
    };

    (var - cast_to(step, var_precision), accum)
}

struct FlatSlot<B: Backend> {
    dims: Vec<usize>,
    flat: Tensor<B, 1>,
}

/// Momentum accumulators keyed by variable name.
pub struct MomentumSlots<B: Backend> {
    slots: HashMap<String, FlatSlot<B>>,
}

impl<B: Backend> Default for MomentumSlots<B> {
    fn default() -> Self {
        Self { slots: HashMap::new() }
    }
}

impl<B: Backend> MomentumSlots<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Store (or replace) the accumulator for `name`.
    pub fn insert<const D: usize>(&mut self, name: impl Into<String>, accum: Tensor<B, D>) {
        let dims = accum.dims().to_vec();
        let numel = dims.iter().product::<usize>();
        let flat = accum.reshape([numel]);
        self.slots.insert(name.into(), FlatSlot { dims, flat });
    }

    /// Remove and return the accumulator for `name` in its original shape.
    pub fn take<const D: usize>(&mut self, name: &str) -> Result<Option<Tensor<B, D>>> {
        let Some(slot) = self.slots.remove(name) else {
            return Ok(None);
        };
        let dims: [usize; D] = slot.dims.as_slice().try_into().map_err(|_| {
            Error::invalid_argument(format!(
                "momentum slot '{name}' has rank {}, requested rank {D}",
                slot.dims.len()
            ))
        })?;
        Ok(Some(slot.flat.reshape(dims)))
    }

    /// A copy of the accumulator for `name`, leaving the slot in place.
    pub fn get<const D: usize>(&self, name: &str) -> Result<Option<Tensor<B, D>>> {
        let Some(slot) = self.slots.get(name) else {
            return Ok(None);
        };
        let dims: [usize; D] = slot.dims.as_slice().try_into().map_err(|_| {
            Error::invalid_argument(format!(
                "momentum slot '{name}' has rank {}, requested rank {D}",
                slot.dims.len()
            ))
        })?;
        Ok(Some(slot.flat.clone().reshape(dims)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn scalar(t: Tensor<B, 1>) -> f32 {
        t.into_data().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn test_standard_momentum() {
        let device = Default::default();
        let var   = Tensor::<B, 1>::from_floats([1.0], &device);
        let accum = Tensor::<B, 1>::from_floats([0.5], &device);
        let grad  = Tensor::<B, 1>::from_floats([0.2], &device);

        let (var, accum) = apply_momentum(var, accum, 1.0, grad, 0.9, false);
        // accum = 0.9*0.5 + 0.2 = 0.65 ; var = 1 - 0.65
        assert!((scalar(accum) - 0.65).abs() < 1e-6);
        assert!((scalar(var) - 0.35).abs() < 1e-6);
    }

    #[test]
    fn test_nesterov_momentum() {
        let device = Default::default();
        let var   = Tensor::<B, 1>::from_floats([1.0], &device);
        let accum = Tensor::<B, 1>::from_floats([0.5], &device);
        let grad  = Tensor::<B, 1>::from_floats([0.2], &device);

        let (var, accum) = apply_momentum(var, accum, 1.0, grad, 0.9, true);
        // accum = 0.65 ; var = 1 - 0.2 - 0.9*0.65 = 0.215
        assert!((scalar(accum) - 0.65).abs() < 1e-6);
        assert!((scalar(var) - 0.215).abs() < 1e-6);
    }

    #[test]
    fn test_slots_keep_shape() {
        let device = Default::default();
        let mut slots = MomentumSlots::<B>::new();
        slots.insert("w", Tensor::<B, 2>::ones([2, 3], &device));
        assert!(slots.contains("w"));

        let peek: Tensor<B, 2> = slots.get("w").unwrap().unwrap();
        assert_eq!(peek.dims(), [2, 3]);

        let w: Tensor<B, 2> = slots.take("w").unwrap().unwrap();
        assert_eq!(w.dims(), [2, 3]);
        assert!(slots.is_empty());
        assert!(slots.take::<2>("w").unwrap().is_none());
    }

    #[test]
    fn test_slot_rank_mismatch_is_error() {
        let device = Default::default();
        let mut slots = MomentumSlots::<B>::new();
        slots.insert("b", Tensor::<B, 1>::zeros([4], &device));
        let err = slots.take::<2>("b").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
