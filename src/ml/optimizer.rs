// ============================================================
// Layer 5 — LARS Step Over a Burn Module
// ============================================================
// Lars works on single tensors; LarsOptimizer applies it to a
// whole model once per training step:
//
//   1. collect the (device, precision) key of every parameter
//   2. Lars::prepare → one ApplyState for the step
//   3. for each named parameter with a gradient:
//        take its momentum slot (zero on first sight)
//        apply_dense on the inner (non-autodiff) tensors
//        put the slot back, write the new weight into the Param
//
// Parameters without a gradient (frozen, or unused in the
// forward pass) are left untouched and keep their slot.

use burn::{
    module::Param,
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::domain::error::Result;
use crate::ml::apply_state::{ApplyState, CoefficientKey};
use crate::ml::lars::Lars;
use crate::ml::momentum::MomentumSlots;
use crate::ml::params::{NamedParams, ParamVisitor};

// ─── Visitors ─────────────────────────────────────────────────────────────────

/// Gathers the coefficient key of every parameter.
#[derive(Debug, Default)]
pub struct KeyCollector {
    pub keys: Vec<CoefficientKey>,
}

impl<B: Backend> ParamVisitor<B> for KeyCollector {
    fn visit<const D: usize>(
        &mut self,
        _name: &str,
        param: Param<Tensor<B, D>>,
    ) -> Result<Param<Tensor<B, D>>> {
        self.keys.push(CoefficientKey::of(&param.val()));
        Ok(param)
    }
}

/// Creates a zero momentum slot for every parameter that lacks one.
pub struct SlotInitializer<'a, B: Backend> {
    lars:  &'a Lars,
    slots: &'a mut MomentumSlots<B>,
}

impl<B: Backend> ParamVisitor<B> for SlotInitializer<'_, B> {
    fn visit<const D: usize>(
        &mut self,
        name:  &str,
        param: Param<Tensor<B, D>>,
    ) -> Result<Param<Tensor<B, D>>> {
        if !self.slots.contains(name) {
            self.slots.insert(name, self.lars.create_slot(&param.val()));
        }
        Ok(param)
    }
}

/// SlotInitializer for autodiff models: slots live on the inner backend.
struct InnerSlotInitializer<'a, B: AutodiffBackend> {
    lars:  &'a Lars,
    slots: &'a mut MomentumSlots<B::InnerBackend>,
}

impl<B: AutodiffBackend> ParamVisitor<B> for InnerSlotInitializer<'_, B> {
    fn visit<const D: usize>(
        &mut self,
        name:  &str,
        param: Param<Tensor<B, D>>,
    ) -> Result<Param<Tensor<B, D>>> {
        if !self.slots.contains(name) {
            self.slots.insert(name, self.lars.create_slot(&param.val().inner()));
        }
        Ok(param)
    }
}

/// Running summary of the trust ratios applied in one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustRatioStats {
    pub count: usize,
    pub sum:   f64,
    pub min:   f64,
    pub max:   f64,
}

impl Default for TrustRatioStats {
    fn default() -> Self {
        Self { count: 0, sum: 0.0, min: f64::INFINITY, max: f64::NEG_INFINITY }
    }
}

impl TrustRatioStats {
    pub fn record(&mut self, ratio: f64) {
        self.count += 1;
        self.sum += ratio;
        self.min = self.min.min(ratio);
        self.max = self.max.max(ratio);
    }

    pub fn merge(&mut self, other: &TrustRatioStats) {
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.sum / self.count as f64 }
    }
}

struct LarsStep<'a, B: AutodiffBackend> {
    lars:  &'a Lars,
    state: &'a ApplyState,
    grads: &'a mut GradientsParams,
    slots: &'a mut MomentumSlots<B::InnerBackend>,
    stats: TrustRatioStats,
}

impl<B: AutodiffBackend> ParamVisitor<B> for LarsStep<'_, B> {
    fn visit<const D: usize>(
        &mut self,
        name:  &str,
        param: Param<Tensor<B, D>>,
    ) -> Result<Param<Tensor<B, D>>> {
        let Some(grad) = self.grads.remove::<B::InnerBackend, D>(param.id) else {
            return Ok(param);
        };

        let var = param.val().inner();
        let momentum = match self.slots.take::<D>(name)? {
            Some(slot) => slot,
            None => self.lars.create_slot(&var),
        };

        let update = self.lars.apply_dense(self.state, name, var, grad, momentum)?;
        self.slots.insert(name, update.momentum);
        self.stats.record(update.trust_ratio);

        let updated = Tensor::from_inner(update.variable).require_grad();
        Ok(param.map(|_| updated))
    }
}

// ─── Lars + module ────────────────────────────────────────────────────────────

impl Lars {
    /// Zero momentum slots for every parameter of `module`.
    pub fn create_slots<B: Backend, M: NamedParams<B>>(
        &self,
        module: M,
        slots:  &mut MomentumSlots<B>,
    ) -> Result<M> {
        let mut init = SlotInitializer { lars: self, slots };
        module.visit_params("", &mut init)
    }
}

/// LARS plus its momentum state, stepping a whole model.
pub struct LarsOptimizer<B: AutodiffBackend> {
    lars:      Lars,
    slots:     MomentumSlots<B::InnerBackend>,
    iteration: usize,
}

impl<B: AutodiffBackend> LarsOptimizer<B> {
    pub fn new(lars: Lars) -> Self {
        Self { lars, slots: MomentumSlots::new(), iteration: 0 }
    }

    /// Create zero slots for every parameter of `model` up front.
    pub fn init_slots<M: NamedParams<B>>(&mut self, model: M) -> Result<M> {
        let mut init = InnerSlotInitializer::<B> { lars: &self.lars, slots: &mut self.slots };
        let model = model.visit_params("", &mut init)?;
        tracing::debug!(variables = self.slots.len(), "momentum slots initialised");
        Ok(model)
    }

    /// Apply one LARS step to every parameter of `model` that has a gradient.
    pub fn step<M: NamedParams<B>>(
        &mut self,
        model:     M,
        mut grads: GradientsParams,
    ) -> Result<(M, TrustRatioStats)> {
        let mut keys = KeyCollector::default();
        let model = model.visit_params("", &mut keys)?;
        let state = self.lars.prepare(self.iteration, keys.keys);

        let mut step = LarsStep::<B> {
            lars:  &self.lars,
            state: &state,
            grads: &mut grads,
            slots: &mut self.slots,
            stats: TrustRatioStats::default(),
        };
        let model = model.visit_params("", &mut step)?;
        let stats = step.stats;

        tracing::trace!(
            iteration = self.iteration,
            updated = stats.count,
            mean_trust_ratio = stats.mean(),
            "lars step"
        );
        self.iteration += 1;
        Ok((model, stats))
    }

    pub fn lars(&self) -> &Lars {
        &self.lars
    }

    pub fn slots(&self) -> &MomentumSlots<B::InnerBackend> {
        &self.slots
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::lars::LarsConfig;
    use crate::ml::schedule::LearningRateSchedule;
    use burn::backend::{Autodiff, NdArray};

    type AB = Autodiff<NdArray>;

    /// Single scalar weight named "w".
    #[derive(Module, Debug)]
    struct Scalar<B: Backend> {
        w: Param<Tensor<B, 1>>,
    }

    impl<B: Backend> NamedParams<B> for Scalar<B> {
        fn visit_params<V: ParamVisitor<B>>(mut self, _scope: &str, visitor: &mut V) -> Result<Self> {
            self.w = visitor.visit("w", self.w)?;
            Ok(self)
        }
    }

    fn scalar_model(value: f32) -> Scalar<AB> {
        let device = Default::default();
        Scalar { w: Param::from_tensor(Tensor::from_floats([value], &device)) }
    }

    fn lars(lr: f64, momentum: f64) -> Lars {
        LarsConfig::new()
            .with_learning_rate(LearningRateSchedule::Constant { value: lr })
            .with_momentum(momentum)
            .with_eeta(1.0)
            .with_weight_decay(0.0)
            .with_epsilon(Some(0.0))
            .init()
            .unwrap()
    }

    fn weight(model: &Scalar<AB>) -> f32 {
        model.w.val().into_data().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn test_step_matches_scalar_scenario() {
        let model = scalar_model(4.0);
        // loss = w  ⇒ dL/dw = 1
        let grads = model.w.val().sum().backward();
        let grads = GradientsParams::from_grads(grads, &model);

        let mut opt = LarsOptimizer::<AB>::new(lars(0.1, 0.0));
        let (model, stats) = opt.step(model, grads).unwrap();

        assert_eq!(stats.count, 1);
        assert!((stats.mean() - 4.0).abs() < 1e-6);
        assert!((weight(&model) - 3.6).abs() < 1e-6);
        assert_eq!(opt.iteration(), 1);

        let slot = opt.slots().get::<1>("w").unwrap().unwrap();
        assert!((slot.into_data().to_vec::<f32>().unwrap()[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_params_without_grads_are_untouched() {
        let model = scalar_model(2.0);
        let grads = GradientsParams::new();

        let mut opt = LarsOptimizer::<AB>::new(lars(0.1, 0.9));
        let (model, stats) = opt.step(model, grads).unwrap();
        assert_eq!(stats.count, 0);
        assert_eq!(weight(&model), 2.0);
        assert!(opt.slots().is_empty());
    }

    #[test]
    fn test_updated_params_still_track_gradients() {
        let model = scalar_model(4.0);
        let mut opt = LarsOptimizer::<AB>::new(lars(0.1, 0.0));

        let mut model = model;
        for _ in 0..2 {
            let grads = model.w.val().sum().backward();
            let grads = GradientsParams::from_grads(grads, &model);
            let (next, stats) = opt.step(model, grads).unwrap();
            assert_eq!(stats.count, 1);
            model = next;
        }
        assert!(weight(&model) < 3.6);
        assert_eq!(opt.iteration(), 2);
    }

    #[test]
    fn test_init_slots_creates_zero_slots() {
        let model = scalar_model(1.0);
        let mut opt = LarsOptimizer::<AB>::new(lars(0.1, 0.9));
        let _model = opt.init_slots(model).unwrap();
        let slot = opt.slots().get::<1>("w").unwrap().unwrap();
        assert_eq!(slot.into_data().to_vec::<f32>().unwrap(), vec![0.0]);
    }

    #[test]
    fn test_create_slots_on_plain_backend() {
        let device = Default::default();
        let model = Scalar::<NdArray> { w: Param::from_tensor(Tensor::from_floats([3.0], &device)) };
        let mut slots = MomentumSlots::new();
        let _model = lars(0.1, 0.9).create_slots(model, &mut slots).unwrap();
        assert_eq!(slots.len(), 1);
        assert!(slots.contains("w"));
    }

    #[test]
    fn test_trust_ratio_stats() {
        let mut stats = TrustRatioStats::default();
        assert_eq!(stats.mean(), 0.0);
        stats.record(1.0);
        stats.record(3.0);
        assert_eq!(stats.mean(), 2.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 3.0);

        let mut epoch = TrustRatioStats::default();
        epoch.merge(&stats);
        epoch.merge(&TrustRatioStats::default());
        assert_eq!(epoch, stats);
    }
}
