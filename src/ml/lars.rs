// ============================================================
// Layer 5 — LARS Optimizer
// ============================================================
// Layer-wise Adaptive Rate Scaling (You, Gitman & Ginsburg,
// "Large Batch Training of Convolutional Networks", 2017).
//
// Each variable gets its own effective learning rate, scaled by
// the ratio of its weight norm to its gradient norm:
//
//   trust  = η·‖w‖ / (‖g‖ + λ·‖w‖ + ε)     if ‖w‖ > 0 and ‖g‖ > 0
//          = 1                             otherwise
//   g      ← g + λ·w                       (unless weight decay is excluded)
//   accum  ← μ·accum + lr·trust·g
//   w      ← w − accum                     (or the Nesterov form)
//
// Variables whose base name matches `exclude_from_layer_adaptation`
// use trust = 1 and the raw gradient; names matching
// `exclude_from_weight_decay` skip the λ·w term.
//
// Trust-ratio arithmetic runs in `compute_precisions[0]`, the
// scaled step size in `compute_precisions[1]`; the scaled
// gradient is then applied in the variable's own dtype.
//
// Only dense gradients are supported.

use burn::prelude::*;

use crate::domain::error::{self, Error};
use crate::domain::precision::Precision;
use crate::domain::variable::{base_name, ExclusionList};
use crate::ml::apply_state::{precision_of, ApplyState, CoefficientKey, Coefficients};
use crate::ml::momentum::{apply_momentum, cast_to};
use crate::ml::schedule::LearningRateSchedule;

/// Epsilon used when none is configured.
pub const DEFAULT_EPSILON: f64 = 1e-7;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct LarsConfig {
    /// Learning rate value or schedule
    #[config(default = "LearningRateSchedule::Constant { value: 0.001 }")]
    pub learning_rate: LearningRateSchedule,

    /// Momentum coefficient μ
    #[config(default = 0.9)]
    pub momentum: f64,

    /// Weight decay rate λ
    #[config(default = 0.0001)]
    pub weight_decay: f64,

    /// LARS coefficient η; η/λ bounds the largest trust ratio
    #[config(default = 0.001)]
    pub eeta: f64,

    /// Trust-ratio epsilon; None means DEFAULT_EPSILON
    pub epsilon: Option<f64>,

    /// Inverse time decay: lr_t = lr(t) / (1 + decay·t)
    #[config(default = 0.0)]
    pub decay: f64,

    /// Regexes of variables that never get weight decay
    #[config(default = "Vec::new()")]
    pub exclude_from_weight_decay: Vec<String>,

    /// Regexes of variables that always use trust ratio 1
    #[config(default = "Vec::new()")]
    pub exclude_from_layer_adaptation: Vec<String>,

    /// Accumulator dtype; None keeps each variable's dtype
    pub momentum_precision: Option<Precision>,

    /// [trust-ratio precision, step-size precision]
    #[config(default = "vec![Precision::F32, Precision::F32]")]
    pub compute_precisions: Vec<Precision>,

    #[config(default = false)]
    pub use_nesterov: bool,
}

impl LarsConfig {
    /// Build the optimizer, validating precisions and compiling patterns.
    pub fn init(&self) -> error::Result<Lars> {
        Lars::from_config(self.clone())
    }

    pub fn resolved_epsilon(&self) -> f64 {
        self.epsilon.unwrap_or(DEFAULT_EPSILON)
    }
}

/// Gradient handed to the optimizer for one variable.
pub enum Gradient<B: Backend, const D: usize> {
    Dense(Tensor<B, D>),
    Sparse {
        indices: Tensor<B, 1, Int>,
        values:  Tensor<B, D>,
    },
}

/// Result of one dense update.
#[derive(Debug)]
pub struct DenseUpdate<B: Backend, const D: usize> {
    pub variable:    Tensor<B, D>,
    pub momentum:    Tensor<B, D>,
    pub trust_ratio: f64,
}

/// Trust ratio from already-computed norms.
pub fn trust_ratio(w_norm: f64, g_norm: f64, eeta: f64, weight_decay: f64, epsilon: f64) -> f64 {
    if w_norm > 0.0 && g_norm > 0.0 {
        eeta * w_norm / (g_norm + weight_decay * w_norm + epsilon)
    } else {
        1.0
    }
}

/// Euclidean norm of all elements, computed in the tensor's dtype.
pub fn l2_norm<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> f64 {
    tensor
        .clone()
        .powf_scalar(2.0)
        .sum()
        .into_scalar()
        .elem::<f64>()
        .sqrt()
}

#[derive(Debug, Clone)]
pub struct Lars {
    config:                        LarsConfig,
    epsilon:                       f64,
    exclude_from_weight_decay:     ExclusionList,
    exclude_from_layer_adaptation: ExclusionList,
    ratio_precision:               Precision,
    step_precision:                Precision,
}

impl Lars {
    pub fn from_config(config: LarsConfig) -> error::Result<Self> {
        let [ratio_precision, step_precision] = match config.compute_precisions.as_slice() {
            &[ratio, step] => [ratio, step],
            other => {
                return Err(Error::invalid_argument(format!(
                    "compute_precisions must have exactly two entries \
                     (trust-ratio stage, step-size stage), got {}",
                    other.len()
                )))
            }
        };
        let exclude_from_weight_decay =
            ExclusionList::compile(&config.exclude_from_weight_decay)?;
        let exclude_from_layer_adaptation =
            ExclusionList::compile(&config.exclude_from_layer_adaptation)?;

        tracing::debug!(
            "LARS ready: momentum={} weight_decay={} eeta={} nesterov={} ({} wd / {} adaptation exclusions)",
            config.momentum,
            config.weight_decay,
            config.eeta,
            config.use_nesterov,
            exclude_from_weight_decay.len(),
            exclude_from_layer_adaptation.len(),
        );

        Ok(Self {
            epsilon: config.resolved_epsilon(),
            config,
            exclude_from_weight_decay,
            exclude_from_layer_adaptation,
            ratio_precision,
            step_precision,
        })
    }

    /// The configuration this optimizer was built from. Feeding it
    /// back through `LarsConfig::init` rebuilds an identical optimizer.
    pub fn config(&self) -> &LarsConfig {
        &self.config
    }

    /// Whether `name` gets the λ·w term.
    pub fn uses_weight_decay(&self, name: &str) -> bool {
        !self.exclude_from_weight_decay.matches(base_name(name))
    }

    /// Whether `name` gets a trust ratio other than 1.
    pub fn uses_layer_adaptation(&self, name: &str) -> bool {
        !self.exclude_from_layer_adaptation.matches(base_name(name))
    }

    // ─── Slots ────────────────────────────────────────────────────────────────

    /// Zero accumulator for `var`, in the momentum precision override
    /// if one is configured.
    pub fn create_slot<B: Backend, const D: usize>(&self, var: &Tensor<B, D>) -> Tensor<B, D> {
        let zeros = var.zeros_like();
        match self.config.momentum_precision {
            Some(precision) => cast_to(zeros, precision),
            None => zeros,
        }
    }

    // ─── Coefficients ─────────────────────────────────────────────────────────

    /// Coefficients for variables stored in `var_precision`.
    pub fn coefficients(&self, iteration: usize, var_precision: Precision) -> Coefficients {
        let compute = self.ratio_precision;
        let cfg = &self.config;
        let lr = cfg.learning_rate.value(iteration) / (1.0 + cfg.decay * iteration as f64);
        Coefficients {
            lr_t:         var_precision.round(lr),
            momentum:     compute.round(cfg.momentum),
            eeta:         compute.round(cfg.eeta),
            weight_decay: compute.round(cfg.weight_decay),
            epsilon:      compute.round(self.epsilon),
        }
    }

    /// Build the per-step cache for every key that will be updated.
    pub fn prepare<I>(&self, iteration: usize, keys: I) -> ApplyState
    where
        I: IntoIterator<Item = CoefficientKey>,
    {
        let mut state = ApplyState::new(iteration);
        for key in keys {
            if !state.contains(&key) {
                let coefficients = self.coefficients(iteration, key.precision);
                state.insert(key, coefficients);
            }
        }
        state
    }

    fn resolve(&self, state: &ApplyState, key: &CoefficientKey) -> Coefficients {
        match state.get(key) {
            Some(c) => *c,
            None => {
                tracing::trace!(?key, "coefficients missing from apply state, computing");
                self.coefficients(state.iteration(), key.precision)
            }
        }
    }

    // ─── Update rule ──────────────────────────────────────────────────────────

    /// Trust ratio for `var` and the gradient to feed the momentum
    /// update (with λ·w folded in when weight decay applies).
    pub fn compute_trust_ratio<B: Backend, const D: usize>(
        &self,
        name:         &str,
        var:          &Tensor<B, D>,
        grad:         Tensor<B, D>,
        coefficients: &Coefficients,
    ) -> (f64, Tensor<B, D>) {
        let name = base_name(name);
        if self.exclude_from_layer_adaptation.matches(name) {
            return (1.0, grad);
        }

        let p = self.ratio_precision;
        let w_norm = p.round(l2_norm(var));
        let g_norm = p.round(l2_norm(&grad));

        let (grad, weight_decay) = if self.exclude_from_weight_decay.matches(name) {
            (grad, 0.0)
        } else {
            let decayed = grad + var.clone().mul_scalar(coefficients.weight_decay);
            (decayed, coefficients.weight_decay)
        };

        let ratio = trust_ratio(
            w_norm,
            g_norm,
            coefficients.eeta,
            weight_decay,
            coefficients.epsilon,
        );
        (p.round(ratio), grad)
    }

    /// One dense update of `var` and its accumulator.
    pub fn apply_dense<B: Backend, const D: usize>(
        &self,
        state:    &ApplyState,
        name:     &str,
        var:      Tensor<B, D>,
        grad:     Tensor<B, D>,
        momentum: Tensor<B, D>,
    ) -> error::Result<DenseUpdate<B, D>> {
        if grad.dims() != var.dims() || momentum.dims() != var.dims() {
            return Err(Error::invalid_argument(format!(
                "'{name}': variable {:?}, gradient {:?} and momentum {:?} must share a shape",
                var.dims(),
                grad.dims(),
                momentum.dims()
            )));
        }

        let key = CoefficientKey::of(&var);
        let coefficients = self.resolve(state, &key);

        let grad = cast_to(grad, precision_of(&var));
        let (ratio, grad) = self.compute_trust_ratio(name, &var, grad, &coefficients);
        let scaled_lr = self.step_precision.round(coefficients.lr_t * ratio);
        let scaled_lr = key.precision.round(scaled_lr);

        tracing::trace!(name, trust_ratio = ratio, scaled_lr, "lars update");

        let (variable, momentum) = apply_momentum(
            var,
            momentum,
            1.0,
            grad.mul_scalar(scaled_lr),
            coefficients.momentum,
            self.config.use_nesterov,
        );

        Ok(DenseUpdate { variable, momentum, trust_ratio: ratio })
    }

    /// Sparse updates are not implemented.
    pub fn apply_sparse<B: Backend, const D: usize>(
        &self,
        name:     &str,
        _indices: Tensor<B, 1, Int>,
        _values:  Tensor<B, D>,
    ) -> error::Result<DenseUpdate<B, D>> {
        Err(Error::unsupported(format!(
            "LARS has no sparse-gradient update (variable '{name}')"
        )))
    }

    /// Dispatch on the gradient kind.
    pub fn apply_gradient<B: Backend, const D: usize>(
        &self,
        state:    &ApplyState,
        name:     &str,
        var:      Tensor<B, D>,
        grad:     Gradient<B, D>,
        momentum: Tensor<B, D>,
    ) -> error::Result<DenseUpdate<B, D>> {
        match grad {
            Gradient::Dense(grad) => self.apply_dense(state, name, var, grad, momentum),
            Gradient::Sparse { indices, values } => self.apply_sparse(name, indices, values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn values<const D: usize>(t: Tensor<B, D>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    fn plain_config(lr: f64) -> LarsConfig {
        LarsConfig::new()
            .with_learning_rate(LearningRateSchedule::Constant { value: lr })
            .with_momentum(0.0)
            .with_weight_decay(0.0)
            .with_eeta(1.0)
            .with_epsilon(Some(0.0))
    }

    fn step<const D: usize>(
        lars: &Lars,
        name: &str,
        var:  Tensor<B, D>,
        grad: Tensor<B, D>,
    ) -> DenseUpdate<B, D> {
        let state = lars.prepare(0, [CoefficientKey::of(&var)]);
        let slot  = lars.create_slot(&var);
        lars.apply_dense(&state, name, var, grad, slot).unwrap()
    }

    #[test]
    fn test_scalar_scenario() {
        let device = Default::default();
        let lars = plain_config(0.1).init().unwrap();
        let var  = Tensor::<B, 1>::from_floats([4.0], &device);
        let grad = Tensor::<B, 1>::from_floats([1.0], &device);

        let update = step(&lars, "w", var, grad);
        assert!((update.trust_ratio - 4.0).abs() < 1e-6);
        assert!((values(update.momentum)[0] - 0.4).abs() < 1e-6);
        assert!((values(update.variable)[0] - 3.6).abs() < 1e-6);
    }

    #[test]
    fn test_f64_momentum_slot_with_f32_variable() {
        let device = Default::default();
        let lars = plain_config(0.1)
            .with_momentum_precision(Some(Precision::F64))
            .init()
            .unwrap();
        let var  = Tensor::<B, 1>::from_floats([4.0], &device);
        let grad = Tensor::<B, 1>::from_floats([1.0], &device);

        let slot = lars.create_slot(&var);
        assert_eq!(precision_of(&slot), Precision::F64);

        let update = step(&lars, "w", var, grad);
        assert_eq!(precision_of(&update.momentum), Precision::F64);
        assert_eq!(precision_of(&update.variable), Precision::F32);

        let accum = update.momentum.into_data().convert::<f64>().to_vec::<f64>().unwrap();
        assert!((accum[0] - 0.4).abs() < 1e-6);
        assert!((values(update.variable)[0] - 3.6).abs() < 1e-6);
    }

    #[test]
    fn test_half_compute_precisions_round_ratio_and_step() {
        let device = Default::default();
        let lars = plain_config(0.1)
            .with_compute_precisions(vec![Precision::F16, Precision::BF16])
            .init()
            .unwrap();
        let var  = Tensor::<B, 1>::from_floats([3.0], &device);
        let grad = Tensor::<B, 1>::from_floats([0.7], &device);

        let update = step(&lars, "w", var, grad);

        // ‖w‖ = 3 and ‖g‖ = 0.7, both rounded to f16 before dividing
        let g_norm = Precision::F16.round(0.7f32 as f64);
        let ratio = Precision::F16.round(3.0 / g_norm);
        assert_eq!(update.trust_ratio, ratio);
        assert_ne!(update.trust_ratio, 3.0 / 0.7f32 as f64);

        let scaled_lr = Precision::F32.round(Precision::BF16.round(0.1f32 as f64 * ratio));
        let expected = 3.0f32 - scaled_lr as f32 * 0.7f32;
        let actual = values(update.variable)[0];
        assert!((actual - expected).abs() < 1e-6);
        // unrounded arithmetic would land on 2.7
        assert!((actual - 2.7).abs() > 1e-4);
    }

    #[test]
    fn test_zero_weight_norm_gives_unit_ratio() {
        let device = Default::default();
        let lars = plain_config(0.1).init().unwrap();
        let c = lars.coefficients(0, Precision::F32);
        let var  = Tensor::<B, 1>::zeros([3], &device);
        let grad = Tensor::<B, 1>::from_floats([5.0, -2.0, 1.0], &device);
        let (ratio, _) = lars.compute_trust_ratio("w", &var, grad, &c);
        assert_eq!(ratio, 1.0);
    }

    #[test]
    fn test_zero_grad_norm_gives_unit_ratio() {
        let device = Default::default();
        let lars = plain_config(0.1).init().unwrap();
        let c = lars.coefficients(0, Precision::F32);
        let var  = Tensor::<B, 1>::from_floats([3.0, 4.0], &device);
        let grad = Tensor::<B, 1>::zeros([2], &device);
        let (ratio, _) = lars.compute_trust_ratio("w", &var, grad, &c);
        assert_eq!(ratio, 1.0);
    }

    #[test]
    fn test_trust_ratio_increases_with_weight_norm() {
        let mut previous = 0.0;
        for w_norm in [0.5, 1.0, 2.0, 8.0, 100.0] {
            let r = trust_ratio(w_norm, 3.0, 0.001, 0.01, 1e-7);
            assert!(r > previous, "ratio {r} at w_norm {w_norm} did not increase");
            previous = r;
        }
    }

    #[test]
    fn test_trust_ratio_uses_norms_of_whole_tensor() {
        let device = Default::default();
        let lars = plain_config(1.0).init().unwrap();
        let c = lars.coefficients(0, Precision::F32);
        // ‖w‖ = 5, ‖g‖ = 10
        let var  = Tensor::<B, 2>::from_floats([[3.0, 0.0], [0.0, 4.0]], &device);
        let grad = Tensor::<B, 2>::from_floats([[0.0, 6.0], [8.0, 0.0]], &device);
        let (ratio, _) = lars.compute_trust_ratio("w", &var, grad, &c);
        assert!((ratio - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_weight_decay_folded_into_gradient() {
        let device = Default::default();
        let lars = plain_config(0.1).with_weight_decay(0.5).init().unwrap();
        let c = lars.coefficients(0, Precision::F32);
        let var  = Tensor::<B, 1>::from_floats([2.0, -2.0], &device);
        let grad = Tensor::<B, 1>::from_floats([1.0, 1.0], &device);
        let (_, g) = lars.compute_trust_ratio("dense/kernel", &var, grad, &c);
        assert_eq!(values(g), vec![2.0, 0.0]);
    }

    #[test]
    fn test_weight_decay_exclusion_keeps_raw_gradient() {
        let device = Default::default();
        let lars = plain_config(0.1)
            .with_weight_decay(0.5)
            .with_exclude_from_weight_decay(vec!["LayerNorm".into(), "bias".into()])
            .init()
            .unwrap();
        let c = lars.coefficients(0, Precision::F32);
        let var  = Tensor::<B, 1>::from_floats([2.0, -2.0], &device);
        let grad = Tensor::<B, 1>::from_floats([1.0, 3.0], &device);

        let name = "bert/encoder/layer_0/output/LayerNorm/gamma:0";
        assert!(!lars.uses_weight_decay(name));
        let (ratio, g) = lars.compute_trust_ratio(name, &var, grad.clone(), &c);
        assert_eq!(values(g), values(grad));
        // λ is dropped from the denominator too: ‖w‖/‖g‖
        let expected = (8.0f64).sqrt() / (10.0f64).sqrt();
        assert!((ratio - expected).abs() < 1e-6);
    }

    #[test]
    fn test_layer_adaptation_exclusion() {
        let device = Default::default();
        let lars = plain_config(0.1)
            .with_weight_decay(0.5)
            .with_exclude_from_layer_adaptation(vec!["bias$".into()])
            .init()
            .unwrap();
        let c = lars.coefficients(0, Precision::F32);
        let var  = Tensor::<B, 1>::from_floats([10.0], &device);
        let grad = Tensor::<B, 1>::from_floats([1.0], &device);

        let (ratio, g) = lars.compute_trust_ratio("dense/bias:0", &var, grad, &c);
        assert_eq!(ratio, 1.0);
        // no weight decay either when adaptation is skipped
        assert_eq!(values(g), vec![1.0]);
    }

    #[test]
    fn test_zero_momentum_ignores_nesterov() {
        let device = Default::default();
        let mut results = Vec::new();
        for nesterov in [false, true] {
            let lars = plain_config(0.1).with_use_nesterov(nesterov).init().unwrap();
            let var  = Tensor::<B, 1>::from_floats([3.0, 4.0], &device);
            let grad = Tensor::<B, 1>::from_floats([0.6, 0.8], &device);
            let update = step(&lars, "w", var, grad);
            // trust = 5 / 1 ; v - 0.1 * 5 * g
            assert!((update.trust_ratio - 5.0).abs() < 1e-5);
            results.push(values(update.variable));
        }
        assert_eq!(results[0], results[1]);
        assert!((results[0][0] - 2.7).abs() < 1e-5);
        assert!((results[0][1] - 3.6).abs() < 1e-5);
    }

    #[test]
    fn test_momentum_accumulates_across_steps() {
        let device = Default::default();
        let lars = LarsConfig::new()
            .with_learning_rate(LearningRateSchedule::Constant { value: 1.0 })
            .with_momentum(0.5)
            .with_weight_decay(0.0)
            .with_exclude_from_layer_adaptation(vec![".*".into()])
            .init()
            .unwrap();
        let mut var  = Tensor::<B, 1>::from_floats([0.0], &device);
        let mut slot = lars.create_slot(&var);
        for iteration in 0..2 {
            let state = lars.prepare(iteration, [CoefficientKey::of(&var)]);
            let grad  = Tensor::<B, 1>::from_floats([1.0], &device);
            let update = lars.apply_dense(&state, "w", var, grad, slot).unwrap();
            var  = update.variable;
            slot = update.momentum;
        }
        // accum: 1, then 0.5 + 1 = 1.5 ; var: -1, then -2.5
        assert!((values(slot)[0] - 1.5).abs() < 1e-6);
        assert!((values(var)[0] + 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_missing_coefficients_fall_back() {
        let device = Default::default();
        let lars = plain_config(0.1).init().unwrap();
        let var  = Tensor::<B, 1>::from_floats([4.0], &device);
        let grad = Tensor::<B, 1>::from_floats([1.0], &device);
        let slot = lars.create_slot(&var);
        let update = lars.apply_dense(&ApplyState::new(0), "w", var, grad, slot).unwrap();
        assert!((values(update.variable)[0] - 3.6).abs() < 1e-6);
    }

    #[test]
    fn test_prepare_dedupes_keys() {
        let lars = plain_config(0.1).init().unwrap();
        let key = CoefficientKey::new("Cpu", Precision::F32);
        let state = lars.prepare(3, vec![key.clone(), key.clone(), CoefficientKey::new("Cpu", Precision::F64)]);
        assert_eq!(state.len(), 2);
        assert_eq!(state.iteration(), 3);
    }

    #[test]
    fn test_inverse_time_decay() {
        let lars = plain_config(1.0).with_decay(0.5).init().unwrap();
        assert_eq!(lars.coefficients(0, Precision::F64).lr_t, 1.0);
        assert_eq!(lars.coefficients(2, Precision::F64).lr_t, 0.5);
    }

    #[test]
    fn test_shape_mismatch_is_invalid_argument() {
        let device = Default::default();
        let lars = plain_config(0.1).init().unwrap();
        let var  = Tensor::<B, 1>::zeros([3], &device);
        let grad = Tensor::<B, 1>::zeros([2], &device);
        let slot = lars.create_slot(&var);
        let err = lars.apply_dense(&ApplyState::new(0), "w", var, grad, slot).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_sparse_gradient_is_unsupported() {
        let device = Default::default();
        let lars = plain_config(0.1).init().unwrap();
        let var  = Tensor::<B, 2>::zeros([4, 2], &device);
        let grad = Gradient::Sparse {
            indices: Tensor::<B, 1, Int>::from_ints([1, 3], &device),
            values:  Tensor::<B, 2>::ones([2, 2], &device),
        };
        let slot = lars.create_slot(&var);
        let err = lars
            .apply_gradient(&ApplyState::new(0), "embeddings", var, grad, slot)
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_compute_precisions_must_have_two_entries() {
        let err = LarsConfig::new()
            .with_compute_precisions(vec![Precision::F32])
            .init()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = LarsConfig::new()
            .with_compute_precisions(vec![Precision::F32; 3])
            .init()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_bad_pattern_fails_at_construction() {
        let err = LarsConfig::new()
            .with_exclude_from_layer_adaptation(vec!["[bias".into()])
            .init()
            .unwrap_err();
        assert!(matches!(err, Error::Pattern { .. }));
    }

    #[test]
    fn test_default_epsilon() {
        assert_eq!(LarsConfig::new().resolved_epsilon(), DEFAULT_EPSILON);
        assert_eq!(LarsConfig::new().with_epsilon(Some(0.0)).resolved_epsilon(), 0.0);
    }

    #[test]
    fn test_config_export_rebuilds_same_optimizer() {
        let lars = LarsConfig::new()
            .with_learning_rate(LearningRateSchedule::PolynomialDecay {
                initial: 2.0, end: 0.0, decay_steps: 100, power: 2.0, warmup_steps: 10,
            })
            .with_momentum(0.8)
            .with_decay(0.01)
            .with_exclude_from_weight_decay(vec!["LayerNorm".into()])
            .with_momentum_precision(Some(Precision::F32))
            .with_compute_precisions(vec![Precision::F64, Precision::F32])
            .with_use_nesterov(true)
            .init()
            .unwrap();

        let json = serde_json::to_string(lars.config()).unwrap();
        let restored: LarsConfig = serde_json::from_str(&json).unwrap();
        let rebuilt = restored.init().unwrap();

        assert_eq!(rebuilt.config().learning_rate, lars.config().learning_rate);
        assert_eq!(rebuilt.config().momentum_precision, Some(Precision::F32));
        assert!(rebuilt.config().use_nesterov);
        for iteration in [0, 5, 50, 500] {
            assert_eq!(
                rebuilt.coefficients(iteration, Precision::F32),
                lars.coefficients(iteration, Precision::F32)
            );
        }
        assert!(!rebuilt.uses_weight_decay("bert/embeddings/LayerNorm/beta"));
    }

    #[test]
    fn test_config_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lars_config.json");
        plain_config(0.5)
            .with_momentum_precision(Some(Precision::BF16))
            .save(&path)
            .unwrap();

        let loaded = LarsConfig::load(&path).unwrap();
        assert_eq!(loaded.momentum_precision, Some(Precision::BF16));
        assert_eq!(loaded.resolved_epsilon(), 0.0);
        assert_eq!(loaded.learning_rate, LearningRateSchedule::Constant { value: 0.5 });
        assert!(loaded.init().is_ok());
    }
}
