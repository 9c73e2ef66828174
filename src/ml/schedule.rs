// ============================================================
// Layer 5 — Learning-Rate Schedules
// ============================================================
// LARS is normally paired with a linear warm-up followed by a
// polynomial decay; a constant rate is the simple case.
//
//   warm-up  (t < W):  lr = initial · t / W
//   decay    (t ≥ W):  s  = min(t − W, T)
//                      lr = (initial − end) · (1 − s/T)^power + end
//
// Derived Config gives this enum serde support, so schedules
// round-trip through the optimizer's JSON config export.

use burn::config::Config;

#[derive(Config, Debug, PartialEq)]
pub enum LearningRateSchedule {
    /// The same rate at every iteration
    Constant { value: f64 },

    /// Linear warm-up then polynomial decay to `end`
    PolynomialDecay {
        initial:      f64,
        end:          f64,
        decay_steps:  usize,
        power:        f64,
        warmup_steps: usize,
    },
}

impl LearningRateSchedule {
    /// Learning rate at `iteration` (0-based).
    pub fn value(&self, iteration: usize) -> f64 {
        match *self {
            LearningRateSchedule::Constant { value } => value,
            LearningRateSchedule::PolynomialDecay {
                initial,
                end,
                decay_steps,
                power,
                warmup_steps,
            } => {
                if iteration < warmup_steps {
                    return initial * iteration as f64 / warmup_steps as f64;
                }
                if decay_steps == 0 {
                    return initial;
                }
                let step = (iteration - warmup_steps).min(decay_steps) as f64;
                let remaining = 1.0 - step / decay_steps as f64;
                (initial - end) * remaining.powf(power) + end
            }
        }
    }

    /// Rate before any warm-up or decay.
    pub fn initial(&self) -> f64 {
        match *self {
            LearningRateSchedule::Constant { value } => value,
            LearningRateSchedule::PolynomialDecay { initial, .. } => initial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poly() -> LearningRateSchedule {
        LearningRateSchedule::PolynomialDecay {
            initial:      1.0,
            end:          0.0,
            decay_steps:  10,
            power:        2.0,
            warmup_steps: 4,
        }
    }

    #[test]
    fn test_constant() {
        let s = LearningRateSchedule::Constant { value: 0.25 };
        assert_eq!(s.value(0), 0.25);
        assert_eq!(s.value(1_000_000), 0.25);
    }

    #[test]
    fn test_linear_warmup() {
        let s = poly();
        assert_eq!(s.value(0), 0.0);
        assert_eq!(s.value(2), 0.5);
        assert_eq!(s.value(4), 1.0);
    }

    #[test]
    fn test_poly_decay_reaches_end_and_stays() {
        let s = poly();
        // halfway through decay: (1 - 0.5)^2 = 0.25
        assert!((s.value(4 + 5) - 0.25).abs() < 1e-12);
        assert_eq!(s.value(4 + 10), 0.0);
        assert_eq!(s.value(4 + 50), 0.0);
    }

    #[test]
    fn test_json_round_trip() {
        let s = poly();
        let json = serde_json::to_string(&s).unwrap();
        let back: LearningRateSchedule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
