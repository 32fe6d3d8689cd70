//! Hybrid-level inversion
//!
//! Converting a parcel pressure to the nearest hybrid model level is an
//! external utility for production runs. `HybridCoefficients` is a plain
//! log-pressure inversion from the level coefficients, good enough to drive
//! the demo and the tests.

/// Continuous 1-based model level from (−log σ, −log ps)
///
/// Non-finite results are allowed and mean "outside the valid data".
pub trait HybridInverter: Sync {
    fn level(&self, neg_log_sigma: f64, neg_log_ps: f64) -> f64;
}

impl<F> HybridInverter for F
where
    F: Fn(f64, f64) -> f64 + Sync,
{
    fn level(&self, neg_log_sigma: f64, neg_log_ps: f64) -> f64 {
        self(neg_log_sigma, neg_log_ps)
    }
}

/// Full-level hybrid coefficients `p = a + b·ps`, top level first
#[derive(Debug, Clone, PartialEq)]
pub struct HybridCoefficients {
    am: Vec<f64>,
    bm: Vec<f64>,
}

impl HybridCoefficients {
    /// Average half-level coefficients onto full levels
    pub fn from_half_levels(ai: &[f64], bi: &[f64]) -> Self {
        let am = ai.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        let bm = bi.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        Self { am, bm }
    }

    /// Number of full levels
    pub fn levels(&self) -> usize {
        self.am.len().min(self.bm.len())
    }

    /// Pressure (Pa) of 1-based `level` over surface pressure `ps`
    pub fn pressure(&self, level: usize, ps: f64) -> f64 {
        self.am[level - 1] + self.bm[level - 1] * ps
    }
}

impl HybridInverter for HybridCoefficients {
    fn level(&self, neg_log_sigma: f64, neg_log_ps: f64) -> f64 {
        let ps = (-neg_log_ps).exp();
        let log_p = -(neg_log_sigma + neg_log_ps);
        for k in 1..self.levels() {
            let (upper, lower) = (self.pressure(k, ps), self.pressure(k + 1, ps));
            if upper <= 0.0 || lower <= upper {
                continue;
            }
            let (lu, ll) = (upper.ln(), lower.ln());
            if (lu..=ll).contains(&log_p) {
                return k as f64 + (log_p - lu) / (ll - lu);
            }
        }
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn coefficients() -> HybridCoefficients {
        // full levels at 1000, 5000, 20000 Pa and 0.5·ps, 0.9·ps
        HybridCoefficients {
            am: vec![1000.0, 5000.0, 20000.0, 0.0, 0.0],
            bm: vec![0.0, 0.0, 0.0, 0.5, 0.9],
        }
    }

    fn invert(h: &impl HybridInverter, p: f64, ps: f64) -> f64 {
        let lsp = -ps.ln();
        h.level(-p.ln() - lsp, lsp)
    }

    #[test]
    fn test_exact_levels() {
        let h = coefficients();
        assert_relative_eq!(invert(&h, 5000.0, 100000.0), 2.0, epsilon = 1e-12);
        let expected = 4.0 + (89000.0f64 / 50000.0).ln() / (90000.0f64 / 50000.0).ln();
        assert_relative_eq!(invert(&h, 89000.0, 100000.0), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_log_pressure_interpolation() {
        let h = coefficients();
        let p = (1000.0f64 * 5000.0).sqrt();
        assert_relative_eq!(invert(&h, p, 100000.0), 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_outside_column_is_nan() {
        let h = coefficients();
        assert!(invert(&h, 500.0, 100000.0).is_nan());
        assert!(invert(&h, 95000.0, 100000.0).is_nan());
    }

    #[test]
    fn test_closure_inverter() {
        let fixed = |_: f64, _: f64| 42.0;
        assert_eq!(invert(&fixed, 1.0, 1.0), 42.0);
    }

    #[test]
    fn test_from_half_levels() {
        let h = HybridCoefficients::from_half_levels(&[0.0, 2.0, 4.0], &[0.0, 0.0, 1.0]);
        assert_eq!(h.levels(), 2);
        assert_eq!(h.pressure(2, 10.0), 3.0 + 5.0);
    }
}
