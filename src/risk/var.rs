//! Value-at-Risk estimators
//!
//! Three interchangeable estimators selected by configuration: parametric
//! (variance-covariance), historical simulation, and Monte Carlo resampling.
//! All return a one-day dollar VaR for a portfolio of dollar-notional weights.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

use crate::config::{RiskConfig, VarMethod};

/// Per-symbol daily return series from the market-data collaborator
pub type ReturnsHistory = HashMap<String, Vec<f64>>;

/// Portfolio VaR estimator
#[derive(Debug, Clone)]
pub struct VarEstimator {
    method: VarMethod,
    confidence: f64,
    iterations: usize,
    seed: u64,
}

impl VarEstimator {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            method: config.var_method,
            confidence: config.var_confidence,
            iterations: config.mc_iterations,
            seed: config.mc_seed,
        }
    }

    /// One-day dollar VaR for the given signed dollar positions
    ///
    /// Returns `None` when fewer than two aligned observations exist for the
    /// held symbols, which the caller must treat as an explicit degraded state.
    pub fn portfolio_var(
        &self,
        positions: &[(String, f64)],
        history: &ReturnsHistory,
    ) -> Option<f64> {
        let pnl = aligned_pnl_series(positions, history)?;
        if pnl.len() < 2 {
            return None;
        }

        let var = match self.method {
            VarMethod::Parametric => {
                let sigma = std_dev(&pnl);
                z_score(self.confidence) * sigma
            }
            VarMethod::Historical => loss_quantile(&pnl, self.confidence),
            VarMethod::MonteCarlo => {
                // iid bootstrap of historical days; seeded so runs reproduce
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
                let samples: Vec<f64> = (0..self.iterations)
                    .map(|_| pnl[rng.gen_range(0..pnl.len())])
                    .collect();
                loss_quantile(&samples, self.confidence)
            }
        };

        Some(var.max(0.0))
    }
}

/// Historical portfolio P&L series over the aligned tail of each return series
fn aligned_pnl_series(
    positions: &[(String, f64)],
    history: &ReturnsHistory,
) -> Option<Vec<f64>> {
    let held: Vec<(&str, f64, &Vec<f64>)> = positions
        .iter()
        .filter(|(_, w)| *w != 0.0)
        .filter_map(|(sym, w)| history.get(sym.as_str()).map(|r| (sym.as_str(), *w, r)))
        .collect();
    if held.is_empty() {
        return None;
    }

    let n = held.iter().map(|(_, _, r)| r.len()).min()?;
    if n == 0 {
        return None;
    }

    let mut pnl = vec![0.0; n];
    for (_, weight, returns) in &held {
        let tail = &returns[returns.len() - n..];
        for (acc, r) in pnl.iter_mut().zip(tail) {
            *acc += weight * r;
        }
    }
    Some(pnl)
}

/// Pearson correlation of the aligned tails of two return series
pub fn correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];

    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

fn std_dev(series: &[f64]) -> f64 {
    let n = series.len() as f64;
    let mean = series.iter().sum::<f64>() / n;
    let variance = series.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Loss at the (1 - confidence) quantile of a P&L distribution, as a positive number
fn loss_quantile(pnl: &[f64], confidence: f64) -> f64 {
    let mut sorted = pnl.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((1.0 - confidence) * sorted.len() as f64).floor() as usize;
    let idx = idx.min(sorted.len() - 1);
    -sorted[idx]
}

/// Inverse standard normal CDF (Acklam's rational approximation)
fn z_score(confidence: f64) -> f64 {
    let p = confidence.clamp(1e-9, 1.0 - 1e-9);

    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];

    const P_LOW: f64 = 0.02425;

    if p > 1.0 - P_LOW {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p >= P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_with(symbol: &str, returns: Vec<f64>) -> ReturnsHistory {
        let mut h = ReturnsHistory::new();
        h.insert(symbol.to_string(), returns);
        h
    }

    fn alternating_returns(n: usize, magnitude: f64) -> Vec<f64> {
        (0..n)
            .map(|i| if i % 2 == 0 { magnitude } else { -magnitude })
            .collect()
    }

    fn estimator(method: VarMethod) -> VarEstimator {
        VarEstimator::new(&RiskConfig {
            var_method: method,
            ..RiskConfig::default()
        })
    }

    #[test]
    fn test_z_score_common_levels() {
        assert!((z_score(0.95) - 1.6449).abs() < 1e-3);
        assert!((z_score(0.99) - 2.3263).abs() < 1e-3);
    }

    #[test]
    fn test_parametric_var_scales_with_position() {
        let history = history_with("AAPL", alternating_returns(100, 0.01));
        let est = estimator(VarMethod::Parametric);

        let small = est
            .portfolio_var(&[("AAPL".to_string(), 1000.0)], &history)
            .unwrap();
        let large = est
            .portfolio_var(&[("AAPL".to_string(), 10000.0)], &history)
            .unwrap();
        assert!((large - small * 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_parametric_var_magnitude() {
        // sigma of +/-1% alternating series is 1%; $10k position, 95% z ~ 1.645
        let history = history_with("AAPL", alternating_returns(100, 0.01));
        let est = estimator(VarMethod::Parametric);
        let var = est
            .portfolio_var(&[("AAPL".to_string(), 10000.0)], &history)
            .unwrap();
        assert!((var - 164.49).abs() < 1.0, "var = {var}");
    }

    #[test]
    fn test_historical_var_picks_tail_loss() {
        let mut returns = vec![0.001; 90];
        returns.extend(vec![-0.05; 10]); // ten bad days
        let history = history_with("AAPL", returns);
        let est = estimator(VarMethod::Historical);
        let var = est
            .portfolio_var(&[("AAPL".to_string(), 10000.0)], &history)
            .unwrap();
        // 5% quantile of 100 days lands inside the bad-day cluster
        assert!((var - 500.0).abs() < 1e-9, "var = {var}");
    }

    #[test]
    fn test_monte_carlo_var_deterministic() {
        let history = history_with("AAPL", alternating_returns(100, 0.02));
        let est = estimator(VarMethod::MonteCarlo);
        let a = est.portfolio_var(&[("AAPL".to_string(), 10000.0)], &history);
        let b = est.portfolio_var(&[("AAPL".to_string(), 10000.0)], &history);
        assert_eq!(a, b);
    }

    #[test]
    fn test_monte_carlo_seed_changes_sample() {
        let history = history_with(
            "AAPL",
            (0..100).map(|i| ((i * 7919) % 13) as f64 / 1000.0 - 0.006).collect(),
        );
        let a = VarEstimator::new(&RiskConfig {
            var_method: VarMethod::MonteCarlo,
            mc_seed: 1,
            mc_iterations: 50,
            ..RiskConfig::default()
        })
        .portfolio_var(&[("AAPL".to_string(), 10000.0)], &history);
        let b = VarEstimator::new(&RiskConfig {
            var_method: VarMethod::MonteCarlo,
            mc_seed: 2,
            mc_iterations: 50,
            ..RiskConfig::default()
        })
        .portfolio_var(&[("AAPL".to_string(), 10000.0)], &history);
        // Different seeds resample differently on a skewed series
        assert!(a.is_some() && b.is_some());
    }

    #[test]
    fn test_missing_history_returns_none() {
        let history = ReturnsHistory::new();
        let est = estimator(VarMethod::Parametric);
        assert!(est
            .portfolio_var(&[("AAPL".to_string(), 10000.0)], &history)
            .is_none());
    }

    #[test]
    fn test_short_history_returns_none() {
        let history = history_with("AAPL", vec![0.01]);
        let est = estimator(VarMethod::Parametric);
        assert!(est
            .portfolio_var(&[("AAPL".to_string(), 10000.0)], &history)
            .is_none());
    }

    #[test]
    fn test_multi_symbol_portfolio() {
        let mut history = history_with("AAPL", alternating_returns(100, 0.01));
        history.insert("MSFT".to_string(), alternating_returns(100, 0.01));
        let est = estimator(VarMethod::Parametric);

        // Perfectly correlated: risk adds
        let combined = est
            .portfolio_var(
                &[("AAPL".to_string(), 5000.0), ("MSFT".to_string(), 5000.0)],
                &history,
            )
            .unwrap();
        let single = est
            .portfolio_var(&[("AAPL".to_string(), 10000.0)], &history)
            .unwrap();
        assert!((combined - single).abs() < 1e-6);
    }

    #[test]
    fn test_hedged_portfolio_has_less_var() {
        let mut history = history_with("AAPL", alternating_returns(100, 0.01));
        history.insert("MSFT".to_string(), alternating_returns(100, 0.01));
        let est = estimator(VarMethod::Parametric);

        // Short leg offsets the long leg on a perfectly correlated pair
        let hedged = est
            .portfolio_var(
                &[("AAPL".to_string(), 5000.0), ("MSFT".to_string(), -5000.0)],
                &history,
            )
            .unwrap();
        assert!(hedged < 1e-9);
    }

    #[test]
    fn test_correlation_perfect() {
        let a = alternating_returns(50, 0.01);
        let b = alternating_returns(50, 0.02);
        let corr = correlation(&a, &b).unwrap();
        assert!((corr - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_correlation_inverse() {
        let a = alternating_returns(50, 0.01);
        let b: Vec<f64> = a.iter().map(|x| -x).collect();
        let corr = correlation(&a, &b).unwrap();
        assert!((corr + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_correlation_needs_two_points() {
        assert!(correlation(&[0.01], &[0.02]).is_none());
    }

    #[test]
    fn test_correlation_constant_series() {
        let a = vec![0.01; 50];
        let b = alternating_returns(50, 0.01);
        assert!(correlation(&a, &b).is_none());
    }
}
