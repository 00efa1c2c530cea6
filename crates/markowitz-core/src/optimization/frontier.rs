use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::qp::QuadraticProgram;
use crate::error::MarkowitzError;
use crate::settings::SolverSettings;
use crate::types::WeightBounds;
use crate::MarkowitzResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which problem produced a set of weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    MaxSharpe,
    EfficientRisk,
    MinVariance,
}

impl Objective {
    pub fn label(&self) -> &'static str {
        match self {
            Objective::MaxSharpe => "max_sharpe",
            Objective::EfficientRisk => "efficient_risk",
            Objective::MinVariance => "min_variance",
        }
    }
}

/// Raw solver weights with their annualized performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPoint {
    pub objective: Objective,
    pub weights: Vec<f64>,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Maximum-Sharpe (tangency) portfolio under `0 ≤ w ≤ max_weight`, `Σw = 1`.
///
/// The ratio objective is not convex, so it is solved through the scaled
/// problem: minimize yᵀΣy subject to (μ − r_f)ᵀy = 1, 1ᵀy = κ,
/// 0 ≤ y ≤ max_weight·κ, κ ≥ 0, and then w = y / κ.
pub fn solve_max_sharpe(
    mu: &[f64],
    sigma: &DMatrix<f64>,
    bounds: WeightBounds,
    risk_free_rate: f64,
    settings: &SolverSettings,
) -> MarkowitzResult<PortfolioPoint> {
    let label = Objective::MaxSharpe.label();
    let n = check_problem(mu, sigma, bounds, label)?;

    let excess: Vec<f64> = mu.iter().map(|r| r - risk_free_rate).collect();
    let best_excess = dot(&max_return_weights(&excess, bounds), &excess);
    if best_excess <= 1e-12 {
        return Err(MarkowitzError::infeasible(
            label,
            format!(
                "no portfolio within the weight bounds earns more than the risk-free rate {} \
                 (best achievable excess return {:.6})",
                risk_free_rate, best_excess
            ),
        ));
    }

    // Variables: y (n), κ (1).
    let dim = n + 1;
    let mut p = DMatrix::<f64>::zeros(dim, dim);
    p.view_mut((0, 0), (n, n)).copy_from(&(sigma * 2.0));

    let mut a = DMatrix::<f64>::zeros(2, dim);
    for i in 0..n {
        a[(0, i)] = excess[i];
        a[(1, i)] = 1.0;
    }
    a[(1, n)] = -1.0;
    let b = DVector::from_vec(vec![1.0, 0.0]);

    // -y ≤ 0, y - max_weight·κ ≤ 0, -κ ≤ 0
    let mut g = DMatrix::<f64>::zeros(2 * n + 1, dim);
    for i in 0..n {
        g[(i, i)] = -1.0;
        g[(n + i, i)] = 1.0;
        g[(n + i, n)] = -bounds.max_weight;
    }
    g[(2 * n, n)] = -1.0;
    let h = DVector::<f64>::zeros(2 * n + 1);

    let qp = QuadraticProgram {
        p,
        q: DVector::zeros(dim),
        a,
        b,
        g,
        h,
    };
    let sol = qp.solve(settings, label)?;

    let kappa = sol.x[n];
    if !kappa.is_finite() || kappa <= 1e-14 {
        return Err(MarkowitzError::numerical(
            label,
            format!("scaling variable collapsed to {}", kappa),
        ));
    }
    let mut w: Vec<f64> = (0..n).map(|i| sol.x[i] / kappa).collect();
    project_onto_bounds(&mut w, bounds, label)?;

    let point = evaluate(Objective::MaxSharpe, w, mu, sigma, risk_free_rate);
    debug!(
        iterations = sol.iterations,
        ret = point.expected_return,
        vol = point.volatility,
        sharpe = point.sharpe_ratio,
        "max-Sharpe portfolio solved"
    );
    Ok(point)
}

/// Bounded global minimum-variance portfolio.
pub fn solve_min_variance(
    mu: &[f64],
    sigma: &DMatrix<f64>,
    bounds: WeightBounds,
    risk_free_rate: f64,
    settings: &SolverSettings,
) -> MarkowitzResult<PortfolioPoint> {
    let label = Objective::MinVariance.label();
    check_problem(mu, sigma, bounds, label)?;
    let w = solve_risk_tolerance(mu, sigma, bounds, 0.0, settings, label)?;
    Ok(evaluate(Objective::MinVariance, w, mu, sigma, risk_free_rate))
}

/// Maximum expected return with volatility at most `target_volatility`.
///
/// For risk tolerance γ ≥ 0 the QP `min wᵀΣw − γ μᵀw` traces the bounded
/// efficient frontier with volatility non-decreasing in γ. The γ that puts
/// the volatility on the target is the multiplier of the risk constraint,
/// found by bracketing and bisection; the returned weights always satisfy
/// the constraint.
pub fn solve_efficient_risk(
    mu: &[f64],
    sigma: &DMatrix<f64>,
    bounds: WeightBounds,
    target_volatility: f64,
    risk_free_rate: f64,
    settings: &SolverSettings,
) -> MarkowitzResult<PortfolioPoint> {
    let label = Objective::EfficientRisk.label();
    if !target_volatility.is_finite() || target_volatility <= 0.0 {
        return Err(MarkowitzError::InvalidInput {
            field: "target_volatility".into(),
            reason: format!("must be positive and finite, got {}", target_volatility),
        });
    }
    check_problem(mu, sigma, bounds, label)?;
    let tol = settings.bisection_tolerance;
    let finish = |w: Vec<f64>| evaluate(Objective::EfficientRisk, w, mu, sigma, risk_free_rate);

    // Risk constraint inactive: the return-maximizing portfolio already fits.
    let w_max = max_return_weights(mu, bounds);
    if portfolio_volatility(&w_max, sigma) <= target_volatility {
        debug!("volatility target not binding, returning maximum-return portfolio");
        return Ok(finish(w_max));
    }

    let w_min = solve_risk_tolerance(mu, sigma, bounds, 0.0, settings, label)?;
    let vol_min = portfolio_volatility(&w_min, sigma);
    if vol_min > target_volatility + tol {
        return Err(MarkowitzError::infeasible(
            label,
            format!(
                "target volatility {:.6} is below the minimum achievable volatility {:.6}",
                target_volatility, vol_min
            ),
        ));
    }
    if vol_min >= target_volatility - tol {
        return Ok(finish(w_min));
    }

    let mut steps = 1u32;
    let mut lo = 0.0_f64;
    let mut best = w_min;

    // Bracket: grow γ until the volatility crosses the target.
    let mut hi = 1e-4_f64;
    loop {
        if steps >= settings.max_bisection_steps || hi > 1e10 {
            let point = finish(best);
            debug!(
                gamma = lo,
                qp_solves = steps,
                volatility_gap = target_volatility - point.volatility,
                "risk tolerance bracket exhausted before the target was crossed"
            );
            return Ok(point);
        }
        let w = solve_risk_tolerance(mu, sigma, bounds, hi, settings, label)?;
        steps += 1;
        if portfolio_volatility(&w, sigma) > target_volatility {
            break;
        }
        lo = hi;
        best = w;
        hi *= 4.0;
    }

    // Bisect on γ keeping the feasible end.
    while steps < settings.max_bisection_steps {
        let mid = 0.5 * (lo + hi);
        if hi - lo <= 1e-12 * hi {
            break;
        }
        let w = solve_risk_tolerance(mu, sigma, bounds, mid, settings, label)?;
        steps += 1;
        let vol = portfolio_volatility(&w, sigma);
        if vol <= target_volatility {
            lo = mid;
            best = w;
            if target_volatility - vol <= tol {
                break;
            }
        } else {
            hi = mid;
        }
    }

    let point = finish(best);
    let gap = target_volatility - point.volatility;
    if steps >= settings.max_bisection_steps && gap > tol {
        debug!(
            gamma = lo,
            qp_solves = steps,
            volatility_gap = gap,
            "bisection step limit reached before the volatility target"
        );
    }
    debug!(
        gamma = lo,
        qp_solves = steps,
        ret = point.expected_return,
        vol = point.volatility,
        "efficient-risk portfolio solved"
    );
    Ok(point)
}

// ---------------------------------------------------------------------------
// Portfolio math helpers
// ---------------------------------------------------------------------------

/// Compute Sharpe ratio with division-by-zero guard.
pub fn compute_sharpe(ret: f64, rf: f64, risk: f64) -> f64 {
    if risk <= 0.0 {
        0.0
    } else {
        (ret - rf) / risk
    }
}

pub fn portfolio_return(w: &[f64], mu: &[f64]) -> f64 {
    dot(w, mu)
}

/// Portfolio standard deviation: sqrt(w' * Sigma * w).
pub fn portfolio_volatility(w: &[f64], sigma: &DMatrix<f64>) -> f64 {
    let wv = DVector::from_column_slice(w);
    wv.dot(&(sigma * &wv)).max(0.0).sqrt()
}

/// Highest-return weights under the bounds: fill assets in descending order
/// of expected return, each up to `max_weight`.
pub fn max_return_weights(mu: &[f64], bounds: WeightBounds) -> Vec<f64> {
    let mut order: Vec<usize> = (0..mu.len()).collect();
    order.sort_by(|&i, &j| mu[j].total_cmp(&mu[i]).then(i.cmp(&j)));
    let mut w = vec![0.0; mu.len()];
    let mut remaining = 1.0_f64;
    for i in order {
        if remaining <= 0.0 {
            break;
        }
        let take = bounds.max_weight.min(remaining);
        w[i] = take;
        remaining -= take;
    }
    w
}

fn evaluate(
    objective: Objective,
    weights: Vec<f64>,
    mu: &[f64],
    sigma: &DMatrix<f64>,
    rf: f64,
) -> PortfolioPoint {
    let expected_return = portfolio_return(&weights, mu);
    let volatility = portfolio_volatility(&weights, sigma);
    PortfolioPoint {
        objective,
        sharpe_ratio: compute_sharpe(expected_return, rf, volatility),
        weights,
        expected_return,
        volatility,
    }
}

/// min wᵀΣw − γ μᵀw  s.t.  1ᵀw = 1, 0 ≤ w ≤ max_weight.
fn solve_risk_tolerance(
    mu: &[f64],
    sigma: &DMatrix<f64>,
    bounds: WeightBounds,
    gamma: f64,
    settings: &SolverSettings,
    label: &str,
) -> MarkowitzResult<Vec<f64>> {
    let n = mu.len();
    let mut g = DMatrix::<f64>::zeros(2 * n, n);
    let mut h = DVector::<f64>::zeros(2 * n);
    for i in 0..n {
        g[(i, i)] = -1.0;
        g[(n + i, i)] = 1.0;
        h[n + i] = bounds.max_weight;
    }
    let qp = QuadraticProgram {
        p: sigma * 2.0,
        q: DVector::from_iterator(n, mu.iter().map(|m| -gamma * m)),
        a: DMatrix::from_element(1, n, 1.0),
        b: DVector::from_element(1, 1.0),
        g,
        h,
    };
    let sol = qp.solve(settings, label)?;
    let mut w: Vec<f64> = sol.x.iter().copied().collect();
    project_onto_bounds(&mut w, bounds, label)?;
    Ok(w)
}

/// Shared dimension and budget checks. Returns the number of assets.
fn check_problem(
    mu: &[f64],
    sigma: &DMatrix<f64>,
    bounds: WeightBounds,
    label: &str,
) -> MarkowitzResult<usize> {
    let n = mu.len();
    if n == 0 {
        return Err(MarkowitzError::InsufficientData(
            "at least one asset required".into(),
        ));
    }
    if sigma.nrows() != n || sigma.ncols() != n {
        return Err(MarkowitzError::InvalidInput {
            field: "covariance_matrix".into(),
            reason: format!(
                "expected {}x{} matrix but got {}x{}",
                n,
                n,
                sigma.nrows(),
                sigma.ncols()
            ),
        });
    }
    if let Some(i) = mu.iter().position(|v| !v.is_finite()) {
        return Err(MarkowitzError::Statistics(format!(
            "expected return {} is not finite ({})",
            i, mu[i]
        )));
    }
    if !bounds.admits_budget(n) {
        return Err(MarkowitzError::infeasible(
            label,
            format!(
                "max_weight {} x {} assets = {:.4} cannot reach a fully invested portfolio",
                bounds.max_weight,
                n,
                bounds.max_weight * n as f64
            ),
        ));
    }
    Ok(n)
}

/// Clip interior-point noise back into the box and renormalize the budget.
fn project_onto_bounds(w: &mut [f64], bounds: WeightBounds, label: &str) -> MarkowitzResult<()> {
    if w.iter().any(|v| !v.is_finite()) {
        return Err(MarkowitzError::numerical(label, "solver returned non-finite weights"));
    }
    for wi in w.iter_mut() {
        *wi = wi.clamp(0.0, bounds.max_weight);
    }
    normalize_weights(w);
    let total: f64 = w.iter().sum();
    if (total - 1.0).abs() > 1e-6 {
        return Err(MarkowitzError::numerical(
            label,
            format!("weights sum to {} after projection", total),
        ));
    }
    Ok(())
}

/// Normalize weights to sum to 1.
fn normalize_weights(w: &mut [f64]) {
    let total: f64 = w.iter().sum();
    if total > 0.0 {
        for wi in w.iter_mut() {
            *wi /= total;
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
