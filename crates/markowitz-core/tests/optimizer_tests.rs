use markowitz_core::data::returns::ReturnMatrix;
use markowitz_core::optimization::frontier::{solve_min_variance, Objective};
use markowitz_core::optimization::statistics::estimate_statistics;
use markowitz_core::simulation::synthetic::{
    generate_returns, SyntheticAsset, SyntheticReturnsInput,
};
use markowitz_core::types::WeightBounds;
use markowitz_core::{
    optimize, optimize_with_settings, ComputationOutput, ErrorKind, OptimizationOutput,
    OptimizerSettings,
};
use pretty_assertions::assert_eq;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// (name, annual mean, annual volatility)
type AssetParams = (&'static str, f64, f64);

const SCENARIO: [AssetParams; 3] = [("A", 0.08, 0.15), ("B", 0.10, 0.20), ("C", 0.05, 0.10)];

/// Independent normal daily draws.
fn simulated(params: &[AssetParams], days: usize, seed: u64) -> ReturnMatrix {
    let assets = params
        .iter()
        .map(|(name, mean, vol)| SyntheticAsset {
            name: name.to_string(),
            annual_mean: *mean,
            annual_volatility: *vol,
        })
        .collect();
    generate_returns(&SyntheticReturnsInput {
        assets,
        num_days: days,
        trading_days: 252,
        seed: Some(seed),
        start_date: None,
    })
    .unwrap()
}

fn three_assets(days: usize, seed: u64) -> ReturnMatrix {
    simulated(&SCENARIO, days, seed)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Normal draws adjusted so the sample statistics equal the parameters
/// exactly: columns are centered, orthogonalized and rescaled, giving
/// annualized means `mean` and a diagonal covariance `vol²`.
fn moment_matched(params: &[AssetParams], days: usize, seed: u64) -> ReturnMatrix {
    let raw = simulated(params, days, seed);
    let n = days as f64;
    let mut cols: Vec<Vec<f64>> = Vec::with_capacity(params.len());
    for c in 0..params.len() {
        let mut x = raw.column(c);
        let m = x.iter().sum::<f64>() / n;
        x.iter_mut().for_each(|v| *v -= m);
        for prev in &cols {
            let proj = dot(&x, prev) / dot(prev, prev);
            x.iter_mut().zip(prev).for_each(|(v, p)| *v -= proj * p);
        }
        cols.push(x);
    }
    let scales: Vec<f64> = cols
        .iter()
        .zip(params)
        .map(|(x, (_, _, vol))| (vol / 252f64.sqrt()) / (dot(x, x) / (n - 1.0)).sqrt())
        .collect();
    let rows = (0..days)
        .map(|t| {
            params
                .iter()
                .enumerate()
                .map(|(c, (_, mean, _))| mean / 252.0 + cols[c][t] * scales[c])
                .collect()
        })
        .collect();
    ReturnMatrix::new(raw.index().to_vec(), raw.assets().to_vec(), rows).unwrap()
}

/// Long-only tangency weights for a diagonal covariance when no bound binds:
/// proportional to mean / variance.
fn diagonal_tangency(params: &[AssetParams]) -> Vec<f64> {
    let raw: Vec<f64> = params.iter().map(|(_, m, v)| m / (v * v)).collect();
    let total: f64 = raw.iter().sum();
    raw.iter().map(|r| r / total).collect()
}

fn weights_of(out: &ComputationOutput<OptimizationOutput>) -> Vec<Decimal> {
    out.result.optimal_portfolio.iter().map(|a| a.weight).collect()
}

fn assert_valid_weights(weights: &[Decimal], max_weight: Decimal) {
    let total: Decimal = weights.iter().sum();
    assert_eq!(total, Decimal::ONE);
    for w in weights {
        assert!(*w >= Decimal::ZERO, "negative weight {}", w);
        assert!(*w <= max_weight, "weight {} above cap {}", w, max_weight);
        assert!(w.scale() <= 6, "weight {} has more than 6 decimals", w);
    }
}

// ---------------------------------------------------------------------------
// Three-asset scenario: 252 daily rows, cap 0.6
// ---------------------------------------------------------------------------

#[test]
fn test_scenario_ceiling_not_binding() {
    let returns = moment_matched(&SCENARIO, 252, 42);
    let out = optimize(&returns, 1.0, 0.6).unwrap();
    let result = &out.result;

    assert_eq!(result.objective, Objective::MaxSharpe);
    assert!(!result.risk_ceiling_fallback);
    assert!(out.warnings.is_empty());
    let weights = weights_of(&out);
    assert_valid_weights(&weights, dec!(0.6));

    let vol = result.portfolio_metrics.expected_volatility.to_f64().unwrap();
    assert!(vol < 1.0);

    // Tangency ∝ μ/σ² = [3.56, 2.5, 5.0]: C carries the largest weight.
    let expected = diagonal_tangency(&SCENARIO);
    for (w, e) in weights.iter().zip(&expected) {
        assert!((w.to_f64().unwrap() - e).abs() < 1e-4, "{} vs {}", w, e);
    }
    let top = result
        .optimal_portfolio
        .iter()
        .max_by(|a, b| a.weight.cmp(&b.weight))
        .unwrap();
    assert_eq!(top.name, "C");

    let expected_vol = SCENARIO
        .iter()
        .zip(&expected)
        .map(|((_, _, v), w)| w * w * v * v)
        .sum::<f64>()
        .sqrt();
    assert!((vol - expected_vol).abs() < 1e-4);
}

#[test]
fn test_scenario_unreachable_ceiling_falls_back() {
    // Minimum attainable volatility is 1/sqrt(Σ 1/σ²) ≈ 0.0768.
    let returns = moment_matched(&SCENARIO, 252, 42);
    let out = optimize(&returns, 0.05, 0.6).unwrap();
    let result = &out.result;

    assert_eq!(result.objective, Objective::MaxSharpe);
    assert!(result.risk_ceiling_fallback);
    assert_eq!(out.warnings.len(), 1);
    assert!(out.warnings[0].contains("risk ceiling"));

    let unconstrained = optimize(&returns, 1.0, 0.6).unwrap();
    assert_eq!(
        result.optimal_portfolio,
        unconstrained.result.optimal_portfolio
    );
    assert_eq!(
        result.portfolio_metrics,
        unconstrained.result.portfolio_metrics
    );
}

#[test]
fn test_scenario_raw_draws() {
    // First seed whose sample has an asset with positive mean return.
    let returns = (0..100)
        .map(|seed| three_assets(252, seed))
        .find(|m| (0..3).any(|c| m.column(c).iter().sum::<f64>() > 0.0))
        .unwrap();
    let out = optimize(&returns, 1.0, 0.6).unwrap();
    assert_eq!(out.result.objective, Objective::MaxSharpe);
    assert_valid_weights(&weights_of(&out), dec!(0.6));
    assert!(out.result.portfolio_metrics.expected_volatility < dec!(1.0));
}

#[test]
fn test_binding_ceiling_targets_volatility() {
    let params: [AssetParams; 3] = [("A", 0.05, 0.10), ("B", 0.30, 0.25), ("C", 0.02, 0.08)];
    let returns = moment_matched(&params, 252, 7);
    let settings = OptimizerSettings::default();

    let free = optimize(&returns, 1.0, 0.6).unwrap();
    let max_sharpe_vol = free
        .result
        .portfolio_metrics
        .expected_volatility
        .to_f64()
        .unwrap();

    let stats = estimate_statistics(&returns, settings.trading_days).unwrap();
    let sigma = stats.covariance_matrix();
    let min_var = solve_min_variance(
        &stats.expected_returns,
        &sigma,
        WeightBounds::new(0.6).unwrap(),
        settings.risk_free_rate,
        &settings.solver,
    )
    .unwrap();
    // ≈ 0.102 against ≈ 0.061.
    assert!(
        max_sharpe_vol - min_var.volatility > 0.01,
        "fixture does not separate max-Sharpe {} from min-variance {}",
        max_sharpe_vol,
        min_var.volatility
    );

    let ceiling = 0.5 * (max_sharpe_vol + min_var.volatility);
    let out = optimize(&returns, ceiling, 0.6).unwrap();
    let result = &out.result;

    assert_eq!(result.objective, Objective::EfficientRisk);
    assert!(!result.risk_ceiling_fallback);
    assert!(out.warnings.is_empty());
    assert_valid_weights(&weights_of(&out), dec!(0.6));
    let vol = result.portfolio_metrics.expected_volatility.to_f64().unwrap();
    assert!(
        (vol - ceiling).abs() < 1e-3,
        "volatility {} should sit at the ceiling {}",
        vol,
        ceiling
    );
    let ret = result.portfolio_metrics.expected_return.to_f64().unwrap();
    let free_ret = free.result.portfolio_metrics.expected_return.to_f64().unwrap();
    assert!(ret < free_ret);
}

#[test]
fn test_cap_of_one_third_spreads_budget_evenly() {
    // Three assets capped at 1/3 must each hold a third.
    let returns = moment_matched(&SCENARIO, 252, 42);
    let out = optimize(&returns, 1.0, 1.0 / 3.0).unwrap();
    let weights = weights_of(&out);
    assert_eq!(weights.iter().sum::<Decimal>(), Decimal::ONE);
    for w in &weights {
        assert!(*w >= dec!(0.333333) && *w <= dec!(0.333334), "weight {}", w);
    }
}

#[test]
fn test_identical_columns_are_rejected() {
    let base = three_assets(300, 3);
    let rows = base
        .rows()
        .iter()
        .map(|r| vec![r[0], r[1], r[0]])
        .collect();
    let returns = ReturnMatrix::from_rows(
        vec!["A".into(), "B".into(), "A_COPY".into()],
        rows,
    )
    .unwrap();
    let err = optimize(&returns, 1.0, 0.6).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllConditionedCovariance);
}

#[test]
fn test_cap_below_budget_is_infeasible() {
    let returns = three_assets(300, 5);
    let err = optimize(&returns, 1.0, 0.3).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Infeasible);
}

#[test]
fn test_repeated_runs_are_identical() {
    let returns = three_assets(1000, 11);
    let a = optimize(&returns, 0.12, 0.5).unwrap();
    let b = optimize(&returns, 0.12, 0.5).unwrap();
    assert_eq!(
        serde_json::to_value(a.result.detailed()).unwrap(),
        serde_json::to_value(b.result.detailed()).unwrap()
    );
}

#[test]
fn test_full_cap_single_asset_possible() {
    // One asset dominates; with no cap it may take everything.
    let returns = three_assets(2520, 42);
    let out = optimize(&returns, 1.0, 1.0).unwrap();
    assert_valid_weights(&weights_of(&out), Decimal::ONE);
    assert!(out.result.portfolio_metrics.active_positions >= 1);
}

#[test]
fn test_sharpe_uses_risk_free_rate() {
    let returns = three_assets(2520, 42);
    let mut settings = OptimizerSettings::default();
    settings.risk_free_rate = 0.01;
    let out = optimize_with_settings(&returns, 1.0, 1.0, &settings).unwrap();
    let m = &out.result.portfolio_metrics;
    let ret = m.expected_return.to_f64().unwrap();
    let vol = m.expected_volatility.to_f64().unwrap();
    let sharpe = m.sharpe_ratio.to_f64().unwrap();
    assert!(((ret - 0.01) / vol - sharpe).abs() < 1e-4);
}

#[test]
fn test_envelope_metadata() {
    let returns = three_assets(300, 1);
    let out = optimize(&returns, 1.0, 0.6).unwrap();
    assert!(out.methodology.contains("Markowitz"));
    assert_eq!(out.assumptions["n_assets"], 3);
    assert_eq!(out.assumptions["n_observations"], 300);
}
