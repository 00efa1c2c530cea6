//! Dense primal-dual interior-point solver for convex quadratic programs
//!
//! ```text
//! minimize    ½ xᵀPx + qᵀx
//! subject to  Ax = b
//!             Gx ≤ h
//! ```
//!
//! with P positive semidefinite. Mehrotra predictor-corrector steps on the
//! slack form `Gx + s = h, s ≥ 0`; each Newton system is reduced to the
//! (n + p) KKT block and solved by LU. Problem sizes here are a few hundred
//! variables at most, so dense factorizations are fine.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

use crate::error::MarkowitzError;
use crate::settings::SolverSettings;
use crate::MarkowitzResult;

/// Fraction of the distance to the boundary taken per step.
const STEP_DAMPING: f64 = 0.99;
/// Diagonal added to the reduced Hessian.
const HESSIAN_REGULARIZATION: f64 = 1e-13;
/// Iterates beyond this norm are treated as diverging (primal or dual infeasible).
const DIVERGENCE_NORM: f64 = 1e13;
/// Step lengths below this mean the iteration has stalled.
const MIN_STEP: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct QuadraticProgram {
    pub p: DMatrix<f64>,
    pub q: DVector<f64>,
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
    pub g: DMatrix<f64>,
    pub h: DVector<f64>,
}

#[derive(Debug, Clone)]
pub struct QpSolution {
    pub x: DVector<f64>,
    /// Multipliers of the equality constraints.
    pub y: DVector<f64>,
    /// Multipliers of the inequality constraints.
    pub z: DVector<f64>,
    pub objective: f64,
    pub duality_gap: f64,
    pub iterations: u32,
}

/// Newton step in all four blocks.
struct Direction {
    dx: DVector<f64>,
    dy: DVector<f64>,
    dz: DVector<f64>,
    ds: DVector<f64>,
}

impl QuadraticProgram {
    pub fn num_variables(&self) -> usize {
        self.p.nrows()
    }

    fn check_dimensions(&self, label: &str) -> MarkowitzResult<()> {
        let n = self.p.nrows();
        let ok = self.p.ncols() == n
            && self.q.len() == n
            && self.a.ncols() == n
            && self.a.nrows() == self.b.len()
            && self.g.ncols() == n
            && self.g.nrows() == self.h.len()
            && n > 0;
        if ok {
            Ok(())
        } else {
            Err(MarkowitzError::numerical(
                label,
                format!(
                    "inconsistent problem dimensions (P {}x{}, q {}, A {}x{}, b {}, G {}x{}, h {})",
                    self.p.nrows(),
                    self.p.ncols(),
                    self.q.len(),
                    self.a.nrows(),
                    self.a.ncols(),
                    self.b.len(),
                    self.g.nrows(),
                    self.g.ncols(),
                    self.h.len()
                ),
            ))
        }
    }

    fn objective(&self, x: &DVector<f64>) -> f64 {
        0.5 * x.dot(&(&self.p * x)) + self.q.dot(x)
    }

    /// Solve to the relative tolerance in `settings`.
    ///
    /// A run that does not converge within `max_iterations`, stalls, or whose
    /// iterates diverge is reported as infeasible; non-finite arithmetic or a
    /// singular KKT system is a numerical failure.
    pub fn solve(&self, settings: &SolverSettings, label: &str) -> MarkowitzResult<QpSolution> {
        self.check_dimensions(label)?;

        let n = self.num_variables();
        let p_eq = self.a.nrows();
        let m = self.g.nrows();
        let tol = settings.tolerance;

        let res_x0 = self.q.norm().max(1.0);
        let res_y0 = self.b.norm().max(1.0);
        let res_z0 = self.h.norm().max(1.0);

        let (mut x, mut y) = self.initial_point(label)?;
        let mut s = &self.h - &self.g * &x;
        let mut z = -s.clone();
        shift_positive(&mut s);
        shift_positive(&mut z);

        if m == 0 {
            let objective = self.objective(&x);
            return Ok(QpSolution {
                x,
                y,
                z,
                objective,
                duality_gap: 0.0,
                iterations: 0,
            });
        }

        let mut last = (f64::INFINITY, f64::INFINITY, f64::INFINITY);

        for iteration in 0..settings.max_iterations {
            let rd = &self.p * &x + &self.q + self.a.transpose() * &y + self.g.transpose() * &z;
            let rp = &self.a * &x - &self.b;
            let ri = &self.g * &x + &s - &self.h;

            let gap = s.dot(&z);
            let mu = gap / m as f64;
            let pcost = self.objective(&x);

            let pres = (rp.norm() / res_y0).max(ri.norm() / res_z0);
            let dres = rd.norm() / res_x0;
            last = (pres, dres, gap);

            if !(pres.is_finite() && dres.is_finite() && gap.is_finite()) {
                return Err(MarkowitzError::numerical(
                    label,
                    format!("non-finite residuals at iteration {}", iteration),
                ));
            }

            trace!(
                label,
                iteration,
                pcost,
                pres,
                dres,
                gap,
                "interior-point iteration"
            );

            if pres <= tol && dres <= tol && gap <= tol * pcost.abs().max(1.0) {
                debug!(label, iterations = iteration, objective = pcost, "QP converged");
                return Ok(QpSolution {
                    x,
                    y,
                    z,
                    objective: pcost,
                    duality_gap: gap,
                    iterations: iteration,
                });
            }

            if x.norm() > DIVERGENCE_NORM || z.norm() > DIVERGENCE_NORM {
                return Err(MarkowitzError::infeasible(
                    label,
                    format!(
                        "iterates diverged at iteration {} (primal residual {:.3e}, dual residual {:.3e})",
                        iteration, pres, dres
                    ),
                ));
            }

            // Reduced KKT: [P + GᵀDG, Aᵀ; A, 0], D = z / s.
            let d = z.component_div(&s);
            let mut gd = self.g.clone();
            for (i, mut row) in gd.row_iter_mut().enumerate() {
                row *= d[i];
            }
            let mut hess = &self.p + self.g.transpose() * &gd;
            for i in 0..n {
                hess[(i, i)] += HESSIAN_REGULARIZATION;
            }

            let dim = n + p_eq;
            let mut kkt = DMatrix::<f64>::zeros(dim, dim);
            kkt.view_mut((0, 0), (n, n)).copy_from(&hess);
            if p_eq > 0 {
                kkt.view_mut((0, n), (n, p_eq)).copy_from(&self.a.transpose());
                kkt.view_mut((n, 0), (p_eq, n)).copy_from(&self.a);
            }
            let lu = kkt.lu();

            // Predictor (affine scaling).
            let rc_aff = s.component_mul(&z);
            let aff = self.direction(&lu, &d, &s, &z, &rd, &rp, &ri, &rc_aff, label)?;
            let alpha_aff = max_step(&s, &aff.ds).min(max_step(&z, &aff.dz)).min(1.0);
            let s_aff = &s + &aff.ds * alpha_aff;
            let z_aff = &z + &aff.dz * alpha_aff;
            let mu_aff = s_aff.dot(&z_aff) / m as f64;
            let sigma = if mu > 0.0 { (mu_aff / mu).powi(3).clamp(0.0, 1.0) } else { 0.0 };

            // Corrector.
            let rc = rc_aff + aff.ds.component_mul(&aff.dz)
                - DVector::from_element(m, sigma * mu);
            let dir = self.direction(&lu, &d, &s, &z, &rd, &rp, &ri, &rc, label)?;

            let alpha = (STEP_DAMPING * max_step(&s, &dir.ds).min(max_step(&z, &dir.dz))).min(1.0);
            if alpha < MIN_STEP {
                return Err(MarkowitzError::infeasible(
                    label,
                    format!(
                        "interior-point iteration stalled at iteration {} (primal residual {:.3e}, dual residual {:.3e}, gap {:.3e})",
                        iteration, pres, dres, gap
                    ),
                ));
            }

            x += &dir.dx * alpha;
            y += &dir.dy * alpha;
            z += &dir.dz * alpha;
            s += &dir.ds * alpha;
        }

        Err(MarkowitzError::infeasible(
            label,
            format!(
                "did not converge after {} iterations (primal residual {:.3e}, dual residual {:.3e}, gap {:.3e})",
                settings.max_iterations, last.0, last.1, last.2
            ),
        ))
    }

    /// Least-squares start: minimize ½xᵀPx + qᵀx + ½‖Gx − h‖² subject to Ax = b.
    fn initial_point(&self, label: &str) -> MarkowitzResult<(DVector<f64>, DVector<f64>)> {
        let n = self.num_variables();
        let p_eq = self.a.nrows();
        let dim = n + p_eq;

        let mut hess = &self.p + self.g.transpose() * &self.g;
        for i in 0..n {
            let bump = HESSIAN_REGULARIZATION.max(1e-10 * hess[(i, i)].abs());
            hess[(i, i)] += bump;
        }
        let mut kkt = DMatrix::<f64>::zeros(dim, dim);
        kkt.view_mut((0, 0), (n, n)).copy_from(&hess);
        if p_eq > 0 {
            kkt.view_mut((0, n), (n, p_eq)).copy_from(&self.a.transpose());
            kkt.view_mut((n, 0), (p_eq, n)).copy_from(&self.a);
        }
        let mut rhs = DVector::<f64>::zeros(dim);
        rhs.rows_mut(0, n)
            .copy_from(&(-&self.q + self.g.transpose() * &self.h));
        if p_eq > 0 {
            rhs.rows_mut(n, p_eq).copy_from(&self.b);
        }

        let sol = kkt.lu().solve(&rhs).ok_or_else(|| {
            MarkowitzError::numerical(
                label,
                "singular KKT system at the starting point; equality constraints may be dependent",
            )
        })?;
        Ok((sol.rows(0, n).into_owned(), sol.rows(n, p_eq).into_owned()))
    }

    #[allow(clippy::too_many_arguments)]
    fn direction(
        &self,
        lu: &nalgebra::LU<f64, nalgebra::Dyn, nalgebra::Dyn>,
        d: &DVector<f64>,
        s: &DVector<f64>,
        z: &DVector<f64>,
        rd: &DVector<f64>,
        rp: &DVector<f64>,
        ri: &DVector<f64>,
        rc: &DVector<f64>,
        label: &str,
    ) -> MarkowitzResult<Direction> {
        let n = self.num_variables();
        let p_eq = self.a.nrows();

        // dz = D(G dx + ri) − rc / s
        let rc_over_s = rc.component_div(s);
        let top = -rd - self.g.transpose() * (d.component_mul(ri) - &rc_over_s);

        let mut rhs = DVector::<f64>::zeros(n + p_eq);
        rhs.rows_mut(0, n).copy_from(&top);
        if p_eq > 0 {
            rhs.rows_mut(n, p_eq).copy_from(&(-rp));
        }

        let sol = lu.solve(&rhs).ok_or_else(|| {
            MarkowitzError::numerical(label, "singular KKT system during interior-point step")
        })?;
        if sol.iter().any(|v| !v.is_finite()) {
            return Err(MarkowitzError::numerical(
                label,
                "non-finite Newton direction",
            ));
        }

        let dx: DVector<f64> = sol.rows(0, n).into_owned();
        let dy: DVector<f64> = sol.rows(n, p_eq).into_owned();
        let dz = d.component_mul(&(&self.g * &dx + ri)) - rc_over_s;
        // z∘ds + s∘dz = −rc
        let ds = (-rc - s.component_mul(&dz)).component_div(z);

        Ok(Direction { dx, dy, dz, ds })
    }
}

/// Largest step `alpha` keeping `v + alpha * dv` non-negative.
fn max_step(v: &DVector<f64>, dv: &DVector<f64>) -> f64 {
    v.iter()
        .zip(dv.iter())
        .filter(|(_, d)| **d < 0.0)
        .map(|(vi, di)| -vi / di)
        .fold(f64::INFINITY, f64::min)
}

/// Move a vector strictly inside the positive orthant.
fn shift_positive(v: &mut DVector<f64>) {
    let worst = -v.min();
    if worst >= 0.0 {
        v.add_scalar_mut(1.0 + worst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SolverSettings {
        SolverSettings::default()
    }

    #[test]
    fn test_unconstrained_box_interior_minimum() {
        // min (x-1)² + (y-2)²  s.t. 0 ≤ x,y ≤ 5  -> (1, 2)
        let qp = QuadraticProgram {
            p: DMatrix::from_diagonal_element(2, 2, 2.0),
            q: DVector::from_vec(vec![-2.0, -4.0]),
            a: DMatrix::zeros(0, 2),
            b: DVector::zeros(0),
            g: DMatrix::from_row_slice(
                4,
                2,
                &[-1.0, 0.0, 0.0, -1.0, 1.0, 0.0, 0.0, 1.0],
            ),
            h: DVector::from_vec(vec![0.0, 0.0, 5.0, 5.0]),
        };
        let sol = qp.solve(&settings(), "box").unwrap();
        assert!((sol.x[0] - 1.0).abs() < 1e-6);
        assert!((sol.x[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_active_bound_and_equality() {
        // min x² + y²  s.t. x + y = 1, x ≥ 0.8  -> (0.8, 0.2)
        let qp = QuadraticProgram {
            p: DMatrix::from_diagonal_element(2, 2, 2.0),
            q: DVector::zeros(2),
            a: DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
            b: DVector::from_vec(vec![1.0]),
            g: DMatrix::from_row_slice(1, 2, &[-1.0, 0.0]),
            h: DVector::from_vec(vec![-0.8]),
        };
        let sol = qp.solve(&settings(), "active").unwrap();
        assert!((sol.x[0] - 0.8).abs() < 1e-6);
        assert!((sol.x[1] - 0.2).abs() < 1e-6);
        // Multiplier of x ≥ 0.8 is positive when the bound binds.
        assert!(sol.z[0] > 0.0);
    }

    #[test]
    fn test_linear_program() {
        // max x + 2y  s.t. x + y = 1, 0 ≤ x,y ≤ 0.7  -> (0.3, 0.7)
        let qp = QuadraticProgram {
            p: DMatrix::zeros(2, 2),
            q: DVector::from_vec(vec![-1.0, -2.0]),
            a: DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
            b: DVector::from_vec(vec![1.0]),
            g: DMatrix::from_row_slice(
                4,
                2,
                &[-1.0, 0.0, 0.0, -1.0, 1.0, 0.0, 0.0, 1.0],
            ),
            h: DVector::from_vec(vec![0.0, 0.0, 0.7, 0.7]),
        };
        let sol = qp.solve(&settings(), "lp").unwrap();
        assert!((sol.x[0] - 0.3).abs() < 1e-6);
        assert!((sol.x[1] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_infeasible_bounds() {
        // x + y = 1 with 0 ≤ x,y ≤ 0.3 has no solution.
        let qp = QuadraticProgram {
            p: DMatrix::from_diagonal_element(2, 2, 2.0),
            q: DVector::zeros(2),
            a: DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
            b: DVector::from_vec(vec![1.0]),
            g: DMatrix::from_row_slice(
                4,
                2,
                &[-1.0, 0.0, 0.0, -1.0, 1.0, 0.0, 0.0, 1.0],
            ),
            h: DVector::from_vec(vec![0.0, 0.0, 0.3, 0.3]),
        };
        assert!(qp.solve(&settings(), "infeasible").is_err());
    }

    #[test]
    fn test_dimension_mismatch() {
        let qp = QuadraticProgram {
            p: DMatrix::identity(2, 2),
            q: DVector::zeros(3),
            a: DMatrix::zeros(0, 2),
            b: DVector::zeros(0),
            g: DMatrix::zeros(0, 2),
            h: DVector::zeros(0),
        };
        assert!(matches!(
            qp.solve(&settings(), "dims").unwrap_err(),
            MarkowitzError::SolverNumerical { .. }
        ));
    }

    #[test]
    fn test_max_step() {
        let v = DVector::from_vec(vec![1.0, 2.0]);
        let dv = DVector::from_vec(vec![-0.5, 1.0]);
        assert!((max_step(&v, &dv) - 2.0).abs() < 1e-15);
        let up = DVector::from_vec(vec![1.0, 1.0]);
        assert!(max_step(&v, &up).is_infinite());
    }
}
