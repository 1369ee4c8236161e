//! Levenberg–Marquardt pose refinement for PnP solutions.

use glam::DVec3;
use nalgebra::{Matrix6, Vector6};
use rgbd_geometry::distortion::{project_point, CameraIntrinsic, PolynomialDistortion};
use rgbd_geometry::linalg::array33_to_dmat3;
use rgbd_geometry::rotation::rotation_vector_to_matrix;

use crate::ops::check_correspondences;
use crate::pnp::PnPError;

/// Parameters controlling the LM pose refinement.
#[derive(Debug, Clone)]
pub struct LMParams {
    /// Maximum number of LM iterations.
    pub max_iters: usize,
    /// Convergence threshold on squared reprojection error decrease.
    pub eps: f64,
    /// Initial damping factor (lambda).
    pub lambda_init: f64,
    /// Multiplicative factor to increase/decrease lambda.
    pub lambda_mul: f64,
}

impl Default for LMParams {
    fn default() -> Self {
        Self {
            max_iters: 30,
            eps: 1e-10,
            lambda_init: 1e-3,
            lambda_mul: 10.0,
        }
    }
}

impl LMParams {
    /// Set maximum iterations.
    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    /// Set the convergence threshold.
    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    /// Set initial lambda.
    pub fn with_lambda_init(mut self, lambda: f64) -> Self {
        self.lambda_init = lambda;
        self
    }
}

/// Refine a pose (rvec, t) with Levenberg–Marquardt to minimize pixel reprojection error.
///
/// The residuals go through the full camera model, lens distortion included.
///
/// - `points_world`: World points (N,3)
/// - `points_image`: Distorted pixel points (N,2)
/// - `intrinsic`: Pinhole intrinsics
/// - `distortion`: Optional lens distortion
/// - `rvec`: Initial axis-angle rotation (input/output)
/// - `t`: Initial translation (input/output)
///
/// Returns `(rmse, num_iters, converged)` and writes refined `rvec` and `t` in place.
pub fn refine_pose_lm(
    points_world: &[[f64; 3]],
    points_image: &[[f64; 2]],
    intrinsic: &CameraIntrinsic,
    distortion: Option<&PolynomialDistortion>,
    rvec: &mut [f64; 3],
    t: &mut [f64; 3],
    params: &LMParams,
) -> Result<(f64, usize, bool), PnPError> {
    check_correspondences(points_world, points_image, 3)?;

    let n = points_world.len();
    let none = PolynomialDistortion::none();
    let distortion = distortion.unwrap_or(&none);

    // Parameters vector x = [rx, ry, rz, tx, ty, tz]
    let mut x = [rvec[0], rvec[1], rvec[2], t[0], t[1], t[2]];

    let mut residuals = vec![0.0f64; 2 * n];
    let mut residuals_p = vec![0.0f64; 2 * n];
    let mut residuals_m = vec![0.0f64; 2 * n];

    let project_all_in_place = |x: &[f64; 6], out: &mut [f64]| -> f64 {
        let r_mat = array33_to_dmat3(&rotation_vector_to_matrix(&[x[0], x[1], x[2]]));
        let t_vec = DVec3::new(x[3], x[4], x[5]);

        let mut sum_sq = 0.0;
        for (i, (pw, uv)) in points_world.iter().zip(points_image.iter()).enumerate() {
            let pc = r_mat * DVec3::from(*pw) + t_vec;
            let [u_hat, v_hat] = project_point(&pc.to_array(), intrinsic, distortion);
            let du = u_hat - uv[0];
            let dv = v_hat - uv[1];
            out[2 * i] = du;
            out[2 * i + 1] = dv;
            sum_sq += du.mul_add(du, dv * dv);
        }
        sum_sq
    };

    let mut lambda = params.lambda_init;
    let mut err_sq_base = project_all_in_place(&x, &mut residuals);

    let mut iters = 0usize;
    let mut converged = false;

    let mut j = vec![0.0f64; 2 * n * 6];

    while iters < params.max_iters {
        iters += 1;

        const H_ROT: f64 = 1e-6; // radians
        let t_scale = x[3].abs().max(x[4].abs()).max(x[5].abs()).max(1.0);
        let h_trans = 1e-6 * t_scale; // world units

        for k_idx in 0..6 {
            // Central differences
            let h = if k_idx < 3 { H_ROT } else { h_trans };
            let mut x_plus = x;
            let mut x_minus = x;
            x_plus[k_idx] += h;
            x_minus[k_idx] -= h;
            project_all_in_place(&x_plus, &mut residuals_p);
            project_all_in_place(&x_minus, &mut residuals_m);
            for i in 0..(2 * n) {
                j[i * 6 + k_idx] = (residuals_p[i] - residuals_m[i]) / (2.0 * h);
            }
        }

        // Build normal equations: (J^T J + lambda I) delta = -J^T r
        let mut a = Matrix6::<f64>::zeros();
        let mut b = Vector6::<f64>::zeros();
        for (row, r_val) in j.chunks_exact(6).zip(residuals.iter()) {
            let jr = Vector6::from_column_slice(row);
            b += jr * *r_val;
            a += jr * jr.transpose();
        }
        for d in 0..6 {
            a[(d, d)] += lambda;
        }

        let Some(delta) = a.cholesky().map(|c| c.solve(&(-b))) else {
            // Singular system, increase damping
            lambda *= params.lambda_mul;
            continue;
        };

        let mut x_new = x;
        for (xi, di) in x_new.iter_mut().zip(delta.iter()) {
            *xi += di;
        }
        let err_sq_new = project_all_in_place(&x_new, &mut residuals_p);

        if err_sq_new < err_sq_base {
            // Accept step
            x = x_new;
            residuals.copy_from_slice(&residuals_p);
            let decrease = err_sq_base - err_sq_new;
            err_sq_base = err_sq_new;
            if decrease < params.eps {
                converged = true;
                break;
            }
            lambda = (lambda / params.lambda_mul).max(1e-12);
        } else {
            if delta.norm() < params.eps {
                // already at the minimum to numerical precision
                converged = true;
                break;
            }
            // Reject step, increase damping
            lambda *= params.lambda_mul;
        }
    }

    rvec.copy_from_slice(&x[0..3]);
    t.copy_from_slice(&x[3..6]);

    let rmse = (err_sq_base / n as f64).sqrt();
    log::debug!("LM refinement: rmse {rmse:.4} px, {iters} iterations, converged: {converged}");
    Ok((rmse, iters, converged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_refine_recovers_perturbed_pose() -> Result<(), PnPError> {
        let intr = CameraIntrinsic::new(700.0, 700.0, 320.0, 240.0);
        let dist = PolynomialDistortion {
            k1: 0.08,
            k2: -0.02,
            p1: 0.0005,
            ..Default::default()
        };
        let rvec_gt = [0.05, 0.3, -0.1];
        let t_gt = [0.1, -0.05, 2.0];
        let r = array33_to_dmat3(&rotation_vector_to_matrix(&rvec_gt));
        let world = [
            [-0.2, -0.2, 0.0],
            [0.2, -0.2, 0.1],
            [0.2, 0.2, 0.0],
            [-0.2, 0.2, -0.1],
            [0.0, 0.0, 0.2],
            [0.1, -0.1, -0.2],
        ];
        let image: Vec<[f64; 2]> = world
            .iter()
            .map(|p| {
                let pc = r * DVec3::from(*p) + DVec3::from(t_gt);
                project_point(&pc.to_array(), &intr, &dist)
            })
            .collect();

        let mut rvec = [0.06, 0.28, -0.08];
        let mut t = [0.12, -0.04, 2.1];
        let (rmse, iters, _) = refine_pose_lm(
            &world,
            &image,
            &intr,
            Some(&dist),
            &mut rvec,
            &mut t,
            &LMParams::default().with_max_iters(100),
        )?;

        assert!(iters > 0);
        assert!(rmse < 1e-4, "rmse {rmse}");
        for k in 0..3 {
            assert_relative_eq!(rvec[k], rvec_gt[k], epsilon = 1e-6);
            assert_relative_eq!(t[k], t_gt[k], epsilon = 1e-6);
        }
        Ok(())
    }

    #[test]
    fn test_refine_mismatched_lengths() {
        let intr = CameraIntrinsic::new(700.0, 700.0, 320.0, 240.0);
        let mut rvec = [0.0; 3];
        let mut t = [0.0, 0.0, 1.0];
        let res = refine_pose_lm(
            &[[0.0, 0.0, 0.0]; 4],
            &[[0.0, 0.0]; 3],
            &intr,
            None,
            &mut rvec,
            &mut t,
            &LMParams::default(),
        );
        assert!(matches!(res, Err(PnPError::MismatchedArrayLengths { .. })));
    }
}
