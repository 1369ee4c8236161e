//! Efficient Perspective-n-Point (EPnP) solver
//! Paper: https://www.tugraz.at/fileadmin/user_upload/Institute/ICG/Images/team_lepetit/publications/lepetit_ijcv08.pdf
//! Reference: https://github.com/opencv/opencv/blob/4.x/modules/calib3d/src/epnp.cpp
//!
//! The image points are undistorted to normalized coordinates first, so the
//! linear system below is built with an identity camera matrix.

use glam::{DMat3, DVec3};
use nalgebra::{DMatrix, DVector, SMatrix, SVector, SymmetricEigen};
use rgbd_geometry::distortion::{CameraIntrinsic, PolynomialDistortion};

use crate::ops::{
    check_correspondences, classify_points, finish_pose, fit_rigid, normalize_image_points,
    principal_axes, rmse_normalized,
};
use crate::pnp::{NumericTol, PnPError, PnPResult, PnPSolver};
use crate::refine::LMParams;

const GAUSS_NEWTON_ITERATIONS: usize = 5;

/// Marker type representing the Efficient PnP algorithm.
pub struct EPnP;

impl PnPSolver for EPnP {
    type Param = EPnPParams;

    fn solve(
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        intrinsic: &CameraIntrinsic,
        distortion: Option<&PolynomialDistortion>,
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError> {
        solve_epnp(world, image, intrinsic, distortion, params)
    }
}

/// Parameters controlling the EPnP solver.
#[derive(Debug, Clone)]
pub struct EPnPParams {
    /// Shared numeric tolerances.
    pub tol: NumericTol,
    /// Levenberg-Marquardt refinement of the linear estimate, `None` to skip it.
    pub refine: Option<LMParams>,
}

impl Default for EPnPParams {
    fn default() -> Self {
        Self {
            tol: NumericTol::default(),
            refine: Some(LMParams::default()),
        }
    }
}

impl EPnPParams {
    /// Set the numeric tolerances.
    pub fn with_tol(mut self, tol: NumericTol) -> Self {
        self.tol = tol;
        self
    }

    /// Set the refinement parameters, `None` to keep the linear estimate.
    pub fn with_refine(mut self, refine: Option<LMParams>) -> Self {
        self.refine = refine;
        self
    }
}

/// Solve Perspective-n-Point (EPnP).
///
/// # Arguments
/// * `points_world` – 3-D coordinates in the world frame, shape *(N,3)* with `N≥4`.
/// * `points_image` – Corresponding pixel coordinates, shape *(N,2)*.
/// * `intrinsic` – Pinhole camera intrinsics.
/// * `distortion` – Optional lens distortion of `points_image`.
///
/// # Returns
/// A [`PnPResult`] with the **world → camera** rotation and translation.
pub fn solve_epnp(
    points_world: &[[f64; 3]],
    points_image: &[[f64; 2]],
    intrinsic: &CameraIntrinsic,
    distortion: Option<&PolynomialDistortion>,
    params: &EPnPParams,
) -> Result<PnPResult, PnPError> {
    check_correspondences(points_world, points_image, 4)?;
    classify_points(points_world, &params.tol)?;

    let points_norm = normalize_image_points(points_image, intrinsic, distortion);
    let (r, t) = epnp_normalized(points_world, &points_norm, &params.tol)?;

    finish_pose(
        points_world,
        points_image,
        intrinsic,
        distortion,
        &r,
        &t,
        params.refine.as_ref(),
    )
}

/// Linear EPnP on normalized image coordinates.
pub(crate) fn epnp_normalized(
    points_world: &[[f64; 3]],
    points_norm: &[[f64; 2]],
    tol: &NumericTol,
) -> Result<(DMat3, DVec3), PnPError> {
    let cw = select_control_points(points_world);
    let alphas = compute_barycentric(points_world, &cw, tol.eps)?;

    // Null-space of M: eigenvectors of MᵀM for the 4 smallest eigenvalues,
    // column 0 being the smallest.
    let m = build_m(&alphas, points_norm);
    let mtm = m.transpose() * &m;
    let eig = SymmetricEigen::new(mtm);
    let mut order: Vec<usize> = (0..12).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));
    let null4 = DMatrix::<f64>::from_fn(12, 4, |r, c| eig.eigenvectors[(r, order[c])]);

    let l = build_l6x10(&null4);
    let rho = rho_ctrlpts(&cw);

    let candidates = [
        estimate_beta_approx1(&l, &rho, tol.svd),
        estimate_beta_approx2(&l, &rho, tol.svd),
        estimate_beta_approx3(&l, &rho, tol.svd),
    ];

    let mut best: Option<(f64, DMat3, DVec3)> = None;
    for beta in candidates.into_iter().flatten() {
        let beta = gauss_newton(beta, &l, &rho, tol.svd);
        let (r, t) = pose_from_betas(&beta, &null4, &alphas, points_world)?;
        let err = rmse_normalized(points_world, points_norm, &r, &t);
        if !err.is_finite() {
            continue;
        }
        if best.as_ref().map_or(true, |(best_err, _, _)| err < *best_err) {
            best = Some((err, r, t));
        }
    }

    match best {
        Some((err, r, t)) => {
            log::debug!("EPnP linear estimate, normalized RMSE {err:.3e}");
            Ok((r, t))
        }
        None => Err(PnPError::DegenerateConfiguration(
            "EPnP could not estimate the control point depths".to_string(),
        )),
    }
}

/// Centroid plus the principal axes scaled by their standard deviation.
fn select_control_points(points_world: &[[f64; 3]]) -> [DVec3; 4] {
    let axes = principal_axes(points_world);
    let mut cw = [axes.centroid; 4];
    for i in 0..3 {
        cw[i + 1] = axes.centroid + axes.axes[i] * axes.variances[i].sqrt();
    }
    cw
}

/// Barycentric coordinates of every world point w.r.t. the control points.
fn compute_barycentric(
    points_world: &[[f64; 3]],
    cw: &[DVec3; 4],
    eps: f64,
) -> Result<Vec<[f64; 4]>, PnPError> {
    let b = DMat3::from_cols(cw[1] - cw[0], cw[2] - cw[0], cw[3] - cw[0]);

    let b_inv = if b.determinant().abs() > eps {
        b.inverse()
    } else {
        // coplanar input: fall back to the pseudo-inverse
        let bn = nalgebra::Matrix3::from_fn(|r, c| b.col(c)[r]);
        let pinv = bn
            .pseudo_inverse(eps)
            .map_err(|e| PnPError::SvdFailed(e.to_string()))?;
        let col = |c: usize| DVec3::new(pinv[(0, c)], pinv[(1, c)], pinv[(2, c)]);
        DMat3::from_cols(col(0), col(1), col(2))
    };

    Ok(points_world
        .iter()
        .map(|p| {
            let a = b_inv * (DVec3::from(*p) - cw[0]);
            [1.0 - a.x - a.y - a.z, a.x, a.y, a.z]
        })
        .collect())
}

/// Construct the 2N×12 design matrix **M** used by EPnP (identity intrinsics).
fn build_m(alphas: &[[f64; 4]], points_norm: &[[f64; 2]]) -> DMatrix<f64> {
    let n = alphas.len();
    let mut m = DMatrix::<f64>::zeros(2 * n, 12);
    for (i, (a, xy)) in alphas.iter().zip(points_norm.iter()).enumerate() {
        for (j, &alpha) in a.iter().enumerate() {
            m[(2 * i, 3 * j)] = alpha;
            m[(2 * i, 3 * j + 2)] = -alpha * xy[0];
            m[(2 * i + 1, 3 * j + 1)] = alpha;
            m[(2 * i + 1, 3 * j + 2)] = -alpha * xy[1];
        }
    }
    m
}

const CONTROL_POINT_PAIRS: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// Quadratic constraints on the betas: row k relates the squared distance
/// of control point pair k to products of betas.
fn build_l6x10(null4: &DMatrix<f64>) -> SMatrix<f64, 6, 10> {
    let segment = |v: usize, pt: usize| {
        DVec3::new(
            null4[(3 * pt, v)],
            null4[(3 * pt + 1, v)],
            null4[(3 * pt + 2, v)],
        )
    };

    let mut l = SMatrix::<f64, 6, 10>::zeros();
    for (k, &(a, b)) in CONTROL_POINT_PAIRS.iter().enumerate() {
        let d: [DVec3; 4] = std::array::from_fn(|v| segment(v, a) - segment(v, b));
        let row = [
            d[0].dot(d[0]),
            2.0 * d[0].dot(d[1]),
            d[1].dot(d[1]),
            2.0 * d[0].dot(d[2]),
            2.0 * d[1].dot(d[2]),
            d[2].dot(d[2]),
            2.0 * d[0].dot(d[3]),
            2.0 * d[1].dot(d[3]),
            2.0 * d[2].dot(d[3]),
            d[3].dot(d[3]),
        ];
        for (c, val) in row.iter().enumerate() {
            l[(k, c)] = *val;
        }
    }
    l
}

/// Squared distances between control point pairs in the world frame.
fn rho_ctrlpts(cw: &[DVec3; 4]) -> SVector<f64, 6> {
    SVector::<f64, 6>::from_fn(|k, _| {
        let (a, b) = CONTROL_POINT_PAIRS[k];
        cw[a].distance_squared(cw[b])
    })
}

fn solve_l_subset(
    l: &SMatrix<f64, 6, 10>,
    rho: &SVector<f64, 6>,
    cols: &[usize],
    eps: f64,
) -> Option<DVector<f64>> {
    let sub = DMatrix::<f64>::from_fn(6, cols.len(), |r, c| l[(r, cols[c])]);
    let rhs = DVector::<f64>::from_column_slice(rho.as_slice());
    sub.svd(true, true).solve(&rhs, eps).ok()
}

// betas10 = [B11 B12 B22 B13 B23 B33 B14 B24 B34 B44]

/// Four betas from [B11 B12 B13 B14].
fn estimate_beta_approx1(
    l: &SMatrix<f64, 6, 10>,
    rho: &SVector<f64, 6>,
    eps: f64,
) -> Option<[f64; 4]> {
    let b4 = solve_l_subset(l, rho, &[0, 1, 3, 6], eps)?;
    let sign = if b4[0] < 0.0 { -1.0 } else { 1.0 };
    let b0 = (sign * b4[0]).sqrt();
    if b0 <= eps {
        return None;
    }
    Some([b0, sign * b4[1] / b0, sign * b4[2] / b0, sign * b4[3] / b0])
}

/// Two betas from [B11 B12 B22].
fn estimate_beta_approx2(
    l: &SMatrix<f64, 6, 10>,
    rho: &SVector<f64, 6>,
    eps: f64,
) -> Option<[f64; 4]> {
    let b3 = solve_l_subset(l, rho, &[0, 1, 2], eps)?;
    let (mut b0, b1) = first_two_betas(b3[0], b3[2]);
    if b3[1] < 0.0 {
        b0 = -b0;
    }
    (b0.abs() > eps).then_some([b0, b1, 0.0, 0.0])
}

/// Three betas from [B11 B12 B22 B13 B23].
fn estimate_beta_approx3(
    l: &SMatrix<f64, 6, 10>,
    rho: &SVector<f64, 6>,
    eps: f64,
) -> Option<[f64; 4]> {
    let b5 = solve_l_subset(l, rho, &[0, 1, 2, 3, 4], eps)?;
    let (mut b0, b1) = first_two_betas(b5[0], b5[2]);
    if b5[1] < 0.0 {
        b0 = -b0;
    }
    if b0.abs() <= eps {
        return None;
    }
    Some([b0, b1, b5[3] / b0, 0.0])
}

fn first_two_betas(b11: f64, b22: f64) -> (f64, f64) {
    if b11 < 0.0 {
        ((-b11).sqrt(), if b22 < 0.0 { (-b22).sqrt() } else { 0.0 })
    } else {
        (b11.sqrt(), if b22 > 0.0 { b22.sqrt() } else { 0.0 })
    }
}

/// Refine the betas by minimizing `‖L·β̂ − ρ‖²` with Gauss-Newton.
fn gauss_newton(
    mut beta: [f64; 4],
    l: &SMatrix<f64, 6, 10>,
    rho: &SVector<f64, 6>,
    eps: f64,
) -> [f64; 4] {
    for _ in 0..GAUSS_NEWTON_ITERATIONS {
        let [b0, b1, b2, b3] = beta;
        let products = SVector::<f64, 10>::from_column_slice(&[
            b0 * b0,
            b0 * b1,
            b1 * b1,
            b0 * b2,
            b1 * b2,
            b2 * b2,
            b0 * b3,
            b1 * b3,
            b2 * b3,
            b3 * b3,
        ]);

        let mut a = SMatrix::<f64, 6, 4>::zeros();
        for i in 0..6 {
            let r = |c: usize| l[(i, c)];
            a[(i, 0)] = 2.0 * r(0) * b0 + r(1) * b1 + r(3) * b2 + r(6) * b3;
            a[(i, 1)] = r(1) * b0 + 2.0 * r(2) * b1 + r(4) * b2 + r(7) * b3;
            a[(i, 2)] = r(3) * b0 + r(4) * b1 + 2.0 * r(5) * b2 + r(8) * b3;
            a[(i, 3)] = r(6) * b0 + r(7) * b1 + r(8) * b2 + 2.0 * r(9) * b3;
        }
        let residual = rho - l * products;

        let Ok(dx) = a.svd(true, true).solve(&residual, eps) else {
            break;
        };
        for (b, d) in beta.iter_mut().zip(dx.iter()) {
            *b += d;
        }
    }
    beta
}

/// Recover the camera-frame control points from the betas and align the
/// world points to their camera-frame reconstruction.
fn pose_from_betas(
    beta: &[f64; 4],
    null4: &DMatrix<f64>,
    alphas: &[[f64; 4]],
    points_world: &[[f64; 3]],
) -> Result<(DMat3, DVec3), PnPError> {
    let mut cc = [DVec3::ZERO; 4];
    for (j, c) in cc.iter_mut().enumerate() {
        for (i, b) in beta.iter().enumerate() {
            *c += DVec3::new(
                null4[(3 * j, i)],
                null4[(3 * j + 1, i)],
                null4[(3 * j + 2, i)],
            ) * *b;
        }
    }

    let mut pc: Vec<DVec3> = alphas
        .iter()
        .map(|a| cc[0] * a[0] + cc[1] * a[1] + cc[2] * a[2] + cc[3] * a[3])
        .collect();

    // the null space is only defined up to sign: put the points in front
    if pc.iter().map(|p| p.z).sum::<f64>() < 0.0 {
        pc.iter_mut().for_each(|p| *p = -*p);
    }

    let pw: Vec<DVec3> = points_world.iter().map(|p| DVec3::from(*p)).collect();
    fit_rigid(&pw, &pc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rgbd_geometry::distortion::project_point;
    use rgbd_geometry::linalg::array33_to_dmat3;
    use rgbd_geometry::rotation::rotation_vector_to_matrix;

    fn synthetic_scene() -> (Vec<[f64; 3]>, [[f64; 3]; 3], [f64; 3]) {
        let world = vec![
            [0.0, 0.0, 0.0],
            [0.3, 0.0, 0.1],
            [0.0, 0.25, -0.1],
            [0.1, 0.1, 0.3],
            [-0.2, 0.15, 0.05],
            [0.25, -0.2, 0.2],
            [-0.1, -0.3, -0.15],
        ];
        let r = rotation_vector_to_matrix(&[0.1, -0.25, 0.05]);
        let t = [0.05, -0.1, 1.5];
        (world, r, t)
    }

    fn project_all(
        world: &[[f64; 3]],
        r: &[[f64; 3]; 3],
        t: &[f64; 3],
        intr: &CameraIntrinsic,
        dist: &PolynomialDistortion,
    ) -> Vec<[f64; 2]> {
        let r = array33_to_dmat3(r);
        let t = DVec3::from(*t);
        world
            .iter()
            .map(|p| project_point(&(r * DVec3::from(*p) + t).to_array(), intr, dist))
            .collect()
    }

    #[test]
    fn test_epnp_linear_recovers_pose() -> Result<(), PnPError> {
        let (world, r_gt, t_gt) = synthetic_scene();
        let intr = CameraIntrinsic::new(800.0, 780.0, 320.0, 240.0);
        let image = project_all(&world, &r_gt, &t_gt, &intr, &PolynomialDistortion::none());

        let params = EPnPParams::default().with_refine(None);
        let res = EPnP::solve(&world, &image, &intr, None, &params)?;

        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(res.rotation[i][j], r_gt[i][j], epsilon = 1e-6);
            }
            assert_relative_eq!(res.translation[i], t_gt[i], epsilon = 1e-6);
        }
        assert!(res.reproj_rmse.is_some_and(|e| e < 1e-4));
        assert!(res.num_iterations.is_none());
        Ok(())
    }

    #[test]
    fn test_epnp_with_distortion_and_refinement() -> Result<(), PnPError> {
        let (world, r_gt, t_gt) = synthetic_scene();
        let intr = CameraIntrinsic::new(600.0, 600.0, 320.0, 240.0);
        let dist = PolynomialDistortion {
            k1: -0.12,
            k2: 0.03,
            p1: 0.001,
            p2: -0.0008,
            ..Default::default()
        };
        let image = project_all(&world, &r_gt, &t_gt, &intr, &dist);

        let res = solve_epnp(&world, &image, &intr, Some(&dist), &EPnPParams::default())?;

        for i in 0..3 {
            assert_relative_eq!(res.translation[i], t_gt[i], epsilon = 1e-6);
        }
        assert!(res.reproj_rmse.is_some_and(|e| e < 1e-3));
        Ok(())
    }

    #[test]
    fn test_epnp_insufficient_points() {
        let intr = CameraIntrinsic::new(800.0, 800.0, 320.0, 240.0);
        let res = solve_epnp(
            &[[0.0, 0.0, 1.0]; 3],
            &[[0.0, 0.0]; 3],
            &intr,
            None,
            &EPnPParams::default(),
        );
        assert!(matches!(
            res,
            Err(PnPError::InsufficientCorrespondences { required: 4, actual: 3 })
        ));
    }

    #[test]
    fn test_rho_matches_control_point_distances() {
        let cw = [
            DVec3::ZERO,
            DVec3::X,
            DVec3::Y * 2.0,
            DVec3::Z * 3.0,
        ];
        let rho = rho_ctrlpts(&cw);
        assert_relative_eq!(rho[0], 1.0);
        assert_relative_eq!(rho[1], 4.0);
        assert_relative_eq!(rho[2], 9.0);
        assert_relative_eq!(rho[3], 5.0);
        assert_relative_eq!(rho[5], 13.0);
    }
}
