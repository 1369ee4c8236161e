//! Pose from coplanar points, e.g. the corners of a fiducial marker.
//!
//! The world points are expressed in a 2D frame on their plane, a homography
//! from that plane to normalized image coordinates is estimated with the
//! normalized DLT, and the homography is decomposed into `[r1 r2 t]`.

use glam::{DMat3, DVec3};
use nalgebra::{Matrix3, SMatrix, SymmetricEigen};
use rgbd_geometry::distortion::{CameraIntrinsic, PolynomialDistortion};
use rgbd_geometry::linalg::{array33_to_dmat3, dmat3_to_array33};
use rgbd_geometry::rotation::orthonormalize;

use crate::ops::{
    check_correspondences, classify_points, finish_pose, normalize_image_points, PointLayout,
    PrincipalAxes,
};
use crate::pnp::{NumericTol, PnPError, PnPResult, PnPSolver};
use crate::refine::LMParams;

/// Marker type representing the planar homography solver.
pub struct PlanarHomography;

impl PnPSolver for PlanarHomography {
    type Param = PlanarParams;

    fn solve(
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        intrinsic: &CameraIntrinsic,
        distortion: Option<&PolynomialDistortion>,
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError> {
        solve_planar(world, image, intrinsic, distortion, params)
    }
}

/// Parameters controlling the planar solver.
#[derive(Debug, Clone)]
pub struct PlanarParams {
    /// Shared numeric tolerances.
    pub tol: NumericTol,
    /// Levenberg-Marquardt refinement of the homography estimate, `None` to skip it.
    pub refine: Option<LMParams>,
}

impl Default for PlanarParams {
    fn default() -> Self {
        Self {
            tol: NumericTol::default(),
            refine: Some(LMParams::default()),
        }
    }
}

impl PlanarParams {
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

/// Solve PnP for coplanar world points.
///
/// Fails with [`PnPError::DegenerateConfiguration`] if the points are not
/// coplanar within `params.tol.planarity`.
pub fn solve_planar(
    points_world: &[[f64; 3]],
    points_image: &[[f64; 2]],
    intrinsic: &CameraIntrinsic,
    distortion: Option<&PolynomialDistortion>,
    params: &PlanarParams,
) -> Result<PnPResult, PnPError> {
    check_correspondences(points_world, points_image, 4)?;

    let PointLayout::Planar(plane) = classify_points(points_world, &params.tol)? else {
        return Err(PnPError::DegenerateConfiguration(
            "world points are not coplanar".to_string(),
        ));
    };

    let points_norm = normalize_image_points(points_image, intrinsic, distortion);
    let (r, t) = planar_normalized(points_world, &points_norm, &plane, &params.tol)?;

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

/// Homography pose on normalized image coordinates.
pub(crate) fn planar_normalized(
    points_world: &[[f64; 3]],
    points_norm: &[[f64; 2]],
    plane: &PrincipalAxes,
    tol: &NumericTol,
) -> Result<(DMat3, DVec3), PnPError> {
    let basis = plane.basis();
    let basis_t = basis.transpose();

    let points_plane: Vec<[f64; 2]> = points_world
        .iter()
        .map(|p| {
            let q = basis_t * (DVec3::from(*p) - plane.centroid);
            [q.x, q.y]
        })
        .collect();

    let h = homography_dlt(&points_plane, points_norm, tol.eps)?;
    let (r_plane, t_plane) = decompose_homography(&h, tol.eps)?;

    // plane frame -> world frame: X = E q + c
    let r = r_plane * basis_t;
    let t = t_plane - r * plane.centroid;
    Ok((r, t))
}

/// Similarity that moves the centroid to the origin and scales the mean
/// distance to √2.
fn hartley_normalization(pts: &[[f64; 2]], eps: f64) -> Result<Matrix3<f64>, PnPError> {
    let n = pts.len() as f64;
    let (sx, sy) = pts.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
    let (cx, cy) = (sx / n, sy / n);
    let mean_dist = pts
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist <= eps {
        return Err(PnPError::DegenerateConfiguration(
            "points collapse to a single location".to_string(),
        ));
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Ok(Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0))
}

/// Estimate the homography `dst ~ H src` with the normalized DLT.
fn homography_dlt(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    eps: f64,
) -> Result<Matrix3<f64>, PnPError> {
    let t_src = hartley_normalization(src, eps)?;
    let t_dst = hartley_normalization(dst, eps)?;
    let apply = |t: &Matrix3<f64>, p: &[f64; 2]| {
        (
            t[(0, 0)] * p[0] + t[(0, 2)],
            t[(1, 1)] * p[1] + t[(1, 2)],
        )
    };

    // accumulate AᵀA directly: with 4 points A is 8x9 and a thin SVD would
    // drop the null vector
    let mut ata = SMatrix::<f64, 9, 9>::zeros();
    for (s, d) in src.iter().zip(dst.iter()) {
        let (u, v) = apply(&t_src, s);
        let (x, y) = apply(&t_dst, d);
        let rows = [
            [-u, -v, -1.0, 0.0, 0.0, 0.0, x * u, x * v, x],
            [0.0, 0.0, 0.0, -u, -v, -1.0, y * u, y * v, y],
        ];
        for row in rows {
            let r = SMatrix::<f64, 9, 1>::from_column_slice(&row);
            ata += r * r.transpose();
        }
    }

    let eig = SymmetricEigen::new(ata);
    let idx = eig.eigenvalues.imin();
    let h = eig.eigenvectors.column(idx);
    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| PnPError::DegenerateConfiguration("singular normalization".to_string()))?;
    Ok(t_dst_inv * h_norm * t_src)
}

/// Decompose a plane-to-normalized-image homography into a pose, assuming
/// the plane is `z = 0` in its own frame.
fn decompose_homography(h: &Matrix3<f64>, eps: f64) -> Result<(DMat3, DVec3), PnPError> {
    let h1 = DVec3::new(h[(0, 0)], h[(1, 0)], h[(2, 0)]);
    let h2 = DVec3::new(h[(0, 1)], h[(1, 1)], h[(2, 1)]);
    let h3 = DVec3::new(h[(0, 2)], h[(1, 2)], h[(2, 2)]);

    let n1 = h1.length();
    let n2 = h2.length();
    if n1 * n2 <= eps {
        return Err(PnPError::DegenerateConfiguration(
            "homography has rank below 2".to_string(),
        ));
    }

    // scale so that ||r1|| ≈ ||r2|| ≈ 1, sign so that the plane is in front
    let mut s = 1.0 / (n1 * n2).sqrt();
    if h3.z * s < 0.0 {
        s = -s;
    }

    let r1 = h1 * s;
    let r2 = h2 * s;
    let r3 = r1.cross(r2);
    let r_approx = dmat3_to_array33(&DMat3::from_cols(r1, r2, r3));
    let r = orthonormalize(&r_approx).map_err(|e| PnPError::SvdFailed(e.to_string()))?;

    Ok((array33_to_dmat3(&r), h3 * s))
}
