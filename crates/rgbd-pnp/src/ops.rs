use glam::{DMat3, DVec3};
use nalgebra::{Matrix3, SymmetricEigen};
use rgbd_geometry::distortion::{
    project_point, undistort_point_normalized, CameraIntrinsic, PolynomialDistortion,
    UndistortParams,
};
use rgbd_geometry::linalg::{array33_to_dmat3, dmat3_to_array33};
use rgbd_geometry::rotation::{rotation_matrix_to_vector, rotation_vector_to_matrix};

use crate::pnp::{NumericTol, PnPError, PnPResult};
use crate::refine::{refine_pose_lm, LMParams};

/// Validate the correspondence arrays shared by every solver.
pub(crate) fn check_correspondences(
    points_world: &[[f64; 3]],
    points_image: &[[f64; 2]],
    required: usize,
) -> Result<(), PnPError> {
    if points_world.len() != points_image.len() {
        return Err(PnPError::MismatchedArrayLengths {
            left_name: "world points",
            left_len: points_world.len(),
            right_name: "image points",
            right_len: points_image.len(),
        });
    }

    let n = points_world.len();
    if n < required {
        return Err(PnPError::InsufficientCorrespondences {
            required,
            actual: n,
        });
    }

    if !points_world.iter().flatten().all(|v| v.is_finite()) {
        return Err(PnPError::NonFiniteInput("world points"));
    }
    if !points_image.iter().flatten().all(|v| v.is_finite()) {
        return Err(PnPError::NonFiniteInput("image points"));
    }

    Ok(())
}

/// Compute the centroid of a set of points.
pub(crate) fn compute_centroid(pts: &[[f64; 3]]) -> DVec3 {
    let n = pts.len() as f64;
    let sum = pts.iter().fold(DVec3::ZERO, |acc, &p| acc + DVec3::from(p));
    sum / n
}

/// Principal axes of a point cloud, ordered by decreasing spread.
pub(crate) struct PrincipalAxes {
    /// Centroid of the points.
    pub centroid: DVec3,
    /// Eigenvalues of the (1/N-normalized) covariance, descending.
    pub variances: [f64; 3],
    /// Unit axes matching `variances`. The third axis completes a right-handed frame.
    pub axes: [DVec3; 3],
}

impl PrincipalAxes {
    /// Rotation whose columns are the principal axes.
    pub(crate) fn basis(&self) -> DMat3 {
        DMat3::from_cols(self.axes[0], self.axes[1], self.axes[2])
    }
}

pub(crate) fn principal_axes(pts: &[[f64; 3]]) -> PrincipalAxes {
    let centroid = compute_centroid(pts);
    let mut cov = Matrix3::<f64>::zeros();
    for p in pts {
        let d = DVec3::from(*p) - centroid;
        let d = nalgebra::Vector3::new(d.x, d.y, d.z);
        cov += d * d.transpose();
    }
    cov /= pts.len() as f64;

    let eig = SymmetricEigen::new(cov);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));

    let axis = |i: usize| {
        let c = eig.eigenvectors.column(order[i]);
        DVec3::new(c[0], c[1], c[2])
    };
    let e1 = axis(0);
    let e2 = axis(1);

    PrincipalAxes {
        centroid,
        variances: [
            eig.eigenvalues[order[0]].max(0.0),
            eig.eigenvalues[order[1]].max(0.0),
            eig.eigenvalues[order[2]].max(0.0),
        ],
        axes: [e1, e2, e1.cross(e2)],
    }
}

/// Layout of the world points as seen by the solvers.
pub(crate) enum PointLayout {
    /// The points span all three dimensions.
    General,
    /// The points lie (numerically) on a plane, e.g. the corners of a marker.
    Planar(PrincipalAxes),
}

/// Classify the world points and reject configurations that do not determine a pose.
pub(crate) fn classify_points(
    points_world: &[[f64; 3]],
    tol: &NumericTol,
) -> Result<PointLayout, PnPError> {
    let axes = principal_axes(points_world);
    let [s1, s2, s3] = axes.variances.map(f64::sqrt);

    if s1 <= tol.eps {
        return Err(PnPError::DegenerateConfiguration(
            "all world points coincide".to_string(),
        ));
    }

    let distinct = count_distinct(points_world, s1 * 1e-9);
    if distinct < 4 {
        return Err(PnPError::DegenerateConfiguration(format!(
            "only {distinct} distinct world points"
        )));
    }

    if s2 / s1 < tol.collinearity {
        return Err(PnPError::DegenerateConfiguration(
            "world points are collinear".to_string(),
        ));
    }

    if s3 / s1 < tol.planarity {
        Ok(PointLayout::Planar(axes))
    } else {
        Ok(PointLayout::General)
    }
}

fn count_distinct(pts: &[[f64; 3]], min_sep: f64) -> usize {
    let min_sep_sq = min_sep * min_sep;
    let mut distinct: Vec<DVec3> = Vec::with_capacity(pts.len());
    for p in pts {
        let p = DVec3::from(*p);
        if distinct.iter().all(|q| q.distance_squared(p) > min_sep_sq) {
            distinct.push(p);
        }
    }
    distinct.len()
}

/// Remove intrinsics and lens distortion from pixel observations.
pub(crate) fn normalize_image_points(
    points_image: &[[f64; 2]],
    intrinsic: &CameraIntrinsic,
    distortion: Option<&PolynomialDistortion>,
) -> Vec<[f64; 2]> {
    let none = PolynomialDistortion::none();
    let distortion = distortion.unwrap_or(&none);
    let params = UndistortParams::default();
    points_image
        .iter()
        .map(|uv| undistort_point_normalized(uv[0], uv[1], intrinsic, distortion, &params))
        .collect()
}

/// Least-squares rigid alignment `dst ≈ R * src + t` (Kabsch / Umeyama without scale).
pub(crate) fn fit_rigid(src: &[DVec3], dst: &[DVec3]) -> Result<(DMat3, DVec3), PnPError> {
    let n = src.len() as f64;
    let c_src = src.iter().fold(DVec3::ZERO, |acc, &p| acc + p) / n;
    let c_dst = dst.iter().fold(DVec3::ZERO, |acc, &p| acc + p) / n;

    let mut h = Matrix3::<f64>::zeros();
    for (s, d) in src.iter().zip(dst.iter()) {
        let s = *s - c_src;
        let d = *d - c_dst;
        h += nalgebra::Vector3::new(d.x, d.y, d.z) * nalgebra::RowVector3::new(s.x, s.y, s.z);
    }

    let svd = h.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(PnPError::SvdFailed("Failed to compute U or V^T".to_string())),
    };

    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let s = Matrix3::from_diagonal(&nalgebra::Vector3::new(1.0, 1.0, -1.0));
        r = u * s * v_t;
    }

    let r = DMat3::from_cols_array(&[
        r[(0, 0)],
        r[(1, 0)],
        r[(2, 0)],
        r[(0, 1)],
        r[(1, 1)],
        r[(2, 1)],
        r[(0, 2)],
        r[(1, 2)],
        r[(2, 2)],
    ]);
    let t = c_dst - r * c_src;
    Ok((r, t))
}

/// Root-mean-square reprojection error in pixels, including lens distortion.
pub(crate) fn rmse_px(
    points_world: &[[f64; 3]],
    points_image: &[[f64; 2]],
    r: &[[f64; 3]; 3],
    t: &[f64; 3],
    intrinsic: &CameraIntrinsic,
    distortion: Option<&PolynomialDistortion>,
) -> f64 {
    let none = PolynomialDistortion::none();
    let distortion = distortion.unwrap_or(&none);
    let r = array33_to_dmat3(r);
    let t = DVec3::from(*t);

    let sum_sq: f64 = points_world
        .iter()
        .zip(points_image.iter())
        .map(|(pw, uv)| {
            let pc = r * DVec3::from(*pw) + t;
            let [u, v] = project_point(&pc.to_array(), intrinsic, distortion);
            let (du, dv) = (u - uv[0], v - uv[1]);
            du * du + dv * dv
        })
        .sum();

    (sum_sq / points_world.len() as f64).sqrt()
}

/// Root-mean-square error in normalized image coordinates (no distortion).
pub(crate) fn rmse_normalized(
    points_world: &[[f64; 3]],
    points_norm: &[[f64; 2]],
    r: &DMat3,
    t: &DVec3,
) -> f64 {
    let sum_sq: f64 = points_world
        .iter()
        .zip(points_norm.iter())
        .map(|(pw, xy)| {
            let pc = *r * DVec3::from(*pw) + *t;
            let du = pc.x / pc.z - xy[0];
            let dv = pc.y / pc.z - xy[1];
            du * du + dv * dv
        })
        .sum();
    (sum_sq / points_world.len() as f64).sqrt()
}

/// Check that a pose is finite, proper and places every world point in front of the camera.
pub(crate) fn validate_pose(
    points_world: &[[f64; 3]],
    r: &[[f64; 3]; 3],
    t: &[f64; 3],
) -> Result<(), PnPError> {
    if !r.iter().flatten().chain(t.iter()).all(|v| v.is_finite()) {
        return Err(PnPError::InvalidPose("non-finite rotation or translation"));
    }
    let r = array33_to_dmat3(r);
    if (r.determinant() - 1.0).abs() > 1e-6 {
        return Err(PnPError::InvalidPose("rotation is not orthonormal"));
    }
    let t = DVec3::from(*t);
    if points_world
        .iter()
        .any(|pw| (r * DVec3::from(*pw) + t).z <= 0.0)
    {
        return Err(PnPError::InvalidPose("world points behind the camera"));
    }
    Ok(())
}

/// Optionally refine a linear estimate, then validate it and package the result.
pub(crate) fn finish_pose(
    points_world: &[[f64; 3]],
    points_image: &[[f64; 2]],
    intrinsic: &CameraIntrinsic,
    distortion: Option<&PolynomialDistortion>,
    r: &DMat3,
    t: &DVec3,
    refine: Option<&LMParams>,
) -> Result<PnPResult, PnPError> {
    let mut rvec = rotation_matrix_to_vector(&dmat3_to_array33(r));
    let mut translation = t.to_array();

    let (rmse, num_iterations, converged) = match refine {
        Some(params) => {
            let (rmse, iters, converged) = refine_pose_lm(
                points_world,
                points_image,
                intrinsic,
                distortion,
                &mut rvec,
                &mut translation,
                params,
            )?;
            (rmse, Some(iters), Some(converged))
        }
        None => {
            let rotation = rotation_vector_to_matrix(&rvec);
            let rmse = rmse_px(
                points_world,
                points_image,
                &rotation,
                &translation,
                intrinsic,
                distortion,
            );
            (rmse, None, None)
        }
    };

    let rotation = rotation_vector_to_matrix(&rvec);
    validate_pose(points_world, &rotation, &translation)?;

    Ok(PnPResult {
        rotation,
        translation,
        rvec,
        reproj_rmse: Some(rmse),
        num_iterations,
        converged,
    })
}
