use glam::{DMat3, DVec3};

use crate::linalg::{array33_to_dmat3, dmat3_to_array33};
use crate::GeometryError;

/// Compute the rotation matrix from an axis and angle.
///
/// # Arguments
///
/// * `axis` - The axis of rotation. It does not need to be normalized.
/// * `angle` - The angle of rotation in radians.
///
/// # Returns
///
/// The row-major rotation matrix.
///
/// Example:
///
/// ```
/// use rgbd_geometry::rotation::axis_angle_to_rotation_matrix;
///
/// let axis = [1.0, 0.0, 0.0];
/// let angle = std::f64::consts::PI / 2.0;
/// let rotation = axis_angle_to_rotation_matrix(&axis, angle).unwrap();
/// assert!((rotation[1][2] + 1.0).abs() < 1e-12);
/// ```
pub fn axis_angle_to_rotation_matrix(
    axis: &[f64; 3],
    angle: f64,
) -> Result<[[f64; 3]; 3], GeometryError> {
    let axis = DVec3::from_array(*axis);
    let magnitude = axis.length();
    if magnitude < 1e-10 {
        return Err(GeometryError::ZeroRotationAxis);
    }
    Ok(rotation_vector_to_matrix(&(axis * (angle / magnitude)).to_array()))
}

/// Convert a Rodrigues rotation vector into a rotation matrix (exponential map).
///
/// The direction of `rvec` is the rotation axis and its norm the angle in
/// radians. The zero vector maps to the identity.
pub fn rotation_vector_to_matrix(rvec: &[f64; 3]) -> [[f64; 3]; 3] {
    dmat3_to_array33(&rotation_vector_to_dmat3(DVec3::from_array(*rvec)))
}

pub(crate) fn rotation_vector_to_dmat3(rvec: DVec3) -> DMat3 {
    let theta = rvec.length();
    if theta < f64::EPSILON {
        return DMat3::IDENTITY;
    }

    let c = theta.cos();
    let s = theta.sin();
    let c1 = 1.0 - c;
    let r = rvec / theta;

    // R = cos(θ) I + (1 - cos(θ)) r rᵀ + sin(θ) [r]ₓ
    let rrt = DMat3::from_cols(r * r.x, r * r.y, r * r.z);
    DMat3::IDENTITY * c + rrt * c1 + hat(r) * s
}

/// Convert a rotation matrix into a Rodrigues rotation vector (logarithm map).
///
/// Handles the small-angle and the near-π cases explicitly; the returned
/// angle lies in `[0, π]`.
pub fn rotation_matrix_to_vector(rotation: &[[f64; 3]; 3]) -> [f64; 3] {
    rotation_dmat3_to_vector(&array33_to_dmat3(rotation)).to_array()
}

pub(crate) fn rotation_dmat3_to_vector(r: &DMat3) -> DVec3 {
    let m = dmat3_to_array33(r);

    // axis scaled by 2 sin(θ)
    let v = DVec3::new(
        m[2][1] - m[1][2],
        m[0][2] - m[2][0],
        m[1][0] - m[0][1],
    );
    let s = v.length() * 0.5;
    let c = ((m[0][0] + m[1][1] + m[2][2] - 1.0) * 0.5).clamp(-1.0, 1.0);

    if s >= 1e-5 {
        let theta = s.atan2(c);
        return v * (theta / (2.0 * s));
    }

    if c > 0.0 {
        // first order: sin(θ) ≈ θ
        return v * 0.5;
    }

    // θ ≈ π: (R + Rᵀ)/2 - cos(θ) I = (1 - cos(θ)) r rᵀ, read r from its largest column
    let b = [
        [m[0][0] - c, 0.5 * (m[0][1] + m[1][0]), 0.5 * (m[0][2] + m[2][0])],
        [0.5 * (m[1][0] + m[0][1]), m[1][1] - c, 0.5 * (m[1][2] + m[2][1])],
        [0.5 * (m[2][0] + m[0][2]), 0.5 * (m[2][1] + m[1][2]), m[2][2] - c],
    ];
    let j = (0..3).fold(0, |best, k| if b[k][k] > b[best][best] { k } else { best });
    let mut axis = DVec3::new(b[0][j], b[1][j], b[2][j]).normalize_or_zero();
    if axis == DVec3::ZERO {
        axis = DVec3::X;
    }
    // the antisymmetric part still carries the sign of the axis short of π
    if axis.dot(v) < 0.0 {
        axis = -axis;
    }
    axis * s.atan2(c)
}

/// Project an arbitrary 3x3 matrix onto the closest rotation (Frobenius norm).
pub fn orthonormalize(m: &[[f64; 3]; 3]) -> Result<[[f64; 3]; 3], GeometryError> {
    let a = nalgebra::Matrix3::from_fn(|i, j| m[i][j]);
    let svd = a.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(GeometryError::SvdFailed("Failed to compute U or V^T".to_string())),
    };

    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let correction = nalgebra::Matrix3::from_diagonal(&nalgebra::Vector3::new(1.0, 1.0, -1.0));
        r = u * correction * v_t;
    }

    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = r[(i, j)];
        }
    }
    Ok(out)
}

/// Vector space -> Lie algebra (skew-symmetric matrix).
pub(crate) fn hat(v: DVec3) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(0.0, v.z, -v.y),
        DVec3::new(-v.z, 0.0, v.x),
        DVec3::new(v.y, -v.x, 0.0),
    )
}
