use glam::{DMat3, DVec3};

use crate::GeometryError;

/// Convert a row-major 3x3 array into a glam matrix.
pub fn array33_to_dmat3(m: &[[f64; 3]; 3]) -> DMat3 {
    DMat3::from_cols_array_2d(m).transpose()
}

/// Convert a glam matrix into a row-major 3x3 array.
pub fn dmat3_to_array33(m: &DMat3) -> [[f64; 3]; 3] {
    m.transpose().to_cols_array_2d()
}

/// Invert a rigid transform.
///
/// Given `dst_r_src` and `dst_t_src`, returns `(src_r_dst, src_t_dst)` with
/// `src_r_dst = R^T` and `src_t_dst = -R^T * t`.
pub fn invert_rigid(dst_r_src: &[[f64; 3]; 3], dst_t_src: &[f64; 3]) -> ([[f64; 3]; 3], [f64; 3]) {
    let r_inv = array33_to_dmat3(dst_r_src).transpose();
    let t_inv = -(r_inv * DVec3::from_array(*dst_t_src));
    (dmat3_to_array33(&r_inv), t_inv.to_array())
}

/// Transform a set of points using a rotation and translation.
///
/// # Arguments
///
/// * `src_points` - A set of points to be transformed.
/// * `dst_r_src` - A rotation matrix.
/// * `dst_t_src` - A translation vector.
/// * `dst_points` - A pre-allocated vector to store the transformed points.
///
/// Example:
///
/// ```
/// use rgbd_geometry::linalg::transform_points3d;
///
/// let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
/// let rotation = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
/// let translation = [0.0, 0.0, 0.0];
/// let mut dst_points = vec![[0.0; 3]; src_points.len()];
/// transform_points3d(&src_points, &rotation, &translation, &mut dst_points).unwrap();
/// assert_eq!(dst_points, src_points);
/// ```
pub fn transform_points3d(
    src_points: &[[f64; 3]],
    dst_r_src: &[[f64; 3]; 3],
    dst_t_src: &[f64; 3],
    dst_points: &mut [[f64; 3]],
) -> Result<(), GeometryError> {
    if src_points.len() != dst_points.len() {
        return Err(GeometryError::MismatchedArrayLengths {
            left_name: "source points",
            left_len: src_points.len(),
            right_name: "destination points",
            right_len: dst_points.len(),
        });
    }

    let r = array33_to_dmat3(dst_r_src);
    let t = DVec3::from_array(*dst_t_src);

    for (dst, src) in dst_points.iter_mut().zip(src_points.iter()) {
        *dst = (r * DVec3::from_array(*src) + t).to_array();
    }

    Ok(())
}

/// Apply the inverse of a rigid transform, `R^T * (p - t)`, to a set of points.
///
/// This is the exact algebraic inverse of [`transform_points3d`] with the same
/// `dst_r_src` / `dst_t_src`, without forming the inverted translation.
pub fn inverse_transform_points3d(
    src_points: &[[f64; 3]],
    dst_r_src: &[[f64; 3]; 3],
    dst_t_src: &[f64; 3],
    dst_points: &mut [[f64; 3]],
) -> Result<(), GeometryError> {
    if src_points.len() != dst_points.len() {
        return Err(GeometryError::MismatchedArrayLengths {
            left_name: "source points",
            left_len: src_points.len(),
            right_name: "destination points",
            right_len: dst_points.len(),
        });
    }

    let r_t = array33_to_dmat3(dst_r_src).transpose();
    let t = DVec3::from_array(*dst_t_src);

    for (dst, src) in dst_points.iter_mut().zip(src_points.iter()) {
        *dst = (r_t * (DVec3::from_array(*src) - t)).to_array();
    }

    Ok(())
}
