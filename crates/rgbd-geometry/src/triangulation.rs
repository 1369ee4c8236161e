//! Linear (DLT) triangulation of 3D points from two views.
//!
//! The projection matrices are 3x4 and map homogeneous world points to
//! homogeneous image points in the same coordinates as the observations:
//! pixels when `P = K [R | t]`, normalized coordinates when `P = [R | t]`.

use nalgebra::{Matrix4, RowVector4};

use crate::GeometryError;

/// A row-major 3x4 projection matrix.
pub type ProjectionMatrix = [[f64; 4]; 3];

/// Triangulate a single correspondence, returning homogeneous coordinates.
///
/// Solves `A X = 0` in the least-squares sense, with the rows of `A` being
/// `x * P[2] - P[0]` and `y * P[2] - P[1]` for each view. The solution is the
/// right singular vector of the smallest singular value; its sign and scale
/// are arbitrary.
///
/// Non-finite observations are rejected up front since the SVD does not
/// converge on them.
pub fn triangulate_point_dlt(
    p1: &ProjectionMatrix,
    p2: &ProjectionMatrix,
    x1: &[f64; 2],
    x2: &[f64; 2],
) -> Result<[f64; 4], GeometryError> {
    triangulate_checked(p1, p2, x1, x2, 0)
}

fn triangulate_checked(
    p1: &ProjectionMatrix,
    p2: &ProjectionMatrix,
    x1: &[f64; 2],
    x2: &[f64; 2],
    index: usize,
) -> Result<[f64; 4], GeometryError> {
    let finite = x1
        .iter()
        .chain(x2.iter())
        .chain(p1.iter().flatten())
        .chain(p2.iter().flatten())
        .all(|v| v.is_finite());
    if !finite {
        return Err(GeometryError::NonFiniteInput { index });
    }

    let mut a = Matrix4::<f64>::zeros();
    write_dlt_rows(&mut a, 0, p1, x1);
    write_dlt_rows(&mut a, 2, p2, x2);

    let svd = a.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| GeometryError::SvdFailed("Failed to compute V^T".to_string()))?;
    let idx = svd.singular_values.imin();
    let xh = v_t.row(idx);

    Ok([xh[0], xh[1], xh[2], xh[3]])
}

/// Triangulate a batch of correspondences, returning homogeneous coordinates.
pub fn triangulate_points_dlt(
    p1: &ProjectionMatrix,
    p2: &ProjectionMatrix,
    x1: &[[f64; 2]],
    x2: &[[f64; 2]],
) -> Result<Vec<[f64; 4]>, GeometryError> {
    if x1.len() != x2.len() {
        return Err(GeometryError::MismatchedArrayLengths {
            left_name: "first view points",
            left_len: x1.len(),
            right_name: "second view points",
            right_len: x2.len(),
        });
    }

    x1.iter()
        .zip(x2.iter())
        .enumerate()
        .map(|(index, (a, b))| triangulate_checked(p1, p2, a, b, index))
        .collect()
}

/// Divide the first three homogeneous coordinates by the fourth.
///
/// Returns `None` when `|w| < eps` or the result is not finite, i.e. for
/// points at (or numerically near) infinity.
pub fn dehomogenize(xh: &[f64; 4], eps: f64) -> Option<[f64; 3]> {
    let w = xh[3];
    if w.is_nan() || w.abs() < eps {
        return None;
    }
    let p = [xh[0] / w, xh[1] / w, xh[2] / w];
    p.iter().all(|v| v.is_finite()).then_some(p)
}

fn write_dlt_rows(a: &mut Matrix4<f64>, row: usize, p: &ProjectionMatrix, x: &[f64; 2]) {
    let p0 = RowVector4::from_row_slice(&p[0]);
    let p1 = RowVector4::from_row_slice(&p[1]);
    let p2 = RowVector4::from_row_slice(&p[2]);
    a.set_row(row, &(p2 * x[0] - p0));
    a.set_row(row + 1, &(p2 * x[1] - p1));
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const IDENTITY: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    fn rt(rotation: &[[f64; 3]; 3], translation: &[f64; 3]) -> ProjectionMatrix {
        std::array::from_fn(|i| {
            let r = rotation[i];
            [r[0], r[1], r[2], translation[i]]
        })
    }

    fn project(p: &ProjectionMatrix, x: &[f64; 3]) -> [f64; 2] {
        let h: Vec<f64> = p
            .iter()
            .map(|row| row[0] * x[0] + row[1] * x[1] + row[2] * x[2] + row[3])
            .collect();
        [h[0] / h[2], h[1] / h[2]]
    }

    #[test]
    fn test_triangulation_two_views_recovers_point() -> Result<(), GeometryError> {
        let p1 = rt(&IDENTITY, &[0.0, 0.0, 0.0]);
        let p2 = rt(&IDENTITY, &[-0.2, 0.0, 0.0]);

        let pw = [0.1, -0.05, 2.0];
        let xh = triangulate_point_dlt(&p1, &p2, &project(&p1, &pw), &project(&p2, &pw))?;
        let x = dehomogenize(&xh, 1e-12).expect("finite point");

        for k in 0..3 {
            assert_relative_eq!(x[k], pw[k], epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_triangulate_points_mismatched() {
        let p = rt(&IDENTITY, &[0.0; 3]);
        let res = triangulate_points_dlt(&p, &p, &[[0.0, 0.0]; 2], &[[0.0, 0.0]; 1]);
        assert!(matches!(res, Err(GeometryError::MismatchedArrayLengths { .. })));
    }

    #[test]
    fn test_non_finite_observation_is_rejected() {
        let p1 = rt(&IDENTITY, &[0.0; 3]);
        let p2 = rt(&IDENTITY, &[-0.2, 0.0, 0.0]);
        let x1 = [[0.1, 0.0], [f64::NAN, 0.0], [0.1, 0.0]];
        let x2 = [[0.0, 0.0], [0.0, 0.0], [f64::INFINITY, 0.0]];
        let res = triangulate_points_dlt(&p1, &p2, &x1, &x2);
        assert!(matches!(res, Err(GeometryError::NonFiniteInput { index: 1 })));

        let res = triangulate_point_dlt(&p1, &p2, &x1[2], &x2[2]);
        assert!(matches!(res, Err(GeometryError::NonFiniteInput { index: 0 })));
    }

    #[test]
    fn test_dehomogenize() {
        assert_eq!(dehomogenize(&[2.0, 4.0, 6.0, 2.0], 1e-12), Some([1.0, 2.0, 3.0]));
        assert_eq!(dehomogenize(&[1.0, 1.0, 1.0, 0.0], 1e-12), None);
        assert_eq!(dehomogenize(&[1.0, 1.0, 1.0, f64::NAN], 1e-12), None);
        assert_eq!(dehomogenize(&[f64::INFINITY, 1.0, 1.0, 1.0], 1e-12), None);
    }

    #[test]
    fn test_parallel_rays_give_point_at_infinity() -> Result<(), GeometryError> {
        // identical cameras observing the same ray: no baseline, w -> 0
        let p1 = rt(&IDENTITY, &[0.0, 0.0, 0.0]);
        let p2 = rt(&IDENTITY, &[-0.5, 0.0, 0.0]);
        let xh = triangulate_point_dlt(&p1, &p2, &[0.1, 0.2], &[0.1, 0.2])?;
        assert!(xh[3].abs() < 1e-12);
        assert!(dehomogenize(&xh, 1e-12).is_none());
        Ok(())
    }
}
