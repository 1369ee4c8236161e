use rgbd_geometry::triangulation::{dehomogenize, triangulate_points_dlt};

use crate::{CameraError, CameraModel};

/// Homogeneous scale below which a triangulated point is treated as being at infinity.
pub const HOMOGENEOUS_EPSILON: f64 = 1e-12;

/// Triangulate corresponding observations of two calibrated cameras into
/// reference-frame points (meters).
///
/// The pixel observations are undistorted into normalized coordinates, so the
/// projection matrices are the extrinsic matrices `[R | t]` alone.
///
/// # Errors
///
/// * [`CameraError::NotCalibrated`] if either camera has no calibration.
/// * [`CameraError::MismatchedPointCounts`] if the observation lists differ in length.
/// * [`CameraError::DegenerateTriangulation`] for a point at (or near) infinity,
///   e.g. rays that are parallel or cameras without a baseline.
/// * [`CameraError::Geometry`] with [`GeometryError::NonFiniteInput`] when an
///   observation does not undistort to a finite ray (NaN pixels, or pixels far
///   outside the image).
///
/// [`GeometryError::NonFiniteInput`]: rgbd_geometry::GeometryError::NonFiniteInput
pub fn triangulate(
    camera1: &CameraModel,
    camera2: &CameraModel,
    points1: &[[f64; 2]],
    points2: &[[f64; 2]],
) -> Result<Vec<[f64; 3]>, CameraError> {
    triangulate_homogeneous(camera1, camera2, points1, points2)?
        .iter()
        .enumerate()
        .map(|(index, xh)| {
            dehomogenize(xh, HOMOGENEOUS_EPSILON)
                .ok_or(CameraError::DegenerateTriangulation { index, w: xh[3] })
        })
        .collect()
}

/// Like [`triangulate`], but returns the raw homogeneous 4-vectors (unit norm,
/// arbitrary sign) so that callers can handle points at infinity themselves.
pub fn triangulate_homogeneous(
    camera1: &CameraModel,
    camera2: &CameraModel,
    points1: &[[f64; 2]],
    points2: &[[f64; 2]],
) -> Result<Vec<[f64; 4]>, CameraError> {
    let calibration1 = camera1
        .calibration()
        .ok_or_else(|| CameraError::NotCalibrated(format!("camera 1 `{}`", camera1.name())))?;
    let calibration2 = camera2
        .calibration()
        .ok_or_else(|| CameraError::NotCalibrated(format!("camera 2 `{}`", camera2.name())))?;

    if points1.len() != points2.len() {
        return Err(CameraError::MismatchedPointCounts {
            left: points1.len(),
            right: points2.len(),
        });
    }

    let p1 = calibration1.extrinsic_matrix();
    let p2 = calibration2.extrinsic_matrix();

    let x1 = camera1.undistort(points1);
    let x2 = camera2.undistort(points2);

    log::debug!(
        "Triangulating {} points from `{}` and `{}`",
        points1.len(),
        camera1.name(),
        camera2.name()
    );
    Ok(triangulate_points_dlt(&p1, &p2, &x1, &x2)?)
}
