use ndarray::{Array, ArrayView, Axis, Dimension};
use rgbd_geometry::distortion::{
    project_point, undistort_point_normalized, CameraIntrinsic, PolynomialDistortion,
    UndistortParams,
};
use rgbd_pnp::{solve_pnp, PnPMethod, PnPResult};

use crate::calibration::{Calibration, CalibrationRecord};
use crate::{CalibrationError, CameraError};

/// Camera-frame points are reported in millimeters, the reference frame is in meters.
const MILLIMETERS_PER_METER: f64 = 1000.0;

/// Parameters for extrinsic calibration.
#[derive(Debug, Clone)]
pub struct CalibrationParams {
    /// Pose solver used on the correspondences.
    pub method: PnPMethod,
    /// Largest accepted reprojection RMSE of the final pose, in pixels.
    pub max_reprojection_error: f64,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            method: PnPMethod::default(),
            max_reprojection_error: 5.0,
        }
    }
}

impl CalibrationParams {
    /// Set the pose solver.
    pub fn with_method(mut self, method: PnPMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the reprojection RMSE threshold in pixels.
    pub fn with_max_reprojection_error(mut self, max_reprojection_error: f64) -> Self {
        self.max_reprojection_error = max_reprojection_error;
        self
    }
}

/// A pinhole camera with lens distortion and an optional extrinsic calibration
/// relative to the shared reference frame.
#[derive(Debug, Clone)]
pub struct CameraModel {
    name: String,
    intrinsic: CameraIntrinsic,
    distortion: PolynomialDistortion,
    distortion_coefficients: Vec<f64>,
    calibration: Option<Calibration>,
    is_original_calibration: bool,
    undistort_params: UndistortParams,
}

impl CameraModel {
    /// Create an uncalibrated camera from its intrinsics.
    ///
    /// # Arguments
    ///
    /// * `camera_matrix` - Row-major `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`.
    /// * `distortion_coefficients` - OpenCV order `(k1, k2, p1, p2[, k3[, k4, k5, k6]])`.
    ///   The slice is kept as given for export.
    pub fn new(
        camera_matrix: &[[f64; 3]; 3],
        distortion_coefficients: &[f64],
    ) -> Result<Self, CalibrationError> {
        Ok(Self {
            name: "camera".to_string(),
            intrinsic: CameraIntrinsic::from_matrix(camera_matrix)?,
            distortion: PolynomialDistortion::from_coefficients(distortion_coefficients)?,
            distortion_coefficients: distortion_coefficients.to_vec(),
            calibration: None,
            is_original_calibration: true,
            undistort_params: UndistortParams::default(),
        })
    }

    /// Set the name used in log and error messages.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Rename the camera in place.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Set the parameters of the iterative undistortion.
    pub fn with_undistort_params(mut self, params: UndistortParams) -> Self {
        self.undistort_params = params;
        self
    }

    /// The camera name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pinhole intrinsics.
    pub fn intrinsic(&self) -> &CameraIntrinsic {
        &self.intrinsic
    }

    /// The row-major 3x3 camera matrix.
    pub fn camera_matrix(&self) -> [[f64; 3]; 3] {
        self.intrinsic.to_matrix()
    }

    /// The lens distortion model.
    pub fn distortion(&self) -> &PolynomialDistortion {
        &self.distortion
    }

    /// The distortion coefficients exactly as supplied.
    pub fn distortion_coefficients(&self) -> &[f64] {
        &self.distortion_coefficients
    }

    /// The extrinsic calibration, if set.
    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Whether an extrinsic calibration is set.
    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    /// `false` once a calibration has been imported instead of estimated.
    pub fn is_original_calibration(&self) -> bool {
        self.is_original_calibration
    }

    fn distortion_opt(&self) -> Option<&PolynomialDistortion> {
        self.distortion
            .has_distortion()
            .then_some(&self.distortion)
    }

    fn require_calibration(&self) -> Result<&Calibration, CameraError> {
        self.calibration
            .as_ref()
            .ok_or_else(|| CameraError::NotCalibrated(format!("camera `{}`", self.name)))
    }

    /// Estimate the extrinsic calibration from marker correspondences.
    ///
    /// See [`CameraModel::infer_extrinsics_with`]; uses the default parameters.
    pub fn infer_extrinsics(
        &mut self,
        image_points: &[[f64; 2]],
        object_points: &[[f64; 3]],
    ) -> Result<PnPResult, CalibrationError> {
        self.infer_extrinsics_with(image_points, object_points, &CalibrationParams::default())
    }

    /// Estimate the extrinsic calibration from marker correspondences.
    ///
    /// # Arguments
    ///
    /// * `image_points` - Detected (distorted) pixel coordinates, at least 4.
    /// * `object_points` - The matching points in the reference frame, in meters.
    /// * `params` - Solver choice and acceptance threshold.
    ///
    /// On success the calibration is replaced and the solver summary is
    /// returned. On failure the previous calibration is kept.
    pub fn infer_extrinsics_with(
        &mut self,
        image_points: &[[f64; 2]],
        object_points: &[[f64; 3]],
        params: &CalibrationParams,
    ) -> Result<PnPResult, CalibrationError> {
        let result = solve_pnp(
            object_points,
            image_points,
            &self.intrinsic,
            self.distortion_opt(),
            params.method.clone(),
        )?;

        let rmse = result.reproj_rmse.unwrap_or(f64::INFINITY);
        if rmse.is_nan() || rmse > params.max_reprojection_error {
            return Err(CalibrationError::ReprojectionTooLarge {
                rmse,
                threshold: params.max_reprojection_error,
            });
        }

        self.calibration = Some(Calibration::from_rotation_vector(
            result.rvec,
            result.translation,
        ));
        log::info!(
            "Calibrated `{}` from {} points: rvec {:?}, tvec {:?}, rmse {rmse:.3} px",
            self.name,
            object_points.len(),
            result.rvec,
            result.translation,
        );
        Ok(result)
    }

    /// Project reference-frame points into distorted pixel coordinates.
    ///
    /// Fails with [`CameraError::NotCalibrated`] when no calibration is set.
    pub fn project_points(&self, object_points: &[[f64; 3]]) -> Result<Vec<[f64; 2]>, CameraError> {
        let calibration = self.require_calibration()?;
        Ok(object_points
            .iter()
            .map(|p| {
                project_point(
                    &calibration.reference_to_camera(p),
                    &self.intrinsic,
                    &self.distortion,
                )
            })
            .collect())
    }

    /// Remove intrinsics and lens distortion from pixel coordinates.
    ///
    /// The output is in normalized camera coordinates `(X/Z, Y/Z)`, not
    /// pixels. Does not need an extrinsic calibration.
    pub fn undistort(&self, image_points: &[[f64; 2]]) -> Vec<[f64; 2]> {
        image_points
            .iter()
            .map(|uv| {
                undistort_point_normalized(
                    uv[0],
                    uv[1],
                    &self.intrinsic,
                    &self.distortion,
                    &self.undistort_params,
                )
            })
            .collect()
    }

    /// Snapshot the calibration state. Extrinsic fields are `None` when uncalibrated.
    pub fn export_calibration(&self) -> CalibrationRecord {
        let calibration = self.calibration.as_ref();
        CalibrationRecord {
            rotation_vector: calibration.map(Calibration::rotation_vector),
            translation_vector: calibration.map(Calibration::translation_vector),
            extrinsic_matrix: calibration.map(Calibration::extrinsic_matrix),
            camera_matrix: Some(self.camera_matrix()),
            distortion_coefficients: Some(self.distortion_coefficients.clone()),
        }
    }

    /// Replace the calibration with the one stored in `record`.
    ///
    /// Missing extrinsics clear the calibration. Intrinsics present in the
    /// record replace the current ones, absent ones are kept. The record is
    /// validated as a whole before anything is changed.
    pub fn import_calibration(
        &mut self,
        record: &CalibrationRecord,
    ) -> Result<(), CalibrationError> {
        let calibration = Calibration::from_record(record)?;
        let intrinsic = record
            .camera_matrix
            .as_ref()
            .map(CameraIntrinsic::from_matrix)
            .transpose()?;
        let distortion = record
            .distortion_coefficients
            .as_deref()
            .map(PolynomialDistortion::from_coefficients)
            .transpose()?;

        if let Some(intrinsic) = intrinsic {
            self.intrinsic = intrinsic;
        }
        if let (Some(distortion), Some(coefficients)) =
            (distortion, &record.distortion_coefficients)
        {
            self.distortion = distortion;
            self.distortion_coefficients = coefficients.clone();
        }
        self.calibration = calibration;
        self.is_original_calibration = false;

        log::info!(
            "Imported calibration for `{}` (extrinsics {})",
            self.name,
            if self.calibration.is_some() { "set" } else { "unset" }
        );
        Ok(())
    }

    /// Map camera-frame points in millimeters into the reference frame in meters.
    ///
    /// Each point is scaled to meters and transformed with `R^T (p - t)`.
    /// Returns `None` when the camera is not calibrated.
    pub fn transform_to_reference_frame(&self, points: &[[f64; 3]]) -> Option<Vec<[f64; 3]>> {
        let calibration = self.calibration.as_ref()?;
        Some(
            points
                .iter()
                .map(|p| {
                    calibration.camera_to_reference(&[
                        p[0] / MILLIMETERS_PER_METER,
                        p[1] / MILLIMETERS_PER_METER,
                        p[2] / MILLIMETERS_PER_METER,
                    ])
                })
                .collect(),
        )
    }

    /// Shape-preserving variant of [`CameraModel::transform_to_reference_frame`].
    ///
    /// Accepts any array whose last axis has length 3, e.g. an `N×3` point
    /// list or an `H×W×3` organized point cloud, and returns an array of the
    /// same shape. Returns `Ok(None)` when the camera is not calibrated.
    pub fn transform_array_to_reference_frame<D: Dimension>(
        &self,
        points: ArrayView<f64, D>,
    ) -> Result<Option<Array<f64, D>>, CameraError> {
        let shape = points.shape();
        if shape.last() != Some(&3) {
            return Err(CameraError::InvalidShape(shape.to_vec()));
        }

        let Some(calibration) = self.calibration.as_ref() else {
            return Ok(None);
        };

        let last = Axis(points.ndim() - 1);
        let mut out = points.to_owned();
        for mut lane in out.lanes_mut(last) {
            let p = calibration.camera_to_reference(&[
                lane[0] / MILLIMETERS_PER_METER,
                lane[1] / MILLIMETERS_PER_METER,
                lane[2] / MILLIMETERS_PER_METER,
            ]);
            lane[0] = p[0];
            lane[1] = p[1];
            lane[2] = p[2];
        }
        Ok(Some(out))
    }
}
