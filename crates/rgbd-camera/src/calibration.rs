use std::path::Path;

use glam::DVec3;
use rgbd_geometry::linalg::array33_to_dmat3;
use rgbd_geometry::rotation::{rotation_matrix_to_vector, rotation_vector_to_matrix};
use serde::{Deserialize, Serialize};

use crate::CalibrationError;

/// Largest element-wise disagreement tolerated between a stored extrinsic
/// matrix and the one derived from the rotation/translation vectors.
pub const EXTRINSIC_CONSISTENCY_TOL: f64 = 1e-6;

/// Extrinsic calibration of a camera: the rigid transform mapping
/// reference-frame points into the camera frame, `p_cam = R * p_ref + t`.
///
/// The rotation vector, translation vector and extrinsic matrix are always
/// consistent: the value can only be built as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    rotation_vector: [f64; 3],
    translation_vector: [f64; 3],
    rotation: [[f64; 3]; 3],
}

impl Calibration {
    /// Build a calibration from a Rodrigues rotation vector and a translation.
    pub fn from_rotation_vector(rotation_vector: [f64; 3], translation_vector: [f64; 3]) -> Self {
        Self {
            rotation_vector,
            translation_vector,
            rotation: rotation_vector_to_matrix(&rotation_vector),
        }
    }

    /// Build a calibration from a 3x4 extrinsic matrix `[R | t]`.
    ///
    /// `R` must be a rotation: it is converted to a rotation vector and the
    /// result must reproduce it within [`EXTRINSIC_CONSISTENCY_TOL`].
    pub fn from_extrinsic_matrix(matrix: &[[f64; 4]; 3]) -> Result<Self, CalibrationError> {
        let rotation: [[f64; 3]; 3] =
            std::array::from_fn(|i| [matrix[i][0], matrix[i][1], matrix[i][2]]);
        let translation_vector = [matrix[0][3], matrix[1][3], matrix[2][3]];

        let calibration =
            Self::from_rotation_vector(rotation_matrix_to_vector(&rotation), translation_vector);
        calibration.check_matrix(matrix)?;
        Ok(calibration)
    }

    /// The Rodrigues rotation vector.
    pub fn rotation_vector(&self) -> [f64; 3] {
        self.rotation_vector
    }

    /// The translation vector, in the reference frame units (meters).
    pub fn translation_vector(&self) -> [f64; 3] {
        self.translation_vector
    }

    /// The row-major rotation matrix `R`.
    pub fn rotation_matrix(&self) -> [[f64; 3]; 3] {
        self.rotation
    }

    /// The row-major 3x4 extrinsic matrix `[R | t]`.
    pub fn extrinsic_matrix(&self) -> [[f64; 4]; 3] {
        std::array::from_fn(|i| {
            let r = self.rotation[i];
            [r[0], r[1], r[2], self.translation_vector[i]]
        })
    }

    /// Map a reference-frame point into the camera frame.
    pub fn reference_to_camera(&self, point: &[f64; 3]) -> [f64; 3] {
        let r = array33_to_dmat3(&self.rotation);
        (r * DVec3::from(*point) + DVec3::from(self.translation_vector)).to_array()
    }

    /// Map a camera-frame point into the reference frame, `R^T (p - t)`.
    pub fn camera_to_reference(&self, point: &[f64; 3]) -> [f64; 3] {
        let r_t = array33_to_dmat3(&self.rotation).transpose();
        (r_t * (DVec3::from(*point) - DVec3::from(self.translation_vector))).to_array()
    }

    fn check_matrix(&self, matrix: &[[f64; 4]; 3]) -> Result<(), CalibrationError> {
        let derived = self.extrinsic_matrix();
        let deviation = derived
            .iter()
            .flatten()
            .zip(matrix.iter().flatten())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        // NaN compares false, so test the accepted range
        if deviation <= EXTRINSIC_CONSISTENCY_TOL {
            Ok(())
        } else {
            Err(CalibrationError::InconsistentRecord { deviation })
        }
    }

    /// Extract the calibration stored in a record, if any.
    ///
    /// - both vectors present: used as is, a stored matrix must agree with them;
    /// - only the matrix present: the vectors are derived from it;
    /// - nothing present: `None`;
    /// - one vector without the other: [`CalibrationError::IncompleteRecord`].
    pub fn from_record(record: &CalibrationRecord) -> Result<Option<Self>, CalibrationError> {
        match (record.rotation_vector, record.translation_vector) {
            (Some(rvec), Some(tvec)) => {
                let calibration = Self::from_rotation_vector(rvec, tvec);
                if let Some(matrix) = &record.extrinsic_matrix {
                    calibration.check_matrix(matrix)?;
                }
                Ok(Some(calibration))
            }
            (None, None) => record
                .extrinsic_matrix
                .as_ref()
                .map(Self::from_extrinsic_matrix)
                .transpose(),
            (Some(_), None) => Err(CalibrationError::IncompleteRecord {
                present: "rotation vector",
                missing: "translation vector",
            }),
            (None, Some(_)) => Err(CalibrationError::IncompleteRecord {
                present: "translation vector",
                missing: "rotation vector",
            }),
        }
    }
}

/// Serializable snapshot of a camera's calibration state.
///
/// Every field is optional: an uncalibrated camera exports no extrinsics,
/// and missing keys in a stored record are absent rather than errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// Rodrigues rotation vector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_vector: Option<[f64; 3]>,
    /// Translation vector in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation_vector: Option<[f64; 3]>,
    /// Row-major 3x4 matrix `[R | t]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extrinsic_matrix: Option<[[f64; 4]; 3]>,
    /// Row-major 3x3 pinhole camera matrix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_matrix: Option<[[f64; 3]; 3]>,
    /// Distortion coefficients in OpenCV order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distortion_coefficients: Option<Vec<f64>>,
}

impl CalibrationRecord {
    /// Serialize the record to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, CalibrationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a record from JSON.
    pub fn from_json(json: &str) -> Result<Self, CalibrationError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the record to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CalibrationError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Read a record from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
