use rgbd_geometry::GeometryError;
use rgbd_pnp::PnPError;

/// Errors raised while estimating, importing or persisting a calibration.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    /// The pose solver rejected the correspondences or failed.
    #[error(transparent)]
    Pnp(#[from] PnPError),

    /// The refined pose does not explain the observations well enough.
    #[error("Reprojection RMSE {rmse:.3} px exceeds the threshold of {threshold:.3} px")]
    ReprojectionTooLarge {
        /// Root-mean-square reprojection error of the refined pose.
        rmse: f64,
        /// Configured acceptance threshold.
        threshold: f64,
    },

    /// The extrinsic matrix of a record disagrees with its rotation and translation vectors.
    #[error("Extrinsic matrix disagrees with the rotation/translation vectors by {deviation:e}")]
    InconsistentRecord {
        /// Largest absolute element-wise difference.
        deviation: f64,
    },

    /// A record carries only one of the rotation and translation vectors.
    #[error("Calibration record has a {present} but no {missing}")]
    IncompleteRecord {
        /// The field that is present.
        present: &'static str,
        /// The field that is missing.
        missing: &'static str,
    },

    /// Invalid camera matrix, distortion coefficients or extrinsic rotation.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Reading or writing a calibration file failed.
    #[error("Failed to access calibration file: {0}")]
    Io(#[from] std::io::Error),

    /// A calibration record could not be (de)serialized.
    #[error("Invalid calibration record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by operations on a [`crate::CameraModel`].
#[derive(thiserror::Error, Debug)]
pub enum CameraError {
    /// The operation needs an extrinsic calibration that has not been set.
    #[error("{0} is not calibrated")]
    NotCalibrated(String),

    /// Calibration failed.
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// A triangulated point lies at (or numerically near) infinity.
    #[error("Triangulated point {index} is degenerate (w = {w:e})")]
    DegenerateTriangulation {
        /// Index of the offending correspondence.
        index: usize,
        /// Homogeneous scale of the triangulated point.
        w: f64,
    },

    /// The two views have a different number of observations.
    #[error("Mismatched point counts: {left} != {right}")]
    MismatchedPointCounts {
        /// Number of points observed by the first camera.
        left: usize,
        /// Number of points observed by the second camera.
        right: usize,
    },

    /// A point array does not have 3 coordinates along its last axis.
    #[error("Expected an array with a last axis of length 3, got shape {0:?}")]
    InvalidShape(Vec<usize>),

    /// A geometry primitive failed.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}
