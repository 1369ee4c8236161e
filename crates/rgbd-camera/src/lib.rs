#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Extrinsic calibration value and its serializable record.
pub mod calibration;

/// Capture devices and the camera that owns one.
pub mod device;

mod error;
pub use error::{CalibrationError, CameraError};

/// The per-camera model: calibration, projection, undistortion and frame transforms.
pub mod model;

/// Two-view triangulation.
pub mod triangulate;

pub use calibration::{Calibration, CalibrationRecord};
pub use device::{Camera, CaptureDevice};
pub use model::{CalibrationParams, CameraModel};
pub use triangulate::{triangulate, triangulate_homogeneous};
