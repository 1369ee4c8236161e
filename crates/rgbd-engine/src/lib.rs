#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use rgbd_geometry as geometry;

#[doc(inline)]
pub use rgbd_pnp as pnp;

#[doc(inline)]
pub use rgbd_camera as camera;

pub use rgbd_camera::{
    triangulate, Calibration, CalibrationError, CalibrationParams, CalibrationRecord, Camera,
    CameraError, CameraModel, CaptureDevice,
};
