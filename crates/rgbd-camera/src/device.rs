use crate::{CalibrationError, CameraModel};

/// A physical capture device (e.g. an RGB-D sensor) with factory intrinsics.
pub trait CaptureDevice {
    /// A captured frame, e.g. depth and color images.
    type Frame;
    /// The device error type.
    type Error: std::error::Error;

    /// Row-major 3x3 camera matrix of the color stream.
    fn camera_matrix(&self) -> [[f64; 3]; 3];

    /// Distortion coefficients in OpenCV order.
    fn distortion_coefficients(&self) -> Vec<f64>;

    /// Grab the next frame.
    fn capture(&mut self) -> Result<Self::Frame, Self::Error>;

    /// Release the device.
    fn close(&mut self) -> Result<(), Self::Error>;
}

/// A capture device together with its [`CameraModel`].
///
/// The device is released exactly once: by [`Camera::close`], or when the
/// camera is dropped.
pub struct Camera<D: CaptureDevice> {
    device: D,
    model: CameraModel,
    previous_capture: Option<D::Frame>,
    closed: bool,
}

impl<D: CaptureDevice> Camera<D> {
    /// Wrap a device, building the camera model from its intrinsics.
    ///
    /// If the intrinsics are invalid the device is released before returning the error.
    pub fn open(mut device: D) -> Result<Self, CalibrationError> {
        match CameraModel::new(&device.camera_matrix(), &device.distortion_coefficients()) {
            Ok(model) => Ok(Self {
                device,
                model,
                previous_capture: None,
                closed: false,
            }),
            Err(err) => {
                if let Err(close_err) = device.close() {
                    log::warn!("Failed to close capture device: {close_err}");
                }
                Err(err)
            }
        }
    }

    /// Set the name of the camera model.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.model.set_name(name);
        self
    }

    /// The camera model.
    pub fn model(&self) -> &CameraModel {
        &self.model
    }

    /// The camera model, for calibration.
    pub fn model_mut(&mut self) -> &mut CameraModel {
        &mut self.model
    }

    /// The underlying device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Capture a frame, keeping it as the previous capture.
    pub fn capture(&mut self) -> Result<&D::Frame, D::Error> {
        let frame = self.device.capture()?;
        Ok(self.previous_capture.insert(frame))
    }

    /// The most recent successful capture.
    pub fn previous_capture(&self) -> Option<&D::Frame> {
        self.previous_capture.as_ref()
    }

    /// Release the device, reporting any error.
    pub fn close(mut self) -> Result<(), D::Error> {
        self.closed = true;
        self.device.close()
    }
}

impl<D: CaptureDevice> Drop for Camera<D> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.device.close() {
            log::warn!("Failed to close capture device of `{}`: {err}", self.model.name());
        }
    }
}
