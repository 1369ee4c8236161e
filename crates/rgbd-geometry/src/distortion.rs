use serde::{Deserialize, Serialize};

use crate::GeometryError;

/// Represents the intrinsic parameters of a pinhole camera
///
/// # Fields
///
/// * `fx` - The focal length in the x direction
/// * `fy` - The focal length in the y direction
/// * `cx` - The x coordinate of the principal point
/// * `cy` - The y coordinate of the principal point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsic {
    /// The focal length in the x direction
    pub fx: f64,
    /// The focal length in the y direction
    pub fy: f64,
    /// The x coordinate of the principal point
    pub cx: f64,
    /// The y coordinate of the principal point
    pub cy: f64,
}

impl CameraIntrinsic {
    /// Create camera intrinsics from focal lengths and principal point.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Create camera intrinsics from a row-major 3x3 camera matrix.
    ///
    /// The matrix must have the form `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`
    /// with finite, non-zero focal lengths.
    pub fn from_matrix(k: &[[f64; 3]; 3]) -> Result<Self, GeometryError> {
        if k.iter().flatten().any(|v| !v.is_finite()) {
            return Err(GeometryError::InvalidIntrinsics(
                "camera matrix contains non-finite values".to_string(),
            ));
        }
        if k[0][1] != 0.0 || k[1][0] != 0.0 || k[2][0] != 0.0 || k[2][1] != 0.0 || k[2][2] != 1.0
        {
            return Err(GeometryError::InvalidIntrinsics(
                "Intrinsics matrix must have form [[fx, 0, cx], [0, fy, cy], [0, 0, 1]]"
                    .to_string(),
            ));
        }
        if k[0][0] == 0.0 || k[1][1] == 0.0 {
            return Err(GeometryError::InvalidIntrinsics(
                "focal lengths must be non-zero".to_string(),
            ));
        }

        Ok(Self {
            fx: k[0][0],
            fy: k[1][1],
            cx: k[0][2],
            cy: k[1][2],
        })
    }

    /// Convert to a row-major 3x3 camera matrix.
    pub fn to_matrix(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, 0.0, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }
}

/// Represents the polynomial distortion parameters of a camera
///
/// This is the rational Brown-Conrady model used by OpenCV and by most
/// RGB-D sensors' factory calibration.
///
/// # Fields
///
/// * `k1` - The first radial distortion coefficient
/// * `k2` - The second radial distortion coefficient
/// * `k3` - The third radial distortion coefficient
/// * `k4` - The fourth radial distortion coefficient
/// * `k5` - The fifth radial distortion coefficient
/// * `k6` - The sixth radial distortion coefficient
/// * `p1` - The first tangential distortion coefficient
/// * `p2` - The second tangential distortion coefficient
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PolynomialDistortion {
    /// The first radial distortion coefficient
    pub k1: f64,
    /// The second radial distortion coefficient
    pub k2: f64,
    /// The third radial distortion coefficient
    pub k3: f64,
    /// The fourth radial distortion coefficient
    pub k4: f64,
    /// The fifth radial distortion coefficient
    pub k5: f64,
    /// The sixth radial distortion coefficient
    pub k6: f64,
    /// The first tangential distortion coefficient
    pub p1: f64,
    /// The second tangential distortion coefficient
    pub p2: f64,
}

impl PolynomialDistortion {
    /// Create distortion parameters with all coefficients set to zero (no distortion).
    pub fn none() -> Self {
        Self::default()
    }

    /// Build the model from an OpenCV-ordered coefficient vector.
    ///
    /// The order is `(k1, k2, p1, p2[, k3[, k4, k5, k6]])`; an empty slice
    /// means no distortion.
    pub fn from_coefficients(coeffs: &[f64]) -> Result<Self, GeometryError> {
        let mut c = [0.0; 8];
        match coeffs.len() {
            0 | 4 | 5 | 8 => c[..coeffs.len()].copy_from_slice(coeffs),
            n => return Err(GeometryError::InvalidDistortionLength(n)),
        }
        Ok(Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
            k4: c[5],
            k5: c[6],
            k6: c[7],
        })
    }

    /// The coefficients in OpenCV order `(k1, k2, p1, p2, k3, k4, k5, k6)`.
    pub fn to_coefficients(&self) -> [f64; 8] {
        [
            self.k1, self.k2, self.p1, self.p2, self.k3, self.k4, self.k5, self.k6,
        ]
    }

    /// Check if there is any distortion.
    pub fn has_distortion(&self) -> bool {
        self.to_coefficients().iter().any(|&k| k != 0.0)
    }
}

/// Apply the distortion model to a normalized image point `(x, y)`.
///
/// The operation order follows OpenCV's `projectPoints` so that results
/// compare equal with it.
pub fn distort_normalized(x: f64, y: f64, distortion: &PolynomialDistortion) -> (f64, f64) {
    let d = distortion;

    let r2 = x * x + y * y;
    let r4 = r2 * r2;
    let r6 = r4 * r2;
    let a1 = 2.0 * x * y;
    let a2 = r2 + 2.0 * x * x;
    let a3 = r2 + 2.0 * y * y;

    // radial distortion
    let cdist = 1.0 + d.k1 * r2 + d.k2 * r4 + d.k3 * r6;
    let icdist2 = 1.0 / (1.0 + d.k4 * r2 + d.k5 * r4 + d.k6 * r6);

    // tangential distortion
    let xd = x * cdist * icdist2 + d.p1 * a1 + d.p2 * a2;
    let yd = y * cdist * icdist2 + d.p1 * a3 + d.p2 * a1;

    (xd, yd)
}

/// Distort a point using polynomial distortion
///
/// # Arguments
///
/// * `x` - The x coordinate of the point in pixels
/// * `y` - The y coordinate of the point in pixels
/// * `intrinsic` - The intrinsic parameters of the camera
/// * `distortion` - The distortion parameters of the camera
///
/// # Returns
///
/// * `x` - The x coordinate of the distorted point
/// * `y` - The y coordinate of the distorted point
pub fn distort_point_polynomial(
    x: f64,
    y: f64,
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
) -> (f64, f64) {
    let (fx, fy, cx, cy) = (intrinsic.fx, intrinsic.fy, intrinsic.cx, intrinsic.cy);

    // normalize the coordinates
    let x = (x - cx) / fx;
    let y = (y - cy) / fy;

    let (xd, yd) = distort_normalized(x, y, distortion);

    // denormalize the coordinates
    (fx * xd + cx, fy * yd + cy)
}

/// Project a camera-frame 3D point to pixel coordinates.
///
/// Points with zero depth are projected with unit scale, as OpenCV does.
pub fn project_point(
    point_camera: &[f64; 3],
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
) -> [f64; 2] {
    let [px, py, pz] = *point_camera;
    let z = if pz != 0.0 { 1.0 / pz } else { 1.0 };
    let (xd, yd) = distort_normalized(px * z, py * z, distortion);
    [xd * intrinsic.fx + intrinsic.cx, yd * intrinsic.fy + intrinsic.cy]
}

/// Parameters for the iterative point undistortion.
#[derive(Debug, Clone)]
pub struct UndistortParams {
    /// Maximum number of fixed-point iterations.
    pub max_iterations: usize,
    /// Stop when the update in normalized coordinates falls below this value.
    pub epsilon: f64,
}

impl Default for UndistortParams {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            epsilon: 1e-14,
        }
    }
}

impl UndistortParams {
    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the convergence threshold.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }
}

/// Undistort a pixel into normalized camera coordinates.
///
/// Both the camera matrix and the lens distortion are removed: the result is
/// the `(X/Z, Y/Z)` ray of the observed point, not a pixel.
pub fn undistort_point_normalized(
    u: f64,
    v: f64,
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
    params: &UndistortParams,
) -> [f64; 2] {
    let x0 = (u - intrinsic.cx) / intrinsic.fx;
    let y0 = (v - intrinsic.cy) / intrinsic.fy;

    if !distortion.has_distortion() {
        return [x0, y0];
    }

    let d = distortion;
    let (mut x, mut y) = (x0, y0);

    for _ in 0..params.max_iterations {
        let r2 = x * x + y * y;
        let icdist = (1.0 + ((d.k6 * r2 + d.k5) * r2 + d.k4) * r2)
            / (1.0 + ((d.k3 * r2 + d.k2) * r2 + d.k1) * r2);
        if icdist < 0.0 {
            // outside the invertible region of the model
            return [x0, y0];
        }

        let delta_x = 2.0 * d.p1 * x * y + d.p2 * (r2 + 2.0 * x * x);
        let delta_y = d.p1 * (r2 + 2.0 * y * y) + 2.0 * d.p2 * x * y;
        let x_next = (x0 - delta_x) * icdist;
        let y_next = (y0 - delta_y) * icdist;

        let step = (x_next - x).abs().max((y_next - y).abs());
        x = x_next;
        y = y_next;
        if step < params.epsilon {
            break;
        }
    }

    [x, y]
}
