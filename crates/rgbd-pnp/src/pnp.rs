use rgbd_geometry::distortion::{CameraIntrinsic, PolynomialDistortion};
use thiserror::Error;

/// Error types for PnP solvers.
#[derive(Debug, Error)]
pub enum PnPError {
    /// Invalid input data - insufficient correspondences for the specific solver.
    #[error("PnP solver requires at least {required} 2D-3D correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences required by the solver.
        required: usize,
        /// Actual number of correspondences provided.
        actual: usize,
    },

    /// Invalid input data - mismatched array lengths with descriptive labels.
    #[error("Mismatched array lengths: {left_name} ({left_len}) != {right_name} ({right_len})")]
    MismatchedArrayLengths {
        /// Label for the left-hand slice.
        left_name: &'static str,
        /// Length of the left-hand slice.
        left_len: usize,
        /// Label for the right-hand slice.
        right_name: &'static str,
        /// Length of the right-hand slice.
        right_len: usize,
    },

    /// An input coordinate is NaN or infinite.
    #[error("Non-finite value in {0}")]
    NonFiniteInput(&'static str),

    /// The world points do not constrain a pose (duplicates, collinear points, ...).
    #[error("Degenerate point configuration: {0}")]
    DegenerateConfiguration(String),

    /// Singular value decomposition failed.
    #[error("SVD computation failed: {0}")]
    SvdFailed(String),

    /// The estimated pose is not usable.
    #[error("Invalid pose: {0}")]
    InvalidPose(&'static str),
}

/// Numeric tolerances used by linear algebra routines throughout the PnP pipeline.
#[derive(Debug, Clone)]
pub struct NumericTol {
    /// Tolerance for singular-value decomposition.
    pub svd: f64,
    /// Epsilon threshold for determinant / singular-value checks when deciding whether to fall back to a pseudo-inverse.
    pub eps: f64,
    /// Ratio of the smallest to the largest spread of the world points below
    /// which the points are treated as coplanar.
    pub planarity: f64,
    /// Ratio of the second to the largest spread of the world points below
    /// which the points are treated as collinear.
    pub collinearity: f64,
}

impl Default for NumericTol {
    fn default() -> Self {
        Self {
            svd: 1e-12,
            eps: 1e-12,
            planarity: 1e-6,
            collinearity: 1e-6,
        }
    }
}

impl NumericTol {
    /// Set the coplanarity threshold.
    pub fn with_planarity(mut self, planarity: f64) -> Self {
        self.planarity = planarity;
        self
    }

    /// Set the collinearity threshold.
    pub fn with_collinearity(mut self, collinearity: f64) -> Self {
        self.collinearity = collinearity;
        self
    }
}

/// Result returned by any PnP solver.
///
/// The rotation matrix maps coordinates from the **world** frame to the
/// **camera** frame: `p_cam = R * p_world + t`.
#[derive(Debug, Clone)]
pub struct PnPResult {
    /// Estimated rotation matrix.
    pub rotation: [[f64; 3]; 3],
    /// Estimated translation vector.
    pub translation: [f64; 3],
    /// Rodrigues axis-angle representation of the rotation.
    pub rvec: [f64; 3],
    /// Root-mean-square reprojection error in pixels (if computed).
    pub reproj_rmse: Option<f64>,
    /// Number of iterations taken (if applicable).
    pub num_iterations: Option<usize>,
    /// Whether the solver converged (if applicable).
    pub converged: Option<bool>,
}

/// Trait for PnP solvers.
pub trait PnPSolver {
    /// Solver-specific parameters.
    type Param;

    /// Solve for camera pose given 2D-3D correspondences.
    ///
    /// # Arguments
    /// - `world` – 3-D coordinates in the world frame.
    /// - `image` – Corresponding (distorted) pixel coordinates.
    /// - `intrinsic` – Pinhole camera intrinsics.
    /// - `distortion` – Optional lens distortion of the image points.
    /// - `params` – Solver-specific parameters.
    fn solve(
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        intrinsic: &CameraIntrinsic,
        distortion: Option<&PolynomialDistortion>,
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError>;
}
