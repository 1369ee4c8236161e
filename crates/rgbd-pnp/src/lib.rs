#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Camera pose from 2D-3D correspondences
//!
//! The solvers take pixel observations straight from a (possibly distorted)
//! camera: the image points are undistorted to normalized coordinates, a
//! linear estimate is computed, and the pose is refined with
//! Levenberg–Marquardt against the full camera model.
//!
//! - **EPnP** for points spanning three dimensions.
//! - **Planar homography** for coplanar points such as marker corners.
//! - [`PnPMethod::Auto`] picks between them from the layout of the world points.
//!
//! ## Example: marker corners
//!
//! ```rust
//! use rgbd_geometry::distortion::CameraIntrinsic;
//! use rgbd_pnp::{solve_pnp, PnPMethod};
//!
//! // 10 cm marker in its own frame
//! let world = [
//!     [-0.05, 0.05, 0.0],
//!     [0.05, 0.05, 0.0],
//!     [0.05, -0.05, 0.0],
//!     [-0.05, -0.05, 0.0],
//! ];
//! // seen head-on from 1 m
//! let image = [[290.0, 270.0], [350.0, 270.0], [350.0, 210.0], [290.0, 210.0]];
//! let intrinsic = CameraIntrinsic::new(600.0, 600.0, 320.0, 240.0);
//!
//! let result = solve_pnp(&world, &image, &intrinsic, None, PnPMethod::default())?;
//! assert!((result.translation[2] - 1.0).abs() < 1e-6);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Efficient Perspective-n-Point (EPnP) solver implementation.
pub mod epnp;

/// Planar (homography based) pose solver.
pub mod planar;

/// Common data types and traits for PnP solvers.
pub mod pnp;

/// LM-based pose refinement.
pub mod refine;

mod ops;

pub use epnp::{EPnP, EPnPParams};
pub use planar::{PlanarHomography, PlanarParams};
pub use pnp::{NumericTol, PnPError, PnPResult, PnPSolver};
pub use refine::{refine_pose_lm, LMParams};

use ops::{check_correspondences, classify_points, PointLayout};
use rgbd_geometry::distortion::{CameraIntrinsic, PolynomialDistortion};

/// Enumeration of the Perspective-n-Point algorithms available in this crate.
#[derive(Debug, Clone)]
pub enum PnPMethod {
    /// Efficient PnP solver with a user-supplied parameter object.
    EPnP(EPnPParams),
    /// Efficient PnP solver with the crate's default parameters.
    EPnPDefault,
    /// Planar homography solver with a user-supplied parameter object.
    Planar(PlanarParams),
    /// Choose the planar solver for coplanar points and EPnP otherwise.
    Auto {
        /// Tolerances shared by both solvers.
        tol: NumericTol,
        /// Refinement applied after either solver, `None` to skip it.
        refine: Option<LMParams>,
    },
}

impl Default for PnPMethod {
    fn default() -> Self {
        PnPMethod::Auto {
            tol: NumericTol::default(),
            refine: Some(LMParams::default()),
        }
    }
}

/// Dispatch function that routes to the chosen PnP solver.
pub fn solve_pnp(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    intrinsic: &CameraIntrinsic,
    distortion: Option<&PolynomialDistortion>,
    method: PnPMethod,
) -> Result<PnPResult, PnPError> {
    match method {
        PnPMethod::EPnP(params) => EPnP::solve(world, image, intrinsic, distortion, &params),
        PnPMethod::EPnPDefault => {
            EPnP::solve(world, image, intrinsic, distortion, &EPnPParams::default())
        }
        PnPMethod::Planar(params) => {
            PlanarHomography::solve(world, image, intrinsic, distortion, &params)
        }
        PnPMethod::Auto { tol, refine } => {
            check_correspondences(world, image, 4)?;
            match classify_points(world, &tol)? {
                PointLayout::Planar(_) => {
                    log::debug!("solve_pnp: {} coplanar points, using homography", world.len());
                    let params = PlanarParams { tol, refine };
                    PlanarHomography::solve(world, image, intrinsic, distortion, &params)
                }
                PointLayout::General => {
                    log::debug!("solve_pnp: {} points, using EPnP", world.len());
                    let params = EPnPParams { tol, refine };
                    EPnP::solve(world, image, intrinsic, distortion, &params)
                }
            }
        }
    }
}
