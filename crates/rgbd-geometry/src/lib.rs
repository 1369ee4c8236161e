#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Lens distortion and pinhole projection.
pub mod distortion;

mod error;
pub use error::GeometryError;

/// Linear algebra utilities.
pub mod linalg;

/// Rotation parametrizations (Rodrigues / axis-angle).
pub mod rotation;

/// Linear triangulation from projection matrices.
pub mod triangulation;
