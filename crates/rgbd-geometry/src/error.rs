/// An error type for the geometry primitives.
#[derive(thiserror::Error, Debug)]
pub enum GeometryError {
    /// The rotation axis has zero length.
    #[error("cannot compute rotation matrix from a zero vector")]
    ZeroRotationAxis,

    /// The camera matrix does not describe a pinhole camera.
    #[error("Invalid camera intrinsics matrix: {0}")]
    InvalidIntrinsics(String),

    /// The distortion coefficient vector has an unsupported length.
    #[error("Distortion coefficients must have length 0, 4, 5 or 8, got {0}")]
    InvalidDistortionLength(usize),

    /// Two inputs that must be paired have different lengths.
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

    /// An observation or projection matrix holds a NaN or infinite value.
    #[error("Non-finite value in correspondence {index}")]
    NonFiniteInput {
        /// Index of the offending correspondence.
        index: usize,
    },

    /// Singular value decomposition failed.
    #[error("SVD computation failed: {0}")]
    SvdFailed(String),
}
