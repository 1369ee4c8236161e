#![allow(dead_code)]

use rgbd_camera::{Calibration, CameraModel};

pub const KINECT_MATRIX: [[f64; 3]; 3] = [
    [613.0, 0.0, 638.2],
    [0.0, 612.5, 367.9],
    [0.0, 0.0, 1.0],
];
pub const KINECT_DISTORTION: [f64; 8] = [0.52, -2.61, 0.0007, -0.0002, 1.47, 0.40, -2.44, 1.40];

pub fn kinect_camera(name: &str) -> CameraModel {
    CameraModel::new(&KINECT_MATRIX, &KINECT_DISTORTION)
        .expect("valid intrinsics")
        .with_name(name)
}

/// Corners of a square marker of side `side` centered at `center` on the plane z = `center[2]`.
pub fn marker_corners(center: [f64; 3], side: f64) -> Vec<[f64; 3]> {
    let h = side / 2.0;
    vec![
        [center[0] - h, center[1] + h, center[2]],
        [center[0] + h, center[1] + h, center[2]],
        [center[0] + h, center[1] - h, center[2]],
        [center[0] - h, center[1] - h, center[2]],
    ]
}

/// Observe reference-frame points with a camera posed by `truth`.
pub fn observe(camera: &CameraModel, truth: &Calibration, points: &[[f64; 3]]) -> Vec<[f64; 2]> {
    let mut posed = camera.clone();
    let record = rgbd_camera::CalibrationRecord {
        rotation_vector: Some(truth.rotation_vector()),
        translation_vector: Some(truth.translation_vector()),
        ..Default::default()
    };
    posed.import_calibration(&record).expect("valid record");
    posed.project_points(points).expect("calibrated")
}

pub fn left_pose() -> Calibration {
    Calibration::from_rotation_vector([0.05, 0.3, 0.0], [-0.3, 0.05, 1.4])
}

pub fn right_pose() -> Calibration {
    Calibration::from_rotation_vector([-0.05, -0.3, 0.02], [0.3, -0.02, 1.5])
}
