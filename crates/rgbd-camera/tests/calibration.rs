mod common;

use approx::assert_relative_eq;
use common::{kinect_camera, left_pose, marker_corners, observe};
use rgbd_camera::{CalibrationError, CalibrationParams, CalibrationRecord, CameraError};
use rgbd_pnp::PnPError;

#[test]
fn infer_extrinsics_from_single_marker() -> Result<(), CalibrationError> {
    let mut camera = kinect_camera("left");
    let truth = left_pose();
    let object = marker_corners([0.0, 0.0, 0.0], 0.15);
    let image = observe(&camera, &truth, &object);

    let result = camera.infer_extrinsics(&image, &object)?;
    assert!(result.reproj_rmse.is_some_and(|e| e < 1e-4));
    assert!(camera.is_original_calibration());

    let calibration = camera.calibration().expect("calibrated");
    for k in 0..3 {
        assert_relative_eq!(
            calibration.rotation_vector()[k],
            truth.rotation_vector()[k],
            epsilon = 1e-6
        );
        assert_relative_eq!(
            calibration.translation_vector()[k],
            truth.translation_vector()[k],
            epsilon = 1e-6
        );
    }
    Ok(())
}

#[test]
fn infer_extrinsics_from_markers_on_two_planes() -> Result<(), CalibrationError> {
    let mut camera = kinect_camera("left");
    let truth = left_pose();
    let mut object = marker_corners([-0.1, 0.0, 0.0], 0.1);
    object.extend(marker_corners([0.15, 0.05, 0.1], 0.1));
    let image = observe(&camera, &truth, &object);

    camera.infer_extrinsics(&image, &object)?;

    let reprojected = camera.project_points(&object).expect("calibrated");
    for (a, b) in reprojected.iter().zip(image.iter()) {
        assert_relative_eq!(a[0], b[0], epsilon = 1e-5);
        assert_relative_eq!(a[1], b[1], epsilon = 1e-5);
    }
    Ok(())
}

#[test]
fn export_import_through_json_file_is_exact() -> Result<(), CalibrationError> {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut camera = kinect_camera("left");
    let object = marker_corners([0.0, 0.0, 0.0], 0.15);
    let image = observe(&camera, &left_pose(), &object);
    camera.infer_extrinsics(&image, &object)?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("left.json");
    camera.export_calibration().save(&path)?;

    let mut restored = kinect_camera("restored");
    restored.import_calibration(&CalibrationRecord::load(&path)?)?;
    assert!(!restored.is_original_calibration());
    assert_eq!(restored.export_calibration(), camera.export_calibration());

    let probe = [[0.1, -0.2, 0.05], [0.0, 0.0, 0.3]];
    assert_eq!(
        restored.project_points(&probe).expect("calibrated"),
        camera.project_points(&probe).expect("calibrated")
    );
    Ok(())
}

#[test]
fn import_with_only_extrinsic_matrix() -> Result<(), CalibrationError> {
    let truth = left_pose();
    let mut camera = kinect_camera("left");
    camera.import_calibration(&CalibrationRecord {
        extrinsic_matrix: Some(truth.extrinsic_matrix()),
        ..Default::default()
    })?;

    let calibration = camera.calibration().expect("calibrated");
    for k in 0..3 {
        assert_relative_eq!(
            calibration.rotation_vector()[k],
            truth.rotation_vector()[k],
            epsilon = 1e-12
        );
    }
    Ok(())
}

#[test]
fn import_of_empty_record_clears_extrinsics() -> Result<(), CalibrationError> {
    let mut camera = kinect_camera("left");
    let object = marker_corners([0.0, 0.0, 0.0], 0.15);
    let image = observe(&camera, &left_pose(), &object);
    camera.infer_extrinsics(&image, &object)?;

    camera.import_calibration(&CalibrationRecord::from_json("{}")?)?;
    assert!(!camera.is_calibrated());
    assert!(matches!(
        camera.project_points(&object),
        Err(CameraError::NotCalibrated(_))
    ));
    Ok(())
}

#[test]
fn degenerate_correspondences_are_rejected() -> Result<(), CalibrationError> {
    let mut camera = kinect_camera("left");
    let object = marker_corners([0.0, 0.0, 0.0], 0.15);
    let image = observe(&camera, &left_pose(), &object);
    camera.infer_extrinsics(&image, &object)?;
    let before = camera.export_calibration();

    let res = camera.infer_extrinsics(&image[..3], &object[..3]);
    assert!(matches!(
        res,
        Err(CalibrationError::Pnp(PnPError::InsufficientCorrespondences { .. }))
    ));

    let collinear = [[0.0, 0.0, 0.0], [0.1, 0.0, 0.0], [0.2, 0.0, 0.0], [0.3, 0.0, 0.0]];
    let res = camera.infer_extrinsics(&image, &collinear);
    assert!(matches!(
        res,
        Err(CalibrationError::Pnp(PnPError::DegenerateConfiguration(_)))
    ));

    let duplicate = [object[0], object[1], object[1], object[2]];
    let res = camera.infer_extrinsics(&image, &duplicate);
    assert!(matches!(
        res,
        Err(CalibrationError::Pnp(PnPError::DegenerateConfiguration(_)))
    ));

    let res = camera.infer_extrinsics(&image, &object[..3]);
    assert!(matches!(
        res,
        Err(CalibrationError::Pnp(PnPError::MismatchedArrayLengths { .. }))
    ));

    // failures keep the previous calibration
    assert_eq!(camera.export_calibration(), before);
    Ok(())
}

#[test]
fn outlier_exceeds_reprojection_threshold() {
    let mut camera = kinect_camera("left");
    let mut object = marker_corners([-0.1, 0.0, 0.0], 0.1);
    object.extend(marker_corners([0.15, 0.05, 0.1], 0.1));
    let mut image = observe(&camera, &left_pose(), &object);
    image[5][0] += 150.0;

    let params = CalibrationParams::default().with_max_reprojection_error(1.0);
    let res = camera.infer_extrinsics_with(&image, &object, &params);
    assert!(matches!(
        res,
        Err(CalibrationError::ReprojectionTooLarge { threshold, .. }) if threshold == 1.0
    ));
    assert!(!camera.is_calibrated());
}
