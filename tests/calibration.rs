use glam::{DVec2, DVec3};

use projmap_core::calibration::CalibrationError;
use projmap_core::config::SolverConfig;
use projmap_core::projection::{self, Viewport};
use projmap_core::projector::{Projector, ProjectorCommand, ProjectorManager};
use projmap_core::surface::{SurfaceObject, SurfaceTable};

const WIDTH: u32 = 1920;
const HEIGHT: u32 = 1080;

struct Truth {
    fov: f64,
    cx: f64,
    cy: f64,
    eye: DVec3,
    euler: DVec3,
}

/// Normalized screen positions of `world` seen through the true pose.
fn observe(truth: &Truth, world: &[DVec3]) -> Vec<DVec2> {
    let (target, up) = projection::orientation_from_euler(truth.euler);
    let view = projection::view_matrix(truth.eye, target, up);
    let aspect = WIDTH as f64 / HEIGHT as f64;
    let proj = projection::asymmetric_frustum(truth.fov, truth.cx, truth.cy, 0.1, 100.0, aspect);
    let viewport = Viewport::new(WIDTH as f64, HEIGHT as f64);

    world
        .iter()
        .map(|w| {
            let window = projection::project(*w, &view, &proj, &viewport);
            DVec2::new(window.x / WIDTH as f64 * 2.0 - 1.0, window.y / HEIGHT as f64 * 2.0 - 1.0)
        })
        .collect()
}

fn scene_points() -> Vec<DVec3> {
    vec![
        DVec3::new(-1.0, -1.0, -0.6),
        DVec3::new(-1.0, 1.0, 0.7),
        DVec3::new(0.0, -1.2, 0.5),
        DVec3::new(0.0, 1.1, -0.4),
        DVec3::new(1.5, -1.5, -0.8),
        DVec3::new(1.5, 1.4, 0.9),
        DVec3::new(0.5, 0.0, 0.0),
        DVec3::new(-0.5, 0.3, -0.9),
        DVec3::new(1.0, -0.5, 1.0),
        DVec3::new(-1.5, -0.4, 0.2),
        DVec3::new(0.8, 0.9, -1.0),
        DVec3::new(2.0, 0.0, 0.4),
    ]
}

fn test_solver() -> SolverConfig {
    SolverConfig {
        grid_size: 6,
        target_error: 0.05,
        seed: Some(7),
        ..SolverConfig::default()
    }
}

#[test]
fn test_recovers_synthetic_pose() {
    let truth = Truth {
        fov: 40.0,
        cx: 0.5,
        cy: 0.5,
        eye: DVec3::new(-5.0, 0.3, 0.4),
        euler: DVec3::new(0.05, -0.04, 0.03),
    };
    let world = scene_points();
    let screen = observe(&truth, &world);
    for s in &screen {
        assert!(s.x.abs() < 1.0 && s.y.abs() < 1.0, "point outside the image: {:?}", s);
    }

    let mut surfaces = SurfaceTable::new();
    let mut projector = Projector::new(1, "Projector 1");
    projector.set_size(WIDTH, HEIGHT);
    projector.set_eye(DVec3::new(-4.8, 0.2, 0.5));
    projector.set_solver_config(test_solver());

    for (w, s) in world.iter().zip(&screen) {
        projector.add_calibration_point(*w, &mut surfaces);
        assert!(projector.set_calibration_point(*s));
    }

    let result = projector.calibrate().unwrap();
    assert!(result.value <= 0.5, "reprojection error {}", result.value);
    assert!((projector.params().fov - truth.fov).abs() < 1.0, "fov {}", projector.params().fov);
    assert!(projector.is_calibrated());
    assert!(projector.take_params_updated());
    assert!((projector.params().up.length() - 1.0).abs() < 1e-9);

    // Every point now projects where it was placed.
    for (w, s) in world.iter().zip(&screen) {
        let window = projector.params().project(*w);
        let pixel = DVec2::new((s.x + 1.0) / 2.0 * WIDTH as f64, (s.y + 1.0) / 2.0 * HEIGHT as f64);
        assert!(window.truncate().distance(pixel) < 2.0);
    }
}

#[test]
fn test_five_points_leave_parameters_unchanged() {
    let truth = Truth {
        fov: 40.0,
        cx: 0.5,
        cy: 0.5,
        eye: DVec3::new(-5.0, 0.0, 0.0),
        euler: DVec3::ZERO,
    };
    let world: Vec<DVec3> = scene_points().into_iter().take(5).collect();
    let screen = observe(&truth, &world);

    let mut project = projmap_core::config::ProjectConfig::default();
    project.projectors[0].calibration_points = world
        .iter()
        .zip(&screen)
        .map(|(w, s)| [w.x, w.y, w.z, s.x, s.y, 1.0])
        .collect();

    let mut manager = ProjectorManager::from_project(&project);
    let before = *manager.projectors()[0].params();

    assert_eq!(manager.calibrate_all(), 0);
    assert_eq!(*manager.projectors()[0].params(), before);

    let err = manager.apply(1, ProjectorCommand::Calibrate).unwrap_err();
    assert_eq!(
        err,
        projmap_core::projector::CommandError::Calibration(
            CalibrationError::InsufficientPoints {
                found: 5,
                required: 6
            }
        )
    );
    assert_eq!(*manager.projectors()[0].params(), before);
}

#[test]
fn test_removal_reaches_every_linked_surface() {
    let mut manager = ProjectorManager::new();
    manager.add_projector(Projector::new(1, "Projector 1"));
    let wall = manager.surfaces_mut().insert(SurfaceObject::new("wall", vec![]));
    let floor = manager.surfaces_mut().insert(SurfaceObject::new("floor", vec![]));
    assert!(manager.link(1, wall));
    assert!(manager.link(1, floor));

    for name_args in [
        ("addCalibrationPoint", vec![1.0, 0.0, 0.0]),
        ("addCalibrationPoint", vec![0.0, 1.0, 0.0]),
        ("addCalibrationPoint", vec![1.0, 0.0, 0.0]),
    ] {
        let command = ProjectorCommand::parse(name_args.0, &name_args.1).unwrap();
        manager.apply(1, command).unwrap();
    }
    assert_eq!(manager.projector(1).unwrap().points().len(), 2);
    assert_eq!(manager.surfaces().get(wall).unwrap().calibration_points().len(), 2);

    let remove = ProjectorCommand::parse("removeCalibrationPoint", &[1.0, 0.0, 0.0]).unwrap();
    manager.apply(1, remove).unwrap();

    for handle in [wall, floor] {
        assert_eq!(
            manager.surfaces().get(handle).unwrap().calibration_points(),
            &[DVec3::new(0.0, 1.0, 0.0)]
        );
    }
}

/// Projector at its seed pose with the correspondences of `truth` added.
fn projector_observing(truth: &Truth, world: &[DVec3], solver: SolverConfig) -> Projector {
    let screen = observe(truth, world);
    let mut surfaces = SurfaceTable::new();
    let mut projector = Projector::new(1, "Projector 1");
    projector.set_size(WIDTH, HEIGHT);
    projector.set_eye(truth.eye + DVec3::new(0.2, -0.1, 0.1));
    projector.set_solver_config(solver);

    for (w, s) in world.iter().zip(&screen) {
        projector.add_calibration_point(*w, &mut surfaces);
        assert!(projector.set_calibration_point(*s));
    }
    projector
}

#[test]
fn test_off_centre_principal_point_on_default_solver() {
    let truth = Truth {
        fov: 40.0,
        cx: 0.42,
        cy: 0.57,
        eye: DVec3::new(-5.0, 0.3, 0.4),
        euler: DVec3::new(0.05, -0.04, 0.03),
    };
    let world: Vec<DVec3> = scene_points().into_iter().take(7).collect();
    let solver = SolverConfig {
        seed: Some(3),
        ..SolverConfig::default()
    };
    let mut projector = projector_observing(&truth, &world, solver);

    let result = projector.calibrate().unwrap();
    assert!(result.value <= 0.5, "reprojection error {}", result.value);
    assert!((projector.params().fov - truth.fov).abs() < 1.0, "fov {}", projector.params().fov);
}

#[test]
fn test_moving_a_point_after_calibration_solves_again() {
    let truth = Truth {
        fov: 40.0,
        cx: 0.5,
        cy: 0.5,
        eye: DVec3::new(-5.0, 0.3, 0.4),
        euler: DVec3::new(0.05, -0.04, 0.03),
    };
    let mut projector = projector_observing(&truth, &scene_points(), test_solver());

    // Not calibrated yet: the move only shifts the point.
    projector.take_params_updated();
    assert_eq!(projector.move_calibration_point(40.0, 0.0), Ok(true));
    assert!(!projector.take_params_updated());

    projector.calibrate().unwrap();
    assert!(projector.take_params_updated());

    let selected = projector.points().selected_point().copied().unwrap();
    assert_eq!(projector.move_calibration_point(-40.0, 0.0), Ok(true));
    assert!(projector.take_params_updated());
    assert!(projector.is_calibrated());

    let moved = projector.points().selected_point().copied().unwrap();
    assert!((moved.screen.x - (selected.screen.x - 40.0 / WIDTH as f64)).abs() < 1e-12);
}

#[test]
fn test_six_points_still_calibrate() {
    let truth = Truth {
        fov: 40.0,
        cx: 0.5,
        cy: 0.5,
        eye: DVec3::new(-5.0, 0.3, 0.4),
        euler: DVec3::new(0.05, -0.04, 0.03),
    };
    let world: Vec<DVec3> = scene_points().into_iter().take(6).collect();
    let mut projector = projector_observing(&truth, &world, test_solver());
    assert_eq!(projector.points().set_count(), 6);

    let result = projector.calibrate();
    assert!(result.is_ok(), "{:?}", result);
    assert!(projector.is_calibrated());
}
