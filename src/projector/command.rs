//! Typed parameter surface of a projector.
//!
//! Every externally settable attribute is a [`ProjectorCommand`] variant.
//! [`ProjectorCommand::parse`] bridges loosely typed `(name, values)` pairs,
//! such as those read from a control protocol, onto the typed variants, and
//! [`Projector::attribute`] serves the matching reads.

use glam::{DVec2, DVec3};
use thiserror::Error;

use super::Projector;
use crate::calibration::CalibrationError;
use crate::surface::SurfaceTable;

/// Errors from building or applying a projector command.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("{command} expects {expected} values, got {found}")]
    WrongArgumentCount {
        command: String,
        expected: usize,
        found: usize,
    },
    #[error("invalid value for {command}: {reason}")]
    InvalidValue { command: String, reason: String },
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("no projector with id {0}")]
    UnknownProjector(u32),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

/// Which calibration point a removal targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointQuery {
    /// Nearest point after projection, in output pixels.
    Screen(DVec2),
    /// Point with exactly this world position.
    World(DVec3),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectorCommand {
    SetEye(DVec3),
    SetTarget(DVec3),
    SetUp(DVec3),
    SetFov(f64),
    SetPrincipalPoint(DVec2),
    SetSize { width: u32, height: u32 },
    SetNear(f64),
    SetFar(f64),
    MoveEye(DVec3),
    MoveTarget(DVec3),
    RotateAroundTarget { yaw: f64, pitch: f64 },
    RotateAroundPoint { yaw: f64, pitch: f64, point: DVec3 },
    Pan(DVec3),
    Forward(f64),
    AddCalibrationPoint(DVec3),
    MoveCalibrationPoint { dx: f64, dy: f64 },
    SetCalibrationPoint(DVec2),
    RemoveCalibrationPoint { query: PointQuery, unless_set: bool },
    SelectNextCalibrationPoint,
    SelectPreviousCalibrationPoint,
    DeselectCalibrationPoint,
    SetCalibrationPoints(Vec<[f64; 6]>),
    SetBlendWidth(f64),
    SetBlendPrecision(f64),
    Calibrate,
}

fn expect_at_least(command: &str, args: &[f64], expected: usize) -> Result<(), CommandError> {
    if args.len() < expected {
        return Err(CommandError::WrongArgumentCount {
            command: command.to_string(),
            expected,
            found: args.len(),
        });
    }
    Ok(())
}

fn invalid(command: &str, reason: impl Into<String>) -> CommandError {
    CommandError::InvalidValue {
        command: command.to_string(),
        reason: reason.into(),
    }
}

fn vec3(command: &str, args: &[f64]) -> Result<DVec3, CommandError> {
    expect_at_least(command, args, 3)?;
    Ok(DVec3::new(args[0], args[1], args[2]))
}

fn vec2(command: &str, args: &[f64]) -> Result<DVec2, CommandError> {
    expect_at_least(command, args, 2)?;
    Ok(DVec2::new(args[0], args[1]))
}

fn scalar(command: &str, args: &[f64]) -> Result<f64, CommandError> {
    expect_at_least(command, args, 1)?;
    Ok(args[0])
}

fn dimension(command: &str, value: f64) -> Result<u32, CommandError> {
    if value < 1.0 || value > u32::MAX as f64 {
        return Err(invalid(command, format!("{} is not a valid size", value)));
    }
    Ok(value as u32)
}

impl ProjectorCommand {
    /// Builds a command from an attribute name and its values.
    pub fn parse(name: &str, args: &[f64]) -> Result<Self, CommandError> {
        if let Some(bad) = args.iter().find(|v| !v.is_finite()) {
            return Err(invalid(name, format!("non-finite value {}", bad)));
        }

        let command = match name {
            "eye" => Self::SetEye(vec3(name, args)?),
            "target" => Self::SetTarget(vec3(name, args)?),
            "up" => Self::SetUp(vec3(name, args)?),
            "fov" => {
                let fov = scalar(name, args)?;
                if fov <= 0.0 || fov >= 180.0 {
                    return Err(invalid(name, "field of view must be within (0, 180) degrees"));
                }
                Self::SetFov(fov)
            }
            "principalPoint" => Self::SetPrincipalPoint(vec2(name, args)?),
            "size" => {
                expect_at_least(name, args, 2)?;
                Self::SetSize {
                    width: dimension(name, args[0])?,
                    height: dimension(name, args[1])?,
                }
            }
            "near" => Self::SetNear(scalar(name, args)?),
            "far" => Self::SetFar(scalar(name, args)?),
            "moveEye" => Self::MoveEye(vec3(name, args)?),
            "moveTarget" => Self::MoveTarget(vec3(name, args)?),
            "rotateAroundTarget" => {
                expect_at_least(name, args, 3)?;
                Self::RotateAroundTarget {
                    yaw: args[0],
                    pitch: args[1],
                }
            }
            "rotateAroundPoint" => {
                expect_at_least(name, args, 6)?;
                Self::RotateAroundPoint {
                    yaw: args[0],
                    pitch: args[1],
                    point: DVec3::new(args[3], args[4], args[5]),
                }
            }
            "pan" => Self::Pan(vec3(name, args)?),
            "forward" => {
                if args.len() != 1 {
                    return Err(CommandError::WrongArgumentCount {
                        command: name.to_string(),
                        expected: 1,
                        found: args.len(),
                    });
                }
                Self::Forward(args[0])
            }
            "addCalibrationPoint" => Self::AddCalibrationPoint(vec3(name, args)?),
            "moveCalibrationPoint" => {
                let delta = vec2(name, args)?;
                Self::MoveCalibrationPoint {
                    dx: delta.x,
                    dy: delta.y,
                }
            }
            "setCalibrationPoint" => Self::SetCalibrationPoint(vec2(name, args)?),
            "removeCalibrationPoint" => {
                expect_at_least(name, args, 2)?;
                let query = if args.len() == 2 {
                    PointQuery::Screen(DVec2::new(args[0], args[1]))
                } else {
                    PointQuery::World(DVec3::new(args[0], args[1], args[2]))
                };
                Self::RemoveCalibrationPoint {
                    query,
                    unless_set: args.get(3).map_or(false, |v| *v != 0.0),
                }
            }
            "selectNextCalibrationPoint" => Self::SelectNextCalibrationPoint,
            "selectPreviousCalibrationPoint" => Self::SelectPreviousCalibrationPoint,
            "deselectCalibrationPoint" => Self::DeselectCalibrationPoint,
            "calibrationPoints" => {
                if args.len() % 6 != 0 {
                    return Err(CommandError::WrongArgumentCount {
                        command: name.to_string(),
                        expected: args.len() / 6 * 6 + 6,
                        found: args.len(),
                    });
                }
                Self::SetCalibrationPoints(
                    args.chunks_exact(6)
                        .map(|c| [c[0], c[1], c[2], c[3], c[4], c[5]])
                        .collect(),
                )
            }
            "blendWidth" => {
                let width = scalar(name, args)?;
                if width < 0.0 {
                    return Err(invalid(name, "blend width cannot be negative"));
                }
                Self::SetBlendWidth(width)
            }
            "blendPrecision" => Self::SetBlendPrecision(scalar(name, args)?),
            "calibrate" => Self::Calibrate,
            other => return Err(CommandError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

impl Projector {
    pub fn apply(
        &mut self,
        command: ProjectorCommand,
        surfaces: &mut SurfaceTable,
    ) -> Result<(), CommandError> {
        match command {
            ProjectorCommand::SetEye(eye) => self.set_eye(eye),
            ProjectorCommand::SetTarget(target) => self.set_target(target),
            ProjectorCommand::SetUp(up) => self.set_up(up),
            ProjectorCommand::SetFov(fov) => self.set_fov(fov),
            ProjectorCommand::SetPrincipalPoint(pp) => self.set_principal_point(pp),
            ProjectorCommand::SetSize { width, height } => self.set_size(width, height),
            ProjectorCommand::SetNear(near) => self.set_near(near),
            ProjectorCommand::SetFar(far) => self.set_far(far),
            ProjectorCommand::MoveEye(delta) => self.move_eye(delta),
            ProjectorCommand::MoveTarget(delta) => self.move_target(delta),
            ProjectorCommand::RotateAroundTarget { yaw, pitch } => {
                self.rotate_around_target(yaw, pitch)
            }
            ProjectorCommand::RotateAroundPoint { yaw, pitch, point } => {
                self.rotate_around_point(yaw, pitch, point)
            }
            ProjectorCommand::Pan(delta) => self.pan(delta),
            ProjectorCommand::Forward(distance) => self.forward(distance),
            ProjectorCommand::AddCalibrationPoint(world) => {
                self.add_calibration_point(world, surfaces);
            }
            ProjectorCommand::MoveCalibrationPoint { dx, dy } => {
                self.move_calibration_point(dx, dy)?;
            }
            ProjectorCommand::SetCalibrationPoint(screen) => {
                if !self.set_calibration_point(screen) {
                    log::warn!("Projector {}: no calibration point selected", self.id);
                }
            }
            ProjectorCommand::RemoveCalibrationPoint { query, unless_set } => {
                self.remove_calibration_point(query, unless_set, surfaces);
            }
            ProjectorCommand::SelectNextCalibrationPoint => self.select_next_calibration_point(),
            ProjectorCommand::SelectPreviousCalibrationPoint => {
                self.select_previous_calibration_point()
            }
            ProjectorCommand::DeselectCalibrationPoint => self.deselect_calibration_point(),
            ProjectorCommand::SetCalibrationPoints(points) => {
                self.set_calibration_points(&points, surfaces)
            }
            ProjectorCommand::SetBlendWidth(width) => self.set_blend_width(width),
            ProjectorCommand::SetBlendPrecision(precision) => self.set_blend_precision(precision),
            ProjectorCommand::Calibrate => {
                self.calibrate()?;
            }
        }
        Ok(())
    }

    /// Current value of a readable attribute, flattened to numbers.
    pub fn attribute(&self, name: &str) -> Result<Vec<f64>, CommandError> {
        let params = self.params();
        let values = match name {
            "eye" => params.eye.to_array().to_vec(),
            "target" => params.target.to_array().to_vec(),
            "up" => params.up.to_array().to_vec(),
            "fov" => vec![params.fov],
            "principalPoint" => params.principal_point.to_array().to_vec(),
            "size" => vec![params.width as f64, params.height as f64],
            "near" => vec![params.near],
            "far" => vec![params.far],
            "calibrationPoints" => self.calibration_points().into_iter().flatten().collect(),
            "blendWidth" => vec![self.blend().width],
            "blendPrecision" => vec![self.blend().precision],
            other => return Err(CommandError::UnknownCommand(other.to_string())),
        };
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_checks_argument_count() {
        assert_eq!(
            ProjectorCommand::parse("eye", &[1.0, 2.0]),
            Err(CommandError::WrongArgumentCount {
                command: "eye".to_string(),
                expected: 3,
                found: 2
            })
        );
        assert!(matches!(
            ProjectorCommand::parse("forward", &[1.0, 2.0]),
            Err(CommandError::WrongArgumentCount { .. })
        ));
        assert!(matches!(
            ProjectorCommand::parse("calibrationPoints", &[0.0; 7]),
            Err(CommandError::WrongArgumentCount { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(matches!(
            ProjectorCommand::parse("fov", &[0.0]),
            Err(CommandError::InvalidValue { .. })
        ));
        assert!(matches!(
            ProjectorCommand::parse("size", &[0.0, 1080.0]),
            Err(CommandError::InvalidValue { .. })
        ));
        assert!(matches!(
            ProjectorCommand::parse("eye", &[f64::NAN, 0.0, 0.0]),
            Err(CommandError::InvalidValue { .. })
        ));
        assert_eq!(
            ProjectorCommand::parse("colorTemperature", &[6500.0]),
            Err(CommandError::UnknownCommand("colorTemperature".to_string()))
        );
    }

    #[test]
    fn test_parse_removal_forms() {
        assert_eq!(
            ProjectorCommand::parse("removeCalibrationPoint", &[10.0, 20.0]),
            Ok(ProjectorCommand::RemoveCalibrationPoint {
                query: PointQuery::Screen(DVec2::new(10.0, 20.0)),
                unless_set: false
            })
        );
        assert_eq!(
            ProjectorCommand::parse("removeCalibrationPoint", &[1.0, 2.0, 3.0, 1.0]),
            Ok(ProjectorCommand::RemoveCalibrationPoint {
                query: PointQuery::World(DVec3::new(1.0, 2.0, 3.0)),
                unless_set: true
            })
        );
    }

    #[test]
    fn test_apply_and_read_back() {
        let mut surfaces = SurfaceTable::new();
        let mut projector = Projector::new(1, "p");

        for (name, args) in [
            ("eye", vec![1.0, 2.0, 3.0]),
            ("fov", vec![50.0]),
            ("size", vec![800.0, 600.0]),
            ("calibrationPoints", vec![1.0, 1.0, 1.0, 0.5, 0.5, 1.0]),
        ] {
            let command = ProjectorCommand::parse(name, &args).unwrap();
            projector.apply(command, &mut surfaces).unwrap();
            assert_eq!(projector.attribute(name).unwrap(), args);
        }
    }

    #[test]
    fn test_calibrate_command_surfaces_error() {
        let mut surfaces = SurfaceTable::new();
        let mut projector = Projector::new(1, "p");
        let result = projector.apply(ProjectorCommand::Calibrate, &mut surfaces);
        assert_eq!(
            result,
            Err(CommandError::Calibration(CalibrationError::InsufficientPoints {
                found: 0,
                required: 6
            }))
        );
    }
}
