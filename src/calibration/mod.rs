//! Projector pose and lens calibration from 3D/2D correspondences.

mod minimizer;
mod points;
mod solver;

pub use minimizer::{minimize, start_simplex, Minimum, RunFailure, SimplexError, StopCriteria};
pub use points::{AddOutcome, CalibrationPoint, CorrespondenceStore};
pub use solver::{PoseObjective, PoseSolver, PoseVector, SolverResult};

use thiserror::Error;

/// Below this many set points the pose is underdetermined.
pub const MIN_CALIBRATION_POINTS: usize = 6;
/// Fewer set points than this still solve, with a quality warning.
pub const RECOMMENDED_CALIBRATION_POINTS: usize = 7;

/// Errors that abort a calibration, leaving the projector unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("insufficient points: calibration needs at least {required} set points, found {found}")]
    InsufficientPoints { found: usize, required: usize },
    #[error("no minimization run produced a finite reprojection error")]
    NoConvergence,
}
