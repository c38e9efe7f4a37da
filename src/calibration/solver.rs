//! Pose and intrinsics estimation by multi-start simplex search.
//!
//! The nine unknowns are the vertical field of view, the principal point,
//! the eye position and a yaw/pitch/roll orientation. A coarse grid of
//! principal-point seeds is minimized in parallel, then the best result is
//! refined with smaller steps.

use std::thread;

use argmin::core::{CostFunction, Error};
use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::{DVec2, DVec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::minimizer::{minimize, Minimum, RunFailure, StopCriteria};
use super::points::CorrespondenceStore;
use super::{CalibrationError, MIN_CALIBRATION_POINTS, RECOMMENDED_CALIBRATION_POINTS};
use crate::config::SolverConfig;
use crate::projection::{self, Viewport};
use crate::projector::ProjectorParameters;

/// `(fov, cx, cy, eye.x, eye.y, eye.z, yaw, pitch, roll)`.
pub type PoseVector = [f64; 9];

const COARSE_STEPS: PoseVector = [10.0, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1];
const REFINE_STEPS: PoseVector = [1.0, 0.05, 0.05, 0.01, 0.01, 0.01, 0.01, 0.01, 0.01];

/// Best pose found by a calibration run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverResult {
    pub parameters: PoseVector,
    /// Mean squared reprojection error in pixels².
    pub value: f64,
}

impl SolverResult {
    pub fn fov(&self) -> f64 {
        self.parameters[0]
    }

    pub fn principal_point(&self) -> DVec2 {
        DVec2::new(self.parameters[1], self.parameters[2])
    }

    pub fn eye(&self) -> DVec3 {
        DVec3::new(self.parameters[3], self.parameters[4], self.parameters[5])
    }

    pub fn euler(&self) -> DVec3 {
        DVec3::new(self.parameters[6], self.parameters[7], self.parameters[8])
    }

    /// Writes the pose into `params`, with unit-length target and up.
    pub fn apply_to(&self, params: &mut ProjectorParameters) {
        let (target, up) = projection::orientation_from_euler(self.euler());
        params.fov = self.fov();
        params.principal_point = self.principal_point();
        params.eye = self.eye();
        params.target = target.normalize();
        params.up = up.normalize();
    }
}

/// Mean squared pixel distance between projected and recorded points.
#[derive(Debug, Clone)]
pub struct PoseObjective {
    world: Vec<DVec3>,
    image: Vec<DVec2>,
    viewport: Viewport,
    near: f64,
    far: f64,
}

impl PoseObjective {
    /// Collects the set points of `store`, mapping their normalized screen
    /// coordinates into the projector's pixel space.
    pub fn new(store: &CorrespondenceStore, params: &ProjectorParameters) -> Self {
        let width = params.width as f64;
        let height = params.height as f64;
        let (world, image) = store
            .set_points()
            .map(|p| {
                let pixel = DVec2::new(
                    (p.screen.x + 1.0) / 2.0 * width,
                    (p.screen.y + 1.0) / 2.0 * height,
                );
                (p.world, pixel)
            })
            .unzip();

        Self {
            world,
            image,
            viewport: Viewport::new(width, height),
            near: params.near,
            far: params.far,
        }
    }

    pub fn point_count(&self) -> usize {
        self.world.len()
    }

    pub fn evaluate(&self, pose: &[f64]) -> f64 {
        let eye = DVec3::new(pose[3], pose[4], pose[5]);
        let (target, up) =
            projection::orientation_from_euler(DVec3::new(pose[6], pose[7], pose[8]));

        let view = projection::view_matrix(eye, target, up);
        let projection = projection::asymmetric_frustum(
            pose[0],
            pose[1],
            pose[2],
            self.near,
            self.far,
            self.viewport.width / self.viewport.height,
        );

        let summed: f64 = self
            .world
            .iter()
            .zip(&self.image)
            .map(|(world, pixel)| {
                let projected = projection::project(*world, &view, &projection, &self.viewport);
                (projected.truncate() - *pixel).length_squared()
            })
            .sum();

        summed / self.world.len() as f64
    }
}

impl CostFunction for PoseObjective {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, pose: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.evaluate(pose))
    }
}

/// One start of the coarse search.
#[derive(Debug, Clone, Copy)]
struct StartJob {
    index: usize,
    cx: f64,
    cy: f64,
}

/// What a worker reports back for one start.
#[derive(Debug)]
enum RunEvent {
    Finished { index: usize, minimum: Minimum },
    Failed { index: usize, failure: RunFailure },
}

/// Keep-if-strictly-better reducer over run results.
#[derive(Debug)]
struct BestRecord {
    value: f64,
    parameters: Option<PoseVector>,
}

impl BestRecord {
    fn new() -> Self {
        Self {
            value: f64::INFINITY,
            parameters: None,
        }
    }

    fn offer(&mut self, minimum: &Minimum) -> bool {
        if minimum.value < self.value {
            let mut parameters = [0.0; 9];
            parameters.copy_from_slice(&minimum.point);
            self.value = minimum.value;
            self.parameters = Some(parameters);
            true
        } else {
            false
        }
    }

    /// Folds one worker report into the record. A failed run still offers
    /// the last vertex it evaluated.
    fn record(&mut self, event: RunEvent) {
        match event {
            RunEvent::Finished { index, minimum } => {
                log::debug!(
                    "Start {} finished after {} iterations at {:.4}",
                    index,
                    minimum.iterations,
                    minimum.value
                );
                self.offer(&minimum);
            }
            RunEvent::Failed { index, failure } => {
                log::warn!(
                    "An error occurred during minimization of start {}: {}",
                    index,
                    failure.error
                );
                if let Some(last) = failure.last {
                    self.offer(&last);
                }
            }
        }
    }

    fn result(&self) -> Option<SolverResult> {
        self.parameters.map(|parameters| SolverResult {
            parameters,
            value: self.value,
        })
    }
}

/// Solver for one projector's correspondences.
pub struct PoseSolver<'a> {
    objective: PoseObjective,
    seed_eye: DVec3,
    config: &'a SolverConfig,
}

impl<'a> PoseSolver<'a> {
    /// Checks the point count and snapshots the objective.
    pub fn new(
        store: &CorrespondenceStore,
        params: &ProjectorParameters,
        config: &'a SolverConfig,
    ) -> Result<Self, CalibrationError> {
        let found = store.set_count();
        if found < MIN_CALIBRATION_POINTS {
            return Err(CalibrationError::InsufficientPoints {
                found,
                required: MIN_CALIBRATION_POINTS,
            });
        }
        if found < RECOMMENDED_CALIBRATION_POINTS {
            log::warn!(
                "Calibrating from {} points; use at least {} for better results",
                found,
                RECOMMENDED_CALIBRATION_POINTS
            );
        }

        Ok(Self {
            objective: PoseObjective::new(store, params),
            seed_eye: params.eye,
            config,
        })
    }

    pub fn objective(&self) -> &PoseObjective {
        &self.objective
    }

    fn criteria(&self) -> StopCriteria {
        StopCriteria {
            max_iterations: self.config.max_iterations,
            sd_tolerance: self.config.sd_tolerance,
            target_value: self.config.target_error,
        }
    }

    fn rng_for(&self, stream: u64) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ stream),
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Runs both search phases and returns the best pose.
    pub fn solve(&self) -> Result<SolverResult, CalibrationError> {
        log::info!(
            "Starting calibration with {} points ({} starts on {} workers)",
            self.objective.point_count(),
            self.config.grid_size * self.config.grid_size,
            self.config.workers.max(1)
        );

        let mut best = BestRecord::new();
        self.coarse_search(&mut best);
        self.refine(&mut best);

        let result = best.result().ok_or(CalibrationError::NoConvergence)?;
        log::info!(
            "Minimum found at fov {:.3}, principal point ({:.4}, {:.4}), error {:.4} px²",
            result.fov(),
            result.parameters[1],
            result.parameters[2],
            result.value
        );
        Ok(result)
    }

    fn coarse_search(&self, best: &mut BestRecord) {
        let grid = self.config.grid_size.max(1);
        let (job_tx, job_rx) = unbounded::<StartJob>();
        for i in 0..grid {
            for j in 0..grid {
                let denom = (grid - 1).max(1) as f64;
                let _ = job_tx.send(StartJob {
                    index: i * grid + j,
                    cx: i as f64 / denom,
                    cy: j as f64 / denom,
                });
            }
        }
        drop(job_tx);

        let (event_tx, event_rx) = unbounded::<RunEvent>();
        thread::scope(|scope| {
            for _ in 0..self.config.workers.max(1) {
                let job_rx = job_rx.clone();
                let event_tx = event_tx.clone();
                scope.spawn(move || self.worker_loop(job_rx, event_tx));
            }
            drop(event_tx);

            for event in event_rx.iter() {
                best.record(event);
            }
        });
    }

    fn worker_loop(&self, job_rx: Receiver<StartJob>, event_tx: Sender<RunEvent>) {
        let criteria = self.criteria();
        for job in job_rx.iter() {
            let mut rng = self.rng_for(job.index as u64);
            let fov = self.config.fov_seed + rng.random_range(-1.0..=1.0) * self.config.fov_jitter;
            let start: PoseVector = [
                fov,
                job.cx,
                job.cy,
                self.seed_eye.x,
                self.seed_eye.y,
                self.seed_eye.z,
                0.0,
                0.0,
                0.0,
            ];

            let outcome = minimize(&self.objective, &start, &COARSE_STEPS, &criteria, &mut rng);
            let event = match outcome {
                Ok(minimum) => RunEvent::Finished {
                    index: job.index,
                    minimum,
                },
                Err(failure) => RunEvent::Failed {
                    index: job.index,
                    failure,
                },
            };

            if event_tx.send(event).is_err() {
                return;
            }
        }
    }

    fn refine(&self, best: &mut BestRecord) {
        let criteria = self.criteria();
        let grid = self.config.grid_size.max(1);
        let stream_base = (grid * grid) as u64;

        for run in 0..self.config.refinement_runs {
            let start = match best.parameters {
                Some(p) => p,
                None => return,
            };

            let mut rng = self.rng_for(stream_base + run as u64);
            let outcome = minimize(&self.objective, &start, &REFINE_STEPS, &criteria, &mut rng);
            let minimum = match outcome {
                Ok(minimum) => minimum,
                Err(failure) => {
                    log::warn!("An error occurred during refinement {}: {}", run, failure.error);
                    match failure.last {
                        Some(last) => last,
                        None => continue,
                    }
                }
            };
            if best.offer(&minimum) {
                log::debug!("Refinement {} improved the error to {:.4}", run, minimum.value);
            }
        }
    }
}
