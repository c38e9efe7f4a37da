//! Configuration and serialization module.

use serde::{Deserialize, Serialize};

/// Project configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project name.
    pub name: String,
    /// Width of the shared blend map.
    pub blend_map_width: u32,
    /// Height of the shared blend map.
    pub blend_map_height: u32,
    /// Pose solver settings shared by every projector.
    pub solver: SolverConfig,
    /// List of projectors.
    pub projectors: Vec<ProjectorConfig>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "New Project".to_string(),
            blend_map_width: 2048,
            blend_map_height: 2048,
            solver: SolverConfig::default(),
            projectors: vec![ProjectorConfig::default()],
        }
    }
}

/// Per-projector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectorConfig {
    /// Unique ID.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Output resolution width.
    pub width: u32,
    /// Output resolution height.
    pub height: u32,
    pub eye: [f64; 3],
    pub target: [f64; 3],
    pub up: [f64; 3],
    /// Vertical field of view in degrees.
    pub fov: f64,
    /// Principal point in [0, 1].
    pub principal_point: [f64; 2],
    pub near: f64,
    pub far: f64,
    /// Edge blend settings.
    pub blend: BlendConfig,
    /// Stored correspondences as `(wx, wy, wz, sx, sy, is_set)`.
    pub calibration_points: Vec<[f64; 6]>,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            id: 1,
            name: "Projector 1".to_string(),
            width: 1920,
            height: 1080,
            eye: [2.0, 2.0, 1.0],
            target: [0.0, 0.0, 0.0],
            up: [0.0, 0.0, 1.0],
            fov: 35.0,
            principal_point: [0.5, 0.5],
            near: 0.1,
            far: 100.0,
            blend: BlendConfig::default(),
            calibration_points: Vec::new(),
        }
    }
}

/// Soft-edge blending settings for a projector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    /// Width of the soft edge as a fraction of the output size. 0 disables softening.
    pub width: f64,
    /// Tessellation precision forwarded to the renderer.
    pub precision: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            width: 0.05,
            precision: 0.1,
        }
    }
}

/// Pose solver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Principal-point seeds per axis of the coarse grid.
    pub grid_size: usize,
    /// Concurrent minimizer workers.
    pub workers: usize,
    pub max_iterations: u64,
    /// Standard deviation of the simplex vertex costs below which a run
    /// has converged.
    pub sd_tolerance: f64,
    /// Reprojection error (pixels²) below which a run stops early.
    pub target_error: f64,
    /// Refinement runs started from the best coarse result.
    pub refinement_runs: usize,
    /// Centre of the randomized starting field of view, in degrees.
    pub fov_seed: f64,
    /// Half-width of the randomized starting field of view.
    pub fov_jitter: f64,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            grid_size: 10,
            workers: 4,
            max_iterations: 10_000,
            sd_tolerance: 1e-6,
            target_error: 0.5,
            refinement_runs: 8,
            fov_seed: 35.0,
            fov_jitter: 16.0,
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: ProjectorConfig = serde_json::from_str(r#"{"id": 3, "fov": 50.0}"#).unwrap();
        assert_eq!(config.id, 3);
        assert_eq!(config.fov, 50.0);
        assert_eq!(config.width, 1920);
        assert_eq!(config.blend, BlendConfig::default());
        assert!(config.calibration_points.is_empty());
    }

    #[test]
    fn test_solver_defaults() {
        let solver = SolverConfig::default();
        assert_eq!(solver.grid_size * solver.grid_size, 100);
        assert_eq!(solver.workers, 4);
        assert_eq!(solver.refinement_runs, 8);
        assert!(solver.seed.is_none());
    }
}
