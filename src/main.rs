//! Command-line calibration driver.
//!
//! Loads a project, solves the pose of every projector that has calibration
//! points and writes the project back.
//!
//! Usage: `projmap-core <project.json|project.projmap> [output]`

use std::path::PathBuf;
use std::process::ExitCode;

use projmap_core::export::{load_project, CalibrationExporter};
use projmap_core::projector::ProjectorManager;

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut args = std::env::args().skip(1);
    let Some(input) = args.next().map(PathBuf::from) else {
        log::error!("Usage: projmap-core <project> [output]");
        return ExitCode::FAILURE;
    };
    let output = args.next().map(PathBuf::from).unwrap_or_else(|| input.clone());

    let mut project = match load_project(&input) {
        Ok(project) => project,
        Err(e) => {
            log::error!("Failed to load project {}: {}", input.display(), e);
            return ExitCode::FAILURE;
        }
    };
    log::info!("Loaded project '{}' with {} projectors", project.name, project.projectors.len());

    let mut manager = ProjectorManager::from_project(&project);
    let calibrated = manager.calibrate_all();
    log::info!("Calibrated {} of {} projectors", calibrated, manager.count());

    manager.update_project(&mut project);
    if let Err(e) = CalibrationExporter::save_project(&project, &output) {
        log::error!("Failed to save project {}: {}", output.display(), e);
        return ExitCode::FAILURE;
    }
    log::info!("Saved project to {}", output.display());

    ExitCode::SUCCESS
}
