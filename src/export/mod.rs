//! Export module for calibration data and blend maps.

use std::io;
use std::path::Path;

use crate::blending::BlendMap;
use crate::calibration::CalibrationPoint;
use crate::config::ProjectConfig;

fn other<E>(e: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::Other, e)
}

fn is_json(path: &Path) -> bool {
    path.extension().map(|e| e == "json").unwrap_or(false)
}

/// Export calibration data to various formats.
pub struct CalibrationExporter;

impl CalibrationExporter {
    /// Export project configuration to XML (.projmap file).
    pub fn export_xml(project: &ProjectConfig, path: &Path) -> io::Result<()> {
        let xml = quick_xml::se::to_string(project).map_err(other)?;
        std::fs::write(path, xml)
    }

    /// Export project configuration to JSON.
    pub fn export_json(project: &ProjectConfig, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(project).map_err(other)?;
        std::fs::write(path, json)
    }

    /// Saves a project as JSON or XML depending on the file extension.
    pub fn save_project(project: &ProjectConfig, path: &Path) -> io::Result<()> {
        if is_json(path) {
            Self::export_json(project, path)
        } else {
            Self::export_xml(project, path)
        }
    }

    /// Export the packed blend map as a 16-bit grayscale PNG, one cell per pixel.
    pub fn export_blend_map_16bit(map: &BlendMap, path: &Path) -> io::Result<()> {
        let img = image::ImageBuffer::<image::Luma<u16>, Vec<u16>>::from_raw(
            map.width,
            map.height,
            map.cells.clone(),
        )
        .ok_or_else(|| other("blend map size does not match its cells"))?;

        img.save(path).map_err(other)
    }

    /// Reads back a blend map written by [`Self::export_blend_map_16bit`].
    pub fn load_blend_map_16bit(path: &Path) -> io::Result<BlendMap> {
        let img = image::open(path).map_err(other)?.into_luma16();
        Ok(BlendMap {
            width: img.width(),
            height: img.height(),
            cells: img.into_raw(),
        })
    }

    /// Binary snapshot of a projector's correspondences.
    pub fn export_calibration_points(points: &[CalibrationPoint], path: &Path) -> io::Result<()> {
        let bytes = bincode::serialize(points).map_err(other)?;
        std::fs::write(path, bytes)
    }

    pub fn load_calibration_points(path: &Path) -> io::Result<Vec<CalibrationPoint>> {
        let bytes = std::fs::read(path)?;
        bincode::deserialize(&bytes).map_err(other)
    }
}

/// Load project configuration.
pub fn load_project(path: &Path) -> io::Result<ProjectConfig> {
    let contents = std::fs::read_to_string(path)?;

    if is_json(path) {
        serde_json::from_str(&contents).map_err(other)
    } else {
        quick_xml::de::from_str(&contents).map_err(other)
    }
}
