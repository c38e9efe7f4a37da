//! Picking queries used to select and place calibration points.
//!
//! Query positions are given in [0, 1] output coordinates, with the origin
//! at the bottom-left like window coordinates.

use glam::{DVec2, DVec3};

use crate::calibration::{CalibrationPoint, CorrespondenceStore};
use crate::projection;
use crate::projector::ProjectorParameters;
use crate::render::DepthBuffer;
use crate::surface::{SurfaceHandle, SurfaceTable};

fn to_pixels(params: &ProjectorParameters, x: f64, y: f64) -> DVec2 {
    DVec2::new(x * params.width as f64, y * params.height as f64)
}

/// Index of the point projecting closest to `pixel`.
pub fn nearest_projected(
    params: &ProjectorParameters,
    points: &[CalibrationPoint],
    pixel: DVec2,
) -> Option<usize> {
    let view = params.view_matrix();
    let proj = params.projection_matrix();
    let viewport = params.viewport();

    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let projected = projection::project(p.world, &view, &proj, &viewport).truncate();
            (i, projected.distance(pixel))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

pub fn pick_calibration_point(
    params: &ProjectorParameters,
    store: &CorrespondenceStore,
    x: f64,
    y: f64,
) -> Option<DVec3> {
    let index = nearest_projected(params, store.points(), to_pixels(params, x, y))?;
    store.get(index).map(|p| p.world)
}

/// Depth under the query, `None` when nothing was rendered there.
fn depth_at(params: &ProjectorParameters, depth: &DepthBuffer, pixel: DVec2) -> Option<f64> {
    if pixel.x < 0.0 || pixel.y < 0.0 {
        return None;
    }
    // The depth buffer may come from a render at another size.
    let sx = (pixel.x / params.width as f64 * depth.width as f64) as u32;
    let sy = (pixel.y / params.height as f64 * depth.height as f64) as u32;
    let value = depth.sample(sx, sy)?;
    if value >= DepthBuffer::FAR {
        return None;
    }
    Some(value as f64)
}

/// Nearest mesh vertex, in world space, to the surface point under the query.
pub fn pick_vertex(
    params: &ProjectorParameters,
    linked: &[SurfaceHandle],
    surfaces: &SurfaceTable,
    depth: &DepthBuffer,
    x: f64,
    y: f64,
) -> Option<DVec3> {
    let pixel = to_pixels(params, x, y);
    let z = depth_at(params, depth, pixel)?;
    let window = pixel.extend(z);

    let view = params.view_matrix();
    let proj = params.projection_matrix();
    let viewport = params.viewport();

    let mut best: Option<(f64, DVec3)> = None;
    for surface in linked.iter().filter_map(|h| surfaces.get(*h)) {
        let local = projection::unproject(window, &(view * surface.model), &proj, &viewport);
        if let Some((distance, vertex)) = surface.pick_vertex(local) {
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, surface.model.transform_point3(vertex)));
            }
        }
    }
    best.map(|(_, vertex)| vertex)
}

/// Runs both picks and keeps the result projecting closer to the query,
/// preferring the calibration point on ties.
pub fn pick_vertex_or_calibration_point(
    params: &ProjectorParameters,
    store: &CorrespondenceStore,
    linked: &[SurfaceHandle],
    surfaces: &SurfaceTable,
    depth: &DepthBuffer,
    x: f64,
    y: f64,
) -> Option<DVec3> {
    let vertex = pick_vertex(params, linked, surfaces, depth, x, y);
    let point = pick_calibration_point(params, store, x, y);

    match (vertex, point) {
        (None, None) => None,
        (Some(v), None) => Some(v),
        (None, Some(p)) => Some(p),
        (Some(v), Some(p)) => {
            let pixel = to_pixels(params, x, y);
            let distance = |world: DVec3| params.project(world).truncate().distance(pixel);
            if distance(p) <= distance(v) {
                Some(p)
            } else {
                Some(v)
            }
        }
    }
}

/// World position under the query and its view-space depth.
pub fn pick_fragment(
    params: &ProjectorParameters,
    depth: &DepthBuffer,
    x: f64,
    y: f64,
) -> Option<(DVec3, f64)> {
    let pixel = to_pixels(params, x, y);
    let z = depth_at(params, depth, pixel)?;

    let view = params.view_matrix();
    let world = projection::unproject(
        pixel.extend(z),
        &view,
        &params.projection_matrix(),
        &params.viewport(),
    );
    let view_depth = view.transform_point3(world).z;
    Some((world, view_depth))
}
