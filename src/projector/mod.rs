//! Projector state, calibration and blending.

mod command;
mod parameters;

pub use command::{CommandError, PointQuery, ProjectorCommand};
pub use parameters::ProjectorParameters;

use glam::{DMat4, DVec2, DVec3};

use crate::blending::{BlendError, BlendMap, ProjectorContribution};
use crate::calibration::{
    AddOutcome, CalibrationError, CalibrationPoint, CorrespondenceStore, PoseSolver, SolverResult,
};
use crate::config::{BlendConfig, ProjectConfig, ProjectorConfig, SolverConfig};
use crate::picking;
use crate::render::{
    DepthBuffer, RenderError, RenderRequest, RenderedFrame, ShadingMode, SurfaceRenderer,
};
use crate::surface::{SurfaceHandle, SurfaceObject, SurfaceTable};

/// The UV pass is rendered at this fraction of the largest viewport.
const BLEND_RENDER_DIVISOR: u32 = 4;

/// A calibrated output: pose, lens, correspondences and linked surfaces.
#[derive(Debug, Clone)]
pub struct Projector {
    pub id: u32,
    pub name: String,
    params: ProjectorParameters,
    points: CorrespondenceStore,
    surfaces: Vec<SurfaceHandle>,
    blend: BlendConfig,
    solver: SolverConfig,
    /// A calibration succeeded and moving a point should re-solve.
    calibrated_once: bool,
    params_updated: bool,
}

impl Projector {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            params: ProjectorParameters::default(),
            points: CorrespondenceStore::new(),
            surfaces: Vec::new(),
            blend: BlendConfig::default(),
            solver: SolverConfig::default(),
            calibrated_once: false,
            params_updated: true,
        }
    }

    pub fn from_config(config: &ProjectorConfig, solver: &SolverConfig) -> Self {
        let mut projector = Self::new(config.id, config.name.clone());
        projector.params = ProjectorParameters {
            eye: DVec3::from_array(config.eye),
            target: DVec3::from_array(config.target),
            up: DVec3::from_array(config.up),
            fov: config.fov,
            principal_point: DVec2::from_array(config.principal_point),
            near: config.near,
            far: config.far,
            width: config.width,
            height: config.height,
        };
        projector.params.correct_degenerate_target();
        projector.blend = config.blend;
        projector.solver = solver.clone();
        projector.points.replace(
            config
                .calibration_points
                .iter()
                .copied()
                .map(CalibrationPoint::from_tuple)
                .collect(),
        );
        projector
    }

    pub fn to_config(&self) -> ProjectorConfig {
        ProjectorConfig {
            id: self.id,
            name: self.name.clone(),
            width: self.params.width,
            height: self.params.height,
            eye: self.params.eye.to_array(),
            target: self.params.target.to_array(),
            up: self.params.up.to_array(),
            fov: self.params.fov,
            principal_point: self.params.principal_point.to_array(),
            near: self.params.near,
            far: self.params.far,
            blend: self.blend,
            calibration_points: self.points.export_tuples(),
        }
    }

    pub fn params(&self) -> &ProjectorParameters {
        &self.params
    }

    pub fn points(&self) -> &CorrespondenceStore {
        &self.points
    }

    pub fn surfaces(&self) -> &[SurfaceHandle] {
        &self.surfaces
    }

    pub fn blend(&self) -> &BlendConfig {
        &self.blend
    }

    pub fn solver_config(&self) -> &SolverConfig {
        &self.solver
    }

    pub fn set_solver_config(&mut self, solver: SolverConfig) {
        self.solver = solver;
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated_once
    }

    /// Returns and clears the "parameters changed" flag.
    pub fn take_params_updated(&mut self) -> bool {
        std::mem::take(&mut self.params_updated)
    }

    pub fn view_matrix(&self) -> DMat4 {
        self.params.view_matrix()
    }

    pub fn projection_matrix(&self) -> DMat4 {
        self.params.projection_matrix()
    }

    fn update_params(&mut self, update: impl FnOnce(&mut ProjectorParameters)) {
        update(&mut self.params);
        self.params.correct_degenerate_target();
        self.params_updated = true;
    }

    pub fn set_eye(&mut self, eye: DVec3) {
        self.update_params(|p| p.eye = eye);
    }

    pub fn set_target(&mut self, target: DVec3) {
        self.update_params(|p| p.target = target);
    }

    pub fn set_up(&mut self, up: DVec3) {
        self.update_params(|p| p.up = up);
    }

    pub fn set_fov(&mut self, fov: f64) {
        self.update_params(|p| p.fov = fov);
    }

    pub fn set_principal_point(&mut self, principal_point: DVec2) {
        self.update_params(|p| p.principal_point = principal_point);
    }

    /// Sets the output resolution. Zero sizes are ignored.
    pub fn set_size(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.update_params(|p| {
            p.width = width;
            p.height = height;
        });
    }

    pub fn set_near(&mut self, near: f64) {
        self.update_params(|p| p.near = near);
    }

    pub fn set_far(&mut self, far: f64) {
        self.update_params(|p| p.far = far);
    }

    pub fn move_eye(&mut self, delta: DVec3) {
        self.update_params(|p| p.eye += delta);
    }

    pub fn move_target(&mut self, delta: DVec3) {
        self.update_params(|p| p.target += delta);
    }

    pub fn forward(&mut self, distance: f64) {
        self.update_params(|p| p.forward(distance));
    }

    pub fn pan(&mut self, delta: DVec3) {
        self.update_params(|p| p.pan(delta));
    }

    pub fn rotate_around_target(&mut self, yaw: f64, pitch: f64) {
        self.update_params(|p| p.rotate_around_target(yaw, pitch));
    }

    pub fn rotate_around_point(&mut self, yaw: f64, pitch: f64, point: DVec3) {
        self.update_params(|p| p.rotate_around_point(yaw, pitch, point));
    }

    pub fn set_blend_width(&mut self, width: f64) {
        self.blend.width = width;
    }

    pub fn set_blend_precision(&mut self, precision: f64) {
        self.blend.precision = precision;
    }

    /// Links a surface and sends it every existing calibration point.
    pub fn link_to(&mut self, handle: SurfaceHandle, surfaces: &mut SurfaceTable) -> bool {
        if self.surfaces.contains(&handle) {
            return false;
        }
        let Some(surface) = surfaces.get_mut(handle) else {
            return false;
        };

        for point in self.points.points() {
            surface.add_calibration_point(point.world);
        }
        self.surfaces.push(handle);
        true
    }

    pub fn unlink_from(&mut self, handle: SurfaceHandle) -> bool {
        let before = self.surfaces.len();
        self.surfaces.retain(|h| *h != handle);
        self.surfaces.len() != before
    }

    /// Drops links whose surface no longer exists.
    pub fn prune_stale_links(&mut self, surfaces: &SurfaceTable) {
        self.surfaces.retain(|h| surfaces.contains(*h));
    }

    fn for_each_surface(&self, surfaces: &mut SurfaceTable, mut f: impl FnMut(&mut SurfaceObject)) {
        for handle in &self.surfaces {
            if let Some(surface) = surfaces.get_mut(*handle) {
                f(surface);
            }
        }
    }

    /// Adds a correspondence for `world`, or selects the existing one.
    pub fn add_calibration_point(
        &mut self,
        world: DVec3,
        surfaces: &mut SurfaceTable,
    ) -> AddOutcome {
        let outcome = self.points.add(world);
        if let AddOutcome::Added(_) = outcome {
            self.for_each_surface(surfaces, |s| s.add_calibration_point(world));
        }
        outcome
    }

    /// Sets the screen position of the selected point in [-1, 1] coordinates.
    pub fn set_calibration_point(&mut self, screen: DVec2) -> bool {
        if !self.points.set_screen(screen) {
            return false;
        }
        self.calibrated_once = false;
        true
    }

    /// Moves the selected point by a pixel offset, re-solving the pose when
    /// a calibration already succeeded.
    pub fn move_calibration_point(&mut self, dx: f64, dy: f64) -> Result<bool, CalibrationError> {
        let delta = DVec2::new(dx / self.params.width as f64, dy / self.params.height as f64);
        if !self.points.offset_screen(delta) {
            return Ok(false);
        }

        if self.calibrated_once {
            self.calibrate()?;
        }
        Ok(true)
    }

    /// Removes a correspondence by nearest projection (pixel query) or by
    /// exact world position. With `unless_set`, points that already have a
    /// screen position are kept.
    pub fn remove_calibration_point(
        &mut self,
        query: PointQuery,
        unless_set: bool,
        surfaces: &mut SurfaceTable,
    ) -> Option<CalibrationPoint> {
        let index = match query {
            PointQuery::Screen(pixel) => {
                picking::nearest_projected(&self.params, self.points.points(), pixel)
            }
            PointQuery::World(world) => {
                self.calibrated_once = false;
                self.points.find(world)
            }
        }?;

        if unless_set && self.points.get(index).map_or(false, |p| p.is_set) {
            return None;
        }

        let removed = self.points.remove_at(index)?;
        if let PointQuery::World(_) = query {
            self.points.deselect();
        }
        self.for_each_surface(surfaces, |s| s.remove_calibration_point(removed.world));
        self.calibrated_once = false;
        Some(removed)
    }

    pub fn select_next_calibration_point(&mut self) {
        self.points.select_next();
    }

    pub fn select_previous_calibration_point(&mut self) {
        self.points.select_previous();
    }

    pub fn deselect_calibration_point(&mut self) {
        self.points.deselect();
    }

    /// Correspondences as `(wx, wy, wz, sx, sy, is_set)` tuples.
    pub fn calibration_points(&self) -> Vec<[f64; 6]> {
        self.points.export_tuples()
    }

    /// Replaces every correspondence and resynchronizes linked surfaces.
    pub fn set_calibration_points(&mut self, tuples: &[[f64; 6]], surfaces: &mut SurfaceTable) {
        let old: Vec<DVec3> = self.points.points().iter().map(|p| p.world).collect();
        self.for_each_surface(surfaces, |s| {
            old.iter().for_each(|w| s.remove_calibration_point(*w))
        });

        self.points
            .replace(tuples.iter().copied().map(CalibrationPoint::from_tuple).collect());
        self.calibrated_once = false;

        let new: Vec<DVec3> = self.points.points().iter().map(|p| p.world).collect();
        self.for_each_surface(surfaces, |s| new.iter().for_each(|w| s.add_calibration_point(*w)));
    }

    /// Solves pose and intrinsics from the set correspondences.
    ///
    /// On failure the parameters are left untouched.
    pub fn calibrate(&mut self) -> Result<SolverResult, CalibrationError> {
        let solver = PoseSolver::new(&self.points, &self.params, &self.solver).map_err(|e| {
            log::warn!("Projector {}: {}", self.id, e);
            e
        })?;

        let result = solver.solve().map_err(|e| {
            log::warn!("Projector {}: calibration failed: {}", self.id, e);
            e
        })?;

        self.update_params(|p| result.apply_to(p));
        self.calibrated_once = true;
        log::info!(
            "Projector {}: calibrated with reprojection error {:.4} px²",
            self.id,
            result.value
        );
        Ok(result)
    }

    /// Projects all linked surfaces at the output resolution.
    pub fn render(
        &self,
        renderer: &mut dyn SurfaceRenderer,
        surfaces: &SurfaceTable,
    ) -> Result<RenderedFrame, RenderError> {
        self.render_sized(renderer, surfaces, self.params.width, self.params.height)
    }

    fn render_sized(
        &self,
        renderer: &mut dyn SurfaceRenderer,
        surfaces: &SurfaceTable,
        width: u32,
        height: u32,
    ) -> Result<RenderedFrame, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSize { width, height });
        }

        let projection = crate::projection::asymmetric_frustum(
            self.params.fov,
            self.params.principal_point.x,
            self.params.principal_point.y,
            self.params.near,
            self.params.far,
            width as f64 / height as f64,
        );
        let request = RenderRequest {
            view: self.view_matrix(),
            projection,
            width,
            height,
            surfaces: self.surfaces.iter().filter_map(|h| surfaces.get(*h)).collect(),
        };
        renderer.render(&request)
    }

    /// Asks the renderer to refine linked surfaces near this projector's soft edge.
    pub fn tessellate_for_blending(
        &self,
        renderer: &mut dyn SurfaceRenderer,
        surfaces: &SurfaceTable,
    ) {
        let view = self.view_matrix();
        let projection = self.projection_matrix();
        for surface in self.surfaces.iter().filter_map(|h| surfaces.get(*h)) {
            renderer.tessellate(
                surface,
                &view,
                &projection,
                self.blend.width,
                self.blend.precision,
            );
        }
    }

    /// Renders linked surfaces with primitive-ID shading and lets the
    /// renderer mark the vertices this projector sees.
    pub fn compute_vertex_visibility(
        &self,
        renderer: &mut dyn SurfaceRenderer,
        surfaces: &mut SurfaceTable,
    ) -> Result<(), RenderError> {
        let previous = self.swap_shading(surfaces, ShadingMode::PrimitiveId);
        let frame = self.render(renderer, surfaces);
        restore_shading(surfaces, previous);
        let frame = frame?;

        for surface in self.surfaces.iter().filter_map(|h| surfaces.get(*h)) {
            renderer.transfer_visibility(surface, &frame);
        }
        Ok(())
    }

    /// Hands the renderer this projector's matrices and blend width so it can
    /// weight the vertices marked visible.
    pub fn compute_blending_contribution(
        &self,
        renderer: &mut dyn SurfaceRenderer,
        surfaces: &SurfaceTable,
    ) {
        let view = self.view_matrix();
        let projection = self.projection_matrix();
        for surface in self.surfaces.iter().filter_map(|h| surfaces.get(*h)) {
            renderer.compute_visibility(surface, &view, &projection, self.blend.width);
        }
    }

    /// Sets the shading of every linked surface, returning what it was.
    fn swap_shading(
        &self,
        surfaces: &mut SurfaceTable,
        shading: ShadingMode,
    ) -> Vec<(SurfaceHandle, ShadingMode)> {
        let mut previous = Vec::with_capacity(self.surfaces.len());
        for handle in &self.surfaces {
            if let Some(surface) = surfaces.get_mut(*handle) {
                previous.push((*handle, surface.shading));
                surface.shading = shading;
            }
        }
        previous
    }

    /// Size of the UV pass: a quarter of the largest viewport, with the
    /// output aspect ratio.
    pub fn blend_render_size(&self, max_viewport: (u32, u32)) -> (u32, u32) {
        let (width, height) = (self.params.width as u64, self.params.height as u64);
        let (mut max_w, mut max_h) = (max_viewport.0 as u64, max_viewport.1 as u64);
        if width >= height {
            max_h = max_w * height / width.max(1);
        } else {
            max_w = max_h * width / height.max(1);
        }
        (
            (max_w / BLEND_RENDER_DIVISOR as u64) as u32,
            (max_h / BLEND_RENDER_DIVISOR as u64) as u32,
        )
    }

    /// Adds this projector's coverage to `map`.
    ///
    /// Linked surfaces are switched to UV shading for the pass and restored
    /// afterwards, whatever the outcome.
    pub fn compute_blending_map(
        &self,
        renderer: &mut dyn SurfaceRenderer,
        surfaces: &mut SurfaceTable,
        map: &mut BlendMap,
    ) -> Result<(), BlendError> {
        if map.is_empty() {
            return Err(BlendError::EmptyMap);
        }

        let previous = self.swap_shading(surfaces, ShadingMode::Uv);
        let frame = self.render_uv_pass(renderer, surfaces);
        restore_shading(surfaces, previous);

        let frame = frame.map_err(|e| BlendError::Render(e.to_string()))?;
        let contribution =
            ProjectorContribution::from_uv_frame(&frame, self.blend.width, map.width, map.height)?;
        map.accumulate(&contribution)?;

        log::info!("Projector {}: blending contribution added", self.id);
        Ok(())
    }

    fn render_uv_pass(
        &self,
        renderer: &mut dyn SurfaceRenderer,
        surfaces: &SurfaceTable,
    ) -> Result<RenderedFrame, RenderError> {
        // Settle the renderer on the new shading first.
        self.render(renderer, surfaces)?;

        let (width, height) = self.blend_render_size(renderer.max_viewport_dims());
        self.render_sized(renderer, surfaces, width, height)
    }

    /// World position of the stored point projecting closest to `(x, y)`,
    /// given in [0, 1] output coordinates.
    pub fn pick_calibration_point(&self, x: f64, y: f64) -> Option<DVec3> {
        picking::pick_calibration_point(&self.params, &self.points, x, y)
    }

    pub fn pick_vertex(
        &self,
        x: f64,
        y: f64,
        depth: &DepthBuffer,
        surfaces: &SurfaceTable,
    ) -> Option<DVec3> {
        picking::pick_vertex(&self.params, &self.surfaces, surfaces, depth, x, y)
    }

    pub fn pick_vertex_or_calibration_point(
        &self,
        x: f64,
        y: f64,
        depth: &DepthBuffer,
        surfaces: &SurfaceTable,
    ) -> Option<DVec3> {
        picking::pick_vertex_or_calibration_point(
            &self.params,
            &self.points,
            &self.surfaces,
            surfaces,
            depth,
            x,
            y,
        )
    }

    /// World position and view-space depth of the fragment under `(x, y)`.
    pub fn pick_fragment(&self, x: f64, y: f64, depth: &DepthBuffer) -> Option<(DVec3, f64)> {
        picking::pick_fragment(&self.params, depth, x, y)
    }
}

fn restore_shading(surfaces: &mut SurfaceTable, previous: Vec<(SurfaceHandle, ShadingMode)>) {
    for (handle, shading) in previous {
        if let Some(surface) = surfaces.get_mut(handle) {
            surface.shading = shading;
        }
    }
}

/// Manager for the projectors of a project and the surfaces they share.
#[derive(Debug, Default)]
pub struct ProjectorManager {
    projectors: Vec<Projector>,
    surfaces: SurfaceTable,
}

impl ProjectorManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_project(project: &ProjectConfig) -> Self {
        let mut manager = Self::new();
        for config in &project.projectors {
            manager.add_projector(Projector::from_config(config, &project.solver));
        }
        manager
    }

    /// Writes the current projector state back into `project`.
    pub fn update_project(&self, project: &mut ProjectConfig) {
        project.projectors = self.projectors.iter().map(Projector::to_config).collect();
    }

    pub fn add_projector(&mut self, projector: Projector) {
        self.projectors.push(projector);
    }

    pub fn projectors(&self) -> &[Projector] {
        &self.projectors
    }

    pub fn projectors_mut(&mut self) -> &mut [Projector] {
        &mut self.projectors
    }

    pub fn count(&self) -> usize {
        self.projectors.len()
    }

    pub fn projector(&self, id: u32) -> Option<&Projector> {
        self.projectors.iter().find(|p| p.id == id)
    }

    pub fn surfaces(&self) -> &SurfaceTable {
        &self.surfaces
    }

    pub fn surfaces_mut(&mut self) -> &mut SurfaceTable {
        &mut self.surfaces
    }

    /// Links surface `handle` to projector `id`.
    pub fn link(&mut self, id: u32, handle: SurfaceHandle) -> bool {
        match self.projectors.iter_mut().find(|p| p.id == id) {
            Some(projector) => projector.link_to(handle, &mut self.surfaces),
            None => false,
        }
    }

    /// Runs a command against projector `id`.
    pub fn apply(&mut self, id: u32, command: ProjectorCommand) -> Result<(), CommandError> {
        let projector = self
            .projectors
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(CommandError::UnknownProjector(id))?;
        projector.apply(command, &mut self.surfaces)
    }

    /// Calibrates every projector with enough set points. Returns how many succeeded.
    pub fn calibrate_all(&mut self) -> usize {
        let mut calibrated = 0;
        for projector in &mut self.projectors {
            if projector.points().set_count() == 0 {
                log::info!("Projector {}: no calibration points, skipping", projector.id);
                continue;
            }
            if projector.calibrate().is_ok() {
                calibrated += 1;
            }
        }
        calibrated
    }

    /// Runs the blending passes of every projector.
    ///
    /// Tessellation is reset on all surfaces first. Then, per projector,
    /// vertex visibility is reset and recomputed, the surfaces are
    /// tessellated, the per-vertex contribution is computed and the
    /// projector's coverage is added to `map`, which starts cleared. A
    /// projector whose pass fails is skipped. Returns how many contributed
    /// to the map.
    pub fn compute_blending_map(
        &mut self,
        renderer: &mut dyn SurfaceRenderer,
        map: &mut BlendMap,
    ) -> usize {
        map.reset();
        for surface in self.surfaces.iter() {
            renderer.reset_tessellation(surface);
        }

        let mut contributed = 0;
        for projector in &self.projectors {
            for surface in self.surfaces.iter() {
                renderer.reset_visibility(surface);
            }
            if let Err(e) = projector.compute_vertex_visibility(renderer, &mut self.surfaces) {
                log::warn!("Projector {}: vertex visibility failed: {}", projector.id, e);
            }
            projector.tessellate_for_blending(renderer, &self.surfaces);
            projector.compute_blending_contribution(renderer, &self.surfaces);

            match projector.compute_blending_map(renderer, &mut self.surfaces, map) {
                Ok(()) => contributed += 1,
                Err(e) => log::warn!(
                    "Projector {}: skipping blending contribution: {}",
                    projector.id,
                    e
                ),
            }
        }
        contributed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projector_with_surface() -> (Projector, SurfaceTable, SurfaceHandle) {
        let mut surfaces = SurfaceTable::new();
        let handle = surfaces.insert(SurfaceObject::new("wall", vec![DVec3::ZERO, DVec3::X]));
        let mut projector = Projector::new(1, "Projector 1");
        assert!(projector.link_to(handle, &mut surfaces));
        (projector, surfaces, handle)
    }

    #[test]
    fn test_points_fan_out_to_surfaces() {
        let (mut projector, mut surfaces, handle) = projector_with_surface();

        projector.add_calibration_point(DVec3::ONE, &mut surfaces);
        projector.add_calibration_point(DVec3::X, &mut surfaces);
        assert_eq!(
            projector.add_calibration_point(DVec3::ONE, &mut surfaces),
            AddOutcome::Reselected(0)
        );
        assert_eq!(surfaces.get(handle).unwrap().calibration_points().len(), 2);

        let removed =
            projector.remove_calibration_point(PointQuery::World(DVec3::ONE), false, &mut surfaces);
        assert_eq!(removed.map(|p| p.world), Some(DVec3::ONE));
        assert_eq!(surfaces.get(handle).unwrap().calibration_points(), &[DVec3::X]);
        assert_eq!(projector.points().len(), 1);
    }

    #[test]
    fn test_linking_sends_existing_points() {
        let mut surfaces = SurfaceTable::new();
        let mut projector = Projector::new(1, "p");
        projector.add_calibration_point(DVec3::Y, &mut surfaces);

        let late = surfaces.insert(SurfaceObject::new("late", vec![]));
        assert!(projector.link_to(late, &mut surfaces));
        assert!(!projector.link_to(late, &mut surfaces));
        assert_eq!(surfaces.get(late).unwrap().calibration_points(), &[DVec3::Y]);
    }

    #[test]
    fn test_stale_surface_is_skipped() {
        let (mut projector, mut surfaces, handle) = projector_with_surface();
        surfaces.remove(handle);
        projector.add_calibration_point(DVec3::ONE, &mut surfaces);
        assert_eq!(projector.points().len(), 1);

        projector.prune_stale_links(&surfaces);
        assert!(projector.surfaces().is_empty());
    }

    #[test]
    fn test_unless_set_protects_set_points() {
        let (mut projector, mut surfaces, _) = projector_with_surface();
        projector.add_calibration_point(DVec3::ONE, &mut surfaces);
        assert!(projector.set_calibration_point(DVec2::new(0.1, 0.1)));

        assert!(projector
            .remove_calibration_point(PointQuery::World(DVec3::ONE), true, &mut surfaces)
            .is_none());
        assert_eq!(projector.points().len(), 1);
        assert!(projector
            .remove_calibration_point(PointQuery::World(DVec3::ONE), false, &mut surfaces)
            .is_some());
    }

    #[test]
    fn test_remove_nearest_projected() {
        let mut surfaces = SurfaceTable::new();
        let mut projector = Projector::new(1, "p");
        projector.set_eye(DVec3::new(0.0, -5.0, 0.0));
        projector.set_target(DVec3::ZERO);
        projector.add_calibration_point(DVec3::new(-1.0, 0.0, 0.0), &mut surfaces);
        projector.add_calibration_point(DVec3::new(1.0, 0.0, 0.0), &mut surfaces);

        let right = projector.params().project(DVec3::new(1.0, 0.0, 0.0));
        let removed = projector.remove_calibration_point(
            PointQuery::Screen(DVec2::new(right.x + 3.0, right.y)),
            false,
            &mut surfaces,
        );
        assert_eq!(removed.map(|p| p.world), Some(DVec3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_move_calibration_point_in_pixels() {
        let mut surfaces = SurfaceTable::new();
        let mut projector = Projector::new(1, "p");
        projector.set_size(1000, 500);
        projector.add_calibration_point(DVec3::ONE, &mut surfaces);

        assert_eq!(projector.move_calibration_point(100.0, 50.0), Ok(true));
        let point = projector.points().points()[0];
        assert!(point.is_set);
        assert!((point.screen - DVec2::new(0.1, 0.1)).length() < 1e-12);

        projector.deselect_calibration_point();
        assert_eq!(projector.move_calibration_point(1.0, 1.0), Ok(false));
    }

    #[test]
    fn test_bulk_import_resyncs_surfaces() {
        let (mut projector, mut surfaces, handle) = projector_with_surface();
        projector.add_calibration_point(DVec3::ONE, &mut surfaces);

        projector.set_calibration_points(&[[0.0, 0.0, 2.0, 0.5, -0.5, 1.0]], &mut surfaces);
        assert_eq!(projector.calibration_points(), vec![[0.0, 0.0, 2.0, 0.5, -0.5, 1.0]]);
        assert_eq!(
            surfaces.get(handle).unwrap().calibration_points(),
            &[DVec3::new(0.0, 0.0, 2.0)]
        );
    }

    #[test]
    fn test_insufficient_points_keep_parameters() {
        let mut surfaces = SurfaceTable::new();
        let mut projector = Projector::new(1, "p");
        for i in 0..5 {
            projector.add_calibration_point(DVec3::new(i as f64, 0.0, 1.0), &mut surfaces);
            projector.set_calibration_point(DVec2::new(0.1 * i as f64, 0.0));
        }
        let before = *projector.params();

        let err = projector.calibrate().unwrap_err();
        assert_eq!(err, CalibrationError::InsufficientPoints { found: 5, required: 6 });
        assert_eq!(*projector.params(), before);
        assert!(!projector.is_calibrated());
    }

    #[test]
    fn test_blend_render_size_keeps_aspect() {
        let mut projector = Projector::new(1, "p");
        projector.set_size(1920, 1080);
        assert_eq!(projector.blend_render_size((16384, 16384)), (4096, 2304));

        projector.set_size(1080, 1920);
        assert_eq!(projector.blend_render_size((16384, 16384)), (2304, 4096));
    }

    #[test]
    fn test_config_round_trip() {
        let mut config = ProjectorConfig::default();
        config.id = 7;
        config.fov = 42.0;
        config.calibration_points = vec![[1.0, 2.0, 3.0, 0.1, 0.2, 1.0]];

        let projector = Projector::from_config(&config, &SolverConfig::default());
        assert_eq!(projector.points().set_count(), 1);
        assert_eq!(projector.to_config(), config);
    }

    #[test]
    fn test_params_updated_flag() {
        let mut projector = Projector::new(1, "p");
        assert!(projector.take_params_updated());
        assert!(!projector.take_params_updated());
        projector.move_eye(DVec3::X);
        assert!(projector.take_params_updated());
    }
}
