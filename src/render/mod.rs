//! Interface to the rendering backend.
//!
//! Rasterization happens outside this crate. Projectors hand a
//! [`RenderRequest`] to a [`SurfaceRenderer`] and read back the color and
//! depth of the result.

use glam::DMat4;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::surface::SurfaceObject;

/// How a surface is shaded when rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShadingMode {
    /// Regular textured output.
    #[default]
    Textured,
    /// Texture coordinates written as two 16-bit fixed-point pairs (RGBA16).
    Uv,
    /// Primitive index of each fragment, read back to find visible vertices.
    PrimitiveId,
}

/// Errors reported by a rendering backend.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("render backend failure: {0}")]
    Backend(String),
    #[error("invalid render size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
}

/// Window depth in [0, 1], rows stored bottom-up like window coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl DepthBuffer {
    /// Depth value marking pixels nothing was rendered to.
    pub const FAR: f32 = 1.0;

    /// A buffer cleared to [`DepthBuffer::FAR`].
    pub fn cleared(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![Self::FAR; width as usize * height as usize],
        }
    }

    pub fn sample(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y as usize * self.width as usize + x as usize).copied()
    }

    pub fn set(&mut self, x: u32, y: u32, depth: f32) {
        if x < self.width && y < self.height {
            self.data[y as usize * self.width as usize + x as usize] = depth;
        }
    }
}

/// One draw of a projector's linked surfaces.
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    pub view: DMat4,
    pub projection: DMat4,
    pub width: u32,
    pub height: u32,
    pub surfaces: Vec<&'a SurfaceObject>,
}

/// Read-back of a finished render.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    /// Color attachment; row `y` of the image is window row `y`.
    pub color: DynamicImage,
    pub depth: DepthBuffer,
}

/// Backend able to rasterize surfaces for a projector.
///
/// Per-vertex blending lives on the backend's side of the mesh. The hooks
/// below are called in this order for each projector:
/// [`reset_visibility`](Self::reset_visibility) on every surface, a
/// primitive-ID render followed by
/// [`transfer_visibility`](Self::transfer_visibility),
/// [`tessellate`](Self::tessellate), then
/// [`compute_visibility`](Self::compute_visibility). Backends that only
/// produce blend maps can ignore all of them.
pub trait SurfaceRenderer {
    /// Largest viewport the backend supports, as `(width, height)`.
    fn max_viewport_dims(&self) -> (u32, u32);

    fn render(&mut self, request: &RenderRequest<'_>) -> Result<RenderedFrame, RenderError>;

    /// Subdivides `surface` near the projector's soft edge. Backends without
    /// tessellation support ignore the call.
    fn tessellate(
        &mut self,
        _surface: &SurfaceObject,
        _view: &DMat4,
        _projection: &DMat4,
        _blend_width: f64,
        _blend_precision: f64,
    ) {
    }

    /// Drops the subdivision added by earlier blending passes.
    fn reset_tessellation(&mut self, _surface: &SurfaceObject) {}

    /// Clears the vertex visibility left by the previous projector.
    fn reset_visibility(&mut self, _surface: &SurfaceObject) {}

    /// Marks the vertices of `surface` seen in a primitive-ID render.
    fn transfer_visibility(&mut self, _surface: &SurfaceObject, _frame: &RenderedFrame) {}

    /// Adds the projector's soft-edge weight to the vertices it sees.
    fn compute_visibility(
        &mut self,
        _surface: &SurfaceObject,
        _view: &DMat4,
        _projection: &DMat4,
        _blend_width: f64,
    ) {
    }
}
