//! Per-projector blend contribution from a UV render.

use image::DynamicImage;
use thiserror::Error;

use super::{BlendCell, FULL_WEIGHT, PROJECTOR_UNIT};
use crate::render::{DepthBuffer, RenderedFrame};

/// Errors that skip a projector's blend contribution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlendError {
    #[error("UV render is not RGBA16, got {0}")]
    UnexpectedFormat(String),
    #[error("depth buffer is {depth:?}, color is {color:?}")]
    DepthSizeMismatch { color: (u32, u32), depth: (u32, u32) },
    #[error("blend map has no cells")]
    EmptyMap,
    #[error("contribution is {found:?}, blend map is {expected:?}")]
    MapSizeMismatch { expected: (u32, u32), found: (u32, u32) },
    #[error("UV render failed: {0}")]
    Render(String),
}

/// Map texels covered by one projector and their packed values.
#[derive(Debug, Clone)]
pub struct ProjectorContribution {
    width: u32,
    height: u32,
    values: Vec<u16>,
    marked: Vec<bool>,
}

impl ProjectorContribution {
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            values: vec![0; len],
            marked: vec![false; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn values(&self) -> &[u16] {
        &self.values
    }

    pub fn value(&self, x: u32, y: u32) -> u16 {
        self.values[self.index(x, y)]
    }

    pub fn is_marked(&self, x: u32, y: u32) -> bool {
        self.marked[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, cell: BlendCell) {
        let index = self.index(x, y);
        self.values[index] = cell.0;
        self.marked[index] = true;
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Builds the contribution of a UV-shaded render into a
    /// `map_width` x `map_height` blend map, then fills row holes.
    ///
    /// Only the first destination pixel landing on a texel counts. Texel
    /// (0, 0) doubles as the "no UV" value and is never marked.
    pub fn from_uv_frame(
        frame: &RenderedFrame,
        blend_width: f64,
        map_width: u32,
        map_height: u32,
    ) -> Result<Self, BlendError> {
        if map_width == 0 || map_height == 0 {
            return Err(BlendError::EmptyMap);
        }

        let image = match &frame.color {
            DynamicImage::ImageRgba16(image) => image,
            other => return Err(BlendError::UnexpectedFormat(format!("{:?}", other.color()))),
        };
        check_depth(image.dimensions(), &frame.depth)?;

        let (image_width, image_height) = image.dimensions();
        let mut contribution = Self::new(map_width, map_height);

        for (px, py, pixel) in image.enumerate_pixels() {
            if frame.depth.sample(px, py).map_or(true, |d| d >= DepthBuffer::FAR) {
                continue;
            }

            let (x, y) = decode_uv(pixel.0, map_width, map_height);
            if (x == 0 && y == 0) || contribution.is_marked(x, y) {
                continue;
            }

            let weight = edge_weight(px, py, image_width, image_height, blend_width);
            let index = contribution.index(x, y);
            contribution.values[index] = weight + PROJECTOR_UNIT;
            contribution.marked[index] = true;
        }

        contribution.fill_holes();
        Ok(contribution)
    }

    /// Interpolates unmarked runs between marked texels on every row.
    pub fn fill_holes(&mut self) {
        let width = self.width as usize;
        if width == 0 {
            return;
        }
        for (values, marked) in self.values.chunks_mut(width).zip(self.marked.chunks_mut(width)) {
            fill_row_holes(values, marked);
        }
    }
}

fn check_depth(color: (u32, u32), depth: &DepthBuffer) -> Result<(), BlendError> {
    if (depth.width, depth.height) != color {
        return Err(BlendError::DepthSizeMismatch {
            color,
            depth: (depth.width, depth.height),
        });
    }
    Ok(())
}

/// Map texel addressed by an RGBA16 UV pixel.
///
/// U is split over channels 0 (coarse) and 1 (fine, 1/256 of the range),
/// V likewise over channels 2 and 3.
pub fn decode_uv(channels: [u16; 4], map_width: u32, map_height: u32) -> (u32, u32) {
    let coordinate = |coarse: u16, fine: u16, size: u32| {
        let uv = coarse as f64 / 65535.0 + fine as f64 / 65535.0 / 256.0;
        let texel = (uv * size as f64).floor();
        (texel.max(0.0) as u32).min(size.saturating_sub(1))
    };
    (
        coordinate(channels[0], channels[1], map_width),
        coordinate(channels[2], channels[3], map_height),
    )
}

/// Soft-edge weight of the destination pixel `(px, py)`.
///
/// The distance to the nearest vertical and horizontal image border, as a
/// fraction of the image size over `blend_width`, is combined harmonically
/// and squared (Lancelle et al. 2011, soft edge and soft corner blending).
pub fn edge_weight(px: u32, py: u32, width: u32, height: u32, blend_width: f64) -> u16 {
    if blend_width <= 0.0 {
        return FULL_WEIGHT;
    }

    let border = |p: u32, size: u32| {
        let nearest = p.min(size.saturating_sub(1).saturating_sub(p)) as f64;
        (nearest / size as f64 / blend_width).clamp(0.0, 1.0)
    };
    let dist_x = border(px, width);
    let dist_y = border(py, height);

    let weight = (1.0 / (1.0 / dist_x + 1.0 / dist_y)).clamp(0.0, 1.0);
    (weight * weight * FULL_WEIGHT as f64).round() as u16
}

/// Fills every unmarked run strictly between two marked cells of a row by
/// integer linear interpolation of their values. Leading and trailing runs
/// stay empty.
pub fn fill_row_holes(values: &mut [u16], marked: &mut [bool]) {
    let mut last: Option<usize> = None;
    for x in 0..values.len().min(marked.len()) {
        if !marked[x] {
            continue;
        }

        if let Some(start) = last {
            let span = (x - start) as i32;
            if span > 1 {
                let from = values[start] as i32;
                let to = values[x] as i32;
                for hole in start + 1..x {
                    let offset = (hole - start) as i32;
                    values[hole] = (from + (to - from) * offset / span) as u16;
                    marked[hole] = true;
                }
            }
        }
        last = Some(x);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    #[test]
    fn test_row_hole_interpolation() {
        let mut values = vec![0u16; 12];
        let mut marked = vec![false; 12];
        values[0] = 100;
        marked[0] = true;
        values[10] = 200;
        marked[10] = true;

        fill_row_holes(&mut values, &mut marked);

        assert_eq!(values[5], 150);
        assert_eq!(values[1], 110);
        assert!(marked[1..=10].iter().all(|m| *m));
        // Trailing run is left alone.
        assert!(!marked[11]);
        assert_eq!(values[11], 0);
    }

    #[test]
    fn test_leading_run_and_adjacent_marks() {
        let mut values = vec![0, 0, 50, 60, 0, 0];
        let mut marked = vec![false, false, true, true, false, false];
        fill_row_holes(&mut values, &mut marked);
        assert_eq!(values, vec![0, 0, 50, 60, 0, 0]);
        assert_eq!(marked, vec![false, false, true, true, false, false]);
    }

    #[test]
    fn test_decreasing_interpolation() {
        let mut values = vec![300, 0, 0, 0, 100];
        let mut marked = vec![true, false, false, false, true];
        fill_row_holes(&mut values, &mut marked);
        assert_eq!(values, vec![300, 250, 200, 150, 100]);
    }

    #[test]
    fn test_edge_weight() {
        assert_eq!(edge_weight(0, 50, 100, 100, 0.0), FULL_WEIGHT);
        // On the border the weight vanishes.
        assert_eq!(edge_weight(0, 50, 100, 100, 0.1), 0);
        // Far from both borders: 1 / (1 + 1) squared.
        assert_eq!(edge_weight(50, 50, 100, 100, 0.1), 64);
    }

    #[test]
    fn test_decode_uv() {
        assert_eq!(decode_uv([0, 0, 0, 0], 64, 32), (0, 0));
        assert_eq!(decode_uv([32768, 0, 16384, 0], 64, 32), (32, 8));
        assert_eq!(decode_uv([65535, 65535, 65535, 65535], 64, 32), (63, 31));
    }

    fn uv_pixel(x: u32, y: u32, map: u32) -> Rgba<u16> {
        let u = ((x as f64 + 0.5) / map as f64 * 65535.0) as u16;
        let v = ((y as f64 + 0.5) / map as f64 * 65535.0) as u16;
        Rgba([u, 0, v, 0])
    }

    #[test]
    fn test_contribution_from_frame() {
        let map = 8;
        let image = ImageBuffer::from_fn(4, 4, |x, y| uv_pixel(x + 2, y + 2, map));
        let mut depth = DepthBuffer::cleared(4, 4);
        for y in 0..4 {
            for x in 0..4 {
                if x != 3 {
                    depth.set(x, y, 0.5);
                }
            }
        }
        let frame = RenderedFrame {
            color: DynamicImage::ImageRgba16(image),
            depth,
        };

        let contribution = ProjectorContribution::from_uv_frame(&frame, 0.0, map, map).unwrap();
        assert!(contribution.is_marked(2, 2));
        assert_eq!(contribution.value(4, 3), FULL_WEIGHT + PROJECTOR_UNIT);
        // Column x = 3 of the render had no depth.
        assert!(!contribution.is_marked(5, 2));
        assert!(!contribution.is_marked(0, 0));
    }

    #[test]
    fn test_wrong_format_is_rejected() {
        let frame = RenderedFrame {
            color: DynamicImage::new_rgba8(2, 2),
            depth: DepthBuffer::cleared(2, 2),
        };
        assert!(matches!(
            ProjectorContribution::from_uv_frame(&frame, 0.1, 4, 4),
            Err(BlendError::UnexpectedFormat(_))
        ));
    }

    #[test]
    fn test_depth_size_mismatch() {
        let frame = RenderedFrame {
            color: DynamicImage::new_rgba16(2, 2),
            depth: DepthBuffer::cleared(3, 2),
        };
        assert!(matches!(
            ProjectorContribution::from_uv_frame(&frame, 0.1, 4, 4),
            Err(BlendError::DepthSizeMismatch { .. })
        ));
    }
}
