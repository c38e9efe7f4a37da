//! Multi-projector blend map.
//!
//! Each projector renders its linked surfaces with UV shading, marks the map
//! texels it covers with a soft-edge weight, and the per-projector result is
//! summed into one [`BlendMap`]. A cell packs two fields:
//!
//! | bits   | field                                         |
//! |--------|-----------------------------------------------|
//! | 0..12  | summed weight, 256 per fully weighted projector |
//! | 12..16 | number of projectors covering the texel       |

mod accumulator;

pub use accumulator::{decode_uv, edge_weight, fill_row_holes, BlendError, ProjectorContribution};

/// Weight of one projector with no soft edge.
pub const FULL_WEIGHT: u16 = 256;
/// Increment of the projector count field.
pub const PROJECTOR_UNIT: u16 = 4096;
pub const WEIGHT_MASK: u16 = 0x0FFF;
/// Largest weight the cell can hold.
pub const MAX_WEIGHT: u16 = WEIGHT_MASK;
/// Largest projector count the cell can hold.
pub const MAX_PROJECTORS: u16 = 15;

/// One packed blend map cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlendCell(pub u16);

impl BlendCell {
    /// Packs a weight and a projector count, clamping each field.
    pub fn new(weight: u16, projectors: u16) -> Self {
        let weight = weight.min(MAX_WEIGHT);
        let projectors = projectors.min(MAX_PROJECTORS);
        Self(projectors * PROJECTOR_UNIT + weight)
    }

    pub fn weight(self) -> u16 {
        self.0 & WEIGHT_MASK
    }

    pub fn projectors(self) -> u16 {
        self.0 >> 12
    }

    /// Field-wise sum. Each field saturates instead of carrying.
    pub fn saturating_add(self, other: BlendCell) -> BlendCell {
        BlendCell::new(
            self.weight().saturating_add(other.weight()),
            self.projectors().saturating_add(other.projectors()),
        )
    }
}

/// Blend map shared by every projector of a project.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendMap {
    pub width: u32,
    pub height: u32,
    /// Packed cells, row-major.
    pub cells: Vec<u16>,
}

impl BlendMap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![0; width as usize * height as usize],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, x: u32, y: u32) -> BlendCell {
        if x >= self.width || y >= self.height {
            return BlendCell::default();
        }
        BlendCell(self.cells[y as usize * self.width as usize + x as usize])
    }

    /// Clears every cell before a new blending pass.
    pub fn reset(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = 0);
    }

    /// Adds one projector's contribution cell-wise.
    pub fn accumulate(&mut self, contribution: &ProjectorContribution) -> Result<(), BlendError> {
        if contribution.width() != self.width || contribution.height() != self.height {
            return Err(BlendError::MapSizeMismatch {
                expected: (self.width, self.height),
                found: (contribution.width(), contribution.height()),
            });
        }

        for (cell, value) in self.cells.iter_mut().zip(contribution.values()) {
            *cell = BlendCell(*cell).saturating_add(BlendCell(*value)).0;
        }
        Ok(())
    }

    /// Number of cells covered by at least one projector.
    pub fn covered_cells(&self) -> usize {
        self.cells.iter().filter(|c| BlendCell(**c).projectors() > 0).count()
    }
}
