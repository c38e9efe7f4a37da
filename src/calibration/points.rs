//! Calibration point storage and selection.

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

/// A 3D world position paired with where it should appear on the projector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    /// World-space position.
    pub world: DVec3,
    /// Normalized screen position in [-1, 1] on both axes.
    pub screen: DVec2,
    /// Whether the screen position was set by the operator.
    pub is_set: bool,
}

impl CalibrationPoint {
    /// A point with no screen position yet.
    pub fn new(world: DVec3) -> Self {
        Self {
            world,
            screen: DVec2::ZERO,
            is_set: false,
        }
    }

    /// Flattened `(wx, wy, wz, sx, sy, is_set)` tuple.
    pub fn to_tuple(&self) -> [f64; 6] {
        [
            self.world.x,
            self.world.y,
            self.world.z,
            self.screen.x,
            self.screen.y,
            if self.is_set { 1.0 } else { 0.0 },
        ]
    }

    pub fn from_tuple(values: [f64; 6]) -> Self {
        Self {
            world: DVec3::new(values[0], values[1], values[2]),
            screen: DVec2::new(values[3], values[4]),
            is_set: values[5] != 0.0,
        }
    }
}

/// Result of [`CorrespondenceStore::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new point was appended at this index.
    Added(usize),
    /// A point with the same world position already existed and was selected.
    Reselected(usize),
}

impl AddOutcome {
    pub fn index(&self) -> usize {
        match *self {
            AddOutcome::Added(i) | AddOutcome::Reselected(i) => i,
        }
    }
}

/// Correspondences of one projector, with a selection cursor.
///
/// Points are identified by bit-exact equality of their world position. This
/// matches how points are picked from mesh vertices, but two positions that
/// differ by rounding are distinct points.
#[derive(Debug, Clone, Default)]
pub struct CorrespondenceStore {
    points: Vec<CalibrationPoint>,
    selected: Option<usize>,
}

impl CorrespondenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CalibrationPoint> {
        self.points.get(index)
    }

    /// Number of points with an operator-set screen position.
    pub fn set_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_set).count()
    }

    /// Iterator over the points usable by the solver.
    pub fn set_points(&self) -> impl Iterator<Item = &CalibrationPoint> {
        self.points.iter().filter(|p| p.is_set)
    }

    pub fn find(&self, world: DVec3) -> Option<usize> {
        self.points.iter().position(|p| p.world == world)
    }

    /// Adds a point, or selects the existing one at the same world position.
    pub fn add(&mut self, world: DVec3) -> AddOutcome {
        if let Some(index) = self.find(world) {
            self.selected = Some(index);
            return AddOutcome::Reselected(index);
        }

        self.points.push(CalibrationPoint::new(world));
        let index = self.points.len() - 1;
        self.selected = Some(index);
        AddOutcome::Added(index)
    }

    /// Sets the screen position of the selected point.
    ///
    /// Returns false when nothing is selected.
    pub fn set_screen(&mut self, screen: DVec2) -> bool {
        match self.selected_mut() {
            Some(point) => {
                point.screen = screen;
                point.is_set = true;
                true
            }
            None => false,
        }
    }

    /// Offsets the selected point's screen position.
    ///
    /// Returns false when nothing is selected.
    pub fn offset_screen(&mut self, delta: DVec2) -> bool {
        match self.selected_mut() {
            Some(point) => {
                point.screen += delta;
                point.is_set = true;
                true
            }
            None => false,
        }
    }

    /// Removes the point at `index`, keeping the selection cursor consistent.
    pub fn remove_at(&mut self, index: usize) -> Option<CalibrationPoint> {
        if index >= self.points.len() {
            return None;
        }

        let removed = self.points.remove(index);
        self.selected = match self.selected {
            Some(s) if s == index => None,
            Some(s) if s > index => Some(s - 1),
            other => other,
        };
        Some(removed)
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_point(&self) -> Option<&CalibrationPoint> {
        self.selected.and_then(|i| self.points.get(i))
    }

    fn selected_mut(&mut self) -> Option<&mut CalibrationPoint> {
        match self.selected {
            Some(i) => self.points.get_mut(i),
            None => None,
        }
    }

    pub fn select_next(&mut self) {
        if self.points.is_empty() {
            return;
        }
        self.selected = Some(match self.selected {
            Some(i) => (i + 1) % self.points.len(),
            None => 0,
        });
    }

    pub fn select_previous(&mut self) {
        if self.points.is_empty() {
            return;
        }
        self.selected = Some(match self.selected {
            Some(0) | None => self.points.len() - 1,
            Some(i) => i - 1,
        });
    }

    pub fn deselect(&mut self) {
        self.selected = None;
    }

    /// Flattened 6-tuples, one per point.
    pub fn export_tuples(&self) -> Vec<[f64; 6]> {
        self.points.iter().map(CalibrationPoint::to_tuple).collect()
    }

    /// Replaces every point. The selection is cleared.
    pub fn replace(&mut self, points: Vec<CalibrationPoint>) {
        self.points = points;
        self.selected = None;
    }
}
