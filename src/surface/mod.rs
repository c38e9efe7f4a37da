//! Projection surfaces linked to projectors.
//!
//! Projectors refer to surfaces through [`SurfaceHandle`]s into a shared
//! [`SurfaceTable`]. A handle whose surface has been removed no longer
//! resolves and is skipped by every projector operation.

use glam::{DMat4, DVec3};

use crate::render::ShadingMode;

/// A mesh the projectors display onto.
#[derive(Debug, Clone)]
pub struct SurfaceObject {
    pub name: String,
    /// Local to world transform.
    pub model: DMat4,
    /// Mesh vertices in local space.
    pub vertices: Vec<DVec3>,
    pub shading: ShadingMode,
    /// World positions of the calibration points of linked projectors.
    calibration_points: Vec<DVec3>,
}

impl SurfaceObject {
    pub fn new(name: impl Into<String>, vertices: Vec<DVec3>) -> Self {
        Self {
            name: name.into(),
            model: DMat4::IDENTITY,
            vertices,
            shading: ShadingMode::default(),
            calibration_points: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: DMat4) -> Self {
        self.model = model;
        self
    }

    pub fn calibration_points(&self) -> &[DVec3] {
        &self.calibration_points
    }

    pub fn add_calibration_point(&mut self, world: DVec3) {
        if !self.calibration_points.contains(&world) {
            self.calibration_points.push(world);
        }
    }

    pub fn remove_calibration_point(&mut self, world: DVec3) {
        self.calibration_points.retain(|p| *p != world);
    }

    /// Closest vertex to `local`, as `(distance, vertex)` in local space.
    pub fn pick_vertex(&self, local: DVec3) -> Option<(f64, DVec3)> {
        self.vertices
            .iter()
            .map(|v| (v.distance(local), *v))
            .min_by(|a, b| a.0.total_cmp(&b.0))
    }
}

/// Non-owning reference to a surface in a [`SurfaceTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    surface: Option<SurfaceObject>,
}

/// Generation-checked storage for surfaces.
#[derive(Debug, Default)]
pub struct SurfaceTable {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl SurfaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, surface: SurfaceObject) -> SurfaceHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.surface = Some(surface);
            return SurfaceHandle {
                index,
                generation: slot.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            surface: Some(surface),
        });
        SurfaceHandle {
            index: self.slots.len() - 1,
            generation: 0,
        }
    }

    /// Removes a surface. Outstanding handles to it go stale.
    pub fn remove(&mut self, handle: SurfaceHandle) -> Option<SurfaceObject> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        let surface = slot.surface.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(surface)
    }

    pub fn get(&self, handle: SurfaceHandle) -> Option<&SurfaceObject> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.surface.as_ref())
    }

    pub fn get_mut(&mut self, handle: SurfaceHandle) -> Option<&mut SurfaceObject> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.surface.as_mut())
    }

    pub fn contains(&self, handle: SurfaceHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Live surfaces in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &SurfaceObject> {
        self.slots.iter().filter_map(|slot| slot.surface.as_ref())
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.surface.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_handle_does_not_resolve() {
        let mut table = SurfaceTable::new();
        let a = table.insert(SurfaceObject::new("a", vec![DVec3::ZERO]));
        assert!(table.contains(a));

        assert!(table.remove(a).is_some());
        assert!(!table.contains(a));
        assert!(table.remove(a).is_none());

        // The slot is reused under a new generation.
        let b = table.insert(SurfaceObject::new("b", vec![]));
        assert!(!table.contains(a));
        assert_eq!(table.get(b).map(|s| s.name.as_str()), Some("b"));
        assert_eq!(table.len(), 1);
        assert_eq!(table.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_pick_vertex() {
        let surface = SurfaceObject::new(
            "quad",
            vec![
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(1.0, 1.0, 0.0),
            ],
        );
        let (distance, vertex) = surface.pick_vertex(DVec3::new(0.9, 0.2, 0.0)).unwrap();
        assert_eq!(vertex, DVec3::new(1.0, 0.0, 0.0));
        assert!((distance - (0.01f64 + 0.04).sqrt()).abs() < 1e-12);

        assert!(SurfaceObject::new("empty", vec![]).pick_vertex(DVec3::ZERO).is_none());
    }

    #[test]
    fn test_calibration_points_are_unique() {
        let mut surface = SurfaceObject::new("s", vec![]);
        surface.add_calibration_point(DVec3::ONE);
        surface.add_calibration_point(DVec3::ONE);
        assert_eq!(surface.calibration_points().len(), 1);
        surface.remove_calibration_point(DVec3::ONE);
        assert!(surface.calibration_points().is_empty());
    }
}
