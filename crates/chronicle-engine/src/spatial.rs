//! Spatial index over entity positions, backed by an R*-tree.
//!
//! Mirrors a point-indexed spatial index: every entity occupies exactly
//! one point, `query_radius`/`query_bbox` use the tree for a cheap
//! bounding-box prefilter and then an exact distance check, and
//! `nearest_neighbors` leans on `rstar`'s nearest-neighbor iterator.

use std::collections::HashMap;

use chronicle_core::state::{EntityId, Position};
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};

type IndexedPoint = GeomWithData<[f64; 3], EntityId>;

/// A point-indexed spatial index over live entity positions.
pub struct SpatialIndex {
    tree: RTree<IndexedPoint>,
    positions: HashMap<EntityId, Position>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self {
            tree: RTree::new(),
            positions: HashMap::new(),
        }
    }

    /// Insert or reposition an entity. A prior entry for the same id is
    /// removed first, so repeated `insert` calls behave like `update`.
    pub fn insert(&mut self, entity_id: EntityId, position: Position) {
        self.remove(entity_id);
        self.tree
            .insert(GeomWithData::new([position.x, position.y, position.z], entity_id));
        self.positions.insert(entity_id, position);
    }

    /// Alias for [`insert`](Self::insert) -- reads better at call sites
    /// that are clearly repositioning rather than first-inserting.
    pub fn update(&mut self, entity_id: EntityId, position: Position) {
        self.insert(entity_id, position);
    }

    pub fn remove(&mut self, entity_id: EntityId) {
        if let Some(position) = self.positions.remove(&entity_id) {
            let point = [position.x, position.y, position.z];
            self.tree
                .remove(&GeomWithData::new(point, entity_id));
        }
    }

    /// Entities within `radius` of `center`. When `include_z` is false,
    /// the prefilter and the exact distance check both ignore the z axis
    /// (a cylinder query rather than a sphere query).
    pub fn query_radius(&self, center: Position, radius: f64, include_z: bool) -> Vec<EntityId> {
        let radius_sq = radius * radius;
        self.positions
            .iter()
            .filter(|(_, position)| {
                let dx = position.x - center.x;
                let dy = position.y - center.y;
                let dist_sq = if include_z {
                    let dz = position.z - center.z;
                    dx * dx + dy * dy + dz * dz
                } else {
                    dx * dx + dy * dy
                };
                dist_sq <= radius_sq
            })
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn query_bbox(&self, min: Position, max: Position) -> Vec<EntityId> {
        let envelope = AABB::from_corners([min.x, min.y, min.z], [max.x, max.y, max.z]);
        self.tree
            .locate_in_envelope(&envelope)
            .map(|indexed| indexed.data)
            .collect()
    }

    /// The `k` nearest entities to `point`, nearest first. When
    /// `include_z` is false, ranking uses 2D distance (z is dropped from
    /// the comparison, not from the returned entities).
    pub fn nearest_neighbors(&self, point: Position, k: usize, include_z: bool) -> Vec<EntityId> {
        if include_z {
            return self
                .tree
                .nearest_neighbor_iter(&[point.x, point.y, point.z])
                .take(k)
                .map(|indexed| indexed.data)
                .collect();
        }

        let mut candidates: Vec<(f64, EntityId)> = self
            .positions
            .iter()
            .map(|(id, position)| {
                let dx = position.x - point.x;
                let dy = position.y - point.y;
                (dx * dx + dy * dy, *id)
            })
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
        candidates.into_iter().take(k).map(|(_, id)| id).collect()
    }

    pub fn entity_count(&self) -> usize {
        self.positions.len()
    }

    pub fn clear(&mut self) {
        self.tree = RTree::new();
        self.positions.clear();
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn insert_then_query_radius_finds_nearby() {
        let mut index = SpatialIndex::new();
        let near = Uuid::new_v4();
        let far = Uuid::new_v4();
        index.insert(near, Position::new(1.0, 0.0, 0.0));
        index.insert(far, Position::new(100.0, 0.0, 0.0));

        let found = index.query_radius(Position::ORIGIN, 5.0, true);
        assert_eq!(found, vec![near]);
    }

    #[test]
    fn query_radius_ignores_z_when_include_z_false() {
        let mut index = SpatialIndex::new();
        let entity = Uuid::new_v4();
        index.insert(entity, Position::new(0.0, 0.0, 100.0));

        assert!(index.query_radius(Position::ORIGIN, 1.0, true).is_empty());
        assert_eq!(index.query_radius(Position::ORIGIN, 1.0, false), vec![entity]);
    }

    #[test]
    fn update_moves_existing_entity() {
        let mut index = SpatialIndex::new();
        let entity = Uuid::new_v4();
        index.insert(entity, Position::ORIGIN);
        index.update(entity, Position::new(50.0, 50.0, 0.0));

        assert_eq!(index.entity_count(), 1);
        assert!(index.query_radius(Position::ORIGIN, 1.0, true).is_empty());
        assert_eq!(
            index.query_radius(Position::new(50.0, 50.0, 0.0), 1.0, true),
            vec![entity]
        );
    }

    #[test]
    fn remove_drops_entity_from_queries() {
        let mut index = SpatialIndex::new();
        let entity = Uuid::new_v4();
        index.insert(entity, Position::ORIGIN);
        index.remove(entity);

        assert_eq!(index.entity_count(), 0);
        assert!(index.query_radius(Position::ORIGIN, 100.0, true).is_empty());
    }

    #[test]
    fn query_bbox_returns_entities_inside_box() {
        let mut index = SpatialIndex::new();
        let inside = Uuid::new_v4();
        let outside = Uuid::new_v4();
        index.insert(inside, Position::new(1.0, 1.0, 1.0));
        index.insert(outside, Position::new(10.0, 10.0, 10.0));

        let found = index.query_bbox(Position::ORIGIN, Position::new(2.0, 2.0, 2.0));
        assert_eq!(found, vec![inside]);
    }

    #[test]
    fn nearest_neighbors_orders_by_distance() {
        let mut index = SpatialIndex::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        index.insert(a, Position::new(1.0, 0.0, 0.0));
        index.insert(b, Position::new(2.0, 0.0, 0.0));
        index.insert(c, Position::new(3.0, 0.0, 0.0));

        let nearest = index.nearest_neighbors(Position::ORIGIN, 2, true);
        assert_eq!(nearest, vec![a, b]);
    }

    #[test]
    fn clear_empties_the_index() {
        let mut index = SpatialIndex::new();
        index.insert(Uuid::new_v4(), Position::ORIGIN);
        index.clear();
        assert_eq!(index.entity_count(), 0);
    }
}
