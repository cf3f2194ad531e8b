//! Positioning-node graph
//!
//! An arena of positioning nodes with parent/child links and a distinguished
//! root. Static nodes mirror the logical item hierarchy; dynamic nodes (raw
//! physics simulation output) parent directly under the root because the
//! simulation produces world-space results independent of logical nesting.

use crate::placement::Placement;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

new_key_type! {
    /// Stable handle to a positioning node
    pub struct PlacementKey;
}

#[derive(Clone, Debug)]
struct PlacementNode {
    local: Placement,
    parent: Option<PlacementKey>,
    children: SmallVec<[PlacementKey; 4]>,
}

/// Arena of positioning nodes.
///
/// Node removal may run out of hierarchy order: cascading teardown enqueues
/// children after their parent, but the four pipelines give no cross-queue
/// ordering guarantee. [`remove`](PlacementGraph::remove) therefore re-parents
/// surviving children onto the root; each child is removed by its own
/// disintegration step.
pub struct PlacementGraph {
    nodes: SlotMap<PlacementKey, PlacementNode>,
    root: PlacementKey,
}

impl Default for PlacementGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementGraph {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(PlacementNode {
            local: Placement::IDENTITY,
            parent: None,
            children: SmallVec::new(),
        });
        Self { nodes, root }
    }

    /// The global root every top-level node hangs off
    pub fn root(&self) -> PlacementKey {
        self.root
    }

    /// Number of nodes, including the root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: PlacementKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Insert a node under `parent`, seeded with `local` placement.
    ///
    /// Falls back to the root when `parent` has already been removed (see
    /// the type-level note on removal order).
    pub fn insert(&mut self, parent: PlacementKey, local: Placement) -> PlacementKey {
        let parent = if self.nodes.contains_key(parent) {
            parent
        } else {
            self.root
        };
        let key = self.nodes.insert(PlacementNode {
            local,
            parent: Some(parent),
            children: SmallVec::new(),
        });
        self.nodes[parent].children.push(key);
        key
    }

    /// Remove a node, detaching it from its parent and re-parenting its
    /// surviving children onto the root. The root itself cannot be removed.
    pub fn remove(&mut self, key: PlacementKey) -> Option<Placement> {
        if key == self.root {
            return None;
        }
        let node = self.nodes.remove(key)?;
        if let Some(parent) = node.parent {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.children.retain(|c| *c != key);
            }
        }
        for child in node.children {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.parent = Some(self.root);
                self.nodes[self.root].children.push(child);
            }
        }
        Some(node.local)
    }

    pub fn parent(&self, key: PlacementKey) -> Option<PlacementKey> {
        self.nodes.get(key).and_then(|n| n.parent)
    }

    pub fn children(&self, key: PlacementKey) -> &[PlacementKey] {
        self.nodes
            .get(key)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Local placement relative to the parent node
    pub fn local_placement(&self, key: PlacementKey) -> Option<Placement> {
        self.nodes.get(key).map(|n| n.local)
    }

    pub fn set_local_placement(&mut self, key: PlacementKey, placement: Placement) -> bool {
        match self.nodes.get_mut(key) {
            Some(node) => {
                node.local = placement;
                true
            }
            None => false,
        }
    }

    /// World placement composed through the ancestor chain
    pub fn world_placement(&self, key: PlacementKey) -> Option<Placement> {
        let mut node = self.nodes.get(key)?;
        let mut world = node.local;
        while let Some(parent) = node.parent {
            node = self.nodes.get(parent)?;
            world = node.local.then(&world);
        }
        Some(world)
    }

    /// World placement of the node's parent frame, identity for top-level
    /// nodes. This is the frame physics output is made relative to before it
    /// is written into a static node.
    pub fn parent_world_placement(&self, key: PlacementKey) -> Option<Placement> {
        match self.parent(key) {
            Some(parent) => self.world_placement(parent),
            None => Some(Placement::IDENTITY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Quat, Vec3};

    #[test]
    fn test_insert_under_root() {
        let mut graph = PlacementGraph::new();
        let key = graph.insert(graph.root(), Placement::at(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(graph.parent(key), Some(graph.root()));
        assert_eq!(
            graph.world_placement(key).unwrap().position,
            Vec3::new(1.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_world_placement_composes_ancestors() {
        let mut graph = PlacementGraph::new();
        let a = graph.insert(graph.root(), Placement::at(Vec3::new(1.0, 0.0, 0.0)));
        let b = graph.insert(a, Placement::at(Vec3::new(0.0, 2.0, 0.0)));
        let c = graph.insert(b, Placement::at(Vec3::new(0.0, 0.0, 3.0)));
        assert_eq!(
            graph.world_placement(c).unwrap().position,
            Vec3::new(1.0, 2.0, 3.0)
        );
    }

    #[test]
    fn test_world_placement_applies_parent_rotation() {
        let mut graph = PlacementGraph::new();
        let parent = graph.insert(
            graph.root(),
            Placement::new(
                Vec3::ZERO,
                Quat::from_axis_angle(Vec3::UP, std::f32::consts::FRAC_PI_2),
            ),
        );
        let child = graph.insert(parent, Placement::at(Vec3::UNIT_X));
        let world = graph.world_placement(child).unwrap();
        assert!((world.position - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
    }

    #[test]
    fn test_remove_detaches_from_parent() {
        let mut graph = PlacementGraph::new();
        let a = graph.insert(graph.root(), Placement::IDENTITY);
        assert!(graph.remove(a).is_some());
        assert!(!graph.contains(a));
        assert!(graph.children(graph.root()).is_empty());
    }

    #[test]
    fn test_remove_orphans_children_to_root() {
        let mut graph = PlacementGraph::new();
        let a = graph.insert(graph.root(), Placement::at(Vec3::new(5.0, 0.0, 0.0)));
        let b = graph.insert(a, Placement::at(Vec3::new(0.0, 1.0, 0.0)));
        graph.remove(a);
        assert!(graph.contains(b));
        assert_eq!(graph.parent(b), Some(graph.root()));
        // Orphan keeps only its local placement once the ancestor frame is gone
        assert_eq!(
            graph.world_placement(b).unwrap().position,
            Vec3::new(0.0, 1.0, 0.0)
        );
    }

    #[test]
    fn test_insert_under_removed_parent_falls_back_to_root() {
        let mut graph = PlacementGraph::new();
        let a = graph.insert(graph.root(), Placement::IDENTITY);
        graph.remove(a);
        let b = graph.insert(a, Placement::IDENTITY);
        assert_eq!(graph.parent(b), Some(graph.root()));
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let mut graph = PlacementGraph::new();
        let root = graph.root();
        assert!(graph.remove(root).is_none());
        assert!(graph.contains(root));
    }
}
