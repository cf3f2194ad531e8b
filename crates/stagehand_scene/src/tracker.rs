//! Hierarchy & relationship tracker
//!
//! Passive state tables recording which items and primitives are attached,
//! how items nest, which item owns each primitive, and which positioning
//! nodes back them. The tracker has no concurrency of its own: it is only
//! mutated from pipeline steps, which serialize access and run the fail-fast
//! invariant checks below before touching any table.
//!
//! Invariants enforced here:
//! 1. An attached item is exactly one of root or descendant; a detached item
//!    is neither.
//! 2. A primitive is owned iff attached, and its owner is an attached item.
//! 3. A static node exists iff the item is attached.
//! 4. Attaching an already-attached entity is an error, never a merge.

use crate::error::{Result, SceneError};
use crate::item::{ItemId, SceneItemRef};
use crate::primitive::{PrimitiveId, ScenePrimitive};
use rustc_hash::{FxHashMap, FxHashSet};
use stagehand_core::PlacementKey;

/// Relationship tables for everything currently attached
#[derive(Default)]
pub struct SceneTracker {
    items: FxHashMap<ItemId, SceneItemRef>,
    roots: FxHashSet<ItemId>,
    ancestors: FxHashMap<ItemId, ItemId>,
    static_nodes: FxHashMap<ItemId, PlacementKey>,
    primitives: FxHashMap<PrimitiveId, ScenePrimitive>,
    owners: FxHashMap<PrimitiveId, ItemId>,
    dynamic_nodes: FxHashMap<PrimitiveId, PlacementKey>,
}

impl SceneTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_item_attached(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn is_primitive_attached(&self, id: PrimitiveId) -> bool {
        self.owners.contains_key(&id)
    }

    /// Record an item as attached, either as a root or under `ancestor`.
    ///
    /// Fails fast without mutating any table when the item is already
    /// attached or the ancestor is not.
    pub fn record_item(
        &mut self,
        item: SceneItemRef,
        ancestor: Option<ItemId>,
        static_node: PlacementKey,
    ) -> Result<()> {
        let id = item.host().id();
        if self.is_item_attached(id) {
            return Err(SceneError::ItemAlreadyAttached(id));
        }
        if let Some(ancestor) = ancestor {
            if !self.is_item_attached(ancestor) {
                return Err(SceneError::ItemNotAttached(ancestor));
            }
            self.ancestors.insert(id, ancestor);
        } else {
            self.roots.insert(id);
        }
        self.items.insert(id, item);
        self.static_nodes.insert(id, static_node);
        Ok(())
    }

    /// Remove an item's attachment records, returning the item and its
    /// static node. Fails fast when the item is not attached.
    pub fn discard_item(&mut self, id: ItemId) -> Result<(SceneItemRef, PlacementKey)> {
        let item = self
            .items
            .remove(&id)
            .ok_or(SceneError::ItemNotAttached(id))?;
        self.roots.remove(&id);
        self.ancestors.remove(&id);
        let node = self
            .static_nodes
            .remove(&id)
            .expect("attached item always has a static node");
        Ok((item, node))
    }

    /// Record a primitive as owned by `owner`. Fails fast when the primitive
    /// is already attached or the owner is not.
    pub fn record_primitive(&mut self, primitive: ScenePrimitive, owner: ItemId) -> Result<()> {
        let id = primitive.id();
        if self.is_primitive_attached(id) {
            return Err(SceneError::PrimitiveAlreadyAttached(id));
        }
        if !self.is_item_attached(owner) {
            return Err(SceneError::ItemNotAttached(owner));
        }
        self.primitives.insert(id, primitive);
        self.owners.insert(id, owner);
        Ok(())
    }

    /// Associate a dynamic positioning node with an attached primitive
    pub fn set_dynamic_node(&mut self, id: PrimitiveId, node: PlacementKey) {
        debug_assert!(self.is_primitive_attached(id));
        self.dynamic_nodes.insert(id, node);
    }

    /// Remove a primitive's ownership records, returning the primitive and
    /// its dynamic node if it had one
    pub fn discard_primitive(
        &mut self,
        id: PrimitiveId,
    ) -> Result<(ScenePrimitive, ItemId, Option<PlacementKey>)> {
        let owner = self
            .owners
            .remove(&id)
            .ok_or(SceneError::PrimitiveNotAttached(id))?;
        let primitive = self
            .primitives
            .remove(&id)
            .expect("owned primitive always has a record");
        let dynamic_node = self.dynamic_nodes.remove(&id);
        Ok((primitive, owner, dynamic_node))
    }

    pub fn item(&self, id: ItemId) -> Option<SceneItemRef> {
        self.items.get(&id).cloned()
    }

    pub fn is_root(&self, id: ItemId) -> bool {
        self.roots.contains(&id)
    }

    pub fn ancestor_of(&self, id: ItemId) -> Option<ItemId> {
        self.ancestors.get(&id).copied()
    }

    pub fn owner_of(&self, id: PrimitiveId) -> Option<ItemId> {
        self.owners.get(&id).copied()
    }

    pub fn static_node(&self, id: ItemId) -> Option<PlacementKey> {
        self.static_nodes.get(&id).copied()
    }

    pub fn dynamic_node(&self, id: PrimitiveId) -> Option<PlacementKey> {
        self.dynamic_nodes.get(&id).copied()
    }

    /// Attached items currently recorded as direct descendants of `id`
    pub fn children_of(&self, id: ItemId) -> Vec<SceneItemRef> {
        self.ancestors
            .iter()
            .filter(|(_, ancestor)| **ancestor == id)
            .filter_map(|(child, _)| self.items.get(child).cloned())
            .collect()
    }

    /// Primitives currently owned by `id`
    pub fn primitives_of(&self, id: ItemId) -> Vec<ScenePrimitive> {
        self.owners
            .iter()
            .filter(|(_, owner)| **owner == id)
            .filter_map(|(primitive, _)| self.primitives.get(primitive).cloned())
            .collect()
    }

    pub fn root_items(&self) -> Vec<SceneItemRef> {
        self.roots
            .iter()
            .filter_map(|id| self.items.get(id).cloned())
            .collect()
    }

    pub fn all_items(&self) -> Vec<SceneItemRef> {
        self.items.values().cloned().collect()
    }

    pub fn all_primitives(&self) -> Vec<ScenePrimitive> {
        self.primitives.values().cloned().collect()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{BasicItem, SceneItem};
    use crate::primitive::PrimitiveKind;
    use stagehand_core::{Placement, PlacementGraph};

    fn attach_root(tracker: &mut SceneTracker, graph: &mut PlacementGraph) -> SceneItemRef {
        let item: SceneItemRef = BasicItem::new();
        let node = graph.insert(graph.root(), Placement::IDENTITY);
        tracker.record_item(item.clone(), None, node).unwrap();
        item
    }

    #[test]
    fn test_double_attach_rejected_without_mutation() {
        let mut tracker = SceneTracker::new();
        let mut graph = PlacementGraph::new();
        let item = attach_root(&mut tracker, &mut graph);
        let id = item.host().id();

        let node = graph.insert(graph.root(), Placement::IDENTITY);
        let err = tracker.record_item(item, None, node).unwrap_err();
        assert_eq!(err, SceneError::ItemAlreadyAttached(id));
        assert_eq!(tracker.item_count(), 1);
        assert!(tracker.is_root(id), "original root record untouched");
    }

    #[test]
    fn test_discard_of_absent_rejected() {
        let mut tracker = SceneTracker::new();
        let item = BasicItem::new();
        let err = tracker.discard_item(item.host().id()).err().unwrap();
        assert_eq!(err, SceneError::ItemNotAttached(item.host().id()));
    }

    #[test]
    fn test_root_and_ancestor_are_exclusive() {
        let mut tracker = SceneTracker::new();
        let mut graph = PlacementGraph::new();
        let root = attach_root(&mut tracker, &mut graph);

        let child: SceneItemRef = BasicItem::new();
        let child_node = graph.insert(tracker.static_node(root.host().id()).unwrap(), Placement::IDENTITY);
        tracker
            .record_item(child.clone(), Some(root.host().id()), child_node)
            .unwrap();

        for item in tracker.all_items() {
            let id = item.host().id();
            let is_root = tracker.is_root(id);
            let has_ancestor = tracker.ancestor_of(id).is_some();
            assert!(
                is_root != has_ancestor,
                "{id} must be exactly one of root or descendant"
            );
        }
    }

    #[test]
    fn test_child_under_detached_ancestor_rejected() {
        let mut tracker = SceneTracker::new();
        let mut graph = PlacementGraph::new();
        let ghost_ancestor = BasicItem::new();
        let child: SceneItemRef = BasicItem::new();
        let node = graph.insert(graph.root(), Placement::IDENTITY);
        let err = tracker
            .record_item(child, Some(ghost_ancestor.host().id()), node)
            .unwrap_err();
        assert_eq!(err, SceneError::ItemNotAttached(ghost_ancestor.host().id()));
        assert_eq!(tracker.item_count(), 0);
    }

    #[test]
    fn test_primitive_requires_attached_owner() {
        let mut tracker = SceneTracker::new();
        let orphan_owner = BasicItem::new();
        let mesh = ScenePrimitive::new(PrimitiveKind::Mesh);
        let err = tracker
            .record_primitive(mesh.clone(), orphan_owner.host().id())
            .unwrap_err();
        assert_eq!(err, SceneError::ItemNotAttached(orphan_owner.host().id()));
        assert!(!tracker.is_primitive_attached(mesh.id()));
    }

    #[test]
    fn test_primitive_roundtrip() {
        let mut tracker = SceneTracker::new();
        let mut graph = PlacementGraph::new();
        let owner = attach_root(&mut tracker, &mut graph);
        let owner_id = owner.host().id();

        let body = ScenePrimitive::new(PrimitiveKind::RigidBody);
        tracker.record_primitive(body.clone(), owner_id).unwrap();
        let dyn_node = graph.insert(graph.root(), Placement::IDENTITY);
        tracker.set_dynamic_node(body.id(), dyn_node);

        assert_eq!(tracker.owner_of(body.id()), Some(owner_id));
        assert_eq!(tracker.primitives_of(owner_id).len(), 1);

        let (discarded, discarded_owner, discarded_node) =
            tracker.discard_primitive(body.id()).unwrap();
        assert_eq!(discarded, body);
        assert_eq!(discarded_owner, owner_id);
        assert_eq!(discarded_node, Some(dyn_node));
        assert!(!tracker.is_primitive_attached(body.id()));
    }

    #[test]
    fn test_children_of_follows_ancestor_records() {
        let mut tracker = SceneTracker::new();
        let mut graph = PlacementGraph::new();
        let root = attach_root(&mut tracker, &mut graph);
        let root_id = root.host().id();
        let root_node = tracker.static_node(root_id).unwrap();

        for _ in 0..3 {
            let child: SceneItemRef = BasicItem::new();
            let node = graph.insert(root_node, Placement::IDENTITY);
            tracker.record_item(child, Some(root_id), node).unwrap();
        }
        assert_eq!(tracker.children_of(root_id).len(), 3);
        let stranger = BasicItem::new();
        assert!(tracker.children_of(stranger.host().id()).is_empty());
    }
}
