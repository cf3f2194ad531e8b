//! Scene items: logical grouping nodes in the scene hierarchy

use crate::primitive::ScenePrimitive;
use stagehand_core::Placement;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, watch};

/// Capacity of the per-item membership event channels. A subscriber that
/// lags behind by more than this loses the oldest events (best-effort
/// delivery; see [`ItemHost`]).
const EVENT_CAPACITY: usize = 64;

/// Unique identifier for a scene item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// Shared handle to a scene item
pub type SceneItemRef = Arc<dyn SceneItem>;

/// A logical grouping node: owns zero or more child items and primitives
/// for the purpose of enumeration. Lifetime is managed by the stage, not by
/// parent/child references, which keeps the hierarchy free of Arc cycles.
///
/// Implementors embed an [`ItemHost`] for storage and event plumbing and may
/// override the lifecycle hooks.
pub trait SceneItem: Send + Sync + 'static {
    /// The item's storage and event block
    fn host(&self) -> &ItemHost;

    /// Invoked by the integration pipeline after the item's relationships
    /// and positioning node have been recorded
    fn on_enter_scene(&self) {}

    /// Invoked by the disintegration pipeline after the item has been
    /// unparented and its task tree cancelled
    fn on_exit_scene(&self) {}
}

/// Storage and event block embedded by every [`SceneItem`] implementor.
///
/// Membership changes are published on broadcast channels so the stage's
/// forwarding tasks can react to them; the channels do not replay. Delivery
/// is best-effort: a subscriber that falls more than [`EVENT_CAPACITY`]
/// events behind loses the oldest ones rather than blocking the publisher.
pub struct ItemHost {
    id: ItemId,
    label: Option<String>,
    children: RwLock<Vec<SceneItemRef>>,
    primitives: RwLock<Vec<ScenePrimitive>>,
    placement: watch::Sender<Placement>,
    child_added: broadcast::Sender<SceneItemRef>,
    child_removed: broadcast::Sender<SceneItemRef>,
    primitive_added: broadcast::Sender<ScenePrimitive>,
    primitive_removed: broadcast::Sender<ScenePrimitive>,
}

impl Default for ItemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemHost {
    pub fn new() -> Self {
        let (placement, _) = watch::channel(Placement::IDENTITY);
        Self {
            id: ItemId::next(),
            label: None,
            children: RwLock::new(Vec::new()),
            primitives: RwLock::new(Vec::new()),
            placement,
            child_added: broadcast::channel(EVENT_CAPACITY).0,
            child_removed: broadcast::channel(EVENT_CAPACITY).0,
            primitive_added: broadcast::channel(EVENT_CAPACITY).0,
            primitive_removed: broadcast::channel(EVENT_CAPACITY).0,
        }
    }

    /// Attach a debug label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Snapshot of the current child items
    pub fn children(&self) -> Vec<SceneItemRef> {
        self.children.read().expect("item children lock").clone()
    }

    /// Snapshot of the currently owned primitives
    pub fn primitives(&self) -> Vec<ScenePrimitive> {
        self.primitives.read().expect("item primitives lock").clone()
    }

    /// Add a child item and publish a child-added event
    pub fn add_child(&self, child: SceneItemRef) {
        self.children
            .write()
            .expect("item children lock")
            .push(child.clone());
        let _ = self.child_added.send(child);
    }

    /// Remove a child item by identity, publishing a child-removed event
    /// when it was present
    pub fn remove_child(&self, child: &SceneItemRef) -> bool {
        let id = child.host().id();
        let removed = {
            let mut children = self.children.write().expect("item children lock");
            let before = children.len();
            children.retain(|c| c.host().id() != id);
            children.len() != before
        };
        if removed {
            let _ = self.child_removed.send(child.clone());
        }
        removed
    }

    /// Add an owned primitive and publish a primitive-added event
    pub fn add_primitive(&self, primitive: ScenePrimitive) {
        self.primitives
            .write()
            .expect("item primitives lock")
            .push(primitive.clone());
        let _ = self.primitive_added.send(primitive);
    }

    /// Remove an owned primitive, publishing a primitive-removed event when
    /// it was present
    pub fn remove_primitive(&self, primitive: &ScenePrimitive) -> bool {
        let removed = {
            let mut primitives = self.primitives.write().expect("item primitives lock");
            let before = primitives.len();
            primitives.retain(|p| p != primitive);
            primitives.len() != before
        };
        if removed {
            let _ = self.primitive_removed.send(primitive.clone());
        }
        removed
    }

    /// Current placement relative to the item's ancestor
    pub fn placement(&self) -> Placement {
        *self.placement.borrow()
    }

    /// Update the placement. Duplicate values are suppressed so the
    /// placement-synchronization feedback path settles instead of looping.
    pub fn set_placement(&self, placement: Placement) {
        self.placement.send_if_modified(|current| {
            if *current != placement {
                *current = placement;
                true
            } else {
                false
            }
        });
    }

    /// Observe placement changes (latest-value semantics)
    pub fn watch_placement(&self) -> watch::Receiver<Placement> {
        self.placement.subscribe()
    }

    pub fn subscribe_child_added(&self) -> broadcast::Receiver<SceneItemRef> {
        self.child_added.subscribe()
    }

    pub fn subscribe_child_removed(&self) -> broadcast::Receiver<SceneItemRef> {
        self.child_removed.subscribe()
    }

    pub fn subscribe_primitive_added(&self) -> broadcast::Receiver<ScenePrimitive> {
        self.primitive_added.subscribe()
    }

    pub fn subscribe_primitive_removed(&self) -> broadcast::Receiver<ScenePrimitive> {
        self.primitive_removed.subscribe()
    }
}

impl fmt::Debug for ItemHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemHost")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// A plain grouping item with no behavior beyond its [`ItemHost`]
#[derive(Debug, Default)]
pub struct BasicItem {
    host: ItemHost,
}

impl BasicItem {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            host: ItemHost::new(),
        })
    }

    pub fn with_label(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            host: ItemHost::new().with_label(label),
        })
    }
}

impl SceneItem for BasicItem {
    fn host(&self) -> &ItemHost {
        &self.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::PrimitiveKind;
    use stagehand_core::Vec3;

    #[test]
    fn test_add_remove_child() {
        let parent = BasicItem::new();
        let child: SceneItemRef = BasicItem::new();
        parent.host().add_child(child.clone());
        assert_eq!(parent.host().children().len(), 1);
        assert!(parent.host().remove_child(&child));
        assert!(parent.host().children().is_empty());
        assert!(!parent.host().remove_child(&child), "second remove is a no-op");
    }

    #[test]
    fn test_membership_events_published() {
        let item = BasicItem::new();
        let mut added = item.host().subscribe_primitive_added();
        let mut removed = item.host().subscribe_primitive_removed();

        let mesh = ScenePrimitive::new(PrimitiveKind::Mesh);
        item.host().add_primitive(mesh.clone());
        assert_eq!(added.try_recv().unwrap(), mesh);

        item.host().remove_primitive(&mesh);
        assert_eq!(removed.try_recv().unwrap(), mesh);
    }

    #[test]
    fn test_set_placement_suppresses_duplicates() {
        let item = BasicItem::new();
        let mut rx = item.host().watch_placement();

        let placement = Placement::at(Vec3::new(1.0, 0.0, 0.0));
        item.host().set_placement(placement);
        assert!(rx.has_changed().unwrap());
        let _ = *rx.borrow_and_update();

        item.host().set_placement(placement);
        assert!(!rx.has_changed().unwrap(), "identical placement must not notify");
    }
}
