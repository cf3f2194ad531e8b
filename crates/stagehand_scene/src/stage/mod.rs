//! Scene stage: the public surface of the integration engine
//!
//! The stage accepts a dynamically changing tree of items, each owning zero
//! or more primitives, and drives four pipeline workers that attach/detach
//! them against the backend while placement-synchronization tasks keep
//! world-space transforms reconciled every clock tick.
//!
//! `add_item`/`remove_item` only *enqueue*: they suspend until all four
//! pipeline workers have started draining (so nothing is silently dropped),
//! not until the request is processed. Observe the entered/exited event
//! streams for completion.

mod pipelines;
mod sync;

use crate::adapter::AttachmentAdapter;
use crate::clock::{Clock, Tick};
use crate::context::Dispatcher;
use crate::error::SceneError;
use crate::item::{ItemId, SceneItemRef};
use crate::primitive::{PrimitiveId, ScenePrimitive};
use crate::tasks::TaskScope;
use crate::tracker::SceneTracker;
use rustc_hash::FxHashMap;
use stagehand_core::{PlacementGraph, PlacementKey};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc, watch};

/// Number of pipeline workers behind the startup barrier
const WORKER_COUNT: usize = 4;

/// Tuning for a [`SceneStage`]
#[derive(Clone, Copy, Debug)]
pub struct StageConfig {
    /// Capacity of the entered/exited/error broadcast channels. Subscribers
    /// lagging further than this lose the oldest events.
    pub event_capacity: usize,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self { event_capacity: 64 }
    }
}

/// An item queued for integration together with its ancestor (none for roots)
pub(crate) struct ItemAndAncestor {
    pub(crate) item: SceneItemRef,
    pub(crate) ancestor: Option<SceneItemRef>,
}

/// A primitive queued for integration together with its owning item
pub(crate) struct PrimitiveAndOwner {
    pub(crate) primitive: ScenePrimitive,
    pub(crate) owner: SceneItemRef,
}

/// Producer ends of the four pending queues. Unbounded so enqueueing never
/// stalls a caller on a busy consumer.
pub(crate) struct Queues {
    pub(crate) item_integrate: mpsc::UnboundedSender<ItemAndAncestor>,
    pub(crate) item_disintegrate: mpsc::UnboundedSender<SceneItemRef>,
    pub(crate) primitive_integrate: mpsc::UnboundedSender<PrimitiveAndOwner>,
    pub(crate) primitive_disintegrate: mpsc::UnboundedSender<ScenePrimitive>,
}

/// Enter/exit notification streams. Non-replaying, best-effort multicast.
pub(crate) struct StageEvents {
    pub(crate) item_entered: broadcast::Sender<SceneItemRef>,
    pub(crate) item_exited: broadcast::Sender<SceneItemRef>,
    pub(crate) primitive_entered: broadcast::Sender<ScenePrimitive>,
    pub(crate) primitive_exited: broadcast::Sender<ScenePrimitive>,
    pub(crate) errors: broadcast::Sender<SceneError>,
}

impl StageEvents {
    fn new(capacity: usize) -> Self {
        Self {
            item_entered: broadcast::channel(capacity).0,
            item_exited: broadcast::channel(capacity).0,
            primitive_entered: broadcast::channel(capacity).0,
            primitive_exited: broadcast::channel(capacity).0,
            errors: broadcast::channel(capacity).0,
        }
    }

    /// Log a pipeline failure and publish it on the error stream. The
    /// request that caused it is abandoned; the worker keeps draining.
    pub(crate) fn report(&self, error: SceneError) {
        tracing::error!(%error, "pipeline request failed");
        let _ = self.errors.send(error);
    }
}

/// Shared mutable engine state. Guarded by one mutex that is never held
/// across an await; backend dispatch happens between lock windows.
pub(crate) struct StageState {
    pub(crate) tracker: SceneTracker,
    pub(crate) graph: PlacementGraph,
    pub(crate) item_scopes: FxHashMap<ItemId, TaskScope>,
    pub(crate) primitive_scopes: FxHashMap<PrimitiveId, TaskScope>,
}

pub(crate) struct StageInner {
    pub(crate) state: Mutex<StageState>,
    pub(crate) adapter: Arc<dyn AttachmentAdapter>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) ticks: watch::Receiver<Tick>,
    pub(crate) queues: Queues,
    pub(crate) events: StageEvents,
    started: watch::Receiver<usize>,
}

impl StageInner {
    pub(crate) fn state(&self) -> MutexGuard<'_, StageState> {
        self.state.lock().expect("stage state lock")
    }
}

/// The scene-graph integration engine façade. Cloning shares the engine.
#[derive(Clone)]
pub struct SceneStage {
    inner: Arc<StageInner>,
}

impl SceneStage {
    /// Create a stage with default configuration. Must be called from
    /// within a tokio runtime; the pipeline workers and execution contexts
    /// are spawned immediately.
    pub fn new(adapter: Arc<dyn AttachmentAdapter>, clock: &dyn Clock) -> Self {
        Self::with_config(adapter, clock, StageConfig::default())
    }

    pub fn with_config(
        adapter: Arc<dyn AttachmentAdapter>,
        clock: &dyn Clock,
        config: StageConfig,
    ) -> Self {
        let (item_integrate_tx, item_integrate_rx) = mpsc::unbounded_channel();
        let (item_disintegrate_tx, item_disintegrate_rx) = mpsc::unbounded_channel();
        let (primitive_integrate_tx, primitive_integrate_rx) = mpsc::unbounded_channel();
        let (primitive_disintegrate_tx, primitive_disintegrate_rx) = mpsc::unbounded_channel();
        let (started_tx, started_rx) = watch::channel(0usize);

        let inner = Arc::new(StageInner {
            state: Mutex::new(StageState {
                tracker: SceneTracker::new(),
                graph: PlacementGraph::new(),
                item_scopes: FxHashMap::default(),
                primitive_scopes: FxHashMap::default(),
            }),
            adapter,
            dispatcher: Dispatcher::spawn(),
            ticks: clock.ticks(),
            queues: Queues {
                item_integrate: item_integrate_tx,
                item_disintegrate: item_disintegrate_tx,
                primitive_integrate: primitive_integrate_tx,
                primitive_disintegrate: primitive_disintegrate_tx,
            },
            events: StageEvents::new(config.event_capacity),
            started: started_rx,
        });

        pipelines::spawn_workers(
            &inner,
            pipelines::WorkerChannels {
                item_integrate: item_integrate_rx,
                item_disintegrate: item_disintegrate_rx,
                primitive_integrate: primitive_integrate_rx,
                primitive_disintegrate: primitive_disintegrate_rx,
            },
            Arc::new(started_tx),
        );

        Self { inner }
    }

    /// Suspend until every pipeline worker has begun draining its queue
    async fn pipelines_draining(&self) {
        let mut started = self.inner.started.clone();
        // wait_for only fails if every worker is gone, which means the
        // runtime is shutting down; enqueueing is pointless either way.
        let _ = started.wait_for(|count| *count >= WORKER_COUNT).await;
    }

    /// Enqueue an item for integration, as a root or under `ancestor`.
    ///
    /// Suspends only until the pipelines are draining. Integration itself is
    /// asynchronous; observe [`item_entered`](Self::item_entered) for
    /// completion. Integrating an already-attached item is a caller bug and
    /// surfaces on [`errors`](Self::errors).
    pub async fn add_item(&self, item: SceneItemRef, ancestor: Option<SceneItemRef>) {
        self.pipelines_draining().await;
        let _ = self
            .inner
            .queues
            .item_integrate
            .send(ItemAndAncestor { item, ancestor });
    }

    /// Enqueue an item for disintegration. Cascades to every attached
    /// descendant and owned primitive.
    pub async fn remove_item(&self, item: &SceneItemRef) {
        self.pipelines_draining().await;
        let _ = self.inner.queues.item_disintegrate.send(item.clone());
    }

    /// Enqueue disintegration of every current root item
    pub async fn remove_all_items(&self) {
        self.pipelines_draining().await;
        let roots = self.inner.state().tracker.root_items();
        for root in roots {
            let _ = self.inner.queues.item_disintegrate.send(root);
        }
    }

    /// Snapshot of all attached items
    pub fn all_items(&self) -> Vec<SceneItemRef> {
        self.inner.state().tracker.all_items()
    }

    /// Snapshot of all attached primitives
    pub fn all_primitives(&self) -> Vec<ScenePrimitive> {
        self.inner.state().tracker.all_primitives()
    }

    /// The item currently owning `primitive`, if it is attached
    pub fn find_owning_item(&self, primitive: &ScenePrimitive) -> Option<SceneItemRef> {
        let state = self.inner.state();
        let owner = state.tracker.owner_of(primitive.id())?;
        state.tracker.item(owner)
    }

    /// The static positioning node mirroring `item`'s place in the hierarchy
    pub fn static_node(&self, item: ItemId) -> Option<PlacementKey> {
        self.inner.state().tracker.static_node(item)
    }

    /// The dynamic positioning node holding raw simulation output for a
    /// physics-affine primitive
    pub fn dynamic_node(&self, primitive: PrimitiveId) -> Option<PlacementKey> {
        self.inner.state().tracker.dynamic_node(primitive)
    }

    /// Run `f` with exclusive access to the placement graph. This is how
    /// backend wiring writes simulation output into dynamic nodes each step.
    pub fn with_graph<R>(&self, f: impl FnOnce(&mut PlacementGraph) -> R) -> R {
        f(&mut self.inner.state().graph)
    }

    /// Items entering the scene. Non-replaying; slow subscribers lose the
    /// oldest events.
    pub fn item_entered(&self) -> broadcast::Receiver<SceneItemRef> {
        self.inner.events.item_entered.subscribe()
    }

    /// Items leaving the scene
    pub fn item_exited(&self) -> broadcast::Receiver<SceneItemRef> {
        self.inner.events.item_exited.subscribe()
    }

    /// Primitives attached to the backend
    pub fn primitive_entered(&self) -> broadcast::Receiver<ScenePrimitive> {
        self.inner.events.primitive_entered.subscribe()
    }

    /// Primitives detached from the backend
    pub fn primitive_exited(&self) -> broadcast::Receiver<ScenePrimitive> {
        self.inner.events.primitive_exited.subscribe()
    }

    /// Pipeline failures: invariant violations and backend call errors.
    /// These indicate caller bugs or backend trouble, not normal flow.
    pub fn errors(&self) -> broadcast::Receiver<SceneError> {
        self.inner.events.errors.subscribe()
    }
}
