//! The four pipeline workers
//!
//! One worker per queue: item integration, item disintegration, primitive
//! integration, primitive disintegration. Each worker drains its queue in
//! FIFO order; there is no ordering guarantee *across* queues, which is why
//! cascading teardown only enqueues and never assumes its children are gone.
//!
//! A failed step never kills its worker. The error is logged, published on
//! the stage error stream, and the worker moves on to the next request.

use super::{ItemAndAncestor, PrimitiveAndOwner, StageInner};
use crate::error::{Result, SceneError};
use crate::item::SceneItemRef;
use crate::primitive::ScenePrimitive;
use crate::stage::sync;
use crate::tasks::TaskScope;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, watch};

pub(crate) struct WorkerChannels {
    pub(crate) item_integrate: mpsc::UnboundedReceiver<ItemAndAncestor>,
    pub(crate) item_disintegrate: mpsc::UnboundedReceiver<SceneItemRef>,
    pub(crate) primitive_integrate: mpsc::UnboundedReceiver<PrimitiveAndOwner>,
    pub(crate) primitive_disintegrate: mpsc::UnboundedReceiver<ScenePrimitive>,
}

/// Spawn the four workers. Each registers itself on the startup barrier
/// before its first receive, so a count of four means every queue is being
/// drained and enqueued requests can no longer be lost.
///
/// Workers hold the stage weakly: once the last [`super::SceneStage`] clone
/// drops, the queue senders drop with it, the receivers run dry and the
/// workers exit.
pub(crate) fn spawn_workers(
    inner: &Arc<StageInner>,
    channels: WorkerChannels,
    started: Arc<watch::Sender<usize>>,
) {
    let stage = Arc::downgrade(inner);
    tokio::spawn(item_integration_worker(
        stage.clone(),
        channels.item_integrate,
        started.clone(),
    ));
    tokio::spawn(item_disintegration_worker(
        stage.clone(),
        channels.item_disintegrate,
        started.clone(),
    ));
    tokio::spawn(primitive_integration_worker(
        stage.clone(),
        channels.primitive_integrate,
        started.clone(),
    ));
    tokio::spawn(primitive_disintegration_worker(
        stage,
        channels.primitive_disintegrate,
        started,
    ));
}

async fn item_integration_worker(
    stage: Weak<StageInner>,
    mut requests: mpsc::UnboundedReceiver<ItemAndAncestor>,
    started: Arc<watch::Sender<usize>>,
) {
    started.send_modify(|count| *count += 1);
    while let Some(request) = requests.recv().await {
        let Some(inner) = stage.upgrade() else { break };
        if let Err(error) = integrate_item(&inner, request.item, request.ancestor).await {
            inner.events.report(error);
        }
    }
    tracing::debug!("item integration pipeline closed");
}

async fn item_disintegration_worker(
    stage: Weak<StageInner>,
    mut requests: mpsc::UnboundedReceiver<SceneItemRef>,
    started: Arc<watch::Sender<usize>>,
) {
    started.send_modify(|count| *count += 1);
    while let Some(item) = requests.recv().await {
        let Some(inner) = stage.upgrade() else { break };
        if let Err(error) = disintegrate_item(&inner, item).await {
            inner.events.report(error);
        }
    }
    tracing::debug!("item disintegration pipeline closed");
}

async fn primitive_integration_worker(
    stage: Weak<StageInner>,
    mut requests: mpsc::UnboundedReceiver<PrimitiveAndOwner>,
    started: Arc<watch::Sender<usize>>,
) {
    started.send_modify(|count| *count += 1);
    while let Some(request) = requests.recv().await {
        let Some(inner) = stage.upgrade() else { break };
        if let Err(error) = integrate_primitive(&inner, request.primitive, request.owner).await {
            inner.events.report(error);
        }
    }
    tracing::debug!("primitive integration pipeline closed");
}

async fn primitive_disintegration_worker(
    stage: Weak<StageInner>,
    mut requests: mpsc::UnboundedReceiver<ScenePrimitive>,
    started: Arc<watch::Sender<usize>>,
) {
    started.send_modify(|count| *count += 1);
    while let Some(primitive) = requests.recv().await {
        let Some(inner) = stage.upgrade() else { break };
        if let Err(error) = disintegrate_primitive(&inner, primitive).await {
            inner.events.report(error);
        }
    }
    tracing::debug!("primitive disintegration pipeline closed");
}

/// One item-integration step: record relationships and a static node, fire
/// the enter hook, then stand up the item's forwarding and sync tasks.
async fn integrate_item(
    inner: &Arc<StageInner>,
    item: SceneItemRef,
    ancestor: Option<SceneItemRef>,
) -> Result<()> {
    let id = item.host().id();
    let node = {
        let mut state = inner.state();
        if state.tracker.is_item_attached(id) {
            return Err(SceneError::ItemAlreadyAttached(id));
        }
        let (ancestor_id, parent_node) = match &ancestor {
            Some(ancestor) => {
                let ancestor_id = ancestor.host().id();
                let parent_node = state
                    .tracker
                    .static_node(ancestor_id)
                    .ok_or(SceneError::ItemNotAttached(ancestor_id))?;
                (Some(ancestor_id), parent_node)
            }
            None => (None, state.graph.root()),
        };
        let node = state.graph.insert(parent_node, item.host().placement());
        if let Err(error) = state.tracker.record_item(item.clone(), ancestor_id, node) {
            state.graph.remove(node);
            return Err(error);
        }
        node
    };

    tracing::debug!(item = %id, root = ancestor.is_none(), "item integrated");
    item.on_enter_scene();
    let _ = inner.events.item_entered.send(item.clone());

    let mut scope = TaskScope::new();
    let token = scope.token();
    let stage = Arc::downgrade(inner);
    scope.spawn(sync::run_item_sync(
        stage.clone(),
        item.clone(),
        node,
        token,
    ));
    scope.spawn(forward_added_children(stage.clone(), item.clone()));
    scope.spawn(forward_removed_children(stage.clone(), item.clone()));
    scope.spawn(forward_added_primitives(stage.clone(), item.clone()));
    scope.spawn(forward_removed_primitives(stage, item));

    // The disintegration pipeline may have processed this item between lock
    // windows; a scope it could not cancel must not survive it.
    let mut state = inner.state();
    if state.tracker.is_item_attached(id) {
        state.item_scopes.insert(id, scope);
    } else {
        drop(state);
        scope.cancel();
    }
    Ok(())
}

/// One item-disintegration step: cancel the task tree, cascade to attached
/// descendants and owned primitives, drop the records, fire the exit hook.
async fn disintegrate_item(inner: &Arc<StageInner>, item: SceneItemRef) -> Result<()> {
    let id = item.host().id();
    let (scope, children, primitives) = {
        let mut state = inner.state();
        if !state.tracker.is_item_attached(id) {
            return Err(SceneError::ItemNotAttached(id));
        }
        (
            state.item_scopes.remove(&id),
            state.tracker.children_of(id),
            state.tracker.primitives_of(id),
        )
    };
    if let Some(scope) = scope {
        scope.cancel();
    }
    for child in children {
        let _ = inner.queues.item_disintegrate.send(child);
    }
    for primitive in primitives {
        let _ = inner.queues.primitive_disintegrate.send(primitive);
    }

    {
        let mut state = inner.state();
        let (_, node) = state.tracker.discard_item(id)?;
        state.graph.remove(node);
    }

    tracing::debug!(item = %id, "item disintegrated");
    item.on_exit_scene();
    let _ = inner.events.item_exited.send(item);
    Ok(())
}

/// One primitive-integration step. The backend attach is dispatched *before*
/// ownership is recorded: a failed attach leaves the tracker untouched, and
/// a failed record rolls the attach back.
async fn integrate_primitive(
    inner: &Arc<StageInner>,
    primitive: ScenePrimitive,
    owner: SceneItemRef,
) -> Result<()> {
    let id = primitive.id();
    let owner_id = owner.host().id();
    {
        let state = inner.state();
        if state.tracker.is_primitive_attached(id) {
            return Err(SceneError::PrimitiveAlreadyAttached(id));
        }
        if !state.tracker.is_item_attached(owner_id) {
            return Err(SceneError::ItemNotAttached(owner_id));
        }
    }

    let affinity = primitive.kind().affinity();
    let adapter = inner.adapter.clone();
    let attaching = primitive.clone();
    inner
        .dispatcher
        .run_on(affinity, move || adapter.attach(&attaching))
        .await??;

    let recorded = {
        let mut state = inner.state();
        match state.tracker.static_node(owner_id) {
            Some(item_node) => state
                .tracker
                .record_primitive(primitive.clone(), owner_id)
                .map(|()| {
                    let dynamic_node = primitive.kind().has_dynamic_node().then(|| {
                        let seed = state
                            .graph
                            .world_placement(item_node)
                            .unwrap_or(stagehand_core::Placement::IDENTITY);
                        let root = state.graph.root();
                        let node = state.graph.insert(root, seed);
                        state.tracker.set_dynamic_node(id, node);
                        node
                    });
                    (item_node, dynamic_node)
                }),
            None => Err(SceneError::ItemNotAttached(owner_id)),
        }
    };
    let (item_node, dynamic_node) = match recorded {
        Ok(nodes) => nodes,
        Err(error) => {
            // Owner raced away between the check and the record; undo the
            // backend attach so nothing dangles.
            let adapter = inner.adapter.clone();
            let detaching = primitive.clone();
            if let Err(rollback) = inner
                .dispatcher
                .run_on(affinity, move || adapter.detach(&detaching))
                .await
                .and_then(|result| result)
            {
                tracing::warn!(primitive = %id, %rollback, "rollback detach failed");
            }
            return Err(error);
        }
    };

    if primitive.kind().syncs_placement() {
        let mut scope = TaskScope::new();
        let token = scope.token();
        let stage = Arc::downgrade(inner);
        match dynamic_node {
            Some(dynamic_node) => {
                scope.spawn(sync::run_physics_pull(
                    stage.clone(),
                    dynamic_node,
                    item_node,
                    token.clone(),
                ));
                scope.spawn(sync::run_physics_push(
                    stage,
                    primitive.clone(),
                    item_node,
                    token,
                ));
            }
            None => {
                scope.spawn(sync::run_render_sync(
                    stage,
                    primitive.clone(),
                    item_node,
                    token,
                ));
            }
        }
        let mut state = inner.state();
        if state.tracker.is_primitive_attached(id) {
            state.primitive_scopes.insert(id, scope);
        } else {
            drop(state);
            scope.cancel();
        }
    }

    tracing::debug!(primitive = %id, owner = %owner_id, "primitive integrated");
    let _ = inner.events.primitive_entered.send(primitive);
    Ok(())
}

/// One primitive-disintegration step. The sync scope is cancelled *before*
/// the backend detach is dispatched so no placement write can land on a
/// primitive the backend no longer holds.
async fn disintegrate_primitive(inner: &Arc<StageInner>, primitive: ScenePrimitive) -> Result<()> {
    let id = primitive.id();
    let scope = {
        let mut state = inner.state();
        if !state.tracker.is_primitive_attached(id) {
            return Err(SceneError::PrimitiveNotAttached(id));
        }
        state.primitive_scopes.remove(&id)
    };
    if let Some(scope) = scope {
        scope.cancel();
    }

    let adapter = inner.adapter.clone();
    let detaching = primitive.clone();
    let detached = inner
        .dispatcher
        .run_on(primitive.kind().affinity(), move || {
            adapter.detach(&detaching)
        })
        .await
        .and_then(|result| result);

    // Records are discarded even when the backend detach failed; keeping a
    // half-dead primitive attached would wedge every later operation on it.
    {
        let mut state = inner.state();
        let (_, _, dynamic_node) = state.tracker.discard_primitive(id)?;
        if let Some(node) = dynamic_node {
            state.graph.remove(node);
        }
    }

    tracing::debug!(primitive = %id, "primitive disintegrated");
    let _ = inner.events.primitive_exited.send(primitive);
    detached
}

/// Forward an item's child-added events (and its pre-existing children) into
/// the item-integration queue. Subscribes before replaying the snapshot so
/// nothing added in between is missed; the duplicate a replay can produce is
/// rejected by the integration step's attach check.
async fn forward_added_children(stage: Weak<StageInner>, item: SceneItemRef) {
    let mut added = item.host().subscribe_child_added();
    for child in item.host().children() {
        if !enqueue_child(&stage, &item, child) {
            return;
        }
    }
    loop {
        match added.recv().await {
            Ok(child) => {
                if !enqueue_child(&stage, &item, child) {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(item = %item.host().id(), missed, "child-added events lost");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn enqueue_child(stage: &Weak<StageInner>, item: &SceneItemRef, child: SceneItemRef) -> bool {
    let Some(inner) = stage.upgrade() else {
        return false;
    };
    inner
        .queues
        .item_integrate
        .send(ItemAndAncestor {
            item: child,
            ancestor: Some(item.clone()),
        })
        .is_ok()
}

async fn forward_removed_children(stage: Weak<StageInner>, item: SceneItemRef) {
    let mut removed = item.host().subscribe_child_removed();
    loop {
        match removed.recv().await {
            Ok(child) => {
                let Some(inner) = stage.upgrade() else { break };
                if inner.queues.item_disintegrate.send(child).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(item = %item.host().id(), missed, "child-removed events lost");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Forward an item's primitive-added events (and its pre-existing
/// primitives) into the primitive-integration queue
async fn forward_added_primitives(stage: Weak<StageInner>, item: SceneItemRef) {
    let mut added = item.host().subscribe_primitive_added();
    for primitive in item.host().primitives() {
        if !enqueue_primitive(&stage, &item, primitive) {
            return;
        }
    }
    loop {
        match added.recv().await {
            Ok(primitive) => {
                if !enqueue_primitive(&stage, &item, primitive) {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(item = %item.host().id(), missed, "primitive-added events lost");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn enqueue_primitive(
    stage: &Weak<StageInner>,
    item: &SceneItemRef,
    primitive: ScenePrimitive,
) -> bool {
    let Some(inner) = stage.upgrade() else {
        return false;
    };
    inner
        .queues
        .primitive_integrate
        .send(PrimitiveAndOwner {
            primitive,
            owner: item.clone(),
        })
        .is_ok()
}

async fn forward_removed_primitives(stage: Weak<StageInner>, item: SceneItemRef) {
    let mut removed = item.host().subscribe_primitive_removed();
    loop {
        match removed.recv().await {
            Ok(primitive) => {
                let Some(inner) = stage.upgrade() else { break };
                if inner.queues.primitive_disintegrate.send(primitive).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(item = %item.host().id(), missed, "primitive-removed events lost");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
