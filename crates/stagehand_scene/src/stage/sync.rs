//! Placement-synchronization tasks
//!
//! Items get one task keeping their logical placement and their static node
//! reconciled in both directions. Render-affine primitives get one task
//! pushing the owner's world placement to the backend. Physics-affine
//! primitives get two: a pull task folding raw simulation output (the
//! dynamic node) back into the static hierarchy, and a push task writing the
//! static node's world placement into the simulation as authoritative.
//!
//! All tasks sample on the shared clock, suppress unchanged values, and
//! check their scope token inside the lock window before every write so a
//! cancelled scope can no longer touch the graph or the backend.

use super::StageInner;
use crate::context::ContextAffinity;
use crate::error::Result;
use crate::item::SceneItemRef;
use crate::primitive::{PrimitiveKind, ScenePrimitive};
use crate::tasks::ScopeToken;
use stagehand_core::{Placement, PlacementKey, Vec3};
use std::sync::Weak;
use tokio::sync::watch;

/// Rest orientation of a directional or spot light; world direction is this
/// axis rotated by the owner's world rotation
const LIGHT_FORWARD: Vec3 = Vec3::UNIT_X;

fn clock_of(stage: &Weak<StageInner>) -> Option<watch::Receiver<crate::clock::Tick>> {
    stage.upgrade().map(|inner| inner.ticks.clone())
}

/// Keep an item's logical placement and its static node reconciled.
///
/// Writes from the item flow into the node immediately; the node is sampled
/// back into the item once per tick, which is how physics reconciliation
/// becomes visible to placement observers. Duplicate suppression on both
/// directions keeps the feedback path settled.
pub(crate) async fn run_item_sync(
    stage: Weak<StageInner>,
    item: SceneItemRef,
    node: PlacementKey,
    token: ScopeToken,
) {
    let mut placements = item.host().watch_placement();
    let Some(mut ticks) = clock_of(&stage) else {
        return;
    };
    let mut last_local = Some(item.host().placement());
    loop {
        tokio::select! {
            changed = placements.changed() => {
                if changed.is_err() {
                    break;
                }
                let placement = *placements.borrow_and_update();
                let Some(inner) = stage.upgrade() else { break };
                let mut state = inner.state();
                if !token.is_live() {
                    break;
                }
                if !state.graph.set_local_placement(node, placement) {
                    break;
                }
                last_local = Some(placement);
            }
            changed = ticks.changed() => {
                if changed.is_err() {
                    break;
                }
                let local = {
                    let Some(inner) = stage.upgrade() else { break };
                    let state = inner.state();
                    if !token.is_live() {
                        break;
                    }
                    match state.graph.local_placement(node) {
                        Some(local) => local,
                        None => break,
                    }
                };
                if last_local != Some(local) {
                    last_local = Some(local);
                    item.host().set_placement(local);
                }
            }
        }
    }
}

/// Push the owning item's world placement to a render-affine primitive once
/// per tick, skipping ticks where nothing moved
pub(crate) async fn run_render_sync(
    stage: Weak<StageInner>,
    primitive: ScenePrimitive,
    item_node: PlacementKey,
    token: ScopeToken,
) {
    let Some(mut ticks) = clock_of(&stage) else {
        return;
    };
    let mut last = None;
    while ticks.changed().await.is_ok() {
        let Some(inner) = stage.upgrade() else { break };
        let world = {
            let state = inner.state();
            if !token.is_live() {
                break;
            }
            match state.graph.world_placement(item_node) {
                Some(world) => world,
                None => break,
            }
        };
        if last == Some(world) {
            continue;
        }
        last = Some(world);
        if let Err(error) = write_render_placement(&inner, &primitive, world).await {
            tracing::warn!(primitive = %primitive.id(), %error, "render placement write failed");
            let _ = inner.events.errors.send(error);
        }
    }
}

async fn write_render_placement(
    inner: &StageInner,
    primitive: &ScenePrimitive,
    world: Placement,
) -> Result<()> {
    let adapter = inner.adapter.clone();
    let kind = primitive.kind();
    let target = primitive.clone();
    inner
        .dispatcher
        .run_on(ContextAffinity::Render, move || match kind {
            PrimitiveKind::PointLight => adapter.set_position(&target, world.position),
            PrimitiveKind::DirectionalLight => {
                adapter.set_direction(&target, world.rotation.rotate(LIGHT_FORWARD))
            }
            PrimitiveKind::SpotLight => adapter
                .set_position(&target, world.position)
                .and_then(|()| adapter.set_direction(&target, world.rotation.rotate(LIGHT_FORWARD))),
            _ => adapter.set_transform(&target, world),
        })
        .await?
}

/// Fold raw simulation output back into the static hierarchy: each tick the
/// dynamic node's world placement is re-expressed relative to the owner's
/// parent frame and written into the owner's static node
pub(crate) async fn run_physics_pull(
    stage: Weak<StageInner>,
    dynamic_node: PlacementKey,
    item_node: PlacementKey,
    token: ScopeToken,
) {
    let Some(mut ticks) = clock_of(&stage) else {
        return;
    };
    let mut last = None;
    while ticks.changed().await.is_ok() {
        let Some(inner) = stage.upgrade() else { break };
        let mut state = inner.state();
        if !token.is_live() {
            break;
        }
        let Some(world) = state.graph.world_placement(dynamic_node) else {
            break;
        };
        if last == Some(world) {
            continue;
        }
        last = Some(world);
        let Some(parent_frame) = state.graph.parent_world_placement(item_node) else {
            break;
        };
        state
            .graph
            .set_local_placement(item_node, world.relative_to(&parent_frame));
    }
}

/// Write the owner's world placement into the simulation as authoritative,
/// once per tick when it changed. This is the path a logical teleport takes
/// into the physics backend.
pub(crate) async fn run_physics_push(
    stage: Weak<StageInner>,
    primitive: ScenePrimitive,
    item_node: PlacementKey,
    token: ScopeToken,
) {
    let Some(mut ticks) = clock_of(&stage) else {
        return;
    };
    let mut last = None;
    while ticks.changed().await.is_ok() {
        let Some(inner) = stage.upgrade() else { break };
        let world = {
            let state = inner.state();
            if !token.is_live() {
                break;
            }
            match state.graph.world_placement(item_node) {
                Some(world) => world,
                None => break,
            }
        };
        if last == Some(world) {
            continue;
        }
        last = Some(world);
        let adapter = inner.adapter.clone();
        let target = primitive.clone();
        let written = inner
            .dispatcher
            .run_on(ContextAffinity::Physics, move || {
                adapter.set_physics_placement(&target, world)
            })
            .await
            .and_then(|result| result);
        if let Err(error) = written {
            tracing::warn!(primitive = %primitive.id(), %error, "physics placement write failed");
            let _ = inner.events.errors.send(error);
        }
    }
}
