//! Attachment adapter: the seam to the rendering/physics backend
//!
//! The engine never talks to a backend directly. All attach/detach and
//! placement writes go through this trait, and every call is shipped to the
//! execution context matching the primitive's affinity (see
//! [`crate::context`]).

use crate::error::Result;
use crate::primitive::ScenePrimitive;
use stagehand_core::{Placement, Vec3};

/// Performs the actual backend attach/detach/placement calls.
///
/// Implementations are invoked from inside an execution context's drain task,
/// so they may assume calls for a given affinity arrive serialized and on the
/// correct context. An adapter that does not support some primitive kind must
/// return [`SceneError::UnsupportedPrimitive`](crate::SceneError::UnsupportedPrimitive)
/// rather than silently ignoring the call; the engine then leaves the
/// primitive unrecorded.
pub trait AttachmentAdapter: Send + Sync + 'static {
    /// Attach the primitive to the backend
    fn attach(&self, primitive: &ScenePrimitive) -> Result<()>;

    /// Detach the primitive from the backend
    fn detach(&self, primitive: &ScenePrimitive) -> Result<()>;

    /// Write a world-space position (point and spot lights)
    fn set_position(&self, primitive: &ScenePrimitive, position: Vec3) -> Result<()>;

    /// Write a world-space facing direction (directional and spot lights)
    fn set_direction(&self, primitive: &ScenePrimitive, direction: Vec3) -> Result<()>;

    /// Write a full world-space placement (meshes, particle emitters)
    fn set_transform(&self, primitive: &ScenePrimitive, placement: Placement) -> Result<()>;

    /// Write the authoritative simulation placement for a physics-affine
    /// primitive (how teleports flow into the simulation)
    fn set_physics_placement(&self, primitive: &ScenePrimitive, placement: Placement)
        -> Result<()>;
}
