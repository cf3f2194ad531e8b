//! Scene primitives: leaf, backend-attachable units

use crate::context::ContextAffinity;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a primitive, stable across attach/detach cycles
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitiveId(u64);

impl PrimitiveId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PrimitiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "primitive#{}", self.0)
    }
}

/// The closed set of primitive kinds the engine can attach.
///
/// The kind selects the attach/detach behavior, the execution context the
/// backend calls must run on, and the shape of placement synchronization.
/// Keeping this a closed sum type means dispatch is exhaustive at compile
/// time; "unsupported kind" failures can only come from a partial backend
/// adapter, never from the engine itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// Omnidirectional light; tracks the owning item's world position
    PointLight,
    /// Light with a facing but no position; tracks world orientation
    DirectionalLight,
    /// Light with both a position and a facing
    SpotLight,
    /// Renderable geometry; tracks the full world placement
    Mesh,
    /// Particle system; tracks the full world placement
    ParticleEmitter,
    /// Physics-simulated body; simulation output flows back into the
    /// logical hierarchy through a dynamic positioning node
    RigidBody,
    /// Non-colliding trigger volume, synchronized like a rigid body
    GhostVolume,
    /// Constraint between physics bodies; carries no transform of its own
    PhysicsJoint,
}

impl PrimitiveKind {
    /// The execution context backend calls for this kind must run on
    pub fn affinity(&self) -> ContextAffinity {
        match self {
            PrimitiveKind::PointLight
            | PrimitiveKind::DirectionalLight
            | PrimitiveKind::SpotLight
            | PrimitiveKind::Mesh
            | PrimitiveKind::ParticleEmitter => ContextAffinity::Render,
            PrimitiveKind::RigidBody | PrimitiveKind::GhostVolume | PrimitiveKind::PhysicsJoint => {
                ContextAffinity::Physics
            }
        }
    }

    /// Whether this kind is backed by a dynamic positioning node that the
    /// physics simulation writes world-space output into
    pub fn has_dynamic_node(&self) -> bool {
        matches!(self, PrimitiveKind::RigidBody | PrimitiveKind::GhostVolume)
    }

    /// Whether this kind gets a placement-synchronization task. Joints are
    /// positioned implicitly by the bodies they join.
    pub fn syncs_placement(&self) -> bool {
        !matches!(self, PrimitiveKind::PhysicsJoint)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::PointLight => "point-light",
            PrimitiveKind::DirectionalLight => "directional-light",
            PrimitiveKind::SpotLight => "spot-light",
            PrimitiveKind::Mesh => "mesh",
            PrimitiveKind::ParticleEmitter => "particle-emitter",
            PrimitiveKind::RigidBody => "rigid-body",
            PrimitiveKind::GhostVolume => "ghost-volume",
            PrimitiveKind::PhysicsJoint => "physics-joint",
        }
    }
}

/// A leaf, backend-attachable unit owned by exactly one item at a time.
///
/// Primitives are cheap handles: cloning one does not create a new backend
/// object. Identity (equality, hashing) follows the [`PrimitiveId`].
#[derive(Clone, Debug)]
pub struct ScenePrimitive {
    id: PrimitiveId,
    kind: PrimitiveKind,
}

impl ScenePrimitive {
    pub fn new(kind: PrimitiveKind) -> Self {
        Self {
            id: PrimitiveId::next(),
            kind,
        }
    }

    pub fn id(&self) -> PrimitiveId {
        self.id
    }

    pub fn kind(&self) -> PrimitiveKind {
        self.kind
    }
}

impl PartialEq for ScenePrimitive {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ScenePrimitive {}

impl std::hash::Hash for ScenePrimitive {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
