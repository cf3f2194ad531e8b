//! Asynchronous scene-graph integration engine
//!
//! A [`SceneStage`] accepts a dynamically changing tree of scene items, each
//! owning primitives (lights, meshes, particle emitters, physics bodies,
//! ghost volumes, joints), and keeps a rendering/physics backend attached to
//! exactly the current membership:
//!
//! - membership changes flow through four FIFO pipeline queues, so attach
//!   and detach never race each other for the same entity kind;
//! - every backend call is shipped to the execution context matching the
//!   primitive's affinity ([`context`]);
//! - placement-synchronization tasks sample a shared [`clock`] and reconcile
//!   logical placements, positioning nodes, and the backend every tick.
//!
//! The backend itself stays behind the [`AttachmentAdapter`] seam; the
//! engine owns relationships, ordering, and task lifetimes.

pub mod adapter;
pub mod clock;
pub mod context;
pub mod error;
pub mod item;
pub mod primitive;
pub mod stage;
pub mod tasks;
pub mod tracker;

pub use adapter::AttachmentAdapter;
pub use clock::{Clock, IntervalClock, ManualClock, Tick};
pub use context::{ContextAffinity, Dispatcher, ExecContext};
pub use error::{Result, SceneError};
pub use item::{BasicItem, ItemHost, ItemId, SceneItem, SceneItemRef};
pub use primitive::{PrimitiveId, PrimitiveKind, ScenePrimitive};
pub use stage::{SceneStage, StageConfig};
pub use tasks::{ScopeToken, TaskScope};
