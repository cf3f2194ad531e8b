//! Stagehand Core
//!
//! Passive foundations for the stagehand scene engine:
//!
//! - **Math**: [`Vec3`] and [`Quat`], only what placement composition needs
//! - **Placement**: position + orientation pairs with frame composition
//! - **Placement graph**: an arena of positioning nodes mirroring the
//!   logical scene hierarchy, used to derive world-space placement
//!
//! This crate has no concurrency of its own. The engine crate
//! (`stagehand_scene`) mutates the placement graph exclusively from its
//! pipeline and synchronization tasks.

pub mod graph;
pub mod math;
pub mod placement;

pub use graph::{PlacementGraph, PlacementKey};
pub use math::{Quat, Vec3};
pub use placement::Placement;
