//! Placement: a position and orientation pair with frame composition

use crate::math::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// A position and orientation in some reference frame.
///
/// Placements compose: a node's world placement is its ancestor's world
/// placement [`then`](Placement::then) its own local placement. The reverse
/// operation, [`relative_to`](Placement::relative_to), re-expresses a world
/// placement in another frame. That is how physics simulation output (world
/// space) is written back into a node nested in the logical hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Placement {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Placement {
    /// The origin with no rotation
    pub const IDENTITY: Placement = Placement {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub const fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// A placement at `position` with no rotation
    pub const fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Compose `child` under `self`: the result expresses `child` in the
    /// frame `self` is expressed in.
    pub fn then(&self, child: &Placement) -> Placement {
        Placement {
            position: self.position + self.rotation.rotate(child.position),
            rotation: (self.rotation * child.rotation).normalize(),
        }
    }

    /// Invert the placement as a frame transform
    pub fn inverse(&self) -> Placement {
        let inv_rotation = self.rotation.conjugate();
        Placement {
            position: inv_rotation.rotate(-self.position),
            rotation: inv_rotation,
        }
    }

    /// Re-express this placement relative to `frame`.
    ///
    /// `frame.then(&self.relative_to(&frame)) == self` up to rounding.
    pub fn relative_to(&self, frame: &Placement) -> Placement {
        frame.inverse().then(self)
    }
}
