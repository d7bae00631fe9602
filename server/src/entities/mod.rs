//! Server-side entity definitions.

pub mod player;
mod npc;
mod task;

use crate::pool::Handle;

/// Generational reference to an NPC slot
pub type NpcId = Handle;

/// Generational reference to a connected player
pub type PlayerId = Handle;

pub use player::ServerPlayer;
pub use npc::{ServerNpc, WeaponState, VehicleSeat, Vehicle};
pub use task::ActiveTask;
