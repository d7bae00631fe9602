//! Network protocol definitions shared between client and server.

use serde::{Deserialize, Serialize};

use crate::math::Vec3;
use crate::task::NpcTask;

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

/// Server tick rate in Hz
pub const SERVER_TICK_RATE: u32 = 20;

/// Default server port
pub const DEFAULT_PORT: u16 = 7777;

/// Wire id meaning "no NPC"
pub const INVALID_NPC_ID: u16 = 0xFFFF;

/// Wire id meaning "on foot"
pub const INVALID_VEHICLE_ID: u16 = 0xFFFF;

/// Extra distance charged to spectating observers when ranking who is closest
pub const SPECTATOR_DISTANCE_PENALTY: f32 = 5.0;

/// Positions are clamped into this range on both sides of the wire
pub const MAX_WORLD_COORDINATE: f32 = 20000.0;

// =============================================================================
// Observer Types
// =============================================================================

/// Connection/presence state of an observing player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum ObserverState {
    /// Connected but not spawned into the world
    #[default]
    None = 0,
    OnFoot = 1,
    Driver = 2,
    Passenger = 3,
    Wasted = 4,
    Spawned = 5,
    Spectating = 6,
}

impl ObserverState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::OnFoot),
            2 => Some(Self::Driver),
            3 => Some(Self::Passenger),
            4 => Some(Self::Wasted),
            5 => Some(Self::Spawned),
            6 => Some(Self::Spectating),
            _ => None,
        }
    }
    
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
    
    /// Whether this observer takes part in streaming at all
    pub fn is_present(&self) -> bool {
        *self != Self::None
    }
}

// =============================================================================
// NPC Control Messages
// =============================================================================

/// Full NPC snapshot sent when an NPC becomes visible to an observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInData {
    pub model: u32,
    pub position: Vec3,
    pub heading: f32,
    pub health: f32,
    pub stun_enabled: bool,
    pub weapon_id: u8,
    pub accuracy: u8,
    pub rate: u8,
    pub skill: u8,
    pub task: NpcTask,
}

/// A single hit as reported by a client
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageReport {
    pub damage: f32,
    pub weapon_id: u8,
    pub body_part: u8,
}

/// What a control message does to the NPC it names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NpcControlAction {
    /// Server -> client: materialise the NPC locally
    StreamIn(StreamInData),
    /// Server -> client: drop the local NPC
    StreamOut,
    /// Client -> server: the NPC damaged the sending player
    GiveDamage(DamageReport),
    /// Client -> server: the NPC was damaged, by the sender or by another NPC
    TakeDamage {
        report: DamageReport,
        /// Absent when the sending player dealt the damage
        damager_npc: Option<u16>,
    },
    /// Server -> client: replace the NPC's current task
    SetActiveTask(NpcTask),
}

/// Reliable control message keyed by NPC id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcControl {
    pub npc_id: u16,
    pub action: NpcControlAction,
}

// =============================================================================
// NPC Sync Messages
// =============================================================================

/// Client -> server position report for an NPC the client simulates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NpcSyncReport {
    pub npc_id: u16,
    pub position: Vec3,
    pub heading: f32,
}

/// Server -> client authoritative NPC state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NpcSyncState {
    pub npc_id: u16,
    pub position: Vec3,
    pub heading: f32,
    pub health: f32,
    /// [`INVALID_VEHICLE_ID`] when on foot
    pub vehicle_id: u16,
    pub vehicle_seat: u8,
}

impl NpcSyncState {
    pub fn vehicle(&self) -> Option<(u16, u8)> {
        if self.vehicle_id == INVALID_VEHICLE_ID {
            None
        } else {
            Some((self.vehicle_id, self.vehicle_seat))
        }
    }
}

/// Clamp a position into the transportable range.
///
/// Returns `None` for non-finite input.
pub fn clamp_position(position: Vec3) -> Option<Vec3> {
    if !crate::math::is_finite(position) {
        return None;
    }
    Some(position.map(|c| c.clamp(-MAX_WORLD_COORDINATE, MAX_WORLD_COORDINATE)))
}

// =============================================================================
// Client -> Server Messages
// =============================================================================

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Join the server
    Connect {
        protocol_version: u32,
    },
    
    /// Leave the server
    Disconnect,
    
    /// Periodic observer state (also serves as keep-alive)
    ObserverUpdate {
        position: Vec3,
        virtual_world: i32,
        state: ObserverState,
    },
    
    /// Position report for an NPC
    NpcSync(NpcSyncReport),
    
    /// Damage report for an NPC
    NpcControl(NpcControl),
}

// =============================================================================
// Server -> Client Messages
// =============================================================================

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Connection accepted
    Connected {
        player_id: u16,
    },
    
    /// Connection refused
    ConnectFailed {
        reason: String,
    },
    
    /// Stream-in/out or task change
    NpcControl(NpcControl),
    
    /// Authoritative NPC state
    NpcSync(NpcSyncState),
}

// =============================================================================
// Serialization helpers
// =============================================================================

impl ClientMessage {
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }
    
    pub fn deserialize(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

impl ServerMessage {
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }
    
    pub fn deserialize(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::MoveMode;

    #[test]
    fn test_stream_in_carries_task() {
        let msg = ServerMessage::NpcControl(NpcControl {
            npc_id: 3,
            action: NpcControlAction::StreamIn(StreamInData {
                model: 121,
                position: [1.0, 2.0, 3.0],
                heading: 90.0,
                health: 100.0,
                stun_enabled: true,
                weapon_id: 31,
                accuracy: 80,
                rate: 100,
                skill: 1,
                task: NpcTask::GoToPoint { destination: [4.0, 5.0, 6.0], mode: MoveMode::Sprint },
            }),
        });
        let bytes = msg.serialize().unwrap();
        assert_eq!(ServerMessage::deserialize(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(ClientMessage::deserialize(&[0xFF, 0xFF, 0xFF]).is_err());
    }

    #[test]
    fn test_clamp_position() {
        assert_eq!(clamp_position([1.0, -2.0, 3.0]), Some([1.0, -2.0, 3.0]));
        assert_eq!(clamp_position([50000.0, 0.0, -50000.0]), Some([20000.0, 0.0, -20000.0]));
        assert_eq!(clamp_position([f32::NAN, 0.0, 0.0]), None);
    }

    #[test]
    fn test_sync_state_vehicle() {
        let mut state = NpcSyncState {
            npc_id: 1,
            position: [0.0; 3],
            heading: 0.0,
            health: 100.0,
            vehicle_id: INVALID_VEHICLE_ID,
            vehicle_seat: 0,
        };
        assert_eq!(state.vehicle(), None);
        state.vehicle_id = 12;
        state.vehicle_seat = 1;
        assert_eq!(state.vehicle(), Some((12, 1)));
    }
}
