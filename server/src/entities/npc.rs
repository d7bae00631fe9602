//! Server-side NPC entity.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use npc_sync_shared::{
    NpcSyncState, StreamInData, Vec3, WeaponSkill, INVALID_VEHICLE_ID, WEAPON_FIST,
};

use super::{ActiveTask, NpcId, PlayerId};

/// Equipped weapon and how well it is handled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponState {
    pub id: u8,
    /// 0..=100
    pub accuracy: u8,
    /// 0..=100
    pub rate: u8,
    pub skill: WeaponSkill,
}

impl Default for WeaponState {
    fn default() -> Self {
        Self {
            id: WEAPON_FIST,
            accuracy: 70,
            rate: 70,
            skill: WeaponSkill::Std,
        }
    }
}

/// Seat an NPC occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleSeat {
    pub vehicle: u16,
    pub seat: u8,
}

/// Vehicle as registered by the host
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vehicle {
    pub position: Vec3,
    pub virtual_world: i32,
    /// Seats besides the driver's
    pub passenger_seats: u8,
}

/// Server-side NPC state
#[derive(Debug)]
pub struct ServerNpc {
    pub id: NpcId,
    pub model: u32,
    /// Own position, ignored while seated in a vehicle
    pub position: Vec3,
    pub heading: f32,
    pub virtual_world: i32,
    pub health: f32,
    pub invulnerable: bool,
    pub stun_enabled: bool,
    pub weapon: WeaponState,
    pub vehicle: Option<VehicleSeat>,
    pub task: ActiveTask,
    /// Players this NPC is currently streamed to
    pub streamed_for: BTreeSet<PlayerId>,
    /// Players that had at least one sync report accepted
    pub verified_senders: BTreeSet<PlayerId>,
    pub last_broadcast: Option<Instant>,
    pub pending_broadcast: bool,
}

impl ServerNpc {
    pub fn new(id: NpcId, model: u32, position: Vec3) -> Self {
        Self {
            id,
            model,
            position,
            heading: 0.0,
            virtual_world: 0,
            health: 100.0,
            invulnerable: false,
            stun_enabled: true,
            weapon: WeaponState::default(),
            vehicle: None,
            task: ActiveTask::StandStill,
            streamed_for: BTreeSet::new(),
            verified_senders: BTreeSet::new(),
            last_broadcast: None,
            pending_broadcast: false,
        }
    }
    
    pub fn is_dead(&self) -> bool {
        self.health <= 0.0
    }
    
    pub fn is_streamed_for(&self, player: PlayerId) -> bool {
        self.streamed_for.contains(&player)
    }
    
    /// Snapshot sent on stream-in, at the given effective position
    pub fn stream_in_data(&self, position: Vec3) -> StreamInData {
        StreamInData {
            model: self.model,
            position,
            heading: self.heading,
            health: self.health,
            stun_enabled: self.stun_enabled,
            weapon_id: self.weapon.id,
            accuracy: self.weapon.accuracy,
            rate: self.weapon.rate,
            skill: self.weapon.skill.as_u8(),
            task: self.task.to_wire(),
        }
    }
    
    /// Authoritative sync state, at the given effective position
    pub fn sync_state(&self, position: Vec3) -> NpcSyncState {
        NpcSyncState {
            npc_id: self.id.index(),
            position,
            heading: self.heading,
            health: self.health,
            vehicle_id: self.vehicle.map_or(INVALID_VEHICLE_ID, |v| v.vehicle),
            vehicle_seat: self.vehicle.map_or(0, |v| v.seat),
        }
    }
    
    /// Whether a coalesced sync broadcast should go out now; clears the flag if so
    pub fn take_pending_broadcast(&mut self, now: Instant, min_gap: Duration) -> bool {
        if !self.pending_broadcast {
            return false;
        }
        let due = self.last_broadcast
            .map_or(true, |last| now.saturating_duration_since(last) > min_gap);
        if due {
            self.last_broadcast = Some(now);
            self.pending_broadcast = false;
        }
        due
    }
}
