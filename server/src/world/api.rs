//! Host-facing NPC API.
//!
//! This is the surface a scripting bridge calls into. Ids are the plain
//! integers scripts see; every call reports success as `bool` (or `None`
//! for getters) and never panics or propagates an error.

use log::debug;

use npc_sync_shared::{AnimationData, MoveMode, INVALID_NPC_ID};

use super::NpcComponent;
use crate::entities::{NpcId, PlayerId};
use crate::error::{NpcError, NpcResult};

/// Sentinel returned for "no seat"
pub const SEAT_NONE: i32 = -1;

/// Arguments of an animation request
#[derive(Debug, Clone)]
pub struct AnimationRequest<'a> {
    pub library: &'a str,
    pub name: &'a str,
    pub delta: f32,
    pub looping: bool,
    pub lock_x: bool,
    pub lock_y: bool,
    pub freeze: bool,
    pub time_ms: u32,
}

/// Borrowed view of an [`NpcComponent`] speaking script-level ids
pub struct NpcApi<'a> {
    component: &'a mut NpcComponent,
}

fn report(what: &str, result: NpcResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!("{} failed: {}", what, e);
            false
        }
    }
}

fn move_mode(mode: i32) -> NpcResult<MoveMode> {
    u8::try_from(mode)
        .ok()
        .and_then(MoveMode::from_u8)
        .ok_or(NpcError::InvalidMoveMode(mode))
}

impl NpcComponent {
    pub fn api(&mut self) -> NpcApi<'_> {
        NpcApi { component: self }
    }
}

impl<'a> NpcApi<'a> {
    fn npc(&self, id: i32) -> Option<NpcId> {
        u16::try_from(id).ok().and_then(|id| self.component.resolve_npc(id))
    }
    
    fn player(&self, id: i32) -> Option<PlayerId> {
        u16::try_from(id).ok().and_then(|id| self.component.resolve_player(id))
    }
    
    fn with_npc(&mut self, what: &str, id: i32, op: impl FnOnce(&mut NpcComponent, NpcId) -> NpcResult<()>) -> bool {
        match self.npc(id) {
            Some(npc) => report(what, op(self.component, npc)),
            None => false,
        }
    }
    
    // =========================================================================
    // Lifecycle
    // =========================================================================
    
    /// Returns the new id, or [`INVALID_NPC_ID`] when the pool is full
    pub fn create(&mut self, model: i32, x: f32, y: f32, z: f32) -> i32 {
        let Ok(model) = u32::try_from(model) else {
            return INVALID_NPC_ID as i32;
        };
        match self.component.create_npc(model, [x, y, z]) {
            Ok(id) => id.index() as i32,
            Err(_) => INVALID_NPC_ID as i32,
        }
    }
    
    pub fn destroy(&mut self, id: i32) -> bool {
        match self.npc(id) {
            Some(npc) => self.component.destroy_npc(npc),
            None => false,
        }
    }
    
    pub fn is_valid(&self, id: i32) -> bool {
        self.npc(id).is_some()
    }
    
    pub fn is_streamed_in(&self, id: i32, player: i32) -> bool {
        match (self.npc(id), self.player(player)) {
            (Some(npc), Some(player)) => self.component.npc(npc).map_or(false, |n| n.is_streamed_for(player)),
            _ => false,
        }
    }
    
    // =========================================================================
    // Attributes
    // =========================================================================
    
    pub fn get_position(&self, id: i32) -> Option<[f32; 3]> {
        self.npc(id).and_then(|npc| self.component.npc_position(npc))
    }
    
    pub fn set_position(&mut self, id: i32, x: f32, y: f32, z: f32) -> bool {
        self.with_npc("set_position", id, |c, npc| c.set_position(npc, [x, y, z]))
    }
    
    pub fn get_heading(&self, id: i32) -> Option<f32> {
        self.npc(id).and_then(|npc| self.component.npc(npc)).map(|n| n.heading)
    }
    
    pub fn set_heading(&mut self, id: i32, heading: f32) -> bool {
        self.with_npc("set_heading", id, |c, npc| c.set_heading(npc, heading))
    }
    
    pub fn get_virtual_world(&self, id: i32) -> Option<i32> {
        self.npc(id).and_then(|npc| self.component.npc_virtual_world(npc))
    }
    
    pub fn set_virtual_world(&mut self, id: i32, virtual_world: i32) -> bool {
        self.with_npc("set_virtual_world", id, |c, npc| c.set_virtual_world(npc, virtual_world))
    }
    
    pub fn get_skin(&self, id: i32) -> Option<i32> {
        self.npc(id).and_then(|npc| self.component.npc(npc)).map(|n| n.model as i32)
    }
    
    pub fn set_skin(&mut self, id: i32, model: i32) -> bool {
        let Ok(model) = u32::try_from(model) else {
            return false;
        };
        self.with_npc("set_skin", id, |c, npc| c.set_model(npc, model))
    }
    
    pub fn get_health(&self, id: i32) -> Option<f32> {
        self.npc(id).and_then(|npc| self.component.npc(npc)).map(|n| n.health)
    }
    
    pub fn set_health(&mut self, id: i32, health: f32) -> bool {
        self.with_npc("set_health", id, |c, npc| c.set_health(npc, health))
    }
    
    pub fn is_invulnerable(&self, id: i32) -> Option<bool> {
        self.npc(id).and_then(|npc| self.component.npc(npc)).map(|n| n.invulnerable)
    }
    
    pub fn set_invulnerable(&mut self, id: i32, invulnerable: bool) -> bool {
        self.with_npc("set_invulnerable", id, |c, npc| c.set_invulnerable(npc, invulnerable))
    }
    
    pub fn is_stun_enabled(&self, id: i32) -> Option<bool> {
        self.npc(id).and_then(|npc| self.component.npc(npc)).map(|n| n.stun_enabled)
    }
    
    pub fn set_stun_enabled(&mut self, id: i32, enabled: bool) -> bool {
        self.with_npc("set_stun_enabled", id, |c, npc| c.set_stun_enabled(npc, enabled))
    }
    
    pub fn get_weapon(&self, id: i32) -> Option<i32> {
        self.npc(id).and_then(|npc| self.component.npc(npc)).map(|n| n.weapon.id as i32)
    }
    
    pub fn set_weapon(&mut self, id: i32, weapon: i32) -> bool {
        let Ok(weapon) = u8::try_from(weapon) else {
            return false;
        };
        self.with_npc("set_weapon", id, |c, npc| c.set_weapon(npc, weapon))
    }
    
    pub fn get_weapon_accuracy(&self, id: i32) -> Option<i32> {
        self.npc(id).and_then(|npc| self.component.npc(npc)).map(|n| n.weapon.accuracy as i32)
    }
    
    /// Clamped to 0..=100
    pub fn set_weapon_accuracy(&mut self, id: i32, accuracy: i32) -> bool {
        let accuracy = accuracy.clamp(0, 100) as u8;
        self.with_npc("set_weapon_accuracy", id, |c, npc| c.set_weapon_accuracy(npc, accuracy))
    }
    
    pub fn get_weapon_rate(&self, id: i32) -> Option<i32> {
        self.npc(id).and_then(|npc| self.component.npc(npc)).map(|n| n.weapon.rate as i32)
    }
    
    /// Clamped to 0..=100
    pub fn set_weapon_rate(&mut self, id: i32, rate: i32) -> bool {
        let rate = rate.clamp(0, 100) as u8;
        self.with_npc("set_weapon_rate", id, |c, npc| c.set_weapon_rate(npc, rate))
    }
    
    pub fn get_weapon_skill(&self, id: i32) -> Option<i32> {
        self.npc(id).and_then(|npc| self.component.npc(npc)).map(|n| n.weapon.skill.as_u8() as i32)
    }
    
    pub fn set_weapon_skill(&mut self, id: i32, skill: i32) -> bool {
        let Ok(skill) = u8::try_from(skill) else {
            return false;
        };
        self.with_npc("set_weapon_skill", id, |c, npc| c.set_weapon_skill(npc, skill))
    }
    
    // =========================================================================
    // Vehicles
    // =========================================================================
    
    pub fn put_in_vehicle(&mut self, id: i32, vehicle: i32, seat: i32) -> bool {
        let Ok(vehicle) = u16::try_from(vehicle) else {
            return false;
        };
        self.with_npc("put_in_vehicle", id, |c, npc| c.put_in_vehicle(npc, vehicle, seat))
    }
    
    pub fn remove_from_vehicle(&mut self, id: i32) -> bool {
        match self.npc(id).map(|npc| self.component.remove_from_vehicle(npc)) {
            Some(Ok(removed)) => removed,
            _ => false,
        }
    }
    
    pub fn get_vehicle(&self, id: i32) -> Option<i32> {
        self.npc(id)
            .and_then(|npc| self.component.npc(npc))
            .and_then(|n| n.vehicle)
            .map(|seat| seat.vehicle as i32)
    }
    
    /// [`SEAT_NONE`] when on foot
    pub fn get_vehicle_seat(&self, id: i32) -> Option<i32> {
        self.npc(id)
            .and_then(|npc| self.component.npc(npc))
            .map(|n| n.vehicle.map_or(SEAT_NONE, |seat| seat.seat as i32))
    }
    
    // =========================================================================
    // Tasks
    // =========================================================================
    
    pub fn clear_tasks(&mut self, id: i32) -> bool {
        self.stand_still(id)
    }
    
    pub fn stand_still(&mut self, id: i32) -> bool {
        self.with_npc("stand_still", id, |c, npc| c.stand_still(npc))
    }
    
    pub fn go_to_point(&mut self, id: i32, x: f32, y: f32, z: f32, mode: i32) -> bool {
        let mode = move_mode(mode);
        self.with_npc("go_to_point", id, |c, npc| c.go_to_point(npc, [x, y, z], mode?))
    }
    
    pub fn attack_player(&mut self, id: i32, player: i32, aggressive: bool) -> bool {
        let Some(target) = self.player(player) else {
            return false;
        };
        self.with_npc("attack_player", id, |c, npc| c.attack_player(npc, target, aggressive))
    }
    
    pub fn attack_npc(&mut self, id: i32, target: i32, aggressive: bool) -> bool {
        let Some(target) = self.npc(target) else {
            return false;
        };
        self.with_npc("attack_npc", id, |c, npc| c.attack_npc(npc, target, aggressive))
    }
    
    pub fn follow_player(&mut self, id: i32, player: i32) -> bool {
        let Some(target) = self.player(player) else {
            return false;
        };
        self.with_npc("follow_player", id, |c, npc| c.follow_player(npc, target))
    }
    
    pub fn play_animation(&mut self, id: i32, request: AnimationRequest<'_>) -> bool {
        let data = AnimationData {
            library: request.library.to_string(),
            name: request.name.to_string(),
            delta: request.delta,
            looping: request.looping,
            lock_x: request.lock_x,
            lock_y: request.lock_y,
            freeze: request.freeze,
            time_ms: request.time_ms,
        };
        self.with_npc("play_animation", id, |c, npc| c.play_animation(npc, data))
    }
}
