//! Attribute setters and vehicle seating.
//!
//! Presentation changes (model, heading, weapon, stun flag) re-stream the NPC
//! to its observers; position and health go out as a sync broadcast.

use npc_sync_shared::{is_weapon_equippable, normalize_heading, Vec3, WeaponSkill};

use super::NpcComponent;
use crate::entities::{NpcId, VehicleSeat};
use crate::error::{NpcError, NpcResult};

impl NpcComponent {
    pub fn set_position(&mut self, npc_id: NpcId, position: Vec3) -> NpcResult<()> {
        if !npc_sync_shared::is_finite(position) {
            return Err(NpcError::rejected("non-finite position"));
        }
        self.npc_mut(npc_id)?.position = position;
        self.broadcast_sync(npc_id);
        Ok(())
    }
    
    pub fn set_heading(&mut self, npc_id: NpcId, heading: f32) -> NpcResult<()> {
        if !heading.is_finite() {
            return Err(NpcError::rejected("non-finite heading"));
        }
        self.npc_mut(npc_id)?.heading = normalize_heading(heading);
        self.restream(npc_id);
        Ok(())
    }
    
    /// Observers catch up on their next streaming pass
    pub fn set_virtual_world(&mut self, npc_id: NpcId, virtual_world: i32) -> NpcResult<()> {
        self.npc_mut(npc_id)?.virtual_world = virtual_world;
        Ok(())
    }
    
    pub fn set_model(&mut self, npc_id: NpcId, model: u32) -> NpcResult<()> {
        self.npc_mut(npc_id)?.model = model;
        self.restream(npc_id);
        Ok(())
    }
    
    /// Setting health on a dead NPC revives it through a re-stream
    pub fn set_health(&mut self, npc_id: NpcId, health: f32) -> NpcResult<()> {
        if !health.is_finite() {
            return Err(NpcError::rejected("non-finite health"));
        }
        let npc = self.npc_mut(npc_id)?;
        let was_dead = npc.is_dead();
        npc.health = health;
        
        self.broadcast_sync(npc_id);
        if was_dead {
            self.restream(npc_id);
        }
        Ok(())
    }
    
    pub fn set_invulnerable(&mut self, npc_id: NpcId, invulnerable: bool) -> NpcResult<()> {
        self.npc_mut(npc_id)?.invulnerable = invulnerable;
        Ok(())
    }
    
    pub fn set_stun_enabled(&mut self, npc_id: NpcId, enabled: bool) -> NpcResult<()> {
        let npc = self.npc_mut(npc_id)?;
        if npc.stun_enabled != enabled {
            npc.stun_enabled = enabled;
            self.restream(npc_id);
        }
        Ok(())
    }
    
    /// Weapons without an inventory slot and detonator-class weapons are refused
    pub fn set_weapon(&mut self, npc_id: NpcId, weapon_id: u8) -> NpcResult<()> {
        if !is_weapon_equippable(weapon_id) {
            return Err(NpcError::InvalidWeapon(weapon_id));
        }
        self.npc_mut(npc_id)?.weapon.id = weapon_id;
        self.restream(npc_id);
        Ok(())
    }
    
    pub fn set_weapon_accuracy(&mut self, npc_id: NpcId, accuracy: u8) -> NpcResult<()> {
        self.npc_mut(npc_id)?.weapon.accuracy = accuracy.min(100);
        self.restream(npc_id);
        Ok(())
    }
    
    pub fn set_weapon_rate(&mut self, npc_id: NpcId, rate: u8) -> NpcResult<()> {
        self.npc_mut(npc_id)?.weapon.rate = rate.min(100);
        self.restream(npc_id);
        Ok(())
    }
    
    pub fn set_weapon_skill(&mut self, npc_id: NpcId, skill: u8) -> NpcResult<()> {
        let skill = WeaponSkill::from_u8(skill).ok_or(NpcError::InvalidSkill(skill))?;
        self.npc_mut(npc_id)?.weapon.skill = skill;
        self.restream(npc_id);
        Ok(())
    }
    
    /// Seat 0 is the driver; passenger seats are limited by the vehicle
    pub fn put_in_vehicle(&mut self, npc_id: NpcId, vehicle_id: u16, seat: i32) -> NpcResult<()> {
        let vehicle = self.vehicles
            .get(&vehicle_id)
            .ok_or(NpcError::NotFound { what: "vehicle", id: vehicle_id as u32 })?;
        if seat < 0 || seat > vehicle.passenger_seats as i32 {
            return Err(NpcError::InvalidSeat(seat));
        }
        
        self.npc_mut(npc_id)?.vehicle = Some(VehicleSeat { vehicle: vehicle_id, seat: seat as u8 });
        self.broadcast_sync(npc_id);
        Ok(())
    }
    
    /// Leave the current vehicle where it stands. Returns false when on foot.
    pub fn remove_from_vehicle(&mut self, npc_id: NpcId) -> NpcResult<bool> {
        let npc = self.npcs
            .get_mut(npc_id)
            .ok_or(NpcError::npc_not_found(npc_id.index()))?;
        let Some(seat) = npc.vehicle.take() else {
            return Ok(false);
        };
        if let Some(vehicle) = self.vehicles.get(&seat.vehicle) {
            npc.position = vehicle.position;
            npc.virtual_world = vehicle.virtual_world;
        }
        
        self.broadcast_sync(npc_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::super::test_support::*;
    use super::*;
    use crate::entities::Vehicle;

    #[test]
    fn test_presentation_changes_restream() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let p = join(&mut c, [1.0, 0.0, 0.0], now);
        c.take_outgoing();
        
        c.set_model(npc, 200).unwrap();
        c.set_weapon(npc, 31).unwrap();
        c.set_weapon_skill(npc, 2).unwrap();
        c.set_stun_enabled(npc, false).unwrap();
        let out = c.take_outgoing();
        assert_eq!(stream_outs(&out, p, npc), 4);
        assert_eq!(stream_ins(&out, p, npc), 4);
        assert_eq!(syncs(&out, p, npc), 0);
        
        // Same stun value again is a no-op
        c.set_stun_enabled(npc, false).unwrap();
        assert!(c.take_outgoing().is_empty());
    }

    #[test]
    fn test_position_and_health_use_sync() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let p = join(&mut c, [1.0, 0.0, 0.0], now);
        c.take_outgoing();
        
        c.set_position(npc, [2.0, 2.0, 0.0]).unwrap();
        c.set_health(npc, 50.0).unwrap();
        let out = c.take_outgoing();
        assert_eq!(syncs(&out, p, npc), 2);
        assert_eq!(stream_ins(&out, p, npc), 0);
        assert_eq!(c.npc(npc).unwrap().position, [2.0, 2.0, 0.0]);
    }

    #[test]
    fn test_reviving_restreams() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let p = join(&mut c, [1.0, 0.0, 0.0], now);
        c.set_health(npc, 0.0).unwrap();
        c.take_outgoing();
        
        c.set_health(npc, 100.0).unwrap();
        let out = c.take_outgoing();
        assert_eq!(syncs(&out, p, npc), 1);
        assert_eq!(stream_ins(&out, p, npc), 1);
    }

    #[test]
    fn test_weapon_rules() {
        let mut c = component();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        
        assert_eq!(c.set_weapon(npc, 39), Err(NpcError::InvalidWeapon(39)));
        assert_eq!(c.set_weapon(npc, 40), Err(NpcError::InvalidWeapon(40)));
        assert_eq!(c.set_weapon(npc, 200), Err(NpcError::InvalidWeapon(200)));
        assert_eq!(c.set_weapon_skill(npc, 3), Err(NpcError::InvalidSkill(3)));
        
        c.set_weapon_accuracy(npc, 250).unwrap();
        c.set_weapon_rate(npc, 40).unwrap();
        let weapon = c.npc(npc).unwrap().weapon;
        assert_eq!(weapon.accuracy, 100);
        assert_eq!(weapon.rate, 40);
    }

    #[test]
    fn test_heading_is_normalised() {
        let mut c = component();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        c.set_heading(npc, -90.0).unwrap();
        assert_eq!(c.npc(npc).unwrap().heading, 270.0);
        assert!(c.set_heading(npc, f32::NAN).is_err());
    }

    #[test]
    fn test_seat_rules() {
        let mut c = component();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        c.upsert_vehicle(1, Vehicle { position: [0.0; 3], virtual_world: 0, passenger_seats: 1 });
        
        assert_eq!(c.put_in_vehicle(npc, 1, -1), Err(NpcError::InvalidSeat(-1)));
        assert_eq!(c.put_in_vehicle(npc, 1, 2), Err(NpcError::InvalidSeat(2)));
        assert!(c.put_in_vehicle(npc, 9, 0).is_err());
        assert_eq!(c.npc(npc).unwrap().vehicle, None);
        
        c.put_in_vehicle(npc, 1, 1).unwrap();
        assert_eq!(c.remove_from_vehicle(npc), Ok(true));
        assert_eq!(c.remove_from_vehicle(npc), Ok(false));
    }
}
