//! NPC world management.
//!
//! [`NpcComponent`] is the context object that owns every NPC, observer and
//! vehicle record. All operations run on the tick loop that owns it; nothing
//! here is shared across threads. Outgoing traffic is queued in an
//! [`Outbox`] that the transport drains once per tick.

mod registry;
mod streaming;
mod tasks;
mod attributes;
mod sync;
mod authority;
mod damage;
pub mod api;

pub use damage::{Attacker, NpcEventHandler};
pub use sync::{validate_report, SyncVerdict};

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, info};

use npc_sync_shared::{ObserverState, ServerMessage, Vec3};

use crate::config::ServerConfig;
use crate::entities::{NpcId, PlayerId, ServerNpc, ServerPlayer, Vehicle};
use crate::error::{NpcError, NpcResult};
use crate::pool::Pool;

/// Messages waiting to be sent, in the order they were produced
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<(PlayerId, ServerMessage)>,
}

impl Outbox {
    pub fn send(&mut self, to: PlayerId, message: ServerMessage) {
        self.messages.push((to, message));
    }
    
    pub fn send_to_all<'a>(&mut self, to: impl IntoIterator<Item = &'a PlayerId>, message: ServerMessage) {
        for player in to {
            self.messages.push((*player, message.clone()));
        }
    }
    
    pub fn drain(&mut self) -> Vec<(PlayerId, ServerMessage)> {
        std::mem::take(&mut self.messages)
    }
    
    pub fn len(&self) -> usize {
        self.messages.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Owner of all NPC state
pub struct NpcComponent {
    config: ServerConfig,
    npcs: Pool<ServerNpc>,
    players: Pool<ServerPlayer>,
    vehicles: HashMap<u16, Vehicle>,
    /// Damage and death handlers, consulted in registration order
    handlers: Vec<Box<dyn NpcEventHandler>>,
    outbox: Outbox,
}

impl NpcComponent {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            npcs: Pool::new(1, config.npc_pool_size),
            players: Pool::new(0, config.player_pool_size),
            vehicles: HashMap::new(),
            handlers: Vec::new(),
            outbox: Outbox::default(),
            config,
        }
    }
    
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
    
    /// Register a damage/death handler. Handlers run in registration order.
    pub fn add_event_handler(&mut self, handler: Box<dyn NpcEventHandler>) {
        self.handlers.push(handler);
    }
    
    /// Take everything queued for sending since the last call
    pub fn take_outgoing(&mut self) -> Vec<(PlayerId, ServerMessage)> {
        self.outbox.drain()
    }
    
    // =========================================================================
    // Lookups
    // =========================================================================
    
    pub fn npc(&self, id: NpcId) -> Option<&ServerNpc> {
        self.npcs.get(id)
    }
    
    pub fn npcs(&self) -> impl Iterator<Item = &ServerNpc> {
        self.npcs.iter().map(|(_, npc)| npc)
    }
    
    pub fn npc_count(&self) -> usize {
        self.npcs.len()
    }
    
    /// Live NPC behind a wire id
    pub fn resolve_npc(&self, wire_id: u16) -> Option<NpcId> {
        self.npcs.resolve(wire_id)
    }
    
    pub fn player(&self, id: PlayerId) -> Option<&ServerPlayer> {
        self.players.get(id)
    }
    
    pub fn resolve_player(&self, wire_id: u16) -> Option<PlayerId> {
        self.players.resolve(wire_id)
    }
    
    pub fn vehicle(&self, id: u16) -> Option<&Vehicle> {
        self.vehicles.get(&id)
    }
    
    /// Position of an NPC, taken from its vehicle while seated
    pub fn npc_position(&self, id: NpcId) -> Option<Vec3> {
        self.npcs.get(id).map(|npc| effective_position(&self.vehicles, npc))
    }
    
    pub fn npc_virtual_world(&self, id: NpcId) -> Option<i32> {
        self.npcs.get(id).map(|npc| effective_world(&self.vehicles, npc))
    }
    
    pub fn is_player_afk(&self, id: PlayerId, now: Instant) -> bool {
        self.players
            .get(id)
            .map_or(true, |player| player.is_afk(now, self.config.afk_timeout()))
    }
    
    fn npc_mut(&mut self, id: NpcId) -> NpcResult<&mut ServerNpc> {
        self.npcs.get_mut(id).ok_or(NpcError::npc_not_found(id.index()))
    }
    
    // =========================================================================
    // Players
    // =========================================================================
    
    pub fn connect_player(&mut self) -> NpcResult<PlayerId> {
        let id = self.players.insert_with(ServerPlayer::new)?;
        info!("Player {} joined", id);
        Ok(id)
    }
    
    /// Remove a player: stream out every NPC, forget it as a sync source and
    /// reset tasks aimed at it
    pub fn disconnect_player(&mut self, id: PlayerId) -> bool {
        if !self.players.contains(id) {
            return false;
        }
        
        for npc_id in self.npcs.handles() {
            let streamed = self.npcs.get(npc_id).map_or(false, |npc| npc.is_streamed_for(id));
            if streamed {
                self.stream_out_for(npc_id, id);
            } else if let Some(npc) = self.npcs.get_mut(npc_id) {
                npc.verified_senders.remove(&id);
            }
        }
        self.reset_tasks_targeting_player(id);
        
        self.players.remove(id);
        info!("Player {} left", id);
        true
    }
    
    /// Apply an observer update and run its streaming pass when due.
    /// Non-finite positions are refused and leave the observer untouched.
    pub fn update_player(
        &mut self,
        id: PlayerId,
        position: Vec3,
        virtual_world: i32,
        state: ObserverState,
        now: Instant,
    ) -> bool {
        if !npc_sync_shared::is_finite(position) {
            debug!("Player {} sent a non-finite position", id);
            return false;
        }
        
        let stream_rate = self.config.stream_rate();
        let due = match self.players.get_mut(id) {
            Some(player) => {
                player.position = position;
                player.virtual_world = virtual_world;
                player.state = state;
                if state.is_present() {
                    player.last_update = Some(now);
                }
                player.take_stream_pass(now, stream_rate)
            }
            None => return false,
        };
        
        if due {
            self.update_streaming_for(id);
        }
        true
    }
    
    // =========================================================================
    // Vehicles
    // =========================================================================
    
    /// Register or move a vehicle
    pub fn upsert_vehicle(&mut self, id: u16, vehicle: Vehicle) {
        self.vehicles.insert(id, vehicle);
    }
    
    /// Forget a vehicle, ejecting every NPC seated in it
    pub fn remove_vehicle(&mut self, id: u16) -> bool {
        let seated: Vec<NpcId> = self.npcs
            .iter()
            .filter(|(_, npc)| npc.vehicle.map_or(false, |seat| seat.vehicle == id))
            .map(|(npc_id, _)| npc_id)
            .collect();
        
        for npc_id in seated {
            if let Err(e) = self.remove_from_vehicle(npc_id) {
                debug!("Failed to eject NPC {} from vehicle {}: {}", npc_id, id, e);
            }
        }
        
        self.vehicles.remove(&id).is_some()
    }
    
    // =========================================================================
    // Tick
    // =========================================================================
    
    /// Flush coalesced sync broadcasts that are due
    pub fn tick(&mut self, now: Instant) {
        let min_gap = self.config.on_foot_sync_rate();
        for npc_id in self.npcs.handles() {
            let due = self.npcs
                .get_mut(npc_id)
                .map_or(false, |npc| npc.take_pending_broadcast(now, min_gap));
            if due {
                self.broadcast_sync(npc_id);
            }
        }
    }
}

fn effective_position(vehicles: &HashMap<u16, Vehicle>, npc: &ServerNpc) -> Vec3 {
    npc.vehicle
        .and_then(|seat| vehicles.get(&seat.vehicle))
        .map_or(npc.position, |vehicle| vehicle.position)
}

fn effective_world(vehicles: &HashMap<u16, Vehicle>, npc: &ServerNpc) -> i32 {
    npc.vehicle
        .and_then(|seat| vehicles.get(&seat.vehicle))
        .map_or(npc.virtual_world, |vehicle| vehicle.virtual_world)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::{Duration, Instant};

    use npc_sync_shared::{NpcControlAction, ObserverState, ServerMessage, Vec3};

    use super::NpcComponent;
    use crate::config::ServerConfig;
    use crate::entities::{NpcId, PlayerId};

    pub fn component() -> NpcComponent {
        NpcComponent::new(ServerConfig::default())
    }

    /// Far enough apart that every update runs a streaming pass
    pub fn step(now: Instant) -> Instant {
        now + Duration::from_millis(1000)
    }

    /// Connect a player and place it in the world
    pub fn join(component: &mut NpcComponent, position: Vec3, now: Instant) -> PlayerId {
        let id = component.connect_player().unwrap();
        assert!(component.update_player(id, position, 0, ObserverState::OnFoot, now));
        id
    }

    pub fn stream_ins(messages: &[(PlayerId, ServerMessage)], to: PlayerId, npc: NpcId) -> usize {
        count(messages, to, npc, |action| matches!(action, NpcControlAction::StreamIn(_)))
    }

    pub fn stream_outs(messages: &[(PlayerId, ServerMessage)], to: PlayerId, npc: NpcId) -> usize {
        count(messages, to, npc, |action| matches!(action, NpcControlAction::StreamOut))
    }

    pub fn syncs(messages: &[(PlayerId, ServerMessage)], to: PlayerId, npc: NpcId) -> usize {
        messages
            .iter()
            .filter(|(player, msg)| {
                *player == to && matches!(msg, ServerMessage::NpcSync(state) if state.npc_id == npc.index())
            })
            .count()
    }

    fn count(
        messages: &[(PlayerId, ServerMessage)],
        to: PlayerId,
        npc: NpcId,
        pred: impl Fn(&NpcControlAction) -> bool,
    ) -> usize {
        messages
            .iter()
            .filter(|(player, msg)| match msg {
                ServerMessage::NpcControl(control) => {
                    *player == to && control.npc_id == npc.index() && pred(&control.action)
                }
                _ => false,
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::entities::VehicleSeat;

    #[test]
    fn test_disconnect_streams_out_and_forgets_sender() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0, 0.0, 0.0]).unwrap();
        let p = join(&mut c, [1.0, 0.0, 0.0], now);
        c.npcs.get_mut(npc).unwrap().verified_senders.insert(p);
        c.take_outgoing();
        
        assert!(c.disconnect_player(p));
        let out = c.take_outgoing();
        assert_eq!(stream_outs(&out, p, npc), 1);
        assert!(c.npc(npc).unwrap().streamed_for.is_empty());
        assert!(c.npc(npc).unwrap().verified_senders.is_empty());
        assert!(!c.disconnect_player(p));
    }

    #[test]
    fn test_removing_vehicle_ejects_passengers() {
        let mut c = component();
        let npc = c.create_npc(0, [0.0, 0.0, 0.0]).unwrap();
        c.upsert_vehicle(7, Vehicle { position: [50.0, 50.0, 5.0], virtual_world: 3, passenger_seats: 3 });
        c.put_in_vehicle(npc, 7, 1).unwrap();
        assert_eq!(c.npc(npc).unwrap().vehicle, Some(VehicleSeat { vehicle: 7, seat: 1 }));
        
        // Moving the vehicle moves the NPC with it
        c.upsert_vehicle(7, Vehicle { position: [60.0, 50.0, 5.0], virtual_world: 3, passenger_seats: 3 });
        assert_eq!(c.npc_position(npc), Some([60.0, 50.0, 5.0]));
        
        assert!(c.remove_vehicle(7));
        let state = c.npc(npc).unwrap();
        assert_eq!(state.vehicle, None);
        assert_eq!(state.position, [60.0, 50.0, 5.0]);
        assert_eq!(state.virtual_world, 3);
    }

    #[test]
    fn test_tick_flushes_pending_sync_once() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0, 0.0, 0.0]).unwrap();
        let p = join(&mut c, [1.0, 0.0, 0.0], now);
        c.npcs.get_mut(npc).unwrap().pending_broadcast = true;
        c.take_outgoing();
        
        c.tick(now);
        c.tick(now + std::time::Duration::from_millis(100));
        let out = c.take_outgoing();
        assert_eq!(syncs(&out, p, npc), 1);
    }
}
