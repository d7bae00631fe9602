//! Per-observer streaming and the broadcasts that go to streamed observers.

use log::debug;

use npc_sync_shared::{distance_sqr, NpcControl, NpcControlAction, ServerMessage};

use super::{effective_position, effective_world, NpcComponent};
use crate::entities::{NpcId, PlayerId};

fn control(npc: NpcId, action: NpcControlAction) -> ServerMessage {
    ServerMessage::NpcControl(NpcControl { npc_id: npc.index(), action })
}

impl NpcComponent {
    /// Re-evaluate which NPCs a player should see, emitting the transitions
    pub(crate) fn update_streaming_for(&mut self, player_id: PlayerId) {
        let (state, world, position) = match self.players.get(player_id) {
            Some(player) => (player.state, player.virtual_world, player.position),
            None => return,
        };
        let radius_sqr = self.config.stream_radius * self.config.stream_radius;
        
        for npc_id in self.npcs.handles() {
            let (should_stream, is_streamed) = match self.npcs.get(npc_id) {
                Some(npc) => {
                    let npc_position = effective_position(&self.vehicles, npc);
                    let should = state.is_present()
                        && effective_world(&self.vehicles, npc) == world
                        && distance_sqr(npc_position, position) < radius_sqr;
                    (should, npc.is_streamed_for(player_id))
                }
                None => continue,
            };
            
            if should_stream && !is_streamed {
                self.stream_in_for(npc_id, player_id);
            } else if !should_stream && is_streamed {
                self.stream_out_for(npc_id, player_id);
            }
        }
    }
    
    /// Start streaming an NPC to a player
    pub(crate) fn stream_in_for(&mut self, npc_id: NpcId, player_id: PlayerId) {
        if let Some(npc) = self.npcs.get_mut(npc_id) {
            npc.streamed_for.insert(player_id);
        }
        self.send_stream_in(npc_id, player_id);
        debug!("NPC {} streamed in for player {}", npc_id, player_id);
    }
    
    /// Stop streaming an NPC to a player; the player stops being a verified sender
    pub(crate) fn stream_out_for(&mut self, npc_id: NpcId, player_id: PlayerId) {
        if let Some(npc) = self.npcs.get_mut(npc_id) {
            npc.streamed_for.remove(&player_id);
            npc.verified_senders.remove(&player_id);
        }
        self.outbox.send(player_id, control(npc_id, NpcControlAction::StreamOut));
        debug!("NPC {} streamed out for player {}", npc_id, player_id);
    }
    
    fn send_stream_in(&mut self, npc_id: NpcId, player_id: PlayerId) {
        let Some(npc) = self.npcs.get(npc_id) else {
            return;
        };
        let position = effective_position(&self.vehicles, npc);
        let data = npc.stream_in_data(position);
        let seated = npc.vehicle.is_some().then(|| npc.sync_state(position));
        
        self.outbox.send(player_id, control(npc_id, NpcControlAction::StreamIn(data)));
        // Stream-in has no vehicle fields; a seated NPC follows up with its sync state
        if let Some(state) = seated {
            self.outbox.send(player_id, ServerMessage::NpcSync(state));
        }
    }
    
    /// Stream out and back in for every current observer, keeping the sets
    pub(crate) fn restream(&mut self, npc_id: NpcId) {
        let observers: Vec<PlayerId> = match self.npcs.get(npc_id) {
            Some(npc) => npc.streamed_for.iter().copied().collect(),
            None => return,
        };
        for player_id in observers {
            self.outbox.send(player_id, control(npc_id, NpcControlAction::StreamOut));
            self.send_stream_in(npc_id, player_id);
        }
    }
    
    /// Tell every current observer the NPC is gone
    pub(crate) fn destream(&mut self, npc_id: NpcId) {
        let Some(npc) = self.npcs.get_mut(npc_id) else {
            return;
        };
        let observers = std::mem::take(&mut npc.streamed_for);
        npc.verified_senders.clear();
        self.outbox.send_to_all(&observers, control(npc_id, NpcControlAction::StreamOut));
    }
    
    /// Send the authoritative state to every observer right away
    pub(crate) fn broadcast_sync(&mut self, npc_id: NpcId) {
        let Some(npc) = self.npcs.get(npc_id) else {
            return;
        };
        let state = npc.sync_state(effective_position(&self.vehicles, npc));
        self.outbox.send_to_all(&npc.streamed_for, ServerMessage::NpcSync(state));
    }
    
    /// Send the current task to every observer
    pub(crate) fn broadcast_task(&mut self, npc_id: NpcId) {
        let Some(npc) = self.npcs.get(npc_id) else {
            return;
        };
        let message = control(npc_id, NpcControlAction::SetActiveTask(npc.task.to_wire()));
        self.outbox.send_to_all(&npc.streamed_for, message);
    }
}
