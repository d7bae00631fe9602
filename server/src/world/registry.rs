//! NPC lifecycle: creation, lookup and destruction.

use log::{info, warn};

use npc_sync_shared::Vec3;

use super::NpcComponent;
use crate::entities::{NpcId, ServerNpc};
use crate::error::{NpcError, NpcResult};

impl NpcComponent {
    /// Create an NPC. It reaches observers through their next streaming pass.
    pub fn create_npc(&mut self, model: u32, position: Vec3) -> NpcResult<NpcId> {
        if !npc_sync_shared::is_finite(position) {
            return Err(NpcError::rejected("non-finite spawn position"));
        }
        
        match self.npcs.insert_with(|id| ServerNpc::new(id, model, position)) {
            Ok(id) => {
                info!("Created NPC {} (model {}) at {:?}", id, model, position);
                Ok(id)
            }
            Err(e) => {
                warn!("Cannot create NPC: {}", e);
                Err(e)
            }
        }
    }
    
    /// Destroy an NPC. Streams it out, resets every task aimed at it and then
    /// frees the slot. Returns false if it was already gone.
    pub fn destroy_npc(&mut self, id: NpcId) -> bool {
        if !self.npcs.contains(id) {
            return false;
        }
        
        self.destream(id);
        self.reset_tasks_targeting_npc(id);
        self.npcs.remove(id);
        
        info!("Destroyed NPC {}", id);
        true
    }
    
    /// Create the NPCs listed in the configuration. Returns how many exist.
    pub fn spawn_configured(&mut self) -> usize {
        let spawns = self.config.spawns.clone();
        let mut spawned = 0;
        
        for spawn in spawns {
            let id = match self.create_npc(spawn.model, spawn.position) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping configured NPC (model {}): {}", spawn.model, e);
                    continue;
                }
            };
            if let Some(npc) = self.npcs.get_mut(id) {
                npc.heading = npc_sync_shared::normalize_heading(spawn.heading);
                npc.virtual_world = spawn.virtual_world;
            }
            spawned += 1;
        }
        
        info!("Spawned {} configured NPCs", spawned);
        spawned
    }
}
