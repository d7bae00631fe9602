//! Task state machine.
//!
//! Every assignment replaces the whole task and is broadcast to the NPC's
//! observers. Tasks that reference another entity are reset to StandStill as
//! soon as that entity goes away.

use log::debug;

use npc_sync_shared::{is_animation_library_valid, AnimationData, MoveMode, Vec3};

use super::NpcComponent;
use crate::entities::{ActiveTask, NpcId, PlayerId};
use crate::error::{NpcError, NpcResult};

impl NpcComponent {
    /// Replace the current task of an NPC
    pub fn set_task(&mut self, npc_id: NpcId, task: ActiveTask) -> NpcResult<()> {
        self.check_task(&task)?;
        
        self.npc_mut(npc_id)?.task = task;
        self.broadcast_task(npc_id);
        Ok(())
    }
    
    fn check_task(&self, task: &ActiveTask) -> NpcResult<()> {
        match task {
            ActiveTask::StandStill => Ok(()),
            ActiveTask::AttackPlayer { target, .. } | ActiveTask::FollowPlayer { target } => {
                if self.players.contains(*target) {
                    Ok(())
                } else {
                    Err(NpcError::player_not_found(target.index()))
                }
            }
            ActiveTask::AttackNpc { target, .. } => {
                if self.npcs.contains(*target) {
                    Ok(())
                } else {
                    Err(NpcError::npc_not_found(target.index()))
                }
            }
            ActiveTask::GoToPoint { destination, .. } => {
                if npc_sync_shared::is_finite(*destination) {
                    Ok(())
                } else {
                    Err(NpcError::rejected("non-finite destination"))
                }
            }
            ActiveTask::PlayAnimation { data } => {
                let library_ok = !self.config.validate_animations
                    || is_animation_library_valid(&data.library, self.config.use_all_animations);
                if data.is_well_formed() && library_ok {
                    Ok(())
                } else {
                    Err(NpcError::InvalidAnimation {
                        library: data.library.clone(),
                        name: data.name.clone(),
                    })
                }
            }
        }
    }
    
    pub fn stand_still(&mut self, npc_id: NpcId) -> NpcResult<()> {
        self.set_task(npc_id, ActiveTask::StandStill)
    }
    
    pub fn go_to_point(&mut self, npc_id: NpcId, destination: Vec3, mode: MoveMode) -> NpcResult<()> {
        self.set_task(npc_id, ActiveTask::GoToPoint { destination, mode })
    }
    
    pub fn attack_player(&mut self, npc_id: NpcId, target: PlayerId, aggressive: bool) -> NpcResult<()> {
        self.set_task(npc_id, ActiveTask::AttackPlayer { target, aggressive })
    }
    
    pub fn attack_npc(&mut self, npc_id: NpcId, target: NpcId, aggressive: bool) -> NpcResult<()> {
        self.set_task(npc_id, ActiveTask::AttackNpc { target, aggressive })
    }
    
    pub fn follow_player(&mut self, npc_id: NpcId, target: PlayerId) -> NpcResult<()> {
        self.set_task(npc_id, ActiveTask::FollowPlayer { target })
    }
    
    pub fn play_animation(&mut self, npc_id: NpcId, data: AnimationData) -> NpcResult<()> {
        self.set_task(npc_id, ActiveTask::PlayAnimation { data })
    }
    
    /// Reset attack/follow tasks aimed at a departing player
    pub(crate) fn reset_tasks_targeting_player(&mut self, player: PlayerId) {
        let affected: Vec<NpcId> = self.npcs
            .iter()
            .filter(|(_, npc)| npc.task.targets_player(player))
            .map(|(id, _)| id)
            .collect();
        self.reset_tasks(affected);
    }
    
    /// Reset attack tasks aimed at an NPC being destroyed
    pub(crate) fn reset_tasks_targeting_npc(&mut self, target: NpcId) {
        let affected: Vec<NpcId> = self.npcs
            .iter()
            .filter(|(_, npc)| npc.task.targets_npc(target))
            .map(|(id, _)| id)
            .collect();
        self.reset_tasks(affected);
    }
    
    fn reset_tasks(&mut self, npcs: Vec<NpcId>) {
        for npc_id in npcs {
            if let Some(npc) = self.npcs.get_mut(npc_id) {
                npc.task = ActiveTask::StandStill;
                debug!("NPC {} lost its task target", npc_id);
            }
            self.broadcast_task(npc_id);
        }
    }
}
