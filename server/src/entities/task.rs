//! Server-side NPC task.
//!
//! Mirrors the wire [`NpcTask`] but holds generational references, so a
//! target that left or was destroyed can be detected by a failed lookup.

use npc_sync_shared::{AnimationData, MoveMode, NpcTask, Vec3};

use super::{NpcId, PlayerId};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ActiveTask {
    #[default]
    StandStill,
    AttackPlayer {
        target: PlayerId,
        aggressive: bool,
    },
    AttackNpc {
        target: NpcId,
        aggressive: bool,
    },
    GoToPoint {
        destination: Vec3,
        mode: MoveMode,
    },
    FollowPlayer {
        target: PlayerId,
    },
    PlayAnimation {
        data: AnimationData,
    },
}

impl ActiveTask {
    pub fn to_wire(&self) -> NpcTask {
        match self {
            Self::StandStill => NpcTask::StandStill,
            Self::AttackPlayer { target, aggressive } => NpcTask::AttackPlayer {
                target: target.index(),
                aggressive: *aggressive,
            },
            Self::AttackNpc { target, aggressive } => NpcTask::AttackNpc {
                target: target.index(),
                aggressive: *aggressive,
            },
            Self::GoToPoint { destination, mode } => NpcTask::GoToPoint {
                destination: *destination,
                mode: *mode,
            },
            Self::FollowPlayer { target } => NpcTask::FollowPlayer { target: target.index() },
            Self::PlayAnimation { data } => NpcTask::PlayAnimation { data: data.clone() },
        }
    }
    
    /// Attack or follow task aimed at this player
    pub fn targets_player(&self, player: PlayerId) -> bool {
        match self {
            Self::AttackPlayer { target, .. } | Self::FollowPlayer { target } => *target == player,
            _ => false,
        }
    }
    
    pub fn targets_npc(&self, npc: NpcId) -> bool {
        matches!(self, Self::AttackNpc { target, .. } if *target == npc)
    }
    
    /// Player this NPC follows, who gets priority as sync source
    pub fn followed_player(&self) -> Option<PlayerId> {
        match self {
            Self::FollowPlayer { target } => Some(*target),
            _ => None,
        }
    }
}
