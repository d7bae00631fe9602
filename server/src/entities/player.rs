//! Server-side player (observer) entity.

use std::time::{Duration, Instant};

use npc_sync_shared::{ObserverState, Vec3};

use super::PlayerId;

/// A connected player as seen by the NPC component
#[derive(Debug)]
pub struct ServerPlayer {
    pub id: PlayerId,
    pub position: Vec3,
    pub virtual_world: i32,
    pub state: ObserverState,
    /// Last update received while the player was in the world
    pub last_update: Option<Instant>,
    /// Last streaming pass run for this player
    pub last_stream_pass: Option<Instant>,
}

impl ServerPlayer {
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            position: [0.0, 0.0, 0.0],
            virtual_world: 0,
            state: ObserverState::None,
            last_update: None,
            last_stream_pass: None,
        }
    }
    
    /// A player that never sent an in-world update counts as AFK
    pub fn is_afk(&self, now: Instant, timeout: Duration) -> bool {
        match self.last_update {
            Some(last) => now.saturating_duration_since(last) > timeout,
            None => true,
        }
    }
    
    pub fn is_spectating(&self) -> bool {
        self.state == ObserverState::Spectating
    }
    
    /// Whether a streaming pass is due, and if so mark it as run
    pub fn take_stream_pass(&mut self, now: Instant, rate: Duration) -> bool {
        let due = self.last_stream_pass
            .map_or(true, |last| now.saturating_duration_since(last) >= rate);
        if due {
            self.last_stream_pass = Some(now);
        }
        due
    }
}
