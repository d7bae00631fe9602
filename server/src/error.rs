//! Error taxonomy for NPC operations.
//!
//! None of these cross the network: inbound handlers collapse them into a
//! processed/ignored flag and the host API into `bool`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NpcError {
    /// Malformed or out-of-range field
    #[error("validation rejected: {reason}")]
    ValidationRejected { reason: &'static str },

    /// Sender is not the reliable source for this NPC
    #[error("sender is not the reliable source")]
    AuthorityDenied,

    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: u32 },

    #[error("pool exhausted (capacity {capacity})")]
    PoolExhausted { capacity: usize },

    /// A damage handler declined the event
    #[error("vetoed by handler")]
    VetoedByHandler,

    #[error("invalid vehicle seat {0}")]
    InvalidSeat(i32),

    #[error("invalid animation {library}:{name}")]
    InvalidAnimation { library: String, name: String },

    #[error("invalid weapon {0}")]
    InvalidWeapon(u8),

    #[error("invalid weapon skill {0}")]
    InvalidSkill(u8),

    #[error("invalid move mode {0}")]
    InvalidMoveMode(i32),
}

impl NpcError {
    pub fn rejected(reason: &'static str) -> Self {
        Self::ValidationRejected { reason }
    }

    pub fn npc_not_found(id: u16) -> Self {
        Self::NotFound { what: "npc", id: id as u32 }
    }

    pub fn player_not_found(id: u16) -> Self {
        Self::NotFound { what: "player", id: id as u32 }
    }
}

pub type NpcResult<T> = Result<T, NpcError>;
