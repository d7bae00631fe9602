//! Client side of NPC synchronisation.
//!
//! The game process is reached only through [`GameHost`]; everything else
//! here is plain state driven by server messages and the frame clock.

pub mod network;
pub mod puppets;

pub use network::{ConnectionState, NetworkClient};
pub use puppets::{
    EntityHandle, GameHost, LocalBehavior, MeleeCommand, PuppetController, PuppetFlags, RemotePlayer,
    ReporterConfig,
};
