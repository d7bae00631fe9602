//! Server-authoritative NPCs with delegated position authority.
//!
//! The [`world::NpcComponent`] owns all NPC state; [`network::Server`] feeds
//! it from UDP and sends what it queues.

pub mod config;
pub mod entities;
pub mod error;
pub mod network;
pub mod pool;
pub mod world;
