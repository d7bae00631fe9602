mod client;

pub use client::{ConnectionState, NetworkClient};
