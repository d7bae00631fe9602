//! UDP transport.

mod server;

pub use server::{ClientConnection, Server};
