//! NPC Sync Server
//!
//! Hosts server-authoritative NPCs whose positions are reported by the
//! closest connected client.

use std::time::Instant;
use log::{info, error};

use npc_sync_server::config::ServerConfig;
use npc_sync_server::network::Server;
use npc_sync_server::world::NpcComponent;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    
    info!("Starting NPC Sync Server...");
    
    let config = ServerConfig::load();
    info!("Tick rate: {} Hz", config.tick_rate);
    info!("Listening on port {}", config.port);
    info!(
        "NPC capacity {}, stream radius {}, sync rate {} ms",
        config.npc_pool_size, config.stream_radius, config.on_foot_sync_rate_ms
    );
    
    let mut component = NpcComponent::new(config.clone());
    component.spawn_configured();
    
    // Create the network server
    let mut server = match Server::new(config.port, config.connection_timeout()).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to start server: {}", e);
            return;
        }
    };
    
    // Calculate tick duration
    let tick_duration = config.tick_duration();
    
    info!("Server started successfully!");
    
    // Main loop
    loop {
        let tick_start = Instant::now();
        
        // Drain and apply incoming messages
        server.process_incoming(&mut component, tick_start).await;
        
        // Coalesced sync broadcasts
        component.tick(tick_start);
        
        // Send everything queued this tick
        server.flush_outgoing(&mut component).await;
        
        // Sleep until next tick
        let elapsed = tick_start.elapsed();
        if elapsed < tick_duration {
            tokio::time::sleep(tick_duration - elapsed).await;
        }
    }
}
