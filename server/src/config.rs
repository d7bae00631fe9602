//! Server configuration loaded from JSON.

use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use npc_sync_shared::{Vec3, DEFAULT_PORT, SERVER_TICK_RATE};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "NPC_SERVER_CONFIG";

/// Config file used when the environment variable is unset
pub const DEFAULT_CONFIG_PATH: &str = "npc-server.json";

/// An NPC created when the server starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnConfig {
    pub model: u32,
    pub position: Vec3,
    #[serde(default)]
    pub heading: f32,
    #[serde(default)]
    pub virtual_world: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub tick_rate: u32,
    /// NPC ids run from 1 to this value
    pub npc_pool_size: usize,
    pub player_pool_size: usize,
    pub stream_radius: f32,
    /// Per-observer interval between streaming passes
    pub stream_rate_ms: u64,
    /// Minimum gap between coalesced sync broadcasts of one NPC
    pub on_foot_sync_rate_ms: u64,
    /// Observers silent for longer than this are AFK
    pub afk_timeout_ms: u64,
    pub connection_timeout_secs: u64,
    pub validate_animations: bool,
    pub use_all_animations: bool,
    pub spawns: Vec<SpawnConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            tick_rate: SERVER_TICK_RATE,
            npc_pool_size: 8192,
            player_pool_size: 1000,
            stream_radius: 200.0,
            stream_rate_ms: 1000,
            on_foot_sync_rate_ms: 30,
            afk_timeout_ms: 1800,
            connection_timeout_secs: 30,
            validate_animations: true,
            use_all_animations: false,
            spawns: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load from a JSON file
    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
        
        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse {:?}: {}", path, e))
    }
    
    /// Load from the path in `NPC_SERVER_CONFIG`, falling back to defaults
    pub fn load() -> Self {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        
        match Self::load_from_json(&path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path);
                config
            }
            Err(e) => {
                warn!("{}", e);
                warn!("Using default configuration");
                Self::default()
            }
        }
    }
    
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
    
    pub fn stream_rate(&self) -> Duration {
        Duration::from_millis(self.stream_rate_ms)
    }
    
    pub fn on_foot_sync_rate(&self) -> Duration {
        Duration::from_millis(self.on_foot_sync_rate_ms)
    }
    
    pub fn afk_timeout(&self) -> Duration {
        Duration::from_millis(self.afk_timeout_ms)
    }
    
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}
