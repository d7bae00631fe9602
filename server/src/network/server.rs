//! UDP NPC server implementation.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::net::UdpSocket;

use npc_sync_shared::{ClientMessage, ServerMessage, PROTOCOL_VERSION};

use crate::entities::PlayerId;
use crate::world::NpcComponent;

/// Maximum packet size
const MAX_PACKET_SIZE: usize = 1200;

/// Client connection state
#[derive(Debug)]
pub struct ClientConnection {
    pub addr: SocketAddr,
    pub player_id: PlayerId,
    pub last_seen: Instant,
}

impl ClientConnection {
    pub fn new(addr: SocketAddr, player_id: PlayerId) -> Self {
        Self {
            addr,
            player_id,
            last_seen: Instant::now(),
        }
    }
    
    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }
}

/// NPC server transport
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: HashMap<SocketAddr, ClientConnection>,
    addr_by_player: HashMap<PlayerId, SocketAddr>,
    connection_timeout: Duration,
}

impl Server {
    /// Create a new server listening on the given port
    pub async fn new(port: u16, connection_timeout: Duration) -> Result<Self, std::io::Error> {
        Self::bind(&format!("0.0.0.0:{}", port), connection_timeout).await
    }
    
    pub async fn bind(addr: &str, connection_timeout: Duration) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind(addr).await?;
        
        Ok(Self {
            socket: Arc::new(socket),
            clients: HashMap::new(),
            addr_by_player: HashMap::new(),
            connection_timeout,
        })
    }
    
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }
    
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
    
    /// Process incoming network messages
    pub async fn process_incoming(&mut self, component: &mut NpcComponent, now: Instant) {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        
        // Non-blocking receive loop
        loop {
            match self.socket.try_recv_from(&mut buf) {
                Ok((len, addr)) => {
                    self.handle_packet(&buf[..len], addr, component, now).await;
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    break;
                }
                Err(e) => {
                    error!("Error receiving packet: {}", e);
                    break;
                }
            }
        }
        
        // Check for timed out clients
        self.check_timeouts(component, now);
    }
    
    /// Handle a received packet
    async fn handle_packet(&mut self, data: &[u8], addr: SocketAddr, component: &mut NpcComponent, now: Instant) {
        let message = match ClientMessage::deserialize(data) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Failed to deserialize packet from {}: {}", addr, e);
                return;
            }
        };
        
        if let ClientMessage::Connect { protocol_version } = message {
            self.handle_connect(addr, protocol_version, component, now).await;
            return;
        }
        
        // Everything else requires a connection
        let player_id = match self.clients.get_mut(&addr) {
            Some(client) => {
                client.last_seen = now;
                client.player_id
            }
            None => {
                debug!("Dropping message from unconnected {}", addr);
                return;
            }
        };
        
        match message {
            ClientMessage::Connect { .. } => {}
            ClientMessage::Disconnect => {
                self.handle_disconnect(addr, component);
            }
            ClientMessage::ObserverUpdate { position, virtual_world, state } => {
                component.update_player(player_id, position, virtual_world, state, now);
            }
            ClientMessage::NpcSync(report) => {
                component.handle_sync_report(player_id, report, now);
            }
            ClientMessage::NpcControl(control) => {
                component.handle_npc_control(player_id, control, now);
            }
        }
    }
    
    /// Handle a connection request
    async fn handle_connect(&mut self, addr: SocketAddr, protocol_version: u32, component: &mut NpcComponent, now: Instant) {
        if protocol_version != PROTOCOL_VERSION {
            let msg = ServerMessage::ConnectFailed {
                reason: format!("Protocol version mismatch: expected {}, got {}", PROTOCOL_VERSION, protocol_version),
            };
            self.send_to(addr, &msg).await;
            return;
        }
        
        // Repeated connects just get the same id back
        if let Some(client) = self.clients.get_mut(&addr) {
            client.last_seen = now;
            let msg = ServerMessage::Connected { player_id: client.player_id.index() };
            self.send_to(addr, &msg).await;
            return;
        }
        
        let player_id = match component.connect_player() {
            Ok(id) => id,
            Err(e) => {
                warn!("Refusing {}: {}", addr, e);
                let msg = ServerMessage::ConnectFailed { reason: "Server is full".to_string() };
                self.send_to(addr, &msg).await;
                return;
            }
        };
        
        let mut connection = ClientConnection::new(addr, player_id);
        connection.last_seen = now;
        self.clients.insert(addr, connection);
        self.addr_by_player.insert(player_id, addr);
        info!("Client {} connected as player {}", addr, player_id);
        
        let msg = ServerMessage::Connected { player_id: player_id.index() };
        self.send_to(addr, &msg).await;
    }
    
    /// Handle disconnect
    fn handle_disconnect(&mut self, addr: SocketAddr, component: &mut NpcComponent) {
        if let Some(connection) = self.clients.remove(&addr) {
            self.addr_by_player.remove(&connection.player_id);
            component.disconnect_player(connection.player_id);
            info!("Client {} (player {}) disconnected", addr, connection.player_id);
        }
    }
    
    /// Drop clients that went silent
    fn check_timeouts(&mut self, component: &mut NpcComponent, now: Instant) {
        let timed_out: Vec<SocketAddr> = self.clients
            .iter()
            .filter(|(_, c)| c.is_timed_out(now, self.connection_timeout))
            .map(|(addr, _)| *addr)
            .collect();
        
        for addr in timed_out {
            if let Some(connection) = self.clients.remove(&addr) {
                self.addr_by_player.remove(&connection.player_id);
                component.disconnect_player(connection.player_id);
                warn!("Client {} (player {}) timed out", addr, connection.player_id);
            }
        }
    }
    
    /// Send everything the component queued this tick
    pub async fn flush_outgoing(&mut self, component: &mut NpcComponent) {
        for (player_id, msg) in component.take_outgoing() {
            // Messages for players that already left are dropped
            if let Some(addr) = self.addr_by_player.get(&player_id).copied() {
                self.send_to(addr, &msg).await;
            }
        }
    }
    
    /// Send a message to a specific address
    async fn send_to(&self, addr: SocketAddr, msg: &ServerMessage) {
        let data = match msg.serialize() {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to serialize message for {}: {}", addr, e);
                return;
            }
        };
        if let Err(e) = self.socket.send_to(&data, addr).await {
            error!("Failed to send to {}: {}", addr, e);
        }
    }
}
