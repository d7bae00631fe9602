//! UDP network client.
//!
//! A simple non-blocking UDP client polled from the game's frame loop.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use log::{error, info, warn};

use npc_sync_shared::{
    ClientMessage, NpcControl, NpcSyncReport, ObserverState, ServerMessage, Vec3, DEFAULT_PORT, PROTOCOL_VERSION,
};

/// Maximum packet size
const MAX_PACKET_SIZE: usize = 1200;

/// Connection timeout duration
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Observer updates double as keep-alive; send at least this often
const OBSERVER_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// Connection state
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

/// Network client for communicating with the NPC server
pub struct NetworkClient {
    socket: Option<UdpSocket>,
    server_addr: Option<SocketAddr>,
    state: ConnectionState,
    player_id: Option<u16>,
    connect_time: Option<Instant>,
    last_send_time: Instant,

    /// Received messages waiting to be processed
    incoming_messages: Vec<ServerMessage>,
}

impl NetworkClient {
    /// Create a new network client
    pub fn new() -> Self {
        Self {
            socket: None,
            server_addr: None,
            state: ConnectionState::Disconnected,
            player_id: None,
            connect_time: None,
            last_send_time: Instant::now(),
            incoming_messages: Vec::new(),
        }
    }

    /// Bind a local socket aimed at `server_ip`, on the default port unless one is given
    pub fn init_socket(&mut self, server_ip: &str, port: Option<u16>) -> Result<(), String> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| format!("Failed to create socket: {}", e))?;

        socket.set_nonblocking(true)
            .map_err(|e| format!("Failed to set non-blocking: {}", e))?;

        let server_addr: SocketAddr = format!("{}:{}", server_ip, port.unwrap_or(DEFAULT_PORT))
            .parse()
            .map_err(|e| format!("Invalid server address: {}", e))?;

        self.socket = Some(socket);
        self.server_addr = Some(server_addr);

        Ok(())
    }

    /// Join the server
    pub fn connect(&mut self, server_ip: &str, port: Option<u16>) -> Result<(), String> {
        if self.socket.is_none() {
            self.init_socket(server_ip, port)?;
        }

        self.state = ConnectionState::Connecting;
        self.connect_time = Some(Instant::now());

        self.send_message(&ClientMessage::Connect {
            protocol_version: PROTOCOL_VERSION,
        })
    }

    /// Disconnect from the server
    pub fn disconnect(&mut self) {
        if self.is_connected() {
            if let Err(e) = self.send_message(&ClientMessage::Disconnect) {
                warn!("Failed to send disconnect: {}", e);
            }
        }

        self.socket = None;
        self.server_addr = None;
        self.state = ConnectionState::Disconnected;
        self.player_id = None;
        self.connect_time = None;
        self.incoming_messages.clear();
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected)
    }

    /// Get connection state
    pub fn get_state(&self) -> &ConnectionState {
        &self.state
    }

    /// Get player ID (only valid when connected)
    pub fn get_player_id(&self) -> Option<u16> {
        self.player_id
    }

    /// Local socket address, once bound
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|socket| socket.local_addr().ok())
    }

    /// Poll for incoming messages (should be called every frame)
    pub fn poll(&mut self) -> Vec<ServerMessage> {
        self.receive_packets();

        // Check for connection timeout
        if matches!(self.state, ConnectionState::Connecting) {
            if let Some(connect_time) = self.connect_time {
                if connect_time.elapsed() > CONNECTION_TIMEOUT {
                    self.state = ConnectionState::Failed("Connection timed out".to_string());
                }
            }
        }

        std::mem::take(&mut self.incoming_messages)
    }

    /// Receive all pending packets
    fn receive_packets(&mut self) {
        let socket = match &self.socket {
            Some(s) => s,
            None => return,
        };

        let mut buf = [0u8; MAX_PACKET_SIZE];
        let mut received_packets: Vec<Vec<u8>> = Vec::new();

        loop {
            match socket.recv_from(&mut buf) {
                Ok((len, addr)) => {
                    if Some(addr) == self.server_addr {
                        received_packets.push(buf[..len].to_vec());
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    break;
                }
                Err(e) => {
                    error!("Network receive error: {}", e);
                    break;
                }
            }
        }

        for packet_data in received_packets {
            self.process_packet(&packet_data);
        }
    }

    /// Process a received packet
    fn process_packet(&mut self, data: &[u8]) {
        let message = match ServerMessage::deserialize(data) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Failed to deserialize server message: {}", e);
                return;
            }
        };

        match &message {
            ServerMessage::Connected { player_id } => {
                self.player_id = Some(*player_id);
                self.state = ConnectionState::Connected;
                info!("Connected with player ID: {}", player_id);
            }
            ServerMessage::ConnectFailed { reason } => {
                self.state = ConnectionState::Failed(reason.clone());
                error!("Connection refused: {}", reason);
            }
            _ => {}
        }

        self.incoming_messages.push(message);
    }

    /// Send a message to the server
    pub fn send_message(&mut self, msg: &ClientMessage) -> Result<(), String> {
        let socket = self.socket.as_ref()
            .ok_or("Not connected")?;
        let server_addr = self.server_addr
            .ok_or("No server address")?;

        let data = msg.serialize()
            .map_err(|e| format!("Failed to serialize: {}", e))?;
        socket.send_to(&data, server_addr)
            .map_err(|e| format!("Failed to send: {}", e))?;

        self.last_send_time = Instant::now();

        Ok(())
    }

    /// Send a batch, e.g. everything the puppet controller produced this frame
    pub fn send_all(&mut self, messages: impl IntoIterator<Item = ClientMessage>) {
        if !self.is_connected() {
            return;
        }
        for msg in messages {
            if let Err(e) = self.send_message(&msg) {
                warn!("{}", e);
            }
        }
    }

    /// Report where the local player is and what they are doing
    pub fn send_observer_update(&mut self, position: Vec3, virtual_world: i32, state: ObserverState) {
        let msg = ClientMessage::ObserverUpdate {
            position,
            virtual_world,
            state,
        };
        if let Err(e) = self.send_message(&msg) {
            warn!("{}", e);
        }
    }

    /// Send an NPC position report
    pub fn send_npc_sync(&mut self, report: NpcSyncReport) {
        if let Err(e) = self.send_message(&ClientMessage::NpcSync(report)) {
            warn!("{}", e);
        }
    }

    /// Send an NPC damage report
    pub fn send_npc_control(&mut self, control: NpcControl) {
        if let Err(e) = self.send_message(&ClientMessage::NpcControl(control)) {
            warn!("{}", e);
        }
    }

    /// Check if an observer update is due to keep the session alive
    pub fn should_send_observer_update(&self) -> bool {
        self.is_connected() && self.last_send_time.elapsed() > OBSERVER_UPDATE_INTERVAL
    }
}

impl Default for NetworkClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A bare socket standing in for the server
    fn fake_server() -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        socket
    }

    fn poll_until(client: &mut NetworkClient, mut done: impl FnMut(&NetworkClient) -> bool) -> Vec<ServerMessage> {
        let mut received = Vec::new();
        for _ in 0..200 {
            received.extend(client.poll());
            if done(client) {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        received
    }

    #[test]
    fn test_connect_handshake() {
        let server = fake_server();
        let port = server.local_addr().unwrap().port();

        let mut client = NetworkClient::new();
        client.connect("127.0.0.1", Some(port)).unwrap();
        assert_eq!(client.get_state(), &ConnectionState::Connecting);

        let mut buf = [0u8; MAX_PACKET_SIZE];
        let (len, from) = server.recv_from(&mut buf).unwrap();
        assert_eq!(
            ClientMessage::deserialize(&buf[..len]).unwrap(),
            ClientMessage::Connect { protocol_version: PROTOCOL_VERSION }
        );

        let reply = ServerMessage::Connected { player_id: 4 }.serialize().unwrap();
        server.send_to(&reply, from).unwrap();

        let received = poll_until(&mut client, NetworkClient::is_connected);
        assert!(client.is_connected());
        assert_eq!(client.get_player_id(), Some(4));
        assert_eq!(received, vec![ServerMessage::Connected { player_id: 4 }]);
    }

    #[test]
    fn test_refused_connection() {
        let server = fake_server();
        let port = server.local_addr().unwrap().port();

        let mut client = NetworkClient::new();
        client.connect("127.0.0.1", Some(port)).unwrap();

        let mut buf = [0u8; MAX_PACKET_SIZE];
        let (_, from) = server.recv_from(&mut buf).unwrap();
        let reply = ServerMessage::ConnectFailed { reason: "Server is full".to_string() }.serialize().unwrap();
        server.send_to(&reply, from).unwrap();

        poll_until(&mut client, |c| matches!(c.get_state(), ConnectionState::Failed(_)));
        assert_eq!(client.get_state(), &ConnectionState::Failed("Server is full".to_string()));
    }

    #[test]
    fn test_send_without_socket_fails() {
        let mut client = NetworkClient::new();
        assert!(client.send_message(&ClientMessage::Disconnect).is_err());
    }
}
