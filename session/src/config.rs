//! Session settings and their translation into transport parameters.

use client::ClientConnectParams;
use server::{RemoteClient, ServerListenParams};
use shared::{PeerConfig, DEFAULT_PORT, MAX_CLIENTS};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Host a client joins. Ignored when hosting.
    pub host_name: String,
    /// Port a host listens on and a client connects to. A host may use 0
    /// to let the OS pick one.
    pub port: u16,
    pub max_clients: usize,
    pub channel_count: u8,
    pub connect_timeout: Duration,
    pub peer_timeout: Duration,
    pub disconnect_timeout: Duration,
    /// How often a host pings every client.
    pub heartbeat_interval: Duration,
    /// How often a host broadcasts the session phase.
    pub state_broadcast_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host_name: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            max_clients: MAX_CLIENTS,
            channel_count: 1,
            connect_timeout: Duration::from_secs(5),
            peer_timeout: Duration::from_secs(5),
            disconnect_timeout: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(1),
            state_broadcast_interval: Duration::from_millis(100),
        }
    }
}

impl SessionConfig {
    pub fn peer_config(&self) -> PeerConfig {
        PeerConfig {
            channel_count: self.channel_count,
            connect_timeout: self.connect_timeout,
            peer_timeout: self.peer_timeout,
            disconnect_timeout: self.disconnect_timeout,
            ..PeerConfig::default()
        }
    }

    pub fn client_params(&self) -> ClientConnectParams {
        ClientConnectParams::new()
            .set_peer_config(self.peer_config())
            .set_server_host_name_and_port(&self.host_name, self.port)
    }

    pub fn server_params(&self) -> ServerListenParams<RemoteClient> {
        ServerListenParams::default()
            .set_peer_config(self.peer_config())
            .set_listen_port(self.port)
            .set_max_client_count(self.max_clients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.port, 7777);
        assert_eq!(config.max_clients, MAX_CLIENTS);
        assert_eq!(config.disconnect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_client_params_follow_config() {
        let config = SessionConfig {
            host_name: "10.0.0.2".to_string(),
            port: 9000,
            connect_timeout: Duration::from_millis(500),
            ..SessionConfig::default()
        };

        let params = config.client_params();
        assert_eq!(params.server_host_name(), "10.0.0.2");
        assert_eq!(params.server_port(), 9000);
        assert_eq!(params.timeout(), Duration::from_millis(500));
        assert_eq!(params.channel_count(), 1);
    }

    #[test]
    fn test_server_params_follow_config() {
        let config = SessionConfig {
            port: 0,
            max_clients: 2,
            peer_timeout: Duration::from_secs(2),
            ..SessionConfig::default()
        };

        let params = config.server_params();
        assert_eq!(params.listen_port(), 0);
        assert_eq!(params.max_clients(), 2);
        assert_eq!(params.peer_config().peer_timeout, Duration::from_secs(2));
    }
}
