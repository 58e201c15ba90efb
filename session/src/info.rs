//! The session orchestrator: which role this game plays and the per-frame tick.

use client::{Client, ClientEventHandler, ClientStatistics};
use log::{debug, info, warn};
use server::{ConnectedClient, RemoteClient, Server, ServerEventHandler};
use shared::{
    client_id_for, AnnouncementInfo, AnnouncementKind, ClientId, ClientPacket, ConnectionId,
    Delivery, MenuState, HOST_CLIENT_ID, UNASSIGNED_CLIENT_ID,
};
use std::fmt;
use std::net::SocketAddr;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::hooks::GameplayHooks;
use crate::protocol::{Outgoing, Protocol, Target};
use crate::replication::Replication;
use crate::trigger::TickTrigger;

/// Channel every session packet travels on
const SESSION_CHANNEL: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    None,
    Host,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::None => write!(f, "none"),
            Role::Host => write!(f, "host"),
            Role::Client => write!(f, "client"),
        }
    }
}

/// What a menu should say about the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    NotSetup,
    Hosting { connected_clients: usize },
    /// Connected, waiting for the host to hand out an id.
    Joining,
    Connected { my_client_id: ClientId },
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::NotSetup => write!(f, "Not setup"),
            SessionStatus::Hosting { connected_clients } => {
                write!(f, "Currently hosting ({} connected)", connected_clients)
            }
            SessionStatus::Joining => write!(f, "Joining"),
            SessionStatus::Connected { my_client_id } => {
                write!(f, "Currently connected as player {}", my_client_id)
            }
        }
    }
}

/// One player's view of the multiplayer session.
///
/// Owns the transport for its current role, the replicated remote players
/// and the gameplay hooks. Call [`network_tick`](Self::network_tick) once
/// per frame whatever the role.
pub struct Info<H: GameplayHooks> {
    config: SessionConfig,
    role: Role,
    client: Client,
    server: Server<RemoteClient>,
    protocol: Protocol,
    hooks: H,
    heartbeat: TickTrigger,
    state_broadcast: TickTrigger,
}

impl<H: GameplayHooks> Info<H> {
    pub fn new(config: SessionConfig, hooks: H) -> Self {
        let heartbeat = TickTrigger::new(config.heartbeat_interval);
        let state_broadcast = TickTrigger::new(config.state_broadcast_interval);
        Self {
            config,
            role: Role::None,
            client: Client::new(),
            server: Server::new(),
            protocol: Protocol::new(),
            hooks,
            heartbeat,
            state_broadcast,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    pub fn is_client(&self) -> bool {
        self.role == Role::Client
    }

    pub fn has_role(&self) -> bool {
        self.role != Role::None
    }

    pub fn my_client_id(&self) -> ClientId {
        self.protocol.my_client_id()
    }

    pub fn replication(&self) -> &Replication {
        self.protocol.replication()
    }

    pub fn host_menu_state(&self) -> Option<MenuState> {
        self.protocol.host_menu_state()
    }

    /// Drains notices for the player, oldest first: joins and leaves, and
    /// why a session ended. Notices outlive the role that produced them.
    pub fn take_announcements(&mut self) -> Vec<AnnouncementInfo> {
        self.protocol.take_announcements()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Replaces the settings used by the next role transition.
    pub fn set_config(&mut self, config: SessionConfig) {
        self.heartbeat = TickTrigger::new(config.heartbeat_interval);
        self.state_broadcast = TickTrigger::new(config.state_broadcast_interval);
        self.config = config;
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// The address a host is listening on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    /// Round-trip measurements of a client's link to its host.
    pub fn statistics(&self) -> Option<ClientStatistics> {
        self.is_client().then(|| self.client.statistics())
    }

    pub fn connected_clients(&self) -> Vec<ConnectionId> {
        self.server
            .connected_clients()
            .iter()
            .map(|client| client.id())
            .collect()
    }

    pub fn status(&self) -> SessionStatus {
        match self.role {
            Role::None => SessionStatus::NotSetup,
            Role::Host => SessionStatus::Hosting {
                connected_clients: self.server.connected_clients().len(),
            },
            Role::Client if self.my_client_id() == UNASSIGNED_CLIENT_ID => SessionStatus::Joining,
            Role::Client => SessionStatus::Connected {
                my_client_id: self.my_client_id(),
            },
        }
    }

    /// Starts hosting on the configured port.
    pub fn set_role_to_host(&mut self) -> Result<(), SessionError> {
        if self.role != Role::None {
            return Err(SessionError::RoleAlreadyActive(self.role));
        }

        self.server.start_listening(self.config.server_params())?;

        self.protocol.reset();
        self.protocol.set_my_client_id(HOST_CLIENT_ID);
        self.heartbeat.reset();
        self.state_broadcast.reset();
        self.role = Role::Host;
        info!("Hosting session on {:?}", self.server.local_addr());
        Ok(())
    }

    /// Joins the configured host, blocking until the handshake finishes or
    /// the connect timeout passes. On failure the role stays `None`.
    pub fn set_role_to_client(&mut self) -> Result<(), SessionError> {
        if self.role != Role::None {
            return Err(SessionError::RoleAlreadyActive(self.role));
        }

        let params = self.config.client_params();
        self.client.connect(&params)?;
        if let Err(e) = self.client.wait_for_connection() {
            self.client.disconnect();
            warn!(
                "Could not join {}:{}: {}",
                self.config.host_name, self.config.port, e
            );
            return Err(e.into());
        }

        self.protocol.reset();
        self.role = Role::Client;
        info!("Joined session at {}:{}", self.config.host_name, self.config.port);
        Ok(())
    }

    /// Leaves whatever role is active. Safe to call at any time.
    pub fn set_role_to_none(&mut self) {
        match self.role {
            Role::Host => {
                if self.server.is_listening() {
                    let notice =
                        AnnouncementInfo::new(AnnouncementKind::Warning, "Host closed the session");
                    self.protocol.announce_to(Target::All, notice);
                    self.flush_outbox();
                }
                self.server.stop_listening();
            }
            Role::Client => self.client.disconnect(),
            Role::None => {}
        }
        if self.role != Role::None {
            info!("Left session as {}", self.role);
        }

        self.protocol.remove_all_players(&mut self.hooks);
        self.protocol.reset();
        self.role = Role::None;
    }

    /// Runs one frame of networking. `dt` is the frame time in seconds.
    pub fn network_tick(&mut self, dt: f32) {
        match self.role {
            Role::None => {}
            Role::Host => self.host_tick(dt),
            Role::Client => self.client_tick(),
        }
    }

    fn host_tick(&mut self, dt: f32) {
        if self.heartbeat.test(dt) {
            self.protocol.push(
                Target::All,
                ClientPacket::ping(HOST_CLIENT_ID),
                Delivery::Reliable,
            );
        }

        let mut events = HostEvents {
            protocol: &mut self.protocol,
            hooks: &mut self.hooks,
        };
        self.server.consume_events(&mut events);
        if !self.server.is_listening() {
            warn!("Server transport stopped, leaving host role");
            self.set_role_to_none();
            return;
        }
        self.flush_outbox();

        if self.state_broadcast.test(dt) {
            let state = ClientPacket::game_state(HOST_CLIENT_ID, self.hooks.menu_state());
            self.protocol.push(Target::All, state, Delivery::Reliable);
        }

        let mut me = self.hooks.player_packet_info(HOST_CLIENT_ID);
        me.client_id = HOST_CLIENT_ID;
        me.is_you = false;
        self.protocol.push(
            Target::All,
            ClientPacket::player_location(HOST_CLIENT_ID, me),
            Delivery::Unreliable,
        );
        self.flush_outbox();
    }

    fn client_tick(&mut self) {
        let my_client_id = self.protocol.my_client_id();
        if my_client_id != UNASSIGNED_CLIENT_ID {
            let mut me = self.hooks.player_packet_info(my_client_id);
            me.client_id = my_client_id;
            me.is_you = false;
            self.protocol.push(
                Target::Host,
                ClientPacket::player_location(my_client_id, me),
                Delivery::Unreliable,
            );
        }

        let mut events = ClientEvents {
            protocol: &mut self.protocol,
            hooks: &mut self.hooks,
        };
        self.client.consume_events(&mut events);
        self.flush_outbox();

        if !self.client.is_connecting_or_connected() {
            self.set_role_to_none();
        }
    }

    fn flush_outbox(&mut self) {
        for Outgoing {
            target,
            packet,
            delivery,
        } in self.protocol.take_outbox()
        {
            let bytes = match packet.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to encode {}: {}", packet, e);
                    continue;
                }
            };

            let result = match (self.role, target) {
                (Role::Client, Target::Host) => {
                    self.client.send_packet(SESSION_CHANNEL, &bytes, delivery)
                }
                (Role::Host, Target::Only(client_id)) => match ConnectionId::try_from(client_id) {
                    Ok(connection) => {
                        self.server
                            .send_packet_to(connection, SESSION_CHANNEL, &bytes, delivery)
                    }
                    Err(_) => continue,
                },
                (Role::Host, Target::AllExcept(client_id)) => self.server.send_packet_to_all_if(
                    SESSION_CHANNEL,
                    &bytes,
                    delivery,
                    |c| client_id_for(c.id()) != client_id,
                ),
                (Role::Host, Target::All) => {
                    self.server
                        .send_packet_to_all_if(SESSION_CHANNEL, &bytes, delivery, |_| true)
                }
                (role, target) => {
                    debug!("Dropping {} for {:?} while {}", packet, target, role);
                    continue;
                }
            };

            if let Err(e) = result {
                warn!("Failed to send {}: {}", packet, e);
            }
        }
    }
}

impl<H: GameplayHooks> Drop for Info<H> {
    fn drop(&mut self) {
        self.set_role_to_none();
    }
}

/// Routes server transport events into the protocol while hosting
struct HostEvents<'a, H> {
    protocol: &'a mut Protocol,
    hooks: &'a mut H,
}

impl<H: GameplayHooks> ServerEventHandler<RemoteClient> for HostEvents<'_, H> {
    fn on_client_connected(&mut self, client: &RemoteClient) {
        info!("Connection {} opened from {}", client.id, client.ip);
    }

    fn on_client_disconnected(&mut self, client_id: ConnectionId) {
        self.protocol
            .handle_client_left(client_id_for(client_id), &mut *self.hooks);
    }

    fn on_data_received(&mut self, client: &RemoteClient, data: &[u8]) {
        self.protocol
            .process_datagram(Role::Host, client_id_for(client.id), data, &mut *self.hooks);
    }
}

/// Routes client transport events into the protocol while joined
struct ClientEvents<'a, H> {
    protocol: &'a mut Protocol,
    hooks: &'a mut H,
}

impl<H: GameplayHooks> ClientEventHandler for ClientEvents<'_, H> {
    fn on_connected(&mut self) {
        self.protocol.push(
            Target::Host,
            ClientPacket::player_join(UNASSIGNED_CLIENT_ID, false, UNASSIGNED_CLIENT_ID),
            Delivery::Reliable,
        );
    }

    fn on_disconnected(&mut self) {
        self.protocol.handle_host_lost(&mut *self.hooks);
    }

    fn on_data_received(&mut self, data: &[u8]) {
        self.protocol
            .process_datagram(Role::Client, HOST_CLIENT_ID, data, &mut *self.hooks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::testing::RecordingHooks;
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn local_config() -> SessionConfig {
        SessionConfig {
            port: 0,
            connect_timeout: Duration::from_millis(300),
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_idle_session() {
        let mut session = Info::new(local_config(), RecordingHooks::default());
        assert_eq!(session.role(), Role::None);
        assert_eq!(session.status(), SessionStatus::NotSetup);
        assert_eq!(session.status().to_string(), "Not setup");

        session.network_tick(0.016);
        session.set_role_to_none();
        session.set_role_to_none();

        assert_eq!(session.role(), Role::None);
        assert!(session.replication().is_empty());
        assert_eq!(session.my_client_id(), UNASSIGNED_CLIENT_ID);
    }

    #[test]
    fn test_host_role_lifecycle() {
        let mut session = Info::new(local_config(), RecordingHooks::default());
        assert_ok!(session.set_role_to_host());

        assert!(session.is_host());
        assert_eq!(session.my_client_id(), HOST_CLIENT_ID);
        assert!(session.local_addr().is_some());
        assert_eq!(
            session.status(),
            SessionStatus::Hosting {
                connected_clients: 0
            }
        );

        assert!(matches!(
            session.set_role_to_host(),
            Err(SessionError::RoleAlreadyActive(Role::Host))
        ));
        assert!(matches!(
            session.set_role_to_client(),
            Err(SessionError::RoleAlreadyActive(Role::Host))
        ));

        // Ticking with nobody connected must be harmless
        session.network_tick(0.2);

        session.set_role_to_none();
        session.set_role_to_none();
        assert_eq!(session.role(), Role::None);
        assert!(session.local_addr().is_none());
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(
            SessionStatus::Hosting {
                connected_clients: 2
            }
            .to_string(),
            "Currently hosting (2 connected)"
        );
        assert_eq!(
            SessionStatus::Connected { my_client_id: 3 }.to_string(),
            "Currently connected as player 3"
        );
        assert_eq!(Role::Client.to_string(), "client");
    }

    #[test]
    fn test_failed_join_leaves_no_role() {
        // Bound but never answers
        let silent = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let config = SessionConfig {
            port: silent.local_addr().unwrap().port(),
            ..local_config()
        };

        let mut session = Info::new(config, RecordingHooks::default());
        let result = session.set_role_to_client();

        assert!(matches!(
            result,
            Err(SessionError::Transport(shared::TransportError::ConnectTimeout))
        ));
        assert_eq!(session.role(), Role::None);
        assert!(session.statistics().is_none());
    }

    #[test]
    fn test_host_leaves_role_when_transport_stops() {
        let mut session = Info::new(local_config(), RecordingHooks::default());
        assert_ok!(session.set_role_to_host());

        session.server.stop_listening();
        session.network_tick(0.016);

        assert_eq!(session.role(), Role::None);
        assert_eq!(session.status(), SessionStatus::NotSetup);
        session.network_tick(0.016);
    }

    #[test]
    fn test_host_shutdown_is_announced_locally() {
        let mut session = Info::new(local_config(), RecordingHooks::default());
        assert_ok!(session.set_role_to_host());
        session.set_role_to_none();

        let shown = session.take_announcements();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].kind, AnnouncementKind::Warning);
        assert!(session.take_announcements().is_empty());
    }
}
