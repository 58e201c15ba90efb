//! What each packet means, independent of sockets.
//!
//! [`Protocol`] applies decoded packets to the replication state and the
//! gameplay hooks, and collects anything that has to be sent in an outbox.
//! [`Info`](crate::Info) flushes that outbox to whichever transport is
//! active after every batch of events, so handlers never send while a
//! transport queue is being drained.

use log::{debug, info, trace};
use shared::{
    AnnouncementInfo, AnnouncementKind, ClientId, ClientPacket, Delivery, MenuState, Msg,
    PlayerInfo, HOST_CLIENT_ID, UNASSIGNED_CLIENT_ID,
};
use std::collections::{BTreeSet, VecDeque};

use crate::hooks::GameplayHooks;
use crate::info::Role;
use crate::replication::{PlayerSnapshot, Replication};

/// Announcements kept for the UI before the oldest are dropped
const MAX_PENDING_ANNOUNCEMENTS: usize = 32;

/// Who an outgoing packet is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// From a client, to its host.
    Host,
    /// From a host, to one client.
    Only(ClientId),
    /// From a host, to every client but one.
    AllExcept(ClientId),
    /// From a host, to every client.
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub target: Target,
    pub packet: ClientPacket,
    pub delivery: Delivery,
}

#[derive(Debug)]
pub struct Protocol {
    my_client_id: ClientId,
    host_menu_state: Option<MenuState>,
    replication: Replication,
    /// Players that left this session. Ids are never reused, so anything
    /// still in flight for them is stale.
    departed: BTreeSet<ClientId>,
    announcements: VecDeque<AnnouncementInfo>,
    outbox: Vec<Outgoing>,
}

impl Default for Protocol {
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol {
    pub fn new() -> Self {
        Self {
            my_client_id: UNASSIGNED_CLIENT_ID,
            host_menu_state: None,
            replication: Replication::new(),
            departed: BTreeSet::new(),
            announcements: VecDeque::new(),
            outbox: Vec::new(),
        }
    }

    pub fn my_client_id(&self) -> ClientId {
        self.my_client_id
    }

    pub fn set_my_client_id(&mut self, client_id: ClientId) {
        self.my_client_id = client_id;
    }

    /// The last session phase a host told us about.
    pub fn host_menu_state(&self) -> Option<MenuState> {
        self.host_menu_state
    }

    pub fn replication(&self) -> &Replication {
        &self.replication
    }

    pub fn push(&mut self, target: Target, packet: ClientPacket, delivery: Delivery) {
        self.outbox.push(Outgoing {
            target,
            packet,
            delivery,
        });
    }

    pub fn take_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    /// Queues a notice for the local player.
    pub fn announce(&mut self, announcement: AnnouncementInfo) {
        info!("Announcement: {}", announcement);
        if self.announcements.len() == MAX_PENDING_ANNOUNCEMENTS {
            self.announcements.pop_front();
        }
        self.announcements.push_back(announcement);
    }

    /// Drains queued notices, oldest first.
    pub fn take_announcements(&mut self) -> Vec<AnnouncementInfo> {
        self.announcements.drain(..).collect()
    }

    /// Forgets the session without calling any hooks. Queued announcements
    /// are kept so the reason a session ended can still be shown.
    pub fn reset(&mut self) {
        self.my_client_id = UNASSIGNED_CLIENT_ID;
        self.host_menu_state = None;
        self.replication.clear();
        self.departed.clear();
        self.outbox.clear();
    }

    /// Removes every replicated player, telling gameplay about each one.
    pub fn remove_all_players<H: GameplayHooks>(&mut self, hooks: &mut H) {
        for client_id in self.replication.ids() {
            self.replication.remove(client_id);
            hooks.remove_player(client_id);
        }
    }

    /// Decodes and handles one datagram. Malformed input is dropped.
    pub fn process_datagram<H: GameplayHooks>(
        &mut self,
        role: Role,
        origin: ClientId,
        data: &[u8],
        hooks: &mut H,
    ) {
        match ClientPacket::decode(data) {
            Ok(packet) => self.process_client_packet_msg(role, origin, packet, hooks),
            Err(e) => debug!("Dropping packet from {}: {}", origin, e),
        }
    }

    /// Applies one packet that arrived from `origin`.
    ///
    /// On a host `origin` is the sender's connection and overrides whatever
    /// id the packet claims. On a client every packet comes from the host.
    pub fn process_client_packet_msg<H: GameplayHooks>(
        &mut self,
        role: Role,
        origin: ClientId,
        mut packet: ClientPacket,
        hooks: &mut H,
    ) {
        trace!("Processing {} from {}", packet, origin);
        let is_host = role == Role::Host;
        if is_host {
            packet.client_id = origin;
        }

        match &mut packet.msg {
            Msg::PlayerJoin(join) => {
                if join.is_you {
                    if is_host {
                        debug!("Ignoring id assignment sent by client {}", origin);
                    } else {
                        info!("Host assigned us client id {}", join.client_id);
                        self.my_client_id = join.client_id;
                    }
                    return;
                }

                if is_host {
                    join.client_id = origin;
                }
                let joined = join.client_id;
                if self.departed.contains(&joined) {
                    debug!("Ignoring late join of departed player {}", joined);
                    return;
                }
                let is_new = self.replication.register(joined);
                if is_new {
                    info!("Player {} joined", joined);
                    hooks.add_new_player(origin, joined);
                }

                if is_host {
                    self.push(
                        Target::Only(origin),
                        ClientPacket::player_join(origin, true, origin),
                        Delivery::Reliable,
                    );
                    self.push(Target::AllExcept(origin), packet, Delivery::Reliable);
                    if is_new {
                        let notice = AnnouncementInfo::new(
                            AnnouncementKind::Message,
                            &format!("Player {} joined", origin),
                        );
                        self.announce_to(Target::AllExcept(origin), notice);
                    }
                }
            }
            Msg::PlayerLocation(location) => {
                let client_id = if is_host { origin } else { location.client_id };
                if !is_host
                    && (client_id == self.my_client_id || client_id == UNASSIGNED_CLIENT_ID)
                {
                    return;
                }
                if self.departed.contains(&client_id) {
                    trace!("Dropping late location of departed player {}", client_id);
                    return;
                }

                location.client_id = client_id;
                location.is_you = false;
                self.apply_location(origin, location, hooks);

                if is_host {
                    self.push(Target::AllExcept(origin), packet, Delivery::Unreliable);
                }
            }
            Msg::GameState(state) => {
                if is_host {
                    debug!("Ignoring game state sent by client {}", origin);
                    return;
                }
                if self.host_menu_state != Some(state.host_menu_state) {
                    debug!("Host menu state is now {:?}", state.host_menu_state);
                }
                self.host_menu_state = Some(state.host_menu_state);
                hooks.apply_host_menu_state(state.host_menu_state);
            }
            Msg::PlayerLeave(leave) => {
                if is_host {
                    debug!("Ignoring leave notice sent by client {}", origin);
                    return;
                }
                self.departed.insert(leave.client_id);
                if self.replication.remove(leave.client_id).is_some() {
                    info!("Player {} left", leave.client_id);
                    hooks.remove_player(leave.client_id);
                }
            }
            Msg::Announcement(announcement) => {
                if is_host {
                    debug!("Ignoring announcement sent by client {}", origin);
                    return;
                }
                self.announce(announcement.clone());
            }
            Msg::Ping(_) | Msg::World(_) => {
                if is_host {
                    self.push(Target::AllExcept(origin), packet, Delivery::Reliable);
                }
            }
        }
    }

    /// Host side: the connection behind `client_id` is gone.
    pub fn handle_client_left<H: GameplayHooks>(&mut self, client_id: ClientId, hooks: &mut H) {
        self.departed.insert(client_id);
        if self.replication.remove(client_id).is_none() {
            return;
        }
        info!("Player {} left", client_id);
        hooks.remove_player(client_id);
        self.push(
            Target::All,
            ClientPacket::player_leave(HOST_CLIENT_ID, client_id),
            Delivery::Reliable,
        );
        let notice = AnnouncementInfo::new(
            AnnouncementKind::Message,
            &format!("Player {} left", client_id),
        );
        self.announce_to(Target::All, notice);
    }

    /// Client side: the connection to the host is gone.
    pub fn handle_host_lost<H: GameplayHooks>(&mut self, hooks: &mut H) {
        self.remove_all_players(hooks);
        self.my_client_id = UNASSIGNED_CLIENT_ID;
        self.host_menu_state = None;
        self.outbox.clear();
        self.announce(AnnouncementInfo::new(
            AnnouncementKind::Error,
            "Lost connection to host",
        ));
    }

    /// Host side: shows `announcement` locally and sends it to `target`.
    pub fn announce_to(&mut self, target: Target, announcement: AnnouncementInfo) {
        self.push(
            target,
            ClientPacket::new(HOST_CLIENT_ID, Msg::Announcement(announcement.clone())),
            Delivery::Reliable,
        );
        self.announce(announcement);
    }

    fn apply_location<H: GameplayHooks>(
        &mut self,
        origin: ClientId,
        location: &PlayerInfo,
        hooks: &mut H,
    ) {
        let client_id = location.client_id;
        if self
            .replication
            .upsert(client_id, PlayerSnapshot::from(location))
        {
            info!("Player {} appeared", client_id);
            hooks.add_new_player(origin, client_id);
        }
        hooks.update_remote_player(
            client_id,
            &location.name,
            location.location,
            location.facing_direction,
        );
    }
}
