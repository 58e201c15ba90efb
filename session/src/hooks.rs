//! The narrow interface between the session and the rest of the game.
//!
//! The session never touches entities, rendering or menus directly. It calls
//! these hooks on the game thread from inside
//! [`Info::network_tick`](crate::Info::network_tick) and role transitions.

use shared::{ClientId, MenuState, PlayerInfo};

pub trait GameplayHooks {
    /// A player the session has not seen before joined. `origin` is the
    /// connection the announcement arrived on.
    fn add_new_player(&mut self, origin: ClientId, client_id: ClientId);

    fn remove_player(&mut self, client_id: ClientId);

    fn update_remote_player(
        &mut self,
        client_id: ClientId,
        name: &str,
        location: [f32; 3],
        facing_direction: i32,
    );

    /// The local player's current state, asked for once per tick.
    fn player_packet_info(&mut self, my_client_id: ClientId) -> PlayerInfo;

    /// Session phase a host broadcasts to its clients.
    fn menu_state(&self) -> MenuState {
        MenuState::default()
    }

    /// A client received the host's session phase.
    fn apply_host_menu_state(&mut self, _state: MenuState) {}
}
