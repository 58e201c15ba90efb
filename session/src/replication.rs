//! Last known state of every remote player.

use shared::{ClientId, PlayerInfo};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerSnapshot {
    pub name: String,
    pub position: [f32; 3],
    pub facing_direction: i32,
}

impl From<&PlayerInfo> for PlayerSnapshot {
    fn from(info: &PlayerInfo) -> Self {
        Self {
            name: info.name.clone(),
            position: info.location,
            facing_direction: info.facing_direction,
        }
    }
}

/// Remote players keyed by client id.
///
/// Only the session's packet handling writes here; everything else reads.
/// Updates replace the whole snapshot, the last one to arrive wins.
#[derive(Debug, Default)]
pub struct Replication {
    players: BTreeMap<ClientId, PlayerSnapshot>,
}

impl Replication {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `snapshot` for `client_id`. Returns true if the id was new.
    pub fn upsert(&mut self, client_id: ClientId, snapshot: PlayerSnapshot) -> bool {
        self.players.insert(client_id, snapshot).is_none()
    }

    /// Makes sure `client_id` has an entry. Returns true if it was added.
    pub fn register(&mut self, client_id: ClientId) -> bool {
        if self.players.contains_key(&client_id) {
            return false;
        }
        self.players.insert(client_id, PlayerSnapshot::default());
        true
    }

    pub fn remove(&mut self, client_id: ClientId) -> Option<PlayerSnapshot> {
        self.players.remove(&client_id)
    }

    pub fn get(&self, client_id: ClientId) -> Option<&PlayerSnapshot> {
        self.players.get(&client_id)
    }

    pub fn contains(&self, client_id: ClientId) -> bool {
        self.players.contains_key(&client_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClientId, &PlayerSnapshot)> {
        self.players.iter().map(|(id, snapshot)| (*id, snapshot))
    }

    pub fn ids(&self) -> Vec<ClientId> {
        self.players.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn snapshot(name: &str, x: f32) -> PlayerSnapshot {
        PlayerSnapshot {
            name: name.to_string(),
            position: [x, 0.0, 0.0],
            facing_direction: 90,
        }
    }

    #[test]
    fn test_upsert_overwrites_wholesale() {
        let mut replication = Replication::new();
        assert!(replication.upsert(1, snapshot("Buck", 1.0)));
        assert!(!replication.upsert(1, snapshot("Doe", 2.0)));

        let stored = replication.get(1).unwrap();
        assert_eq!(stored.name, "Doe");
        assert_approx_eq!(stored.position[0], 2.0);
        assert_eq!(replication.len(), 1);
    }

    #[test]
    fn test_register_keeps_existing_snapshot() {
        let mut replication = Replication::new();
        assert!(replication.register(3));
        assert_eq!(replication.get(3), Some(&PlayerSnapshot::default()));

        replication.upsert(3, snapshot("Buck", 5.0));
        assert!(!replication.register(3));
        assert_eq!(replication.get(3).unwrap().name, "Buck");
    }

    #[test]
    fn test_remove_and_clear() {
        let mut replication = Replication::new();
        replication.upsert(1, snapshot("a", 0.0));
        replication.upsert(2, snapshot("b", 0.0));

        assert!(replication.remove(1).is_some());
        assert!(replication.remove(1).is_none());
        assert!(!replication.contains(1));
        assert_eq!(replication.ids(), vec![2]);

        replication.clear();
        assert!(replication.is_empty());
    }

    #[test]
    fn test_snapshot_from_player_info() {
        let info = PlayerInfo::new(4, "Buck", [1.0, 0.5, 2.0], 180);
        let snapshot = PlayerSnapshot::from(&info);

        assert_eq!(snapshot.name, "Buck");
        assert_approx_eq!(snapshot.position[1], 0.5);
        assert_approx_eq!(snapshot.position[2], 2.0);
        assert_eq!(snapshot.facing_direction, 180);
    }

    #[test]
    fn test_iteration_is_ordered_by_id() {
        let mut replication = Replication::new();
        replication.register(5);
        replication.register(2);
        replication.register(9);

        let ids: Vec<ClientId> = replication.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }
}
