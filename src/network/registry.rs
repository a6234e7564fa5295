//! Room Registry
//!
//! Process-wide map from room id to room. The registry lock only guards
//! fetch/insert/remove and is always released before a room lock is taken.
//! Room messages are enqueued while the room lock is still held.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::game::catalog::CardCatalog;
use crate::game::resolver::SeatIndex;
use crate::network::protocol::ServerMessage;
use crate::network::room::{
    deliver, JoinOutcome, PlayRejection, RemoveOutcome, Room, RoomError, RoomStatus,
};

/// Shared handle to a room.
pub type RoomHandle = Arc<Mutex<Room>>;

/// A player seated by [`RoomRegistry::join`].
#[derive(Debug)]
pub struct Joined {
    /// Room the player now belongs to.
    pub room: RoomHandle,
    /// Seat index.
    pub seat: SeatIndex,
    /// How the join was handled.
    pub outcome: JoinOutcome,
}

/// Consistent read of every room.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RegistryStatus {
    /// Per-room summaries, ordered by room id.
    pub rooms: Vec<RoomStatus>,
}

impl RegistryStatus {
    /// Number of rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

/// Manages all rooms.
pub struct RoomRegistry {
    /// Catalog every room deals from.
    catalog: Arc<CardCatalog>,
    /// Active rooms.
    rooms: Mutex<BTreeMap<String, RoomHandle>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new(catalog: CardCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            rooms: Mutex::new(BTreeMap::new()),
        }
    }

    /// Catalog shared by all rooms.
    pub fn catalog(&self) -> &CardCatalog {
        &self.catalog
    }

    /// Get the room for `room_id`, creating it if absent.
    pub async fn fetch_or_create(&self, room_id: &str) -> RoomHandle {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                info!(room = room_id, "Room created");
                Arc::new(Mutex::new(Room::new(room_id, self.catalog.clone())))
            })
            .clone()
    }

    /// Get an existing room.
    pub async fn get(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.lock().await.get(room_id).cloned()
    }

    /// Remove `room` from the registry if it is still the entry for `room_id`.
    pub async fn discard(&self, room_id: &str, room: &RoomHandle) -> bool {
        let mut rooms = self.rooms.lock().await;
        match rooms.get(room_id) {
            Some(current) if Arc::ptr_eq(current, room) => {
                rooms.remove(room_id);
                info!(room = room_id, "Room removed");
                true
            }
            _ => false,
        }
    }

    /// Seat `participant_id` in `room_id` and enqueue the resulting messages.
    ///
    /// A room that retired between fetch and lock is discarded and the join
    /// retried against a fresh room.
    pub async fn join(
        &self,
        room_id: &str,
        participant_id: &str,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<Joined, RoomError> {
        loop {
            let room = self.fetch_or_create(room_id).await;

            let result = {
                let mut guard = room.lock().await;
                guard.join(participant_id, sender.clone()).map(|joined| {
                    deliver(joined.dispatches);
                    (joined.seat, joined.outcome)
                })
            };

            match result {
                Ok((seat, outcome)) => {
                    return Ok(Joined {
                        room,
                        seat,
                        outcome,
                    });
                }
                Err(RoomError::Retired) => {
                    debug!(room = room_id, "Joined a retiring room, retrying");
                    self.discard(room_id, &room).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Play for `participant_id` through its current connection and enqueue
    /// the round result for both seats.
    pub async fn play(
        &self,
        room: &RoomHandle,
        participant_id: &str,
        sender: &mpsc::Sender<ServerMessage>,
        attribute: &str,
        card_name: Option<&str>,
    ) -> Result<(), PlayRejection> {
        let mut guard = room.lock().await;
        let dispatches = guard.play(participant_id, sender, attribute, card_name)?;
        deliver(dispatches);
        Ok(())
    }

    /// Remove a player's seat; drop the room from the registry once empty.
    pub async fn leave(
        &self,
        room: &RoomHandle,
        participant_id: &str,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> RemoveOutcome {
        let (outcome, room_id, retired) = {
            let mut guard = room.lock().await;
            let outcome = guard.remove(participant_id, sender);
            (outcome, guard.id().to_string(), guard.is_retired())
        };

        if retired {
            self.discard(&room_id, room).await;
        }
        outcome
    }

    /// Number of rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Snapshot every room's seat and round counts.
    pub async fn status(&self) -> RegistryStatus {
        let handles: Vec<RoomHandle> = self.rooms.lock().await.values().cloned().collect();

        let mut rooms = Vec::with_capacity(handles.len());
        for handle in handles {
            let room = handle.lock().await;
            if !room.is_retired() {
                rooms.push(room.status());
            }
        }

        RegistryStatus { rooms }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(CardCatalog::standard())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::Card;

    fn duel_registry() -> RoomRegistry {
        RoomRegistry::new(
            CardCatalog::new(vec![
                Card::new("Dragon", &[("Strength", 95)], "dragon.png"),
                Card::new("Phoenix", &[("Strength", 70)], "phoenix.png"),
            ])
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_fetch_or_create_reuses_room() {
        let registry = RoomRegistry::default();

        let first = registry.fetch_or_create("r1").await;
        let second = registry.fetch_or_create("r1").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.room_count().await, 1);

        registry.fetch_or_create("r2").await;
        assert_eq!(registry.room_count().await, 2);
    }

    #[tokio::test]
    async fn test_join_delivers_waiting_then_start() {
        let registry = duel_registry();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);

        let a = registry.join("r1", "A", tx_a).await.unwrap();
        assert_eq!(a.outcome, JoinOutcome::Waiting);
        assert!(matches!(rx_a.recv().await, Some(ServerMessage::Waiting(_))));

        let b = registry.join("r1", "B", tx_b).await.unwrap();
        assert_eq!(b.outcome, JoinOutcome::Started);
        assert!(Arc::ptr_eq(&a.room, &b.room));
        assert!(matches!(rx_a.recv().await, Some(ServerMessage::Start(_))));
        assert!(matches!(rx_b.recv().await, Some(ServerMessage::Start(_))));
    }

    #[tokio::test]
    async fn test_join_full_room() {
        let registry = duel_registry();
        let (tx, _rx) = mpsc::channel(8);
        registry.join("r1", "A", tx.clone()).await.unwrap();
        registry.join("r1", "B", tx.clone()).await.unwrap();

        let err = registry.join("r1", "C", tx).await.unwrap_err();
        assert_eq!(err, RoomError::RoomFull);
    }

    #[tokio::test]
    async fn test_last_leave_removes_room() {
        let registry = duel_registry();
        let (tx_a, _rx_a) = mpsc::channel(8);
        let (tx_b, _rx_b) = mpsc::channel(8);
        let a = registry.join("r1", "A", tx_a.clone()).await.unwrap();
        registry.join("r1", "B", tx_b.clone()).await.unwrap();

        let outcome = registry.leave(&a.room, "A", &tx_a).await;
        assert_eq!(outcome, RemoveOutcome::Removed { remaining: 1 });
        assert_eq!(registry.room_count().await, 1);

        let outcome = registry.leave(&a.room, "B", &tx_b).await;
        assert_eq!(outcome, RemoveOutcome::Removed { remaining: 0 });
        assert_eq!(registry.room_count().await, 0);
        assert!(registry.get("r1").await.is_none());
    }

    #[tokio::test]
    async fn test_join_retired_room_gets_fresh_room() {
        let registry = duel_registry();
        let (tx_a, _rx_a) = mpsc::channel(8);
        let stale = registry.fetch_or_create("r1").await;
        {
            let mut room = stale.lock().await;
            room.join("A", tx_a.clone()).unwrap();
            room.remove("A", &tx_a);
            assert!(room.is_retired());
        }

        let (tx_b, _rx_b) = mpsc::channel(8);
        let joined = registry.join("r1", "B", tx_b).await.unwrap();
        assert!(!Arc::ptr_eq(&joined.room, &stale));
        assert_eq!(joined.outcome, JoinOutcome::Waiting);

        // The late discard from the old room must not remove the new one.
        assert!(!registry.discard("r1", &stale).await);
        assert_eq!(registry.room_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_share_one_room() {
        for _ in 0..25 {
            let registry = Arc::new(duel_registry());
            let (tx_a, _rx_a) = mpsc::channel(8);
            let (tx_b, _rx_b) = mpsc::channel(8);

            let ra = registry.clone();
            let rb = registry.clone();
            let a = tokio::spawn(async move { ra.join("race", "A", tx_a).await });
            let b = tokio::spawn(async move { rb.join("race", "B", tx_b).await });

            let a = a.await.unwrap().unwrap();
            let b = b.await.unwrap().unwrap();

            assert!(Arc::ptr_eq(&a.room, &b.room));
            assert_eq!(registry.room_count().await, 1);

            let room = a.room.lock().await;
            assert_eq!(room.seat_count(), 2);
            assert_eq!(room.round(), 1);
            assert_ne!(a.seat, b.seat);
        }
    }

    #[tokio::test]
    async fn test_status() {
        let registry = duel_registry();
        let (tx, _rx) = mpsc::channel(8);
        registry.join("r2", "A", tx.clone()).await.unwrap();
        registry.join("r1", "B", tx.clone()).await.unwrap();
        registry.join("r1", "C", tx).await.unwrap();

        let status = registry.status().await;
        assert_eq!(status.room_count(), 2);
        assert_eq!(status.rooms[0], RoomStatus { room_id: "r1".into(), seats: 2, round: 1 });
        assert_eq!(status.rooms[1], RoomStatus { room_id: "r2".into(), seats: 1, round: 0 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_messages_follow_room_order_under_play_reconnect_race() {
        for _ in 0..50 {
            let registry = Arc::new(RoomRegistry::default());
            let (tx_a, _rx_a) = mpsc::channel(16);
            let (tx_b, mut rx_b) = mpsc::channel(16);
            let a = registry.join("r1", "A", tx_a).await.unwrap();
            registry.join("r1", "B", tx_b.clone()).await.unwrap();
            while rx_b.try_recv().is_ok() {}

            // B plays (if it holds the turn) while A reconnects on a new channel.
            let (tx_a2, _rx_a2) = mpsc::channel(16);
            let (rp, rj) = (registry.clone(), registry.clone());
            let room = a.room.clone();
            let play = tokio::spawn(async move {
                let _ = rp.play(&room, "B", &tx_b, "Strength", None).await;
            });
            let rejoin = tokio::spawn(async move { rj.join("r1", "A", tx_a2).await });
            play.await.unwrap();
            rejoin.await.unwrap().unwrap();

            let mut last = None;
            while let Ok(msg) = rx_b.try_recv() {
                last = Some(msg);
            }

            // The last message B saw must describe the room as it is now.
            let room = a.room.lock().await;
            match last {
                Some(ServerMessage::Start(info)) => {
                    assert_eq!(room.round(), 1);
                    assert_eq!(info.your_deck_size, room.seat(1).unwrap().hand().len());
                }
                Some(ServerMessage::RoundResult(info)) => {
                    assert_eq!(room.round(), info.round + 1);
                    assert_eq!(info.your_deck_size, room.seat(1).unwrap().hand().len());
                }
                other => panic!("unexpected last message {other:?}"),
            }
        }
    }
}
