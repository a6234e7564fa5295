//! Match Rooms
//!
//! A room owns the mutable state of one two-player match. Every operation
//! here runs inside the room's lock and *returns* the messages it wants sent.
//! Callers enqueue them with [`deliver`] before releasing the lock, so each
//! seat sees messages in the order the room applied them.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::game::catalog::{Card, CardCatalog};
use crate::game::deck::deal_with;
use crate::game::hand::Hand;
use crate::game::resolver::{resolve, Commitment, GameOver, RoundOutcome, SeatIndex, SEAT_COUNT};
use crate::network::protocol::{
    RoundResultInfo, ServerMessage, StartInfo, WaitingInfo, DRAW_MARKER, TIE_MARKER,
};

/// A message bound for one seat's connection.
#[derive(Debug)]
pub struct Dispatch {
    /// Recipient's player id (for logging).
    pub participant_id: String,
    /// Recipient's outbound channel.
    pub sender: mpsc::Sender<ServerMessage>,
    /// Message to send.
    pub message: ServerMessage,
}

/// Enqueue dispatches in order without waiting.
///
/// Safe to call with the room lock held. A closed or full outbound queue
/// drops that message with a warning; the other seat still gets its own.
pub fn deliver(dispatches: Vec<Dispatch>) {
    for dispatch in dispatches {
        let action = dispatch.message.action();
        match dispatch.sender.try_send(dispatch.message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(
                    player = %dispatch.participant_id,
                    action,
                    "Outbound queue full, dropping message"
                );
            }
            Err(TrySendError::Closed(_)) => {
                warn!(
                    player = %dispatch.participant_id,
                    action,
                    "Failed to deliver message, connection gone"
                );
            }
        }
    }
}

/// One occupied seat.
#[derive(Debug)]
pub struct Seat {
    participant_id: String,
    sender: mpsc::Sender<ServerMessage>,
    hand: Hand,
    commitment: Option<Commitment>,
}

impl Seat {
    fn new(participant_id: &str, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            participant_id: participant_id.to_string(),
            sender,
            hand: Hand::new(),
            commitment: None,
        }
    }

    /// Player id.
    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    /// Cards held.
    pub fn hand(&self) -> &Hand {
        &self.hand
    }

    /// Card and attribute locked in for the current round.
    pub fn commitment(&self) -> Option<&Commitment> {
        self.commitment.as_ref()
    }

    fn dispatch(&self, message: ServerMessage) -> Dispatch {
        Dispatch {
            participant_id: self.participant_id.clone(),
            sender: self.sender.clone(),
            message,
        }
    }
}

/// How a successful join was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// First seat taken; waiting for an opponent.
    Waiting,
    /// Second seat taken; a match was dealt.
    Started,
    /// Known player reconnected to a running match, which was redealt.
    Restarted,
    /// Known player reconnected while alone in the room.
    Resumed,
}

/// Successful join.
#[derive(Debug)]
pub struct JoinResult {
    /// Seat the player holds.
    pub seat: SeatIndex,
    /// What happened.
    pub outcome: JoinOutcome,
    /// Messages to send once the lock is released.
    pub dispatches: Vec<Dispatch>,
}

/// Join failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// Both seats are held by other players.
    #[error("Room is full")]
    RoomFull,

    /// Room emptied and is being removed from the registry.
    #[error("Room is closed")]
    Retired,
}

/// Reasons a play is ignored. None of these change room state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayRejection {
    /// Player has no seat in this room.
    #[error("Player is not seated")]
    NotSeated,

    /// Seat now belongs to a newer connection of the same player.
    #[error("Connection was replaced by a reconnect")]
    Superseded,

    /// Match has not been dealt.
    #[error("Match has not started")]
    NotStarted,

    /// The other seat picks the attribute this round.
    #[error("Not this seat's turn")]
    NotYourTurn,

    /// A hand is empty; the match is over.
    #[error("Seat {0} has no cards")]
    EmptyHand(SeatIndex),

    /// Client named a card other than its exposed one.
    #[error("Played {played} but exposed card is {exposed}")]
    CardMismatch {
        /// Card named by the client.
        played: String,
        /// Card actually exposed.
        exposed: String,
    },
}

/// Result of removing a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Seat freed; `remaining` players are left.
    Removed {
        /// Occupied seats after removal.
        remaining: usize,
    },
    /// Seat now belongs to a newer connection of the same player.
    Superseded,
    /// Player had no seat.
    NotSeated,
}

/// Read-only summary of a room.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RoomStatus {
    /// Room identifier.
    pub room_id: String,
    /// Occupied seats.
    pub seats: usize,
    /// Current round (0 = not started).
    pub round: u32,
}

/// State of one match.
#[derive(Debug)]
pub struct Room {
    id: String,
    catalog: Arc<CardCatalog>,
    seats: [Option<Seat>; SEAT_COUNT],
    round: u32,
    turn: SeatIndex,
    retired: bool,
}

impl Room {
    /// Create an empty room.
    pub fn new(id: &str, catalog: Arc<CardCatalog>) -> Self {
        Self {
            id: id.to_string(),
            catalog,
            seats: [None, None],
            round: 0,
            turn: 0,
            retired: false,
        }
    }

    /// Room identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current round (0 = not started).
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Seat that picks the next attribute. Meaningful once round >= 1.
    pub fn turn(&self) -> SeatIndex {
        self.turn
    }

    /// Occupied seat count.
    pub fn seat_count(&self) -> usize {
        self.seats.iter().flatten().count()
    }

    /// True once the last player left.
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Seat at `index`, if occupied.
    pub fn seat(&self, index: SeatIndex) -> Option<&Seat> {
        self.seats.get(index).and_then(Option::as_ref)
    }

    /// Seat index held by `participant_id`.
    pub fn seat_of(&self, participant_id: &str) -> Option<SeatIndex> {
        self.seats
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.participant_id == participant_id))
    }

    /// Summary for status reports.
    pub fn status(&self) -> RoomStatus {
        RoomStatus {
            room_id: self.id.clone(),
            seats: self.seat_count(),
            round: self.round,
        }
    }

    /// Seat a player, or rebind a returning player's channel.
    ///
    /// A returning player whose match already started forces a fresh deal,
    /// so both seats restart from a state they both have seen.
    pub fn join(
        &mut self,
        participant_id: &str,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<JoinResult, RoomError> {
        if self.retired {
            return Err(RoomError::Retired);
        }

        let (seat, reconnected) = match self.seat_of(participant_id) {
            Some(index) => {
                if let Some(existing) = self.seats[index].as_mut() {
                    existing.sender = sender;
                }
                (index, true)
            }
            None => {
                let free = self
                    .seats
                    .iter()
                    .position(Option::is_none)
                    .ok_or(RoomError::RoomFull)?;
                self.seats[free] = Some(Seat::new(participant_id, sender));
                (free, false)
            }
        };

        if reconnected && self.round >= 1 {
            info!(room = %self.id, player = participant_id, "Player reconnected mid-match, restarting");
            let dispatches = self.start_game();
            return Ok(JoinResult { seat, outcome: JoinOutcome::Restarted, dispatches });
        }

        if self.seat_count() < SEAT_COUNT {
            let dispatches = self
                .seat(seat)
                .map(|s| s.dispatch(ServerMessage::Waiting(WaitingInfo::default())))
                .into_iter()
                .collect();
            let outcome = if reconnected { JoinOutcome::Resumed } else { JoinOutcome::Waiting };
            return Ok(JoinResult { seat, outcome, dispatches });
        }

        let dispatches = self.start_game();
        Ok(JoinResult { seat, outcome: JoinOutcome::Started, dispatches })
    }

    /// Deal a new match with an entropy-seeded RNG.
    pub fn start_game(&mut self) -> Vec<Dispatch> {
        let mut rng = StdRng::from_entropy();
        self.start_game_with(&mut rng)
    }

    /// Deal a new match: round 1, random first turn, fresh hands.
    ///
    /// Does nothing unless both seats are occupied.
    pub fn start_game_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<Dispatch> {
        if self.seat_count() < SEAT_COUNT {
            return Vec::new();
        }

        let (hand_a, hand_b) = deal_with(&self.catalog, rng);
        self.round = 1;
        self.turn = rng.gen_range(0..SEAT_COUNT);

        for (seat, hand) in self.seats.iter_mut().flatten().zip([hand_a, hand_b]) {
            seat.hand = hand;
            seat.commitment = None;
        }

        info!(room = %self.id, first_turn = self.turn, "Match started");

        let (turn, round) = (self.turn, self.round);
        self.snapshot(|index, own, opponent| {
            ServerMessage::Start(StartInfo {
                your_top_card: own.hand.exposed().cloned(),
                opponent_top_card: opponent.hand.exposed().cloned(),
                your_deck_size: own.hand.len(),
                opponent_deck_size: opponent.hand.len(),
                your_turn: index == turn,
                round,
            })
        })
    }

    /// Play the acting seat's exposed card on `attribute`.
    ///
    /// Only the connection currently bound to the seat (`sender`) may play.
    /// The other seat's exposed card is compared on the same attribute and
    /// the round resolves immediately.
    pub fn play(
        &mut self,
        participant_id: &str,
        sender: &mpsc::Sender<ServerMessage>,
        attribute: &str,
        card_name: Option<&str>,
    ) -> Result<Vec<Dispatch>, PlayRejection> {
        let acting = self.seat_of(participant_id).ok_or(PlayRejection::NotSeated)?;
        if self.seats[acting].as_ref().is_some_and(|s| !s.sender.same_channel(sender)) {
            return Err(PlayRejection::Superseded);
        }

        if self.round == 0 || self.seat_count() < SEAT_COUNT {
            return Err(PlayRejection::NotStarted);
        }
        if acting != self.turn {
            return Err(PlayRejection::NotYourTurn);
        }

        let other = 1 - acting;
        let acting_card = self.exposed(acting).ok_or(PlayRejection::EmptyHand(acting))?;
        let other_card = self.exposed(other).ok_or(PlayRejection::EmptyHand(other))?;

        if let Some(played) = card_name {
            if played != acting_card.name {
                return Err(PlayRejection::CardMismatch {
                    played: played.to_string(),
                    exposed: acting_card.name,
                });
            }
        }

        for (index, card) in [(acting, acting_card), (other, other_card)] {
            if let Some(seat) = self.seats[index].as_mut() {
                seat.commitment = Some(Commitment {
                    card,
                    attribute: attribute.to_string(),
                });
            }
        }

        Ok(self.resolve_round(acting))
    }

    /// Free a player's seat if it still belongs to `sender`'s connection.
    ///
    /// The remaining player, if any, drops back to a not-started room.
    pub fn remove(
        &mut self,
        participant_id: &str,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> RemoveOutcome {
        let Some(index) = self.seat_of(participant_id) else {
            return RemoveOutcome::NotSeated;
        };

        if self.seats[index].as_ref().is_some_and(|s| !s.sender.same_channel(sender)) {
            return RemoveOutcome::Superseded;
        }

        self.seats[index] = None;
        self.round = 0;
        self.turn = 0;
        for seat in self.seats.iter_mut().flatten() {
            seat.hand.clear();
            seat.commitment = None;
        }

        let remaining = self.seat_count();
        if remaining == 0 {
            self.retired = true;
        }

        info!(room = %self.id, player = participant_id, remaining, "Player left room");
        RemoveOutcome::Removed { remaining }
    }

    fn exposed(&self, index: SeatIndex) -> Option<Card> {
        self.seat(index).and_then(|s| s.hand.exposed().cloned())
    }

    fn resolve_round(&mut self, acting: SeatIndex) -> Vec<Dispatch> {
        let result = match &mut self.seats {
            [Some(a), Some(b)] => {
                let result = resolve(
                    [&mut a.hand, &mut b.hand],
                    [a.commitment.as_ref(), b.commitment.as_ref()],
                    acting,
                );
                a.commitment = None;
                b.commitment = None;
                result
            }
            _ => return Vec::new(),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(room = %self.id, error = %e, "Round could not be resolved, ignoring");
                return Vec::new();
            }
        };

        let resolved_round = self.round;
        self.turn = outcome.next_turn;
        self.round += 1;

        let winner = outcome
            .winner
            .and_then(|w| self.seat(w))
            .map(|s| s.participant_id.clone())
            .unwrap_or_else(|| DRAW_MARKER.to_string());
        let game_over = self.game_over_label(&outcome);

        debug!(
            room = %self.id,
            round = resolved_round,
            attribute = %outcome.attribute,
            values = ?outcome.values,
            winner = %winner,
            "Round resolved"
        );
        if let Some(result) = &game_over {
            info!(room = %self.id, result = %result, "Match over");
        }

        let turn = self.turn;
        self.snapshot(|index, own, opponent| {
            ServerMessage::RoundResult(RoundResultInfo {
                your_top_card: own.hand.exposed().cloned(),
                opponent_top_card: opponent.hand.exposed().cloned(),
                your_deck_size: own.hand.len(),
                opponent_deck_size: opponent.hand.len(),
                winner: winner.clone(),
                game_over: game_over.clone(),
                your_turn: index == turn,
                round: resolved_round,
                attribute: outcome.attribute.clone(),
            })
        })
    }

    fn game_over_label(&self, outcome: &RoundOutcome) -> Option<String> {
        match outcome.game_over? {
            GameOver::Winner(seat) => self.seat(seat).map(|s| s.participant_id.clone()),
            GameOver::Tie => Some(TIE_MARKER.to_string()),
        }
    }

    /// Build one message per seat, each from that seat's point of view.
    fn snapshot<F>(&self, build: F) -> Vec<Dispatch>
    where
        F: Fn(SeatIndex, &Seat, &Seat) -> ServerMessage,
    {
        match &self.seats {
            [Some(a), Some(b)] => vec![a.dispatch(build(0, a, b)), b.dispatch(build(1, b, a))],
            _ => Vec::new(),
        }
    }
}
