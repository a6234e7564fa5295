//! Round Resolver
//!
//! Compares the committed cards of both seats on one attribute and applies
//! the resulting card flow to the hands.
//!
//! ## Card flow
//!
//! - **Winner**: both exposed cards leave their hands, then go to the back of
//!   the winner's hand (winner's own card first, loser's second).
//! - **Draw**: both exposed cards leave play for good, so each hand shrinks
//!   by one.
//!
//! The winner leads the next round; a draw hands the turn to the other seat.

use thiserror::Error;

use crate::game::catalog::Card;
use crate::game::hand::Hand;

/// Seat position within a room (0 or 1).
pub type SeatIndex = usize;

/// Number of seats in a room.
pub const SEAT_COUNT: usize = 2;

/// The card and attribute a seat has locked in for the current round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commitment {
    /// Card being played (the hand's exposed card).
    pub card: Card,
    /// Attribute to compare.
    pub attribute: String,
}

/// Match end condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameOver {
    /// This seat still holds cards; the other is empty.
    Winner(SeatIndex),
    /// Both hands emptied in the same round.
    Tie,
}

/// Result of one resolved round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Attribute that was compared.
    pub attribute: String,
    /// Attribute value of each seat's card.
    pub values: [i64; SEAT_COUNT],
    /// Winning seat, `None` on a draw.
    pub winner: Option<SeatIndex>,
    /// Set when the round ended the match.
    pub game_over: Option<GameOver>,
    /// Seat that acts next.
    pub next_turn: SeatIndex,
}

/// Invariant breaches that make a round unresolvable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Seat has no committed card.
    #[error("Seat {0} has no commitment")]
    MissingCommitment(SeatIndex),

    /// Seat's hand is empty.
    #[error("Seat {0} has an empty hand")]
    EmptyHand(SeatIndex),

    /// Committed card is no longer the exposed card.
    #[error("Seat {0} committed a card that is not exposed")]
    StaleCommitment(SeatIndex),
}

/// Resolve a round using the acting seat's attribute.
///
/// Hands are only mutated if every check passes; on error nothing changes.
pub fn resolve(
    hands: [&mut Hand; SEAT_COUNT],
    commitments: [Option<&Commitment>; SEAT_COUNT],
    acting: SeatIndex,
) -> Result<RoundOutcome, ResolveError> {
    for seat in 0..SEAT_COUNT {
        let commitment = commitments[seat].ok_or(ResolveError::MissingCommitment(seat))?;
        let exposed = hands[seat].exposed().ok_or(ResolveError::EmptyHand(seat))?;
        if exposed.name != commitment.card.name {
            return Err(ResolveError::StaleCommitment(seat));
        }
    }

    let attribute = commitments[acting]
        .ok_or(ResolveError::MissingCommitment(acting))?
        .attribute
        .clone();

    let values = [0usize, 1].map(|seat| {
        commitments[seat]
            .map(|c| c.card.stat(&attribute))
            .unwrap_or_default()
    });

    let winner = match values[0].cmp(&values[1]) {
        std::cmp::Ordering::Greater => Some(0),
        std::cmp::Ordering::Less => Some(1),
        std::cmp::Ordering::Equal => None,
    };

    let [hand_a, hand_b] = hands;
    let played = [hand_a.take_exposed(), hand_b.take_exposed()];

    if let Some(w) = winner {
        let [card_a, card_b] = played;
        let (own, taken) = if w == 0 { (card_a, card_b) } else { (card_b, card_a) };
        let winner_hand = if w == 0 { &mut *hand_a } else { &mut *hand_b };
        winner_hand.extend(own.into_iter().chain(taken));
    }

    let game_over = match (hand_a.is_empty(), hand_b.is_empty()) {
        (true, true) => Some(GameOver::Tie),
        (true, false) => Some(GameOver::Winner(1)),
        (false, true) => Some(GameOver::Winner(0)),
        (false, false) => None,
    };

    let next_turn = winner.unwrap_or(1 - acting);

    Ok(RoundOutcome {
        attribute,
        values,
        winner,
        game_over,
        next_turn,
    })
}
