//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON object tagged by its `action` key.

use serde::{Deserialize, Serialize};

use crate::game::catalog::Card;

/// `winner` value reported for a drawn round.
pub const DRAW_MARKER: &str = "draw";

/// `gameOver` value reported when both hands empty together.
pub const TIE_MARKER: &str = "tie";

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Take a seat in a room.
    Join(JoinRequest),

    /// Play the exposed card on an attribute.
    PlayCard(PlayCardRequest),
}

/// Join request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Room identifier shared by both players.
    pub room: String,
    /// Stable player identifier, reused on reconnect.
    pub player: String,
}

impl JoinRequest {
    /// Both identifiers must be non-empty.
    pub fn is_valid(&self) -> bool {
        !self.room.is_empty() && !self.player.is_empty()
    }
}

/// Play request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayCardRequest {
    /// Attribute to compare this round.
    pub attribute: String,
    /// Card the client believes is exposed. Checked against the hand when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<CardRef>,
}

/// Reference to a card by name. Other card fields sent by clients are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardRef {
    /// Card name.
    pub name: String,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Seated alone, waiting for an opponent.
    Waiting(WaitingInfo),

    /// Match (re)started with a fresh deal.
    Start(StartInfo),

    /// A round was resolved.
    RoundResult(RoundResultInfo),

    /// Request failed.
    Error(ServerError),
}

/// Waiting notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitingInfo {
    /// Human readable text.
    pub message: String,
}

impl Default for WaitingInfo {
    fn default() -> Self {
        Self {
            message: "Waiting for another player to join...".to_string(),
        }
    }
}

/// Seat-specific match start snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartInfo {
    /// This seat's exposed card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub your_top_card: Option<Card>,
    /// Opponent's exposed card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_top_card: Option<Card>,
    /// Cards in this seat's hand.
    pub your_deck_size: usize,
    /// Cards in the opponent's hand.
    pub opponent_deck_size: usize,
    /// Whether this seat picks the attribute.
    pub your_turn: bool,
    /// Round number (always 1 at start).
    pub round: u32,
}

/// Seat-specific round result snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResultInfo {
    /// This seat's new exposed card, absent once the hand is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub your_top_card: Option<Card>,
    /// Opponent's new exposed card, absent once their hand is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_top_card: Option<Card>,
    /// Cards in this seat's hand.
    pub your_deck_size: usize,
    /// Cards in the opponent's hand.
    pub opponent_deck_size: usize,
    /// Round winner's player id, or [`DRAW_MARKER`].
    pub winner: String,
    /// Match winner's player id or [`TIE_MARKER`]; absent while the match continues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_over: Option<String>,
    /// Whether this seat picks the next attribute.
    pub your_turn: bool,
    /// Round that was just resolved.
    pub round: u32,
    /// Attribute that was compared.
    pub attribute: String,
}

/// Error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human readable text.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Room already has two other players.
    RoomFull,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Short action name, for logs.
    pub fn action(&self) -> &'static str {
        match self {
            ServerMessage::Waiting(_) => "waiting",
            ServerMessage::Start(_) => "start",
            ServerMessage::RoundResult(_) => "roundResult",
            ServerMessage::Error(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_join() {
        let msg = ClientMessage::from_json(r#"{"action":"join","room":"r1","player":"A"}"#).unwrap();
        match msg {
            ClientMessage::Join(req) => {
                assert_eq!(req.room, "r1");
                assert_eq!(req.player, "A");
                assert!(req.is_valid());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_play_card_with_full_card() {
        let json = r#"{
            "action": "playCard",
            "attribute": "Strength",
            "card": {"name": "Dragon", "stats": {"Strength": 95}, "image": "dragon.png"}
        }"#;
        match ClientMessage::from_json(json).unwrap() {
            ClientMessage::PlayCard(req) => {
                assert_eq!(req.attribute, "Strength");
                assert_eq!(req.card.unwrap().name, "Dragon");
            }
            other => panic!("unexpected {other:?}"),
        }

        match ClientMessage::from_json(r#"{"action":"playCard","attribute":"Magic"}"#).unwrap() {
            ClientMessage::PlayCard(req) => assert!(req.card.is_none()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(ClientMessage::from_json(r#"{"action":"dance"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"action":"join","room":"r1"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"room":"r1","player":"A"}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());

        let empty = JoinRequest { room: String::new(), player: "A".to_string() };
        assert!(!empty.is_valid());
    }

    #[test]
    fn test_round_result_json_shape() {
        let msg = ServerMessage::RoundResult(RoundResultInfo {
            your_top_card: None,
            opponent_top_card: Some(Card::new("Dragon", &[("Strength", 95)], "dragon.png")),
            your_deck_size: 0,
            opponent_deck_size: 2,
            winner: "B".to_string(),
            game_over: Some("B".to_string()),
            your_turn: false,
            round: 1,
            attribute: "Strength".to_string(),
        });

        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["action"], "roundResult");
        assert_eq!(value["opponentTopCard"]["name"], "Dragon");
        assert!(value.get("yourTopCard").is_none());
        assert_eq!(value["yourDeckSize"], 0);
        assert_eq!(value["opponentDeckSize"], 2);
        assert_eq!(value["gameOver"], "B");
        assert_eq!(value["yourTurn"], false);

        assert_eq!(ServerMessage::from_json(&msg.to_json().unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_waiting_and_error_shape() {
        let json = ServerMessage::Waiting(WaitingInfo::default()).to_json().unwrap();
        assert!(json.contains(r#""action":"waiting""#));

        let json = ServerMessage::Error(ServerError {
            code: ErrorCode::RoomFull,
            message: "Room is full".to_string(),
        })
        .to_json()
        .unwrap();
        assert!(json.contains(r#""action":"error""#));
        assert!(json.contains("room_full"));
    }
}
