//! Connection Sessions
//!
//! Per-connection state machine. A session starts unjoined, holds one seat
//! once joined, and frees it when the transport closes.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::network::protocol::{
    ClientMessage, ErrorCode, JoinRequest, PlayCardRequest, ServerError, ServerMessage,
};
use crate::network::registry::{RoomHandle, RoomRegistry};
use crate::network::room::{RemoveOutcome, RoomError};

/// Session state.
#[derive(Debug)]
pub enum SessionState {
    /// Connected, no seat yet.
    Unjoined,
    /// Holding a seat.
    Joined {
        /// Room identifier.
        room_id: String,
        /// Player identifier used for the seat.
        participant_id: String,
        /// The room itself.
        room: RoomHandle,
    },
    /// Transport closed.
    Closed,
}

/// One client connection's view of the game.
pub struct Session {
    connection_id: Uuid,
    registry: Arc<RoomRegistry>,
    sender: mpsc::Sender<ServerMessage>,
    state: SessionState,
}

impl Session {
    /// Create an unjoined session that pushes to `sender`.
    pub fn new(registry: Arc<RoomRegistry>, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            registry,
            sender,
            state: SessionState::Unjoined,
        }
    }

    /// Connection identifier for logs.
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Whether the session holds a seat.
    pub fn is_joined(&self) -> bool {
        matches!(self.state, SessionState::Joined { .. })
    }

    /// Handle one inbound text frame. Unparsable input is dropped.
    pub async fn handle_text(&mut self, text: &str) {
        match ClientMessage::from_json(text) {
            Ok(msg) => self.handle_message(msg).await,
            Err(e) => {
                debug!(connection = %self.connection_id, error = %e, "Dropping malformed message");
            }
        }
    }

    /// Handle one parsed command.
    pub async fn handle_message(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::Join(req) => self.handle_join(req).await,
            ClientMessage::PlayCard(req) => self.handle_play(req).await,
        }
    }

    async fn handle_join(&mut self, req: JoinRequest) {
        if !matches!(self.state, SessionState::Unjoined) {
            debug!(connection = %self.connection_id, room = %req.room, "Ignoring join, already joined");
            return;
        }
        if !req.is_valid() {
            debug!(connection = %self.connection_id, "Ignoring join with empty room or player");
            return;
        }

        match self.registry.join(&req.room, &req.player, self.sender.clone()).await {
            Ok(joined) => {
                info!(
                    connection = %self.connection_id,
                    room = %req.room,
                    player = %req.player,
                    seat = joined.seat,
                    outcome = ?joined.outcome,
                    "Player joined room"
                );
                self.state = SessionState::Joined {
                    room_id: req.room,
                    participant_id: req.player,
                    room: joined.room,
                };
            }
            Err(RoomError::RoomFull) => {
                debug!(connection = %self.connection_id, room = %req.room, "Room full");
                let error = ServerMessage::Error(ServerError {
                    code: ErrorCode::RoomFull,
                    message: RoomError::RoomFull.to_string(),
                });
                if self.sender.send(error).await.is_err() {
                    warn!(connection = %self.connection_id, "Failed to send room full error");
                }
            }
            Err(e) => {
                debug!(connection = %self.connection_id, room = %req.room, error = %e, "Join failed");
            }
        }
    }

    async fn handle_play(&mut self, req: PlayCardRequest) {
        let SessionState::Joined { room_id, participant_id, room } = &self.state else {
            debug!(connection = %self.connection_id, "Ignoring play before join");
            return;
        };

        let card_name = req.card.as_ref().map(|c| c.name.as_str());
        let result = self
            .registry
            .play(room, participant_id, &self.sender, &req.attribute, card_name)
            .await;

        if let Err(rejection) = result {
            debug!(
                room = %room_id,
                player = %participant_id,
                attribute = %req.attribute,
                reason = %rejection,
                "Play rejected"
            );
        }
    }

    /// Transport closed: release the seat and move to [`SessionState::Closed`].
    pub async fn close(&mut self) {
        let state = std::mem::replace(&mut self.state, SessionState::Closed);

        if let SessionState::Joined { room_id, participant_id, room } = state {
            match self.registry.leave(&room, &participant_id, &self.sender).await {
                RemoveOutcome::Removed { remaining } => {
                    info!(room = %room_id, player = %participant_id, remaining, "Seat released");
                }
                RemoveOutcome::Superseded => {
                    debug!(room = %room_id, player = %participant_id, "Seat held by a newer connection");
                }
                RemoveOutcome::NotSeated => {
                    debug!(room = %room_id, player = %participant_id, "Seat already released");
                }
            }
        }
    }
}
