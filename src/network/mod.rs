//! Network Layer
//!
//! WebSocket server, wire protocol, and the shared room state that
//! connections drive. Game rules live in `game/`.

pub mod protocol;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;

pub use protocol::{ClientMessage, ErrorCode, ServerMessage};
pub use registry::{RegistryStatus, RoomHandle, RoomRegistry};
pub use room::{JoinOutcome, PlayRejection, RemoveOutcome, Room, RoomError, RoomStatus};
pub use server::{ConfigError, GameServer, GameServerError, ServerConfig, ServerStatus};
pub use session::{Session, SessionState};
