//! # Card Duel Server
//!
//! Real-time session server for two-player attribute card battles.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CARD DUEL SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Card rules (no I/O)                       │
//! │  ├── catalog.rs  - Card data and catalog loading             │
//! │  ├── hand.rs     - Ordered hand, front card exposed          │
//! │  ├── deck.rs     - Shuffle and split between seats           │
//! │  └── resolver.rs - Round comparison and card transfer        │
//! │                                                              │
//! │  network/        - Networking and shared state               │
//! │  ├── server.rs   - WebSocket server and config               │
//! │  ├── session.rs  - Per-connection state machine              │
//! │  ├── registry.rs - Room id to room map                       │
//! │  ├── room.rs     - Two-seat match state                      │
//! │  └── protocol.rs - Message types                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Locking
//!
//! The registry lock is held only to fetch, insert, or remove a room and is
//! released before any room lock is taken. Room operations return the
//! messages they produce; callers enqueue them with a non-blocking send
//! before the room lock is dropped.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::{Card, CardCatalog, Hand, SeatIndex};
pub use network::{GameServer, RoomRegistry, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
