//! Game logic.
//!
//! Pure card-battle rules with no I/O: the catalog, hands, dealing, and
//! round resolution. Rooms in `network/` drive these under their locks.

pub mod catalog;
pub mod deck;
pub mod hand;
pub mod resolver;

pub use catalog::{Card, CardCatalog, CatalogError};
pub use deck::{deal, deal_with};
pub use hand::Hand;
pub use resolver::{resolve, Commitment, GameOver, ResolveError, RoundOutcome, SeatIndex, SEAT_COUNT};
