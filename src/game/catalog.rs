//! Card Catalog
//!
//! Static card data. Every match deals from one shared catalog; the server
//! ships a built-in creature deck and can load a replacement from JSON.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::resolver::SEAT_COUNT;

/// Attribute value assumed for a card that does not define the attribute.
pub const MISSING_ATTRIBUTE_VALUE: i64 = 0;

/// A playable card.
///
/// Uses BTreeMap so serialized stats come out in a stable order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Card name, unique within a catalog.
    pub name: String,
    /// Attribute name to value.
    pub stats: BTreeMap<String, i64>,
    /// Image reference for clients.
    pub image: String,
}

impl Card {
    /// Create a card from `(attribute, value)` pairs.
    pub fn new(name: &str, stats: &[(&str, i64)], image: &str) -> Self {
        Self {
            name: name.to_string(),
            stats: stats.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            image: image.to_string(),
        }
    }

    /// Value of `attribute`, or [`MISSING_ATTRIBUTE_VALUE`] if the card lacks it.
    #[inline]
    pub fn stat(&self, attribute: &str) -> i64 {
        self.stats.get(attribute).copied().unwrap_or(MISSING_ATTRIBUTE_VALUE)
    }
}

/// Catalog loading errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Catalog file could not be read.
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog JSON is malformed.
    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    /// Catalog has no cards.
    #[error("Catalog is empty")]
    Empty,

    /// Catalog cannot give both seats a card.
    #[error("Catalog needs at least two cards, got {0}")]
    TooSmall(usize),

    /// Two cards share a name.
    #[error("Duplicate card name: {0}")]
    DuplicateCard(String),
}

/// The canonical ordered list of cards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardCatalog {
    cards: Vec<Card>,
}

impl CardCatalog {
    /// Build a catalog, rejecting lists too small to deal and duplicate names.
    pub fn new(cards: Vec<Card>) -> Result<Self, CatalogError> {
        if cards.is_empty() {
            return Err(CatalogError::Empty);
        }
        if cards.len() < SEAT_COUNT {
            return Err(CatalogError::TooSmall(cards.len()));
        }

        let mut seen = BTreeSet::new();
        for card in &cards {
            if !seen.insert(card.name.as_str()) {
                return Err(CatalogError::DuplicateCard(card.name.clone()));
            }
        }

        Ok(Self { cards })
    }

    /// The built-in mythical creature deck.
    pub fn standard() -> Self {
        const BASE: &str = "https://example.com/images";
        let cards = [
            ("Dragon", 95, 60, 90, "dragon"),
            ("Phoenix", 70, 80, 95, "phoenix"),
            ("Unicorn", 65, 75, 85, "unicorn"),
            ("Kraken", 90, 40, 70, "kraken"),
            ("Pegasus", 60, 95, 75, "pegasus"),
            ("Basilisk", 80, 70, 85, "basilisk"),
            ("Griffin", 85, 80, 60, "griffin"),
            ("White Tiger", 75, 85, 50, "white_tiger"),
        ]
        .into_iter()
        .map(|(name, strength, speed, magic, image)| {
            Card::new(
                name,
                &[("Strength", strength), ("Speed", speed), ("Magic", magic)],
                &format!("{BASE}/{image}.png"),
            )
        })
        .collect();

        Self { cards }
    }

    /// Parse a catalog from a JSON array of cards.
    pub fn from_json(s: &str) -> Result<Self, CatalogError> {
        let cards: Vec<Card> = serde_json::from_str(s)?;
        Self::new(cards)
    }

    /// Load a catalog from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Cards in canonical order.
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Number of cards.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Always false for a constructed catalog.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

impl Default for CardCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
