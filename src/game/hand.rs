//! Player hands.

use std::collections::VecDeque;

use crate::game::catalog::Card;

/// Ordered cards held by one seat. The front card is exposed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Hand {
    cards: VecDeque<Card>,
}

impl Hand {
    /// Empty hand.
    pub fn new() -> Self {
        Self::default()
    }

    /// The exposed card, if any.
    #[inline]
    pub fn exposed(&self) -> Option<&Card> {
        self.cards.front()
    }

    /// Remove and return the exposed card.
    pub fn take_exposed(&mut self) -> Option<Card> {
        self.cards.pop_front()
    }

    /// Drop all cards.
    pub fn clear(&mut self) {
        self.cards.clear();
    }

    /// Number of cards held.
    #[inline]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// True if no cards remain.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Iterate front to back.
    pub fn iter(&self) -> impl Iterator<Item = &Card> {
        self.cards.iter()
    }
}

impl FromIterator<Card> for Hand {
    fn from_iter<I: IntoIterator<Item = Card>>(iter: I) -> Self {
        Self { cards: iter.into_iter().collect() }
    }
}

impl Extend<Card> for Hand {
    fn extend<I: IntoIterator<Item = Card>>(&mut self, iter: I) {
        self.cards.extend(iter);
    }
}
