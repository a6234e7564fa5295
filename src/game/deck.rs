//! Deck Dealer
//!
//! Shuffles the catalog and splits it between the two seats.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::game::catalog::{Card, CardCatalog};
use crate::game::hand::Hand;

/// Deal a fresh pair of hands using an entropy-seeded RNG.
///
/// Every call draws a new seed, so no two matches share a fixed deal.
pub fn deal(catalog: &CardCatalog) -> (Hand, Hand) {
    let mut rng = StdRng::from_entropy();
    deal_with(catalog, &mut rng)
}

/// Deal with a caller-supplied RNG.
///
/// The shuffled deck is split at `len / 2`: seat 0 gets the first half and
/// seat 1 the remainder, so seat 1 holds the extra card on odd sizes.
pub fn deal_with<R: Rng + ?Sized>(catalog: &CardCatalog, rng: &mut R) -> (Hand, Hand) {
    let mut shuffled: Vec<Card> = catalog.cards().to_vec();
    shuffled.shuffle(rng);

    let back = shuffled.split_off(shuffled.len() / 2);
    (shuffled.into_iter().collect(), back.into_iter().collect())
}
