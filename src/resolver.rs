//! Maps free-text card names from the model onto catalog cards.

use crate::models::Card;
use crate::store::{Store, StoreError};

/// Lowercase, trim and drop a leading "the ".
pub fn normalize_card_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    match lowered.strip_prefix("the ") {
        Some(rest) => rest.trim_start().to_string(),
        None => lowered,
    }
}

/// Snapshot of the catalog with precomputed match keys.
#[derive(Debug, Clone)]
pub struct CardResolver {
    entries: Vec<Entry>,
}

#[derive(Debug, Clone)]
struct Entry {
    lowered: String,
    normalized: String,
    card: Card,
}

impl CardResolver {
    pub fn new(cards: Vec<Card>) -> Self {
        let entries = cards
            .into_iter()
            .map(|card| Entry {
                lowered: card.name.trim().to_lowercase(),
                normalized: normalize_card_name(&card.name),
                card,
            })
            .collect();
        Self { entries }
    }

    /// Build a resolver over the whole catalog.
    pub async fn load(store: &Store) -> Result<Self, StoreError> {
        Ok(Self::new(store.all_cards().await?))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the card named `name`, or `None`.
    ///
    /// Exact matches on the lowercased or article-stripped form win; otherwise
    /// the first catalog card whose normalized name contains the normalized
    /// query is returned.
    pub fn resolve(&self, name: &str) -> Option<&Card> {
        let lowered = name.trim().to_lowercase();
        let normalized = normalize_card_name(name);
        if normalized.is_empty() {
            return None;
        }

        let exact = self.entries.iter().find(|entry| {
            entry.lowered == lowered
                || entry.normalized == normalized
                || entry.lowered == normalized
        });
        if let Some(entry) = exact {
            return Some(&entry.card);
        }

        let partial = self
            .entries
            .iter()
            .find(|entry| entry.normalized.contains(&normalized));
        if let Some(entry) = partial {
            log::debug!("card '{}' resolved by partial match to '{}'", name, entry.card.name);
        }
        partial.map(|entry| &entry.card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures;

    #[test]
    fn test_normalize_card_name() {
        assert_eq!(normalize_card_name("  The Fool "), "fool");
        assert_eq!(normalize_card_name("Theory of Everything"), "theory of everything");
        assert_eq!(normalize_card_name("Ace of Cups"), "ace of cups");
    }

    #[tokio::test]
    async fn test_article_and_case_insensitive() {
        let store = fixtures::store().await;
        let cards = fixtures::seed_cards(&store, &["The Fool", "Magician", "The High Priestess"]).await;
        let resolver = CardResolver::load(&store).await.unwrap();
        assert_eq!(resolver.len(), 3);

        for query in ["The Fool", "the fool", "Fool", "FOOL "] {
            assert_eq!(resolver.resolve(query).map(|c| c.id), Some(cards[0].id), "{}", query);
        }
        assert_eq!(resolver.resolve("The Magician").map(|c| c.id), Some(cards[1].id));
        assert_eq!(resolver.resolve("magician").map(|c| c.id), Some(cards[1].id));
    }

    #[tokio::test]
    async fn test_partial_match_and_misses() {
        let store = fixtures::store().await;
        let cards = fixtures::seed_cards(&store, &["The High Priestess", "Wheel of Fortune"]).await;
        let resolver = CardResolver::load(&store).await.unwrap();

        assert_eq!(resolver.resolve("Priestess").map(|c| c.id), Some(cards[0].id));
        assert_eq!(resolver.resolve("The Wheel").map(|c| c.id), Some(cards[1].id));
        assert!(resolver.resolve("The Tower").is_none());
        assert!(resolver.resolve("  ").is_none());
    }

    #[test]
    fn test_exact_match_beats_partial() {
        let resolver = CardResolver::new(vec![card(1, "Queen of Cups"), card(2, "Cups")]);
        assert_eq!(resolver.resolve("cups").map(|c| c.id), Some(2));
    }

    fn card(id: i64, name: &str) -> Card {
        Card {
            id,
            name: name.to_string(),
            slug: crate::models::slugify(name),
            suit: crate::models::Suit {
                id: 1,
                name: "Cups".into(),
                arcana: crate::models::Arcana::Minor,
                description: String::new(),
                color: "#3366CC".into(),
            },
            number: None,
            image_url: None,
            upright_meaning: String::new(),
            reversed_meaning: String::new(),
            keywords: String::new(),
            description: String::new(),
        }
    }
}
