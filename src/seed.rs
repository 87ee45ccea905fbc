//! Initial catalog: the 78-card deck and a handful of mentors.

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::models::{Arcana, NewCard, NewMentor, NewSuit};
use crate::store::{
    find_suit_id, insert_card_row, insert_mentor_row, insert_suit_row, Store, StoreError,
};

/// (name, upright, reversed, keywords)
const MAJOR_ARCANA: [(&str, &str, &str, &str); 22] = [
    ("The Fool", "New beginnings, spontaneity, a leap of faith", "Recklessness, hesitation, naivety", "beginnings, innocence, freedom"),
    ("The Magician", "Willpower, skill, manifestation", "Manipulation, untapped talent, trickery", "power, skill, action"),
    ("The High Priestess", "Intuition, hidden knowledge, the subconscious", "Secrets, withdrawal, ignored instincts", "intuition, mystery, wisdom"),
    ("The Empress", "Abundance, nurturing, fertility", "Dependence, creative block, smothering", "abundance, nature, care"),
    ("The Emperor", "Authority, structure, stability", "Rigidity, domination, lack of discipline", "authority, order, protection"),
    ("The Hierophant", "Tradition, guidance, shared belief", "Rebellion, dogma, unconventional paths", "tradition, teaching, faith"),
    ("The Lovers", "Love, harmony, meaningful choices", "Disharmony, imbalance, misaligned values", "love, union, choice"),
    ("The Chariot", "Determination, victory, control", "Lack of direction, aggression, obstacles", "will, victory, drive"),
    ("Strength", "Courage, compassion, inner strength", "Self-doubt, weakness, raw emotion", "courage, patience, influence"),
    ("The Hermit", "Introspection, solitude, inner guidance", "Isolation, loneliness, withdrawal", "solitude, reflection, search"),
    ("Wheel of Fortune", "Cycles, fate, turning points", "Bad luck, resistance to change", "fate, cycles, destiny"),
    ("Justice", "Fairness, truth, cause and effect", "Injustice, dishonesty, avoidance", "truth, law, balance"),
    ("The Hanged Man", "Surrender, new perspective, pause", "Stalling, resistance, indecision", "pause, surrender, perspective"),
    ("Death", "Endings, transformation, transition", "Resistance to change, stagnation", "ending, change, renewal"),
    ("Temperance", "Balance, moderation, patience", "Excess, imbalance, haste", "balance, patience, harmony"),
    ("The Devil", "Attachment, temptation, shadow self", "Release, breaking free, reclaiming power", "bondage, desire, shadow"),
    ("The Tower", "Sudden upheaval, revelation, awakening", "Averted disaster, fear of change", "upheaval, chaos, revelation"),
    ("The Star", "Hope, renewal, serenity", "Despair, disconnection, lost faith", "hope, inspiration, calm"),
    ("The Moon", "Illusion, intuition, uncertainty", "Clarity, released fear, truth revealed", "dreams, illusion, instinct"),
    ("The Sun", "Joy, success, vitality", "Temporary sadness, dimmed optimism", "joy, success, warmth"),
    ("Judgement", "Reflection, reckoning, awakening", "Self-doubt, refusal of the call", "rebirth, calling, absolution"),
    ("The World", "Completion, integration, accomplishment", "Unfinished business, shortcuts", "completion, wholeness, travel"),
];

/// (suit, element theme, color)
const MINOR_SUITS: [(&str, &str, &str); 4] = [
    ("Wands", "passion, ambition and creative fire", "#D9822B"),
    ("Cups", "emotion, love and intuition", "#2B6CD9"),
    ("Swords", "thought, conflict and truth", "#8A8FA3"),
    ("Pentacles", "work, money and the material world", "#3E9B4F"),
];

const RANKS: [&str; 14] = [
    "Ace", "Two", "Three", "Four", "Five", "Six", "Seven", "Eight", "Nine", "Ten", "Page",
    "Knight", "Queen", "King",
];

const MENTORS: [(&str, u8, &str); 4] = [
    ("Madame Zora", 9, "Love and destiny"),
    ("Professor Alden", 2, "Career and practical decisions"),
    ("Luna Whitlock", 7, "Dreams and intuition"),
    ("Old Barnaby", 5, "Family and home"),
];

/// What a seeding run inserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub suits: usize,
    pub cards: usize,
    pub mentors: usize,
}

/// Insert the deck and mentors into an empty catalog. No-op when any card exists.
///
/// The whole run is one transaction. Suits left by an earlier run are reused.
pub async fn seed_catalog(store: &Store) -> Result<SeedReport, StoreError> {
    let now = Utc::now();
    let report = store
        .execute(move |conn| {
            let tx = conn.transaction()?;
            let existing: i64 = tx.query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))?;
            if existing > 0 {
                log::debug!("catalog already populated, skipping seed");
                return Ok(SeedReport::default());
            }

            let report = seed_rows(&tx, &now)?;
            tx.commit()?;
            Ok(report)
        })
        .await?;

    if report != SeedReport::default() {
        log::info!(
            "Seeded catalog: {} suits, {} cards, {} mentors",
            report.suits,
            report.cards,
            report.mentors
        );
    }
    Ok(report)
}

fn seed_rows(conn: &Connection, now: &DateTime<Utc>) -> Result<SeedReport, StoreError> {
    let mut report = SeedReport::default();

    let major = ensure_suit(
        conn,
        &NewSuit {
            name: "Major Arcana".to_string(),
            arcana: Arcana::Major,
            description: "The 22 trump cards tracing the Fool's journey".to_string(),
            color: "#6B3FA0".to_string(),
        },
        &mut report,
    )?;

    for (number, (name, upright, reversed, keywords)) in MAJOR_ARCANA.iter().enumerate() {
        insert_card_row(
            conn,
            &NewCard {
                suit_id: major,
                name: name.to_string(),
                number: Some(number as i32),
                image_url: None,
                upright_meaning: upright.to_string(),
                reversed_meaning: reversed.to_string(),
                keywords: keywords.to_string(),
                description: format!("{}, trump {} of the Major Arcana.", name, number),
            },
        )?;
        report.cards += 1;
    }

    for (suit_name, theme, color) in MINOR_SUITS {
        let suit = ensure_suit(
            conn,
            &NewSuit {
                name: suit_name.to_string(),
                arcana: Arcana::Minor,
                description: format!("The suit of {}", theme),
                color: color.to_string(),
            },
            &mut report,
        )?;

        for (index, rank) in RANKS.iter().enumerate() {
            let name = format!("{} of {}", rank, suit_name);
            insert_card_row(
                conn,
                &NewCard {
                    suit_id: suit,
                    number: Some(index as i32 + 1),
                    image_url: None,
                    upright_meaning: format!("{} energy flowing in matters of {}", rank, theme),
                    reversed_meaning: format!("{} energy blocked in matters of {}", rank, theme),
                    keywords: format!("{}, {}", rank.to_lowercase(), suit_name.to_lowercase()),
                    description: format!("The {} of the suit of {}.", rank, suit_name),
                    name,
                },
            )?;
            report.cards += 1;
        }
    }

    let mentors: i64 = conn.query_row("SELECT COUNT(*) FROM mentors", [], |row| row.get(0))?;
    if mentors == 0 {
        for (name, level, specialization) in MENTORS {
            insert_mentor_row(
                conn,
                &NewMentor {
                    name: name.to_string(),
                    mystical_level: level,
                    specialization: specialization.to_string(),
                    avatar_url: None,
                    is_active: true,
                },
                now,
            )?;
            report.mentors += 1;
        }
    }

    Ok(report)
}

fn ensure_suit(
    conn: &Connection,
    suit: &NewSuit,
    report: &mut SeedReport,
) -> Result<i64, StoreError> {
    if let Some(id) = find_suit_id(conn, &suit.name, suit.arcana)? {
        log::debug!("reusing suit {} ({})", suit.name, id);
        return Ok(id);
    }
    let id = insert_suit_row(conn, suit)?;
    report.suits += 1;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CardFilter;
    use crate::resolver::CardResolver;
    use crate::store::fixtures;

    #[tokio::test]
    async fn test_seed_full_deck_once() {
        let store = fixtures::store().await;
        let report = seed_catalog(&store).await.unwrap();
        assert_eq!(
            report,
            SeedReport {
                suits: 5,
                cards: 78,
                mentors: 4
            }
        );
        assert_eq!(store.count_cards().await.unwrap(), 78);

        let again = seed_catalog(&store).await.unwrap();
        assert_eq!(again, SeedReport::default());
        assert_eq!(store.count_cards().await.unwrap(), 78);
    }

    #[tokio::test]
    async fn test_seed_reuses_suits_left_by_an_interrupted_run() {
        let store = fixtures::store().await;
        let major = store
            .insert_suit(NewSuit {
                name: "Major Arcana".into(),
                arcana: Arcana::Major,
                description: String::new(),
                color: "#6B3FA0".into(),
            })
            .await
            .unwrap();
        store
            .insert_suit(NewSuit {
                name: "Cups".into(),
                arcana: Arcana::Minor,
                description: String::new(),
                color: "#2B6CD9".into(),
            })
            .await
            .unwrap();

        let report = seed_catalog(&store).await.unwrap();
        assert_eq!(report.suits, 3);
        assert_eq!(report.cards, 78);
        assert_eq!(store.list_suits().await.unwrap().len(), 5);

        let fool = store.get_card_by_slug("the-fool").await.unwrap().unwrap();
        assert_eq!(fool.suit.id, major.id);
    }

    #[tokio::test]
    async fn test_failed_seed_leaves_nothing_behind() {
        let store = fixtures::store().await;
        // Rejects one card partway through the deck.
        store
            .execute(|conn| {
                conn.execute_batch("CREATE TRIGGER block_tower BEFORE INSERT ON cards
                     WHEN NEW.slug = 'the-tower'
                     BEGIN SELECT RAISE(ABORT, 'blocked'); END;")?;
                Ok(())
            })
            .await
            .unwrap();

        assert!(seed_catalog(&store).await.is_err());
        assert_eq!(store.count_cards().await.unwrap(), 0);
        assert!(store.list_suits().await.unwrap().is_empty());
        assert!(store.list_mentors(None).await.unwrap().is_empty());

        store
            .execute(|conn| {
                conn.execute_batch("DROP TRIGGER block_tower;")?;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(seed_catalog(&store).await.unwrap().cards, 78);
    }

    #[tokio::test]
    async fn test_seeded_deck_resolves_common_names() {
        let store = fixtures::store().await;
        seed_catalog(&store).await.unwrap();
        let resolver = CardResolver::load(&store).await.unwrap();

        for name in ["The Fool", "Magician", "Wheel of Fortune", "queen of cups", "The Tower"] {
            assert!(resolver.resolve(name).is_some(), "{}", name);
        }

        let cups = store
            .list_cards(CardFilter {
                name: Some("of cups".into()),
                ..CardFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(cups.count, 14);
    }
}
