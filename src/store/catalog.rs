//! Suits and cards.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{column_error, Store, StoreError};
use crate::models::{slugify, Arcana, Card, CardFilter, NewCard, NewSuit, Page, Suit};

static COLOR_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").unwrap());

const DEFAULT_PAGE_SIZE: u32 = 100;
const MAX_PAGE_SIZE: u32 = 500;

const CARD_SELECT: &str = "SELECT c.id, c.name, c.slug, c.number, c.image_url,
            c.upright_meaning, c.reversed_meaning, c.keywords, c.description,
            s.id, s.name, s.arcana, s.description, s.color
     FROM cards c
     JOIN suits s ON s.id = c.suit_id";

const CARD_ORDER: &str = "ORDER BY s.id, c.number, c.id";

fn suit_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Suit> {
    let arcana: String = row.get(offset + 2)?;
    Ok(Suit {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        arcana: arcana
            .parse::<Arcana>()
            .map_err(|e| column_error(offset + 2, e))?,
        description: row.get(offset + 3)?,
        color: row.get(offset + 4)?,
    })
}

/// Map a row produced by `CARD_SELECT` (starting at `offset`).
pub(crate) fn card_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Card> {
    Ok(Card {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        slug: row.get(offset + 2)?,
        number: row.get(offset + 3)?,
        image_url: row.get(offset + 4)?,
        upright_meaning: row.get(offset + 5)?,
        reversed_meaning: row.get(offset + 6)?,
        keywords: row.get(offset + 7)?,
        description: row.get(offset + 8)?,
        suit: suit_from_row(row, offset + 9)?,
    })
}

/// Insert a suit row. Only one major arcana suit may exist.
pub(crate) fn insert_suit_row(conn: &Connection, suit: &NewSuit) -> Result<i64, StoreError> {
    if !COLOR_CODE.is_match(&suit.color) {
        return Err(StoreError::Invalid(format!(
            "color '{}' is not a #RRGGBB code",
            suit.color
        )));
    }
    if suit.arcana == Arcana::Major && find_suit_id(conn, &suit.name, Arcana::Major)?.is_some() {
        return Err(StoreError::Invalid(
            "There can only be one Major Arcana suit.".to_string(),
        ));
    }

    conn.execute(
        "INSERT INTO suits (name, arcana, description, color) VALUES (?1, ?2, ?3, ?4)",
        params![suit.name, suit.arcana.as_str(), suit.description, suit.color],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Id of the suit a new suit named `name` would collide with. For the major
/// arcana that is the single major suit, whatever its name.
pub(crate) fn find_suit_id(
    conn: &Connection,
    name: &str,
    arcana: Arcana,
) -> Result<Option<i64>, StoreError> {
    let id = match arcana {
        Arcana::Major => conn
            .query_row("SELECT id FROM suits WHERE arcana = 'major' LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?,
        Arcana::Minor => conn
            .query_row(
                "SELECT id FROM suits WHERE arcana = 'minor' AND name = ?1 LIMIT 1",
                params![name],
                |row| row.get(0),
            )
            .optional()?,
    };
    Ok(id)
}

/// Insert a card row; its slug is derived from the name and must be unique.
pub(crate) fn insert_card_row(conn: &Connection, card: &NewCard) -> Result<i64, StoreError> {
    let slug = slugify(&card.name);
    if slug.is_empty() {
        return Err(StoreError::Invalid(format!(
            "card name '{}' produces an empty slug",
            card.name
        )));
    }

    conn.execute(
        "INSERT INTO cards (suit_id, name, slug, number, image_url,
                            upright_meaning, reversed_meaning, keywords, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            card.suit_id,
            card.name,
            slug,
            card.number,
            card.image_url,
            card.upright_meaning,
            card.reversed_meaning,
            card.keywords,
            card.description,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl Store {
    /// Add a suit. Only one major arcana suit may exist.
    pub async fn insert_suit(&self, suit: NewSuit) -> Result<Suit, StoreError> {
        self.execute(move |conn| {
            let id = insert_suit_row(conn, &suit)?;
            Ok(Suit {
                id,
                name: suit.name,
                arcana: suit.arcana,
                description: suit.description,
                color: suit.color,
            })
        })
        .await
    }

    pub async fn list_suits(&self) -> Result<Vec<Suit>, StoreError> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, arcana, description, color FROM suits ORDER BY id")?;
            let suits = stmt
                .query_map([], |row| suit_from_row(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(suits)
        })
        .await
    }

    /// Add a card; its slug is derived from the name and must be unique.
    pub async fn insert_card(&self, card: NewCard) -> Result<Card, StoreError> {
        let id = self
            .execute(move |conn| insert_card_row(conn, &card))
            .await?;

        self.get_card(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("card {} vanished after insert", id)))
    }

    pub async fn get_card(&self, id: i64) -> Result<Option<Card>, StoreError> {
        self.execute(move |conn| {
            let card = conn
                .query_row(&format!("{} WHERE c.id = ?1", CARD_SELECT), params![id], |row| {
                    card_from_row(row, 0)
                })
                .optional()?;
            Ok(card)
        })
        .await
    }

    pub async fn get_card_by_slug(&self, slug: &str) -> Result<Option<Card>, StoreError> {
        let slug = slug.to_lowercase();
        self.execute(move |conn| {
            let card = conn
                .query_row(
                    &format!("{} WHERE c.slug = ?1", CARD_SELECT),
                    params![slug],
                    |row| card_from_row(row, 0),
                )
                .optional()?;
            Ok(card)
        })
        .await
    }

    /// Whole catalog in suit/number order.
    pub async fn all_cards(&self) -> Result<Vec<Card>, StoreError> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!("{} {}", CARD_SELECT, CARD_ORDER))?;
            let cards = stmt
                .query_map([], |row| card_from_row(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(cards)
        })
        .await
    }

    /// Filtered, paginated card listing.
    pub async fn list_cards(&self, filter: CardFilter) -> Result<Page<Card>, StoreError> {
        self.execute(move |conn| {
            let mut clauses: Vec<&str> = Vec::new();
            let mut values: Vec<rusqlite::types::Value> = Vec::new();

            if let Some(suit) = filter.suit {
                clauses.push("c.suit_id = ?");
                values.push(suit.into());
            }
            if let Some(name) = filter.name.filter(|n| !n.trim().is_empty()) {
                clauses.push("instr(lower(c.name), lower(?)) > 0");
                values.push(name.trim().to_string().into());
            }
            if let Some(keywords) = filter.keywords.filter(|k| !k.trim().is_empty()) {
                clauses.push("instr(lower(c.keywords), lower(?)) > 0");
                values.push(keywords.trim().to_string().into());
            }

            let where_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };

            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM cards c {}", where_sql),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )?;

            let limit = filter
                .limit
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE);
            let offset = filter.offset.unwrap_or(0);

            let mut stmt = conn.prepare(&format!(
                "{} {} {} LIMIT {} OFFSET {}",
                CARD_SELECT, where_sql, CARD_ORDER, limit, offset
            ))?;
            let items = stmt
                .query_map(params_from_iter(values.iter()), |row| card_from_row(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(Page {
                items,
                count: count.max(0) as u64,
            })
        })
        .await
    }

    pub async fn count_cards(&self) -> Result<u64, StoreError> {
        self.execute(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures;

    #[tokio::test]
    async fn test_only_one_major_arcana_suit() {
        let store = fixtures::store().await;
        fixtures::seed_cards(&store, &["The Fool"]).await;

        let err = store
            .insert_suit(NewSuit {
                name: "Trumps Again".into(),
                arcana: Arcana::Major,
                description: String::new(),
                color: "#000000".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));

        store
            .insert_suit(NewSuit {
                name: "Cups".into(),
                arcana: Arcana::Minor,
                description: String::new(),
                color: "#1E90FF".into(),
            })
            .await
            .unwrap();
        assert_eq!(store.list_suits().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_insert_suit_rejects_bad_color() {
        let store = fixtures::store().await;
        let err = store
            .insert_suit(NewSuit {
                name: "Wands".into(),
                arcana: Arcana::Minor,
                description: String::new(),
                color: "red".into(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("#RRGGBB"));
    }

    #[tokio::test]
    async fn test_card_lookup_by_id_and_slug() {
        let store = fixtures::store().await;
        let cards = fixtures::seed_cards(&store, &["The Fool", "The Wheel of Fortune"]).await;

        let wheel = &cards[1];
        assert_eq!(wheel.slug, "the-wheel-of-fortune");
        assert_eq!(wheel.suit.arcana, Arcana::Major);

        let by_id = store.get_card(wheel.id).await.unwrap().unwrap();
        let by_slug = store
            .get_card_by_slug("The-Wheel-Of-Fortune")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id, by_slug);
        assert!(store.get_card(9_999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_cards_filters_and_paginates() {
        let store = fixtures::store().await;
        fixtures::seed_cards(
            &store,
            &["The Fool", "The Magician", "The High Priestess", "The Empress"],
        )
        .await;

        let page = store
            .list_cards(CardFilter {
                name: Some("the".into()),
                limit: Some(2),
                offset: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.count, 4);
        let names: Vec<_> = page.items.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["The Magician", "The High Priestess"]);

        let page = store
            .list_cards(CardFilter {
                name: Some("PRIEST".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.items[0].name, "The High Priestess");

        let page = store
            .list_cards(CardFilter {
                keywords: Some("nothing-like-this".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.count, 0);
        assert!(page.items.is_empty());
    }
}
