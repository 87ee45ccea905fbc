//! Readings and the cards laid out in them.

use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::catalog::card_from_row;
use super::{column_error, format_timestamp, timestamp_column, Store, StoreError};
use crate::models::{
    NewReading, Orientation, Placement, Reading, ReadingCard, ReadingDetail, ReadingFilter,
};
use crate::spread::SpreadType;

const READING_SELECT: &str = "SELECT id, user_id, mentor_id, spread_type, question, notes,
            celestial_insight, created_at
     FROM readings";

fn reading_from_row(row: &Row<'_>) -> rusqlite::Result<Reading> {
    let spread: String = row.get(3)?;
    Ok(Reading {
        id: row.get(0)?,
        user_id: row.get(1)?,
        mentor_id: row.get(2)?,
        spread_type: spread
            .parse::<SpreadType>()
            .map_err(|e| column_error(3, e.to_string()))?,
        question: row.get(4)?,
        notes: row.get(5)?,
        celestial_insight: row.get(6)?,
        created_at: timestamp_column(row, 7)?,
    })
}

fn load_reading_cards(conn: &Connection, reading_id: i64) -> Result<Vec<ReadingCard>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT rc.id, rc.reading_id, rc.position, rc.orientation, rc.role, rc.interpretation,
                c.id, c.name, c.slug, c.number, c.image_url,
                c.upright_meaning, c.reversed_meaning, c.keywords, c.description,
                s.id, s.name, s.arcana, s.description, s.color
         FROM reading_cards rc
         JOIN cards c ON c.id = rc.card_id
         JOIN suits s ON s.id = c.suit_id
         WHERE rc.reading_id = ?1
         ORDER BY rc.position",
    )?;

    let cards = stmt
        .query_map(params![reading_id], |row| {
            let orientation: String = row.get(3)?;
            Ok(ReadingCard {
                id: row.get(0)?,
                reading_id: row.get(1)?,
                position: row.get(2)?,
                orientation: orientation
                    .parse::<Orientation>()
                    .map_err(|e| column_error(3, e))?,
                role: row.get(4)?,
                interpretation: row.get(5)?,
                card: card_from_row(row, 6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(cards)
}

fn load_owned_reading(
    conn: &Connection,
    reading_id: i64,
    user_id: &str,
) -> Result<Option<Reading>, StoreError> {
    let reading = conn
        .query_row(
            &format!("{} WHERE id = ?1 AND user_id = ?2", READING_SELECT),
            params![reading_id, user_id],
            reading_from_row,
        )
        .optional()?;
    Ok(reading)
}

impl Store {
    /// Persist a freshly validated reading. `created_at` is set here and never changes.
    pub async fn insert_reading(&self, reading: NewReading) -> Result<Reading, StoreError> {
        let created_at = Utc::now();
        let stamp = format_timestamp(&created_at);
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO readings (user_id, mentor_id, spread_type, question, notes,
                                       celestial_insight, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, '', ?6)",
                params![
                    reading.user_id,
                    reading.mentor_id,
                    reading.spread_type.as_str(),
                    reading.question,
                    reading.notes,
                    stamp,
                ],
            )?;
            let id = conn.last_insert_rowid();
            let stored = load_owned_reading(conn, id, &reading.user_id)?
                .ok_or_else(|| StoreError::NotFound(format!("reading {} vanished after insert", id)))?;
            Ok(stored)
        })
        .await
    }

    /// A reading, only if it belongs to `user_id`.
    pub async fn get_reading(
        &self,
        reading_id: i64,
        user_id: &str,
    ) -> Result<Option<Reading>, StoreError> {
        let user_id = user_id.to_string();
        self.execute(move |conn| load_owned_reading(conn, reading_id, &user_id))
            .await
    }

    /// A reading with its cards, only if it belongs to `user_id`.
    pub async fn get_reading_detail(
        &self,
        reading_id: i64,
        user_id: &str,
    ) -> Result<Option<ReadingDetail>, StoreError> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let Some(reading) = load_owned_reading(conn, reading_id, &user_id)? else {
                return Ok(None);
            };
            let cards = load_reading_cards(conn, reading.id)?;
            Ok(Some(ReadingDetail { reading, cards }))
        })
        .await
    }

    /// A user's readings, newest first.
    pub async fn list_readings(
        &self,
        user_id: &str,
        filter: ReadingFilter,
    ) -> Result<Vec<Reading>, StoreError> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut sql = format!("{} WHERE user_id = ?", READING_SELECT);
            let mut values: Vec<SqlValue> = vec![user_id.into()];

            if let Some(question) = filter.question.filter(|q| !q.trim().is_empty()) {
                sql.push_str(" AND instr(lower(question), lower(?)) > 0");
                values.push(question.trim().to_string().into());
            }
            if let Some(since) = filter.date {
                sql.push_str(" AND created_at >= ?");
                values.push(format_timestamp(&since).into());
            }
            sql.push_str(" ORDER BY created_at DESC, id DESC");

            let mut stmt = conn.prepare(&sql)?;
            let readings = stmt
                .query_map(params_from_iter(values.iter()), reading_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(readings)
        })
        .await
    }

    pub async fn reading_cards(&self, reading_id: i64) -> Result<Vec<ReadingCard>, StoreError> {
        self.execute(move |conn| load_reading_cards(conn, reading_id))
            .await
    }

    /// Store a generated insight and swap the reading's card set for `placements`.
    ///
    /// Runs as one transaction: the insight text, the notes, the delete of the
    /// previous cards and the insert of the new ones commit together or not at
    /// all. Positions are assigned 1.. in `placements` order.
    pub async fn save_insight(
        &self,
        reading_id: i64,
        insight: String,
        notes: String,
        placements: Vec<Placement>,
    ) -> Result<Vec<ReadingCard>, StoreError> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let updated = tx.execute(
                "UPDATE readings SET celestial_insight = ?1, notes = ?2 WHERE id = ?3",
                params![insight, notes, reading_id],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("reading {}", reading_id)));
            }

            let removed = tx.execute(
                "DELETE FROM reading_cards WHERE reading_id = ?1",
                params![reading_id],
            )?;

            {
                let mut insert = tx.prepare(
                    "INSERT INTO reading_cards
                        (reading_id, card_id, position, orientation, role, interpretation)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for (index, placement) in placements.iter().enumerate() {
                    insert.execute(params![
                        reading_id,
                        placement.card_id,
                        (index + 1) as i64,
                        placement.orientation.as_str(),
                        placement.role,
                        placement.interpretation,
                    ])?;
                }
            }

            let cards = load_reading_cards(&tx, reading_id)?;
            tx.commit()?;

            log::debug!(
                "reading {}: replaced {} card(s) with {}",
                reading_id,
                removed,
                cards.len()
            );
            Ok(cards)
        })
        .await
    }
}
