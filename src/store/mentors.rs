//! Mentor personas.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_timestamp, timestamp_column, Store, StoreError};
use crate::models::{slugify, Mentor, NewMentor};

const MAX_MYSTICAL_LEVEL: u8 = 10;

const MENTOR_SELECT: &str = "SELECT id, name, slug, mystical_level, specialization, avatar_url,
            is_active, created_at, updated_at
     FROM mentors";

fn mentor_from_row(row: &Row<'_>) -> rusqlite::Result<Mentor> {
    Ok(Mentor {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        mystical_level: row.get(3)?,
        specialization: row.get(4)?,
        avatar_url: row.get(5)?,
        is_active: row.get(6)?,
        created_at: timestamp_column(row, 7)?,
        updated_at: timestamp_column(row, 8)?,
    })
}

/// Insert a mentor row stamped with `now`.
pub(crate) fn insert_mentor_row(
    conn: &Connection,
    mentor: &NewMentor,
    now: &DateTime<Utc>,
) -> Result<i64, StoreError> {
    if mentor.mystical_level > MAX_MYSTICAL_LEVEL {
        return Err(StoreError::Invalid(format!(
            "mystical level {} is outside 0..={}",
            mentor.mystical_level, MAX_MYSTICAL_LEVEL
        )));
    }

    conn.execute(
        "INSERT INTO mentors (name, slug, mystical_level, specialization, avatar_url,
                              is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            mentor.name,
            slugify(&mentor.name),
            mentor.mystical_level,
            mentor.specialization,
            mentor.avatar_url,
            mentor.is_active,
            format_timestamp(now),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl Store {
    pub async fn insert_mentor(&self, mentor: NewMentor) -> Result<Mentor, StoreError> {
        let now = Utc::now();
        let id = self
            .execute(move |conn| insert_mentor_row(conn, &mentor, &now))
            .await?;

        self.get_mentor(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("mentor {} vanished after insert", id)))
    }

    pub async fn get_mentor(&self, id: i64) -> Result<Option<Mentor>, StoreError> {
        self.execute(move |conn| {
            let mentor = conn
                .query_row(
                    &format!("{} WHERE id = ?1", MENTOR_SELECT),
                    params![id],
                    mentor_from_row,
                )
                .optional()?;
            Ok(mentor)
        })
        .await
    }

    /// Mentors ordered by name, optionally restricted by active flag.
    pub async fn list_mentors(&self, is_active: Option<bool>) -> Result<Vec<Mentor>, StoreError> {
        self.execute(move |conn| {
            let mentors = match is_active {
                Some(active) => {
                    let mut stmt = conn.prepare(&format!(
                        "{} WHERE is_active = ?1 ORDER BY name",
                        MENTOR_SELECT
                    ))?;
                    let rows = stmt.query_map(params![active], mentor_from_row)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!("{} ORDER BY name", MENTOR_SELECT))?;
                    let rows = stmt.query_map([], mentor_from_row)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
            };
            Ok(mentors)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures;

    #[tokio::test]
    async fn test_insert_and_filter_mentors() {
        let store = fixtures::store().await;
        let zora = fixtures::seed_mentor(&store, "Madame Zora", true).await;
        fixtures::seed_mentor(&store, "Brother Ash", false).await;

        assert_eq!(zora.slug, "madame-zora");
        assert_eq!(zora.created_at, zora.updated_at);

        let all = store.list_mentors(None).await.unwrap();
        let names: Vec<_> = all.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Brother Ash", "Madame Zora"]);

        let active = store.list_mentors(Some(true)).await.unwrap();
        assert_eq!(active, vec![zora.clone()]);

        assert_eq!(store.get_mentor(zora.id).await.unwrap(), Some(zora));
        assert!(store.get_mentor(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mystical_level_is_bounded() {
        let store = fixtures::store().await;
        let err = store
            .insert_mentor(NewMentor {
                name: "Oracle".into(),
                mystical_level: 11,
                specialization: String::new(),
                avatar_url: None,
                is_active: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }
}
