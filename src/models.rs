//! Domain records shared by the store, the orchestrator and the HTTP layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::spread::SpreadType;

static NON_SLUG_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Lowercase, hyphen-separated identifier derived from a display name.
///
/// `"The Wheel of Fortune"` becomes `"the-wheel-of-fortune"`.
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    NON_SLUG_CHARS
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Whether a suit holds the major or the minor arcana.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arcana {
    Major,
    Minor,
}

impl Arcana {
    pub fn as_str(self) -> &'static str {
        match self {
            Arcana::Major => "major",
            Arcana::Minor => "minor",
        }
    }
}

impl FromStr for Arcana {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "major" => Ok(Arcana::Major),
            "minor" => Ok(Arcana::Minor),
            other => Err(format!("unknown arcana '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suit {
    pub id: i64,
    pub name: String,
    pub arcana: Arcana,
    pub description: String,
    /// Display color, `#RRGGBB`.
    pub color: String,
}

/// Canonical tarot card. Read-only reference data for the reading workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub suit: Suit,
    pub number: Option<i32>,
    pub image_url: Option<String>,
    pub upright_meaning: String,
    pub reversed_meaning: String,
    /// Comma-separated keyword tags.
    pub keywords: String,
    pub description: String,
}

/// Fields needed to add a suit to the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSuit {
    pub name: String,
    pub arcana: Arcana,
    pub description: String,
    pub color: String,
}

/// Fields needed to add a card to the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCard {
    pub suit_id: i64,
    pub name: String,
    pub number: Option<i32>,
    pub image_url: Option<String>,
    pub upright_meaning: String,
    pub reversed_meaning: String,
    pub keywords: String,
    pub description: String,
}

/// Card listing filters. Text filters are case-insensitive substring matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardFilter {
    pub suit: Option<i64>,
    pub name: Option<String>,
    pub keywords: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// One page of a listing plus the total number of matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub count: u64,
}

// ---------------------------------------------------------------------------
// Mentors and profiles
// ---------------------------------------------------------------------------

/// A guide persona a reading can be performed under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mentor {
    pub id: i64,
    pub name: String,
    pub slug: String,
    /// 0 (skeptical) to 10 (fortune teller).
    pub mystical_level: u8,
    pub specialization: String,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMentor {
    pub name: String,
    pub mystical_level: u8,
    pub specialization: String,
    pub avatar_url: Option<String>,
    pub is_active: bool,
}

/// Per-user token balance and preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub available_tokens: u64,
    pub preferences: Value,
    pub preferred_mentor_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// Upright or reversed state of a drawn card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Upright,
    Reversed,
}

impl Orientation {
    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Upright => "upright",
            Orientation::Reversed => "reversed",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upright" => Ok(Orientation::Upright),
            "reversed" => Ok(Orientation::Reversed),
            other => Err(format!("unknown orientation '{}'", other)),
        }
    }
}

/// One user's tarot session.
///
/// `celestial_insight` stays empty until the insight phase succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: i64,
    pub user_id: String,
    pub mentor_id: Option<i64>,
    pub spread_type: SpreadType,
    pub question: String,
    pub notes: String,
    pub celestial_insight: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReading {
    pub user_id: String,
    pub mentor_id: Option<i64>,
    pub spread_type: SpreadType,
    pub question: String,
    pub notes: String,
}

/// A card placed at one position of a reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingCard {
    pub id: i64,
    pub reading_id: i64,
    pub card: Card,
    /// 1-based, unique within the reading.
    pub position: u32,
    pub orientation: Orientation,
    pub role: Option<String>,
    pub interpretation: String,
}

/// A card about to be placed; the store assigns positions from list order.
#[derive(Debug, Clone)]
pub struct Placement {
    pub card_id: i64,
    pub orientation: Orientation,
    pub role: Option<String>,
    pub interpretation: String,
}

/// A reading together with its cards in position order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingDetail {
    #[serde(flatten)]
    pub reading: Reading,
    pub cards: Vec<ReadingCard>,
}

/// Filters for a user's reading history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadingFilter {
    /// Case-insensitive substring of the question.
    pub question: Option<String>,
    /// Only readings created at or after this instant.
    pub date: Option<DateTime<Utc>>,
}
