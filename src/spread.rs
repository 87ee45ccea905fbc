//! Spread catalog.
//!
//! A spread type fixes how many cards a reading draws and what each position
//! in the layout stands for. The set of spreads is closed; anything outside it
//! is rejected with [`UnknownSpreadType`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a string does not name one of the known spreads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown spread type: '{0}'")]
pub struct UnknownSpreadType(pub String);

/// The enumerated card layouts a reading can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadType {
    SingleCard,
    ThreeCardSpread,
    CelticCrossSpread,
    LoveSpread,
    CareerPathSpread,
    RelationshipSpread,
    HorseshoeSpread,
}

impl SpreadType {
    /// Every spread, in catalog order.
    pub const ALL: [SpreadType; 7] = [
        SpreadType::SingleCard,
        SpreadType::ThreeCardSpread,
        SpreadType::CelticCrossSpread,
        SpreadType::LoveSpread,
        SpreadType::CareerPathSpread,
        SpreadType::RelationshipSpread,
        SpreadType::HorseshoeSpread,
    ];

    /// Number of cards the spread requires.
    pub fn card_count(self) -> usize {
        match self {
            SpreadType::SingleCard => 1,
            SpreadType::ThreeCardSpread => 3,
            SpreadType::CelticCrossSpread => 10,
            SpreadType::LoveSpread => 5,
            SpreadType::CareerPathSpread => 5,
            SpreadType::RelationshipSpread => 7,
            SpreadType::HorseshoeSpread => 7,
        }
    }

    /// Wire/storage identifier, e.g. `"celtic_cross_spread"`.
    pub fn as_str(self) -> &'static str {
        match self {
            SpreadType::SingleCard => "single_card",
            SpreadType::ThreeCardSpread => "three_card_spread",
            SpreadType::CelticCrossSpread => "celtic_cross_spread",
            SpreadType::LoveSpread => "love_spread",
            SpreadType::CareerPathSpread => "career_path_spread",
            SpreadType::RelationshipSpread => "relationship_spread",
            SpreadType::HorseshoeSpread => "horseshoe_spread",
        }
    }

    /// Human-readable name.
    pub fn label(self) -> &'static str {
        match self {
            SpreadType::SingleCard => "Single Card",
            SpreadType::ThreeCardSpread => "Three-Card Spread",
            SpreadType::CelticCrossSpread => "Celtic Cross Spread",
            SpreadType::LoveSpread => "Love Spread",
            SpreadType::CareerPathSpread => "Career Path Spread",
            SpreadType::RelationshipSpread => "Relationship Spread",
            SpreadType::HorseshoeSpread => "Horseshoe Spread",
        }
    }

    /// Meaning of each position in layout order. `roles()[0]` is position 1.
    pub fn roles(self) -> &'static [&'static str] {
        match self {
            SpreadType::SingleCard => &["Guidance"],
            SpreadType::ThreeCardSpread => &["Past", "Present", "Future"],
            SpreadType::CelticCrossSpread => &[
                "Present",
                "Challenge",
                "Foundation",
                "Recent Past",
                "Crown",
                "Near Future",
                "Self",
                "Environment",
                "Hopes and Fears",
                "Outcome",
            ],
            SpreadType::LoveSpread => &[
                "You",
                "Your Partner",
                "The Connection",
                "Challenges",
                "Potential",
            ],
            SpreadType::CareerPathSpread => &[
                "Current Position",
                "Obstacles",
                "Strengths",
                "Advice",
                "Outcome",
            ],
            SpreadType::RelationshipSpread => &[
                "You",
                "The Other",
                "The Bond",
                "Past Influences",
                "Present Influences",
                "Challenges",
                "Outcome",
            ],
            SpreadType::HorseshoeSpread => &[
                "Past",
                "Present",
                "Hidden Influences",
                "Obstacles",
                "External Influences",
                "Advice",
                "Outcome",
            ],
        }
    }

    /// Role of a 1-based position, or `None` past the end of the layout.
    pub fn role_at(self, position: usize) -> Option<&'static str> {
        position
            .checked_sub(1)
            .and_then(|index| self.roles().get(index).copied())
    }
}

impl fmt::Display for SpreadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpreadType {
    type Err = UnknownSpreadType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        SpreadType::ALL
            .into_iter()
            .find(|spread| spread.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownSpreadType(s.to_string()))
    }
}

/// Card count for a spread identifier.
pub fn required_cards(spread: &str) -> Result<usize, UnknownSpreadType> {
    spread.parse::<SpreadType>().map(SpreadType::card_count)
}
