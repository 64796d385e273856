//! Beverage catalog.
//!
//! The kinds a break can be taken with, in the spelling used on the broadcast
//! wire and in the durable counter record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A beverage a session can be started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BeverageKind {
    IcedCoffee,
    DoubleDouble,
    Cappuccino,
}

impl BeverageKind {
    pub const ALL: [BeverageKind; 3] = [
        BeverageKind::IcedCoffee,
        BeverageKind::DoubleDouble,
        BeverageKind::Cappuccino,
    ];

    /// Wire and record spelling, e.g. `ICED_COFFEE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            BeverageKind::IcedCoffee => "ICED_COFFEE",
            BeverageKind::DoubleDouble => "DOUBLE_DOUBLE",
            BeverageKind::Cappuccino => "CAPPUCCINO",
        }
    }

    /// Short key used by the first version of the counter record.
    pub fn legacy_stat_key(&self) -> &'static str {
        match self {
            BeverageKind::IcedCoffee => "iced",
            BeverageKind::DoubleDouble => "double",
            BeverageKind::Cappuccino => "cappuccino",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BeverageKind::IcedCoffee => "Iced Coffee",
            BeverageKind::DoubleDouble => "Double Double",
            BeverageKind::Cappuccino => "Cappuccino",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BeverageKind::IcedCoffee => "Cool and refreshing",
            BeverageKind::DoubleDouble => "Two sugars, two creams",
            BeverageKind::Cappuccino => "Full of soft foam",
        }
    }
}

impl fmt::Display for BeverageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known beverage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBeverage(pub String);

impl fmt::Display for UnknownBeverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown beverage kind: {}", self.0)
    }
}

impl std::error::Error for UnknownBeverage {}

impl FromStr for BeverageKind {
    type Err = UnknownBeverage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        BeverageKind::ALL
            .into_iter()
            .find(|kind| {
                kind.as_str().eq_ignore_ascii_case(trimmed) || kind.legacy_stat_key() == trimmed
            })
            .ok_or_else(|| UnknownBeverage(s.to_string()))
    }
}
