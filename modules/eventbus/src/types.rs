//! Event type categories used to gate what an `EventBus` may send.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Deserializer};

/// Bitmask of event categories. A bus only sends a batch whose category is
/// contained in its enabled mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventTypes(u8);

impl EventTypes {
    pub const NONE: EventTypes = EventTypes(0);
    /// Ordinary change events (page edits, deletes, moves, ...).
    pub const EVENT: EventTypes = EventTypes(1);
    /// Background job events.
    pub const JOB: EventTypes = EventTypes(2);
    /// CDN/resource purge signals.
    pub const CDN: EventTypes = EventTypes(4);
    pub const ALL: EventTypes = EventTypes(1 | 2 | 4);

    pub fn contains(self, other: EventTypes) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Parse a single category name as it appears in configuration.
    pub fn from_name(name: &str) -> Option<EventTypes> {
        match name.trim().to_ascii_lowercase().as_str() {
            "event" | "events" => Some(Self::EVENT),
            "job" | "jobs" => Some(Self::JOB),
            "cdn" | "purge" => Some(Self::CDN),
            "all" => Some(Self::ALL),
            "none" => Some(Self::NONE),
            _ => None,
        }
    }

    /// Fold a list of category names into one mask.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<EventTypes, String> {
        names.iter().try_fold(Self::NONE, |acc, name| {
            Self::from_name(name.as_ref())
                .map(|t| acc | t)
                .ok_or_else(|| format!("unknown event type '{}'", name.as_ref()))
        })
    }
}

impl Default for EventTypes {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for EventTypes {
    type Output = EventTypes;

    fn bitor(self, rhs: Self) -> Self::Output {
        EventTypes(self.0 | rhs.0)
    }
}

impl fmt::Display for EventTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "none");
        }
        let mut names = Vec::new();
        if self.contains(Self::EVENT) {
            names.push("event");
        }
        if self.contains(Self::JOB) {
            names.push("job");
        }
        if self.contains(Self::CDN) {
            names.push("cdn");
        }
        write!(f, "{}", names.join("|"))
    }
}

impl<'de> Deserialize<'de> for EventTypes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        let names = match Raw::deserialize(deserializer)? {
            Raw::One(name) => vec![name],
            Raw::Many(names) => names,
        };
        EventTypes::from_names(&names).map_err(serde::de::Error::custom)
    }
}
