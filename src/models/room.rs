use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One parsed CSV row, keyed by header name.
pub type Row = BTreeMap<String, String>;

/// Column names used to pull the room identity out of a registry row.
#[derive(Debug, Clone)]
pub struct RoomColumns {
    pub name: String,
    pub calendar_link: String,
}

// ============================================================================
// Room Models (from the registry sheet)
// ============================================================================

/// JSON keys owned by `RoomRecord` itself; registry columns with these names
/// are not copied into `attributes`.
pub const RESERVED_ROOM_KEYS: [&str; 2] = ["name", "calendarLink"];

/// A room from the registry, serialized as one flat object: `name`,
/// `calendarLink`, then every registry column verbatim (including the
/// source name and link columns).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub name: String,
    #[serde(rename = "calendarLink")]
    pub calendar_link: String,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, String>,
}

impl RoomRecord {
    /// Build a record from a registry row. Missing name/link become empty
    /// strings; such rooms are listed but never fetched.
    pub fn from_row(mut row: Row, columns: &RoomColumns) -> Self {
        let name = row.get(&columns.name).cloned().unwrap_or_default();
        let calendar_link = row.get(&columns.calendar_link).cloned().unwrap_or_default();
        row.retain(|key, _| !RESERVED_ROOM_KEYS.contains(&key.as_str()));
        Self {
            name,
            calendar_link,
            attributes: row,
        }
    }

    /// Whether this room has enough data to fetch its calendar.
    pub fn has_feed(&self) -> bool {
        !self.name.trim().is_empty() && !self.calendar_link.trim().is_empty()
    }
}
