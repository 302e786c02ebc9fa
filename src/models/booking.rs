use serde::{Deserialize, Serialize};

/// Summary used when a calendar event carries no (or an empty) SUMMARY.
pub const DEFAULT_SUMMARY: &str = "Reserved";

// ============================================================================
// Booking Models (normalized from room calendar feeds)
// ============================================================================

/// One scheduled event of a room, tracked at day granularity.
///
/// `uid` is copied verbatim from the feed and is not unique across rooms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingEvent {
    pub uid: String,
    pub room_name: String,
    /// `YYYY-MM-DD`, or empty when the event has no start.
    pub start: String,
    /// `YYYY-MM-DD`, or empty when the event has no end.
    pub end: String,
    pub summary: String,
}

impl BookingEvent {
    pub fn summary_or_default(summary: Option<&str>) -> String {
        match summary.map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => DEFAULT_SUMMARY.to_string(),
        }
    }
}
