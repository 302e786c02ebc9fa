use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BookingEvent, RoomRecord, SettingsIndex};

/// The unit stored in the cache and returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub rooms: Vec<RoomRecord>,
    pub bookings: Vec<BookingEvent>,
    pub settings: SettingsIndex,
    pub last_updated: DateTime<Utc>,
}

impl SyncPayload {
    pub fn assemble(
        rooms: Vec<RoomRecord>,
        bookings: Vec<BookingEvent>,
        settings: SettingsIndex,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            rooms,
            bookings,
            settings,
            last_updated: completed_at,
        }
    }
}
