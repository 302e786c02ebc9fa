use std::time::Duration;

use chrono::{Local, NaiveDate};
use futures::stream::{self, StreamExt};
use icalendar::{Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime};
use reqwest::Client;

use crate::config::FeedConfig;
use crate::models::{BookingEvent, RoomRecord};
use crate::services::http::{send_with_backoff, RetryPolicy};

/// Why a single room's calendar contributed nothing.
#[derive(Debug, thiserror::Error)]
pub enum FeedFetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("feed returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("feed did not answer within {0:?}")]
    Timeout(Duration),

    #[error("malformed calendar: {0}")]
    MalformedCalendar(String),
}

/// A room whose feed could not be used during a sync.
#[derive(Debug)]
pub struct FeedFailure {
    pub room_name: String,
    pub error: FeedFetchError,
}

/// Outcome of one aggregation pass.
#[derive(Debug, Default)]
pub struct AggregationReport {
    /// Bookings in room order, then feed order.
    pub bookings: Vec<BookingEvent>,
    pub failures: Vec<FeedFailure>,
}

/// Fetches every room's calendar concurrently and flattens the events.
#[derive(Debug, Clone)]
pub struct FeedAggregator {
    client: Client,
    concurrency: usize,
    timeout: Duration,
}

impl FeedAggregator {
    pub fn new(client: Client, config: &FeedConfig) -> Self {
        Self {
            client,
            concurrency: config.concurrency.max(1),
            timeout: config.timeout(),
        }
    }

    /// Fetch all feeds and gather their bookings.
    ///
    /// Rooms without a name or link are skipped. A failing room is logged and
    /// recorded in the report; it never aborts the pass.
    pub async fn collect(&self, rooms: &[RoomRecord]) -> AggregationReport {
        let fetches: Vec<_> = rooms
            .iter()
            .filter(|room| room.has_feed())
            .map(|room| async move { (room, self.fetch_room(room).await) })
            .collect();

        let results: Vec<_> = stream::iter(fetches)
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut report = AggregationReport::default();
        for (room, result) in results {
            match result {
                Ok(bookings) => {
                    tracing::debug!("Room {} contributed {} bookings", room.name, bookings.len());
                    report.bookings.extend(bookings);
                }
                Err(error) => {
                    tracing::warn!("Error fetching iCal for {}: {}", room.name, error);
                    report.failures.push(FeedFailure {
                        room_name: room.name.clone(),
                        error,
                    });
                }
            }
        }

        report
    }

    async fn fetch_room(&self, room: &RoomRecord) -> Result<Vec<BookingEvent>, FeedFetchError> {
        let body = tokio::time::timeout(self.timeout, self.fetch_body(&room.calendar_link))
            .await
            .map_err(|_| FeedFetchError::Timeout(self.timeout))??;

        parse_bookings(&room.name, &body)
    }

    async fn fetch_body(&self, link: &str) -> Result<String, FeedFetchError> {
        let url = normalize_feed_url(link);
        let response = send_with_backoff(|| self.client.get(&url), RetryPolicy::once()).await?;

        if !response.status().is_success() {
            return Err(FeedFetchError::Status(response.status()));
        }

        Ok(response.text().await?)
    }
}

/// `webcal://` is a hint for calendar apps; the feed itself is served over HTTPS.
fn normalize_feed_url(link: &str) -> String {
    let link = link.trim();
    match link.strip_prefix("webcal://") {
        Some(rest) => format!("https://{}", rest),
        None => link.to_string(),
    }
}

/// Turn an iCalendar document into bookings for `room_name`.
///
/// Only VEVENT components are kept; todos, journals and timezone
/// definitions are ignored.
pub fn parse_bookings(room_name: &str, body: &str) -> Result<Vec<BookingEvent>, FeedFetchError> {
    let body = body.trim_start_matches('\u{feff}').trim_start();
    if !looks_like_calendar(body) {
        return Err(FeedFetchError::MalformedCalendar(
            "document does not start with BEGIN:VCALENDAR".to_string(),
        ));
    }

    let calendar: Calendar = body.parse().map_err(FeedFetchError::MalformedCalendar)?;

    let bookings = calendar
        .components
        .iter()
        .filter_map(|component| match component {
            CalendarComponent::Event(event) => Some(BookingEvent {
                uid: event.property_value("UID").unwrap_or_default().to_string(),
                room_name: room_name.to_string(),
                start: event_date(event.get_start(), event.property_value("DTSTART")),
                end: event_date(event.get_end(), event.property_value("DTEND")),
                summary: BookingEvent::summary_or_default(event.property_value("SUMMARY")),
            }),
            _ => None,
        })
        .collect();

    Ok(bookings)
}

/// Content lines are case-insensitive, so `begin:vcalendar` is accepted too.
fn looks_like_calendar(body: &str) -> bool {
    const HEADER: &str = "BEGIN:VCALENDAR";
    body.get(..HEADER.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(HEADER))
}

/// Like `format_date`, but a bare `YYYYMMDD` value without `VALUE=DATE`
/// still counts as an all-day date.
fn event_date(parsed: Option<DatePerhapsTime>, raw: Option<&str>) -> String {
    let parsed = parsed.or_else(|| {
        raw.and_then(|v| NaiveDate::parse_from_str(v.trim(), "%Y%m%d").ok())
            .map(DatePerhapsTime::Date)
    });
    format_date(parsed)
}

/// Format a calendar date as zero-padded `YYYY-MM-DD`; an absent date is `""`.
///
/// Time of day and offset are dropped. UTC instants are read in the server's
/// local timezone, floating and TZID times keep the wall-clock date they were
/// written with.
pub fn format_date(date: Option<DatePerhapsTime>) -> String {
    match date.map(calendar_day) {
        Some(day) => day.format("%Y-%m-%d").to_string(),
        None => String::new(),
    }
}

fn calendar_day(date: DatePerhapsTime) -> NaiveDate {
    match date {
        DatePerhapsTime::Date(day) => day,
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => naive.date(),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, .. }) => {
            date_time.date()
        }
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(instant)) => {
            instant.with_timezone(&Local).date_naive()
        }
    }
}
