use reqwest::Client;

use crate::config::SourcesConfig;
use crate::error::SyncError;
use crate::models::{RoomColumns, RoomRecord, Row, SettingsRow, RESERVED_ROOM_KEYS};
use crate::services::http::{redact_url, send_with_backoff, RetryPolicy};

/// Loads the room registry and the settings sheet from published CSV links.
#[derive(Debug, Clone)]
pub struct RegistryLoader {
    client: Client,
    retry: RetryPolicy,
    room_columns: RoomColumns,
    region_column: String,
    province_column: String,
}

impl RegistryLoader {
    pub fn new(client: Client, sources: &SourcesConfig) -> Self {
        Self {
            client,
            retry: RetryPolicy::new(sources.max_attempts),
            room_columns: RoomColumns {
                name: sources.room_name_column.clone(),
                calendar_link: sources.room_link_column.clone(),
            },
            region_column: sources.region_column.clone(),
            province_column: sources.province_column.clone(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch the room list. Rows lacking a name or link are returned as-is.
    pub async fn load_rooms(&self, url: &str) -> Result<Vec<RoomRecord>, SyncError> {
        let text = self.fetch_text(url, "room registry").await?;
        let rows = parse_table(&text)?;
        tracing::info!("Loaded {} room rows from {}", rows.len(), redact_url(url));

        if let Some(first) = rows.first() {
            for key in RESERVED_ROOM_KEYS.iter().filter(|k| first.contains_key(**k)) {
                if **key != self.room_columns.name && **key != self.room_columns.calendar_link {
                    tracing::warn!("Registry column '{}' clashes with a room field and is dropped", key);
                }
            }
        }

        Ok(rows
            .into_iter()
            .map(|row| RoomRecord::from_row(row, &self.room_columns))
            .collect())
    }

    /// Fetch the flat region/province rows of the settings sheet.
    pub async fn load_settings(&self, url: &str) -> Result<Vec<SettingsRow>, SyncError> {
        let text = self.fetch_text(url, "settings").await?;
        let rows = parse_table(&text)?;

        if let Some(first) = rows.first() {
            for column in [&self.region_column, &self.province_column] {
                if !first.contains_key(column) {
                    return Err(SyncError::Parse(format!(
                        "Settings sheet has no '{}' column",
                        column
                    )));
                }
            }
        }

        tracing::info!("Loaded {} settings rows from {}", rows.len(), redact_url(url));

        Ok(rows
            .into_iter()
            .map(|mut row| {
                SettingsRow::new(
                    row.remove(&self.region_column).unwrap_or_default(),
                    row.remove(&self.province_column).unwrap_or_default(),
                )
            })
            .collect())
    }

    async fn fetch_text(&self, url: &str, what: &str) -> Result<String, SyncError> {
        let response = send_with_backoff(|| self.client.get(url), self.retry)
            .await
            .map_err(|e| {
                SyncError::SourceUnavailable(format!("Failed to fetch {}: {}", what, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::SourceUnavailable(format!(
                "Failed to fetch {}: {}",
                what,
                status.canonical_reason().unwrap_or(status.as_str())
            )));
        }

        response.text().await.map_err(|e| {
            SyncError::SourceUnavailable(format!("Failed to read {} body: {}", what, e))
        })
    }
}

/// Split CSV text into rows keyed by the header line.
///
/// Blank lines are skipped, cells are trimmed and a row whose width differs
/// from the header is rejected.
pub fn parse_table(text: &str) -> Result<Vec<Row>, SyncError> {
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| SyncError::Parse(format!("Invalid CSV header: {}", e)))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| SyncError::Parse(format!("Invalid CSV row: {}", e)))?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();
        rows.push(row);
    }

    Ok(rows)
}
