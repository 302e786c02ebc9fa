use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A flat row of the settings sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsRow {
    pub region: String,
    pub province: String,
}

impl SettingsRow {
    pub fn new(region: impl Into<String>, province: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            province: province.into(),
        }
    }
}

/// Region/province lookup served to clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsIndex {
    /// Distinct regions in order of first appearance.
    pub regions: Vec<String>,
    /// Provinces per region in row order. Duplicates are kept.
    pub provinces_by_region: BTreeMap<String, Vec<String>>,
}

impl SettingsIndex {
    pub fn from_rows(rows: &[SettingsRow]) -> Self {
        let mut index = SettingsIndex::default();
        for row in rows {
            if !index.provinces_by_region.contains_key(&row.region) {
                index.regions.push(row.region.clone());
            }
            index
                .provinces_by_region
                .entry(row.region.clone())
                .or_default()
                .push(row.province.clone());
        }
        index
    }
}
