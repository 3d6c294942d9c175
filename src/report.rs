use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{diff::KeyPartition, error::SyncResult};

/// Outcome of one successful merge call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub table_id: u32,
    pub table_name: String,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub timestamp: DateTime<Utc>,
}

impl LoadReport {
    pub fn from_partition(table_id: u32, table_name: &str, partition: &KeyPartition) -> Self {
        Self {
            table_id,
            table_name: table_name.to_string(),
            inserted: partition.inserted(),
            updated: partition.updated(),
            unchanged: partition.unchanged(),
            timestamp: Utc::now(),
        }
    }

    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }

    /// The `(inserted, updated, unchanged)` triple, handy in assertions.
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.inserted, self.updated, self.unchanged)
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Somewhere load reports are kept once a merge succeeds.
pub trait LoadLedger {
    /// Persists `report` and returns the load id assigned to it.
    fn record(&mut self, report: &LoadReport) -> SyncResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    #[test]
    fn report_counts_follow_the_partition() {
        let partition = KeyPartition {
            insert_keys: [Value::Integer(3)].into_iter().collect(),
            update_keys: [Value::Integer(2)].into_iter().collect(),
            unchanged_keys: [Value::Integer(1), Value::Integer(4)].into_iter().collect(),
        };
        let report = LoadReport::from_partition(7, "orders", &partition);
        assert_eq!(report.counts(), (1, 1, 2));
        assert_eq!(report.total(), 4);
        assert_eq!(report.table_id, 7);
        assert!(report.formatted_timestamp().ends_with('Z'));
    }

    #[test]
    fn report_serializes_with_snake_case_fields() {
        let report = LoadReport::from_partition(1, "t", &KeyPartition::default());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["table_name"], "t");
        assert_eq!(json["inserted"], 0);
        assert!(json["timestamp"].is_string());
    }
}
