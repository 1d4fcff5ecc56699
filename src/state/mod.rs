//! Partition watermark state
//!
//! Tracks the high-water mark per partition for incremental streams. A
//! watermark only moves forward: records observed during a sync can only
//! advance it, never regress it, regardless of the order records arrive
//! in. The externally visible snapshot is a flat string map so hosts can
//! persist and restore it without knowing anything about its contents.

use crate::config::ConnectorConfig;
use crate::error::{Error, Result};
use crate::types::{JsonValue, StringMap};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Per-partition watermark store
///
/// Partitions the store has never seen fall back to the configured start
/// floor, so a fresh partition syncs from the beginning of the configured
/// window rather than from epoch.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    floor: DateTime<Utc>,
    marks: BTreeMap<String, DateTime<Utc>>,
}

impl WatermarkStore {
    /// Create an empty store with the configured start floor
    pub fn new(config: &ConnectorConfig) -> Result<Self> {
        Ok(Self {
            floor: config.start_floor()?,
            marks: BTreeMap::new(),
        })
    }

    /// Restore watermarks from a persisted snapshot
    ///
    /// Unparseable entries are rejected rather than skipped; silently
    /// dropping a watermark would re-extract the partition from the floor
    /// and duplicate every record downstream.
    pub fn load(&mut self, snapshot: &StringMap) -> Result<()> {
        for (partition, raw) in snapshot {
            let mark = parse_cursor_str(raw).ok_or_else(|| {
                Error::state(format!(
                    "Unparseable watermark for partition {partition}: {raw:?}"
                ))
            })?;
            self.marks.insert(partition.clone(), mark);
        }
        debug!(partitions = self.marks.len(), "Restored watermark state");
        Ok(())
    }

    /// Snapshot the store as a flat string map (RFC 3339 values)
    pub fn snapshot(&self) -> StringMap {
        self.marks
            .iter()
            .map(|(partition, mark)| (partition.clone(), mark.to_rfc3339()))
            .collect()
    }

    /// The start floor every unseen partition begins from
    pub fn floor(&self) -> DateTime<Utc> {
        self.floor
    }

    /// Current watermark for a partition
    pub fn watermark(&self, partition: &str) -> DateTime<Utc> {
        self.marks.get(partition).copied().unwrap_or(self.floor)
    }

    /// Advance a partition's watermark if the candidate is newer
    ///
    /// Returns whether the watermark moved. Older or equal candidates are
    /// ignored, which keeps the mark monotonic under out-of-order input.
    pub fn advance(&mut self, partition: &str, candidate: DateTime<Utc>) -> bool {
        let current = self.watermark(partition);
        if candidate > current {
            info!(
                partition,
                watermark = %candidate.to_rfc3339(),
                "Advanced watermark"
            );
            self.marks.insert(partition.to_string(), candidate);
            return true;
        }
        false
    }

    /// Decide whether a record passes the partition's watermark
    ///
    /// The boundary is exclusive: a record stamped exactly at the
    /// watermark was emitted by the previous run and is filtered out.
    /// Records with a missing or unparseable cursor field pass through;
    /// dropping them would silently lose data.
    pub fn accepts(&self, partition: &str, record: &JsonValue, cursor_field: &str) -> bool {
        match record_cursor(record, cursor_field) {
            Some(stamp) => stamp > self.watermark(partition),
            None => true,
        }
    }

    /// Observe a record: advance the partition watermark from its cursor
    pub fn observe(&mut self, partition: &str, record: &JsonValue, cursor_field: &str) {
        if let Some(stamp) = record_cursor(record, cursor_field) {
            self.advance(partition, stamp);
        }
    }
}

/// Pull and parse the cursor stamp out of a record
pub fn record_cursor(record: &JsonValue, cursor_field: &str) -> Option<DateTime<Utc>> {
    record
        .get(cursor_field)
        .and_then(Value::as_str)
        .and_then(parse_cursor_str)
}

/// Parse a cursor stamp in any of the formats providers emit
///
/// RFC 3339 first (including the `+0000` offset variant without a
/// colon), then a bare datetime assumed UTC, then a bare date at
/// midnight UTC.
pub fn parse_cursor_str(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.with_timezone(&Utc));
    }
    if let Ok(stamp) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(stamp.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
    }
    None
}
