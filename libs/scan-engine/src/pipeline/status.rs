//! Per-scan-job status bookkeeping (SPEC_FULL.md §4 "Status/progress
//! bookkeeping detail"), grounded on `original_source`'s
//! `status_collector.py`: the Explorer and Exporter both update one shared
//! aggregator, which the worker binary's `status` subcommand reads back.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStatus {
    pub total_objects: u64,
    pub new_sources: u64,
    pub errors: u64,
    pub last_message: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
}

/// Aggregates `StatusMessage`s by scan tag time, the way a per-scan-job
/// dashboard would. Uses the same `RwLock` + poison-recovery idiom as
/// `gauss_engine::topic::TopicRegistry`.
#[derive(Debug, Default)]
pub struct ScanStatusAggregator {
    jobs: RwLock<HashMap<DateTime<Utc>, JobStatus>>,
}

impl ScanStatusAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, msg: &scan_messages::StatusMessage) {
        let mut guard = match self.jobs.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("status aggregator write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        let entry = guard.entry(msg.scan_tag.time).or_default();
        entry.total_objects += msg.total_objects.unwrap_or(0);
        entry.new_sources += msg.new_sources.unwrap_or(0);
        if msg.status_is_error {
            entry.errors += 1;
        }
        entry.last_message = Some(msg.message.clone());
        entry.last_update = Some(Utc::now());
    }

    pub fn snapshot(&self, scan_time: DateTime<Utc>) -> Option<JobStatus> {
        let guard = match self.jobs.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get(&scan_time).cloned()
    }

    pub fn all(&self) -> Vec<(DateTime<Utc>, JobStatus)> {
        let guard = match self.jobs.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.iter().map(|(k, v)| (*k, v.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_messages::{ScanTag, Scanner, StatusMessage};

    fn tag(time: DateTime<Utc>) -> ScanTag {
        ScanTag { scanner: Scanner { pk: 1, name: "s".into() }, time, user: None, organisation: None }
    }

    #[test]
    fn accumulates_object_counts_across_messages() {
        let agg = ScanStatusAggregator::new();
        let t = Utc::now();
        agg.record(&StatusMessage {
            scan_tag: tag(t),
            message: "explored a.zip".into(),
            status_is_error: false,
            total_objects: Some(3),
            new_sources: Some(1),
            object_size: None,
            object_type: None,
        });
        agg.record(&StatusMessage {
            scan_tag: tag(t),
            message: "explored b.txt".into(),
            status_is_error: true,
            total_objects: Some(1),
            new_sources: None,
            object_size: None,
            object_type: None,
        });
        let snap = agg.snapshot(t).unwrap();
        assert_eq!(snap.total_objects, 4);
        assert_eq!(snap.new_sources, 1);
        assert_eq!(snap.errors, 1);
    }
}
