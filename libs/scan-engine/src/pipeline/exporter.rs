//! The Exporter (§4.H): the pipeline's terminal sink. Consumes `matches`,
//! `metadata`, `problems`, and `status` and writes out one record per
//! positive match, deduplicated by `(handle.crunch, scan_tag.time)` so
//! at-least-once delivery from upstream workers (§8 testable property 14)
//! never produces two records for the same handle.
//!
//! Mirrors `TopicSink::send` (`pipeline::sink::spawn_sink_task`): one
//! `send`-shaped trait method per exported record, decoupling "what gets
//! exported" from "where it goes".

use std::collections::HashSet;
use std::sync::Mutex;

use scan_messages::{Metadata, StatusMessage};

use crate::bus::ScanBus;
use crate::pipeline::status::ScanStatusAggregator;

/// Where the exporter writes terminal, positive match records.
pub trait ExportSink: Send + Sync {
    fn send(&self, record: &ExportedMatch) -> Result<(), std::io::Error>;
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ExportedMatch {
    pub crunch: String,
    pub handle_presentation: String,
    pub handle_presentation_url: Option<String>,
    pub mime: Option<String>,
    pub fragments: Vec<serde_json::Value>,
}

/// Writes one JSON line per record to stdout — the demo-friendly default
/// every other stage falls back to.
pub struct StdoutSink;

impl ExportSink for StdoutSink {
    fn send(&self, record: &ExportedMatch) -> Result<(), std::io::Error> {
        println!("{}", serde_json::to_string(record).expect("ExportedMatch serialises"));
        Ok(())
    }
}

/// Appends one JSON line per record to a file, the way a deployment would
/// point the exporter at a durable log instead of stdout.
pub struct FileSink {
    file: Mutex<std::fs::File>,
}

impl FileSink {
    pub fn open(path: &str) -> Result<Self, std::io::Error> {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl ExportSink for FileSink {
    fn send(&self, record: &ExportedMatch) -> Result<(), std::io::Error> {
        use std::io::Write;
        let line = serde_json::to_string(record).expect("ExportedMatch serialises");
        let mut file = self.file.lock().unwrap_or_else(|p| p.into_inner());
        writeln!(file, "{line}")
    }
}

/// Pending positive matches waiting for their metadata to arrive, keyed by
/// crunch. The Matcher and Tagger race independently, so either message can
/// arrive first.
#[derive(Default)]
struct Pending {
    waiting_for_metadata: std::collections::HashMap<String, Vec<serde_json::Value>>,
    waiting_for_match: std::collections::HashMap<String, Metadata>,
    exported: HashSet<String>,
}

pub struct Exporter {
    sink: Box<dyn ExportSink>,
    status: std::sync::Arc<ScanStatusAggregator>,
    pending: Mutex<Pending>,
}

impl Exporter {
    pub fn new(sink: Box<dyn ExportSink>, status: std::sync::Arc<ScanStatusAggregator>) -> Self {
        Self { sink, status, pending: Mutex::new(Pending::default()) }
    }

    fn dedup_key(crunch: &str, scan_tag: &scan_messages::ScanTag) -> String {
        format!("{crunch}@{}", scan_tag.idempotency_time())
    }

    fn export_if_complete(&self, crunch: &str, scan_tag: &scan_messages::ScanTag) {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        let key = Self::dedup_key(crunch, scan_tag);
        if pending.exported.contains(&key) {
            return;
        }
        let Some(metadata) = pending.waiting_for_match.get(crunch).cloned() else { return };
        let Some(fragments) = pending.waiting_for_metadata.get(crunch).cloned() else { return };

        let record = ExportedMatch {
            crunch: crunch.to_string(),
            handle_presentation: metadata.handle_presentation.clone(),
            handle_presentation_url: metadata.handle_presentation_url.clone(),
            mime: metadata.mime.clone(),
            fragments,
        };
        if let Err(e) = self.sink.send(&record) {
            tracing::error!(error = %e, crunch, "failed to export match record");
            return;
        }
        pending.exported.insert(key);
        pending.waiting_for_match.remove(crunch);
        pending.waiting_for_metadata.remove(crunch);
    }

    fn record_match(&self, crunch: String, scan_tag: scan_messages::ScanTag, fragments: Vec<serde_json::Value>) {
        {
            let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
            pending.waiting_for_metadata.insert(crunch.clone(), fragments);
        }
        self.export_if_complete(&crunch, &scan_tag);
    }

    fn record_metadata(&self, metadata: Metadata) {
        let crunch = metadata.crunch.clone();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
            pending.waiting_for_match.insert(crunch.clone(), metadata.clone());
        }
        self.export_if_complete(&crunch, &metadata.scan_tag);
    }
}

pub async fn run(bus: ScanBus, exporter: std::sync::Arc<Exporter>) {
    loop {
        tokio::select! {
            msg = bus.matches.recv() => {
                let Some(msg) = msg else { break };
                if msg.is_positive() {
                    if let scan_messages::MatchOutcome::Positive { fragments } = msg.outcome {
                        exporter.record_match(msg.handle.crunch(true), msg.scan_tag, fragments);
                    }
                }
            }
            metadata = bus.metadata.recv() => {
                let Some(metadata) = metadata else { break };
                exporter.record_metadata(metadata);
            }
            problem = bus.problems.recv() => {
                let Some(problem) = problem else { break };
                tracing::warn!(problem = ?problem.problem, extra = ?problem.extra, "pipeline problem");
            }
            status = bus.status.recv() => {
                let Some(status): Option<StatusMessage> = status else { break };
                exporter.status.record(&status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_api::{FileSource, Handle, Source};
    use scan_messages::{ScanTag, Scanner};

    struct CollectingSink(Mutex<Vec<ExportedMatch>>);
    impl ExportSink for CollectingSink {
        fn send(&self, record: &ExportedMatch) -> Result<(), std::io::Error> {
            self.0.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn tag() -> ScanTag {
        ScanTag { scanner: Scanner { pk: 1, name: "t".into() }, time: chrono::Utc::now(), user: None, organisation: None }
    }

    #[test]
    fn exports_once_both_match_and_metadata_have_arrived() {
        let sink = std::sync::Arc::new(CollectingSink(Mutex::new(vec![])));
        let exporter = Exporter::new(Box::new(DelegatingSink(sink.clone())), std::sync::Arc::new(ScanStatusAggregator::new()));

        let handle = Handle::new(Source::File(FileSource { path: "/tmp".into() }), "a.txt");
        let crunch = handle.crunch(true);
        let scan_tag = tag();

        exporter.record_match(crunch.clone(), scan_tag.clone(), vec![]);
        assert!(sink.0.lock().unwrap().is_empty(), "must wait for metadata");

        exporter.record_metadata(Metadata {
            scan_tag: scan_tag.clone(),
            handle_presentation: handle.presentation(),
            handle_presentation_url: None,
            crunch: crunch.clone(),
            mime: Some("text/plain".into()),
            last_modified: None,
            owner: None,
        });
        assert_eq!(sink.0.lock().unwrap().len(), 1);

        // a redelivered match for the same (crunch, scan_tag.time) must not
        // produce a second export record.
        exporter.record_match(crunch, scan_tag, vec![]);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    struct DelegatingSink(std::sync::Arc<CollectingSink>);
    impl ExportSink for DelegatingSink {
        fn send(&self, record: &ExportedMatch) -> Result<(), std::io::Error> {
            self.0.send(record)
        }
    }
}
