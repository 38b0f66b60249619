//! The five pipeline stages (§4.H): Explorer, Processor, Matcher, Tagger,
//! Exporter. Each stage is a free-standing async loop over one or more
//! `Topic`s; `bootstrap` spawns `N` worker tasks per stage per
//! `ScanConfig`'s `*_workers` fields.

pub mod explorer;
pub mod exporter;
pub mod matcher;
pub mod processor;
pub mod status;
pub mod tagger;

pub use exporter::{ExportSink, Exporter, ExportedMatch, FileSink, StdoutSink};
pub use status::{JobStatus, ScanStatusAggregator};
