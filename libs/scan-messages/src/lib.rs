//! JSON envelope types for the six message families that cross queue
//! boundaries (§4.I, §6): scan-spec, conversion, match, metadata, problem,
//! status. Every envelope carries a `type` discriminator plus version-stable
//! keys, matching `explorer.py`'s literal message dict shapes.

use chrono::{DateTime, Utc};
use scan_api::{Handle, Rule, Source};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of a scan run, joining matches across stages (§6 GLOSSARY
/// "Scan tag").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scanner {
    pub pk: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanTag {
    pub scanner: Scanner,
    pub time: DateTime<Utc>,
    pub user: Option<String>,
    pub organisation: Option<String>,
}

impl ScanTag {
    /// Idempotency key used by every handler (§4.H "Ordering & at-least-once":
    /// every handler is idempotent on `(handle.crunch, scan_tag.time)`).
    pub fn idempotency_time(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Progress accumulated against one handle as `split()` peels off leaves:
/// the rule residue still to evaluate, and fragments matched so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub rule: Value,
    #[serde(default)]
    pub matches: Vec<Value>,
}

/// `{ scan_tag, source, rule, configuration, filter_rule?, progress? }` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSpec {
    pub scan_tag: ScanTag,
    pub source: Source,
    pub rule: Value,
    #[serde(default)]
    pub configuration: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_rule: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
}

impl ScanSpec {
    pub fn new(scan_tag: ScanTag, source: Source, rule: &Rule) -> Self {
        Self {
            scan_tag,
            source,
            rule: rule.to_json_object(),
            configuration: Value::Object(Default::default()),
            filter_rule: None,
            progress: None,
        }
    }

    /// A derived scan-spec for a child source discovered by the explorer
    /// (§4.H Explorer step ii), carrying the same rule and a fresh progress.
    pub fn child(&self, source: Source) -> Self {
        Self {
            scan_tag: self.scan_tag.clone(),
            source,
            rule: self.rule.clone(),
            configuration: self.configuration.clone(),
            filter_rule: self.filter_rule.clone(),
            progress: None,
        }
    }
}

/// `{ scan_spec, handle, progress }`: one handle waiting for its next
/// `OutputType` to be produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub scan_tag: ScanTag,
    pub source: Source,
    pub handle: Handle,
    pub rule: Value,
    pub configuration: Value,
    pub progress: Progress,
}

/// Wire form of `scan_api::ConversionValue` (§3 `OutputType`): the
/// conversion value itself isn't `Serialize` since `scan-api` has no reason
/// to depend on `serde_json` for an in-process value type, so the Processor
/// converts into this shape before handing a conversion off to the Matcher
/// across a queue boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum ConversionValueWire {
    Text { text: String },
    Links { links: Vec<String> },
    ImageDimensions { width: u32, height: u32 },
    LastModified { timestamp: DateTime<Utc> },
    Mrz { text: String },
    AlwaysTrue,
    NoConversions,
}

impl From<scan_api::ConversionValue> for ConversionValueWire {
    fn from(value: scan_api::ConversionValue) -> Self {
        match value {
            scan_api::ConversionValue::Text(text) => ConversionValueWire::Text { text },
            scan_api::ConversionValue::Links(links) => ConversionValueWire::Links { links },
            scan_api::ConversionValue::ImageDimensions { width, height } => {
                ConversionValueWire::ImageDimensions { width, height }
            }
            scan_api::ConversionValue::LastModified(timestamp) => {
                ConversionValueWire::LastModified { timestamp }
            }
            scan_api::ConversionValue::Mrz(text) => ConversionValueWire::Mrz { text },
            scan_api::ConversionValue::AlwaysTrue => ConversionValueWire::AlwaysTrue,
            scan_api::ConversionValue::NoConversions => ConversionValueWire::NoConversions,
        }
    }
}

impl From<ConversionValueWire> for scan_api::ConversionValue {
    fn from(value: ConversionValueWire) -> Self {
        match value {
            ConversionValueWire::Text { text } => scan_api::ConversionValue::Text(text),
            ConversionValueWire::Links { links } => scan_api::ConversionValue::Links(links),
            ConversionValueWire::ImageDimensions { width, height } => {
                scan_api::ConversionValue::ImageDimensions { width, height }
            }
            ConversionValueWire::LastModified { timestamp } => {
                scan_api::ConversionValue::LastModified(timestamp)
            }
            ConversionValueWire::Mrz { text } => scan_api::ConversionValue::Mrz(text),
            ConversionValueWire::AlwaysTrue => scan_api::ConversionValue::AlwaysTrue,
            ConversionValueWire::NoConversions => scan_api::ConversionValue::NoConversions,
        }
    }
}

/// A conversion the Processor has produced, awaiting the Matcher's next
/// `split()` step (the "conversions → Processor → matches" arrow in §4.H's
/// wiring diagram).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionReady {
    pub scan_tag: ScanTag,
    pub source: Source,
    pub handle: Handle,
    pub progress: Progress,
    pub configuration: Value,
    pub value: ConversionValueWire,
}

/// A terminal or intermediate outcome of the `split()` evaluation loop for
/// one handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Positive { fragments: Vec<Value> },
    Negative { fragments: Vec<Value> },
    /// Evaluation isn't done; another conversion request is needed for the
    /// residual rule.
    Continue { residue: Value, fragments: Vec<Value> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchMessage {
    pub scan_tag: ScanTag,
    pub handle: Handle,
    pub outcome: MatchOutcome,
}

impl MatchMessage {
    pub fn is_terminal(&self) -> bool {
        !matches!(self.outcome, MatchOutcome::Continue { .. })
    }

    pub fn is_positive(&self) -> bool {
        matches!(self.outcome, MatchOutcome::Positive { .. })
    }
}

/// Emitted by the Matcher for positive terminal matches; consumed by the
/// Tagger to assemble durable metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRequest {
    pub scan_tag: ScanTag,
    pub handle: Handle,
}

/// Durable metadata the Tagger attaches to a positive match: owner,
/// last-modified, mime, presentation URL, crunch (§4.H Tagger).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub scan_tag: ScanTag,
    pub handle_presentation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle_presentation_url: Option<String>,
    pub crunch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// `{ where, problem, extra }` (§6, §7): a failure that did not crash the
/// stage that encountered it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub scan_tag: Option<ScanTag>,
    #[serde(rename = "where")]
    pub location: Value,
    pub problem: ProblemKind,
    #[serde(default)]
    pub extra: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    Unavailable,
    Malformed,
    ConversionFailure,
    RuleBug,
    Fatal,
}

impl From<scan_api::ErrorKind> for ProblemKind {
    fn from(kind: scan_api::ErrorKind) -> Self {
        match kind {
            scan_api::ErrorKind::Unavailable => ProblemKind::Unavailable,
            scan_api::ErrorKind::Malformed => ProblemKind::Malformed,
            scan_api::ErrorKind::ConversionFailure => ProblemKind::ConversionFailure,
            scan_api::ErrorKind::RuleBug => ProblemKind::RuleBug,
            scan_api::ErrorKind::Fatal => ProblemKind::Fatal,
        }
    }
}

impl Problem {
    pub fn from_error(scan_tag: Option<ScanTag>, location: Value, error: &scan_api::CoreError) -> Self {
        Self { scan_tag, location, problem: error.kind.into(), extra: error.extra() }
    }
}

/// `{ scan_tag, message, status_is_error, total_objects?, new_sources?,
/// object_size?, object_type? }` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessage {
    pub scan_tag: ScanTag,
    pub message: String,
    pub status_is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_objects: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_sources: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
}

/// Default queue names (§6).
pub mod queues {
    pub const SCAN_SPECS: &str = "os2ds_scan_specs";
    pub const CONVERSIONS: &str = "os2ds_conversions";
    pub const MATCHES: &str = "os2ds_matches";
    pub const METADATA: &str = "os2ds_metadata";
    pub const PROBLEMS: &str = "os2ds_problems";
    pub const STATUS: &str = "os2ds_status";
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_api::{FileSource, Rule};
    use std::sync::Arc;

    fn tag() -> ScanTag {
        ScanTag {
            scanner: Scanner { pk: 1, name: "test-scanner".into() },
            time: Utc::now(),
            user: Some("alice".into()),
            organisation: Some("acme".into()),
        }
    }

    #[derive(Debug)]
    struct Stub;
    impl scan_api::SimpleRule for Stub {
        fn operates_on(&self) -> scan_api::OutputType {
            scan_api::OutputType::AlwaysTrue
        }
        fn type_label(&self) -> &'static str {
            "test-stub"
        }
        fn match_content(&self, _: &scan_api::ConversionValue) -> Result<Vec<scan_api::MatchFragment>, scan_api::CoreError> {
            Ok(vec![])
        }
        fn to_json_object(&self) -> Value {
            serde_json::json!({"type": "test-stub"})
        }
    }

    #[test]
    fn scan_spec_round_trips_through_json() {
        let rule = Rule::Leaf(Arc::new(Stub));
        let spec = ScanSpec::new(tag(), Source::File(FileSource { path: "/tmp/t1".into() }), &rule);
        let json = serde_json::to_value(&spec).unwrap();
        let round: ScanSpec = serde_json::from_value(json).unwrap();
        assert_eq!(round.scan_tag, spec.scan_tag);
        assert_eq!(round.source, spec.source);
    }

    #[test]
    fn problem_carries_error_kind_and_extra() {
        let err = scan_api::CoreError::unavailable("disk unreachable");
        let p = Problem::from_error(Some(tag()), serde_json::json!({"path": "/tmp"}), &err);
        assert_eq!(p.problem, ProblemKind::Unavailable);
        assert_eq!(p.extra, vec!["disk unreachable".to_string()]);
    }

    #[test]
    fn match_message_continue_is_not_terminal() {
        let msg = MatchMessage {
            scan_tag: tag(),
            handle: Handle::new(Source::File(FileSource { path: "/tmp/t1".into() }), "a.txt"),
            outcome: MatchOutcome::Continue { residue: Value::Null, fragments: vec![] },
        };
        assert!(!msg.is_terminal());
    }
}
