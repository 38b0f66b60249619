//! End-to-end pipeline scenarios, run through a bootstrapped `Engine`
//! rather than any one stage in isolation.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use scan_api::{FileSource, Handle, Rule, RuleMeta, Source};
use scan_engine::{Engine, ScanConfig};
use scan_messages::{
    ConversionRequest, Metadata, MatchMessage, MatchOutcome, Progress, ScanSpec, ScanTag, Scanner,
};

fn tag() -> ScanTag {
    ScanTag { scanner: Scanner { pk: 1, name: "it".into() }, time: chrono::Utc::now(), user: None, organisation: None }
}

async fn recv_timeout<T>(topic: &scan_engine::Topic<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), topic.recv())
        .await
        .expect("message did not arrive in time")
        .expect("topic closed")
}

/// Property 10: one matching file in a plain directory source produces
/// exactly one terminal positive match, scan_tag and presentation intact.
#[tokio::test]
async fn regex_match_on_a_plain_file_is_a_terminal_positive() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::File::create(dir.path().join("a.txt"))
        .unwrap()
        .write_all(b"Vores hemmelige adgangskode er hunter2")
        .unwrap();

    let engine = Engine::bootstrap(ScanConfig::default()).await.unwrap();

    let leaf = scan_rules::RegexRule::new("Vores hemmelige adgangskode er").unwrap();
    let rule = Rule::Leaf(Arc::new(leaf));
    let source = Source::File(FileSource { path: dir.path().to_string_lossy().into_owned() });
    let scan_tag = tag();
    let spec = ScanSpec::new(scan_tag.clone(), source, &rule);

    engine.bus().scan_specs.publish(spec).await.unwrap();

    let msg = recv_timeout(&engine.bus().matches).await;
    assert!(msg.is_terminal());
    assert!(msg.is_positive());
    assert_eq!(msg.scan_tag, scan_tag);
    assert_eq!(msg.handle.presentation(), "a.txt");

    engine.shutdown().await;
}

/// Property 11: a zip member is scanned through a derived scan-spec the
/// explorer emits on its own, and the positive match's presentation is the
/// full `a.zip/b.txt` path.
#[tokio::test]
async fn cpr_match_inside_a_zip_reports_the_full_nested_presentation() {
    let dir = tempfile::tempdir().unwrap();
    let zip_path = dir.path().join("a.zip");
    let file = std::fs::File::create(&zip_path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    writer.start_file("b.txt", zip::write::FileOptions::default()).unwrap();
    writer.write_all(b"2205995008").unwrap();
    writer.finish().unwrap();

    let engine = Engine::bootstrap(ScanConfig::default()).await.unwrap();

    let rule = Rule::Leaf(Arc::new(scan_rules::CprRule::default()));
    let source = Source::File(FileSource { path: dir.path().to_string_lossy().into_owned() });
    let spec = ScanSpec::new(tag(), source, &rule);
    engine.bus().scan_specs.publish(spec).await.unwrap();

    let msg = recv_timeout(&engine.bus().matches).await;
    assert!(msg.is_positive());
    assert_eq!(msg.handle.presentation(), "a.zip/b.txt");

    engine.shutdown().await;
}

/// Property 12: an `And` whose second leaf can never hold (a last-modified
/// threshold one hour in the future, which no freshly-written file's
/// timestamp can exceed) settles as one terminal negative, after exactly
/// one extra conversion for the second leaf.
#[tokio::test]
async fn and_with_a_failing_last_modified_leaf_is_a_terminal_negative() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::File::create(dir.path().join("a.txt"))
        .unwrap()
        .write_all(b"Vores hemmelige adgangskode er hunter2")
        .unwrap();

    let engine = Engine::bootstrap(ScanConfig::default()).await.unwrap();

    let future = chrono::Utc::now() + chrono::Duration::hours(1);
    let rule = Rule::And(
        vec![
            Rule::Leaf(Arc::new(scan_rules::RegexRule::new("Vores").unwrap())),
            Rule::Leaf(Arc::new(scan_rules::LastModifiedRule::new(future))),
        ],
        RuleMeta::default(),
    );
    let source = Source::File(FileSource { path: dir.path().to_string_lossy().into_owned() });
    let spec = ScanSpec::new(tag(), source, &rule);
    engine.bus().scan_specs.publish(spec).await.unwrap();

    let first = recv_timeout(&engine.bus().matches).await;
    assert!(!first.is_terminal(), "the regex leaf matching should ask for the second leaf's conversion");

    let second = recv_timeout(&engine.bus().matches).await;
    assert!(second.is_terminal());
    assert!(!second.is_positive());

    engine.shutdown().await;
}

/// Property 13: a handle that can't be opened reports one problem and no
/// match messages at all, having exhausted the retry policy's retries.
#[tokio::test(start_paused = true)]
async fn unopenable_handle_reports_a_problem_and_no_match() {
    let engine = Engine::bootstrap(ScanConfig::default()).await.unwrap();

    let leaf = scan_rules::RegexRule::new(".*").unwrap();
    let rule = Rule::Leaf(Arc::new(leaf));
    let source = Source::File(FileSource { path: "/nonexistent-for-pipeline-test".into() });
    let handle = Handle::new(source.clone(), "missing.txt");
    let request = ConversionRequest {
        scan_tag: tag(),
        source,
        handle,
        rule: rule.to_json_object(),
        configuration: serde_json::Value::Null,
        progress: Progress { rule: rule.to_json_object(), matches: vec![] },
    };
    engine.bus().conversions.publish(request).await.unwrap();

    let problem = recv_timeout(&engine.bus().problems).await;
    assert_eq!(problem.problem, scan_messages::ProblemKind::Unavailable);

    let no_match = tokio::time::timeout(Duration::from_millis(50), engine.bus().matches.recv()).await;
    assert!(no_match.is_err(), "no match message should ever be published for an unopenable handle");

    engine.shutdown().await;
}

/// Property 14: two independent deliveries of the same terminal outcome
/// (simulating at-least-once redelivery) produce exactly one exported
/// record, keyed on `(handle.crunch, scan_tag.time)`.
#[tokio::test]
async fn redelivered_match_is_exported_exactly_once() {
    let sink_path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
    let sink_path = sink_path.to_string_lossy().into_owned();

    let config = ScanConfig { export_sink: Some(sink_path.clone()), ..ScanConfig::default() };
    let engine = Engine::bootstrap(config).await.unwrap();

    let source = Source::File(FileSource { path: "/tmp".into() });
    let handle = Handle::new(source, "a.txt");
    let scan_tag = tag();

    for _ in 0..2 {
        engine
            .bus()
            .matches
            .publish(MatchMessage {
                scan_tag: scan_tag.clone(),
                handle: handle.clone(),
                outcome: MatchOutcome::Positive { fragments: vec![] },
            })
            .await
            .unwrap();
        engine
            .bus()
            .metadata
            .publish(Metadata {
                scan_tag: scan_tag.clone(),
                handle_presentation: handle.presentation(),
                handle_presentation_url: None,
                crunch: handle.crunch(true),
                mime: Some("text/plain".into()),
                last_modified: None,
                owner: None,
            })
            .await
            .unwrap();
    }

    // give the exporter worker a moment to drain both deliveries before
    // reading back what it wrote.
    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.shutdown().await;

    let written = std::fs::read_to_string(&sink_path).unwrap();
    let lines: Vec<&str> = written.lines().filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 1, "a redelivered match/metadata pair must not export twice");
}
