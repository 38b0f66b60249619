//! The Processor (§4.H): turns a `ConversionRequest` into the next
//! `ConversionValue` its rule residue needs, retrying transient resource
//! failures, and hands the computed value to the Matcher.

use scan_api::{CoreError, Manager};
use scan_messages::{ConversionReady, ConversionRequest, Problem};
use scan_model::SourceManager;

use crate::bus::ScanBus;

pub async fn run(bus: ScanBus) {
    loop {
        let Some(request) = bus.conversions.recv().await else { break };
        process_one(&bus, request).await;
    }
}

async fn process_one(bus: &ScanBus, request: ConversionRequest) {
    let rule = match scan_rules::rule_from_json(&request.progress.rule) {
        Ok(r) => r,
        Err(e) => {
            report_problem(bus, &request, &e).await;
            return;
        }
    };

    let output = rule.operates_on();
    let retrier = scan_retry::web_retrier();
    let handle = request.handle.clone();

    let result = retrier
        .run_async(scan_retry::is_transient, || {
            let handle = handle.clone();
            async move {
                let mut manager = SourceManager::new();
                let resource = scan_model::follow(&handle, &mut manager)?;
                let value = scan_conversions::convert(output, resource.as_ref())?;
                let _ = manager.close();
                Ok::<_, CoreError>(value)
            }
        })
        .await;

    match result {
        Ok(value) => {
            let ready = ConversionReady {
                scan_tag: request.scan_tag,
                source: request.source,
                handle: request.handle,
                progress: request.progress,
                configuration: request.configuration,
                value: value.into(),
            };
            let _ = bus.pending_matches.publish(ready).await;
        }
        Err(e) => report_problem(bus, &request, &e).await,
    }
}

async fn report_problem(bus: &ScanBus, request: &ConversionRequest, error: &CoreError) {
    let problem = Problem::from_error(
        Some(request.scan_tag.clone()),
        request.handle.censor().to_json_object(),
        error,
    );
    let _ = bus.problems.publish(problem).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_api::{FileSource, RuleMeta, Source};
    use scan_messages::{Progress, ScanTag, Scanner};
    use std::io::Write;
    use std::sync::Arc;

    fn tag() -> ScanTag {
        ScanTag { scanner: Scanner { pk: 1, name: "t".into() }, time: chrono::Utc::now(), user: None, organisation: None }
    }

    #[tokio::test]
    async fn reads_text_and_publishes_a_ready_conversion() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::File::create(dir.path().join("a.txt")).unwrap().write_all(b"hello").unwrap();

        let bus = ScanBus::new(8);
        let leaf = scan_rules::RegexRule::new(".*".to_string()).unwrap();
        let rule = scan_api::Rule::And(vec![scan_api::Rule::Leaf(Arc::new(leaf))], RuleMeta::default());
        let source = Source::File(FileSource { path: dir.path().to_string_lossy().into_owned() });
        let handle = scan_api::Handle::new(source.clone(), "a.txt");
        let request = ConversionRequest {
            scan_tag: tag(),
            source,
            handle,
            rule: rule.to_json_object(),
            configuration: serde_json::Value::Null,
            progress: Progress { rule: rule.to_json_object(), matches: vec![] },
        };

        process_one(&bus, request).await;

        let ready = bus.pending_matches.recv().await.unwrap();
        match ready.value {
            scan_messages::ConversionValueWire::Text { text } => assert_eq!(text, "hello"),
            other => panic!("expected text conversion, got {other:?}"),
        }
    }

    // Time-paused: the default retry policy's exponential backoff would
    // otherwise burn minutes of real wall-clock sleeping between attempts.
    #[tokio::test(start_paused = true)]
    async fn unreadable_resource_reports_a_problem_after_exhausting_retries() {
        let bus = ScanBus::new(8);
        let leaf = scan_rules::RegexRule::new(".*".to_string()).unwrap();
        let rule = scan_api::Rule::Leaf(Arc::new(leaf));
        let source = Source::File(FileSource { path: "/nonexistent-for-test".into() });
        let handle = scan_api::Handle::new(source.clone(), "missing.txt");
        let request = ConversionRequest {
            scan_tag: tag(),
            source,
            handle,
            rule: rule.to_json_object(),
            configuration: serde_json::Value::Null,
            progress: Progress { rule: rule.to_json_object(), matches: vec![] },
        };

        process_one(&bus, request).await;

        let problem = bus.problems.recv().await.unwrap();
        assert_eq!(problem.problem, scan_messages::ProblemKind::Unavailable);
    }
}
