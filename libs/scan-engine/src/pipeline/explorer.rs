//! The Explorer (§4.H): enumerates handles of a scan-spec's source,
//! descending into derived sources before any conversion is requested, and
//! fans the rest out as conversion requests.

use scan_api::{CoreError, Manager};
use scan_messages::{ConversionRequest, Problem, Progress, ScanSpec, StatusMessage};
use scan_model::SourceManager;

use crate::bus::ScanBus;

pub async fn run(bus: ScanBus) {
    loop {
        let Some(spec) = bus.scan_specs.recv().await else { break };
        explore_one(&bus, spec).await;
    }
}

async fn explore_one(bus: &ScanBus, spec: ScanSpec) {
    let mut manager = SourceManager::new();
    let handles = match scan_model::handles(&spec.source, &mut manager) {
        Ok(h) => h,
        Err(e) => {
            report_problem(bus, &spec, &e).await;
            let _ = bus
                .status
                .publish(StatusMessage {
                    scan_tag: spec.scan_tag.clone(),
                    message: format!("failed to open source: {e}"),
                    status_is_error: true,
                    total_objects: Some(0),
                    new_sources: Some(0),
                    object_size: None,
                    object_type: None,
                })
                .await;
            return;
        }
    };

    let mut total_objects = 0u64;
    let mut new_sources = 0u64;
    let mut status_is_error = false;

    for handle in handles {
        total_objects += 1;
        // Descend into derived sources here rather than deferring to the
        // Processor (§4.H: "descending into derived sources where the rule
        // cannot yet be decided") — every container-shaped handle
        // unconditionally yields an independent child scan-spec, since a
        // container's members can always be scanned without the rest of
        // the container (§4.H Explorer step ii).
        if let Some(derived) = scan_model::from_handle(&handle) {
            new_sources += 1;
            let child = spec.child(derived);
            if bus.scan_specs.publish(child).await.is_err() {
                status_is_error = true;
            }
            continue;
        }

        let progress = spec.progress.clone().unwrap_or_else(|| Progress { rule: spec.rule.clone(), matches: vec![] });
        let request = ConversionRequest {
            scan_tag: spec.scan_tag.clone(),
            source: spec.source.clone(),
            handle,
            rule: spec.rule.clone(),
            configuration: spec.configuration.clone(),
            progress,
        };
        if bus.conversions.publish(request).await.is_err() {
            status_is_error = true;
        }
    }

    let errors = manager.close();
    for e in &errors {
        report_problem(bus, &spec, e).await;
    }
    status_is_error |= !errors.is_empty();

    let _ = bus
        .status
        .publish(StatusMessage {
            scan_tag: spec.scan_tag.clone(),
            message: format!("explored {} ({} objects, {} new sources)", spec.source.type_label(), total_objects, new_sources),
            status_is_error,
            total_objects: Some(total_objects),
            new_sources: Some(new_sources),
            object_size: None,
            object_type: None,
        })
        .await;
}

async fn report_problem(bus: &ScanBus, spec: &ScanSpec, error: &CoreError) {
    let problem = Problem::from_error(
        Some(spec.scan_tag.clone()),
        spec.source.censor().to_json_object(),
        error,
    );
    let _ = bus.problems.publish(problem).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_api::{FileSource, Rule, RuleMeta, Source};
    use scan_messages::{ScanTag, Scanner};
    use std::io::Write;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Stub;
    impl scan_api::SimpleRule for Stub {
        fn operates_on(&self) -> scan_api::OutputType {
            scan_api::OutputType::Text
        }
        fn type_label(&self) -> &'static str {
            "test-stub"
        }
        fn match_content(&self, _: &scan_api::ConversionValue) -> Result<Vec<scan_api::MatchFragment>, CoreError> {
            Ok(vec![])
        }
        fn to_json_object(&self) -> serde_json::Value {
            serde_json::json!({"type": "test-stub"})
        }
    }

    fn tag() -> ScanTag {
        ScanTag { scanner: Scanner { pk: 1, name: "t".into() }, time: chrono::Utc::now(), user: None, organisation: None }
    }

    #[tokio::test]
    async fn zip_member_is_explored_as_one_derived_scan_spec() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("a.zip");
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer.start_file("b.txt", zip::write::FileOptions::default()).unwrap();
        writer.write_all(b"2205995008").unwrap();
        writer.finish().unwrap();

        let bus = ScanBus::new(8);
        let rule = Rule::And(vec![Rule::Leaf(Arc::new(Stub))], RuleMeta::default());
        let source = Source::File(FileSource { path: dir.path().to_string_lossy().into_owned() });
        let spec = ScanSpec::new(tag(), source, &rule);
        bus.scan_specs.publish(spec).await.unwrap();

        explore_one(&bus, bus.scan_specs.recv().await.unwrap()).await;

        // the top-level directory listing has one member (a.zip), which
        // derives, so exactly one derived scan-spec is emitted and no
        // conversion request is emitted for a.zip itself.
        let child = bus.scan_specs.recv().await.unwrap();
        assert_eq!(child.source.type_label(), "zip");

        let status = bus.status.recv().await.unwrap();
        assert_eq!(status.total_objects, Some(1));
        assert_eq!(status.new_sources, Some(1));
    }
}
