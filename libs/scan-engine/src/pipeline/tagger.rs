//! The Tagger (§4.H): resolves durable metadata for a positively-matched
//! handle. Opens its own `SourceManager`, separate from the Matcher's and
//! Processor's, since metadata (owner, last-modified, mime) is looked up
//! independently of whatever conversion the match was decided on.

use scan_messages::{Metadata, MetadataRequest, Problem};
use scan_model::SourceManager;

use crate::bus::ScanBus;

pub async fn run(bus: ScanBus) {
    loop {
        let Some(request) = bus.metadata_requests.recv().await else { break };
        tag_one(&bus, request).await;
    }
}

async fn tag_one(bus: &ScanBus, request: MetadataRequest) {
    let mut manager = SourceManager::new();
    let resolved = scan_model::follow(&request.handle, &mut manager).and_then(|resource| {
        let mime = resource.compute_type().ok();
        let last_modified = resource.last_modified().ok().flatten();
        Ok((mime, last_modified))
    });
    let _ = manager.close();

    match resolved {
        Ok((mime, last_modified)) => {
            let metadata = Metadata {
                scan_tag: request.scan_tag,
                handle_presentation: request.handle.presentation(),
                handle_presentation_url: request.handle.presentation_url(),
                crunch: request.handle.crunch(true),
                mime,
                last_modified,
                owner: None,
            };
            let _ = bus.metadata.publish(metadata).await;
        }
        Err(e) => {
            let problem = Problem::from_error(
                Some(request.scan_tag),
                request.handle.censor().to_json_object(),
                &e,
            );
            let _ = bus.problems.publish(problem).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_api::{FileSource, Handle, Source};
    use scan_messages::{ScanTag, Scanner};
    use std::io::Write;

    fn tag() -> ScanTag {
        ScanTag { scanner: Scanner { pk: 1, name: "t".into() }, time: chrono::Utc::now(), user: None, organisation: None }
    }

    #[tokio::test]
    async fn resolves_metadata_for_a_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::File::create(dir.path().join("a.txt")).unwrap().write_all(b"hi").unwrap();

        let bus = ScanBus::new(8);
        let source = Source::File(FileSource { path: dir.path().to_string_lossy().into_owned() });
        let handle = Handle::new(source, "a.txt");
        tag_one(&bus, MetadataRequest { scan_tag: tag(), handle: handle.clone() }).await;

        let metadata = bus.metadata.recv().await.unwrap();
        assert_eq!(metadata.handle_presentation, "a.txt");
        assert_eq!(metadata.crunch, handle.crunch(true));
    }
}
