mod derived;
mod dispatch;
mod handles;
mod manager;
mod resource;

pub use dispatch::from_handle;
pub use handles::handles;
pub use manager::{follow, SourceManager};
pub use resource::{BytesResourceImpl, DataResourceImpl, FileResourceImpl, StubResourceImpl, TextResourceImpl};

#[cfg(test)]
mod tests {
    use super::*;
    use scan_api::{FileSource, Handle, Manager, Resource, Source};
    use std::io::Write;

    fn write_file(dir: &std::path::Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::File::create(path).unwrap().write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn file_source_lists_and_reads_a_single_file() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", "Vores hemmelige adgangskode er hunter2");

        let source = Source::File(FileSource { path: dir.path().to_string_lossy().into_owned() });
        let mut manager = SourceManager::new();
        let found = handles(&source, &mut manager).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].relative_path, "a.txt");
        assert_eq!(found[0].presentation(), "a.txt");

        let resource = follow(&found[0], &mut manager).unwrap();
        let mut text = String::new();
        std::io::Read::read_to_string(&mut resource.make_stream().unwrap(), &mut text).unwrap();
        assert_eq!(text, "Vores hemmelige adgangskode er hunter2");

        manager.close();
    }

    #[test]
    fn zip_member_handle_presentation_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("a.zip");
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer.start_file("b.txt", zip::write::FileOptions::default()).unwrap();
        writer.write_all(b"2205995008").unwrap();
        writer.finish().unwrap();

        let source = Source::File(FileSource { path: dir.path().to_string_lossy().into_owned() });
        let mut manager = SourceManager::new();
        let top = handles(&source, &mut manager).unwrap();
        let zip_handle = top.iter().find(|h| h.relative_path == "a.zip").unwrap();

        let derived = from_handle(zip_handle).expect("a.zip should derive a zip source");
        assert_eq!(derived.type_label(), "zip");

        let members = handles(&derived, &mut manager).unwrap();
        assert_eq!(members.len(), 1);
        let member = &members[0];
        assert_eq!(member.presentation(), "a.zip/b.txt");

        let resource = follow(member, &mut manager).unwrap();
        let mut text = String::new();
        std::io::Read::read_to_string(&mut resource.make_stream().unwrap(), &mut text).unwrap();
        assert_eq!(text, "2205995008");

        manager.close();
    }
}
