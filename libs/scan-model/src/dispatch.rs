use scan_api::{DerivedSource, Handle, Source};

/// Mime-indexed factory table turning a `Handle` into a new `Source`
/// (§4.A, §9: "build-time lookup table"). Glob matching is approximated by
/// checking the handle's name extension, since the cheap (non-sniffing)
/// path this workspace always takes only has the name to go on; a
/// `SourceManager`-provided content-sniffing path would refine this by
/// reading the first bytes instead, but no concrete source in this
/// workspace needs that yet.
pub fn from_handle(handle: &Handle) -> Option<Source> {
    let name = handle.relative_path.to_ascii_lowercase();
    let parent = Box::new(handle.clone());
    if name.ends_with(".zip") {
        Some(Source::Derived(DerivedSource::Zip { parent }))
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(Source::Derived(DerivedSource::Tar { parent, gzip: true }))
    } else if name.ends_with(".tar") {
        Some(Source::Derived(DerivedSource::Tar { parent, gzip: false }))
    } else if name.ends_with(".mbox") {
        Some(Source::Derived(DerivedSource::Mbox { parent }))
    } else if name.ends_with(".html") || name.ends_with(".htm") {
        Some(Source::Derived(DerivedSource::HtmlLinks { parent }))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_api::FileSource;

    #[test]
    fn zip_extension_derives_zip_source() {
        let handle = Handle::new(Source::File(FileSource { path: "/tmp/t2".into() }), "a.zip".into());
        let derived = from_handle(&handle).unwrap();
        assert_eq!(derived.type_label(), "zip");
    }

    #[test]
    fn plain_text_has_no_derivation() {
        let handle = Handle::new(Source::File(FileSource { path: "/tmp/t1".into() }), "a.txt".into());
        assert!(from_handle(&handle).is_none());
    }
}
