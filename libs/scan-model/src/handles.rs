use scan_api::{CoreError, Handle, Source};

use crate::manager::SourceManager;

/// Enumerates the member handles of any source kind (§3 `Source.handles`).
/// `FileSource` walks its directory tree (files only — subdirectories are
/// not emitted as handles of their own, matching the flat relative-path
/// addressing §3 describes); every other leaf kind names exactly the one
/// object its URL points at; derived sources delegate to
/// `derived::handles`.
pub fn handles(source: &Source, manager: &mut SourceManager) -> Result<Vec<Handle>, CoreError> {
    match source {
        Source::File(f) => {
            let root = std::path::Path::new(&f.path);
            if root.is_file() {
                return Ok(vec![Handle::new(source.clone(), String::new())]);
            }
            let mut out = Vec::new();
            walk(root, root, &mut out, source)?;
            out.sort_by(|a: &Handle, b: &Handle| a.relative_path.cmp(&b.relative_path));
            Ok(out)
        }
        Source::Data(_) | Source::Http(_) | Source::Smb(_) | Source::Mail(_) => {
            Ok(vec![Handle::new(source.clone(), String::new())])
        }
        Source::Derived(derived) => crate::derived::handles(derived, manager),
    }
}

fn walk(
    root: &std::path::Path,
    dir: &std::path::Path,
    out: &mut Vec<Handle>,
    source: &Source,
) -> Result<(), CoreError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, out, source)?;
        } else {
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            out.push(Handle::new(source.clone(), relative));
        }
    }
    Ok(())
}
