use scan_api::{CoreError, DerivedSource, Handle, Resource, Source};

use crate::manager::SourceManager;
use crate::resource::BytesResourceImpl;

/// Lists member file names of a zip source (directories are skipped —
/// they carry no content of their own to scan).
pub fn handles(source: &DerivedSource, manager: &mut SourceManager) -> Result<Vec<Handle>, CoreError> {
    let DerivedSource::Zip { .. } = source else { unreachable!() };
    let src = Source::Derived(source.clone());
    let path = manager
        .ensure_local_path(&src)?
        .ok_or_else(|| CoreError::fatal("zip source has no local path after cookie creation"))?;

    let file = std::fs::File::open(&path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| CoreError::conversion_failure(format!("not a valid zip archive: {e}")))?;

    let mut out = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| CoreError::conversion_failure(format!("zip entry {i}: {e}")))?;
        if entry.is_dir() {
            continue;
        }
        out.push(Handle::new(src.clone(), entry.name().to_string()));
    }
    Ok(out)
}

pub fn follow(handle: &Handle, manager: &mut SourceManager) -> Result<Box<dyn Resource>, CoreError> {
    let path = manager
        .ensure_local_path(&handle.source)?
        .ok_or_else(|| CoreError::fatal("zip source has no local path after cookie creation"))?;

    let file = std::fs::File::open(&path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| CoreError::conversion_failure(format!("not a valid zip archive: {e}")))?;
    let mut entry = archive
        .by_name(&handle.relative_path)
        .map_err(|e| CoreError::unavailable(format!("zip entry {}: {e}", handle.relative_path)))?;

    use std::io::Read;
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    drop(entry);

    Ok(Box::new(BytesResourceImpl { handle: handle.clone(), bytes }))
}
