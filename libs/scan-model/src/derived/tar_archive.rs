use std::io::Read;

use flate2::read::GzDecoder;
use scan_api::{CoreError, DerivedSource, Handle, Resource, Source};

use crate::manager::SourceManager;
use crate::resource::BytesResourceImpl;

fn open_archive(path: &std::path::Path, gzip: bool) -> Result<tar::Archive<Box<dyn Read>>, CoreError> {
    let file = std::fs::File::open(path)?;
    let reader: Box<dyn Read> =
        if gzip { Box::new(GzDecoder::new(file)) } else { Box::new(file) };
    Ok(tar::Archive::new(reader))
}

/// Lists member paths of a tar (optionally gzip-compressed) source.
/// `tar::Archive` is a forward-only reader, so both listing and later
/// per-member reads reopen the archive from its materialised local copy.
pub fn handles(source: &DerivedSource, manager: &mut SourceManager) -> Result<Vec<Handle>, CoreError> {
    let DerivedSource::Tar { gzip, .. } = source else { unreachable!() };
    let src = Source::Derived(source.clone());
    let path = manager
        .ensure_local_path(&src)?
        .ok_or_else(|| CoreError::fatal("tar source has no local path after cookie creation"))?;

    let mut archive = open_archive(&path, *gzip)?;
    let mut out = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path()?.to_string_lossy().into_owned();
        out.push(Handle::new(src.clone(), name));
    }
    Ok(out)
}

pub fn follow(handle: &Handle, manager: &mut SourceManager) -> Result<Box<dyn Resource>, CoreError> {
    let Source::Derived(DerivedSource::Tar { gzip, .. }) = &handle.source else {
        unreachable!()
    };
    let path = manager
        .ensure_local_path(&handle.source)?
        .ok_or_else(|| CoreError::fatal("tar source has no local path after cookie creation"))?;

    let mut archive = open_archive(&path, *gzip)?;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        if name == handle.relative_path {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            return Ok(Box::new(BytesResourceImpl { handle: handle.clone(), bytes }));
        }
    }
    Err(CoreError::unavailable(format!("tar entry {} not found", handle.relative_path)))
}
