mod html;
mod mbox;
mod tar_archive;
mod zip_archive;

use scan_api::{CoreError, DerivedSource, Handle, Resource, Source};

use crate::manager::SourceManager;

/// Enumerates the member handles of a derived source (§4.C: "members that
/// are themselves containers are not recursed here"). Dispatches on the
/// derived-source kind; each factory is free to materialise whatever local
/// state it needs via `manager.ensure_local_path`.
pub fn handles(source: &DerivedSource, manager: &mut SourceManager) -> Result<Vec<Handle>, CoreError> {
    match source {
        DerivedSource::Zip { .. } => zip_archive::handles(source, manager),
        DerivedSource::Tar { .. } => tar_archive::handles(source, manager),
        DerivedSource::Mbox { .. } => mbox::handles(source, manager),
        DerivedSource::HtmlLinks { .. } => html::handles(source, manager),
    }
}

pub(crate) fn follow_derived(
    handle: &Handle,
    manager: &mut SourceManager,
) -> Result<Box<dyn Resource>, CoreError> {
    let Source::Derived(derived) = &handle.source else {
        unreachable!("follow_derived called with a non-derived handle");
    };
    match derived {
        DerivedSource::Zip { .. } => zip_archive::follow(handle, manager),
        DerivedSource::Tar { .. } => tar_archive::follow(handle, manager),
        DerivedSource::Mbox { .. } => mbox::follow(handle, manager),
        DerivedSource::HtmlLinks { .. } => html::follow(handle, manager),
    }
}
