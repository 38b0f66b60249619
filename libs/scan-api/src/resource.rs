use std::io::Read;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::source::Handle;

/// A transient object that actually talks to storage, obtained by
/// `handle.follow(sm)`. Resources never outlive the `SourceManager` that
/// created them — every method here borrows `&self` for exactly that reason,
/// there's no way to smuggle a stream or path out past the manager's scope.
///
/// The base trait only promises a MIME guess; the `FileResource`-shaped
/// capabilities (`size`, `last_modified`, `make_stream`, `make_path`) default
/// to "not supported" so backends that genuinely can't provide them (a mail
/// message body, say) don't need to fake it.
pub trait Resource: Send {
    fn handle(&self) -> &Handle;

    /// Computes (possibly by content-sniffing) the MIME type used to pick a
    /// converter in `scan-conversions` (§4.D: "longest MIME prefix wins").
    fn compute_type(&self) -> Result<String, CoreError>;

    fn size(&self) -> Result<u64, CoreError> {
        Err(CoreError::conversion_failure("size not supported by this resource"))
    }

    fn last_modified(&self) -> Result<Option<DateTime<Utc>>, CoreError> {
        Ok(None)
    }

    fn mime(&self) -> Result<String, CoreError> {
        self.compute_type()
    }

    /// A scoped byte stream. Any descriptor it opens must be released on
    /// every exit path, including early drop.
    fn make_stream(&self) -> Result<Box<dyn Read + Send>, CoreError> {
        Err(CoreError::conversion_failure("make_stream not supported by this resource"))
    }

    /// A scoped local filesystem path, materialising the resource to disk if
    /// it isn't already file-backed. The returned guard removes any
    /// temporary file it created when dropped (`NamedTemporaryResource`,
    /// §5 "Scoped acquisition").
    fn make_path(&self) -> Result<ScopedPath, CoreError> {
        Err(CoreError::conversion_failure("make_path not supported by this resource"))
    }
}

/// A local path, optionally owning a temporary file that is deleted when
/// this guard is dropped. Mirrors `NamedTemporaryResource` (§5, §9).
pub struct ScopedPath {
    path: PathBuf,
    owned: Option<tempfile::TempPath>,
}

impl ScopedPath {
    pub fn borrowed(path: PathBuf) -> Self {
        Self { path, owned: None }
    }

    pub fn owned(path: tempfile::TempPath) -> Self {
        let p = path.to_path_buf();
        Self { path: p, owned: Some(path) }
    }

    pub fn as_path(&self) -> &std::path::Path {
        &self.path
    }
}
