use std::path::PathBuf;

use scan_api::{Cookie, CoreError, Handle, Manager, Resource, Source};
use tracing::warn;

use crate::resource::{DataResourceImpl, FileResourceImpl, StubResourceImpl};

/// A cookie that owns nothing beyond its own existence; teardown is a no-op.
/// Used by every source kind whose resources are either stateless (`data:`)
/// or already backed by a permanent path (`file:`), and by the stub
/// backends (`http`, `smb`, `mail`) that have no live connection to hold
/// open.
struct NoopCookie;

impl Cookie for NoopCookie {
    fn close(self: Box<Self>) -> Result<(), CoreError> {
        Ok(())
    }
}

/// A cookie owning a temporary local file — the materialised copy a derived
/// source's container reader (zip/tar) is opened against. Deleted on drop.
struct TempFileCookie(#[allow(dead_code)] tempfile::TempPath);

impl Cookie for TempFileCookie {
    fn close(self: Box<Self>) -> Result<(), CoreError> {
        Ok(())
    }
}

struct Entry {
    key: String,
    source: Source,
    /// Local path backing this source's cookie, when it has one — the
    /// source file for a `FileSource`, or the materialised copy for a
    /// derived source's container reader. Looked up by the derived-source
    /// factories when they need to open their container cursor.
    local_path: Option<PathBuf>,
    cookie: Box<dyn Cookie>,
}

/// A stack-ordered `Source -> cookie` cache (§4.B). `open` drives a source's
/// cookie into existence on first request and caches it by equality
/// properties; `close` tears every cookie down in reverse acquisition order,
/// guaranteeing a derived source is torn down before the parent its cookie
/// depends on.
#[derive(Default)]
pub struct SourceManager {
    entries: Vec<Entry>,
}

impl SourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures `source`'s cookie exists and returns its local path, if any.
    /// Used internally by the derived-source factories; not part of the
    /// public `Manager` contract because it leaks an implementation detail
    /// (not every source kind has "a path").
    pub fn ensure_local_path(&mut self, source: &Source) -> Result<Option<PathBuf>, CoreError> {
        self.open_entry(source)?;
        Ok(self.find(source).and_then(|e| e.local_path.clone()))
    }

    fn find(&self, source: &Source) -> Option<&Entry> {
        let key = source.cache_key();
        self.entries.iter().find(|e| e.key == key)
    }

    fn open_entry(&mut self, source: &Source) -> Result<(), CoreError> {
        if self.find(source).is_some() {
            return Ok(());
        }
        let (local_path, cookie) = create_cookie(source, self)?;
        self.entries.push(Entry {
            key: source.cache_key(),
            source: source.clone(),
            local_path,
            cookie,
        });
        Ok(())
    }
}

impl Manager for SourceManager {
    fn open(&mut self, source: &Source) -> Result<&dyn Cookie, CoreError> {
        self.open_entry(source)?;
        Ok(self.find(source).expect("just opened").cookie.as_ref())
    }

    fn close(&mut self) -> Vec<CoreError> {
        let mut errors = Vec::new();
        while let Some(entry) = self.entries.pop() {
            if let Err(e) = entry.cookie.close() {
                warn!(source = entry.key, error = %e, "error tearing down source cookie");
                errors.push(e);
            }
        }
        errors
    }

    fn clear(&mut self, subset: &[Source]) -> Vec<CoreError> {
        let keys: Vec<String> = subset.iter().map(Source::cache_key).collect();
        let mut errors = Vec::new();
        let mut i = self.entries.len();
        while i > 0 {
            i -= 1;
            if keys.contains(&self.entries[i].key) {
                let entry = self.entries.remove(i);
                if let Err(e) = entry.cookie.close() {
                    errors.push(e);
                }
            }
        }
        errors
    }
}

/// Dispatches cookie construction by source kind. Derived sources recurse
/// into the manager to materialise their parent handle before building a
/// container cursor over it — this is where a zip/tar source earns its
/// entry in the reverse-teardown stack *after* its parent's.
fn create_cookie(
    source: &Source,
    manager: &mut SourceManager,
) -> Result<(Option<PathBuf>, Box<dyn Cookie>), CoreError> {
    use scan_api::DerivedSource;

    match source {
        Source::File(f) => Ok((Some(PathBuf::from(&f.path)), Box::new(NoopCookie))),
        Source::Data(_) | Source::Http(_) | Source::Smb(_) | Source::Mail(_) => {
            Ok((None, Box::new(NoopCookie)))
        }
        Source::Derived(DerivedSource::Zip { parent })
        | Source::Derived(DerivedSource::Tar { parent, .. }) => {
            let resource = follow(parent, manager)?;
            let scoped = resource.make_path()?;
            let mut src = std::fs::File::open(scoped.as_path())?;
            let (mut dst, temp_path) = tempfile::NamedTempFile::new()?.into_parts();
            std::io::copy(&mut src, &mut dst)?;
            Ok((Some(temp_path.to_path_buf()), Box::new(TempFileCookie(temp_path))))
        }
        Source::Derived(DerivedSource::Mbox { parent }) | Source::Derived(DerivedSource::HtmlLinks { parent }) => {
            // Text containers are read and split directly in `handles()`;
            // the cookie only needs to keep the parent alive, which the
            // manager's reverse-teardown stack already guarantees as long
            // as we've opened it.
            manager.open(&parent.source)?;
            Ok((None, Box::new(NoopCookie)))
        }
    }
}

/// Obtains a transient `Resource` for `handle`, opening whatever cookie its
/// source needs along the way (§3: "obtained by `handle.follow(sm)`").
pub fn follow(handle: &Handle, manager: &mut SourceManager) -> Result<Box<dyn Resource>, CoreError> {
    manager.open_entry(&handle.source)?;
    match &handle.source {
        Source::File(f) => {
            let base = PathBuf::from(&f.path);
            let path = if handle.relative_path.is_empty() {
                base
            } else {
                base.join(&handle.relative_path)
            };
            Ok(Box::new(FileResourceImpl { handle: handle.clone(), path }))
        }
        Source::Data(d) => {
            use base64::Engine;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&d.base64_data)
                .map_err(|e| CoreError::malformed(format!("invalid base64 data source: {e}")))?;
            Ok(Box::new(DataResourceImpl {
                handle: handle.clone(),
                content_type: d.content_type.clone(),
                bytes,
            }))
        }
        Source::Http(_) | Source::Smb(_) | Source::Mail(_) => {
            Ok(Box::new(StubResourceImpl { handle: handle.clone() }))
        }
        Source::Derived(_) => crate::derived::follow_derived(handle, manager),
    }
}
