use std::io::{Cursor, Read};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use scan_api::{CoreError, Handle, Resource, ScopedPath};

/// A resource backed directly by a local filesystem path — `FileSource`
/// handles, and the owned temp copies `scan-model::derived` makes for
/// archive members.
pub struct FileResourceImpl {
    pub handle: Handle,
    pub path: PathBuf,
}

impl Resource for FileResourceImpl {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    fn compute_type(&self) -> Result<String, CoreError> {
        Ok(mime_guess::from_path(&self.path).first_or_octet_stream().essence_str().to_string())
    }

    fn size(&self) -> Result<u64, CoreError> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    fn last_modified(&self) -> Result<Option<DateTime<Utc>>, CoreError> {
        let modified = std::fs::metadata(&self.path)?.modified()?;
        Ok(Some(DateTime::<Utc>::from(modified)))
    }

    fn make_stream(&self) -> Result<Box<dyn Read + Send>, CoreError> {
        Ok(Box::new(std::fs::File::open(&self.path)?))
    }

    fn make_path(&self) -> Result<ScopedPath, CoreError> {
        Ok(ScopedPath::borrowed(self.path.clone()))
    }
}

/// A resource whose entire content is inline (`data:` URLs).
pub struct DataResourceImpl {
    pub handle: Handle,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Resource for DataResourceImpl {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    fn compute_type(&self) -> Result<String, CoreError> {
        Ok(self.content_type.clone())
    }

    fn size(&self) -> Result<u64, CoreError> {
        Ok(self.bytes.len() as u64)
    }

    fn make_stream(&self) -> Result<Box<dyn Read + Send>, CoreError> {
        Ok(Box::new(Cursor::new(self.bytes.clone())))
    }
}

/// A resource whose bytes were already extracted into memory by a
/// container cursor (a zip/tar archive member) and whose MIME type is
/// guessed from its name within that container.
pub struct BytesResourceImpl {
    pub handle: Handle,
    pub bytes: Vec<u8>,
}

impl Resource for BytesResourceImpl {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    fn compute_type(&self) -> Result<String, CoreError> {
        Ok(mime_guess::from_path(&self.handle.relative_path)
            .first_or_octet_stream()
            .essence_str()
            .to_string())
    }

    fn size(&self) -> Result<u64, CoreError> {
        Ok(self.bytes.len() as u64)
    }

    fn make_stream(&self) -> Result<Box<dyn Read + Send>, CoreError> {
        Ok(Box::new(Cursor::new(self.bytes.clone())))
    }

    fn make_path(&self) -> Result<ScopedPath, CoreError> {
        let mut tmp = tempfile::NamedTempFile::new()?;
        std::io::Write::write_all(&mut tmp, &self.bytes)?;
        Ok(ScopedPath::owned(tmp.into_temp_path()))
    }
}

/// A resource whose in-memory text content was already extracted by a
/// derived-source factory (mbox message bodies, html link text).
pub struct TextResourceImpl {
    pub handle: Handle,
    pub mime: String,
    pub text: String,
}

impl Resource for TextResourceImpl {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    fn compute_type(&self) -> Result<String, CoreError> {
        Ok(self.mime.clone())
    }

    fn size(&self) -> Result<u64, CoreError> {
        Ok(self.text.len() as u64)
    }

    fn make_stream(&self) -> Result<Box<dyn Read + Send>, CoreError> {
        Ok(Box::new(Cursor::new(self.text.clone().into_bytes())))
    }
}

/// A handle whose backend is modelled (the addressing contract is
/// implemented in full) but whose live I/O is out of scope for this
/// workspace — network/SMB/mail backends, per spec.md's own framing
/// ("concrete parsers for specific document formats beyond their
/// integration contract" are external collaborators). Every method beyond
/// `compute_type` (a best-effort guess from the relative path) reports
/// `Unavailable` rather than panicking, so callers see a normal retriable
/// failure, not a crash.
pub struct StubResourceImpl {
    pub handle: Handle,
}

impl Resource for StubResourceImpl {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    fn compute_type(&self) -> Result<String, CoreError> {
        Ok(mime_guess::from_path(&self.handle.relative_path)
            .first_or_octet_stream()
            .essence_str()
            .to_string())
    }

    fn make_stream(&self) -> Result<Box<dyn Read + Send>, CoreError> {
        Err(CoreError::unavailable(format!(
            "no live backend for {} handles in this workspace",
            self.handle.source.type_label()
        )))
    }
}
