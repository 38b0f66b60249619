use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CoreError, DeserialisationError, UnknownSchemeError};

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// An opaque, JSON-serialisable descriptor of a place that contains things.
///
/// §9 suggests replacing the source language's class hierarchy with tagged
/// variants keyed by a `type_label` registry; that's exactly what this is —
/// `Source` is a closed sum type, and `#[serde(tag = "type")]` *is* the
/// registry: the tag is the type label, decoding dispatches on it, and the
/// table is fixed at compile time, matching §9's "build-time lookup table"
/// requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Source {
    File(FileSource),
    Smb(SmbSource),
    Http(HttpSource),
    Data(DataSource),
    Mail(MailSource),
    Derived(DerivedSource),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSource {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmbSource {
    pub unc_path: String,
    pub domain: Option<String>,
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// `true` for the `smbc://` backend, `false` for `smb://`.
    #[serde(default)]
    pub use_smbc_backend: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSource {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub content_type: String,
    pub base64_data: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailSource {
    pub address: String,
    pub server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// A source produced by following a `Handle` into a container. Carries a
/// back-reference to that handle (§4.C).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "derived_type", rename_all = "snake_case")]
pub enum DerivedSource {
    Zip { parent: Box<Handle> },
    Tar { parent: Box<Handle>, gzip: bool },
    Mbox { parent: Box<Handle> },
    HtmlLinks { parent: Box<Handle> },
}

impl Source {
    pub fn type_label(&self) -> &'static str {
        match self {
            Source::File(_) => "file",
            Source::Smb(s) if s.use_smbc_backend => "smbc",
            Source::Smb(_) => "smb",
            Source::Http(_) => "http",
            Source::Data(_) => "data",
            Source::Mail(_) => "mail",
            Source::Derived(DerivedSource::Zip { .. }) => "zip",
            Source::Derived(DerivedSource::Tar { .. }) => "tar",
            Source::Derived(DerivedSource::Mbox { .. }) => "mbox",
            Source::Derived(DerivedSource::HtmlLinks { .. }) => "html-links",
        }
    }

    /// Whether the explorer may split exploration of this source into
    /// independent sub-specs, one per member handle (§4.H Explorer step ii).
    /// True for every derived source: each member can be scanned without
    /// needing the rest of the container.
    pub fn yields_independent_sources(&self) -> bool {
        matches!(self, Source::Derived(_))
    }

    /// Copy with secrets stripped (invariant in §3: "secrets survive only
    /// when present in the input").
    pub fn censor(&self) -> Source {
        match self {
            Source::Smb(s) => Source::Smb(SmbSource { password: None, ..s.clone() }),
            Source::Mail(s) => Source::Mail(MailSource { password: None, ..s.clone() }),
            Source::Derived(DerivedSource::Zip { parent }) => {
                Source::Derived(DerivedSource::Zip { parent: Box::new(parent.censor()) })
            }
            Source::Derived(DerivedSource::Tar { parent, gzip }) => Source::Derived(
                DerivedSource::Tar { parent: Box::new(parent.censor()), gzip: *gzip },
            ),
            Source::Derived(DerivedSource::Mbox { parent }) => {
                Source::Derived(DerivedSource::Mbox { parent: Box::new(parent.censor()) })
            }
            Source::Derived(DerivedSource::HtmlLinks { parent }) => {
                Source::Derived(DerivedSource::HtmlLinks { parent: Box::new(parent.censor()) })
            }
            other => other.clone(),
        }
    }

    pub fn to_json_object(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("Source serialisation is infallible")
    }

    pub fn from_json_object(obj: &serde_json::Value) -> Result<Source, DeserialisationError> {
        serde_json::from_value(obj.clone())
            .map_err(|e| DeserialisationError(format!("source: {e}")))
    }

    /// `file:<absolute-path>`, `smb://…`, `smbc://…`, `https?://…`,
    /// `data:…`, `ews://…` (§6). `ews` is accepted as an alias for the mail
    /// backend's URL form.
    pub fn from_url(url: &str) -> Result<Source, UnknownSchemeError> {
        let parsed = Url::parse(url).map_err(|e| UnknownSchemeError(e.to_string()))?;
        match parsed.scheme() {
            "file" => Ok(Source::File(FileSource { path: parsed.path().to_string() })),
            "http" | "https" => Ok(Source::Http(HttpSource { url: url.to_string() })),
            "data" => Ok(Source::Data(DataSource {
                content_type: parsed.path().split(',').next().unwrap_or_default().to_string(),
                base64_data: parsed.path().split(',').nth(1).unwrap_or_default().to_string(),
                name: None,
            })),
            "smb" | "smbc" => {
                let host = parsed.host_str().unwrap_or_default();
                let user = if parsed.username().is_empty() {
                    None
                } else {
                    Some(parsed.username().to_string())
                };
                Ok(Source::Smb(SmbSource {
                    unc_path: format!("//{host}{}", parsed.path()),
                    domain: None,
                    user,
                    password: parsed.password().map(|p| p.to_string()),
                    use_smbc_backend: parsed.scheme() == "smbc",
                }))
            }
            "ews" => Ok(Source::Mail(MailSource {
                address: parsed.username().to_string(),
                server: parsed.host_str().unwrap_or_default().to_string(),
                password: parsed.password().map(|p| p.to_string()),
            })),
            other => Err(UnknownSchemeError(other.to_string())),
        }
    }

    /// The key `SourceManager` caches cookies under: equality-properties,
    /// not the full structural value, so two sources differing only by
    /// secret fields still share a cache slot (§3).
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.type_label(), equality_properties(self))
    }

    pub fn to_url(&self) -> Option<String> {
        match self {
            Source::File(f) => Some(format!("file://{}", f.path)),
            Source::Http(h) => Some(h.url.clone()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// An ordered pair `(source, relative path)` uniquely naming an object
/// within its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handle {
    pub source: Source,
    pub relative_path: String,
}

impl Handle {
    pub fn new(source: Source, relative_path: impl Into<String>) -> Self {
        Self { source, relative_path: relative_path.into() }
    }

    pub fn to_json_object(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("Handle serialisation is infallible")
    }

    pub fn from_json_object(obj: &serde_json::Value) -> Result<Handle, DeserialisationError> {
        serde_json::from_value(obj.clone())
            .map_err(|e| DeserialisationError(format!("handle: {e}")))
    }

    pub fn censor(&self) -> Handle {
        Handle { source: self.source.censor(), relative_path: self.relative_path.clone() }
    }

    /// Human-readable presentation, e.g. `a.zip/b.txt` for a handle inside a
    /// derived zip source (used literally by testable property 11).
    pub fn presentation(&self) -> String {
        match &self.source {
            Source::Derived(d) => {
                let parent = derived_parent(d);
                format!("{}/{}", parent.presentation(), self.relative_path)
            }
            _ => self.relative_path.clone(),
        }
    }

    pub fn presentation_url(&self) -> Option<String> {
        self.source.to_url().map(|base| format!("{base}/{}", self.relative_path))
    }

    pub fn sort_key(&self) -> String {
        format!("{}:{}", self.source.type_label(), self.relative_path)
    }

    /// Canonical byte representation of the handle chain: type label +
    /// equality properties + relative path, repeated up the chain (§4.A).
    pub fn crunch_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_crunch(&mut out);
        out
    }

    fn write_crunch(&self, out: &mut Vec<u8>) {
        if let Source::Derived(d) = &self.source {
            derived_parent(d).write_crunch(out);
            out.push(b'|');
        }
        out.extend_from_slice(self.source.type_label().as_bytes());
        out.push(b':');
        out.extend_from_slice(equality_properties(&self.source).as_bytes());
        out.push(b'/');
        out.extend_from_slice(self.relative_path.as_bytes());
    }

    /// `hash = false`: the raw canonical byte string. `hash = true`: a
    /// fixed-width hex digest of it — the durable identity used downstream.
    pub fn crunch(&self, hash: bool) -> String {
        let bytes = self.crunch_bytes();
        if hash {
            hex_digest(&bytes)
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }
}

fn derived_parent(d: &DerivedSource) -> &Handle {
    match d {
        DerivedSource::Zip { parent }
        | DerivedSource::Tar { parent, .. }
        | DerivedSource::Mbox { parent }
        | DerivedSource::HtmlLinks { parent } => parent,
    }
}

/// The properties equality is defined over (§3 "equality on sources is by
/// equality-properties"): everything except secrets, since two sources that
/// differ only by credential should still hit the same `SourceManager` slot.
fn equality_properties(source: &Source) -> String {
    match source {
        Source::File(f) => f.path.clone(),
        Source::Smb(s) => format!("{}:{}", s.unc_path, s.user.as_deref().unwrap_or("")),
        Source::Http(h) => h.url.clone(),
        Source::Data(d) => format!("{}:{}", d.content_type, d.base64_data),
        Source::Mail(m) => format!("{}@{}", m.address, m.server),
        Source::Derived(d) => {
            let parent = derived_parent(d);
            format!("{}:{}", source.type_label(), parent.crunch(false))
        }
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    // FNV-1a 64-bit, formatted as a fixed-width hex digest. Not
    // cryptographic — crunches only need to be stable and collision-resistant
    // enough for dedup keys, not tamper-proof.
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{hash:016x}")
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.presentation())
    }
}
