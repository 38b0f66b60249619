use std::fmt;

/// The error taxonomy the core distinguishes between. Every failure that
/// crosses a stage boundary is mapped into exactly one of these, because the
/// pipeline stages need to know how to react to a failure without knowing
/// anything about its origin: retry it, report it and move on, or die.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network/file transient. Retriable by a `Retrier`; becomes a
    /// `problem = "unavailable"` message if retries are exhausted.
    Unavailable,
    /// A JSON envelope or URL could not be parsed. Becomes a
    /// `problem = "malformed"` message and is acked, never redelivered.
    Malformed,
    /// A converter raised for a specific `(OutputType, mime)` pair.
    ConversionFailure,
    /// A `SimpleRule::match_content` raised.
    RuleBug,
    /// Configuration or code invariants violated; the stage should exit
    /// non-zero and let the supervisor restart it.
    Fatal,
}

/// Error type returned by every core trait method.
#[derive(Debug)]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CoreError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), source: None }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, msg)
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Malformed, msg)
    }

    pub fn conversion_failure(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConversionFailure, msg)
    }

    pub fn rule_bug(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuleBug, msg)
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, msg)
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Add context, preserving the original `ErrorKind`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self { kind: self.kind, message: format!("{ctx}: {}", self.message), source: self.source }
    }

    /// The `extra` array carried by problem messages (§6), one string per
    /// argument the original exception would have carried.
    pub fn extra(&self) -> Vec<String> {
        vec![self.message.clone()]
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted => ErrorKind::Unavailable,
            _ => ErrorKind::Unavailable,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorKind::Malformed, e.to_string())
    }
}

impl From<url::ParseError> for CoreError {
    fn from(e: url::ParseError) -> Self {
        Self::new(ErrorKind::Malformed, e.to_string())
    }
}

/// Raised by URL decoding when no handler matches the scheme.
#[derive(Debug)]
pub struct UnknownSchemeError(pub String);

impl fmt::Display for UnknownSchemeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown scheme: {}", self.0)
    }
}

impl std::error::Error for UnknownSchemeError {}

impl From<UnknownSchemeError> for CoreError {
    fn from(e: UnknownSchemeError) -> Self {
        CoreError::malformed(e.to_string())
    }
}

/// Raised by JSON decoding when a required field is absent or malformed.
#[derive(Debug)]
pub struct DeserialisationError(pub String);

impl fmt::Display for DeserialisationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deserialisation error: {}", self.0)
    }
}

impl std::error::Error for DeserialisationError {}

impl From<DeserialisationError> for CoreError {
    fn from(e: DeserialisationError) -> Self {
        CoreError::malformed(e.to_string())
    }
}
