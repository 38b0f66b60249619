use scan_api::CoreError;

/// Ambient-stack error type for the engine/pipeline layer (§3 AMBIENT
/// STACK), mirroring `gauss_engine::error::EngineError`'s shape: a
/// `thiserror`-derived enum whose `Core` variant carries the spec's own
/// `CoreError`/`ErrorKind` pair through unchanged.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("bus topic closed: {0}")]
    BusClosed(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
            EngineError::Core(e) => EngineError::Core(e.with_context(ctx)),
            other => other,
        }
    }
}
