use crate::error::CoreError;
use crate::source::{Handle, Source};

/// Whatever long-lived state a source needs to serve resources: an `smbc`
/// context, a tar file object, an HTTP session. Teardown runs to completion
/// when the manager closes it; `Cookie::close` must leave no references to
/// itself anywhere after it returns (§4.B: necessary for bindings whose
/// shutdown relies on garbage collection — in Rust that constraint is
/// trivially satisfied by ordinary `Drop`, but the method still exists so a
/// cookie can report teardown failures as problems instead of panicking).
pub trait Cookie: Send {
    fn close(self: Box<Self>) -> Result<(), CoreError>;
}

/// A stack-ordered `Source -> cookie` cache (§4.B). `open` is reentrant but
/// not thread-safe; the pipeline guarantees single-threaded use per manager.
///
/// Implemented by `scan-model::SourceManager`; kept as a trait here so
/// `scan-conversions` and `scan-rules` can depend on the *contract* without
/// depending on every concrete source backend.
pub trait Manager {
    /// Returns the cached cookie for `source`, opening a fresh one via the
    /// source's generator if this is the first request. Never holds more
    /// than one live cookie per source (§3 invariant).
    fn open(&mut self, source: &Source) -> Result<&dyn Cookie, CoreError>;

    /// Resume every stored generator to completion in reverse insertion
    /// order, swallowing teardown exceptions (recorded as problems, not
    /// propagated — §4.B).
    fn close(&mut self) -> Vec<CoreError>;

    /// Close a named subset of cached cookies.
    fn clear(&mut self, subset: &[Source]) -> Vec<CoreError>;
}

/// Something a `Source` knows how to enumerate and derive from. Kept
/// separate from `Manager` so leaf and compound sources can share the
/// handle-iteration contract without pulling in the whole manager surface.
///
/// Returns a materialised `Vec` rather than a lazy iterator: every concrete
/// source in this workspace enumerates a bounded container (a directory
/// listing, an archive's central directory, an inbox page), so there's no
/// streaming win to chase and a concrete `Vec` sidesteps tying the return
/// type's lifetime to the borrow of `manager`.
pub trait HandleSource {
    fn handles(&self, manager: &mut dyn Manager) -> Result<Vec<Handle>, CoreError>;
}
