//! Traits the batch core consumes from the surrounding engine.
//!
//! The batch is a sink at the client/engine boundary: it owns buffering and
//! id translation but delegates statement execution, large-object storage,
//! and status transliteration to these interfaces. Everything here is
//! synchronous; the session runs on the caller's thread.

use ember_error::{EmberError, Result};
use ember_types::BlobId;

/// Prepared-statement executor for one batch run.
///
/// The executor is positioned on the statement and transaction by the
/// caller before `execute` is entered. `records_affected` must be a running
/// total (inserted + updated + deleted) so the session can difference it
/// around each send.
pub trait StatementExecutor {
    /// Roll the statement back to its unstarted state.
    fn unwind(&mut self) -> Result<()>;

    /// Start (or restart) the statement against the current transaction.
    fn start(&mut self) -> Result<()>;

    /// Deliver one parameter tuple in the statement's message layout.
    fn send(&mut self, message: &[u8]) -> Result<()>;

    /// Running total of records inserted, updated, and deleted.
    fn records_affected(&self) -> u64;
}

/// Factory side of the large-object storage contract.
pub trait BlobStore {
    /// Open large object being written.
    type Blob: BlobWriter;

    /// Create a streamed large object, returning its engine-assigned id
    /// and the open write handle.
    fn create(&mut self) -> Result<(BlobId, Self::Blob)>;
}

/// An open engine large object.
///
/// Exactly one of [`close`](Self::close) or [`cancel`](Self::cancel) must
/// end the object's life; both consume the handle so the type system rules
/// out use-after-finish.
pub trait BlobWriter {
    /// Append one segment of payload.
    fn put_segment(&mut self, segment: &[u8]) -> Result<()>;

    /// Finish the object, making it visible under its id.
    fn close(self) -> Result<()>;

    /// Abandon the object, releasing its storage.
    fn cancel(self);
}

/// Character-set fix-up applied to per-row errors before they enter the
/// completion state (connection charset transliteration in the full
/// engine).
pub trait Transliterate {
    /// Rewrite `error` into the client's charset/locale form.
    fn transliterate(&self, error: EmberError) -> EmberError;
}

/// Identity transliteration for callers without a charset layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransliteration;

impl Transliterate for NoTransliteration {
    fn transliterate(&self, error: EmberError) -> EmberError {
        error
    }
}
