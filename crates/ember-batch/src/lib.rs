//! Batch execution core for emberdb.
//!
//! A batch accepts many parameter tuples for one prepared data-modification
//! statement, buffers them through a two-tier cache that spills to a temp
//! file, materializes inline BLOB payloads into engine large objects,
//! rewrites client BLOB ids to engine ids inside each tuple, executes the
//! statement once per tuple, and reports a per-row completion state.
//!
//! # Key types
//!
//! - [`BatchSession`]: the lifecycle owner (`open` / `add` / `add_blob` /
//!   `execute` / `cancel`).
//! - [`DataCache`]: the spill-backed append buffer both tuple and BLOB
//!   streams live in.
//! - [`CompletionState`]: per-row outcomes returned from `execute`.
//! - [`engine`]: the traits the core consumes from the surrounding engine
//!   (statement executor, BLOB store, status transliteration).

pub mod blob;
pub mod cache;
pub mod completion;
pub mod engine;
pub mod session;

pub use blob::BlobIdMap;
pub use cache::DataCache;
pub use completion::{CompletionState, RowOutcome};
pub use session::{BatchConfig, BatchSession};

/// Capacity of the RAM tier of each [`DataCache`], and the ceiling on the
/// length of a single parameter message.
pub const RAM_BATCH: usize = 128 * 1024;

/// Default logical byte limit of each [`DataCache`]; configurable up to
/// four times this value.
pub const BUFFER_LIMIT: u64 = 10 * 1024 * 1024;

/// Default cap on detailed per-row error records; configurable up to four
/// times this value.
pub const DETAILED_LIMIT: u32 = 64;

/// Alignment of every frame in the BLOB stream.
pub const BLOB_STREAM_ALIGN: usize = 8;

/// Byte length of a BLOB frame header: 8-byte id + 4-byte payload length.
pub const SIZEOF_BLOB_HEAD: usize = ember_types::BlobId::SIZE + 4;

// The blob drain assumes RAM-tier windows never split an alignment unit.
const _: () = assert!(RAM_BATCH % BLOB_STREAM_ALIGN == 0);
