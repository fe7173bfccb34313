//! Batch session lifecycle and execution.
//!
//! A [`BatchSession`] is opened against one prepared data-modification
//! statement and buffers parameter tuples (and optionally BLOB payloads)
//! until [`execute`](BatchSession::execute) drains everything into the
//! engine. Sessions are reusable: every execute (and every
//! [`cancel`](BatchSession::cancel)) resets the mutable state, so the same
//! session can fill and run again.

use tracing::{debug, trace};

use ember_error::{EmberError, Result};
use ember_types::{
    BlobId, BlobPolicy, MessageMetadata, ParamReader, ParamTag, StatementProfile,
};

use crate::blob::{materialize_blobs, BlobIdMap};
use crate::cache::DataCache;
use crate::completion::CompletionState;
use crate::engine::{BlobStore, StatementExecutor, Transliterate};
use crate::{BLOB_STREAM_ALIGN, BUFFER_LIMIT, DETAILED_LIMIT, RAM_BATCH, SIZEOF_BLOB_HEAD};

/// Batch behavior switches, decoded from the open-time parameter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Continue past per-row errors instead of stopping at the first.
    pub multi_error: bool,
    /// Record per-row affected-record counts.
    pub record_counts: bool,
    /// Cap on per-row error records that keep full detail.
    pub detail_limit: u32,
    /// Logical byte limit of each data cache.
    pub buffer_limit: u64,
    /// BLOB identity policy.
    pub blob_policy: BlobPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            multi_error: false,
            record_counts: false,
            detail_limit: DETAILED_LIMIT,
            buffer_limit: BUFFER_LIMIT,
            blob_policy: BlobPolicy::None,
        }
    }
}

impl BatchConfig {
    /// Decode a tagged parameter block. Unknown tags are ignored; the
    /// numeric knobs are clamped to four times their defaults.
    #[allow(clippy::cast_sign_loss)]
    pub fn from_params(block: &[u8]) -> Result<Self> {
        let mut config = Self::default();
        for entry in ParamReader::new(block)? {
            let entry = entry?;
            let Some(tag) = ParamTag::from_u8(entry.tag) else {
                continue;
            };
            match tag {
                ParamTag::MultiError => config.multi_error = entry.as_int()? != 0,
                ParamTag::RecordCounts => config.record_counts = entry.as_int()? != 0,
                ParamTag::BlobIds => {
                    config.blob_policy = BlobPolicy::from_int(entry.as_int()?);
                }
                ParamTag::DetailedErrors => {
                    config.detail_limit = (entry.as_int()? as u32).min(4 * DETAILED_LIMIT);
                }
                ParamTag::BufferBytesSize => {
                    config.buffer_limit =
                        u64::from(entry.as_int()? as u32).min(4 * BUFFER_LIMIT);
                }
            }
        }
        Ok(config)
    }
}

/// Location of one blob-carrying field inside a parameter tuple.
#[derive(Debug, Clone, Copy)]
struct BlobField {
    offset: usize,
    null_offset: usize,
}

/// One batch attached to a prepared statement.
#[derive(Debug)]
pub struct BatchSession {
    config: BatchConfig,
    message_length: usize,
    aligned_length: usize,
    alignment: usize,
    blob_fields: Vec<BlobField>,

    messages: DataCache,
    /// Present iff the statement declares blob-carrying fields.
    blobs: Option<DataCache>,
    blob_map: BlobIdMap,

    /// Client-id generator under the engine identity policy.
    gen_id: BlobId,
    /// Stream offset of the most recently started growable BLOB's header.
    last_blob: Option<u64>,
    /// Whether that BLOB grew and its header length needs back-patching.
    set_blob_size: bool,
}

impl BatchSession {
    /// Open a batch against a prepared statement.
    ///
    /// `profile` is the caller's snapshot of the statement state,
    /// `metadata` describes the parameter tuple layout, and `param_block`
    /// carries the tagged configuration decoded by
    /// [`BatchConfig::from_params`].
    pub fn open(
        profile: &StatementProfile,
        metadata: &dyn MessageMetadata,
        param_block: &[u8],
    ) -> Result<Self> {
        if profile.cursor_open {
            return Err(EmberError::CursorAlreadyOpen);
        }
        if profile.batch_active {
            return Err(EmberError::BatchAlreadyActive);
        }
        if !profile.prepared {
            return Err(EmberError::UnpreparedStatement);
        }
        if profile.orphan {
            return Err(EmberError::OrphanStatement);
        }
        if !profile.kind.is_batchable() {
            return Err(EmberError::WrongStatementType {
                kind: profile.kind.to_string(),
            });
        }
        if profile.parameter_count == 0 {
            return Err(EmberError::StatementWithoutParameters);
        }

        let config = BatchConfig::from_params(param_block)?;

        let message_length = metadata.message_length();
        if message_length > RAM_BATCH {
            return Err(EmberError::MessageTooLong {
                length: message_length,
                limit: RAM_BATCH,
            });
        }

        let mut blob_fields = Vec::new();
        for index in 0..metadata.field_count() {
            if metadata.field_kind(index).carries_blob_id() {
                blob_fields.push(BlobField {
                    offset: metadata.field_offset(index),
                    null_offset: metadata.null_offset(index),
                });
            }
        }

        let messages = DataCache::new(config.buffer_limit);
        let blobs = if blob_fields.is_empty() {
            None
        } else {
            Some(DataCache::new(config.buffer_limit))
        };

        debug!(
            message_length,
            alignment = metadata.alignment(),
            blob_fields = blob_fields.len(),
            policy = %config.blob_policy,
            "batch session opened"
        );

        Ok(Self {
            config,
            message_length,
            aligned_length: metadata.aligned_length(),
            alignment: metadata.alignment(),
            blob_fields,
            messages,
            blobs,
            blob_map: BlobIdMap::new(),
            gen_id: BlobId::ZERO,
            last_blob: None,
            set_blob_size: false,
        })
    }

    /// Append `count` parameter tuples.
    ///
    /// `buffer` holds `count - 1` tuples at the aligned stride plus one
    /// final tuple of the exact message length (the tail needs no padding).
    pub fn add(&mut self, count: usize, buffer: &[u8]) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let need = (count - 1) * self.aligned_length + self.message_length;
        if buffer.len() < need {
            return Err(EmberError::internal(format!(
                "add of {count} tuples needs {need} bytes, caller provided {}",
                buffer.len()
            )));
        }
        self.messages.align(self.alignment)?;
        self.messages.put(&buffer[..need])
    }

    /// Append one inline BLOB as a complete frame.
    ///
    /// Under the engine identity policy `blob_id` is overwritten with a
    /// generated client id; under the user policy it is taken as given.
    /// The BLOB stays growable through
    /// [`append_blob_data`](Self::append_blob_data) until the next frame
    /// starts.
    pub fn add_blob(&mut self, payload: &[u8], blob_id: &mut BlobId) -> Result<()> {
        self.blob_check_mode(false, "add_blob")?;
        self.blob_prepare()?;

        let length = u32::try_from(payload.len())
            .map_err(|_| EmberError::internal("blob payload exceeds frame length field"))?;

        if self.config.blob_policy == BlobPolicy::Engine {
            *blob_id = self.gen_id.bump();
        }
        let id = *blob_id;

        let blobs = self.blobs_mut()?;
        let start = blobs.size();
        debug_assert!(start % BLOB_STREAM_ALIGN as u64 == 0);
        blobs.put(&id.to_bytes())?;
        blobs.put(&length.to_le_bytes())?;
        blobs.put(payload)?;
        self.last_blob = Some(start);
        Ok(())
    }

    /// Extend the most recently added BLOB with more payload. The frame's
    /// length field is back-patched before the next frame begins (or at
    /// execute).
    pub fn append_blob_data(&mut self, payload: &[u8]) -> Result<()> {
        self.blob_check_mode(false, "append_blob_data")?;
        if self.last_blob.is_none() {
            return Err(EmberError::NoLastBlob);
        }
        self.set_blob_size = true;
        self.blobs_mut()?.put(payload)
    }

    /// Append a caller-framed portion of the BLOB stream (stream identity
    /// policy only). The portion must be a whole number of stream
    /// alignment units.
    pub fn add_blob_stream(&mut self, portion: &[u8]) -> Result<()> {
        if portion.is_empty() {
            return Ok(());
        }
        if portion.len() % BLOB_STREAM_ALIGN != 0 {
            return Err(EmberError::BadStreamAlignment {
                length: portion.len(),
            });
        }
        self.blob_check_mode(true, "add_blob_stream")?;
        self.blob_prepare()?;

        // The caller frames this data; its last blob is unknowable here.
        self.last_blob = None;

        let blobs = self.blobs_mut()?;
        debug_assert!(blobs.size() % BLOB_STREAM_ALIGN as u64 == 0);
        blobs.put(portion)
    }

    /// Make an engine BLOB created outside the batch addressable from
    /// tuples under `client` without passing through the BLOB stream.
    pub fn register_blob(&mut self, engine: BlobId, client: BlobId) -> Result<()> {
        self.blob_check_meta()?;
        self.blob_map.insert(client, engine)
    }

    /// Execute the statement once per buffered tuple.
    ///
    /// BLOBs are materialized first, then tuples are drained in insertion
    /// order with client ids rewritten in place. Per-row failures honor the
    /// multi-error policy; the session is reset on every exit path.
    pub fn execute<E, S, T>(
        &mut self,
        executor: &mut E,
        store: &mut S,
        transliterator: &T,
    ) -> Result<CompletionState>
    where
        E: StatementExecutor,
        S: BlobStore,
        T: Transliterate,
    {
        let result = self.execute_inner(executor, store, transliterator);
        self.cancel();
        result
    }

    /// Discard all buffered data and reset the mutable session state.
    /// Idempotent; also runs implicitly at the end of every execute.
    pub fn cancel(&mut self) {
        self.messages.clear();
        if let Some(blobs) = self.blobs.as_mut() {
            blobs.clear();
            self.set_blob_size = false;
            self.last_blob = None;
            self.gen_id = BlobId::ZERO;
            self.blob_map.clear();
        }
    }

    /// The decoded configuration this session runs under.
    #[must_use]
    pub const fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Exact byte length of one parameter tuple.
    #[must_use]
    pub const fn message_length(&self) -> usize {
        self.message_length
    }

    /// Tuple stride in the buffered stream.
    #[must_use]
    pub const fn aligned_length(&self) -> usize {
        self.aligned_length
    }

    /// Required tuple alignment.
    #[must_use]
    pub const fn alignment(&self) -> usize {
        self.alignment
    }

    /// Alignment required of BLOB stream portions.
    #[must_use]
    pub const fn blob_alignment(&self) -> usize {
        BLOB_STREAM_ALIGN
    }

    /// Whether nothing is currently buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.size() == 0 && self.blobs.as_ref().is_none_or(|b| b.size() == 0)
    }

    fn execute_inner<E, S, T>(
        &mut self,
        executor: &mut E,
        store: &mut S,
        transliterator: &T,
    ) -> Result<CompletionState>
    where
        E: StatementExecutor,
        S: BlobStore,
        T: Transliterate,
    {
        self.messages.done()?;

        if !self.blob_fields.is_empty() {
            // A pending append_blob_data length patch must land before the
            // stream is sealed.
            self.blob_prepare()?;

            let Self {
                blobs, blob_map, ..
            } = self;
            let blobs = blobs
                .as_mut()
                .ok_or_else(|| EmberError::internal("blob cache absent"))?;
            blobs.done()?;
            materialize_blobs(blobs, blob_map, store)?;
        }

        let mut completion = CompletionState::new(
            self.config.record_counts,
            self.config.detail_limit as usize,
        );
        let mut start_request = true;
        // Logical position in the tuple stream, for padding bookkeeping.
        let mut byte_count: u64 = 0;

        'windows: loop {
            let window_len = self.messages.get()?;
            if window_len == 0 {
                break;
            }
            if window_len < self.message_length {
                return Err(EmberError::MessageLeftover {
                    remains: window_len,
                });
            }

            let mut pos = 0usize;
            let mut remains = window_len;
            while remains >= self.message_length {
                if start_request {
                    executor.unwind()?;
                    executor.start()?;
                    start_request = false;
                }

                let misalign = (byte_count % self.alignment as u64) as usize;
                if misalign != 0 {
                    let skip = self.alignment - misalign;
                    if skip > remains {
                        break;
                    }
                    pos += skip;
                    byte_count += skip as u64;
                    remains -= skip;
                    continue;
                }

                let row = self.run_tuple(executor, pos);
                pos += self.message_length;
                byte_count += self.message_length as u64;
                remains -= self.message_length;

                match row {
                    Ok(records) => completion.register_success(records),
                    Err(error) => {
                        let error = transliterator.transliterate(error);
                        trace!(row = completion.len(), %error, "batch row failed");
                        completion.register_error(error);
                        if !self.config.multi_error {
                            break 'windows;
                        }
                        start_request = true;
                    }
                }
            }

            let misalign = (byte_count % self.alignment as u64) as usize;
            let pad = if misalign == 0 {
                0
            } else {
                self.alignment - misalign
            };
            self.messages.remained(remains, pad);
            byte_count += pad as u64;
        }

        debug!(
            rows = completion.len(),
            failed = completion.failed_count(),
            "batch executed"
        );
        Ok(completion)
    }

    /// Translate one tuple's blob ids in place and send it, returning the
    /// affected-record delta.
    fn run_tuple<E: StatementExecutor>(&mut self, executor: &mut E, pos: usize) -> Result<u64> {
        let len = self.message_length;
        if !self.blob_fields.is_empty() {
            let Self {
                messages,
                blob_fields,
                blob_map,
                ..
            } = self;
            let tuple = &mut messages.window_mut()[pos..pos + len];
            translate_tuple(blob_fields, blob_map, tuple)?;
        }

        let tuple = &self.messages.window()[pos..pos + len];
        let before = executor.records_affected();
        executor.send(tuple)?;
        Ok(executor.records_affected() - before)
    }

    fn blob_check_meta(&self) -> Result<()> {
        if self.blob_fields.is_empty() {
            return Err(EmberError::NoBlobsDeclared);
        }
        Ok(())
    }

    fn blob_check_mode(&self, stream: bool, call: &'static str) -> Result<()> {
        self.blob_check_meta()?;

        let admitted = match self.config.blob_policy {
            BlobPolicy::Engine | BlobPolicy::User => !stream,
            BlobPolicy::Stream => stream,
            BlobPolicy::None => false,
        };
        if admitted {
            Ok(())
        } else {
            Err(EmberError::PolicyMismatch {
                call,
                policy: self.config.blob_policy.name(),
            })
        }
    }

    /// Settle the previous frame before starting a new one: land a pending
    /// length patch and pad the stream to the frame alignment.
    fn blob_prepare(&mut self) -> Result<()> {
        if self.set_blob_size {
            let last = self
                .last_blob
                .ok_or_else(|| EmberError::internal("length patch without a last blob"))?;
            let blobs = self.blobs_mut()?;
            let total = blobs.size() - (last + SIZEOF_BLOB_HEAD as u64);
            let total = u32::try_from(total)
                .map_err(|_| EmberError::internal("grown blob exceeds frame length field"))?;
            blobs.put_at(&total.to_le_bytes(), last + BlobId::SIZE as u64)?;
            self.set_blob_size = false;
        }
        self.blobs_mut()?.align(BLOB_STREAM_ALIGN)
    }

    fn blobs_mut(&mut self) -> Result<&mut DataCache> {
        self.blobs
            .as_mut()
            .ok_or_else(|| EmberError::internal("blob cache absent"))
    }
}

/// Rewrite every non-null blob field of `tuple` from client id to engine
/// id, consuming the map entries.
fn translate_tuple(fields: &[BlobField], map: &mut BlobIdMap, tuple: &mut [u8]) -> Result<()> {
    for field in fields {
        let null_flag = i16::from_le_bytes([tuple[field.null_offset], tuple[field.null_offset + 1]]);
        if null_flag != 0 {
            continue;
        }
        let client = BlobId::read_from(&tuple[field.offset..]);
        let engine = map.translate(client)?;
        engine.write_to(&mut tuple[field.offset..]);
    }
    Ok(())
}
