//! Client/engine BLOB id mapping and the packed BLOB stream decoder.
//!
//! The BLOB side of a batch travels as a packed stream of frames, each
//! `[client id : 8][payload length : 4 LE][payload][pad]` aligned to
//! [`BLOB_STREAM_ALIGN`]. At execute time the stream is drained once:
//! every frame becomes an engine large object, and the id pair lands in a
//! [`BlobIdMap`] consulted (and consumed) during tuple translation.

use std::collections::HashMap;

use tracing::debug;

use ember_error::{EmberError, Result};
use ember_types::BlobId;

use crate::cache::DataCache;
use crate::engine::{BlobStore, BlobWriter};
use crate::{BLOB_STREAM_ALIGN, SIZEOF_BLOB_HEAD};

/// Bijective client-id to engine-id mapping with insert-unique semantics.
///
/// Entries are consumed on translation: a client id refers to one engine
/// object in exactly one tuple field.
#[derive(Debug, Default)]
pub struct BlobIdMap {
    map: HashMap<BlobId, BlobId>,
}

impl BlobIdMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a `client → engine` pair; a repeated client id is a caller
    /// error.
    pub fn insert(&mut self, client: BlobId, engine: BlobId) -> Result<()> {
        match self.map.insert(client, engine) {
            None => Ok(()),
            Some(previous) => {
                // Restore the original pair before reporting.
                self.map.insert(client, previous);
                Err(EmberError::DuplicateBlobId {
                    id: client.to_string(),
                })
            }
        }
    }

    /// Look up and consume the engine id registered for `client`.
    pub fn translate(&mut self, client: BlobId) -> Result<BlobId> {
        self.map
            .remove(&client)
            .ok_or_else(|| EmberError::UnknownBlobId {
                id: client.to_string(),
            })
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no entries are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// Drain the sealed BLOB cache, creating one engine large object per frame
/// and recording each id pair in `map`.
///
/// On any failure the currently open engine object is cancelled before the
/// error propagates; objects already closed stay closed (the caller's
/// transaction decides their fate).
pub(crate) fn materialize_blobs<S: BlobStore>(
    cache: &mut DataCache,
    map: &mut BlobIdMap,
    store: &mut S,
) -> Result<()> {
    let mut open: Option<S::Blob> = None;
    let result = drain_frames(cache, map, store, &mut open);

    match result {
        Ok(()) => {
            debug_assert!(open.is_none(), "drain left an engine blob open");
            if let Some(blob) = open.take() {
                blob.cancel();
            }
            Ok(())
        }
        Err(err) => {
            if let Some(blob) = open.take() {
                blob.cancel();
            }
            Err(err)
        }
    }
}

fn drain_frames<S: BlobStore>(
    cache: &mut DataCache,
    map: &mut BlobIdMap,
    store: &mut S,
    open: &mut Option<S::Blob>,
) -> Result<()> {
    // Bytes still owed to the current frame's payload.
    let mut payload_left: usize = 0;
    // Logical position in the whole stream, for alignment bookkeeping.
    let mut byte_count: u64 = 0;

    loop {
        let window_len = cache.get()?;
        if window_len == 0 {
            break;
        }

        let mut pos = 0usize;
        let mut remains = window_len;
        while remains > 0 {
            if payload_left == 0 {
                // Between frames: first consume inter-frame padding.
                let misalign = (byte_count % BLOB_STREAM_ALIGN as u64) as usize;
                if misalign != 0 {
                    let skip = BLOB_STREAM_ALIGN - misalign;
                    if skip > remains {
                        return Err(EmberError::StreamLeftover { remains });
                    }
                    pos += skip;
                    byte_count += skip as u64;
                    remains -= skip;
                    continue;
                }

                if remains < SIZEOF_BLOB_HEAD {
                    return Err(EmberError::StreamLeftover { remains });
                }

                let window = cache.window();
                let client = BlobId::read_from(&window[pos..]);
                let length = u32::from_le_bytes(
                    window[pos + BlobId::SIZE..pos + SIZEOF_BLOB_HEAD]
                        .try_into()
                        .map_err(|_| EmberError::internal("blob header slice size"))?,
                );
                payload_left = length as usize;
                pos += SIZEOF_BLOB_HEAD;
                byte_count += SIZEOF_BLOB_HEAD as u64;
                remains -= SIZEOF_BLOB_HEAD;

                let (engine, handle) = store.create()?;
                *open = Some(handle);
                map.insert(client, engine)?;
                debug!(%client, %engine, length, "materializing batch blob");
            }

            let take = payload_left.min(remains);
            if take > 0 {
                let segment = &cache.window()[pos..pos + take];
                match open.as_mut() {
                    Some(blob) => blob.put_segment(segment)?,
                    None => return Err(EmberError::internal("blob payload without open blob")),
                }
                pos += take;
                byte_count += take as u64;
                remains -= take;
                payload_left -= take;
            }

            if payload_left == 0 {
                if let Some(blob) = open.take() {
                    blob.close()?;
                }
            }
        }

        cache.remained(0, 0);
    }

    Ok(())
}
