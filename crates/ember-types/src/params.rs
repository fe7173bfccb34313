//! Tagged parameter-block codec.
//!
//! A batch is configured at open time through a compact tagged byte block:
//! a leading version byte, then zero or more `[tag u8][len u32 LE][payload]`
//! entries. Unknown tags are skipped by consumers; a wrong version byte is
//! fatal. The writer half exists for callers assembling a block (and for
//! tests).

use std::fmt;

use ember_error::{EmberError, Result};

/// Only supported parameter-block version byte.
pub const PARAM_VERSION_1: u8 = 1;

/// Known configuration tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ParamTag {
    /// Continue past per-row errors (int 0/1).
    MultiError = 1,
    /// Record per-row affected-record counts (int 0/1).
    RecordCounts = 2,
    /// BLOB identity policy (int, see [`BlobPolicy`]).
    BlobIds = 3,
    /// Cap on detailed per-row error records (int).
    DetailedErrors = 4,
    /// Per-cache byte limit (int).
    BufferBytesSize = 5,
}

impl ParamTag {
    /// Decode a tag byte; `None` for tags this version does not know.
    #[must_use]
    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::MultiError),
            2 => Some(Self::RecordCounts),
            3 => Some(Self::BlobIds),
            4 => Some(Self::DetailedErrors),
            5 => Some(Self::BufferBytesSize),
            _ => None,
        }
    }
}

/// BLOB identity policy: who assigns the client-visible id of each BLOB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlobPolicy {
    /// Batch carries no inline BLOBs.
    #[default]
    None,
    /// The session generates client ids.
    Engine,
    /// The caller supplies client ids.
    User,
    /// Ids are embedded in a caller-framed BLOB stream.
    Stream,
}

impl BlobPolicy {
    /// Decode the policy integer; unknown values decay to `None`.
    #[must_use]
    pub const fn from_int(value: i32) -> Self {
        match value {
            1 => Self::Engine,
            2 => Self::User,
            3 => Self::Stream,
            _ => Self::None,
        }
    }

    /// Wire integer of this policy.
    #[must_use]
    pub const fn as_int(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Engine => 1,
            Self::User => 2,
            Self::Stream => 3,
        }
    }

    /// Short lowercase name, used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Engine => "engine",
            Self::User => "user",
            Self::Stream => "stream",
        }
    }
}

impl fmt::Display for BlobPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded parameter entry.
#[derive(Debug, Clone, Copy)]
pub struct ParamEntry<'a> {
    /// Raw tag byte (possibly unknown to this version).
    pub tag: u8,
    payload: &'a [u8],
}

impl ParamEntry<'_> {
    /// Interpret the payload as a 4-byte little-endian signed integer.
    pub fn as_int(&self) -> Result<i32> {
        let bytes: [u8; 4] = self.payload.try_into().map_err(|_| {
            EmberError::malformed_params(format!(
                "tag {} payload is {} bytes, expected 4",
                self.tag,
                self.payload.len()
            ))
        })?;
        Ok(i32::from_le_bytes(bytes))
    }
}

/// Streaming reader over a tagged parameter block.
///
/// An empty block is valid and yields no entries. Iteration returns
/// `Err` once on a truncated entry and then stops.
#[derive(Debug)]
pub struct ParamReader<'a> {
    rest: &'a [u8],
    poisoned: bool,
}

impl<'a> ParamReader<'a> {
    /// Open a block, checking the version byte.
    pub fn new(block: &'a [u8]) -> Result<Self> {
        let rest = match block.split_first() {
            None => &[][..],
            Some((&version, rest)) => {
                if version != PARAM_VERSION_1 {
                    return Err(EmberError::InvalidParamVersion { got: version });
                }
                rest
            }
        };
        Ok(Self {
            rest,
            poisoned: false,
        })
    }
}

impl<'a> Iterator for ParamReader<'a> {
    type Item = Result<ParamEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.poisoned || self.rest.is_empty() {
            return None;
        }
        if self.rest.len() < 5 {
            self.poisoned = true;
            return Some(Err(EmberError::malformed_params(format!(
                "truncated entry header ({} bytes left)",
                self.rest.len()
            ))));
        }
        let tag = self.rest[0];
        let len = u32::from_le_bytes([self.rest[1], self.rest[2], self.rest[3], self.rest[4]])
            as usize;
        if self.rest.len() < 5 + len {
            self.poisoned = true;
            return Some(Err(EmberError::malformed_params(format!(
                "tag {tag} declares {len} payload bytes, {} left",
                self.rest.len() - 5
            ))));
        }
        let payload = &self.rest[5..5 + len];
        self.rest = &self.rest[5 + len..];
        Some(Ok(ParamEntry { tag, payload }))
    }
}

/// Builder for a tagged parameter block.
#[derive(Debug, Default)]
pub struct ParamWriter {
    buf: Vec<u8>,
}

impl ParamWriter {
    /// Start a block with the current version byte.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: vec![PARAM_VERSION_1],
        }
    }

    /// Append an integer-valued entry.
    #[must_use]
    pub fn push_int(mut self, tag: ParamTag, value: i32) -> Self {
        self.buf.push(tag as u8);
        self.buf.extend_from_slice(&4u32.to_le_bytes());
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Append a raw entry under an arbitrary tag byte.
    #[must_use]
    pub fn push_raw(mut self, tag: u8, payload: &[u8]) -> Self {
        self.buf.push(tag);
        self.buf
            .extend_from_slice(&u32::try_from(payload.len()).unwrap_or(u32::MAX).to_le_bytes());
        self.buf.extend_from_slice(payload);
        self
    }

    /// Finish and take the encoded block.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_block_yields_nothing() {
        let mut reader = ParamReader::new(&[]).unwrap();
        assert!(reader.next().is_none());
    }

    #[test]
    fn version_byte_checked() {
        let err = ParamReader::new(&[9]).unwrap_err();
        assert!(matches!(err, EmberError::InvalidParamVersion { got: 9 }));
    }

    #[test]
    fn round_trip_entries() {
        let block = ParamWriter::new()
            .push_int(ParamTag::MultiError, 1)
            .push_int(ParamTag::BufferBytesSize, 65536)
            .finish();

        let entries: Vec<_> = ParamReader::new(&block)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tag, ParamTag::MultiError as u8);
        assert_eq!(entries[0].as_int().unwrap(), 1);
        assert_eq!(entries[1].tag, ParamTag::BufferBytesSize as u8);
        assert_eq!(entries[1].as_int().unwrap(), 65536);
    }

    #[test]
    fn unknown_tags_survive_reading() {
        let block = ParamWriter::new().push_raw(200, &[1, 2, 3]).finish();
        let entries: Vec<_> = ParamReader::new(&block)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tag, 200);
        assert!(entries[0].as_int().is_err());
    }

    #[test]
    fn truncated_entry_poisons_reader() {
        let mut block = ParamWriter::new().push_int(ParamTag::BlobIds, 3).finish();
        block.truncate(block.len() - 2);

        let mut reader = ParamReader::new(&block).unwrap();
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn blob_policy_decoding() {
        assert_eq!(BlobPolicy::from_int(0), BlobPolicy::None);
        assert_eq!(BlobPolicy::from_int(1), BlobPolicy::Engine);
        assert_eq!(BlobPolicy::from_int(2), BlobPolicy::User);
        assert_eq!(BlobPolicy::from_int(3), BlobPolicy::Stream);
        // Unknown values decay to None rather than erroring.
        assert_eq!(BlobPolicy::from_int(77), BlobPolicy::None);
        assert_eq!(BlobPolicy::from_int(-1), BlobPolicy::None);
    }

    #[test]
    fn tag_decoding() {
        assert_eq!(ParamTag::from_u8(1), Some(ParamTag::MultiError));
        assert_eq!(ParamTag::from_u8(5), Some(ParamTag::BufferBytesSize));
        assert_eq!(ParamTag::from_u8(99), None);
    }
}
