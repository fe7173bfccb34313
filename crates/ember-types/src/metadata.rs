use ember_error::{EmberError, Result};

/// Kind of a single parameter field, as far as the batch cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain inline value; copied through untouched.
    Scalar,
    /// Large object referenced by a [`crate::BlobId`] in the message.
    Blob,
    /// Array value; carried by blob id exactly like a BLOB.
    Array,
}

impl FieldKind {
    /// Whether the field's message slot holds a blob id needing translation.
    #[must_use]
    pub const fn carries_blob_id(self) -> bool {
        matches!(self, Self::Blob | Self::Array)
    }
}

/// Tuple-layout provider for one prepared statement's parameter message.
///
/// Implemented by the message-metadata subsystem; the batch session scans it
/// once at open time. All offsets are in bytes from the start of a tuple.
///
/// Layout invariants the provider must uphold:
/// `aligned_length() % alignment() == 0`, `aligned_length() >=
/// message_length()`, and `field_offset(i) % alignment() == 0` for every
/// field whose kind carries a blob id.
pub trait MessageMetadata {
    /// Exact byte length of one parameter tuple.
    fn message_length(&self) -> usize;

    /// Tuple stride: `message_length` rounded up to the alignment.
    fn aligned_length(&self) -> usize;

    /// Required tuple alignment, one of 1, 2, 4, 8.
    fn alignment(&self) -> usize;

    /// Number of parameter fields.
    fn field_count(&self) -> usize;

    /// Kind of field `index`.
    fn field_kind(&self, index: usize) -> FieldKind;

    /// Byte offset of field `index`'s value slot.
    fn field_offset(&self, index: usize) -> usize;

    /// Byte offset of field `index`'s 16-bit null indicator.
    fn null_offset(&self, index: usize) -> usize;
}

/// Self-contained [`MessageMetadata`] for fixed layouts.
///
/// The production metadata provider lives with the statement compiler; this
/// implementation serves embedded callers and tests.
#[derive(Debug, Clone)]
pub struct FixedMetadata {
    message_length: usize,
    aligned_length: usize,
    alignment: usize,
    fields: Vec<FieldSlot>,
}

/// One field entry of a [`FixedMetadata`].
#[derive(Debug, Clone, Copy)]
pub struct FieldSlot {
    /// Field kind.
    pub kind: FieldKind,
    /// Value slot offset.
    pub offset: usize,
    /// Null indicator offset.
    pub null_offset: usize,
}

impl FixedMetadata {
    /// Build a layout descriptor, validating the alignment invariants.
    pub fn new(
        message_length: usize,
        alignment: usize,
        fields: Vec<FieldSlot>,
    ) -> Result<Self> {
        if !matches!(alignment, 1 | 2 | 4 | 8) {
            return Err(EmberError::internal(format!(
                "unsupported message alignment {alignment}"
            )));
        }
        let aligned_length = message_length.div_ceil(alignment) * alignment;
        for slot in &fields {
            if slot.kind.carries_blob_id() && slot.offset % alignment != 0 {
                return Err(EmberError::internal(format!(
                    "blob field offset {} breaks message alignment {alignment}",
                    slot.offset
                )));
            }
            if slot.offset >= message_length || slot.null_offset + 2 > message_length {
                return Err(EmberError::internal(format!(
                    "field slot {slot:?} lies outside the {message_length}-byte message"
                )));
            }
        }
        Ok(Self {
            message_length,
            aligned_length,
            alignment,
            fields,
        })
    }
}

impl MessageMetadata for FixedMetadata {
    fn message_length(&self) -> usize {
        self.message_length
    }

    fn aligned_length(&self) -> usize {
        self.aligned_length
    }

    fn alignment(&self) -> usize {
        self.alignment
    }

    fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn field_kind(&self, index: usize) -> FieldKind {
        self.fields[index].kind
    }

    fn field_offset(&self, index: usize) -> usize {
        self.fields[index].offset
    }

    fn null_offset(&self, index: usize) -> usize {
        self.fields[index].null_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_length_rounds_up() {
        let meta = FixedMetadata::new(12, 8, Vec::new()).unwrap();
        assert_eq!(meta.message_length(), 12);
        assert_eq!(meta.aligned_length(), 16);
        assert_eq!(meta.alignment(), 8);
    }

    #[test]
    fn exact_multiple_keeps_length() {
        let meta = FixedMetadata::new(16, 8, Vec::new()).unwrap();
        assert_eq!(meta.aligned_length(), 16);
    }

    #[test]
    fn rejects_misaligned_blob_field() {
        let err = FixedMetadata::new(
            24,
            8,
            vec![FieldSlot {
                kind: FieldKind::Blob,
                offset: 4,
                null_offset: 20,
            }],
        )
        .unwrap_err();
        assert!(err.to_string().contains("alignment"));
    }

    #[test]
    fn rejects_out_of_range_slot() {
        assert!(FixedMetadata::new(
            8,
            4,
            vec![FieldSlot {
                kind: FieldKind::Scalar,
                offset: 8,
                null_offset: 4,
            }],
        )
        .is_err());
    }

    #[test]
    fn scalar_fields_may_be_unaligned() {
        let meta = FixedMetadata::new(
            16,
            8,
            vec![FieldSlot {
                kind: FieldKind::Scalar,
                offset: 3,
                null_offset: 12,
            }],
        )
        .unwrap();
        assert_eq!(meta.field_count(), 1);
        assert!(!meta.field_kind(0).carries_blob_id());
    }
}
