use thiserror::Error;

/// Primary error type for emberdb batch operations.
///
/// Structured variants for every failure a batch session can surface,
/// each carrying enough context to build a useful client diagnostic.
#[derive(Error, Debug)]
pub enum EmberError {
    // === Session construction ===
    /// The statement's parameter message does not fit the in-memory tier.
    #[error("message length {length} exceeds internal batch buffer ({limit} bytes)")]
    MessageTooLong { length: usize, limit: usize },

    /// The batch parameters block carries an unsupported version tag.
    #[error("invalid version tag {got} in batch parameters block")]
    InvalidParamVersion { got: u8 },

    /// The batch parameters block is structurally broken (truncated entry).
    #[error("malformed batch parameters block: {detail}")]
    MalformedParamBlock { detail: String },

    // === Open-time statement gating ===
    /// A cursor is already open on the statement.
    #[error("statement already has an open cursor")]
    CursorAlreadyOpen,

    /// A batch is already attached to the statement.
    #[error("statement already has an active batch")]
    BatchAlreadyActive,

    /// The statement was never prepared.
    #[error("statement is not prepared")]
    UnpreparedStatement,

    /// The statement handle is detached from its compiled request.
    #[error("invalid statement handle")]
    OrphanStatement,

    /// Only data-modification statements may be batched.
    #[error("invalid type of statement used in batch: {kind}")]
    WrongStatementType { kind: String },

    /// A batched statement must accept at least one parameter.
    #[error("statement used in batch must have parameters")]
    StatementWithoutParameters,

    // === BLOB sub-protocol ===
    /// A BLOB entry point was called but the statement declares no BLOB
    /// parameters.
    #[error("there are no BLOB parameters in the associated statement")]
    NoBlobsDeclared,

    /// The entry point is not admitted under the configured BLOB identity
    /// policy.
    #[error("{call} cannot be used with the current BLOB identity policy ({policy})")]
    PolicyMismatch {
        call: &'static str,
        policy: &'static str,
    },

    /// `append_blob_data` was called with no growable BLOB in the batch.
    #[error("append_blob_data extends the last BLOB but no BLOB was added to the batch")]
    NoLastBlob,

    /// A BLOB stream portion must be a whole number of alignment units.
    #[error("BLOB stream portion of {length} bytes is not a multiple of the stream alignment")]
    BadStreamAlignment { length: usize },

    /// The same client BLOB id was declared twice.
    #[error("duplicate BLOB id {id} in batch")]
    DuplicateBlobId { id: String },

    /// A message references a BLOB id that was never materialized.
    #[error("unknown BLOB id {id} in batch message")]
    UnknownBlobId { id: String },

    // === Buffering ===
    /// A put would grow a batch buffer past its configured limit.
    #[error("batch buffer overflow: {requested} bytes over the {limit}-byte limit")]
    BufferOverflow { requested: u64, limit: u64 },

    /// Unconsumable bytes remained in the BLOB buffer after the drain.
    #[error("unusable data ({remains} bytes) remained in batch BLOB buffer")]
    StreamLeftover { remains: usize },

    /// Unconsumable bytes remained in the message buffer after the drain.
    #[error("unusable data ({remains} bytes) remained in batch message buffer")]
    MessageLeftover { remains: usize },

    // === Environment ===
    /// Spill file I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by the engine across a consumed interface
    /// (statement executor or BLOB store).
    #[error("engine error: {detail}")]
    Engine { detail: String },

    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// SQL error codes surfaced to clients, matching the classic DSQL numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum SqlCode {
    /// General invalid-usage error.
    InvalidUsage = -104,
    /// Cursor/batch conflict on the statement.
    CursorConflict = -502,
    /// Statement was not prepared.
    Unprepared = -504,
    /// Bad statement handle or statement/batch mismatch.
    BadRequest = -901,
    /// Engine-side or environmental failure.
    EngineFailure = -902,
}

impl EmberError {
    /// Map this error to the SQL code reported alongside it.
    pub const fn sql_code(&self) -> SqlCode {
        match self {
            Self::CursorAlreadyOpen | Self::BatchAlreadyActive => SqlCode::CursorConflict,
            Self::UnpreparedStatement => SqlCode::Unprepared,
            Self::OrphanStatement
            | Self::WrongStatementType { .. }
            | Self::StatementWithoutParameters => SqlCode::BadRequest,
            Self::Io(_) | Self::Engine { .. } | Self::Internal(_) => SqlCode::EngineFailure,
            _ => SqlCode::InvalidUsage,
        }
    }

    /// Whether the failure belongs to a single row rather than the batch as
    /// a whole. Row-scoped errors are recorded in the completion state; the
    /// rest abort `execute`.
    pub const fn is_row_scoped(&self) -> bool {
        matches!(self, Self::UnknownBlobId { .. } | Self::Engine { .. })
    }

    /// Create an engine-failure error.
    pub fn engine(detail: impl Into<String>) -> Self {
        Self::Engine {
            detail: detail.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a malformed-parameter-block error.
    pub fn malformed_params(detail: impl Into<String>) -> Self {
        Self::MalformedParamBlock {
            detail: detail.into(),
        }
    }
}

/// Result type alias using `EmberError`.
pub type Result<T> = std::result::Result<T, EmberError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = EmberError::MessageTooLong {
            length: 200_000,
            limit: 131_072,
        };
        assert_eq!(
            err.to_string(),
            "message length 200000 exceeds internal batch buffer (131072 bytes)"
        );
    }

    #[test]
    fn error_display_policy_mismatch() {
        let err = EmberError::PolicyMismatch {
            call: "add_blob_stream",
            policy: "engine",
        };
        assert_eq!(
            err.to_string(),
            "add_blob_stream cannot be used with the current BLOB identity policy (engine)"
        );
    }

    #[test]
    fn sql_code_mapping() {
        assert_eq!(
            EmberError::CursorAlreadyOpen.sql_code(),
            SqlCode::CursorConflict
        );
        assert_eq!(
            EmberError::BatchAlreadyActive.sql_code(),
            SqlCode::CursorConflict
        );
        assert_eq!(
            EmberError::UnpreparedStatement.sql_code(),
            SqlCode::Unprepared
        );
        assert_eq!(EmberError::OrphanStatement.sql_code(), SqlCode::BadRequest);
        assert_eq!(
            EmberError::StatementWithoutParameters.sql_code(),
            SqlCode::BadRequest
        );
        assert_eq!(
            EmberError::BufferOverflow {
                requested: 1,
                limit: 0
            }
            .sql_code(),
            SqlCode::InvalidUsage
        );
        assert_eq!(EmberError::NoLastBlob.sql_code(), SqlCode::InvalidUsage);
        assert_eq!(
            EmberError::engine("send failed").sql_code(),
            SqlCode::EngineFailure
        );
    }

    #[test]
    fn sql_code_values() {
        assert_eq!(SqlCode::InvalidUsage as i32, -104);
        assert_eq!(SqlCode::CursorConflict as i32, -502);
        assert_eq!(SqlCode::Unprepared as i32, -504);
        assert_eq!(SqlCode::BadRequest as i32, -901);
        assert_eq!(SqlCode::EngineFailure as i32, -902);
    }

    #[test]
    fn row_scoped_errors() {
        assert!(EmberError::UnknownBlobId { id: "0:7".into() }.is_row_scoped());
        assert!(EmberError::engine("constraint violated").is_row_scoped());
        assert!(!EmberError::NoLastBlob.is_row_scoped());
        assert!(!EmberError::StreamLeftover { remains: 3 }.is_row_scoped());
    }

    #[test]
    fn io_error_from() {
        let io_err = std::io::Error::other("disk gone");
        let err: EmberError = io_err.into();
        assert!(matches!(err, EmberError::Io(_)));
        assert_eq!(err.sql_code(), SqlCode::EngineFailure);
    }

    #[test]
    fn convenience_constructors() {
        let err = EmberError::internal("unexpected decoder state");
        assert!(matches!(err, EmberError::Internal(msg) if msg == "unexpected decoder state"));

        let err = EmberError::malformed_params("entry truncated at byte 9");
        assert!(matches!(err, EmberError::MalformedParamBlock { detail } if detail.contains("byte 9")));
    }
}
