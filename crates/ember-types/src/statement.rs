use std::fmt;

/// The compiled type of a prepared statement, as reported by the compiler.
///
/// Only the subset relevant to batch gating is enumerated; everything the
/// batch cannot use collapses into the rejection path of
/// [`StatementKind::is_batchable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Row-returning query.
    Select,
    /// INSERT statement.
    Insert,
    /// UPDATE statement.
    Update,
    /// DELETE statement.
    Delete,
    /// EXECUTE PROCEDURE statement.
    ExecProcedure,
    /// EXECUTE BLOCK statement.
    ExecBlock,
    /// Schema-changing statement.
    Ddl,
    /// Transaction control (COMMIT / ROLLBACK / SET TRANSACTION).
    TransactionControl,
}

impl StatementKind {
    /// Whether a batch may be opened against a statement of this kind.
    ///
    /// Batches are sinks for parameter tuples, so only data-modification
    /// statements (and executable procedures/blocks) qualify.
    #[must_use]
    pub const fn is_batchable(self) -> bool {
        matches!(
            self,
            Self::Insert | Self::Update | Self::Delete | Self::ExecProcedure | Self::ExecBlock
        )
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::ExecProcedure => "EXECUTE PROCEDURE",
            Self::ExecBlock => "EXECUTE BLOCK",
            Self::Ddl => "DDL",
            Self::TransactionControl => "transaction control",
        };
        f.write_str(name)
    }
}

/// Snapshot of a prepared statement's state, taken by the caller at the
/// moment a batch is opened.
///
/// The batch session gates on this snapshot and never calls back into the
/// statement object; keeping the statement consistent afterwards (e.g.
/// marking the batch attached) is the caller's job.
#[derive(Debug, Clone)]
pub struct StatementProfile {
    /// Compiled statement type.
    pub kind: StatementKind,
    /// Whether the statement has been prepared.
    pub prepared: bool,
    /// Whether the statement handle lost its compiled request.
    pub orphan: bool,
    /// Whether a cursor is currently open on the statement.
    pub cursor_open: bool,
    /// Whether a batch is already attached to the statement.
    pub batch_active: bool,
    /// Number of input parameters in the statement's message.
    pub parameter_count: usize,
}

impl StatementProfile {
    /// A prepared, idle statement of the given kind and parameter count.
    /// The flags default to the state in which opening a batch is legal.
    #[must_use]
    pub const fn new(kind: StatementKind, parameter_count: usize) -> Self {
        Self {
            kind,
            prepared: true,
            orphan: false,
            cursor_open: false,
            batch_active: false,
            parameter_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batchable_kinds() {
        assert!(StatementKind::Insert.is_batchable());
        assert!(StatementKind::Update.is_batchable());
        assert!(StatementKind::Delete.is_batchable());
        assert!(StatementKind::ExecProcedure.is_batchable());
        assert!(StatementKind::ExecBlock.is_batchable());

        assert!(!StatementKind::Select.is_batchable());
        assert!(!StatementKind::Ddl.is_batchable());
        assert!(!StatementKind::TransactionControl.is_batchable());
    }

    #[test]
    fn profile_defaults_are_open_legal() {
        let profile = StatementProfile::new(StatementKind::Insert, 2);
        assert!(profile.prepared);
        assert!(!profile.orphan);
        assert!(!profile.cursor_open);
        assert!(!profile.batch_active);
        assert_eq!(profile.parameter_count, 2);
    }
}
