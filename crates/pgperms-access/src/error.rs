//! Error types for `pgperms-access`.
//!
//! Every variant carries enough context (the failing SQL, the database
//! name) to diagnose a failure without a debugger, matching the taxonomy of
//! connectivity / catalog-query / plan-execution errors.

/// Errors surfaced by a [`crate::ClusterAccess`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// Establishing or acquiring a connection to the cluster failed.
    #[error("failed to connect to database {database:?}: {reason}")]
    Connect { database: String, reason: String },

    /// A catalog query failed. Carries the failing SQL for diagnosis.
    #[error("catalog query failed in database {database:?}: {reason}\n  query: {sql}")]
    Query {
        database: String,
        sql: String,
        reason: String,
    },

    /// Executing a plan statement failed. Fatal: the caller does not retry
    /// or roll back already-applied statements.
    #[error("failed to execute statement in database {database:?}: {reason}\n  statement: {sql}")]
    Execute {
        database: String,
        sql: String,
        reason: String,
    },
}
