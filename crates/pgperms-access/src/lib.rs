//! Cluster access trait, connection pooling, and plan-recording sink.
//!
//! This crate is the only place a catalog query or a plan statement touches
//! a wire protocol. `pgperms-core` depends on it for the [`ClusterAccess`]
//! trait and the [`SyncSink`] trait, but never imports `sqlx` itself —
//! the same separation `zvault-core` keeps from `zvault-storage`.

mod access;
mod error;
#[cfg(feature = "postgres-backend")]
mod pool;
mod sink;

pub mod memory;
#[cfg(feature = "postgres-backend")]
pub mod postgres;

pub use access::{AclRow, ClassAclRow, ClusterAccess, RoleRow};
pub use error::AccessError;
pub use memory::MemoryAccess;
#[cfg(feature = "postgres-backend")]
pub use pool::ClusterPool;
#[cfg(feature = "postgres-backend")]
pub use postgres::PgClusterAccess;
pub use sink::{QueryForDatabase, Recorder, SyncSink};
