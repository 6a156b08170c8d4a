//! The diff-and-plan engine for reconciling PostgreSQL cluster-wide access
//! control: given a [`pgperms_access::ClusterAccess`] and a desired-state
//! YAML document, decide which statements bring the cluster in line and
//! hand them to a [`pgperms_access::SyncSink`].
//!
//! This crate never opens a socket and never imports `sqlx` (even
//! transitively — see `pgperms-access`'s `postgres-backend` feature); it is
//! a pure function from `(Config, ObservedCluster)` to a sequence of SQL
//! statements, so it can be fully exercised against
//! [`pgperms_access::MemoryAccess`] without a live cluster.

mod diff;
mod error;
mod escape;
mod expand;
mod gather;
mod model;
mod password;
mod privmerge;
mod sync;
mod validate;

pub use error::{CoreError, ValidationError};
pub use gather::{dump, gather as gather_config};
pub use model::{Config, GenericPrivilege, PrivilegeSet, RoleAttributes, TargetKind};
pub use password::verify_password;
pub use sync::sync;
pub use validate::validate_config;
