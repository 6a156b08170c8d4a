//! The cluster access trait.
//!
//! `ClusterAccess` is the narrow query/exec facade the spec calls the
//! "Cluster Access Interface" — the core diff engine consumes only this
//! trait and never opens a socket itself, mirroring how `zvault-core`'s
//! `Barrier` consumes only `StorageBackend` and never touches a specific
//! backend. Row types returned here are deliberately primitive (raw catalog
//! columns); normalizing them into the domain model (`Role`,
//! `GenericPrivilege`, ...) is `pgperms-core`'s job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AccessError;

/// One row from `pg_authid` (plus membership rows merged in separately).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRow {
    pub name: String,
    /// Raw `rolpassword`, `None` if the role has no password set.
    pub password: Option<String>,
    pub superuser: bool,
    pub inherit: bool,
    pub createrole: bool,
    pub createdb: bool,
    pub canlogin: bool,
    pub replication: bool,
    pub bypassrls: bool,
    /// Raw `rolconnlimit`; `-1` means unlimited.
    pub connlimit: i32,
    pub validuntil: Option<DateTime<Utc>>,
}

/// One row of an `aclexplode()`d ACL on an object identified only by name
/// (used for databases and schemas, which have no further disambiguator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclRow {
    pub target: String,
    pub grantee: String,
    pub privilege: String,
    pub grantable: bool,
}

/// One row of an `aclexplode()`d ACL on a `pg_class` relation, carrying the
/// `relkind` needed to disambiguate tables from sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassAclRow {
    pub schema: String,
    pub name: String,
    /// `pg_class.relkind`: `r`/`v`/`m`/`f` are tables, `S` is a sequence.
    pub relkind: char,
    pub grantee: String,
    pub privilege: String,
    pub grantable: bool,
}

/// The query/exec facade the diff engine gathers state through and emits
/// plan statements through (in `--apply` mode).
///
/// Implementations must be safe to share across async tasks.
#[async_trait]
pub trait ClusterAccess: Send + Sync {
    /// `SELECT datname FROM pg_database WHERE datallowconn`.
    async fn fetch_databases(&self) -> Result<Vec<String>, AccessError>;

    /// Non-system schemas in `database` (`pg_namespace`, filtered per the
    /// spec's exclusion list).
    async fn fetch_schemas(&self, database: &str) -> Result<Vec<String>, AccessError>;

    /// All roles from `pg_authid`, excluding `pg_`-prefixed reserved roles.
    async fn fetch_roles(&self) -> Result<Vec<RoleRow>, AccessError>;

    /// `(parent, member)` pairs from `pg_auth_members`.
    async fn fetch_role_memberships(&self) -> Result<Vec<(String, String)>, AccessError>;

    /// Exploded `datacl` rows, restricted to the given roles/databases when
    /// those lists are non-empty.
    async fn fetch_database_acl(
        &self,
        interesting_roles: &[String],
        interesting_databases: &[String],
    ) -> Result<Vec<AclRow>, AccessError>;

    /// Exploded `nspacl` rows for `database`, restricted to the given roles
    /// when non-empty.
    async fn fetch_schema_acl(
        &self,
        database: &str,
        interesting_roles: &[String],
    ) -> Result<Vec<AclRow>, AccessError>;

    /// Exploded `relacl` rows for `database`, restricted to the given roles
    /// when non-empty. Covers both tables and sequences; the caller
    /// disambiguates via `ClassAclRow::relkind`.
    async fn fetch_class_acl(
        &self,
        database: &str,
        interesting_roles: &[String],
    ) -> Result<Vec<ClassAclRow>, AccessError>;

    /// `(schema, name)` pairs for relations of the given `pg_class.relkind`s
    /// within `schemas`, used to expand `db.schema.*` wildcards.
    async fn fetch_class_names(
        &self,
        database: &str,
        schemas: &[String],
        kinds: &[char],
    ) -> Result<Vec<(String, String)>, AccessError>;

    /// Execute a plan statement against `database` ("" means the primary
    /// connection; used for cluster-wide statements like `CREATE ROLE`).
    /// Runs autocommit, outside any transaction.
    async fn execute(&self, database: &str, sql: &str) -> Result<(), AccessError>;

    /// Drop any cached connection to `database`, if one is held. Must be
    /// called before executing a `DROP DATABASE` statement against it —
    /// Postgres refuses to drop a database another session is connected
    /// to, and `gather` opens exactly such a connection for every database
    /// being compared, including ones about to be tombstoned. A no-op for
    /// backends that don't cache per-database connections.
    async fn close_database(&self, database: &str);
}
