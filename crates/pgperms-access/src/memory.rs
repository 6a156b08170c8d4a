//! In-memory cluster state for testing the diff engine without a live
//! Postgres cluster.
//!
//! Holds the same shapes [`crate::ClusterAccess`] exposes, but as plain
//! `Vec`s behind an `RwLock`, so tests can assert against the exact
//! statements the diff engine emits for a hand-built starting state.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::access::{AclRow, ClassAclRow, ClusterAccess, RoleRow};
use crate::error::AccessError;

#[derive(Debug, Default, Clone)]
struct State {
    databases: Vec<String>,
    schemas: std::collections::HashMap<String, Vec<String>>,
    roles: Vec<RoleRow>,
    memberships: Vec<(String, String)>,
    database_acl: Vec<AclRow>,
    schema_acl: std::collections::HashMap<String, Vec<AclRow>>,
    class_acl: std::collections::HashMap<String, Vec<ClassAclRow>>,
    class_names: std::collections::HashMap<String, Vec<(String, char, String, String)>>,
    executed: Vec<(String, String)>,
}

/// A hand-buildable stand-in for a live cluster.
///
/// Cloning shares state (it is an `Arc<RwLock<_>>` underneath), so a test can
/// hold one handle to assert on `executed()` after handing another clone to
/// the code under test.
#[derive(Debug, Default, Clone)]
pub struct MemoryAccess {
    state: Arc<RwLock<State>>,
}

impl MemoryAccess {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style: add `database` to the set `fetch_databases` returns.
    pub async fn with_database(self, database: impl Into<String>) -> Self {
        self.state.write().await.databases.push(database.into());
        self
    }

    /// Builder-style: declare `schema` as present in `database`.
    pub async fn with_schema(self, database: impl Into<String>, schema: impl Into<String>) -> Self {
        self.state
            .write()
            .await
            .schemas
            .entry(database.into())
            .or_default()
            .push(schema.into());
        self
    }

    pub async fn with_role(self, role: RoleRow) -> Self {
        self.state.write().await.roles.push(role);
        self
    }

    pub async fn with_membership(self, parent: impl Into<String>, member: impl Into<String>) -> Self {
        self.state
            .write()
            .await
            .memberships
            .push((parent.into(), member.into()));
        self
    }

    pub async fn with_database_acl(self, row: AclRow) -> Self {
        self.state.write().await.database_acl.push(row);
        self
    }

    pub async fn with_schema_acl(self, database: impl Into<String>, row: AclRow) -> Self {
        self.state
            .write()
            .await
            .schema_acl
            .entry(database.into())
            .or_default()
            .push(row);
        self
    }

    pub async fn with_class_acl(self, database: impl Into<String>, row: ClassAclRow) -> Self {
        self.state
            .write()
            .await
            .class_acl
            .entry(database.into())
            .or_default()
            .push(row);
        self
    }

    /// Declare a relation existing in `database.schema` for wildcard
    /// expansion, with the given `pg_class.relkind`.
    pub async fn with_relation(
        self,
        database: impl Into<String>,
        schema: impl Into<String>,
        relkind: char,
        name: impl Into<String>,
    ) -> Self {
        self.state
            .write()
            .await
            .class_names
            .entry(database.into())
            .or_default()
            .push((schema.into(), relkind, String::new(), name.into()));
        self
    }

    /// Every statement passed to `execute`, in call order, with the database
    /// it targeted.
    pub async fn executed(&self) -> Vec<(String, String)> {
        self.state.read().await.executed.clone()
    }
}

#[async_trait]
impl ClusterAccess for MemoryAccess {
    async fn fetch_databases(&self) -> Result<Vec<String>, AccessError> {
        Ok(self.state.read().await.databases.clone())
    }

    async fn fetch_schemas(&self, database: &str) -> Result<Vec<String>, AccessError> {
        Ok(self
            .state
            .read()
            .await
            .schemas
            .get(database)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_roles(&self) -> Result<Vec<RoleRow>, AccessError> {
        Ok(self.state.read().await.roles.clone())
    }

    async fn fetch_role_memberships(&self) -> Result<Vec<(String, String)>, AccessError> {
        Ok(self.state.read().await.memberships.clone())
    }

    async fn fetch_database_acl(
        &self,
        interesting_roles: &[String],
        interesting_databases: &[String],
    ) -> Result<Vec<AclRow>, AccessError> {
        let state = self.state.read().await;
        Ok(state
            .database_acl
            .iter()
            .filter(|row| interesting_roles.is_empty() || interesting_roles.contains(&row.grantee))
            .filter(|row| interesting_databases.is_empty() || interesting_databases.contains(&row.target))
            .cloned()
            .collect())
    }

    async fn fetch_schema_acl(
        &self,
        database: &str,
        interesting_roles: &[String],
    ) -> Result<Vec<AclRow>, AccessError> {
        let state = self.state.read().await;
        Ok(state
            .schema_acl
            .get(database)
            .into_iter()
            .flatten()
            .filter(|row| interesting_roles.is_empty() || interesting_roles.contains(&row.grantee))
            .cloned()
            .collect())
    }

    async fn fetch_class_acl(
        &self,
        database: &str,
        interesting_roles: &[String],
    ) -> Result<Vec<ClassAclRow>, AccessError> {
        let state = self.state.read().await;
        Ok(state
            .class_acl
            .get(database)
            .into_iter()
            .flatten()
            .filter(|row| interesting_roles.is_empty() || interesting_roles.contains(&row.grantee))
            .cloned()
            .collect())
    }

    async fn fetch_class_names(
        &self,
        database: &str,
        schemas: &[String],
        kinds: &[char],
    ) -> Result<Vec<(String, String)>, AccessError> {
        let state = self.state.read().await;
        Ok(state
            .class_names
            .get(database)
            .into_iter()
            .flatten()
            .filter(|(schema, relkind, _, _)| schemas.contains(schema) && kinds.contains(relkind))
            .map(|(schema, _, _, name)| (schema.clone(), name.clone()))
            .collect())
    }

    async fn execute(&self, database: &str, sql: &str) -> Result<(), AccessError> {
        self.state
            .write()
            .await
            .executed
            .push((database.to_owned(), sql.to_owned()));
        Ok(())
    }

    async fn close_database(&self, _database: &str) {
        // No connection cache to evict — every query is recorded in-memory.
    }
}
