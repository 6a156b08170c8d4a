//! The real `sqlx`-backed [`ClusterAccess`] implementation.
//!
//! All catalog SQL lives in this file; nothing outside `pgperms-access`
//! knows that Postgres is queried over the wire at all, mirroring how
//! `vaultrs-storage::PostgresBackend` is the only place `sqlx` appears in
//! that crate family.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnectOptions;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::access::{AclRow, ClassAclRow, ClusterAccess, RoleRow};
use crate::error::AccessError;
use crate::pool::ClusterPool;

const NON_SYSTEM_SCHEMAS: &str = "nspname NOT IN ('pg_catalog', 'information_schema', 'pg_toast') \
     AND nspname NOT LIKE 'pg_temp\\_%' AND nspname NOT LIKE 'pg_toast_temp\\_%'";

/// A [`ClusterAccess`] backed by a live Postgres cluster, reachable through
/// one primary connection plus a [`ClusterPool`] of lazily-opened per-database
/// connections for schema/table/sequence catalog queries.
pub struct PgClusterAccess {
    pool: ClusterPool,
}

impl PgClusterAccess {
    /// Connect to the cluster named in `options` and use that connection as
    /// the primary (cluster-wide) connection.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Connect`] if the primary connection cannot be
    /// established.
    pub async fn connect(options: PgConnectOptions) -> Result<Self, AccessError> {
        let database = options.get_database().unwrap_or_default().to_owned();
        let primary = sqlx::postgres::PgPoolOptions::new()
            .max_connections(4)
            .connect_with(options.clone())
            .await
            .map_err(|e| AccessError::Connect {
                database,
                reason: e.to_string(),
            })?;
        Ok(Self {
            pool: ClusterPool::new(options, primary),
        })
    }

    async fn connection_for(&self, database: &str) -> Result<PgPool, AccessError> {
        self.pool.get(database).await
    }

    /// Release a per-database connection borrowed for the duration of one
    /// catalog query.
    async fn release(&self, database: &str) {
        self.pool.release(database).await;
    }
}

#[async_trait]
impl ClusterAccess for PgClusterAccess {
    async fn fetch_databases(&self) -> Result<Vec<String>, AccessError> {
        const SQL: &str = "SELECT datname FROM pg_catalog.pg_database WHERE datallowconn";
        let rows = sqlx::query(SQL)
            .fetch_all(&self.connection_for("").await?)
            .await
            .map_err(|e| query_err("", SQL, e))?;
        Ok(rows.into_iter().map(|row| row.get("datname")).collect())
    }

    async fn fetch_schemas(&self, database: &str) -> Result<Vec<String>, AccessError> {
        let sql = format!("SELECT nspname FROM pg_catalog.pg_namespace WHERE {NON_SYSTEM_SCHEMAS}");
        let conn = self.connection_for(database).await?;
        let rows = sqlx::query(&sql)
            .fetch_all(&conn)
            .await
            .map_err(|e| query_err(database, &sql, e));
        self.release(database).await;
        Ok(rows?.into_iter().map(|row| row.get("nspname")).collect())
    }

    async fn fetch_roles(&self) -> Result<Vec<RoleRow>, AccessError> {
        const SQL: &str = "SELECT rolname, rolpassword, rolsuper, rolinherit, rolcreaterole, \
             rolcreatedb, rolcanlogin, rolreplication, rolbypassrls, rolconnlimit, rolvaliduntil \
             FROM pg_catalog.pg_authid WHERE rolname NOT LIKE 'pg\\_%'";
        let conn = self.connection_for("").await?;
        let rows = sqlx::query(SQL)
            .fetch_all(&conn)
            .await
            .map_err(|e| query_err("", SQL, e))?;
        Ok(rows
            .into_iter()
            .map(|row| RoleRow {
                name: row.get("rolname"),
                password: row.get("rolpassword"),
                superuser: row.get("rolsuper"),
                inherit: row.get("rolinherit"),
                createrole: row.get("rolcreaterole"),
                createdb: row.get("rolcreatedb"),
                canlogin: row.get("rolcanlogin"),
                replication: row.get("rolreplication"),
                bypassrls: row.get("rolbypassrls"),
                connlimit: row.get("rolconnlimit"),
                validuntil: row.get::<Option<DateTime<Utc>>, _>("rolvaliduntil"),
            })
            .collect())
    }

    async fn fetch_role_memberships(&self) -> Result<Vec<(String, String)>, AccessError> {
        const SQL: &str =
            "SELECT pg_get_userbyid(roleid), pg_get_userbyid(member) FROM pg_catalog.pg_auth_members";
        let conn = self.connection_for("").await?;
        let rows = sqlx::query(SQL)
            .fetch_all(&conn)
            .await
            .map_err(|e| query_err("", SQL, e))?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get(0), row.get(1)))
            .collect())
    }

    async fn fetch_database_acl(
        &self,
        interesting_roles: &[String],
        interesting_databases: &[String],
    ) -> Result<Vec<AclRow>, AccessError> {
        const SQL: &str = "SELECT datname, pg_get_userbyid(grantee) AS grantee, privilege_type, \
             is_grantable FROM pg_catalog.pg_database, aclexplode(datacl) \
             WHERE datallowconn AND datname = ANY($1) AND pg_get_userbyid(grantee) = ANY($2)";
        let conn = self.connection_for("").await?;
        let rows = sqlx::query(SQL)
            .bind(interesting_databases)
            .bind(interesting_roles)
            .fetch_all(&conn)
            .await
            .map_err(|e| query_err("", SQL, e))?;
        Ok(rows
            .into_iter()
            .map(|row| AclRow {
                target: row.get("datname"),
                grantee: row.get("grantee"),
                privilege: row.get("privilege_type"),
                grantable: row.get("is_grantable"),
            })
            .collect())
    }

    async fn fetch_schema_acl(
        &self,
        database: &str,
        interesting_roles: &[String],
    ) -> Result<Vec<AclRow>, AccessError> {
        let sql = format!(
            "SELECT nspname, pg_get_userbyid(grantee) AS grantee, privilege_type, is_grantable \
             FROM pg_catalog.pg_namespace, aclexplode(nspacl) \
             WHERE {NON_SYSTEM_SCHEMAS} AND pg_get_userbyid(grantee) = ANY($1)"
        );
        let conn = self.connection_for(database).await?;
        let rows = sqlx::query(&sql)
            .bind(interesting_roles)
            .fetch_all(&conn)
            .await
            .map_err(|e| query_err(database, &sql, e));
        self.release(database).await;
        Ok(rows?
            .into_iter()
            .map(|row| AclRow {
                target: row.get("nspname"),
                grantee: row.get("grantee"),
                privilege: row.get("privilege_type"),
                grantable: row.get("is_grantable"),
            })
            .collect())
    }

    async fn fetch_class_acl(
        &self,
        database: &str,
        interesting_roles: &[String],
    ) -> Result<Vec<ClassAclRow>, AccessError> {
        const SQL: &str = "SELECT pg_get_userbyid(grantee) AS grantee, nspname, relname, relkind, \
             privilege_type, is_grantable FROM pg_catalog.pg_class, pg_namespace, aclexplode(relacl) \
             WHERE pg_namespace.oid = relnamespace AND pg_get_userbyid(grantee) = ANY($1) \
             AND nspname NOT IN ('pg_catalog', 'information_schema')";
        let conn = self.connection_for(database).await?;
        let rows = sqlx::query(SQL)
            .bind(interesting_roles)
            .fetch_all(&conn)
            .await
            .map_err(|e| query_err(database, SQL, e));
        self.release(database).await;
        Ok(rows?
            .into_iter()
            .map(|row| {
                let relkind: String = row.get("relkind");
                ClassAclRow {
                    schema: row.get("nspname"),
                    name: row.get("relname"),
                    relkind: relkind.chars().next().unwrap_or(' '),
                    grantee: row.get("grantee"),
                    privilege: row.get("privilege_type"),
                    grantable: row.get("is_grantable"),
                }
            })
            .collect())
    }

    async fn fetch_class_names(
        &self,
        database: &str,
        schemas: &[String],
        kinds: &[char],
    ) -> Result<Vec<(String, String)>, AccessError> {
        const SQL: &str = "SELECT nspname, relname FROM pg_catalog.pg_class, pg_catalog.pg_namespace \
             WHERE pg_class.relnamespace = pg_namespace.oid AND nspname = ANY($1) AND relkind = ANY($2)";
        let kinds: Vec<String> = kinds.iter().map(|c| c.to_string()).collect();
        let conn = self.connection_for(database).await?;
        let rows = sqlx::query(SQL)
            .bind(schemas)
            .bind(&kinds)
            .fetch_all(&conn)
            .await
            .map_err(|e| query_err(database, SQL, e));
        self.release(database).await;
        Ok(rows?
            .into_iter()
            .map(|row| (row.get("nspname"), row.get("relname")))
            .collect())
    }

    async fn execute(&self, database: &str, sql: &str) -> Result<(), AccessError> {
        debug!(database, sql, "executing plan statement");
        let conn = self.connection_for(database).await?;
        let result = sqlx::query(sql)
            .execute(&conn)
            .await
            .map_err(|e| AccessError::Execute {
                database: database.to_owned(),
                sql: sql.to_owned(),
                reason: e.to_string(),
            });
        self.release(database).await;
        result.map(|_| ())
    }

    async fn close_database(&self, database: &str) {
        debug!(database, "dropping cached connection before DROP DATABASE");
        self.pool.drop_cached_connection(database).await;
    }
}

fn query_err(database: &str, sql: &str, source: sqlx::Error) -> AccessError {
    AccessError::Query {
        database: database.to_owned(),
        sql: sql.to_owned(),
        reason: source.to_string(),
    }
}
