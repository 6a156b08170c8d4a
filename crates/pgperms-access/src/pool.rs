//! Per-database connection lending, built from one primary connection.
//!
//! Mirrors the teacher's guarded-shared-state shape (`zvault-core::barrier::Barrier`
//! wraps a single resource behind a lock with scoped acquire/release) but
//! lends distinct pooled connections keyed by database name, with reference
//! counting and eager close of template database connections — Postgres
//! blocks `CREATE DATABASE ... TEMPLATE template0` while any other session
//! holds that template open.

use std::collections::HashMap;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::error::AccessError;

struct Entry {
    pool: PgPool,
    refcount: usize,
}

/// Lends per-database `PgPool`s derived from one primary connection's
/// options, closing template database connections as soon as they are no
/// longer in use.
pub struct ClusterPool {
    options: PgConnectOptions,
    primary_database: String,
    primary: PgPool,
    cached: Mutex<HashMap<String, Entry>>,
}

impl ClusterPool {
    /// Build a pool around an already-established primary connection pool.
    #[must_use]
    pub fn new(options: PgConnectOptions, primary: PgPool) -> Self {
        let primary_database = options.get_database().unwrap_or_default().to_owned();
        Self {
            options,
            primary_database,
            primary,
            cached: Mutex::new(HashMap::new()),
        }
    }

    /// Borrow a connection pool for `database`. An empty name is treated as
    /// the primary database and returned with no reference counting.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Connect`] if establishing a new pool fails.
    pub async fn get(&self, database: &str) -> Result<PgPool, AccessError> {
        if database.is_empty() || database == self.primary_database {
            return Ok(self.primary.clone());
        }
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.get_mut(database) {
            entry.refcount += 1;
            return Ok(entry.pool.clone());
        }
        let opts = self.options.clone().database(database);
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| AccessError::Connect {
                database: database.to_owned(),
                reason: e.to_string(),
            })?;
        cached.insert(
            database.to_owned(),
            Entry {
                pool: pool.clone(),
                refcount: 1,
            },
        );
        Ok(pool)
    }

    /// Release a connection previously obtained via [`Self::get`]. A no-op
    /// for the primary database (or the empty-name alias for it). When the
    /// refcount for `template0`/`template1` reaches zero the cached pool is
    /// closed immediately.
    pub async fn release(&self, database: &str) {
        if database.is_empty() || database == self.primary_database {
            return;
        }
        let mut cached = self.cached.lock().await;
        let Some(entry) = cached.get_mut(database) else {
            // Releasing a database that was never acquired is a programming error.
            panic!("pgperms-access: released connection to {database:?} that was never acquired");
        };
        entry.refcount = entry
            .refcount
            .checked_sub(1)
            .unwrap_or_else(|| panic!("pgperms-access: over-released connection to {database:?}"));
        if entry.refcount == 0 && (database == "template0" || database == "template1") {
            let entry = cached.remove(database).unwrap_or_else(|| unreachable!());
            drop(cached);
            entry.pool.close().await;
        }
    }

    /// Drop the cached pool for `database`, if one exists, closing its
    /// connections. A no-op for the primary database (or the empty-name
    /// alias for it) and for a database that was never acquired.
    ///
    /// # Panics
    ///
    /// Panics if the cached pool for `database` still has a nonzero
    /// refcount — every borrow must be released first.
    pub async fn drop_cached_connection(&self, database: &str) {
        if database.is_empty() || database == self.primary_database {
            return;
        }
        let mut cached = self.cached.lock().await;
        let Some(entry) = cached.remove(database) else {
            return;
        };
        if entry.refcount > 0 {
            panic!("pgperms-access: dropping cached connection to {database:?} still in use (refcount {})", entry.refcount);
        }
        drop(cached);
        entry.pool.close().await;
    }

    /// Close every non-primary cached pool.
    pub async fn close(&self) {
        let mut cached = self.cached.lock().await;
        for (database, entry) in cached.drain() {
            if entry.refcount > 0 {
                panic!("pgperms-access: closing pool for {database:?} still in use (refcount {})", entry.refcount);
            }
            entry.pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    // Connection pool behavior against a live cluster is exercised by the
    // scenario tests in pgperms-cli; this crate has no way to stand up a
    // real Postgres instance in a unit test.
}
