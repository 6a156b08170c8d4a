//! The plan-recording sink.
//!
//! [`SyncSink`] receives every statement the diff engine decides must run to
//! reach the desired state. [`Recorder`] is the reference implementation: it
//! records statements in emission order and, on each [`SyncSink::add_barrier`],
//! sorts the statements emitted since the previous barrier lexicographically.
//! That sort is what makes the plan reproducible across runs — the diff
//! engine's internal iteration order (over hash maps, grantee sets, etc.) is
//! otherwise unspecified.

use std::fmt;

/// Receives the statements that must run to reach the desired state.
pub trait SyncSink {
    /// Record that `query` should run against `database` ("" means any
    /// database — the statement is cluster-wide, e.g. `CREATE ROLE`).
    fn query(&mut self, database: &str, query: String);

    /// Mark a point across which statements may not be reordered. Emitted
    /// statements since the previous barrier are free to reorder among
    /// themselves (the reference [`Recorder`] sorts them for determinism).
    fn add_barrier(&mut self);
}

/// One statement targeted at a database, as emitted by the diff engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueryForDatabase {
    pub database: String,
    pub query: String,
}

impl fmt::Display for QueryForDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/* {:>24} */ {}", self.database, self.query)
    }
}

/// Records every emitted statement, sorting each barrier-delimited run.
#[derive(Debug, Default)]
pub struct Recorder {
    queries: Vec<QueryForDatabase>,
    barrier: usize,
}

impl Recorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flush a final barrier and return every recorded statement.
    #[must_use]
    pub fn get(mut self) -> Vec<QueryForDatabase> {
        self.add_barrier();
        self.queries
    }

    /// Borrow the statements recorded so far without consuming the recorder.
    #[must_use]
    pub fn peek(&self) -> &[QueryForDatabase] {
        &self.queries
    }
}

impl SyncSink for Recorder {
    fn query(&mut self, database: &str, query: String) {
        self.queries.push(QueryForDatabase {
            database: database.to_owned(),
            query,
        });
    }

    fn add_barrier(&mut self) {
        let tail = &mut self.queries[self.barrier..];
        tail.sort_by(|a, b| a.query.cmp(&b.query));
        self.barrier = self.queries.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_within_a_barrier_only() {
        let mut r = Recorder::new();
        r.query("", "z".to_owned());
        r.query("", "a".to_owned());
        r.add_barrier();
        r.query("", "y".to_owned());
        r.query("", "b".to_owned());
        let got = r.get();
        let queries: Vec<&str> = got.iter().map(|q| q.query.as_str()).collect();
        assert_eq!(queries, vec!["a", "z", "b", "y"]);
    }

    #[test]
    fn display_format_matches_plan_contract() {
        let q = QueryForDatabase {
            database: "app".to_owned(),
            query: "CREATE ROLE alice".to_owned(),
        };
        let expected = format!("/* {:>24} */ CREATE ROLE alice", "app");
        assert_eq!(format!("{q}"), expected);
    }

    #[test]
    fn empty_database_means_any() {
        let q = QueryForDatabase {
            database: String::new(),
            query: "CREATE DATABASE foo".to_owned(),
        };
        let rendered = format!("{q}");
        assert!(rendered.starts_with("/* "));
        assert!(rendered.ends_with("*/ CREATE DATABASE foo"));
    }
}
