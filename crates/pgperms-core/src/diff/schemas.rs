//! `CREATE SCHEMA` / `DROP SCHEMA` reconciliation.

use std::collections::HashSet;

use pgperms_access::SyncSink;

use crate::escape::{safe_identifier, split_object_name};

/// Emit `CREATE SCHEMA` for every wanted `db.schema` missing from `actual`,
/// and `DROP SCHEMA` for every tombstoned one still present in it.
pub fn sync_schemas(sink: &mut dyn SyncSink, wanted: &[String], tombstoned: &[String], actual: &[String]) {
    let actual: HashSet<&str> = actual.iter().map(String::as_str).collect();

    for s in wanted {
        if actual.contains(s.as_str()) {
            continue;
        }
        let (db, schema) = split_object_name(s);
        sink.query(db, format!("CREATE SCHEMA {}", safe_identifier(schema)));
    }

    for s in tombstoned {
        if !actual.contains(s.as_str()) {
            continue;
        }
        let (db, schema) = split_object_name(s);
        sink.query(db, format!("DROP SCHEMA {}", safe_identifier(schema)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgperms_access::Recorder;

    #[test]
    fn creates_missing_schema_in_the_right_database() {
        let mut sink = Recorder::new();
        sync_schemas(&mut sink, &["app.reporting".to_owned()], &[], &[]);
        let got = sink.get();
        assert_eq!(got[0].database, "app");
        assert_eq!(got[0].query, "CREATE SCHEMA reporting");
    }

    #[test]
    fn drops_tombstoned_schema_still_present() {
        let mut sink = Recorder::new();
        sync_schemas(&mut sink, &[], &["app.old".to_owned()], &["app.old".to_owned()]);
        let got = sink.get();
        assert_eq!(got[0].query, "DROP SCHEMA old");
    }
}
