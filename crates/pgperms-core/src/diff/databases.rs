//! `CREATE DATABASE` / `DROP DATABASE` reconciliation.

use std::collections::HashSet;

use pgperms_access::SyncSink;

use crate::escape::safe_identifier;

/// Emit `CREATE DATABASE` for every wanted database missing from `actual`,
/// and `DROP DATABASE` for every tombstoned database still present in it.
pub fn sync_databases(sink: &mut dyn SyncSink, wanted: &[String], tombstoned: &[String], actual: &[String]) {
    let actual: HashSet<&str> = actual.iter().map(String::as_str).collect();

    for d in wanted {
        if actual.contains(d.as_str()) {
            continue;
        }
        sink.query("", format!("CREATE DATABASE {}", safe_identifier(d)));
    }

    for d in tombstoned {
        if !actual.contains(d.as_str()) {
            continue;
        }
        sink.query("", format!("DROP DATABASE {}", safe_identifier(d)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgperms_access::Recorder;

    #[test]
    fn creates_missing_wanted_databases() {
        let mut sink = Recorder::new();
        sync_databases(&mut sink, &["app".to_owned()], &[], &[]);
        let got = sink.get();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].query, "CREATE DATABASE app");
    }

    #[test]
    fn drops_tombstoned_databases_still_present() {
        let mut sink = Recorder::new();
        sync_databases(&mut sink, &[], &["old".to_owned()], &["old".to_owned()]);
        let got = sink.get();
        assert_eq!(got[0].query, "DROP DATABASE old");
    }

    #[test]
    fn leaves_databases_that_already_exist_alone() {
        let mut sink = Recorder::new();
        sync_databases(&mut sink, &["app".to_owned()], &[], &["app".to_owned()]);
        assert!(sink.get().is_empty());
    }
}
