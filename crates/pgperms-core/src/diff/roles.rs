//! `CREATE ROLE` / `ALTER ROLE` / `DROP ROLE` and membership reconciliation.

use std::collections::{BTreeMap, HashSet};

use pgperms_access::SyncSink;

use crate::escape::escape;
use crate::model::RoleAttributes;
use crate::password::verify_password;

/// Emit the `ALTER ROLE` delta between `old` (actual) and `new` (desired)
/// attributes for `username`, or nothing if they already agree.
fn alter_role(sink: &mut dyn SyncSink, username: &str, old: &RoleAttributes, new: &RoleAttributes) {
    let mut clauses = String::new();

    if let Some(desired) = &new.password {
        let actual = old.password.as_deref().unwrap_or("");
        if desired.is_empty() {
            if !actual.is_empty() {
                clauses.push_str(" PASSWORD NULL");
            }
        } else if !verify_password(actual, username, desired) {
            clauses.push_str(" PASSWORD ");
            clauses.push_str(&escape(desired));
        }
    }

    if old.effective_connection_limit() != new.effective_connection_limit() {
        clauses.push_str(&format!(" CONNECTION LIMIT {}", new.effective_connection_limit()));
    }

    if old.validuntil != new.validuntil {
        match &new.validuntil {
            None => clauses.push_str(" VALID UNTIL 'infinity'"),
            Some(t) => {
                clauses.push_str(" VALID UNTIL ");
                clauses.push_str(&escape(&t.to_rfc3339()));
            }
        }
    }

    let flags: [(&str, bool, bool); 7] = [
        ("SUPERUSER", old.superuser, new.superuser),
        ("INHERIT", old.effective_inherit(), new.effective_inherit()),
        ("CREATEROLE", old.createrole, new.createrole),
        ("CREATEDB", old.createdb, new.createdb),
        ("LOGIN", old.effective_login(), new.effective_login()),
        ("REPLICATION", old.replication, new.replication),
        ("BYPASSRLS", old.bypassrls, new.bypassrls),
    ];
    for (name, actual, desired) in flags {
        if actual == desired {
            continue;
        }
        clauses.push(' ');
        if !desired {
            clauses.push_str("NO");
        }
        clauses.push_str(name);
    }

    if !clauses.is_empty() {
        sink.query("", format!("ALTER ROLE {username}{clauses}"));
    }
}

/// Emit `DROP ROLE` for tombstoned roles, `CREATE ROLE`/`ALTER ROLE` for the
/// rest, a barrier, then the `GRANT`/`REVOKE` statements needed to reconcile
/// role membership (skipping revokes of a tombstoned parent, since it is
/// already being dropped).
pub fn sync_roles(
    sink: &mut dyn SyncSink,
    old_roles: &BTreeMap<String, RoleAttributes>,
    new_roles: &BTreeMap<String, RoleAttributes>,
    tombstoned: &[String],
) {
    for t in tombstoned {
        if old_roles.contains_key(t) {
            sink.query("", format!("DROP ROLE {t}"));
        }
    }

    for (username, new) in new_roles {
        match old_roles.get(username) {
            Some(old) => alter_role(sink, username, old, new),
            None => sink.query("", new.create_sql(username)),
        }
    }

    sink.add_barrier();

    let empty = RoleAttributes::default();
    let tombstoned: HashSet<&str> = tombstoned.iter().map(String::as_str).collect();
    for (username, new) in new_roles {
        let old = old_roles.get(username).unwrap_or(&empty);
        let old_set: HashSet<&str> = old.member_of.iter().map(String::as_str).collect();
        let new_set: HashSet<&str> = new.member_of.iter().map(String::as_str).collect();

        let mut to_add: Vec<&str> = new_set.difference(&old_set).copied().collect();
        to_add.sort_unstable();
        for parent in to_add {
            sink.query("", format!("GRANT {parent} TO {username}"));
        }

        let mut to_remove: Vec<&str> = old_set.difference(&new_set).copied().collect();
        to_remove.sort_unstable();
        for parent in to_remove {
            if tombstoned.contains(parent) {
                continue;
            }
            sink.query("", format!("REVOKE {parent} FROM {username}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgperms_access::Recorder;

    #[test]
    fn creates_a_new_role_with_login_and_password() {
        let mut sink = Recorder::new();
        let mut new_roles = BTreeMap::new();
        new_roles.insert(
            "alice".to_owned(),
            RoleAttributes {
                login: Some(true),
                password: Some("hunter2".to_owned()),
                ..Default::default()
            },
        );
        sync_roles(&mut sink, &BTreeMap::new(), &new_roles, &[]);
        let got = sink.get();
        assert_eq!(got[0].query, "CREATE ROLE alice LOGIN PASSWORD 'hunter2'");
    }

    #[test]
    fn drops_tombstoned_roles_that_exist() {
        let mut sink = Recorder::new();
        let mut old_roles = BTreeMap::new();
        old_roles.insert("bob".to_owned(), RoleAttributes::default());
        sync_roles(&mut sink, &old_roles, &BTreeMap::new(), &["bob".to_owned()]);
        let got = sink.get();
        assert!(got.iter().any(|q| q.query == "DROP ROLE bob"));
    }

    #[test]
    fn unchanged_role_produces_no_alter() {
        let mut sink = Recorder::new();
        let mut roles = BTreeMap::new();
        roles.insert("alice".to_owned(), RoleAttributes::default());
        sync_roles(&mut sink, &roles, &roles, &[]);
        assert!(sink.get().is_empty());
    }

    #[test]
    fn connection_limit_change_emits_alter() {
        let mut sink = Recorder::new();
        let mut old_roles = BTreeMap::new();
        old_roles.insert("alice".to_owned(), RoleAttributes::default());
        let mut new_roles = BTreeMap::new();
        new_roles.insert(
            "alice".to_owned(),
            RoleAttributes {
                connectionlimit: Some(5),
                ..Default::default()
            },
        );
        sync_roles(&mut sink, &old_roles, &new_roles, &[]);
        let got = sink.get();
        assert_eq!(got[0].query, "ALTER ROLE alice CONNECTION LIMIT 5");
    }

    #[test]
    fn membership_delta_grants_and_revokes() {
        let mut sink = Recorder::new();
        let mut old_roles = BTreeMap::new();
        old_roles.insert(
            "alice".to_owned(),
            RoleAttributes {
                member_of: vec!["readers".to_owned()],
                ..Default::default()
            },
        );
        let mut new_roles = BTreeMap::new();
        new_roles.insert(
            "alice".to_owned(),
            RoleAttributes {
                member_of: vec!["writers".to_owned()],
                ..Default::default()
            },
        );
        sync_roles(&mut sink, &old_roles, &new_roles, &[]);
        let got = sink.get();
        assert!(got.iter().any(|q| q.query == "GRANT writers TO alice"));
        assert!(got.iter().any(|q| q.query == "REVOKE readers FROM alice"));
    }

    #[test]
    fn revoking_a_tombstoned_parent_membership_is_skipped() {
        let mut sink = Recorder::new();
        let mut old_roles = BTreeMap::new();
        old_roles.insert(
            "alice".to_owned(),
            RoleAttributes {
                member_of: vec!["legacy".to_owned()],
                ..Default::default()
            },
        );
        let mut new_roles = BTreeMap::new();
        new_roles.insert("alice".to_owned(), RoleAttributes::default());
        sync_roles(&mut sink, &old_roles, &new_roles, &["legacy".to_owned()]);
        let got = sink.get();
        assert!(got.iter().all(|q| !q.query.starts_with("REVOKE")));
    }
}
