//! `GRANT` / `REVOKE` reconciliation.
//!
//! The grant/revoke/grant-option-revoke three-bucket diff this module
//! implements is symmetric: computing what to revoke is the same algorithm
//! as computing what to grant, with the actual and desired lists swapped.

use std::collections::HashMap;

use pgperms_access::SyncSink;

use crate::escape::split_object_name;
use crate::model::GenericPrivilege;
use crate::privmerge::merge_privileges_for_plan;

/// `existing[target][grantee][privilege] = grantable`.
type ExistingMap = HashMap<String, HashMap<String, HashMap<String, bool>>>;

fn index(privs: &[GenericPrivilege]) -> ExistingMap {
    let mut existing: ExistingMap = HashMap::new();
    for p in privs {
        for target in p.targets() {
            let by_grantee = existing.entry(target.clone()).or_default();
            for grantee in &p.roles {
                let by_priv = by_grantee.entry(grantee.clone()).or_default();
                for priv_name in p.privilege_set().list() {
                    by_priv.insert(priv_name.to_owned(), p.grantable);
                }
            }
        }
    }
    existing
}

/// Compare `old_privs` against `new_privs`: returns `(brand_new, needs_grant_option)`.
/// `brand_new` entries aren't present in `old_privs` at all. `needs_grant_option`
/// entries are present in `old_privs` without the grant option, and `new_privs`
/// wants it grantable.
///
/// Swapping the arguments turns this into the revoke computation: the first
/// return value becomes "no longer wanted at all" and the second becomes
/// "still wanted, but the grant option must be revoked".
fn diff_privileges(old_privs: &[GenericPrivilege], new_privs: &[GenericPrivilege]) -> (Vec<GenericPrivilege>, Vec<GenericPrivilege>) {
    let existing = index(old_privs);
    let mut brand_new = Vec::new();
    let mut needs_upgrade = Vec::new();

    for n in new_privs {
        let Some(kind) = n.kind() else { continue };
        for target in n.targets() {
            for grantee in &n.roles {
                for priv_name in n.privilege_set().list() {
                    let found_grantable = existing
                        .get(target)
                        .and_then(|g| g.get(grantee))
                        .and_then(|p| p.get(priv_name));

                    if let Some(&with_grant) = found_grantable {
                        if with_grant || !n.grantable {
                            continue;
                        }
                    }

                    let gp = GenericPrivilege::new(
                        vec![grantee.clone()],
                        vec![priv_name.to_owned()],
                        n.grantable,
                        kind,
                        vec![target.clone()],
                    );
                    if found_grantable.is_some() {
                        needs_upgrade.push(gp);
                    } else {
                        brand_new.push(gp);
                    }
                }
            }
        }
    }

    (brand_new, needs_upgrade)
}

fn apply_privileges(sink: &mut dyn SyncSink, database: &str, granting: bool, just_grant_option: bool, diff: Vec<GenericPrivilege>) {
    if diff.is_empty() {
        return;
    }
    let Some(kind) = diff[0].kind() else { return };
    let keyword = kind.sql_keyword();

    for n in merge_privileges_for_plan(diff) {
        let mut targets = Vec::new();
        for target in n.targets() {
            let (db, rest) = split_object_name(target);
            if db != database {
                continue;
            }
            targets.push(rest.to_owned());
        }
        if targets.is_empty() {
            continue;
        }

        let privileges = n.privileges.join(", ");
        let roles = n.roles.join(", ");
        let target_list = targets.join(", ");

        if granting {
            let mut q = format!("GRANT {privileges} ON {keyword} {target_list} TO {roles}");
            if n.grantable {
                q.push_str(" WITH GRANT OPTION");
            }
            sink.query(database, q);
        } else {
            let prefix = if just_grant_option { "GRANT OPTION FOR " } else { "" };
            sink.query(
                database,
                format!("REVOKE {prefix}{privileges} ON {keyword} {target_list} FROM {roles}"),
            );
        }
    }
}

/// Emit the `GRANT`/`REVOKE` statements needed to move `actual` to
/// `desired`, iterating `databases` in order so targets land on the right
/// connection.
pub fn sync_privileges(sink: &mut dyn SyncSink, databases: &[String], actual: &[GenericPrivilege], desired: &[GenericPrivilege]) {
    let (mut grant, grant_option_upgrades) = diff_privileges(actual, desired);
    grant.extend(grant_option_upgrades);

    let (revoke, revoke_grant_option) = diff_privileges(desired, actual);

    for db in databases {
        apply_privileges(sink, db, true, false, grant.clone());
        apply_privileges(sink, db, false, false, revoke.clone());
        apply_privileges(sink, db, false, true, revoke_grant_option.clone());
    }
}
