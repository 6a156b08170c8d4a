//! Collapsing a list of [`GenericPrivilege`] entries into the smallest
//! equivalent list, the way a dumped config groups grants for readability.
//!
//! Mirrors the three-level grouping the original gatherer used: first
//! accumulate privileges per `(grantee, target, grantable)` triple, then
//! group those triples by grantee under `(grantable, privilege set)`, then
//! group grantees together when they share both the grantable flag and the
//! exact target list.

use std::collections::BTreeMap;

use crate::model::{GenericPrivilege, PrivilegeSet, TargetKind};

/// Merge `input` into the smallest equivalent set of [`GenericPrivilege`]
/// entries, collapsing a grantee's full privilege set down to the literal
/// `"ALL PRIVILEGES"` pseudo-privilege. Entries with more than one (or
/// zero) populated target kind are passed through unchanged — merging only
/// applies to well-formed entries, and a config that fails that shape check
/// is a validation error, not a merge-time concern.
///
/// This is the dump path's merge (`gather::dump`): a dumped config is meant
/// to read naturally, and `ALL PRIVILEGES` is the readable spelling of "every
/// privilege this kind supports". For merging a `GRANT`/`REVOKE` plan, use
/// [`merge_privileges_for_plan`] instead — the wire statement must spell out
/// every privilege name, never the pseudo-privilege.
#[must_use]
pub fn merge_privileges(input: Vec<GenericPrivilege>) -> Vec<GenericPrivilege> {
    merge(input, true)
}

/// Merge `input` the same way [`merge_privileges`] does, but without
/// collapsing a full privilege set to `"ALL PRIVILEGES"`. `GRANT`/`REVOKE`
/// statements must list out every privilege name explicitly —
/// `original_source/privmerge.go`'s `mergePrivileges` calls plain `.List()`,
/// never `.ListOrAll()`, for exactly this reason.
#[must_use]
pub fn merge_privileges_for_plan(input: Vec<GenericPrivilege>) -> Vec<GenericPrivilege> {
    merge(input, false)
}

fn merge(input: Vec<GenericPrivilege>, collapse_to_all: bool) -> Vec<GenericPrivilege> {
    let mut malformed = Vec::new();
    let mut by_kind: BTreeMap<TargetKind, Vec<GenericPrivilege>> = BTreeMap::new();

    for gp in input {
        match gp.kind() {
            Some(kind) => by_kind.entry(kind).or_default().push(gp),
            None => malformed.push(gp),
        }
    }

    let mut out = malformed;
    for (kind, entries) in by_kind {
        out.extend(merge_one_kind(kind, entries, collapse_to_all));
    }
    out
}

fn merge_one_kind(kind: TargetKind, entries: Vec<GenericPrivilege>, collapse_to_all: bool) -> Vec<GenericPrivilege> {
    // Step 1: re-accumulate privileges per (grantee, target, grantable),
    // in case the input wasn't already collapsed that way.
    let mut by_grantee_target: BTreeMap<(String, String, bool), PrivilegeSet> = BTreeMap::new();
    for gp in &entries {
        let set = gp.privilege_set();
        for role in &gp.roles {
            for target in gp.targets() {
                let entry = by_grantee_target
                    .entry((role.clone(), target.clone(), gp.grantable))
                    .or_insert_with(PrivilegeSet::empty);
                *entry = entry.union(set);
            }
        }
    }

    // Step 2: for each grantee, group its targets by (grantable, privilege set).
    let mut by_grantee: BTreeMap<&str, BTreeMap<(bool, PrivilegeSet), Vec<String>>> = BTreeMap::new();
    for ((grantee, target, grantable), set) in &by_grantee_target {
        by_grantee
            .entry(grantee.as_str())
            .or_default()
            .entry((*grantable, *set))
            .or_default()
            .push(target.clone());
    }

    // Step 3: group grantees together when they share (grantable, set, targets).
    let mut by_shape: BTreeMap<(bool, PrivilegeSet, Vec<String>), Vec<String>> = BTreeMap::new();
    for (grantee, groups) in by_grantee {
        for ((grantable, set), mut targets) in groups {
            targets.sort();
            by_shape
                .entry((grantable, set, targets))
                .or_default()
                .push(grantee.to_owned());
        }
    }

    by_shape
        .into_iter()
        .map(|((grantable, set, targets), mut roles)| {
            roles.sort();
            let privileges = if collapse_to_all {
                set.list_or_all(kind)
            } else {
                set.list().into_iter().map(str::to_owned).collect()
            };
            GenericPrivilege::new(roles, privileges, grantable, kind, targets)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_same_privileges_across_grantees_into_one_entry() {
        let input = vec![
            GenericPrivilege::new(
                vec!["alice".to_owned()],
                vec!["SELECT".to_owned()],
                false,
                TargetKind::Tables,
                vec!["app.public.t1".to_owned()],
            ),
            GenericPrivilege::new(
                vec!["bob".to_owned()],
                vec!["SELECT".to_owned()],
                false,
                TargetKind::Tables,
                vec!["app.public.t1".to_owned()],
            ),
        ];
        let merged = merge_privileges(input);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].roles, vec!["alice".to_owned(), "bob".to_owned()]);
    }

    #[test]
    fn keeps_distinct_grantable_flags_separate() {
        let input = vec![
            GenericPrivilege::new(
                vec!["alice".to_owned()],
                vec!["SELECT".to_owned()],
                true,
                TargetKind::Tables,
                vec!["app.public.t1".to_owned()],
            ),
            GenericPrivilege::new(
                vec!["alice".to_owned()],
                vec!["SELECT".to_owned()],
                false,
                TargetKind::Tables,
                vec!["app.public.t2".to_owned()],
            ),
        ];
        let merged = merge_privileges(input);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn accumulates_privileges_for_the_same_target_before_grouping() {
        let input = vec![
            GenericPrivilege::new(
                vec!["alice".to_owned()],
                vec!["SELECT".to_owned()],
                false,
                TargetKind::Tables,
                vec!["app.public.t1".to_owned()],
            ),
            GenericPrivilege::new(
                vec!["alice".to_owned()],
                vec!["INSERT".to_owned()],
                false,
                TargetKind::Tables,
                vec!["app.public.t1".to_owned()],
            ),
        ];
        let merged = merge_privileges(input);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].privileges, vec!["SELECT".to_owned(), "INSERT".to_owned()]);
    }
}
