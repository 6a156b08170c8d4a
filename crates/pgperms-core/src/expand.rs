//! Expanding `db.schema.*` wildcard targets into the concrete relations
//! they currently match.

use std::collections::{BTreeMap, BTreeSet};

use pgperms_access::{AccessError, ClusterAccess};

use crate::escape::{join_table_name, split_object_name};
use crate::model::GenericPrivilege;

const TABLE_KINDS: [char; 4] = ['r', 'v', 'm', 'f'];
const SEQUENCE_KINDS: [char; 1] = ['S'];

/// Expand every `db.schema.*` table target in `privs` to the tables that
/// schema currently contains.
///
/// # Errors
///
/// Returns whatever [`AccessError`] the underlying [`ClusterAccess`] surfaces.
pub async fn expand_tables(
    access: &dyn ClusterAccess,
    privs: Vec<GenericPrivilege>,
    existing_databases: &[String],
) -> Result<Vec<GenericPrivilege>, AccessError> {
    expand(access, privs, existing_databases, &TABLE_KINDS).await
}

/// Expand every `db.schema.*` sequence target in `privs` to the sequences
/// that schema currently contains.
///
/// # Errors
///
/// Returns whatever [`AccessError`] the underlying [`ClusterAccess`] surfaces.
pub async fn expand_sequences(
    access: &dyn ClusterAccess,
    privs: Vec<GenericPrivilege>,
    existing_databases: &[String],
) -> Result<Vec<GenericPrivilege>, AccessError> {
    expand(access, privs, existing_databases, &SEQUENCE_KINDS).await
}

async fn expand(
    access: &dyn ClusterAccess,
    mut privs: Vec<GenericPrivilege>,
    existing_databases: &[String],
    kinds: &[char],
) -> Result<Vec<GenericPrivilege>, AccessError> {
    let mut interesting_schemas: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for p in &privs {
        for target in p.targets() {
            let Some(schema) = target.strip_suffix(".*") else { continue };
            let (dbname, schema) = split_object_name(schema);
            interesting_schemas
                .entry(dbname.to_owned())
                .or_default()
                .insert(schema.to_owned());
        }
    }

    let mut names: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
    for (dbname, schemas) in interesting_schemas {
        if !existing_databases.contains(&dbname) {
            continue;
        }
        let schemas: Vec<String> = schemas.into_iter().collect();
        let rows = access.fetch_class_names(&dbname, &schemas, kinds).await?;
        let mut per_schema: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (schema, name) in rows {
            per_schema
                .entry(schema.clone())
                .or_default()
                .push(join_table_name(&dbname, &schema, &name));
        }
        names.insert(dbname, per_schema);
    }

    for p in &mut privs {
        let mut new_targets = Vec::new();
        for target in p.targets() {
            let Some(schema) = target.strip_suffix(".*") else {
                new_targets.push(target.clone());
                continue;
            };
            let (dbname, schema) = split_object_name(schema);
            if let Some(matched) = names.get(dbname).and_then(|s| s.get(schema)) {
                new_targets.extend(matched.iter().cloned());
            }
        }
        p.replace_targets(new_targets);
    }

    Ok(privs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TargetKind;
    use pgperms_access::MemoryAccess;

    #[tokio::test]
    async fn wildcard_target_expands_to_matching_tables() {
        let access = MemoryAccess::new()
            .with_relation("app", "public", 'r', "t1")
            .await
            .with_relation("app", "public", 'r', "t2")
            .await
            .with_relation("app", "public", 'S', "t1_id_seq")
            .await;

        let privs = vec![GenericPrivilege::new(
            vec!["alice".to_owned()],
            vec!["SELECT".to_owned()],
            false,
            TargetKind::Tables,
            vec!["app.public.*".to_owned()],
        )];

        let expanded = expand_tables(&access, privs, &["app".to_owned()]).await.unwrap();
        assert_eq!(expanded.len(), 1);
        let mut targets = expanded[0].targets().to_vec();
        targets.sort();
        assert_eq!(targets, vec!["app.public.t1".to_owned(), "app.public.t2".to_owned()]);
    }

    #[tokio::test]
    async fn wildcard_for_a_nonexistent_database_expands_to_nothing() {
        let access = MemoryAccess::new();
        let privs = vec![GenericPrivilege::new(
            vec!["alice".to_owned()],
            vec!["SELECT".to_owned()],
            false,
            TargetKind::Tables,
            vec!["ghost.public.*".to_owned()],
        )];
        let expanded = expand_tables(&access, privs, &[]).await.unwrap();
        assert!(expanded[0].targets().is_empty());
    }

    #[tokio::test]
    async fn non_wildcard_targets_pass_through_unchanged() {
        let access = MemoryAccess::new();
        let privs = vec![GenericPrivilege::new(
            vec!["alice".to_owned()],
            vec!["SELECT".to_owned()],
            false,
            TargetKind::Tables,
            vec!["app.public.t1".to_owned()],
        )];
        let expanded = expand_tables(&access, privs, &["app".to_owned()]).await.unwrap();
        assert_eq!(expanded[0].targets(), &["app.public.t1".to_owned()]);
    }
}
