//! Building a [`Config`] by querying a live (or simulated) cluster.

use std::collections::BTreeMap;

use pgperms_access::{AccessError, AclRow, ClassAclRow, ClusterAccess};

use crate::escape::{join_schema_name, join_table_name};
use crate::model::{Config, GenericPrivilege, PrivilegeSet, RoleAttributes, TargetKind};

/// Gather roles, databases, schemas, and privileges into a [`Config`].
///
/// `interesting_roles`/`interesting_databases` restrict the privilege scans
/// when non-empty; empty means "everything". Schemas and table/sequence
/// privileges are gathered per database, database by database, in the
/// order `access.fetch_databases()` (intersected with
/// `interesting_databases`) returns them — sequentially, matching the
/// deterministic single-threaded gather this tool requires.
///
/// # Errors
///
/// Returns whatever [`AccessError`] the underlying [`ClusterAccess`] surfaces.
pub async fn gather(
    access: &dyn ClusterAccess,
    interesting_roles: &[String],
    interesting_databases: &[String],
) -> Result<Config, AccessError> {
    let mut config = Config::default();

    let role_rows = access.fetch_roles().await?;
    for row in &role_rows {
        config.roles.insert(
            row.name.clone(),
            RoleAttributes {
                superuser: row.superuser,
                createdb: row.createdb,
                createrole: row.createrole,
                inherit: (!row.inherit).then_some(false),
                login: (!row.canlogin).then_some(false),
                replication: row.replication,
                bypassrls: row.bypassrls,
                connectionlimit: (row.connlimit != -1).then_some(row.connlimit),
                password: Some(row.password.clone().unwrap_or_default()),
                validuntil: row.validuntil,
                member_of: Vec::new(),
            },
        );
    }

    for (parent, member) in access.fetch_role_memberships().await? {
        if let Some(role) = config.roles.get_mut(&member) {
            role.member_of.push(parent);
        }
    }

    let interesting_roles: Vec<String> = if interesting_roles.is_empty() {
        config.roles.keys().cloned().collect()
    } else {
        interesting_roles.to_vec()
    };

    config.databases = access.fetch_databases().await?;
    let interesting_databases: Vec<String> = if interesting_databases.is_empty() {
        config.databases.clone()
    } else {
        interesting_databases.to_vec()
    };

    let database_acl = access
        .fetch_database_acl(&interesting_roles, &interesting_databases)
        .await?;
    config.database_privileges = group_acl(database_acl, TargetKind::Databases);

    for dbname in &config.databases {
        if !interesting_databases.contains(dbname) {
            continue;
        }
        let schemas = access.fetch_schemas(dbname).await?;
        config
            .schemas
            .extend(schemas.iter().map(|s| join_schema_name(dbname, s)));

        let schema_acl = access.fetch_schema_acl(dbname, &interesting_roles).await?;
        config.schema_privileges.extend(group_schema_acl(dbname, schema_acl));

        let class_acl = access.fetch_class_acl(dbname, &interesting_roles).await?;
        let (tables, sequences) = group_class_acl(dbname, class_acl);
        config.table_privileges.extend(tables);
        config.sequence_privileges.extend(sequences);
    }

    Ok(config)
}

/// Dump-friendly view: gather everything, then collapse each privilege list
/// to its minimal equivalent form.
///
/// # Errors
///
/// Returns whatever [`AccessError`] the underlying [`ClusterAccess`] surfaces.
pub async fn dump(access: &dyn ClusterAccess) -> Result<String, crate::error::CoreError> {
    let mut config = gather(access, &[], &[]).await?;
    config.table_privileges = crate::privmerge::merge_privileges(config.table_privileges);
    config.sequence_privileges = crate::privmerge::merge_privileges(config.sequence_privileges);
    config.database_privileges = crate::privmerge::merge_privileges(config.database_privileges);
    config.schema_privileges = crate::privmerge::merge_privileges(config.schema_privileges);
    Ok(serde_yaml::to_string(&config)?)
}

fn group_acl(rows: Vec<AclRow>, kind: TargetKind) -> Vec<GenericPrivilege> {
    let mut grouped: BTreeMap<(String, String, bool), PrivilegeSet> = BTreeMap::new();
    for row in rows {
        grouped
            .entry((row.grantee, row.target, row.grantable))
            .or_default()
            .add(&row.privilege);
    }
    grouped
        .into_iter()
        .map(|((grantee, target, grantable), set)| {
            GenericPrivilege::new(vec![grantee], set.list_or_all(kind), grantable, kind, vec![target])
        })
        .collect()
}

fn group_schema_acl(database: &str, rows: Vec<AclRow>) -> Vec<GenericPrivilege> {
    let mut grouped: BTreeMap<(String, String, bool), PrivilegeSet> = BTreeMap::new();
    for row in rows {
        let fqsn = join_schema_name(database, &row.target);
        grouped
            .entry((row.grantee, fqsn, row.grantable))
            .or_default()
            .add(&row.privilege);
    }
    grouped
        .into_iter()
        .map(|((grantee, target, grantable), set)| {
            GenericPrivilege::new(
                vec![grantee],
                set.list_or_all(TargetKind::Schemas),
                grantable,
                TargetKind::Schemas,
                vec![target],
            )
        })
        .collect()
}

fn group_class_acl(database: &str, rows: Vec<ClassAclRow>) -> (Vec<GenericPrivilege>, Vec<GenericPrivilege>) {
    let mut grouped: BTreeMap<(String, String, bool), PrivilegeSet> = BTreeMap::new();
    let mut relkinds: BTreeMap<String, char> = BTreeMap::new();
    for row in rows {
        let fqtn = join_table_name(database, &row.schema, &row.name);
        relkinds.insert(fqtn.clone(), row.relkind);
        grouped
            .entry((row.grantee, fqtn, row.grantable))
            .or_default()
            .add(&row.privilege);
    }

    let mut tables = Vec::new();
    let mut sequences = Vec::new();
    for ((grantee, target, grantable), set) in grouped {
        match relkinds.get(&target) {
            Some('S') => sequences.push(GenericPrivilege::new(
                vec![grantee],
                set.list_or_all(TargetKind::Sequences),
                grantable,
                TargetKind::Sequences,
                vec![target],
            )),
            Some('r' | 'v' | 'm' | 'f') => tables.push(GenericPrivilege::new(
                vec![grantee],
                set.list_or_all(TargetKind::Tables),
                grantable,
                TargetKind::Tables,
                vec![target],
            )),
            _ => {}
        }
    }
    (tables, sequences)
}
