//! Top-level orchestration: decode, validate, gather, expand, diff, emit.

use pgperms_access::{ClusterAccess, SyncSink};

use crate::diff::{databases, privileges, roles, schemas};
use crate::error::CoreError;
use crate::expand::{expand_sequences, expand_tables};
use crate::gather::gather;
use crate::model::Config;
use crate::validate::validate_config;

/// Reconcile `access` to the desired state described by `desired_yaml`,
/// emitting every statement needed through `sink`.
///
/// Statements are emitted in the fixed order the server can safely apply
/// them in: databases, then roles (attributes, then membership), then
/// database-level privileges, then schemas, then schema/table/sequence
/// privileges — with a barrier between each stage so a `Recorder`-backed
/// sink can't interleave a later stage's statements ahead of an earlier
/// one's.
///
/// # Errors
///
/// Returns [`CoreError::Parse`] if `desired_yaml` isn't valid for
/// [`Config`], [`CoreError::Validation`] if it decodes but is internally
/// inconsistent, or [`CoreError::Access`] if gathering/expanding against
/// `access` fails.
pub async fn sync(access: &dyn ClusterAccess, desired_yaml: &str, sink: &mut dyn SyncSink) -> Result<(), CoreError> {
    let mut desired: Config = serde_yaml::from_str(desired_yaml)?;
    validate_config(&desired)?;

    let interesting_roles: Vec<String> = desired.roles.keys().cloned().collect();
    let actual = gather(access, &interesting_roles, &desired.databases).await?;

    desired.table_privileges = expand_tables(access, desired.table_privileges, &actual.databases).await?;
    desired.sequence_privileges = expand_sequences(access, desired.sequence_privileges, &actual.databases).await?;

    databases::sync_databases(sink, &desired.databases, &desired.tombstoned_databases, &actual.databases);
    sink.add_barrier();

    roles::sync_roles(sink, &actual.roles, &desired.roles, &desired.tombstoned_roles);
    sink.add_barrier();

    privileges::sync_privileges(
        sink,
        &[String::new()],
        &actual.database_privileges,
        &desired.database_privileges,
    );
    sink.add_barrier();

    schemas::sync_schemas(sink, &desired.schemas, &desired.tombstoned_schemas, &actual.schemas);
    sink.add_barrier();

    privileges::sync_privileges(sink, &desired.databases, &actual.schema_privileges, &desired.schema_privileges);
    sink.add_barrier();

    privileges::sync_privileges(sink, &desired.databases, &actual.table_privileges, &desired.table_privileges);
    sink.add_barrier();

    privileges::sync_privileges(
        sink,
        &desired.databases,
        &actual.sequence_privileges,
        &desired.sequence_privileges,
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoleAttributes;
    use pgperms_access::{MemoryAccess, Recorder};

    #[tokio::test]
    async fn invalid_yaml_is_rejected_before_touching_the_cluster() {
        let access = MemoryAccess::new();
        let mut sink = Recorder::new();
        let err = sync(&access, "not_a_real_key: true\n", &mut sink).await.unwrap_err();
        assert!(matches!(err, CoreError::Parse(_)));
    }

    #[tokio::test]
    async fn tombstoned_and_defined_role_is_rejected_before_gathering() {
        let access = MemoryAccess::new();
        let mut sink = Recorder::new();
        let yaml = "roles:\n  bob: {}\ntombstoned_roles: [bob]\n";
        let err = sync(&access, yaml, &mut sink).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn creating_a_role_with_login_and_password_emits_create_role() {
        let access = MemoryAccess::new();
        let mut sink = Recorder::new();
        let yaml = "roles:\n  alice:\n    login: true\n    password: hunter2\n";
        sync(&access, yaml, &mut sink).await.unwrap();
        let got = sink.get();
        assert!(got.iter().any(|q| q.query == "CREATE ROLE alice LOGIN PASSWORD 'hunter2'"));
    }

    #[tokio::test]
    async fn fresh_cluster_round_trips_an_empty_dump_to_an_empty_plan() {
        let access = MemoryAccess::new();
        let mut sink = Recorder::new();
        sync(&access, "{}\n", &mut sink).await.unwrap();
        assert!(sink.get().is_empty());
    }

    #[tokio::test]
    async fn unchanged_cluster_state_produces_an_empty_plan() {
        let access = MemoryAccess::new()
            .with_role(pgperms_access::RoleRow {
                name: "alice".to_owned(),
                password: None,
                superuser: false,
                inherit: true,
                createrole: false,
                createdb: false,
                canlogin: true,
                replication: false,
                bypassrls: false,
                connlimit: -1,
                validuntil: None,
            })
            .await;

        let mut roles = std::collections::BTreeMap::new();
        roles.insert(
            "alice".to_owned(),
            RoleAttributes {
                login: Some(true),
                password: Some(String::new()),
                ..Default::default()
            },
        );
        let config = Config {
            roles,
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();

        let mut sink = Recorder::new();
        sync(&access, &yaml, &mut sink).await.unwrap();
        assert!(sink.get().is_empty());
    }
}
