//! Rejecting desired-state documents with internal contradictions before a
//! single catalog query is issued.

use std::collections::HashSet;

use crate::escape::split_object_name;
use crate::model::{Config, GenericPrivilege, TargetKind};

/// Returns `Ok(())` when `config` is internally consistent, otherwise every
/// contradiction found, concatenated into one [`crate::error::ValidationError`].
///
/// # Errors
///
/// Returns [`crate::error::ValidationError`] listing every problem found.
pub fn validate_config(config: &Config) -> Result<(), crate::error::ValidationError> {
    let mut errors = Vec::new();

    let tombstoned_roles: HashSet<&str> = config.tombstoned_roles.iter().map(String::as_str).collect();
    let defined_databases: HashSet<&str> = config.databases.iter().map(String::as_str).collect();
    let defined_schemas: HashSet<&str> = config.schemas.iter().map(String::as_str).collect();

    for name in config.roles.keys() {
        if tombstoned_roles.contains(name.as_str()) {
            errors.push(format!("Role {name} is both tombstoned and defined"));
        }
    }

    validate_databases(&config.databases, &config.tombstoned_databases, &mut errors);

    validate_privileges(
        TargetKind::Databases,
        &config.database_privileges,
        &defined_databases,
        &defined_schemas,
        &tombstoned_roles,
        &mut errors,
    );
    validate_privileges(
        TargetKind::Schemas,
        &config.schema_privileges,
        &defined_databases,
        &defined_schemas,
        &tombstoned_roles,
        &mut errors,
    );
    validate_privileges(
        TargetKind::Tables,
        &config.table_privileges,
        &defined_databases,
        &defined_schemas,
        &tombstoned_roles,
        &mut errors,
    );
    validate_privileges(
        TargetKind::Sequences,
        &config.sequence_privileges,
        &defined_databases,
        &defined_schemas,
        &tombstoned_roles,
        &mut errors,
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::error::ValidationError(errors))
    }
}

fn validate_databases(names: &[String], tombstoned: &[String], errors: &mut Vec<String>) {
    let tombstoned: HashSet<&str> = tombstoned.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let mut dupes = HashSet::new();
    for name in names {
        if !crate::escape::is_bare_identifier(name) {
            errors.push(format!(
                "Database {name:?} would need its name escaped, which isn't properly supported by this tool yet"
            ));
        }
        if tombstoned.contains(name.as_str()) {
            errors.push(format!("Database {name} is both tombstoned and defined"));
        }
        if !seen.insert(name.as_str()) {
            dupes.insert(name.as_str());
        }
    }
    for d in dupes {
        errors.push(format!("Database {d} is defined multiple times"));
    }
}

fn validate_privileges(
    kind: TargetKind,
    privs: &[GenericPrivilege],
    defined_databases: &HashSet<&str>,
    defined_schemas: &HashSet<&str>,
    tombstoned_roles: &HashSet<&str>,
    errors: &mut Vec<String>,
) {
    let singular = kind.field_name().trim_end_matches('s');
    for (i, p) in privs.iter().enumerate() {
        let src = format!("{singular}_privileges[{}]", i + 1);
        let populated = p.populated_kinds();
        match populated {
            [] => errors.push(format!("{src}: privilege is missing {} field", kind.field_name())),
            [(found, _)] if *found != kind => errors.push(format!(
                "{src}: privilege has wrong target field (want {:?}, got {:?})",
                kind.field_name(),
                found.field_name()
            )),
            [_] => {}
            many => {
                let names: Vec<&str> = many.iter().map(|(k, _)| k.field_name()).collect();
                errors.push(format!("{src}: privilege has invalid fields: {names:?}"));
            }
        }

        let valid = kind.valid_privileges();
        let unknown: Vec<&str> = p
            .privileges
            .iter()
            .filter(|name| name.as_str() != "ALL PRIVILEGES" && !valid.contains(&name.as_str()))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            errors.push(format!(
                "{src}: privilege has invalid privileges {unknown:?} for {singular}_privileges"
            ));
        }

        // Targets are shaped per kind (bare name for databases, `db.schema`
        // for schemas, `db.schema.name` for everything else), so parse them
        // kind-aware rather than chaining a generic two-level split — the
        // latter misreads a bare database name as an unmanaged schema.
        for target in p.targets() {
            match kind {
                TargetKind::Databases => {
                    if !defined_databases.contains(target.as_str()) {
                        errors.push(format!("{src}: privilege specified for unmanaged database {target:?}"));
                    }
                }
                TargetKind::Schemas => {
                    let (db, _) = split_object_name(target);
                    if !db.is_empty() && !defined_databases.contains(db) {
                        errors.push(format!("{src}: privilege specified for unmanaged database {db:?}"));
                    }
                    if !defined_schemas.contains(target.as_str()) {
                        errors.push(format!("{src}: privilege specified for unmanaged schema {target:?}"));
                    }
                }
                _ => {
                    let (db, rest) = split_object_name(target);
                    if !db.is_empty() && !defined_databases.contains(db) {
                        errors.push(format!("{src}: privilege specified for unmanaged database {db:?}"));
                    }
                    let (schema, _) = split_object_name(rest);
                    if !schema.is_empty() {
                        let full_schema = crate::escape::join_schema_name(db, schema);
                        if !defined_schemas.contains(full_schema.as_str()) {
                            errors.push(format!("{src}: privilege specified for unmanaged schema {full_schema:?}"));
                        }
                    }
                }
            }
        }

        for role in &p.roles {
            if tombstoned_roles.contains(role.as_str()) {
                errors.push(format!("{src}: Role {role} is tombstoned and shouldn't be used"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoleAttributes;

    #[test]
    fn role_both_defined_and_tombstoned_is_an_error() {
        let mut config = Config::default();
        config.roles.insert("bob".to_owned(), RoleAttributes::default());
        config.tombstoned_roles.push("bob".to_owned());

        let err = validate_config(&config).unwrap_err();
        assert!(err.0.iter().any(|m| m.contains("both tombstoned and defined")));
        assert!(err.to_string().contains("Config is invalid"));
    }

    #[test]
    fn privilege_missing_target_list_is_an_error() {
        let mut config = Config::default();
        config.table_privileges.push(GenericPrivilege::default());
        let err = validate_config(&config).unwrap_err();
        assert!(err.0.iter().any(|m| m.contains("missing tables field")));
    }

    #[test]
    fn privilege_referencing_undefined_database_is_an_error() {
        let mut config = Config::default();
        config.table_privileges.push(GenericPrivilege::new(
            vec!["alice".to_owned()],
            vec!["SELECT".to_owned()],
            false,
            TargetKind::Tables,
            vec!["unmanaged.public.t1".to_owned()],
        ));
        let err = validate_config(&config).unwrap_err();
        assert!(err.0.iter().any(|m| m.contains("unmanaged database")));
    }

    #[test]
    fn all_privileges_pseudo_privilege_is_always_accepted() {
        let mut config = Config::default();
        config.databases.push("app".to_owned());
        config.schemas.push("app.public".to_owned());
        config.table_privileges.push(GenericPrivilege::new(
            vec!["alice".to_owned()],
            vec!["ALL PRIVILEGES".to_owned()],
            false,
            TargetKind::Tables,
            vec!["app.public.t1".to_owned()],
        ));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn duplicate_database_names_are_an_error() {
        let mut config = Config::default();
        config.databases.push("app".to_owned());
        config.databases.push("app".to_owned());
        let err = validate_config(&config).unwrap_err();
        assert!(err.0.iter().any(|m| m.contains("defined multiple times")));
    }

    #[test]
    fn database_privilege_for_a_managed_database_validates_cleanly() {
        let mut config = Config::default();
        config.databases.push("app".to_owned());
        config.database_privileges.push(GenericPrivilege::new(
            vec!["alice".to_owned()],
            vec!["CONNECT".to_owned()],
            false,
            TargetKind::Databases,
            vec!["app".to_owned()],
        ));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn database_privilege_for_an_unmanaged_database_is_an_error() {
        let mut config = Config::default();
        config.database_privileges.push(GenericPrivilege::new(
            vec!["alice".to_owned()],
            vec!["CONNECT".to_owned()],
            false,
            TargetKind::Databases,
            vec!["ghost".to_owned()],
        ));
        let err = validate_config(&config).unwrap_err();
        assert!(err.0.iter().any(|m| m.contains("unmanaged database")));
    }

    #[test]
    fn schema_privilege_for_an_unmanaged_schema_is_an_error() {
        let mut config = Config::default();
        config.databases.push("app".to_owned());
        config.schema_privileges.push(GenericPrivilege::new(
            vec!["alice".to_owned()],
            vec!["USAGE".to_owned()],
            false,
            TargetKind::Schemas,
            vec!["app.ghost".to_owned()],
        ));
        let err = validate_config(&config).unwrap_err();
        assert!(err.0.iter().any(|m| m.contains("unmanaged schema")));
    }
}
