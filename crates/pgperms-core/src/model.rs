//! The desired/observed-state data model: roles, privileges, and the
//! top-level configuration document.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The object category a privilege grant applies to.
///
/// Only [`TargetKind::Databases`], [`TargetKind::Schemas`],
/// [`TargetKind::Tables`], and [`TargetKind::Sequences`] are reconciled by
/// the diff engine. [`TargetKind::Types`] is accepted and validated (for
/// forward compatibility with dumped configs) but never gathered or
/// diffed — mirroring the upstream implementation this was ported from,
/// which defines a types-privilege fetcher that its own top-level sync
/// never calls. The remaining variants exist only so the validator can
/// name the field a config author populated by mistake; columns,
/// tablespaces, foreign-object, and routine/language grants are out of
/// scope entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetKind {
    Databases,
    Schemas,
    Tables,
    Sequences,
    Types,
    Columns,
    Domains,
    ForeignDataWrappers,
    ForeignServers,
    Routines,
    Languages,
    LargeObjects,
    Tablespaces,
}

impl TargetKind {
    /// All variants, in the order their YAML fields are checked — stable
    /// so that a config with more than one populated field reports the
    /// first match consistently.
    pub const ALL: [TargetKind; 13] = [
        TargetKind::Databases,
        TargetKind::Schemas,
        TargetKind::Tables,
        TargetKind::Sequences,
        TargetKind::Types,
        TargetKind::Columns,
        TargetKind::Domains,
        TargetKind::ForeignDataWrappers,
        TargetKind::ForeignServers,
        TargetKind::Routines,
        TargetKind::Languages,
        TargetKind::LargeObjects,
        TargetKind::Tablespaces,
    ];

    /// The YAML field name this kind is spelled with on a `GenericPrivilege`.
    #[must_use]
    pub fn field_name(self) -> &'static str {
        match self {
            TargetKind::Databases => "databases",
            TargetKind::Schemas => "schemas",
            TargetKind::Tables => "tables",
            TargetKind::Sequences => "sequences",
            TargetKind::Types => "types",
            TargetKind::Columns => "columns",
            TargetKind::Domains => "domains",
            TargetKind::ForeignDataWrappers => "foreignDataWrappers",
            TargetKind::ForeignServers => "foreignServers",
            TargetKind::Routines => "routines",
            TargetKind::Languages => "languages",
            TargetKind::LargeObjects => "largeObjects",
            TargetKind::Tablespaces => "tablespaces",
        }
    }

    /// The singular `GRANT ... ON <keyword> ...` keyword for this kind.
    #[must_use]
    pub fn sql_keyword(self) -> &'static str {
        match self {
            TargetKind::Databases => "DATABASE",
            TargetKind::Schemas => "SCHEMA",
            TargetKind::Tables => "TABLE",
            TargetKind::Sequences => "SEQUENCE",
            TargetKind::Types => "TYPE",
            TargetKind::Columns => "COLUMN",
            TargetKind::Domains => "DOMAIN",
            TargetKind::ForeignDataWrappers => "FOREIGN DATA WRAPPER",
            TargetKind::ForeignServers => "FOREIGN SERVER",
            TargetKind::Routines => "ROUTINE",
            TargetKind::Languages => "LANGUAGE",
            TargetKind::LargeObjects => "LARGE OBJECT",
            TargetKind::Tablespaces => "TABLESPACE",
        }
    }

    /// The privilege names valid for this kind, in canonical bit order.
    #[must_use]
    pub fn valid_privileges(self) -> &'static [&'static str] {
        match self {
            TargetKind::Databases => &["CREATE", "TEMPORARY", "CONNECT"],
            TargetKind::Schemas => &["USAGE", "CREATE"],
            TargetKind::Tables => &[
                "SELECT",
                "INSERT",
                "UPDATE",
                "DELETE",
                "TRUNCATE",
                "REFERENCES",
                "TRIGGER",
            ],
            TargetKind::Sequences => &["SELECT", "UPDATE", "USAGE"],
            TargetKind::Types
            | TargetKind::Domains
            | TargetKind::Languages
            | TargetKind::ForeignDataWrappers
            | TargetKind::ForeignServers => &["USAGE"],
            TargetKind::Routines => &["EXECUTE"],
            TargetKind::Tablespaces => &["CREATE"],
            TargetKind::LargeObjects => &["SELECT", "UPDATE"],
            TargetKind::Columns => &["SELECT", "INSERT", "UPDATE", "DELETE"],
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

const PRIVILEGE_ORDER: [&str; 12] = [
    "SELECT", "INSERT", "UPDATE", "DELETE", "TRUNCATE", "REFERENCES", "TRIGGER", "CREATE",
    "CONNECT", "TEMPORARY", "EXECUTE", "USAGE",
];
const SHORT_CODES: [char; 12] = ['r', 'a', 'w', 'd', 'D', 'x', 't', 'C', 'c', 'T', 'X', 'U'];

fn bit_for(privilege: &str) -> Option<u32> {
    PRIVILEGE_ORDER.iter().position(|p| *p == privilege).map(|i| i as u32)
}

/// A compact bitset over the 12 canonical privilege names, used both to
/// accumulate observed grants and as a grouping key while merging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrivilegeSet(u16);

impl PrivilegeSet {
    #[must_use]
    pub fn empty() -> Self {
        Self(0)
    }

    /// Mark `privilege` present.
    ///
    /// # Panics
    ///
    /// Panics if `privilege` is not one of the 12 canonical names — by the
    /// time this is called the validator has already rejected unknown
    /// privilege names as a configuration error, so reaching this with an
    /// unknown name is a programming error, not user input.
    pub fn add(&mut self, privilege: &str) {
        let bit = bit_for(privilege)
            .unwrap_or_else(|| panic!("pgperms-core: unknown privilege {privilege:?}"));
        self.0 |= 1 << bit;
    }

    #[must_use]
    pub fn contains(self, privilege: &str) -> bool {
        bit_for(privilege).is_some_and(|bit| self.0 & (1 << bit) != 0)
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The privileges present, in canonical order.
    #[must_use]
    pub fn list(self) -> Vec<&'static str> {
        PRIVILEGE_ORDER
            .iter()
            .enumerate()
            .filter(|(i, _)| self.0 & (1 << i) != 0)
            .map(|(_, name)| *name)
            .collect()
    }

    /// Single-character codes for the privileges present, used only as an
    /// internal grouping key (never emitted in SQL or YAML).
    #[must_use]
    pub fn to_short_string(self) -> String {
        SHORT_CODES
            .iter()
            .enumerate()
            .filter(|(i, _)| self.0 & (1 << i) != 0)
            .map(|(_, c)| *c)
            .collect()
    }

    /// True iff this set contains exactly the full valid set for `kind`.
    #[must_use]
    pub fn is_full_set_for(self, kind: TargetKind) -> bool {
        let mut full = Self::empty();
        for p in kind.valid_privileges() {
            full.add(p);
        }
        full == self
    }

    /// `["ALL PRIVILEGES"]` when the set is the full valid set for `kind`,
    /// otherwise the individual privilege names.
    #[must_use]
    pub fn list_or_all(self, kind: TargetKind) -> Vec<String> {
        if self.is_full_set_for(kind) {
            vec!["ALL PRIVILEGES".to_owned()]
        } else {
            self.list().into_iter().map(str::to_owned).collect()
        }
    }

    /// Expand `"ALL PRIVILEGES"` in `names` to the full valid set for
    /// `kind`; pass other names through, accumulating into a set.
    #[must_use]
    pub fn from_names(names: &[String], kind: TargetKind) -> Self {
        let mut set = Self::empty();
        for name in names {
            if name == "ALL PRIVILEGES" {
                for p in kind.valid_privileges() {
                    set.add(p);
                }
            } else {
                set.add(name);
            }
        }
        set
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One role's attributes, as they appear under `roles.<name>` in a desired
/// state document or as gathered from `pg_authid`.
///
/// Tri-state attributes (`inherit`, `login`) are `None` when absent from
/// the source, which the server and this tool both treat as `true` — call
/// [`Self::effective_inherit`]/[`Self::effective_login`] rather than
/// matching the field directly, or a future default flip will silently
/// change behavior.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RoleAttributes {
    #[serde(skip_serializing_if = "is_false")]
    pub superuser: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub createdb: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub createrole: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<bool>,
    #[serde(skip_serializing_if = "is_false")]
    pub replication: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub bypassrls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connectionlimit: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validuntil: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty", rename = "member_of")]
    pub member_of: Vec<String>,
}

impl RoleAttributes {
    #[must_use]
    pub fn effective_inherit(&self) -> bool {
        self.inherit.unwrap_or(true)
    }

    #[must_use]
    pub fn effective_login(&self) -> bool {
        self.login.unwrap_or(true)
    }

    #[must_use]
    pub fn effective_connection_limit(&self) -> i32 {
        self.connectionlimit.unwrap_or(-1)
    }

    /// The `CREATE ROLE` statement for a role that does not yet exist.
    #[must_use]
    pub fn create_sql(&self, username: &str) -> String {
        let mut q = format!("CREATE ROLE {username}");
        if self.superuser {
            q.push_str(" SUPERUSER");
        }
        if self.createdb {
            q.push_str(" CREATEDB");
        }
        if self.createrole {
            q.push_str(" CREATEROLE");
        }
        if !self.effective_inherit() {
            q.push_str(" NOINHERIT");
        }
        if self.effective_login() {
            q.push_str(" LOGIN");
        }
        if self.replication {
            q.push_str(" REPLICATION");
        }
        if self.bypassrls {
            q.push_str(" BYPASSRLS");
        }
        if let Some(limit) = self.connectionlimit {
            q.push_str(&format!(" CONNECTION LIMIT {limit}"));
        }
        if let Some(password) = &self.password {
            if !password.is_empty() {
                q.push_str(" PASSWORD ");
                q.push_str(&crate::escape::escape(password));
            }
        }
        if let Some(valid_until) = &self.validuntil {
            q.push_str(" VALID UNTIL ");
            q.push_str(&crate::escape::escape(&valid_until.to_rfc3339()));
        }
        q
    }
}

/// A normalized grant/revoke target: exactly one of the 13 possible kind
/// fields was populated on the YAML document this was parsed from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenericPrivilege {
    pub roles: Vec<String>,
    pub privileges: Vec<String>,
    pub grantable: bool,
    populated: Vec<(TargetKind, Vec<String>)>,
}

impl GenericPrivilege {
    #[must_use]
    pub fn new(roles: Vec<String>, privileges: Vec<String>, grantable: bool, kind: TargetKind, targets: Vec<String>) -> Self {
        Self {
            roles,
            privileges,
            grantable,
            populated: vec![(kind, targets)],
        }
    }

    /// Every kind field that held a non-empty target list, in document
    /// order. Empty iff the config omitted a target list entirely;
    /// more than one entry iff the config populated more than one —
    /// both are validator errors.
    #[must_use]
    pub fn populated_kinds(&self) -> &[(TargetKind, Vec<String>)] {
        &self.populated
    }

    /// `Some(kind)` iff exactly one target list was populated.
    #[must_use]
    pub fn kind(&self) -> Option<TargetKind> {
        match self.populated.as_slice() {
            [(kind, _)] => Some(*kind),
            _ => None,
        }
    }

    /// The populated target list, or an empty slice if none (or more than
    /// one) was populated.
    #[must_use]
    pub fn targets(&self) -> &[String] {
        match self.populated.as_slice() {
            [(_, targets)] => targets,
            _ => &[],
        }
    }

    #[must_use]
    pub fn privilege_set(&self) -> PrivilegeSet {
        let kind = self.kind().unwrap_or(TargetKind::Tables);
        PrivilegeSet::from_names(&self.privileges, kind)
    }

    /// Replace the target list for the single populated kind with
    /// `targets`, used after wildcard expansion. No-op if zero or more
    /// than one kind is populated — callers only expand well-formed
    /// entries that already passed validation.
    pub fn replace_targets(&mut self, targets: Vec<String>) {
        if let [(_, existing)] = self.populated.as_mut_slice() {
            *existing = targets;
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
struct GenericPrivilegeRaw {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    roles: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    privileges: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    grantable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    databases: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schemas: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tables: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    domains: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "foreignDataWrappers")]
    foreign_data_wrappers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "foreignServers")]
    foreign_servers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    routines: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    languages: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "largeObjects")]
    large_objects: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tablespaces: Option<Vec<String>>,
}

impl GenericPrivilegeRaw {
    fn field(&self, kind: TargetKind) -> &Option<Vec<String>> {
        match kind {
            TargetKind::Databases => &self.databases,
            TargetKind::Schemas => &self.schemas,
            TargetKind::Tables => &self.tables,
            TargetKind::Sequences => &self.sequences,
            TargetKind::Types => &self.types,
            TargetKind::Columns => &self.columns,
            TargetKind::Domains => &self.domains,
            TargetKind::ForeignDataWrappers => &self.foreign_data_wrappers,
            TargetKind::ForeignServers => &self.foreign_servers,
            TargetKind::Routines => &self.routines,
            TargetKind::Languages => &self.languages,
            TargetKind::LargeObjects => &self.large_objects,
            TargetKind::Tablespaces => &self.tablespaces,
        }
    }

    fn field_mut(&mut self, kind: TargetKind) -> &mut Option<Vec<String>> {
        match kind {
            TargetKind::Databases => &mut self.databases,
            TargetKind::Schemas => &mut self.schemas,
            TargetKind::Tables => &mut self.tables,
            TargetKind::Sequences => &mut self.sequences,
            TargetKind::Types => &mut self.types,
            TargetKind::Columns => &mut self.columns,
            TargetKind::Domains => &mut self.domains,
            TargetKind::ForeignDataWrappers => &mut self.foreign_data_wrappers,
            TargetKind::ForeignServers => &mut self.foreign_servers,
            TargetKind::Routines => &mut self.routines,
            TargetKind::Languages => &mut self.languages,
            TargetKind::LargeObjects => &mut self.large_objects,
            TargetKind::Tablespaces => &mut self.tablespaces,
        }
    }
}

impl From<GenericPrivilegeRaw> for GenericPrivilege {
    fn from(raw: GenericPrivilegeRaw) -> Self {
        let populated = TargetKind::ALL
            .into_iter()
            .filter_map(|kind| {
                raw.field(kind)
                    .as_ref()
                    .filter(|targets| !targets.is_empty())
                    .map(|targets| (kind, targets.clone()))
            })
            .collect();
        GenericPrivilege {
            roles: raw.roles,
            privileges: raw.privileges,
            grantable: raw.grantable,
            populated,
        }
    }
}

impl From<&GenericPrivilege> for GenericPrivilegeRaw {
    fn from(value: &GenericPrivilege) -> Self {
        let mut raw = GenericPrivilegeRaw {
            roles: value.roles.clone(),
            privileges: value.privileges.clone(),
            grantable: value.grantable,
            ..GenericPrivilegeRaw::default()
        };
        for (kind, targets) in &value.populated {
            *raw.field_mut(*kind) = Some(targets.clone());
        }
        raw
    }
}

impl<'de> Deserialize<'de> for GenericPrivilege {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        GenericPrivilegeRaw::deserialize(deserializer).map(GenericPrivilege::from)
    }
}

impl Serialize for GenericPrivilege {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        GenericPrivilegeRaw::from(self).serialize(serializer)
    }
}

/// The full desired (or observed) state document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_superuser_grants: Option<bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub roles: BTreeMap<String, RoleAttributes>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tombstoned_roles: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub databases: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tombstoned_databases: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub schemas: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tombstoned_schemas: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub database_privileges: Vec<GenericPrivilege>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub schema_privileges: Vec<GenericPrivilege>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub table_privileges: Vec<GenericPrivilege>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sequence_privileges: Vec<GenericPrivilege>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub type_privileges: Vec<GenericPrivilege>,
}

impl Config {
    #[must_use]
    pub fn effective_ignore_superuser_grants(&self) -> bool {
        self.ignore_superuser_grants.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privilege_set_collapses_to_all_privileges_for_a_full_set() {
        let mut set = PrivilegeSet::empty();
        for p in TargetKind::Tables.valid_privileges() {
            set.add(p);
        }
        assert!(set.is_full_set_for(TargetKind::Tables));
        assert_eq!(set.list_or_all(TargetKind::Tables), vec!["ALL PRIVILEGES"]);
    }

    #[test]
    fn privilege_set_partial_set_lists_individually() {
        let mut set = PrivilegeSet::empty();
        set.add("SELECT");
        assert!(!set.is_full_set_for(TargetKind::Tables));
        assert_eq!(set.list_or_all(TargetKind::Tables), vec!["SELECT"]);
    }

    #[test]
    fn from_names_expands_all_privileges() {
        let set = PrivilegeSet::from_names(&["ALL PRIVILEGES".to_owned()], TargetKind::Schemas);
        assert!(set.contains("USAGE"));
        assert!(set.contains("CREATE"));
    }

    #[test]
    fn role_attributes_create_sql_matches_expected_flag_order() {
        let role = RoleAttributes {
            superuser: true,
            createdb: true,
            login: Some(true),
            password: Some("hunter2".to_owned()),
            ..Default::default()
        };
        assert_eq!(
            role.create_sql("alice"),
            "CREATE ROLE alice SUPERUSER CREATEDB LOGIN PASSWORD 'hunter2'"
        );
    }

    #[test]
    fn role_attributes_noinherit_when_inherit_is_false() {
        let role = RoleAttributes {
            inherit: Some(false),
            ..Default::default()
        };
        assert_eq!(role.create_sql("bob"), "CREATE ROLE bob NOINHERIT LOGIN");
    }

    #[test]
    fn generic_privilege_round_trips_through_yaml() {
        let gp = GenericPrivilege::new(
            vec!["alice".to_owned()],
            vec!["SELECT".to_owned()],
            false,
            TargetKind::Tables,
            vec!["app.public.t1".to_owned()],
        );
        let text = serde_yaml::to_string(&gp).unwrap();
        let back: GenericPrivilege = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back.kind(), Some(TargetKind::Tables));
        assert_eq!(back.targets(), &["app.public.t1".to_owned()]);
    }

    #[test]
    fn generic_privilege_with_no_target_list_has_no_kind() {
        let raw = "roles: [alice]\nprivileges: [SELECT]\n";
        let gp: GenericPrivilege = serde_yaml::from_str(raw).unwrap();
        assert_eq!(gp.kind(), None);
        assert!(gp.populated_kinds().is_empty());
    }

    #[test]
    fn generic_privilege_with_two_target_lists_has_no_single_kind() {
        let raw = "roles: [alice]\nprivileges: [SELECT]\ntables: [app.public.t1]\nschemas: [app.public]\n";
        let gp: GenericPrivilege = serde_yaml::from_str(raw).unwrap();
        assert_eq!(gp.kind(), None);
        assert_eq!(gp.populated_kinds().len(), 2);
    }

    #[test]
    fn config_rejects_unknown_top_level_keys() {
        let raw = "roles: {}\nnot_a_real_key: true\n";
        assert!(serde_yaml::from_str::<Config>(raw).is_err());
    }
}
