//! SQL identifier and string-literal escaping.
//!
//! Ports the escaping rules a reconciler needs to emit safe `CREATE`/`GRANT`
//! statements without a prepared-statement placeholder for identifiers
//! (Postgres has none) or without over-escaping simple ASCII literals.

use std::fmt::Write as _;

use regex::Regex;
use std::sync::LazyLock;

static SAFE_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex is valid"));

/// PostgreSQL reserved keywords that force quoting even when the identifier
/// is otherwise a valid bareword. Not exhaustive of every contextual
/// keyword Postgres recognizes, only the ones reserved in all contexts.
static RESERVED_KEYWORDS: phf::Set<&'static str> = phf::phf_set! {
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc",
    "asymmetric", "authorization", "between", "bigint", "binary", "bit",
    "boolean", "both", "case", "cast", "char", "character", "check",
    "coalesce", "collate", "collation", "column", "concurrently",
    "constraint", "create", "cross", "current_catalog", "current_date",
    "current_role", "current_schema", "current_time", "current_timestamp",
    "current_user", "dec", "decimal", "default", "deferrable", "desc",
    "distinct", "do", "else", "end", "except", "exists", "extract", "false",
    "fetch", "float", "for", "foreign", "freeze", "from", "full", "grant",
    "group", "having", "ilike", "in", "initially", "inner", "inout", "int",
    "integer", "intersect", "into", "is", "isnull", "join", "lateral",
    "leading", "left", "like", "limit", "localtime", "localtimestamp",
    "national", "natural", "nchar", "none", "normalize", "not", "notnull",
    "null", "nullif", "numeric", "offset", "on", "only", "or", "order",
    "out", "outer", "overlaps", "overlay", "placing", "position",
    "precision", "primary", "real", "references", "returning", "right",
    "role", "row", "select", "session_user", "setof", "similar", "smallint",
    "some", "substring", "symmetric", "table", "tablesample", "then",
    "time", "timestamp", "to", "trailing", "treat", "trim", "true", "union",
    "unique", "user", "using", "values", "varchar", "variadic", "verbose",
    "when", "where", "window", "with", "xmlattributes", "xmlconcat",
    "xmlelement", "xmlexists", "xmlforest", "xmlnamespaces", "xmlparse",
    "xmlpi", "xmlroot", "xmlserialize", "xmltable",
};

fn needs_escaping(s: &str) -> bool {
    !SAFE_IDENTIFIER.is_match(s) || RESERVED_KEYWORDS.contains(s.to_ascii_lowercase().as_str())
}

/// True iff `s` matches the bare-identifier character class, regardless of
/// whether it happens to be a reserved keyword. Database names are never
/// quoted by this tool, so this (not [`needs_escaping`]) is what decides
/// whether a database name is supported at all.
#[must_use]
pub fn is_bare_identifier(s: &str) -> bool {
    SAFE_IDENTIFIER.is_match(s)
}

/// Quote `s` as a SQL identifier iff it requires it, doubling any embedded
/// double quotes.
#[must_use]
pub fn safe_identifier(s: &str) -> String {
    if needs_escaping(s) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_owned()
    }
}

/// Quote `s` as a SQL string literal, switching to the `E'...'` C-style
/// escape form when it contains anything a plain `'...'` literal cannot
/// represent unambiguously.
#[must_use]
pub fn escape(s: &str) -> String {
    let needs_c_style = s
        .chars()
        .any(|c| matches!(c, '\n' | '\r' | '\\') || c as u32 > 127 || (c.is_control() && c != '\t'));

    if !needs_c_style {
        return format!("'{}'", s.replace('\'', "''"));
    }

    let mut out = String::with_capacity(s.len() + 2);
    out.push_str("E'");
    for c in s.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) > 127 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Split `"database.rest"` on the first `.`, as used for schema- and
/// table-qualified target names.
///
/// A target with no `.` at all (a bare database-privilege target, e.g.
/// `"app"`) has no database component by this rule — it splits as
/// `("", "app")`, not `("app", "")`. Callers that iterate a privilege's own
/// database by object identity (not by schema/table qualification) rely on
/// this: cluster-wide privilege sync passes `""` as the "current database"
/// sentinel precisely so it matches a bare target's empty database half.
#[must_use]
pub fn split_object_name(s: &str) -> (&str, &str) {
    match s.split_once('.') {
        Some((db, rest)) => (db, rest),
        None => ("", s),
    }
}

/// `database.safe_identifier(schema)`.
#[must_use]
pub fn join_schema_name(database: &str, schema: &str) -> String {
    format!("{database}.{}", safe_identifier(schema))
}

/// `database.safe_identifier(schema).safe_identifier(table)`.
#[must_use]
pub fn join_table_name(database: &str, schema: &str, table: &str) -> String {
    format!(
        "{database}.{}.{}",
        safe_identifier(schema),
        safe_identifier(table)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifier_is_unchanged() {
        assert_eq!(safe_identifier("alice"), "alice");
        assert_eq!(safe_identifier("t1"), "t1");
    }

    #[test]
    fn reserved_keyword_is_quoted() {
        assert_eq!(safe_identifier("select"), "\"select\"");
        assert_eq!(safe_identifier("User"), "\"User\"");
    }

    #[test]
    fn identifier_with_special_characters_is_quoted_and_doubled() {
        assert_eq!(safe_identifier("weird\"name"), "\"weird\"\"name\"");
        assert_eq!(safe_identifier("has space"), "\"has space\"");
    }

    #[test]
    fn simple_literal_uses_plain_quotes() {
        assert_eq!(escape("hunter2"), "'hunter2'");
        assert_eq!(escape("o'brien"), "'o''brien'");
    }

    #[test]
    fn literal_with_newline_uses_c_style_escape() {
        assert_eq!(escape("a\nb"), "E'a\\nb'");
    }

    #[test]
    fn literal_with_unicode_uses_codepoint_escape() {
        assert_eq!(escape("caf\u{e9}"), "E'caf\\u00e9'");
    }

    #[test]
    fn split_object_name_splits_on_first_dot() {
        assert_eq!(split_object_name("app.public.t1"), ("app", "public.t1"));
    }

    #[test]
    fn split_object_name_with_no_dot_has_no_database_half() {
        assert_eq!(split_object_name("app"), ("", "app"));
    }

    #[test]
    fn join_table_name_quotes_schema_and_table_independently() {
        assert_eq!(join_table_name("app", "public", "select"), "app.public.\"select\"");
    }
}
