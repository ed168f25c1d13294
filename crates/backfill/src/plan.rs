//! Pure pieces of the backfill: table name validation and statement text.

use std::fmt;

use anyhow::bail;

/// Workspace id carried by records created before workspaces existed.
pub const LEGACY_WORKSPACE_ID: &str = "default";

/// Postgres truncates identifiers beyond this length.
const MAX_IDENTIFIER_LEN: usize = 63;

/// A table name safe to splice into SQL: `name` or `schema.name`, each part
/// a plain identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let raw = raw.trim();
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() > 2 {
            bail!("table name '{raw}' has too many parts");
        }
        for part in &parts {
            if !is_plain_identifier(part) {
                bail!("table name '{raw}' is not a plain identifier");
            }
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM {} WHERE workspace_id = $1", self.0)
    }

    pub fn rewrite_sql(&self) -> String {
        format!(
            "UPDATE {} SET workspace_id = $1 WHERE workspace_id = $2",
            self.0
        )
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    s.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate every table and reject duplicates.
pub fn parse_tables(raw: &[String]) -> anyhow::Result<Vec<TableName>> {
    let mut tables: Vec<TableName> = Vec::with_capacity(raw.len());
    for name in raw {
        let table = TableName::parse(name)?;
        if tables.contains(&table) {
            bail!("table '{table}' listed twice");
        }
        tables.push(table);
    }
    if tables.is_empty() {
        bail!("at least one --table is required");
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_qualified_names_are_accepted() {
        assert_eq!(TableName::parse("cash_entries").unwrap().as_str(), "cash_entries");
        assert_eq!(
            TableName::parse("Ledger.Cash_Entries").unwrap().as_str(),
            "ledger.cash_entries"
        );
        assert!(TableName::parse("_private").is_ok());
    }

    #[test]
    fn injection_attempts_are_rejected() {
        for bad in [
            "",
            "1table",
            "cash entries",
            "entries; DROP TABLE workspaces",
            "entries--",
            "a.b.c",
            "\"quoted\"",
            "schema.",
        ] {
            assert!(TableName::parse(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(TableName::parse(&"x".repeat(64)).is_err());
    }

    #[test]
    fn statements_bind_ids_as_parameters() {
        let table = TableName::parse("cash_entries").unwrap();
        assert_eq!(
            table.rewrite_sql(),
            "UPDATE cash_entries SET workspace_id = $1 WHERE workspace_id = $2"
        );
        assert!(!table.count_sql().contains(LEGACY_WORKSPACE_ID));
    }

    #[test]
    fn duplicate_and_missing_tables_fail() {
        let dup = vec!["entries".to_string(), "ENTRIES".to_string()];
        assert!(parse_tables(&dup).is_err());
        assert!(parse_tables(&[]).is_err());
        assert_eq!(
            parse_tables(&["a".to_string(), "b".to_string()]).unwrap().len(),
            2
        );
    }
}
