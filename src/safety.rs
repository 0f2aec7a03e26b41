//! Read-only guard for generated SQL
//!
//! Flags statements that could modify data or schema. Generation does not
//! block on a violation; it reports it as a warning for the caller to act on.

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "ALTER", "DROP", "TRUNCATE", "EXEC", "EXECUTE",
    "CREATE", "GRANT", "REVOKE", "BACKUP", "RESTORE",
    // SELECT ... INTO creates a table
    "INTO", "PRAGMA", "DBCC", "DENY",
];

lazy_static! {
    static ref FORBIDDEN: Regex = Regex::new(&format!(
        r"(?i)\b({})\b",
        FORBIDDEN_KEYWORDS.join("|")
    ))
    .unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyViolation {
    NotAQuery,
    ForbiddenKeyword(String),
}

impl fmt::Display for SafetyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyViolation::NotAQuery => {
                write!(f, "Generated SQL does not start with SELECT or WITH")
            }
            SafetyViolation::ForbiddenKeyword(kw) => {
                write!(f, "Generated SQL contains forbidden keyword {}", kw)
            }
        }
    }
}

/// Ok when `sql` is a single read-only query.
pub fn check_read_only(sql: &str) -> Result<(), SafetyViolation> {
    let upper = sql.trim().to_uppercase();
    if !upper.starts_with("SELECT") && !upper.starts_with("WITH") {
        return Err(SafetyViolation::NotAQuery);
    }
    if let Some(m) = FORBIDDEN.find(sql) {
        return Err(SafetyViolation::ForbiddenKeyword(m.as_str().to_uppercase()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_select_is_safe() {
        assert!(check_read_only("SELECT TOP 5 DeviceName FROM dbo.CpuPerformance").is_ok());
        assert!(check_read_only("  with x as (select 1 as a) select a from x").is_ok());
    }

    #[test]
    fn test_keywords_inside_identifiers_are_fine() {
        assert!(check_read_only("SELECT LastUpdateDate, created_by FROM t").is_ok());
    }

    #[test]
    fn test_violations() {
        assert_eq!(
            check_read_only("DELETE FROM t"),
            Err(SafetyViolation::NotAQuery)
        );
        assert_eq!(
            check_read_only("SELECT * INTO backup_t FROM t"),
            Err(SafetyViolation::ForbiddenKeyword("INTO".to_string()))
        );
        assert_eq!(
            check_read_only("SELECT 1; drop table t"),
            Err(SafetyViolation::ForbiddenKeyword("DROP".to_string()))
        );
    }
}
