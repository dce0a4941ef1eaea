//! Read-only guard for SQL issued against the local store

use regex::Regex;
use toolguard_application::FallbackError;

/// Statements that modify data or the connection are never issued
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "truncate", "attach", "pragma",
];

/// Accept only a single SELECT/WITH statement without modifying keywords
pub fn ensure_read_only(sql: &str) -> Result<(), FallbackError> {
    let statement = sql.trim().trim_end_matches(';').trim();
    if statement.is_empty() {
        return Err(FallbackError::ReadOnlyViolation("empty statement".into()));
    }
    if statement.contains(';') {
        return Err(FallbackError::ReadOnlyViolation(
            "multiple statements are not allowed".into(),
        ));
    }

    let lowered = statement.to_lowercase();
    if !(lowered.starts_with("select") || lowered.starts_with("with")) {
        return Err(FallbackError::ReadOnlyViolation(
            "only SELECT or WITH queries are allowed".into(),
        ));
    }

    let pattern = format!(r"\b({})\b", FORBIDDEN_KEYWORDS.join("|"));
    let forbidden = Regex::new(&pattern)
        .map_err(|e| FallbackError::ReadOnlyViolation(format!("guard pattern: {}", e)))?;
    if let Some(found) = forbidden.find(&lowered) {
        return Err(FallbackError::ReadOnlyViolation(format!(
            "forbidden keyword '{}'",
            found.as_str()
        )));
    }
    Ok(())
}

/// Bound a query to `max_rows` unless it already carries a LIMIT clause
pub fn enforce_limit(sql: &str, max_rows: usize) -> String {
    let statement = sql.trim().trim_end_matches(';').trim();
    let has_limit = statement
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|word| word.eq_ignore_ascii_case("limit"));
    if has_limit {
        statement.to_string()
    } else {
        format!("SELECT * FROM ({}) AS _sub LIMIT {}", statement, max_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_and_with_pass() {
        assert!(ensure_read_only("SELECT id FROM products").is_ok());
        assert!(ensure_read_only("  with t AS (SELECT 1) SELECT * FROM t;").is_ok());
        // keyword inside an identifier is fine
        assert!(ensure_read_only("SELECT created_at, updated_by FROM orders").is_ok());
    }

    #[test]
    fn test_modifying_statements_are_rejected() {
        for sql in [
            "DELETE FROM orders",
            "SELECT 1; DROP TABLE customers",
            "WITH x AS (SELECT 1) INSERT INTO t SELECT * FROM x",
            "PRAGMA table_info(orders)",
            "",
        ] {
            assert!(
                matches!(ensure_read_only(sql), Err(FallbackError::ReadOnlyViolation(_))),
                "accepted: {sql}"
            );
        }
    }

    #[test]
    fn test_enforce_limit() {
        assert_eq!(
            enforce_limit("SELECT id FROM products ORDER BY id;", 50),
            "SELECT * FROM (SELECT id FROM products ORDER BY id) AS _sub LIMIT 50"
        );
        let limited = "SELECT id FROM customers\n LIMIT ?";
        assert_eq!(enforce_limit(limited, 50), limited);
    }
}
