//! Read-only statement gate
//!
//! A prefix check, not a SQL parser: the trimmed statement must begin with
//! `SELECT`. Statements opening with a comment or a `WITH` clause are rejected,
//! and keywords smuggled into subqueries or trailing statements are not detected.

use crate::error::{DbdexError, Result};
use tracing::warn;

const READ_ONLY_KEYWORD: &str = "SELECT";

/// Message carried by [`DbdexError::InvalidQuery`] on rejection
pub const REJECTION_MESSAGE: &str = "Only SELECT style queries are allowed";

/// Fail with `InvalidQuery` unless `sql` is a SELECT statement
///
/// The keyword comparison ignores ASCII case.
pub fn validate_read_only(sql: &str) -> Result<()> {
    let trimmed = sql.trim_start();
    let accepted = trimmed
        .get(..READ_ONLY_KEYWORD.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(READ_ONLY_KEYWORD));

    if accepted {
        Ok(())
    } else {
        warn!(sql = %sql, "rejected non read-only statement");
        Err(DbdexError::InvalidQuery(REJECTION_MESSAGE.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_select_with_surrounding_whitespace() {
        assert!(validate_read_only("SELECT 1").is_ok());
        assert!(validate_read_only("  \n\tSELECT * FROM users  \n").is_ok());
        assert!(validate_read_only("select id from users").is_ok());
        assert!(validate_read_only("SeLeCt 1").is_ok());
    }

    #[test]
    fn test_rejects_writes() {
        for sql in [
            "DELETE FROM users",
            "UPDATE users SET name = 'x'",
            "INSERT INTO users VALUES (1)",
            "DROP TABLE users",
            "",
            "   ",
            "SEL",
        ] {
            let err = validate_read_only(sql).unwrap_err();
            assert!(matches!(err, DbdexError::InvalidQuery(ref m) if m == REJECTION_MESSAGE));
        }
    }

    #[test]
    fn test_prefix_only_limitations() {
        // leading comments and CTEs fail the prefix check
        assert!(validate_read_only("-- top\nSELECT 1").is_err());
        assert!(validate_read_only("WITH t AS (SELECT 1) SELECT * FROM t").is_err());
        // trailing statements are not inspected
        assert!(validate_read_only("SELECT 1; DELETE FROM users").is_ok());
    }

    #[test]
    fn test_multibyte_input_does_not_panic() {
        assert!(validate_read_only("ééé").is_err());
    }
}
