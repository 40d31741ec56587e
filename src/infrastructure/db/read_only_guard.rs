//! Static checks applied to generated SQL before it reaches the database.
//!
//! The database role is expected to be read-only already; this guard rejects
//! obvious writes and stacked statements early so the rejection reason can be
//! fed back to the model like any other execution error.

use crate::domain::sql::{ExecutionError, ExecutionErrorKind};

/// Statements that write or change session state. Only checked as the leading
/// word, since names like `REPLACE` or `SET` also appear inside reads.
const NON_READ_STATEMENTS: [&str; 19] = [
    "REPLACE", "MERGE", "UPSERT", "CALL", "DO", "SET", "RESET", "LOCK", "BEGIN", "COMMIT",
    "ROLLBACK", "SAVEPOINT", "RELEASE", "REINDEX", "CLUSTER", "REFRESH", "COMMENT", "LOAD",
    "DISCARD",
];

const FORBIDDEN_KEYWORDS: [&str; 14] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
    "COPY", "ATTACH", "DETACH", "PRAGMA", "VACUUM",
];

/// Replaces string literals, quoted identifiers and comments with spaces so
/// keyword and terminator checks only see SQL structure.
pub fn mask_literals(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                out.push(' ');
                i += 1;
                while i < chars.len() {
                    if chars[i] == c {
                        // doubled quote is an escaped quote inside the literal
                        if i + 1 < chars.len() && chars[i + 1] == c {
                            out.push_str("  ");
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    out.push(if chars[i] == '\n' { '\n' } else { ' ' });
                    i += 1;
                }
                out.push(' ');
                i += 1;
            }
            '-' if i + 1 < chars.len() && chars[i + 1] == '-' => {
                while i < chars.len() && chars[i] != '\n' {
                    out.push(' ');
                    i += 1;
                }
            }
            '/' if i + 1 < chars.len() && chars[i + 1] == '*' => {
                out.push_str("  ");
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && i + 1 < chars.len() && chars[i + 1] == '/') {
                    out.push(' ');
                    i += 1;
                }
                out.push_str("  ");
                i += 2;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

fn contains_whole_word(masked_upper: &str, keyword: &str) -> bool {
    masked_upper
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|token| token == keyword)
}

/// Accepts exactly one statement, optionally terminated by `;`, that does not
/// write. Anything else, typos included, is left for the engine to report.
pub fn check_read_only(sql: &str) -> Result<(), ExecutionError> {
    let masked = mask_literals(sql);
    let trimmed = masked.trim();
    let body = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();

    if body.is_empty() {
        return Err(ExecutionError::new(
            ExecutionErrorKind::Syntax,
            "Empty SQL statement",
        ));
    }

    if body.contains(';') {
        return Err(ExecutionError::new(
            ExecutionErrorKind::ReadOnlyViolation,
            "Only a single SQL statement may be executed",
        ));
    }

    let upper = body.to_uppercase();
    let first_word = upper
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .find(|t| !t.is_empty())
        .unwrap_or("");
    if NON_READ_STATEMENTS.contains(&first_word) {
        return Err(ExecutionError::new(
            ExecutionErrorKind::ReadOnlyViolation,
            format!(
                "Only read-only queries are allowed (statement starts with {})",
                first_word
            ),
        ));
    }

    for keyword in FORBIDDEN_KEYWORDS {
        if contains_whole_word(&upper, keyword) {
            return Err(ExecutionError::new(
                ExecutionErrorKind::ReadOnlyViolation,
                format!("Query contains forbidden keyword: {}", keyword),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_select() {
        assert!(check_read_only("SELECT * FROM patients ORDER BY id;").is_ok());
        assert!(check_read_only("  with t as (select 1) select * from t  ").is_ok());
    }

    #[test]
    fn test_rejects_writes() {
        let err = check_read_only("DELETE FROM patients").unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::ReadOnlyViolation);

        let err = check_read_only("WITH d AS (DELETE FROM patients RETURNING *) SELECT * FROM d")
            .unwrap_err();
        assert!(err.message.contains("DELETE"));
    }

    #[test]
    fn test_rejects_stacked_statements() {
        let err = check_read_only("SELECT 1; DROP TABLE patients;").unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::ReadOnlyViolation);
        assert!(err.message.contains("single"));
    }

    #[test]
    fn test_keywords_inside_literals_and_identifiers_are_ignored() {
        assert!(check_read_only(
            "SELECT * FROM prescriptions WHERE ocr_raw_text ILIKE '%drop; update%';"
        )
        .is_ok());
        assert!(check_read_only("SELECT \"delete\" FROM t").is_ok());
        assert!(check_read_only("SELECT id, created_at, updated_by FROM patients").is_ok());
    }

    #[test]
    fn test_comments_are_ignored() {
        assert!(check_read_only("SELECT 1 -- drop everything\n;").is_ok());
        assert!(check_read_only("/* update */ SELECT 1").is_ok());
    }

    #[test]
    fn test_escaped_quote_stays_inside_literal() {
        assert!(check_read_only("SELECT * FROM patients WHERE full_name = 'O''Brien; DROP'").is_ok());
    }

    #[test]
    fn test_unknown_leading_word_reaches_engine() {
        assert!(check_read_only("SELEC id FROM patients").is_ok());
        assert!(check_read_only("VALUES (1), (2)").is_ok());
    }

    #[test]
    fn test_rejects_non_read_statements() {
        for sql in [
            "REPLACE INTO patients (id) VALUES (1)",
            "SET ROLE admin",
            "begin",
            "MERGE INTO t USING s ON t.id = s.id WHEN MATCHED THEN DO NOTHING",
        ] {
            let err = check_read_only(sql).unwrap_err();
            assert_eq!(err.kind, ExecutionErrorKind::ReadOnlyViolation, "{}", sql);
        }
        assert!(check_read_only("SELECT REPLACE(full_name, ' ', '_') FROM patients").is_ok());
    }

    #[test]
    fn test_bundled_gold_sql_passes() {
        let gold = crate::domain::evaluation::GoldSet::bundled().unwrap();
        for case in gold.iter() {
            assert!(
                check_read_only(&case.sql).is_ok(),
                "rejected gold SQL for '{}': {}",
                case.nl_query,
                case.sql
            );
        }
    }

    #[test]
    fn test_empty_statement() {
        let err = check_read_only("  ;  ").unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::Syntax);
    }
}
