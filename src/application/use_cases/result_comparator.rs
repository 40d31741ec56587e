//! SQL text normalization and result-set equivalence.

use crate::domain::sql::QueryResult;
use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Trim, drop trailing `;`, collapse whitespace runs, lowercase.
///
/// Idempotent: `normalize_sql(normalize_sql(s)) == normalize_sql(s)`.
pub fn normalize_sql(sql: &str) -> String {
    let trimmed = sql
        .trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    WHITESPACE_RUN
        .replace_all(trimmed, " ")
        .to_lowercase()
}

/// Same column names in the same order, and the same rows as a multiset.
pub fn results_equal(left: &QueryResult, right: &QueryResult) -> bool {
    if left.columns != right.columns || left.rows.len() != right.rows.len() {
        return false;
    }

    let mut left_rows = left.rows.clone();
    let mut right_rows = right.rows.clone();
    left_rows.sort();
    right_rows.sort();
    left_rows == right_rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sql::SqlValue;

    fn result(columns: &[&str], rows: Vec<Vec<SqlValue>>) -> QueryResult {
        QueryResult {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    #[test]
    fn test_normalize_sql() {
        assert_eq!(
            normalize_sql("  SELECT *\n\tFROM   patients ORDER BY id;  "),
            "select * from patients order by id"
        );
        assert_eq!(
            normalize_sql("SELECT * FROM patients ORDER BY id;"),
            normalize_sql("select * from patients order by id")
        );
    }

    #[test]
    fn test_normalize_sql_is_idempotent() {
        for sql in [
            "SELECT 1 ;",
            "  select\n 1 ; ",
            "SELECT ';' FROM t;;",
            "",
            " ; ",
            "WITH x AS (SELECT 1)\nSELECT * FROM x;",
        ] {
            let once = normalize_sql(sql);
            assert_eq!(normalize_sql(&once), once, "input: {:?}", sql);
        }
    }

    #[test]
    fn test_trailing_terminators_removed() {
        assert_eq!(normalize_sql("SELECT 1;;"), "select 1");
        assert_eq!(normalize_sql("SELECT 1 ; ;"), "select 1");
        assert_eq!(normalize_sql("SELECT ';'"), "select ';'");
    }

    #[test]
    fn test_results_equal_ignores_row_order() {
        let a = result(
            &["gender", "total"],
            vec![vec![text("female"), SqlValue::Int(4)], vec![text("male"), SqlValue::Int(6)]],
        );
        let b = result(
            &["gender", "total"],
            vec![vec![text("male"), SqlValue::Int(6)], vec![text("female"), SqlValue::Int(4)]],
        );
        assert!(results_equal(&a, &b));
    }

    #[test]
    fn test_results_respect_multiplicity() {
        let a = result(&["x"], vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(1)], vec![SqlValue::Int(2)]]);
        let b = result(&["x"], vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(2)], vec![SqlValue::Int(2)]]);
        assert!(!results_equal(&a, &b));
    }

    #[test]
    fn test_column_names_are_strict() {
        let a = result(&["gender", "total"], vec![vec![text("male"), SqlValue::Int(6)]]);
        let b = result(&["gender", "n"], vec![vec![text("male"), SqlValue::Int(6)]]);
        let c = result(&["total", "gender"], vec![vec![SqlValue::Int(6), text("male")]]);
        assert!(!results_equal(&a, &b));
        assert!(!results_equal(&a, &c));
    }

    #[test]
    fn test_no_type_coercion() {
        let a = result(&["x"], vec![vec![SqlValue::Int(1)]]);
        let b = result(&["x"], vec![vec![SqlValue::Float(1.0)]]);
        assert!(!results_equal(&a, &b));
    }

    #[test]
    fn test_nulls_compare_equal() {
        let a = result(&["x"], vec![vec![SqlValue::Null], vec![SqlValue::Int(1)]]);
        let b = result(&["x"], vec![vec![SqlValue::Int(1)], vec![SqlValue::Null]]);
        assert!(results_equal(&a, &b));
    }
}
