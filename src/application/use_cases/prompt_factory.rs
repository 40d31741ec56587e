//! Prompt texts for table selection and SQL generation.

use super::schema_formatter::SchemaFormatter;
use crate::domain::pipeline_config::SqlDialect;
use crate::domain::schema::SchemaItem;
use chrono::NaiveDate;

/// What went wrong last time, embedded into a retry prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryFeedback {
    pub previous_sql: Option<String>,
    pub previous_error: Option<String>,
    /// Execution plan of the failing statement, when one was obtained
    pub explain: Option<String>,
}

impl RetryFeedback {
    pub fn is_empty(&self) -> bool {
        self.previous_sql.is_none() && self.previous_error.is_none() && self.explain.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct PromptFactory {
    formatter: SchemaFormatter,
    dialect: SqlDialect,
}

impl PromptFactory {
    pub fn new(formatter: SchemaFormatter, dialect: SqlDialect) -> Self {
        Self { formatter, dialect }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn formatter(&self) -> &SchemaFormatter {
        &self.formatter
    }

    pub fn table_selection_prompt(
        &self,
        user_query: &str,
        items: &[SchemaItem],
        today: NaiveDate,
    ) -> String {
        let available = self.formatter.table_names(items);
        let available = if available.is_empty() {
            "No tables found".to_string()
        } else {
            available.join(", ")
        };

        format!(
            r#"The current date is {date}.
You are an intelligent database analyst. Determine which tables are required to answer the user query.

Instructions:
1) Select only from the available tables list.
2) Return ONLY JSON in this form: {{"tables": ["table1", "table2"]}}
3) Do not output explanations, markdown, or extra text.

Database Schema:
{schema}

Available Tables: {available}

User Query: {query}
"#,
            date = today.format("%Y-%m-%d"),
            schema = self.formatter.to_text(items),
            available = available,
            query = user_query,
        )
    }

    pub fn sql_generation_prompt(
        &self,
        user_query: &str,
        schema_text: &str,
        feedback: Option<&RetryFeedback>,
    ) -> String {
        let engine = self.dialect.display_name();
        let case_insensitive = match self.dialect {
            SqlDialect::Postgres => "use ILIKE or LOWER()",
            SqlDialect::Sqlite => "use LOWER() with = or LIKE",
        };

        let mut prompt = format!(
            r#"You are an expert {engine} database query assistant.

Task:
- Convert the natural language query into an optimized {engine} query
- Use JOINs, filters, and aggregations correctly
- Prefer explicit columns (avoid SELECT *)
- Add LIMIT where large results may occur
- End with a semicolon
- If case-insensitive matching is appropriate, {case_insensitive}
- Return only the SQL statement, without explanations

Database Schema:
{schema_text}
"#
        );

        if let Some(feedback) = feedback.filter(|f| !f.is_empty()) {
            prompt.push_str("\nThe previous attempt failed. Fix the query.\n");
            if let Some(sql) = &feedback.previous_sql {
                prompt.push_str(&format!("\nPrevious SQL:\n{}\n", sql));
            }
            if let Some(error) = &feedback.previous_error {
                prompt.push_str(&format!("\nDatabase error:\n{}\n", error));
            }
            if let Some(plan) = &feedback.explain {
                prompt.push_str(&format!("\nExecution plan of the previous SQL:\n{}\n", plan));
            }
        }

        prompt.push_str(&format!("\nUser Query: {}\n", user_query));
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::ColumnMeta;

    fn factory(dialect: SqlDialect) -> PromptFactory {
        PromptFactory::new(SchemaFormatter::new(), dialect)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn test_table_selection_prompt_lists_tables() {
        let items = vec![
            SchemaItem::new("public", "patients", vec![ColumnMeta::new("id", "integer")]),
            SchemaItem::new("public", "medications", vec![ColumnMeta::new("id", "integer")]),
        ];
        let prompt = factory(SqlDialect::Postgres).table_selection_prompt(
            "Show all patients",
            &items,
            today(),
        );

        assert!(prompt.starts_with("The current date is 2024-03-09."));
        assert!(prompt.contains(r#"{"tables": ["table1", "table2"]}"#));
        assert!(prompt.contains("Available Tables: patients, medications"));
        assert!(prompt.contains("CREATE TABLE public.patients ("));
        assert!(prompt.trim_end().ends_with("User Query: Show all patients"));
    }

    #[test]
    fn test_table_selection_prompt_without_tables() {
        let prompt = factory(SqlDialect::Postgres).table_selection_prompt("anything", &[], today());
        assert!(prompt.contains("Available Tables: No tables found"));
    }

    #[test]
    fn test_generation_prompt_dialect_guidance() {
        let pg = factory(SqlDialect::Postgres).sql_generation_prompt("q", "schema", None);
        assert!(pg.contains("expert PostgreSQL database"));
        assert!(pg.contains("ILIKE"));

        let lite = factory(SqlDialect::Sqlite).sql_generation_prompt("q", "schema", None);
        assert!(lite.contains("expert SQLite database"));
        assert!(!lite.contains("ILIKE"));
        assert!(!lite.contains("previous attempt"));
    }

    #[test]
    fn test_generation_prompt_embeds_feedback() {
        let feedback = RetryFeedback {
            previous_sql: Some("SELECT agee FROM patients;".to_string()),
            previous_error: Some("column \"agee\" does not exist".to_string()),
            explain: Some("Seq Scan on patients".to_string()),
        };
        let prompt = factory(SqlDialect::Postgres).sql_generation_prompt(
            "How old are the patients?",
            "CREATE TABLE public.patients (\n  age integer\n);",
            Some(&feedback),
        );

        let sql_at = prompt.find("SELECT agee FROM patients;").unwrap();
        let error_at = prompt.find("column \"agee\" does not exist").unwrap();
        let plan_at = prompt.find("Seq Scan on patients").unwrap();
        let query_at = prompt.find("User Query: How old are the patients?").unwrap();
        assert!(sql_at < error_at && error_at < plan_at && plan_at < query_at);
    }

    #[test]
    fn test_empty_feedback_is_ignored() {
        let f = factory(SqlDialect::Postgres);
        assert_eq!(
            f.sql_generation_prompt("q", "s", Some(&RetryFeedback::default())),
            f.sql_generation_prompt("q", "s", None)
        );
    }
}
