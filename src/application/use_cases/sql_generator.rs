use crate::domain::error::{AppError, Result};
use crate::domain::sql::SqlCandidate;
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::response::{clean_llm_response, strip_code_fence};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Shortest prefix ending in a `;` that sits outside single-quoted literals.
static FIRST_STATEMENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[^;']|'(?:[^']|'')*')*;").unwrap());

/// Turns a generation prompt into a single executable statement.
pub struct SqlGenerator {
    llm: Arc<dyn LLMClient>,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    pub async fn generate(&self, prompt: &str, attempt: u32) -> Result<SqlCandidate> {
        let raw = self.llm.generate(prompt).await?;
        debug!("[SqlGenerator] Attempt {} raw reply: {}", attempt, raw);

        let sql = extract_statement(&raw).ok_or_else(|| {
            AppError::LLMError("Model returned no SQL statement".to_string())
        })?;

        Ok(SqlCandidate {
            sql,
            attempt,
            prompt: prompt.to_string(),
        })
    }
}

/// First `;`-terminated statement of a model reply, with fences and reasoning
/// tags removed. Text without a terminator is taken whole and gets a `;`.
pub fn extract_statement(raw: &str) -> Option<String> {
    let body = strip_code_fence(&clean_llm_response(raw));
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    let statement = match FIRST_STATEMENT_PATTERN.find(body) {
        Some(m) => m.as_str().trim().to_string(),
        None => format!("{};", body.trim_end()),
    };

    if statement.trim_end_matches(';').trim().is_empty() {
        return None;
    }
    Some(statement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[test]
    fn test_extract_plain_statement() {
        assert_eq!(
            extract_statement("SELECT id FROM patients;").as_deref(),
            Some("SELECT id FROM patients;")
        );
    }

    #[test]
    fn test_extract_appends_terminator() {
        assert_eq!(
            extract_statement("  SELECT id FROM patients  ").as_deref(),
            Some("SELECT id FROM patients;")
        );
    }

    #[test]
    fn test_extract_first_of_many() {
        assert_eq!(
            extract_statement("SELECT 1; SELECT 2;").as_deref(),
            Some("SELECT 1;")
        );
    }

    #[test]
    fn test_extract_ignores_semicolon_in_literal() {
        assert_eq!(
            extract_statement("SELECT * FROM notes WHERE body = 'a;b' ; SELECT 2;").as_deref(),
            Some("SELECT * FROM notes WHERE body = 'a;b' ;")
        );
    }

    #[test]
    fn test_extract_from_fenced_reply() {
        let reply = "```sql\nSELECT p.full_name\nFROM patients p\nORDER BY p.id;\n```";
        assert_eq!(
            extract_statement(reply).as_deref(),
            Some("SELECT p.full_name\nFROM patients p\nORDER BY p.id;")
        );
    }

    #[test]
    fn test_extract_empty_reply() {
        assert_eq!(extract_statement("   "), None);
        assert_eq!(extract_statement("```sql\n```"), None);
        assert_eq!(extract_statement(";"), None);
        assert_eq!(extract_statement("<think>hmm</think>"), None);
    }

    struct EchoClient(String);

    #[async_trait]
    impl LLMClient for EchoClient {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }

        fn describe(&self) -> String {
            "echo/test".to_string()
        }
    }

    #[tokio::test]
    async fn test_generate_records_provenance() {
        let generator = SqlGenerator::new(Arc::new(EchoClient("SELECT 1".to_string())));
        let candidate = generator.generate("the prompt", 2).await.unwrap();
        assert_eq!(candidate.sql, "SELECT 1;");
        assert_eq!(candidate.attempt, 2);
        assert_eq!(candidate.prompt, "the prompt");
    }

    #[tokio::test]
    async fn test_generate_empty_output_is_error() {
        let generator = SqlGenerator::new(Arc::new(EchoClient("".to_string())));
        assert!(matches!(
            generator.generate("p", 1).await,
            Err(AppError::LLMError(_))
        ));
    }
}
