//! Gold sets and evaluation report types.

use crate::domain::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    ExactMatch,
    SemanticMatch,
    Fail,
    Error,
}

impl Verdict {
    pub fn is_correct(&self) -> bool {
        matches!(self, Verdict::ExactMatch | Verdict::SemanticMatch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::ExactMatch => "EXACT_MATCH",
            Verdict::SemanticMatch => "SEMANTIC_MATCH",
            Verdict::Fail => "FAIL",
            Verdict::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCaseResult {
    pub nl_query: String,
    pub gt_sql: String,
    pub pred_sql: String,
    pub verdict: Verdict,
    pub details: String,
    pub time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub total: usize,
    pub exact_match: usize,
    pub semantic_match: usize,
    pub fail: usize,
    pub error: usize,
    /// (exact + semantic) / total, 0.0 for an empty gold set
    pub accuracy: f64,
}

impl EvalSummary {
    pub fn from_cases(cases: &[EvalCaseResult]) -> Self {
        let mut summary = EvalSummary {
            total: cases.len(),
            exact_match: 0,
            semantic_match: 0,
            fail: 0,
            error: 0,
            accuracy: 0.0,
        };

        for case in cases {
            match case.verdict {
                Verdict::ExactMatch => summary.exact_match += 1,
                Verdict::SemanticMatch => summary.semantic_match += 1,
                Verdict::Fail => summary.fail += 1,
                Verdict::Error => summary.error += 1,
            }
        }

        if summary.total > 0 {
            summary.accuracy =
                (summary.exact_match + summary.semantic_match) as f64 / summary.total as f64;
        }

        summary
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub run_id: uuid::Uuid,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub summary: EvalSummary,
    pub cases: Vec<EvalCaseResult>,
}

impl EvalReport {
    pub fn new(started_at: chrono::DateTime<chrono::Utc>, cases: Vec<EvalCaseResult>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4(),
            started_at,
            summary: EvalSummary::from_cases(&cases),
            cases,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &EvalCaseResult> {
        self.cases
            .iter()
            .filter(|c| !c.verdict.is_correct())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoldCase {
    pub nl_query: String,
    pub sql: String,
}

/// Natural-language query → reference SQL, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoldSet {
    cases: Vec<GoldCase>,
}

impl GoldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a gold set, rejecting duplicate natural-language keys.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut set = GoldSet::new();
        for (nl, sql) in pairs {
            set.insert(nl, sql)?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, nl_query: impl Into<String>, sql: impl Into<String>) -> Result<()> {
        let nl_query = nl_query.into();
        if self.get(&nl_query).is_some() {
            return Err(AppError::ValidationError(format!(
                "Duplicate gold query: '{}'",
                nl_query
            )));
        }
        self.cases.push(GoldCase {
            nl_query,
            sql: sql.into(),
        });
        Ok(())
    }

    pub fn get(&self, nl_query: &str) -> Option<&str> {
        self.cases
            .iter()
            .find(|c| c.nl_query == nl_query)
            .map(|c| c.sql.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &GoldCase> {
        self.cases.iter()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Parses a JSON object `{"nl query": "reference sql", ...}`.
    ///
    /// Keys are read as a raw entry stream so a repeated key is reported
    /// instead of silently overwriting the earlier entry.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let entries = serde_json::from_str::<OrderedPairs>(raw)
            .map_err(|e| AppError::ParseError(format!("Invalid gold set JSON: {}", e)))?
            .0;

        Self::from_pairs(entries)
    }

    /// The medical-records gold set shipped with the crate.
    pub fn bundled() -> Result<Self> {
        Self::from_json_str(BUNDLED_GOLD_SET)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

const BUNDLED_GOLD_SET: &str = include_str!("../../data/nl2sql_gold.json");

struct OrderedPairs(Vec<(String, String)>);

impl<'de> Deserialize<'de> for OrderedPairs {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PairsVisitor;

        impl<'de> serde::de::Visitor<'de> for PairsVisitor {
            type Value = OrderedPairs;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("an object mapping natural-language queries to SQL strings")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: serde::de::MapAccess<'de>,
            {
                let mut pairs = Vec::new();
                while let Some((k, v)) = map.next_entry::<String, String>()? {
                    pairs.push((k, v));
                }
                Ok(OrderedPairs(pairs))
            }
        }

        deserializer.deserialize_map(PairsVisitor)
    }
}
