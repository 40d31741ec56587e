//! Schema metadata snapshots produced by a catalog inspection.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Rendered target, e.g. `public.patients(id)`.
    pub references: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub foreign_key: Option<ForeignKeyRef>,
}

impl ColumnMeta {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            is_primary_key: false,
            foreign_key: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    pub fn references(mut self, target: &str) -> Self {
        self.foreign_key = Some(ForeignKeyRef {
            references: target.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub name: String,
    pub columns: Vec<String>,
    pub is_primary: bool,
}

/// One table's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaItem {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnMeta>,
    pub description: Option<String>,
    pub row_count: Option<i64>,
    pub indexes: Vec<IndexMeta>,
}

impl SchemaItem {
    pub fn new(schema: &str, name: &str, columns: Vec<ColumnMeta>) -> Self {
        Self {
            schema: schema.to_string(),
            name: name.to_string(),
            columns,
            description: None,
            row_count: None,
            indexes: Vec::new(),
        }
    }

    pub fn qualified_name(&self) -> String {
        if self.schema.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }
}

/// Case-folded table names chosen for one user query, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSelection {
    tables: Vec<String>,
}

impl TableSelection {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tables: Vec<String> = Vec::new();
        for name in names {
            let folded = name.as_ref().trim().to_lowercase();
            if !folded.is_empty() && !tables.contains(&folded) {
                tables.push(folded);
            }
        }
        Self { tables }
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn contains(&self, name: &str) -> bool {
        let folded = name.to_lowercase();
        self.tables.iter().any(|t| *t == folded)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
