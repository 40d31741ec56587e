//! Renders schema snapshots as DDL-like prompt context.
//!
//! Output is a pure function of the input slice. Tables keep the catalog's
//! order so that repeated prompts for the same question share a byte-identical
//! schema section.

use crate::domain::schema::SchemaItem;

#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaFormatter;

impl SchemaFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn to_text(&self, items: &[SchemaItem]) -> String {
        items
            .iter()
            .map(|item| self.table_block(item))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Short table names in input order.
    pub fn table_names(&self, items: &[SchemaItem]) -> Vec<String> {
        items.iter().map(|item| item.name.clone()).collect()
    }

    fn table_block(&self, item: &SchemaItem) -> String {
        let column_lines: Vec<String> = item
            .columns
            .iter()
            .map(|col| {
                let mut line = format!("  {} {}", col.name, col.data_type);
                if !col.nullable {
                    line.push_str(" NOT NULL");
                }
                if col.is_primary_key {
                    line.push_str(" PRIMARY KEY");
                }
                if let Some(fk) = &col.foreign_key {
                    line.push_str(&format!(" REFERENCES {}", fk.references));
                }
                line
            })
            .collect();

        let mut block = String::new();
        if let Some(description) = item.description.as_deref().filter(|d| !d.trim().is_empty()) {
            block.push_str(&format!("-- {}\n", description));
        }

        block.push_str(&format!(
            "CREATE TABLE {} (\n{}\n);",
            item.qualified_name(),
            column_lines.join(",\n")
        ));

        match item.row_count {
            Some(count) => block.push_str(&format!("\n-- Row count: {}", count)),
            None => block.push_str("\n-- Row count: unknown"),
        }

        for index in item.indexes.iter().filter(|idx| !idx.is_primary) {
            block.push_str(&format!(
                "\n-- Index: {} on {}",
                index.name,
                index.columns.join(", ")
            ));
        }

        block
    }
}
