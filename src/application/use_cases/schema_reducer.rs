use crate::domain::schema::{SchemaItem, TableSelection};

/// Narrows a schema snapshot to the tables chosen for one question.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaReducer;

impl SchemaReducer {
    pub fn new() -> Self {
        Self
    }

    /// Case-insensitive match on the short table name. An empty wanted list
    /// keeps everything; unknown names are ignored.
    pub fn filter_by_tables<S: AsRef<str>>(&self, items: &[SchemaItem], tables: &[S]) -> Vec<SchemaItem> {
        if tables.is_empty() {
            return items.to_vec();
        }
        let wanted: Vec<String> = tables.iter().map(|t| t.as_ref().to_lowercase()).collect();
        items
            .iter()
            .filter(|item| wanted.contains(&item.name.to_lowercase()))
            .cloned()
            .collect()
    }

    pub fn reduce(&self, items: &[SchemaItem], selection: &TableSelection) -> Vec<SchemaItem> {
        self.filter_by_tables(items, selection.tables())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::ColumnMeta;

    fn items() -> Vec<SchemaItem> {
        ["patients", "prescriptions", "medications"]
            .iter()
            .map(|name| SchemaItem::new("public", name, vec![ColumnMeta::new("id", "integer")]))
            .collect()
    }

    #[test]
    fn test_empty_wanted_list_returns_input() {
        let reducer = SchemaReducer::new();
        let none: [&str; 0] = [];
        assert_eq!(reducer.filter_by_tables(&items(), &none), items());
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let reduced = SchemaReducer::new().filter_by_tables(&items(), &["Patients"]);
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced[0].name, "patients");
    }

    #[test]
    fn test_keeps_catalog_order_and_drops_unknown() {
        let reduced =
            SchemaReducer::new().filter_by_tables(&items(), &["medications", "ghosts", "patients"]);
        let names: Vec<&str> = reduced.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["patients", "medications"]);
    }

    #[test]
    fn test_reduce_with_selection() {
        let selection = TableSelection::from_names(["PRESCRIPTIONS"]);
        let reduced = SchemaReducer::new().reduce(&items(), &selection);
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced[0].name, "prescriptions");
    }
}
