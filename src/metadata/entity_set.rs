use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::{StructuralType, TypeUsage, sqlgen::quote_identifier};

/// A table, view or defining query that rows are scanned from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySet {
    pub name: String,
    pub container: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    /// Native SQL standing in for the table.
    #[serde(default)]
    pub defining_query: Option<String>,
    pub element_type: StructuralType,
    #[serde(skip)]
    target_sql: OnceCell<String>,
}

impl PartialEq for EntitySet {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.container == other.container
            && self.schema == other.schema
            && self.table == other.table
            && self.defining_query == other.defining_query
            && self.element_type == other.element_type
    }
}

impl EntitySet {
    pub fn new(container: &str, name: &str, element_type: StructuralType) -> Self {
        Self {
            name: name.to_string(),
            container: container.to_string(),
            schema: None,
            table: None,
            defining_query: None,
            element_type,
            target_sql: OnceCell::new(),
        }
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self.target_sql = OnceCell::new();
        self
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self.target_sql = OnceCell::new();
        self
    }

    pub fn with_defining_query(mut self, query: &str) -> Self {
        self.defining_query = Some(query.to_string());
        self.target_sql = OnceCell::new();
        self
    }

    pub fn element_type_usage(&self) -> TypeUsage {
        TypeUsage {
            edm_type: crate::EdmType::Entity(self.element_type.clone()),
            facets: Default::default(),
        }
    }

    /// `[schema].[table]` for the set, or its parenthesized defining query.
    /// Missing schema and table names fall back to the container and set names.
    pub fn target_sql(&self) -> &str {
        self.target_sql.get_or_init(|| match &self.defining_query {
            Some(query) => format!("({query})"),
            None => {
                let schema = self.schema.as_deref().filter(|s| !s.is_empty()).unwrap_or(&self.container);
                let table = self.table.as_deref().filter(|t| !t.is_empty()).unwrap_or(&self.name);
                format!("{}.{}", quote_identifier(schema), quote_identifier(table))
            }
        })
    }
}
