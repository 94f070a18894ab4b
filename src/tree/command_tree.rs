use serde::{Deserialize, Serialize};

use crate::{DbExpression, DbExpressionBinding, EdmFunction, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCommandTree {
    pub query: DbExpression,
}

/// `property = value` in an INSERT or UPDATE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbSetClause {
    pub property: DbExpression,
    pub value: DbExpression,
}

impl DbSetClause {
    pub fn new(property: DbExpression, value: DbExpression) -> Self {
        Self { property, value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertCommandTree {
    /// Binding over the scan of the modified table.
    pub target: DbExpressionBinding,
    pub set_clauses: Vec<DbSetClause>,
    #[serde(default)]
    pub returning: Option<DbExpression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateCommandTree {
    pub target: DbExpressionBinding,
    pub set_clauses: Vec<DbSetClause>,
    pub predicate: DbExpression,
    #[serde(default)]
    pub returning: Option<DbExpression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteCommandTree {
    pub target: DbExpressionBinding,
    pub predicate: DbExpression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCommandTree {
    pub function: EdmFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandTree {
    Query(QueryCommandTree),
    Insert(InsertCommandTree),
    Update(UpdateCommandTree),
    Delete(DeleteCommandTree),
    Function(FunctionCommandTree),
}

impl CommandTree {
    pub fn query(query: DbExpression) -> Self {
        CommandTree::Query(QueryCommandTree { query })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            CommandTree::Query(_) => "query",
            CommandTree::Insert(_) => "insert",
            CommandTree::Update(_) => "update",
            CommandTree::Delete(_) => "delete",
            CommandTree::Function(_) => "function",
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EdmProperty, EntitySet, StructuralType, TypeUsage};

    #[test]
    fn trees_survive_json() {
        let set = EntitySet::new(
            "Crm",
            "People",
            StructuralType {
                name: "Person".into(),
                properties: vec![EdmProperty::new("Id", TypeUsage::int32())],
                key_members: vec!["Id".into()],
            },
        )
        .with_schema("dbo");
        let p = DbExpression::scan(set).bind_as("p").unwrap();
        let pred = p.variable().property("Id").unwrap().equal(DbExpression::constant(7));
        let tree = CommandTree::query(p.filter(pred));

        let json = tree.to_json().unwrap();
        let back = CommandTree::from_json(&json).unwrap();
        assert_eq!(back, tree);
        assert_eq!(back.kind_name(), "query");
    }

    #[test]
    fn malformed_json_is_an_error() {
        match CommandTree::from_json(r#"{"Query": 3}"#) {
            Err(crate::Error::Json(_)) => {}
            other => panic!("expected Json error, got {other:?}"),
        }
    }
}
