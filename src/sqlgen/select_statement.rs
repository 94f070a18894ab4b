use std::ops::{Index, IndexMut};

use indexmap::IndexSet;

use crate::sqlgen::{NameMap, SqlBuilder, SqlFragment, SymbolId};

/// Handle of a [`SqlSelectStatement`] in the [`StatementArena`] of one compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatementId(usize);

/// A SELECT list entry written only if `symbol` ends up used.
#[derive(Debug, Clone)]
pub struct OptionalColumn {
    pub symbol: SymbolId,
    pub builder: SqlBuilder,
}

impl OptionalColumn {
    pub fn new(symbol: SymbolId) -> Self {
        let mut builder = SqlBuilder::new();
        builder.append_line();
        Self { symbol, builder }
    }

    pub fn append(&mut self, fragment: impl Into<SqlFragment>) -> &mut Self {
        self.builder.append(fragment);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TopClause {
    pub count: SqlFragment,
    pub with_ties: bool,
}

impl TopClause {
    pub fn new(count: impl Into<SqlFragment>, with_ties: bool) -> Self {
        Self { count: count.into(), with_ties }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectClause {
    pub items: SqlBuilder,
    pub optional_columns: Vec<OptionalColumn>,
    pub top: Option<TopClause>,
    pub is_distinct: bool,
}

impl SelectClause {
    pub fn append(&mut self, fragment: impl Into<SqlFragment>) -> &mut Self {
        self.items.append(fragment);
        self
    }

    pub fn append_line(&mut self) -> &mut Self {
        self.items.append_line();
        self
    }

    pub fn add_optional_column(&mut self, column: OptionalColumn) {
        self.optional_columns.push(column);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.optional_columns.is_empty()
    }
}

/// One SELECT under construction.
///
/// Relational operators append to the clause slots while they are still
/// compatible; otherwise the statement is wrapped in a new one.
#[derive(Debug, Clone, Default)]
pub struct SqlSelectStatement {
    pub select: SelectClause,
    pub from: SqlBuilder,
    pub where_clause: SqlBuilder,
    pub group_by: SqlBuilder,
    pub order_by: SqlBuilder,
    /// Symbols of the FROM clause, in order.
    pub from_extents: Vec<SymbolId>,
    /// Every extent of a flattened join, set when the statement is built by a join.
    pub all_join_extents: Option<Vec<SymbolId>>,
    /// Symbols referenced from this statement without being in its FROM clause.
    pub outer_extents: IndexSet<SymbolId>,
    /// ORDER BY is written only for the outermost statement or with TOP.
    pub is_top_most: bool,
    pub output_columns: NameMap<SymbolId>,
    pub output_columns_renamed: bool,
}

impl SqlSelectStatement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_distinct(&self) -> bool {
        self.select.is_distinct
    }

    pub fn has_top(&self) -> bool {
        self.select.top.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatementArena {
    statements: Vec<SqlSelectStatement>,
}

impl StatementArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, statement: SqlSelectStatement) -> StatementId {
        self.statements.push(statement);
        StatementId(self.statements.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl Index<StatementId> for StatementArena {
    type Output = SqlSelectStatement;

    fn index(&self, id: StatementId) -> &SqlSelectStatement {
        &self.statements[id.0]
    }
}

impl IndexMut<StatementId> for StatementArena {
    fn index_mut(&mut self, id: StatementId) -> &mut SqlSelectStatement {
        &mut self.statements[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_columns_make_the_select_list_non_empty() {
        let mut arena = crate::sqlgen::SymbolArena::new();
        let col = arena.add(crate::sqlgen::Symbol::new("Id", None));

        let mut stmt = SqlSelectStatement::new();
        assert!(stmt.select.is_empty());
        stmt.select.add_optional_column(OptionalColumn::new(col));
        assert!(!stmt.select.is_empty());
        assert!(stmt.select.items.is_empty());
    }

    #[test]
    fn statements_are_addressed_by_handle() {
        let mut statements = StatementArena::new();
        let a = statements.add(SqlSelectStatement::new());
        let b = statements.add(SqlSelectStatement::new());
        statements[b].select.is_distinct = true;
        assert!(!statements[a].is_distinct());
        assert!(statements[b].is_distinct());
        assert_eq!(statements.len(), 2);
    }
}
