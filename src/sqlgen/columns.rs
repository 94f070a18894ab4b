use crate::sqlgen::{NameMap, OptionalColumn, SqlGenerator, StatementId, Symbol, SymbolId, quote_identifier};

impl SqlGenerator {
    /// Fills the SELECT list of `stmt` with the columns of its FROM extents,
    /// all optional, and returns their symbols in order.
    ///
    /// Two columns with the same name are both flagged for renaming; the
    /// final names are picked when the statement is written.
    pub(super) fn add_default_columns(&mut self, stmt: StatementId) -> Vec<SymbolId> {
        let mut column_list = Vec::new();
        let mut seen = NameMap::new();
        let extents = self.statements[stmt].from_extents.clone();
        for extent in extents {
            self.add_columns(stmt, extent, &mut column_list, &mut seen);
        }
        column_list
    }

    fn add_columns(
        &mut self,
        stmt: StatementId,
        symbol: SymbolId,
        column_list: &mut Vec<SymbolId>,
        seen: &mut NameMap<SymbolId>,
    ) {
        if let Some(join) = self.symbols.join(symbol) {
            if !join.is_nested_join {
                let extents = join.extent_list.clone();
                for extent in extents {
                    // Scalar extents have no columns.
                    let has_columns = self.symbols[extent].ty.as_ref().is_some_and(|ty| !ty.is_primitive());
                    if has_columns {
                        self.add_columns(stmt, extent, column_list, seen);
                    }
                }
            } else {
                let columns = join.column_list.clone();
                for column in columns {
                    let mut optional = self.create_optional_column(None, column);
                    optional.append(symbol).append(".").append(column);
                    self.statements[stmt].select.add_optional_column(optional);

                    let name = self.symbols[column].name.clone();
                    self.flag_collision(seen, &name, column);
                    column_list.push(column);
                }
            }
            return;
        }

        if self.symbols[symbol].output_columns_renamed {
            self.statements[stmt].output_columns_renamed = true;
        }
        let names: Vec<String> = match &self.symbols[symbol].ty {
            Some(ty) if !ty.is_primitive() => ty.properties().iter().map(|p| p.name.clone()).collect(),
            _ => vec!["X".to_string()],
        };
        for name in names {
            self.add_column(stmt, symbol, column_list, seen, &name);
        }
    }

    /// `symbol.column AS alias`, reusing the column symbol `symbol` already
    /// has for that name.
    fn add_column(
        &mut self,
        stmt: StatementId,
        symbol: SymbolId,
        column_list: &mut Vec<SymbolId>,
        seen: &mut NameMap<SymbolId>,
        column_name: &str,
    ) {
        self.names.columns.register(column_name);

        let renamed = self.symbols[symbol].output_columns_renamed;
        let input = self.symbols[symbol].output_columns.get(column_name).copied();
        let column = match self.symbols[symbol].columns.get(column_name).copied() {
            Some(column) => column,
            None => {
                let column = match input {
                    Some(input) if renamed => input,
                    _ => self.symbols.add(Symbol::new(column_name, None)),
                };
                self.symbols[symbol].columns.insert(column_name, column);
                column
            }
        };

        let mut optional = self.create_optional_column(input, column);
        optional.append(symbol).append(".");
        match input {
            Some(input) if renamed => optional.append(input),
            _ => optional.append(quote_identifier(column_name)),
        };
        optional.append(" AS ").append(column);

        let statement = &mut self.statements[stmt];
        statement.select.add_optional_column(optional);
        // Already tracked when the name came through a join symbol.
        if !statement.output_columns.contains(column_name) {
            statement.output_columns.insert(column_name, column);
        }

        self.flag_collision(seen, column_name, column);
        column_list.push(column);
    }

    fn create_optional_column(&mut self, input: Option<SymbolId>, column: SymbolId) -> OptionalColumn {
        if !self.usage.contains(column) {
            self.usage.add(input, column);
        }
        OptionalColumn::new(column)
    }

    fn flag_collision(&mut self, seen: &mut NameMap<SymbolId>, name: &str, column: SymbolId) {
        match seen.get(name).copied() {
            Some(previous) => {
                self.symbols[previous].needs_renaming = true;
                self.symbols[column].needs_renaming = true;
            }
            None => {
                seen.insert(name, column);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EdmProperty, SqlVersion, TypeUsage, sqlgen::SqlSelectStatement};

    fn person_type() -> TypeUsage {
        TypeUsage::entity(
            "Person",
            vec![EdmProperty::new("Id", TypeUsage::int32()), EdmProperty::new("Name", TypeUsage::string(None))],
            &["Id"],
        )
    }

    #[test]
    fn extent_columns_are_added_in_property_order() {
        let mut generator = SqlGenerator::new(SqlVersion::Sql10);
        let extent = generator.symbols.add(Symbol::new("p", Some(person_type())));
        let mut stmt = SqlSelectStatement::new();
        stmt.from_extents.push(extent);
        let stmt = generator.statements.add(stmt);

        let columns = generator.add_default_columns(stmt);
        let names: Vec<_> = columns.iter().map(|&c| generator.symbols[c].name.clone()).collect();
        assert_eq!(names, ["Id", "Name"]);
        assert_eq!(generator.statements[stmt].select.optional_columns.len(), 2);
        assert!(generator.statements[stmt].output_columns.contains("name"));
        assert!(generator.names.columns.contains("Id"));
    }

    #[test]
    fn same_named_columns_of_a_join_are_flagged() {
        let mut generator = SqlGenerator::new(SqlVersion::Sql10);
        let left = generator.symbols.add(Symbol::new("a", Some(person_type())));
        let right = generator.symbols.add(Symbol::new("b", Some(person_type())));
        let join = generator.symbols.add_join("j", None, vec![left, right]);
        let mut stmt = SqlSelectStatement::new();
        stmt.from_extents.push(join);
        let stmt = generator.statements.add(stmt);

        let columns = generator.add_default_columns(stmt);
        assert_eq!(columns.len(), 4);
        assert!(columns.iter().all(|&c| generator.symbols[c].needs_renaming));
    }

    #[test]
    fn scalar_extents_expose_a_single_column() {
        let mut generator = SqlGenerator::new(SqlVersion::Sql9);
        let extent = generator.symbols.add(Symbol::new("c", Some(TypeUsage::int32())));
        let mut stmt = SqlSelectStatement::new();
        stmt.from_extents.push(extent);
        let stmt = generator.statements.add(stmt);

        let columns = generator.add_default_columns(stmt);
        assert_eq!(columns.len(), 1);
        assert_eq!(generator.symbols[columns[0]].name, "X");
    }
}
