use tracing::debug;

use crate::{
    DbAggregate, DbExpression, DbExpressionBinding, DbGroupExpressionBinding, DbSortClause, EntitySet, Error,
    ExpressionKind, QuantifierKind, Result, SqlVersion, TypeUsage,
    sql_type_name,
    sqlgen::{
        NameMap, SqlBuilder, SqlFragment, SqlGenerator, SqlSelectStatement, StatementId, Symbol, SymbolId, TopClause,
        function_handler::write_function_name, quote_identifier,
    },
};

/// Whether an operator of `kind` can add its clause to `stmt` instead of
/// wrapping it in a new SELECT.
fn is_compatible(stmt: &SqlSelectStatement, kind: ExpressionKind) -> bool {
    let select = &stmt.select;
    match kind {
        // A projection after DISTINCT may drop columns the ORDER BY uses.
        ExpressionKind::Distinct => !stmt.has_top() && stmt.order_by.is_empty(),
        ExpressionKind::Filter => {
            select.is_empty() && stmt.where_clause.is_empty() && stmt.group_by.is_empty() && !stmt.has_top()
        }
        ExpressionKind::GroupBy => {
            select.is_empty()
                && stmt.group_by.is_empty()
                && stmt.order_by.is_empty()
                && !stmt.has_top()
                && !select.is_distinct
        }
        ExpressionKind::Limit | ExpressionKind::Element => !stmt.has_top(),
        ExpressionKind::Project => select.is_empty() && stmt.group_by.is_empty() && !select.is_distinct,
        ExpressionKind::Skip | ExpressionKind::Sort => {
            select.is_empty() && stmt.group_by.is_empty() && stmt.order_by.is_empty() && !select.is_distinct
        }
        _ => false,
    }
}

/// Puts a fragment that is not a SELECT into the FROM clause of `stmt`.
/// Table-valued function calls go in as they are.
fn wrap_non_query_extent(stmt: &mut SqlSelectStatement, fragment: SqlFragment, kind: ExpressionKind) {
    if kind == ExpressionKind::Function {
        stmt.from.append(fragment);
    } else {
        stmt.from.append(" (").append(fragment).append(")");
    }
}

fn visit_aggregate(aggregate: &DbAggregate, argument: SqlFragment) -> Result<SqlBuilder> {
    let DbAggregate::Function { function, distinct, .. } = aggregate else {
        return Err(Error::not_supported("group aggregates have no SQL translation"));
    };
    let mut result = SqlBuilder::new();
    if function.is_canonical() && function.name == "BigCount" {
        result.append("COUNT_BIG");
    } else {
        write_function_name(function, &mut result);
    }
    result.append("(");
    if *distinct {
        result.append("DISTINCT ");
    }
    result.append(argument).append(")");
    Ok(result)
}

/// SQL Server wants GROUP BY keys over the input columns and aggregate
/// arguments without nested subqueries; anything else goes through an
/// inner query that projects the expressions first.
fn group_by_needs_inner_query(e: &DbExpression, input_variable: &str, allow_constants: bool) -> bool {
    match e {
        DbExpression::Constant { .. } if allow_constants => false,
        DbExpression::Cast { argument, .. } => group_by_needs_inner_query(argument, input_variable, allow_constants),
        DbExpression::Property { instance, .. } => {
            group_by_needs_inner_query(instance, input_variable, allow_constants)
        }
        DbExpression::VariableReference { name, .. } => name != input_variable,
        _ => true,
    }
}

impl SqlGenerator {
    pub(super) fn visit_scan(&mut self, target: &EntitySet) -> Result<SqlFragment> {
        let target_sql = target.target_sql().to_string();
        if self.is_parent_a_join() {
            return Ok(SqlBuilder::text(target_sql).into());
        }
        let mut stmt = SqlSelectStatement::new();
        stmt.from.append(target_sql);
        Ok(self.statements.add(stmt).into())
    }

    /// Visits `e` and returns the statement it ends up in, with default
    /// columns added when `add_default_columns` is set and it selects nothing.
    pub(super) fn ensure_sql_statement(
        &mut self,
        e: &DbExpression,
        add_default_columns: bool,
        mark_all_default_columns_as_used: bool,
    ) -> Result<StatementId> {
        let stmt = match e {
            DbExpression::Project { input, projection } => self.visit_project(input, projection)?,
            DbExpression::Filter { input, predicate } => self.visit_filter(input, predicate, false)?,
            DbExpression::GroupBy { input, keys, aggregates, result_type } => {
                self.visit_group_by(input, keys, aggregates, result_type)?
            }
            DbExpression::Sort { input, sort_order } => self.visit_sort(input, sort_order)?,
            _ => {
                let ty = e.element_type()?;
                let mut scope = self.enter_scope();
                let (stmt, from) = scope.visit_input_expression(e, "c", &ty)?;
                scope.add_from_symbol(stmt, "c", from, true);
                stmt
            }
        };

        if add_default_columns && self.statements[stmt].select.is_empty() {
            let columns = self.add_default_columns(stmt);
            if mark_all_default_columns_as_used {
                for column in columns {
                    self.usage.mark_as_used(column);
                }
            }
        }
        Ok(stmt)
    }

    /// Visits the input of a relational operator and picks the symbol it is
    /// known by in the operator's FROM clause.
    fn visit_input_expression(
        &mut self,
        e: &DbExpression,
        variable_name: &str,
        variable_type: &TypeUsage,
    ) -> Result<(StatementId, SymbolId)> {
        let fragment = self.visit(e)?;
        let stmt = match fragment.as_statement() {
            Some(stmt) => stmt,
            None => {
                let mut stmt = SqlSelectStatement::new();
                wrap_non_query_extent(&mut stmt, fragment, e.kind());
                self.statements.add(stmt)
            }
        };

        let from_extents = self.statements[stmt].from_extents.clone();
        let symbol = match from_extents.as_slice() {
            [] => self.symbols.add(Symbol::new(variable_name, Some(variable_type.clone()))),
            &[only] => only,
            _ => {
                // A join's statement is reused: its extents collapse into one join symbol.
                let join = self.symbols.add_join(variable_name, Some(variable_type.clone()), from_extents);
                let flattened = self.statements[stmt].all_join_extents.clone().unwrap_or_default();
                if let Some(extents) = self.symbols[join].join.as_mut() {
                    extents.flattened_extent_list = flattened;
                }
                self.statements[stmt].from_extents = vec![join];
                join
            }
        };
        Ok((stmt, symbol))
    }

    /// Wraps `old` in `SELECT ... FROM ( old ) AS variable_name`.
    /// `finalize` gives `old` its default columns first.
    fn create_new_select_statement(
        &mut self,
        old: StatementId,
        variable_name: &str,
        variable_type: &TypeUsage,
        finalize: bool,
    ) -> (StatementId, SymbolId) {
        let columns = if finalize && self.statements[old].select.is_empty() {
            Some(self.add_default_columns(old))
        } else {
            None
        };
        let from_symbol = self.derived_table_symbol(old, variable_name, variable_type, columns);

        let mut stmt = SqlSelectStatement::new();
        stmt.from.append("( ").append(old).append_line().append(") ");
        (self.statements.add(stmt), from_symbol)
    }

    /// Symbol of a derived table over `old`. When `old` reads from a join and
    /// its columns were just listed, the join stays addressable through a
    /// nested join symbol; otherwise the symbol carries `old`'s output columns.
    fn derived_table_symbol(
        &mut self,
        old: StatementId,
        name: &str,
        ty: &TypeUsage,
        columns: Option<Vec<SymbolId>>,
    ) -> SymbolId {
        if let Some(columns) = columns {
            let first = self.statements[old].from_extents.first().copied();
            if let Some(join) = first.and_then(|f| self.symbols.join(f)) {
                let extents = join.extent_list.clone();
                let flattened = join.flattened_extent_list.clone();
                return self.symbols.add_nested_join(name, Some(ty.clone()), extents, columns, flattened);
            }
        }
        let old = &self.statements[old];
        self.symbols.add(Symbol::with_output_columns(
            name,
            Some(ty.clone()),
            old.output_columns.clone(),
            old.output_columns_renamed,
        ))
    }

    /// Adds `symbol` to the FROM clause unless the statement is being reused,
    /// and binds it to `variable_name` when `add_to_symbol_table` is set.
    fn add_from_symbol(&mut self, stmt: StatementId, variable_name: &str, symbol: SymbolId, add_to_symbol_table: bool) {
        let statement = &mut self.statements[stmt];
        if statement.from_extents.first() != Some(&symbol) {
            statement.from_extents.push(symbol);
            statement.from.append(" AS ").append(symbol);
            let name = self.symbols[symbol].name.clone();
            self.names.extents.register(&name);
        }
        if add_to_symbol_table {
            self.symbol_table.add(variable_name, symbol);
        }
    }

    pub(super) fn visit_filter(
        &mut self,
        input: &DbExpressionBinding,
        predicate: &DbExpression,
        negate: bool,
    ) -> Result<StatementId> {
        let name = &input.variable_name;
        let ty = &input.variable_type;
        let (mut stmt, mut from) = self.visit_input_expression(&input.expression, name, ty)?;
        if !is_compatible(&self.statements[stmt], ExpressionKind::Filter) {
            (stmt, from) = self.create_new_select_statement(stmt, name, ty, true);
        }

        let mut scope = self.enter_statement(stmt);
        scope.add_from_symbol(stmt, name, from, true);
        let condition = scope.visit_predicate(predicate)?;
        let where_clause = &mut scope.statements[stmt].where_clause;
        if negate {
            where_clause.append("NOT (").append(condition).append(")");
        } else {
            where_clause.append(condition);
        }
        Ok(stmt)
    }

    pub(super) fn visit_project(&mut self, input: &DbExpressionBinding, projection: &DbExpression) -> Result<StatementId> {
        let name = &input.variable_name;
        let ty = &input.variable_type;
        let (mut stmt, mut from) = self.visit_input_expression(&input.expression, name, ty)?;

        // SQL Server 2000 cannot ORDER BY a column whose alias hides another column.
        let mut aliases_need_renaming = false;
        if !is_compatible(&self.statements[stmt], ExpressionKind::Project) {
            (stmt, from) = self.create_new_select_statement(stmt, name, ty, true);
        } else if self.version == SqlVersion::Sql8 && !self.statements[stmt].order_by.is_empty() {
            aliases_need_renaming = true;
        }

        let mut scope = self.enter_statement(stmt);
        scope.add_from_symbol(stmt, name, from, true);
        match projection {
            DbExpression::NewInstance { arguments, result_type } => {
                let (select, columns) = scope.visit_row_constructor(arguments, result_type, aliases_need_renaming)?;
                let statement = &mut scope.statements[stmt];
                statement.select.append(select);
                if aliases_need_renaming {
                    statement.output_columns_renamed = true;
                }
                statement.output_columns = columns;
            }
            _ => {
                let select = scope.visit(projection)?;
                scope.statements[stmt].select.append(select);
            }
        }
        Ok(stmt)
    }

    /// The SELECT list of a row projection: `value AS [name]` per member.
    fn visit_row_constructor(
        &mut self,
        arguments: &[DbExpression],
        ty: &TypeUsage,
        aliases_need_renaming: bool,
    ) -> Result<(SqlBuilder, NameMap<SymbolId>)> {
        if !ty.is_row() {
            return Err(Error::not_supported(format!("a projection of type {ty} has no SQL translation")));
        }
        let members = ty.properties();
        if members.len() != arguments.len() {
            return Err(Error::invalid_operation(format!(
                "row constructor has {} values for {} members",
                arguments.len(),
                members.len()
            )));
        }

        let mut result = SqlBuilder::new();
        let mut columns = NameMap::new();
        for (i, (argument, member)) in arguments.iter().zip(members).enumerate() {
            if argument.result_type().is_row() {
                return Err(Error::not_supported("nested rows have no SQL translation"));
            }
            if i > 0 {
                result.append(", ");
            }
            result.append_line();
            result.append(self.visit(argument)?);
            result.append(" AS ");
            if aliases_need_renaming {
                let mut column = Symbol::new(&member.name, Some(member.type_usage.clone()));
                column.needs_renaming = true;
                column.new_name = format!("Internal_{}", member.name);
                let column = self.symbols.add(column);
                result.append(column);
                columns.insert(&member.name, column);
            } else {
                result.append(quote_identifier(&member.name));
            }
        }
        Ok((result, columns))
    }

    /// A constructor outside a projection: a collection written as a
    /// `UNION ALL` ladder, or `TOP 1` over a single element.
    pub(super) fn visit_new_instance(&mut self, arguments: &[DbExpression], result_type: &TypeUsage) -> Result<SqlFragment> {
        let Some(element_type) = result_type.element_type() else {
            return Err(Error::not_supported("rows can only be constructed as a projection"));
        };

        if let [DbExpression::Element { argument }] = arguments {
            let mut stmt = self.ensure_sql_statement(argument, true, false)?;
            if !is_compatible(&self.statements[stmt], ExpressionKind::Element) {
                let ty = argument.element_type()?;
                let (wrapper, from) = self.create_new_select_statement(stmt, "element", &ty, true);
                self.add_from_symbol(wrapper, "element", from, false);
                stmt = wrapper;
            }
            self.statements[stmt].select.top = Some(TopClause::new("1", false));
            return Ok(stmt.into());
        }

        let is_scalar = element_type.is_primitive();
        let mut result = SqlBuilder::new();
        if arguments.is_empty() {
            if !is_scalar {
                return Err(Error::not_supported("empty collections of rows have no SQL translation"));
            }
            result
                .append(" SELECT CAST(null as ")
                .append(sql_type_name(self.version, element_type)?)
                .append(") AS X FROM (SELECT 1) AS Y WHERE 1=0");
        }
        for (i, argument) in arguments.iter().enumerate() {
            if i > 0 {
                result.append(" UNION ALL ");
            }
            result.append(" SELECT ");
            result.append(self.visit(argument)?);
            if is_scalar {
                result.append(" AS X ");
            }
        }
        Ok(result.into())
    }

    /// Joins with a join as parent add their inputs to the parent's FROM
    /// clause, so nested joins flatten into one statement.
    pub(super) fn visit_join(
        &mut self,
        inputs: &[&DbExpressionBinding],
        join_keyword: &'static str,
        condition: Option<&DbExpression>,
    ) -> Result<StatementId> {
        let parent_is_join = self.is_parent_a_join();
        let stmt = if parent_is_join {
            self.current_statement()?
        } else {
            let mut stmt = SqlSelectStatement::new();
            stmt.all_join_extents = Some(Vec::new());
            self.statements.add(stmt)
        };

        let mut scope = if parent_is_join { self.enter_scope() } else { self.enter_statement(stmt) };
        for (i, input) in inputs.iter().enumerate() {
            if i == 0 {
                scope.statements[stmt].from.append(" ");
            } else {
                scope.statements[stmt].from.append_line().append(join_keyword).append(" ");
            }

            let kind = input.expression.kind();
            let needs_join_context = kind == ExpressionKind::Scan || (i == 0 && (kind.is_join() || kind.is_apply()));
            // A child reusing this statement appends its extents after this point.
            let from_symbol_start = scope.statements[stmt].from_extents.len();
            let fragment = scope.with_join_parent(needs_join_context, |g| g.visit(&input.expression))?;
            scope.process_join_input_result(fragment, stmt, input, from_symbol_start)?;
        }

        if let Some(condition) = condition {
            let on = scope.with_join_parent(false, |g| g.visit_predicate(condition))?;
            scope.statements[stmt].from.append(" ON ").append(on);
        }
        Ok(stmt)
    }

    fn process_join_input_result(
        &mut self,
        fragment: SqlFragment,
        stmt: StatementId,
        input: &DbExpressionBinding,
        from_symbol_start: usize,
    ) -> Result<()> {
        let name = &input.variable_name;
        let ty = &input.variable_type;

        if fragment.as_statement() == Some(stmt) {
            // The child join flattened into this statement. Its extents are
            // replaced by one join symbol; their aliases are already written.
            let extents = self.statements[stmt].from_extents.split_off(from_symbol_start);
            let join = self.symbols.add_join(name, Some(ty.clone()), extents);
            self.statements[stmt].from_extents.push(join);
            self.symbol_table.add(name, join);
            return Ok(());
        }

        let from_symbol = match fragment.as_statement() {
            Some(child) => {
                let symbol = if self.statements[child].select.is_empty() {
                    let columns = self.add_default_columns(child);
                    let kind = input.expression.kind();
                    if kind.is_join() || kind.is_apply() {
                        let extents = self.statements[child].from_extents.clone();
                        self.symbols.add_nested_join(name, Some(ty.clone()), extents, columns, Vec::new())
                    } else {
                        self.derived_table_symbol(child, name, ty, Some(columns))
                    }
                } else {
                    self.derived_table_symbol(child, name, ty, None)
                };
                self.statements[stmt].from.append(" (").append(child).append(" )");
                symbol
            }
            None => {
                let kind = input.expression.kind();
                if kind == ExpressionKind::Scan {
                    self.statements[stmt].from.append(fragment);
                } else {
                    wrap_non_query_extent(&mut self.statements[stmt], fragment, kind);
                }
                self.symbols.add(Symbol::new(name, Some(ty.clone())))
            }
        };

        self.add_from_symbol(stmt, name, from_symbol, true);
        let all_join_extents = self.statements[stmt].all_join_extents.get_or_insert_with(Vec::new);
        all_join_extents.push(from_symbol);
        Ok(())
    }

    pub(super) fn visit_group_by(
        &mut self,
        input: &DbGroupExpressionBinding,
        keys: &[DbExpression],
        aggregates: &[DbAggregate],
        result_type: &TypeUsage,
    ) -> Result<StatementId> {
        let name = &input.variable_name;
        let ty = &input.variable_type;
        let (mut inner, mut from) = self.visit_input_expression(&input.expression, name, ty)?;
        if !is_compatible(&self.statements[inner], ExpressionKind::GroupBy) {
            (inner, from) = self.create_new_select_statement(inner, name, ty, true);
        }

        let mut scope = self.enter_statement(inner);
        scope.add_from_symbol(inner, name, from, true);
        scope.symbol_table.add(&input.group_variable_name, from);

        let members = result_type.element_type().map(TypeUsage::properties).unwrap_or_default();
        if members.len() != keys.len() + aggregates.len() {
            return Err(Error::invalid_operation(format!(
                "GROUP BY result has {} columns for {} keys and {} aggregates",
                members.len(),
                keys.len(),
                aggregates.len()
            )));
        }

        let needs_inner_query = aggregates
            .iter()
            .flat_map(DbAggregate::arguments)
            .any(|argument| group_by_needs_inner_query(argument, &input.group_variable_name, true))
            || keys.iter().any(|key| group_by_needs_inner_query(key, name, false));

        let result = if needs_inner_query {
            let (result, outer_from) = scope.create_new_select_statement(inner, name, ty, false);
            scope.add_from_symbol(result, name, outer_from, false);
            from = outer_from;
            debug!(target: "tsqlgen::sqlgen", variable = %name, "GROUP BY goes through an inner query");
            result
        } else {
            inner
        };

        let (key_members, aggregate_members) = members.split_at(keys.len());
        for (i, (key, member)) in keys.iter().zip(key_members).enumerate() {
            let alias = quote_identifier(&member.name);
            let key_sql = scope.visit(key)?;
            if i > 0 {
                scope.statements[result].group_by.append(", ");
                scope.statements[result].select.append(", ");
            }
            if !needs_inner_query {
                let statement = &mut scope.statements[result];
                statement.select.append_line().append(key_sql.clone()).append(" AS ").append(alias);
                statement.group_by.append(key_sql);
            } else {
                let inner_select = &mut scope.statements[inner].select;
                if i > 0 {
                    inner_select.append(", ");
                }
                inner_select.append_line().append(key_sql).append(" AS ").append(alias.clone());

                let statement = &mut scope.statements[result];
                statement.select.append_line().append(from).append(".").append(alias.clone());
                statement.select.append(" AS ").append(alias.clone());
                statement.group_by.append(alias);
            }
        }

        for (j, (aggregate, member)) in aggregates.iter().zip(aggregate_members).enumerate() {
            let alias = quote_identifier(&member.name);
            let separator = if keys.len() + j > 0 { ", " } else { "" };
            let argument = match aggregate.arguments() {
                [argument] => argument,
                _ => return Err(Error::invalid_operation("an aggregate takes exactly one argument")),
            };
            let translated = scope.visit(argument)?;
            let argument_sql = if needs_inner_query {
                scope.statements[inner]
                    .select
                    .append(separator)
                    .append_line()
                    .append(translated)
                    .append(" AS ")
                    .append(alias.clone());
                let mut reference = SqlBuilder::text(from);
                reference.append(".").append(alias.clone());
                reference.into()
            } else {
                translated
            };
            let aggregate_sql = visit_aggregate(aggregate, argument_sql)?;
            scope.statements[result]
                .select
                .append(separator)
                .append_line()
                .append(aggregate_sql)
                .append(" AS ")
                .append(alias);
        }
        Ok(result)
    }

    fn visit_sort_keys(&mut self, sort_order: &[DbSortClause]) -> Result<SqlBuilder> {
        let mut result = SqlBuilder::new();
        for (i, clause) in sort_order.iter().enumerate() {
            if i > 0 {
                result.append(", ");
            }
            result.append(self.visit(&clause.expression)?);
            if let Some(collation) = clause.collation.as_deref().filter(|c| !c.is_empty()) {
                result.append(" COLLATE ").append(collation.to_string());
            }
            result.append(if clause.ascending { " ASC" } else { " DESC" });
        }
        Ok(result)
    }

    pub(super) fn visit_sort(&mut self, input: &DbExpressionBinding, sort_order: &[DbSortClause]) -> Result<StatementId> {
        let name = &input.variable_name;
        let ty = &input.variable_type;
        let (mut stmt, mut from) = self.visit_input_expression(&input.expression, name, ty)?;
        if !is_compatible(&self.statements[stmt], ExpressionKind::Sort) {
            (stmt, from) = self.create_new_select_statement(stmt, name, ty, true);
        }

        let mut scope = self.enter_statement(stmt);
        scope.add_from_symbol(stmt, name, from, true);
        let keys = scope.visit_sort_keys(sort_order)?;
        scope.statements[stmt].order_by.append(keys);
        Ok(stmt)
    }

    /// `SELECT ... FROM (SELECT ..., row_number() OVER (ORDER BY keys) AS [row_number] ...)
    /// WHERE [row_number] > count ORDER BY keys`.
    pub(super) fn visit_skip(
        &mut self,
        input: &DbExpressionBinding,
        sort_order: &[DbSortClause],
        count: &DbExpression,
    ) -> Result<StatementId> {
        if self.version == SqlVersion::Sql8 {
            return Err(Error::not_supported("SKIP requires SQL Server 2005"));
        }
        let name = &input.variable_name;
        let ty = &input.variable_type;
        let (mut inner, mut from) = self.visit_input_expression(&input.expression, name, ty)?;
        if !is_compatible(&self.statements[inner], ExpressionKind::Skip) {
            (inner, from) = self.create_new_select_statement(inner, name, ty, true);
        }

        let (input_columns, row_number) = {
            let mut scope = self.enter_statement(inner);
            scope.add_from_symbol(inner, name, from, true);
            let columns = scope.add_default_columns(inner);
            let keys = scope.visit_sort_keys(sort_order)?;

            let mut row_number = Symbol::new("row_number", Some(TypeUsage::int64()));
            row_number.needs_renaming = columns.iter().any(|&c| scope.symbols[c].name.eq_ignore_ascii_case("row_number"));
            let row_number = scope.symbols.add(row_number);
            scope.statements[inner]
                .select
                .append("row_number() OVER (ORDER BY ")
                .append(keys)
                .append(") AS ")
                .append(row_number);
            (columns, row_number)
        };

        let result_from = self.derived_table_symbol(inner, name, ty, Some(input_columns));
        let mut result = SqlSelectStatement::new();
        result.from.append("( ").append(inner).append_line().append(") ");
        let result = self.statements.add(result);

        let mut scope = self.enter_statement(result);
        scope.add_from_symbol(result, name, result_from, true);
        let count = scope.handle_count(count)?;
        let keys = scope.visit_sort_keys(sort_order)?;
        let statement = &mut scope.statements[result];
        statement.where_clause.append(result_from).append(".").append(row_number).append(" > ").append(count);
        statement.order_by.append(keys);
        Ok(result)
    }

    /// Counts of TOP and SKIP are written bare when they are constants.
    fn handle_count(&mut self, e: &DbExpression) -> Result<SqlFragment> {
        match e {
            DbExpression::Constant { value, .. } => Ok(value.to_string().into()),
            DbExpression::ParameterReference { .. } => self.visit(e),
            _ => Err(Error::invalid_operation("a row count must be a constant or a parameter")),
        }
    }

    pub(super) fn visit_limit(&mut self, argument: &DbExpression, limit: &DbExpression, with_ties: bool) -> Result<StatementId> {
        if self.version == SqlVersion::Sql8 && matches!(limit, DbExpression::ParameterReference { .. }) {
            return Err(Error::not_supported("a parameterized TOP requires SQL Server 2005"));
        }
        let mut stmt = self.ensure_sql_statement(argument, false, false)?;
        if !is_compatible(&self.statements[stmt], ExpressionKind::Limit) {
            let ty = argument.element_type()?;
            let (wrapper, from) = self.create_new_select_statement(stmt, "top", &ty, true);
            self.add_from_symbol(wrapper, "top", from, false);
            stmt = wrapper;
        }
        let count = self.handle_count(limit)?;
        self.statements[stmt].select.top = Some(TopClause::new(count, with_ties));
        Ok(stmt)
    }

    pub(super) fn visit_distinct(&mut self, argument: &DbExpression) -> Result<StatementId> {
        let mut stmt = self.ensure_sql_statement(argument, true, false)?;
        if !is_compatible(&self.statements[stmt], ExpressionKind::Distinct) {
            let ty = argument.element_type()?;
            let (wrapper, from) = self.create_new_select_statement(stmt, "distinct", &ty, true);
            self.add_from_symbol(wrapper, "distinct", from, false);
            stmt = wrapper;
        }
        self.statements[stmt].select.is_distinct = true;
        Ok(stmt)
    }

    /// `left keyword right`. When the left side renamed its columns (SQL Server
    /// 2000 with ORDER BY), the whole operation is wrapped so the renamed
    /// columns stay addressable.
    pub(super) fn visit_set_op(
        &mut self,
        keyword: &'static str,
        left: &DbExpression,
        right: &DbExpression,
    ) -> Result<SqlFragment> {
        let left_stmt = self.ensure_sql_statement(left, true, true)?;
        let right_stmt = self.ensure_sql_statement(right, true, true)?;

        let mut set_op = SqlBuilder::text(left_stmt);
        set_op.append_line().append(keyword).append_line().append(right_stmt);
        if !self.statements[left_stmt].output_columns_renamed {
            return Ok(set_op.into());
        }

        let mut wrapper = SqlSelectStatement::new();
        wrapper.from.append("( ").append(set_op).append_line().append(") ");
        let wrapper = self.statements.add(wrapper);
        let columns = self.statements[left_stmt].output_columns.clone();
        let from = self.symbols.add(Symbol::with_output_columns("X", Some(left.element_type()?), columns, true));
        self.add_from_symbol(wrapper, "", from, false);
        Ok(wrapper.into())
    }

    pub(super) fn visit_quantifier(
        &mut self,
        kind: QuantifierKind,
        input: &DbExpressionBinding,
        predicate: &DbExpression,
    ) -> Result<SqlFragment> {
        let negate = matches!(kind, QuantifierKind::All);
        let mut result = SqlBuilder::text(if negate { "NOT EXISTS (" } else { "EXISTS (" });
        let filter = self.visit_filter(input, predicate, negate)?;
        if self.statements[filter].select.is_empty() {
            self.add_default_columns(filter);
        }
        result.append(filter).append(")");
        Ok(result.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ComparisonKind, EdmFunction, EdmProperty, sqlgen::OptionalColumn};

    #[test]
    fn filter_is_compatible_only_with_a_bare_statement() {
        let mut stmt = SqlSelectStatement::new();
        assert!(is_compatible(&stmt, ExpressionKind::Filter));
        stmt.order_by.append("x");
        assert!(is_compatible(&stmt, ExpressionKind::Filter));
        assert!(!is_compatible(&stmt, ExpressionKind::Sort));
        assert!(is_compatible(&stmt, ExpressionKind::Project));
        stmt.where_clause.append("1 = 1");
        assert!(!is_compatible(&stmt, ExpressionKind::Filter));
    }

    #[test]
    fn distinct_and_top_block_later_operators() {
        let mut stmt = SqlSelectStatement::new();
        stmt.select.is_distinct = true;
        assert!(!is_compatible(&stmt, ExpressionKind::Project));
        assert!(!is_compatible(&stmt, ExpressionKind::GroupBy));
        assert!(is_compatible(&stmt, ExpressionKind::Limit));

        let mut stmt = SqlSelectStatement::new();
        stmt.select.top = Some(TopClause::new("1", false));
        assert!(!is_compatible(&stmt, ExpressionKind::Limit));
        assert!(!is_compatible(&stmt, ExpressionKind::Element));
        assert!(!is_compatible(&stmt, ExpressionKind::Filter));
    }

    #[test]
    fn optional_columns_count_as_a_select_list() {
        let mut generator = SqlGenerator::new(SqlVersion::Sql10);
        let column = generator.symbols.add(Symbol::new("Id", None));
        let mut stmt = SqlSelectStatement::new();
        stmt.select.add_optional_column(OptionalColumn::new(column));
        assert!(!is_compatible(&stmt, ExpressionKind::Filter));
    }

    #[test]
    fn group_by_keys_must_reference_the_input() {
        let person = TypeUsage::row(vec![EdmProperty::new("Age", TypeUsage::int32())]);
        let p = DbExpression::variable("p", person.clone());
        let q = DbExpression::variable("q", person);
        let age = p.property("Age").unwrap();
        assert!(!group_by_needs_inner_query(&age, "p", false));
        assert!(!group_by_needs_inner_query(&age.clone().cast_to(TypeUsage::int64()), "p", false));
        assert!(group_by_needs_inner_query(&q.property("Age").unwrap(), "p", false));

        let comparison = DbExpression::comparison(ComparisonKind::Equals, age, DbExpression::constant(1));
        assert!(group_by_needs_inner_query(&comparison, "p", false));
        assert!(!group_by_needs_inner_query(&DbExpression::constant(1), "p", true));
        assert!(group_by_needs_inner_query(&DbExpression::constant(1), "p", false));
    }

    #[test]
    fn aggregates_map_big_count_and_distinct() {
        let count = DbAggregate::Function {
            function: EdmFunction::canonical("BigCount"),
            arguments: vec![DbExpression::constant(1)],
            distinct: true,
            result_type: TypeUsage::int64(),
        };
        let sql = visit_aggregate(&count, "1".into()).unwrap();
        assert_eq!(
            sql.fragments(),
            [
                SqlFragment::from("COUNT_BIG"),
                SqlFragment::from("("),
                SqlFragment::from("DISTINCT "),
                SqlFragment::from("1"),
                SqlFragment::from(")"),
            ]
        );

        let group = DbAggregate::Group { arguments: vec![], result_type: TypeUsage::int32() };
        match visit_aggregate(&group, "1".into()) {
            Err(Error::NotSupported(_)) => {}
            other => panic!("expected NotSupported, got {other:?}"),
        }
    }
}
