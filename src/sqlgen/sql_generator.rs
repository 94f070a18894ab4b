use std::ops::{Deref, DerefMut};

use indexmap::IndexMap;

use crate::{
    ArithmeticKind, ComparisonKind, DbExpression, DbExpressionBinding, Error, ExpressionKind, PrimitiveTypeKind,
    Result, SqlVersion, TypeUsage,
    error::ToResult,
    sql8::{Sql8ConformanceChecker, Sql8Rewriter},
    sql_type_name,
    sqlgen::{
        NameRegistries, Renderer, SqlBuilder, SqlFragment, StatementArena, StatementId, SymbolArena,
        SymbolTable, SymbolUsageManager, quote_identifier,
    },
};

/// First phase of query generation: visits a query tree and builds the
/// fragment tree of its SELECT statements.
///
/// One generator compiles one query. All names, symbols and statements it
/// creates live in its arenas and move into the [`CompiledQuery`].
#[derive(Debug)]
pub struct SqlGenerator {
    pub(super) version: SqlVersion,
    pub(super) statements: StatementArena,
    pub(super) symbols: SymbolArena,
    pub(super) symbol_table: SymbolTable,
    pub(super) usage: SymbolUsageManager,
    pub(super) names: NameRegistries,
    pub(super) statement_stack: Vec<StatementId>,
    /// Whether the expression being visited is a direct input of a join.
    pub(super) join_stack: Vec<bool>,
    /// Set by a variable reference, cleared by the property access over it.
    pub(super) is_var_ref_single: bool,
    /// Parameter names seen so far, mapped to whether every use was in a forcing context.
    pub(super) candidates: IndexMap<String, bool>,
    pub(super) force_non_unicode: bool,
    pub(super) ignore_force_flag: bool,
    /// Set while writing a value of an INSERT, UPDATE or DELETE.
    pub(super) target_columns: Option<TargetColumns>,
}

/// How a modification statement names the columns of its target row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetColumns {
    Bare,
    Aliased(&'static str),
}

impl TargetColumns {
    fn column(self, name: &str) -> String {
        match self {
            TargetColumns::Bare => quote_identifier(name),
            TargetColumns::Aliased(alias) => format!("{alias}.{}", quote_identifier(name)),
        }
    }
}

/// A symbol table scope, optionally with a statement pushed on the statement
/// stack. Both are left when the guard drops.
pub(super) struct Scope<'g> {
    generator: &'g mut SqlGenerator,
    pops_statement: bool,
}

impl Deref for Scope<'_> {
    type Target = SqlGenerator;

    fn deref(&self) -> &SqlGenerator {
        self.generator
    }
}

impl DerefMut for Scope<'_> {
    fn deref_mut(&mut self) -> &mut SqlGenerator {
        self.generator
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.generator.symbol_table.exit_scope();
        if self.pops_statement {
            self.generator.statement_stack.pop();
        }
    }
}

/// A compiled query, ready to be written as text.
#[derive(Debug)]
pub struct CompiledQuery {
    version: SqlVersion,
    fragment: SqlFragment,
    statements: StatementArena,
    symbols: SymbolArena,
    usage: SymbolUsageManager,
    names: NameRegistries,
    /// String parameters only ever compared with non-unicode columns.
    pub params_to_force_non_unicode: Vec<String>,
}

impl CompiledQuery {
    /// Writes the query. Each call starts from the compiled state, so the
    /// result does not depend on earlier calls.
    pub fn render(&self, newline: &str) -> Result<String> {
        Renderer::new(self.version, &self.statements, &self.symbols, &self.usage, &self.names)
            .render(&self.fragment, newline)
    }
}

impl SqlGenerator {
    pub fn new(version: SqlVersion) -> Self {
        Self {
            version,
            statements: StatementArena::new(),
            symbols: SymbolArena::new(),
            symbol_table: SymbolTable::new(),
            usage: SymbolUsageManager::new(),
            names: NameRegistries::default(),
            statement_stack: Vec::new(),
            join_stack: Vec::new(),
            is_var_ref_single: false,
            candidates: IndexMap::new(),
            force_non_unicode: false,
            ignore_force_flag: false,
            target_columns: None,
        }
    }

    pub fn compile(mut self, query: &DbExpression) -> Result<CompiledQuery> {
        let rewritten;
        let query = if self.version == SqlVersion::Sql8 && Sql8ConformanceChecker::needs_rewrite(query)? {
            rewritten = Sql8Rewriter::rewrite(query)?;
            &rewritten
        } else {
            query
        };

        let fragment = if query.result_type().is_collection() {
            let stmt = self.ensure_sql_statement(query, true, false)?;
            self.statements[stmt].is_top_most = true;
            SqlFragment::Statement(stmt)
        } else {
            let mut builder = SqlBuilder::text("SELECT ");
            builder.append(self.visit(query)?);
            builder.into()
        };

        if self.is_var_ref_single {
            return Err(Error::invalid_operation("a variable reference must be used through one of its properties"));
        }

        let params_to_force_non_unicode =
            self.candidates.iter().filter(|(_, forced)| **forced).map(|(name, _)| name.clone()).collect();

        Ok(CompiledQuery {
            version: self.version,
            fragment,
            statements: self.statements,
            symbols: self.symbols,
            usage: self.usage,
            names: self.names,
            params_to_force_non_unicode,
        })
    }

    /// Writes one scalar value of a modification statement. Every property of a
    /// variable is a column of the modified table.
    pub fn modification_value_sql(
        mut self,
        value: &DbExpression,
        columns: TargetColumns,
        newline: &str,
    ) -> Result<String> {
        self.target_columns = Some(columns);
        let fragment = self.visit(value)?;
        Renderer::new(self.version, &self.statements, &self.symbols, &self.usage, &self.names)
            .render(&fragment, newline)
    }

    pub(super) fn enter_scope(&mut self) -> Scope<'_> {
        self.symbol_table.enter_scope();
        Scope { generator: self, pops_statement: false }
    }

    pub(super) fn enter_statement(&mut self, stmt: StatementId) -> Scope<'_> {
        self.statement_stack.push(stmt);
        self.symbol_table.enter_scope();
        Scope { generator: self, pops_statement: true }
    }

    pub(super) fn current_statement(&self) -> Result<StatementId> {
        self.statement_stack.last().copied().must_exist("current SELECT statement")
    }

    pub(super) fn is_parent_a_join(&self) -> bool {
        self.join_stack.last().copied().unwrap_or(false)
    }

    /// Runs `f` with the "parent is a join" flag set to `is_join`.
    pub(super) fn with_join_parent<T>(&mut self, is_join: bool, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.join_stack.push(is_join);
        let result = f(self);
        self.join_stack.pop();
        result
    }

    pub(super) fn visit(&mut self, e: &DbExpression) -> Result<SqlFragment> {
        match e {
            DbExpression::Constant { value, result_type } => self.visit_constant(value, result_type, false),
            DbExpression::Null { result_type } => self.visit_null(result_type),
            DbExpression::VariableReference { name, .. } => self.visit_variable_reference(name),
            DbExpression::ParameterReference { name, .. } => Ok(self.visit_parameter(name)),
            DbExpression::Property { instance, property } => self.visit_property(instance, &property.name),
            DbExpression::Scan { target } => self.visit_scan(target),
            DbExpression::Filter { input, predicate } => Ok(self.visit_filter(input, predicate, false)?.into()),
            DbExpression::Project { input, projection } => Ok(self.visit_project(input, projection)?.into()),
            DbExpression::CrossJoin { inputs, .. } => {
                let inputs: Vec<&DbExpressionBinding> = inputs.iter().collect();
                Ok(self.visit_join(&inputs, "CROSS JOIN", None)?.into())
            }
            DbExpression::Join { kind, left, right, condition, .. } => {
                Ok(self.visit_join(&[left, right], kind.sql_keyword(), Some(condition.as_ref()))?.into())
            }
            DbExpression::Apply { kind, input, apply, .. } => {
                Ok(self.visit_join(&[input, apply], kind.sql_keyword(), None)?.into())
            }
            DbExpression::GroupBy { input, keys, aggregates, result_type } => {
                Ok(self.visit_group_by(input, keys, aggregates, result_type)?.into())
            }
            DbExpression::Sort { input, sort_order } => Ok(self.visit_sort(input, sort_order)?.into()),
            DbExpression::Skip { input, sort_order, count } => Ok(self.visit_skip(input, sort_order, count)?.into()),
            DbExpression::Limit { argument, limit, with_ties } => {
                Ok(self.visit_limit(argument, limit, *with_ties)?.into())
            }
            DbExpression::Distinct { argument } => Ok(self.visit_distinct(argument)?.into()),
            DbExpression::Element { argument } => {
                let stmt = self.ensure_sql_statement(argument, true, false)?;
                let mut result = SqlBuilder::text("(");
                result.append(stmt).append(")");
                Ok(result.into())
            }
            DbExpression::SetOp { kind, left, right } => self.visit_set_op(kind.sql_keyword(), left, right),
            DbExpression::Function { function, arguments, result_type } => {
                self.visit_function(function, arguments, result_type)
            }
            DbExpression::Case { when, then, else_expression, .. } => self.visit_case(when, then, else_expression),
            DbExpression::Comparison { kind, left, right } => self.visit_comparison(e, *kind, left, right),
            DbExpression::Arithmetic { kind, arguments, .. } => self.visit_arithmetic(*kind, arguments),
            DbExpression::And { left, right } => Ok(self.visit_binary(ExpressionKind::And, " AND ", left, right)?.into()),
            DbExpression::Or { left, right } => match self.try_translate_into_in(e)? {
                Some(fragment) => Ok(fragment),
                None => Ok(self.visit_binary(ExpressionKind::Or, " OR ", left, right)?.into()),
            },
            DbExpression::Not { argument } => self.visit_not(argument),
            DbExpression::NewInstance { arguments, result_type } => self.visit_new_instance(arguments, result_type),
            DbExpression::Cast { argument, result_type } => self.visit_cast(argument, result_type),
            DbExpression::Like { argument, pattern, escape } => self.visit_like(e, argument, pattern, escape),
            DbExpression::IsNull { argument } => self.visit_is_null(argument, false),
            DbExpression::IsEmpty { argument } => self.visit_is_empty(argument, false),
            DbExpression::Quantifier { kind, input, predicate } => self.visit_quantifier(*kind, input, predicate),
            DbExpression::IsOf { .. }
            | DbExpression::Treat { .. }
            | DbExpression::OfType { .. }
            | DbExpression::Deref { .. }
            | DbExpression::EntityRef { .. }
            | DbExpression::RefKey { .. }
            | DbExpression::Lambda { .. } => {
                Err(Error::not_supported(format!("{:?} expressions have no SQL translation", e.kind())))
            }
        }
    }

    /// Visits an expression standing directly in a boolean context (a WHERE
    /// or ON clause, a CASE condition, an operand of AND/OR/NOT), where string
    /// predicates such as `Contains` need no bit conversion.
    pub(super) fn visit_predicate(&mut self, e: &DbExpression) -> Result<SqlFragment> {
        match e {
            DbExpression::Function { function, arguments, .. } if function.is_canonical() => {
                match self.translate_string_predicate(&function.name, arguments)? {
                    Some(predicate) => Ok(predicate.into()),
                    None => self.visit(e),
                }
            }
            _ => self.visit(e),
        }
    }

    fn visit_null(&mut self, ty: &TypeUsage) -> Result<SqlFragment> {
        let type_name = match ty.primitive_kind() {
            Some(PrimitiveTypeKind::String) => "varchar(1)".to_string(),
            Some(PrimitiveTypeKind::Binary) => "varbinary(1)".to_string(),
            _ => sql_type_name(self.version, ty)?,
        };
        Ok(format!("CAST(NULL AS {type_name})").into())
    }

    fn visit_parameter(&mut self, name: &str) -> SqlFragment {
        if !self.ignore_force_flag {
            if !self.force_non_unicode {
                self.candidates.insert(name.to_string(), false);
            } else if !self.candidates.contains_key(name) {
                self.candidates.insert(name.to_string(), true);
            }
        }
        format!("@{name}").into()
    }

    fn visit_variable_reference(&mut self, name: &str) -> Result<SqlFragment> {
        if self.is_var_ref_single {
            return Err(Error::invalid_operation(format!("variable '{name}' is referenced on its own")));
        }
        self.is_var_ref_single = true;

        let symbol = self
            .symbol_table
            .lookup(name)
            .ok_or_else(|| Error::invalid_operation(format!("variable '{name}' is not bound")))?;
        self.usage.mark_as_used(symbol);

        let stmt = self.current_statement()?;
        let stmt = &mut self.statements[stmt];
        if !stmt.from_extents.contains(&symbol) {
            stmt.outer_extents.insert(symbol);
        }
        Ok(symbol.into())
    }

    fn visit_property(&mut self, instance: &DbExpression, property: &str) -> Result<SqlFragment> {
        if let (Some(columns), DbExpression::VariableReference { .. }) = (self.target_columns, instance) {
            return Ok(columns.column(property).into());
        }
        let instance_sql = self.visit(instance)?;
        if let DbExpression::VariableReference { .. } = instance {
            self.is_var_ref_single = false;
        }

        match instance_sql {
            SqlFragment::Symbol(symbol) => {
                if let Some(join) = self.symbols.join(symbol) {
                    let extent = join.name_to_extent.get(property).copied().ok_or_else(|| missing_member(property))?;
                    return Ok(if join.is_nested_join {
                        SqlFragment::SymbolPair { source: symbol, column: extent }
                    } else {
                        extent.into()
                    });
                }

                let mut result = SqlBuilder::text(symbol);
                result.append(".");
                match self.symbols[symbol].output_columns.get(property).copied() {
                    Some(column) => {
                        self.usage.mark_as_used(column);
                        if self.symbols[symbol].output_columns_renamed {
                            result.append(column);
                        } else {
                            result.append(quote_identifier(property));
                        }
                    }
                    None => {
                        result.append(quote_identifier(property));
                    }
                }
                Ok(result.into())
            }
            SqlFragment::SymbolPair { source, column } => {
                if let Some(join) = self.symbols.join(column) {
                    let extent = join.name_to_extent.get(property).copied().ok_or_else(|| missing_member(property))?;
                    return Ok(SqlFragment::SymbolPair { source, column: extent });
                }
                if let Some(column_symbol) = self.symbols[column].columns.get(property).copied() {
                    self.usage.mark_as_used(column_symbol);
                    let mut result = SqlBuilder::text(source);
                    result.append(".").append(column_symbol);
                    return Ok(result.into());
                }
                let mut result = SqlBuilder::text(SqlFragment::SymbolPair { source, column });
                result.append(".").append(quote_identifier(property));
                Ok(result.into())
            }
            other => {
                let mut result = SqlBuilder::text(other);
                result.append(".").append(quote_identifier(property));
                Ok(result.into())
            }
        }
    }

    fn visit_case(&mut self, when: &[DbExpression], then: &[DbExpression], otherwise: &DbExpression) -> Result<SqlFragment> {
        if when.len() != then.len() {
            return Err(Error::invalid_operation("CASE needs as many THEN branches as WHEN branches"));
        }
        let mut result = SqlBuilder::text("CASE");
        for (condition, value) in when.iter().zip(then) {
            result.append(" WHEN (");
            result.append(self.visit_predicate(condition)?);
            result.append(") THEN ");
            result.append(self.visit(value)?);
        }
        if !matches!(otherwise, DbExpression::Null { .. }) {
            result.append(" ELSE ");
            result.append(self.visit(otherwise)?);
        }
        result.append(" END");
        Ok(result.into())
    }

    fn visit_cast(&mut self, argument: &DbExpression, ty: &TypeUsage) -> Result<SqlFragment> {
        // Spatial values keep their own type.
        if ty.is_spatial() {
            return self.visit(argument);
        }
        let mut result = SqlBuilder::text(" CAST( ");
        result.append(self.visit(argument)?);
        result.append(" AS ");
        result.append(sql_type_name(self.version, ty)?);
        result.append(")");
        Ok(result.into())
    }

    fn visit_comparison(
        &mut self,
        e: &DbExpression,
        kind: ComparisonKind,
        left: &DbExpression,
        right: &DbExpression,
    ) -> Result<SqlFragment> {
        if left.result_type().is_primitive_kind(PrimitiveTypeKind::String) {
            self.force_non_unicode = self.check_if_force_non_unicode_required(e)?;
        }
        let result = self.visit_comparison_operands(kind.sql_operator(), left, right);
        self.force_non_unicode = false;
        Ok(result?.into())
    }

    pub(super) fn visit_comparison_operands(
        &mut self,
        op: &'static str,
        left: &DbExpression,
        right: &DbExpression,
    ) -> Result<SqlBuilder> {
        let cast_optional = left.result_type().same_edm_type(&right.result_type());
        let mut result = SqlBuilder::new();
        self.append_without_redundant_cast(left, cast_optional, &mut result)?;
        result.append(op);
        self.append_without_redundant_cast(right, cast_optional, &mut result)?;
        Ok(result)
    }

    /// Constants compared with a value of their own type are written without a cast.
    pub(super) fn append_without_redundant_cast(
        &mut self,
        e: &DbExpression,
        cast_optional: bool,
        result: &mut SqlBuilder,
    ) -> Result<()> {
        match e {
            DbExpression::Constant { value, result_type } => {
                result.append(self.visit_constant(value, result_type, cast_optional)?);
                Ok(())
            }
            _ => self.parenthesize_if_needed(e, result),
        }
    }

    fn visit_arithmetic(&mut self, kind: ArithmeticKind, arguments: &[DbExpression]) -> Result<SqlFragment> {
        let op = match kind {
            ArithmeticKind::UnaryMinus => {
                let argument = arguments.first().must_exist("operand of unary minus")?;
                let mut result = SqlBuilder::text(" -(");
                result.append(self.visit(argument)?);
                result.append(")");
                return Ok(result.into());
            }
            ArithmeticKind::Divide => " / ",
            ArithmeticKind::Minus => " - ",
            ArithmeticKind::Modulo => " % ",
            ArithmeticKind::Multiply => " * ",
            ArithmeticKind::Plus => " + ",
        };
        match arguments {
            [left, right] => Ok(self.visit_binary(kind.expression_kind(), op, left, right)?.into()),
            _ => Err(Error::invalid_operation(format!("{kind:?} takes two operands"))),
        }
    }

    /// Writes `left op right`, flattening nested operands of the same
    /// associative kind into one list.
    pub(super) fn visit_binary(
        &mut self,
        kind: ExpressionKind,
        op: &'static str,
        left: &DbExpression,
        right: &DbExpression,
    ) -> Result<SqlBuilder> {
        let mut operands = Vec::new();
        if matches!(kind, ExpressionKind::And | ExpressionKind::Or | ExpressionKind::Plus | ExpressionKind::Multiply) {
            flatten_associative(kind, left, &mut operands);
            flatten_associative(kind, right, &mut operands);
        } else {
            operands.push(left);
            operands.push(right);
        }
        let logical = matches!(kind, ExpressionKind::And | ExpressionKind::Or);

        let mut result = SqlBuilder::new();
        for (i, operand) in operands.into_iter().enumerate() {
            if i > 0 {
                result.append(op);
            }
            if logical {
                self.parenthesize_predicate_if_needed(operand, &mut result)?;
            } else {
                self.parenthesize_if_needed(operand, &mut result)?;
            }
        }
        Ok(result)
    }

    pub(super) fn parenthesize_if_needed(&mut self, e: &DbExpression, result: &mut SqlBuilder) -> Result<()> {
        if is_complex_expression(e) {
            result.append("(");
            result.append(self.visit(e)?);
            result.append(")");
        } else {
            result.append(self.visit(e)?);
        }
        Ok(())
    }

    fn parenthesize_predicate_if_needed(&mut self, e: &DbExpression, result: &mut SqlBuilder) -> Result<()> {
        if is_complex_expression(e) {
            result.append("(");
            result.append(self.visit_predicate(e)?);
            result.append(")");
        } else {
            result.append(self.visit_predicate(e)?);
        }
        Ok(())
    }

    fn visit_not(&mut self, argument: &DbExpression) -> Result<SqlFragment> {
        match argument {
            DbExpression::Not { argument } => self.visit_predicate(argument),
            DbExpression::IsEmpty { argument } => self.visit_is_empty(argument, true),
            DbExpression::IsNull { argument } => self.visit_is_null(argument, true),
            DbExpression::Comparison { kind: ComparisonKind::Equals, left, right } => {
                let saved = self.force_non_unicode;
                if left.result_type().is_primitive_kind(PrimitiveTypeKind::String) {
                    self.force_non_unicode = self.check_if_force_non_unicode_required(argument)?;
                }
                let result = self.visit_binary(ExpressionKind::NotEquals, " <> ", left, right);
                self.force_non_unicode = saved;
                Ok(result?.into())
            }
            _ => {
                let mut result = SqlBuilder::text(" NOT (");
                result.append(self.visit_predicate(argument)?);
                result.append(")");
                Ok(result.into())
            }
        }
    }

    pub(super) fn visit_is_null(&mut self, argument: &DbExpression, negate: bool) -> Result<SqlFragment> {
        let mut result = SqlBuilder::new();
        // A parameter tested for null says nothing about the column it is compared with.
        if let DbExpression::ParameterReference { .. } = argument {
            self.ignore_force_flag = true;
        }
        let operand = self.visit(argument);
        self.ignore_force_flag = false;
        result.append(operand?);
        result.append(if negate { " IS NOT NULL" } else { " IS NULL" });
        Ok(result.into())
    }

    fn visit_is_empty(&mut self, argument: &DbExpression, negate: bool) -> Result<SqlFragment> {
        let mut result = SqlBuilder::new();
        if !negate {
            result.append(" NOT");
        }
        result.append(" EXISTS (");
        result.append(self.ensure_sql_statement(argument, true, false)?);
        result.append_line();
        result.append(")");
        Ok(result.into())
    }

    fn visit_like(
        &mut self,
        e: &DbExpression,
        argument: &DbExpression,
        pattern: &DbExpression,
        escape: &DbExpression,
    ) -> Result<SqlFragment> {
        self.force_non_unicode = self.check_if_force_non_unicode_required(e)?;
        let result = self.visit_like_operands(argument, pattern, escape);
        self.force_non_unicode = false;
        Ok(result?.into())
    }

    fn visit_like_operands(
        &mut self,
        argument: &DbExpression,
        pattern: &DbExpression,
        escape: &DbExpression,
    ) -> Result<SqlBuilder> {
        let mut result = SqlBuilder::new();
        result.append(self.visit(argument)?);
        result.append(" LIKE ");
        result.append(self.visit(pattern)?);
        if !matches!(escape, DbExpression::Null { .. }) {
            result.append(" ESCAPE ");
            result.append(self.visit(escape)?);
        }
        Ok(result)
    }
}

fn missing_member(property: &str) -> Error {
    Error::invalid_operation(format!("join has no input named '{property}'"))
}

/// Operands other than constants, parameters, property accesses and casts
/// are parenthesized inside operators.
pub(super) fn is_complex_expression(e: &DbExpression) -> bool {
    !matches!(
        e,
        DbExpression::Constant { .. }
            | DbExpression::ParameterReference { .. }
            | DbExpression::Property { .. }
            | DbExpression::Cast { .. }
    )
}

fn flatten_associative<'e>(kind: ExpressionKind, e: &'e DbExpression, out: &mut Vec<&'e DbExpression>) {
    if e.kind() != kind {
        out.push(e);
        return;
    }
    match e {
        DbExpression::And { left, right } | DbExpression::Or { left, right } => {
            flatten_associative(kind, left, out);
            flatten_associative(kind, right, out);
        }
        DbExpression::Arithmetic { arguments, .. } => {
            for argument in arguments {
                flatten_associative(kind, argument, out);
            }
        }
        _ => out.push(e),
    }
}
