//! Constructors for command tree nodes that compute result types.

use crate::{
    ApplyKind, ArithmeticKind, ComparisonKind, ConstantValue, DbAggregate, DbExpression,
    DbExpressionBinding, DbGroupExpressionBinding, DbSortClause, EdmFunction, EdmProperty, EntitySet,
    Error, JoinKind, QuantifierKind, Result, SetOpKind, TypeUsage,
};

impl DbExpression {
    /// A constant typed after its value.
    pub fn constant(value: impl Into<ConstantValue>) -> Self {
        let value = value.into();
        let result_type = TypeUsage::primitive(value.kind());
        DbExpression::Constant { value, result_type }
    }

    /// A constant with an explicit type, e.g. a string carrying a unicode facet.
    pub fn typed_constant(value: impl Into<ConstantValue>, result_type: TypeUsage) -> Self {
        DbExpression::Constant { value: value.into(), result_type }
    }

    pub fn null(result_type: TypeUsage) -> Self {
        DbExpression::Null { result_type }
    }

    pub fn parameter(name: &str, result_type: TypeUsage) -> Self {
        DbExpression::ParameterReference { name: name.to_string(), result_type }
    }

    pub fn variable(name: &str, result_type: TypeUsage) -> Self {
        DbExpression::VariableReference { name: name.to_string(), result_type }
    }

    pub fn scan(target: EntitySet) -> Self {
        DbExpression::Scan { target }
    }

    /// Member access on a row or entity valued expression.
    pub fn property(self, name: &str) -> Result<Self> {
        let ty = self.result_type();
        let property = ty
            .property(name)
            .cloned()
            .ok_or_else(|| Error::metadata(format!("type {ty} has no property '{name}'")))?;
        Ok(DbExpression::Property { instance: Box::new(self), property })
    }

    pub fn bind_as(self, variable_name: &str) -> Result<DbExpressionBinding> {
        let variable_type = self.element_type()?;
        Ok(DbExpressionBinding { expression: Box::new(self), variable_name: variable_name.to_string(), variable_type })
    }

    pub fn group_bind_as(self, variable_name: &str, group_variable_name: &str) -> Result<DbGroupExpressionBinding> {
        let variable_type = self.element_type()?;
        Ok(DbGroupExpressionBinding {
            expression: Box::new(self),
            variable_name: variable_name.to_string(),
            variable_type,
            group_variable_name: group_variable_name.to_string(),
        })
    }

    pub fn comparison(kind: ComparisonKind, left: DbExpression, right: DbExpression) -> Self {
        DbExpression::Comparison { kind, left: Box::new(left), right: Box::new(right) }
    }

    pub fn equal(self, right: DbExpression) -> Self {
        Self::comparison(ComparisonKind::Equals, self, right)
    }

    pub fn not_equal(self, right: DbExpression) -> Self {
        Self::comparison(ComparisonKind::NotEquals, self, right)
    }

    pub fn less_than(self, right: DbExpression) -> Self {
        Self::comparison(ComparisonKind::LessThan, self, right)
    }

    pub fn greater_than(self, right: DbExpression) -> Self {
        Self::comparison(ComparisonKind::GreaterThan, self, right)
    }

    pub fn and(self, right: DbExpression) -> Self {
        DbExpression::And { left: Box::new(self), right: Box::new(right) }
    }

    pub fn or(self, right: DbExpression) -> Self {
        DbExpression::Or { left: Box::new(self), right: Box::new(right) }
    }

    pub fn not(self) -> Self {
        DbExpression::Not { argument: Box::new(self) }
    }

    pub fn is_null(self) -> Self {
        DbExpression::IsNull { argument: Box::new(self) }
    }

    pub fn is_empty(self) -> Self {
        DbExpression::IsEmpty { argument: Box::new(self) }
    }

    /// Binary arithmetic typed after the left operand.
    pub fn arithmetic(kind: ArithmeticKind, left: DbExpression, right: DbExpression) -> Self {
        let result_type = left.result_type();
        DbExpression::Arithmetic { kind, arguments: vec![left, right], result_type }
    }

    pub fn plus(self, right: DbExpression) -> Self {
        Self::arithmetic(ArithmeticKind::Plus, self, right)
    }

    pub fn minus(self, right: DbExpression) -> Self {
        Self::arithmetic(ArithmeticKind::Minus, self, right)
    }

    pub fn multiply(self, right: DbExpression) -> Self {
        Self::arithmetic(ArithmeticKind::Multiply, self, right)
    }

    pub fn negate(self) -> Self {
        let result_type = self.result_type();
        DbExpression::Arithmetic { kind: ArithmeticKind::UnaryMinus, arguments: vec![self], result_type }
    }

    pub fn cast_to(self, result_type: TypeUsage) -> Self {
        DbExpression::Cast { argument: Box::new(self), result_type }
    }

    pub fn like(self, pattern: DbExpression) -> Self {
        let escape = DbExpression::null(TypeUsage::string(None));
        DbExpression::Like { argument: Box::new(self), pattern: Box::new(pattern), escape: Box::new(escape) }
    }

    pub fn like_escape(self, pattern: DbExpression, escape: DbExpression) -> Self {
        DbExpression::Like { argument: Box::new(self), pattern: Box::new(pattern), escape: Box::new(escape) }
    }

    pub fn distinct(self) -> Self {
        DbExpression::Distinct { argument: Box::new(self) }
    }

    /// The single element of a collection.
    pub fn element(self) -> Result<Self> {
        self.element_type()?;
        Ok(DbExpression::Element { argument: Box::new(self) })
    }

    pub fn limit(self, count: DbExpression) -> Self {
        DbExpression::Limit { argument: Box::new(self), limit: Box::new(count), with_ties: false }
    }

    pub fn limit_with_ties(self, count: DbExpression) -> Self {
        DbExpression::Limit { argument: Box::new(self), limit: Box::new(count), with_ties: true }
    }

    pub fn set_op(kind: SetOpKind, left: DbExpression, right: DbExpression) -> Self {
        DbExpression::SetOp { kind, left: Box::new(left), right: Box::new(right) }
    }

    pub fn union_all(self, right: DbExpression) -> Self {
        Self::set_op(SetOpKind::UnionAll, self, right)
    }

    pub fn intersect(self, right: DbExpression) -> Self {
        Self::set_op(SetOpKind::Intersect, self, right)
    }

    pub fn except(self, right: DbExpression) -> Self {
        Self::set_op(SetOpKind::Except, self, right)
    }

    /// A function call with an explicit result type.
    pub fn invoke(function: EdmFunction, arguments: Vec<DbExpression>, result_type: TypeUsage) -> Self {
        DbExpression::Function { function, arguments, result_type }
    }

    pub fn case(when: Vec<DbExpression>, then: Vec<DbExpression>, else_expression: DbExpression) -> Self {
        let result_type = else_expression.result_type();
        DbExpression::Case { when, then, else_expression: Box::new(else_expression), result_type }
    }

    /// A row constructor over named columns.
    pub fn new_row(columns: Vec<(&str, DbExpression)>) -> Self {
        let properties = columns.iter().map(|(name, e)| EdmProperty::new(name, e.result_type())).collect();
        DbExpression::NewInstance {
            arguments: columns.into_iter().map(|(_, e)| e).collect(),
            result_type: TypeUsage::row(properties),
        }
    }

    /// A collection constructor, e.g. `{1, 2, 3}`.
    pub fn new_collection(elements: Vec<DbExpression>, element_type: TypeUsage) -> Self {
        DbExpression::NewInstance { arguments: elements, result_type: TypeUsage::collection(element_type) }
    }
}

impl DbExpressionBinding {
    pub fn filter(self, predicate: DbExpression) -> DbExpression {
        DbExpression::Filter { input: self, predicate: Box::new(predicate) }
    }

    pub fn project(self, projection: DbExpression) -> DbExpression {
        DbExpression::Project { input: self, projection: Box::new(projection) }
    }

    pub fn sort(self, sort_order: Vec<DbSortClause>) -> DbExpression {
        DbExpression::Sort { input: self, sort_order }
    }

    pub fn skip(self, sort_order: Vec<DbSortClause>, count: DbExpression) -> DbExpression {
        DbExpression::Skip { input: self, sort_order, count: Box::new(count) }
    }

    pub fn any(self, predicate: DbExpression) -> DbExpression {
        DbExpression::Quantifier { kind: QuantifierKind::Any, input: self, predicate: Box::new(predicate) }
    }

    pub fn all(self, predicate: DbExpression) -> DbExpression {
        DbExpression::Quantifier { kind: QuantifierKind::All, input: self, predicate: Box::new(predicate) }
    }

    pub fn cross_apply(self, apply: DbExpressionBinding) -> DbExpression {
        apply_expression(ApplyKind::Cross, self, apply)
    }

    pub fn outer_apply(self, apply: DbExpressionBinding) -> DbExpression {
        apply_expression(ApplyKind::Outer, self, apply)
    }
}

impl DbSortClause {
    pub fn asc(expression: DbExpression) -> Self {
        Self { expression, ascending: true, collation: None }
    }

    pub fn desc(expression: DbExpression) -> Self {
        Self { expression, ascending: false, collation: None }
    }

    pub fn with_collation(mut self, collation: &str) -> Self {
        self.collation = Some(collation.to_string());
        self
    }
}

impl DbAggregate {
    pub fn function(function: EdmFunction, argument: DbExpression, result_type: TypeUsage) -> Self {
        DbAggregate::Function { function, arguments: vec![argument], distinct: false, result_type }
    }

    pub fn distinct_function(function: EdmFunction, argument: DbExpression, result_type: TypeUsage) -> Self {
        DbAggregate::Function { function, arguments: vec![argument], distinct: true, result_type }
    }
}

/// Collection of rows with one column per binding variable.
fn row_of_bindings(bindings: &[&DbExpressionBinding]) -> TypeUsage {
    TypeUsage::collection(TypeUsage::row(
        bindings.iter().map(|b| EdmProperty::new(&b.variable_name, b.variable_type.clone())).collect(),
    ))
}

fn apply_expression(kind: ApplyKind, input: DbExpressionBinding, apply: DbExpressionBinding) -> DbExpression {
    let result_type = row_of_bindings(&[&input, &apply]);
    DbExpression::Apply { kind, input, apply, result_type }
}

pub fn cross_join(inputs: Vec<DbExpressionBinding>) -> DbExpression {
    let result_type = row_of_bindings(&inputs.iter().collect::<Vec<_>>());
    DbExpression::CrossJoin { inputs, result_type }
}

pub fn join(kind: JoinKind, left: DbExpressionBinding, right: DbExpressionBinding, condition: DbExpression) -> DbExpression {
    let result_type = row_of_bindings(&[&left, &right]);
    DbExpression::Join { kind, left, right, condition: Box::new(condition), result_type }
}

pub fn inner_join(left: DbExpressionBinding, right: DbExpressionBinding, condition: DbExpression) -> DbExpression {
    join(JoinKind::Inner, left, right, condition)
}

pub fn left_outer_join(left: DbExpressionBinding, right: DbExpressionBinding, condition: DbExpression) -> DbExpression {
    join(JoinKind::LeftOuter, left, right, condition)
}

pub fn full_outer_join(left: DbExpressionBinding, right: DbExpressionBinding, condition: DbExpression) -> DbExpression {
    join(JoinKind::FullOuter, left, right, condition)
}

/// GROUP BY producing rows of the named keys followed by the named aggregates.
pub fn group_by(
    input: DbGroupExpressionBinding,
    keys: Vec<(&str, DbExpression)>,
    aggregates: Vec<(&str, DbAggregate)>,
) -> DbExpression {
    let mut properties: Vec<EdmProperty> =
        keys.iter().map(|(name, e)| EdmProperty::new(name, e.result_type())).collect();
    properties.extend(aggregates.iter().map(|(name, a)| EdmProperty::new(name, a.result_type().clone())));
    DbExpression::GroupBy {
        input,
        keys: keys.into_iter().map(|(_, e)| e).collect(),
        aggregates: aggregates.into_iter().map(|(_, a)| a).collect(),
        result_type: TypeUsage::collection(TypeUsage::row(properties)),
    }
}
