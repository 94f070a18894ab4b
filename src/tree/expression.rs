use serde::{Deserialize, Serialize};

use crate::{
    ApplyKind, ArithmeticKind, ComparisonKind, ConstantValue, EdmFunction, EdmProperty, EntitySet,
    ExpressionKind, JoinKind, QuantifierKind, Result, SetOpKind, TypeUsage, error::ToResult,
};

/// An input expression bound to a variable name visible to the operator's other arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbExpressionBinding {
    pub expression: Box<DbExpression>,
    pub variable_name: String,
    /// Element type of `expression`.
    pub variable_type: TypeUsage,
}

impl DbExpressionBinding {
    pub fn variable(&self) -> DbExpression {
        DbExpression::VariableReference {
            name: self.variable_name.clone(),
            result_type: self.variable_type.clone(),
        }
    }
}

/// The binding of a GROUP BY: `variable_name` is visible to keys,
/// `group_variable_name` to aggregate arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbGroupExpressionBinding {
    pub expression: Box<DbExpression>,
    pub variable_name: String,
    pub variable_type: TypeUsage,
    pub group_variable_name: String,
}

impl DbGroupExpressionBinding {
    pub fn variable(&self) -> DbExpression {
        DbExpression::VariableReference {
            name: self.variable_name.clone(),
            result_type: self.variable_type.clone(),
        }
    }

    pub fn group_variable(&self) -> DbExpression {
        DbExpression::VariableReference {
            name: self.group_variable_name.clone(),
            result_type: self.variable_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbSortClause {
    pub expression: DbExpression,
    pub ascending: bool,
    #[serde(default)]
    pub collation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DbAggregate {
    Function {
        function: EdmFunction,
        arguments: Vec<DbExpression>,
        distinct: bool,
        result_type: TypeUsage,
    },
    /// Collects the group elements; SQL has no equivalent.
    Group { arguments: Vec<DbExpression>, result_type: TypeUsage },
}

impl DbAggregate {
    pub fn arguments(&self) -> &[DbExpression] {
        match self {
            DbAggregate::Function { arguments, .. } | DbAggregate::Group { arguments, .. } => arguments,
        }
    }

    pub fn result_type(&self) -> &TypeUsage {
        match self {
            DbAggregate::Function { result_type, .. } | DbAggregate::Group { result_type, .. } => result_type,
        }
    }
}

/// A node of a command tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DbExpression {
    Constant { value: ConstantValue, result_type: TypeUsage },
    Null { result_type: TypeUsage },
    VariableReference { name: String, result_type: TypeUsage },
    ParameterReference { name: String, result_type: TypeUsage },
    Property { instance: Box<DbExpression>, property: EdmProperty },
    Scan { target: EntitySet },
    Filter { input: DbExpressionBinding, predicate: Box<DbExpression> },
    Project { input: DbExpressionBinding, projection: Box<DbExpression> },
    CrossJoin { inputs: Vec<DbExpressionBinding>, result_type: TypeUsage },
    Join {
        kind: JoinKind,
        left: DbExpressionBinding,
        right: DbExpressionBinding,
        condition: Box<DbExpression>,
        result_type: TypeUsage,
    },
    Apply {
        kind: ApplyKind,
        input: DbExpressionBinding,
        apply: DbExpressionBinding,
        result_type: TypeUsage,
    },
    GroupBy {
        input: DbGroupExpressionBinding,
        keys: Vec<DbExpression>,
        aggregates: Vec<DbAggregate>,
        result_type: TypeUsage,
    },
    Sort { input: DbExpressionBinding, sort_order: Vec<DbSortClause> },
    Skip { input: DbExpressionBinding, sort_order: Vec<DbSortClause>, count: Box<DbExpression> },
    Limit { argument: Box<DbExpression>, limit: Box<DbExpression>, with_ties: bool },
    Distinct { argument: Box<DbExpression> },
    Element { argument: Box<DbExpression> },
    SetOp { kind: SetOpKind, left: Box<DbExpression>, right: Box<DbExpression> },
    Function { function: EdmFunction, arguments: Vec<DbExpression>, result_type: TypeUsage },
    Case {
        when: Vec<DbExpression>,
        then: Vec<DbExpression>,
        else_expression: Box<DbExpression>,
        result_type: TypeUsage,
    },
    Comparison { kind: ComparisonKind, left: Box<DbExpression>, right: Box<DbExpression> },
    Arithmetic { kind: ArithmeticKind, arguments: Vec<DbExpression>, result_type: TypeUsage },
    And { left: Box<DbExpression>, right: Box<DbExpression> },
    Or { left: Box<DbExpression>, right: Box<DbExpression> },
    Not { argument: Box<DbExpression> },
    NewInstance { arguments: Vec<DbExpression>, result_type: TypeUsage },
    Cast { argument: Box<DbExpression>, result_type: TypeUsage },
    Like { argument: Box<DbExpression>, pattern: Box<DbExpression>, escape: Box<DbExpression> },
    IsNull { argument: Box<DbExpression> },
    IsEmpty { argument: Box<DbExpression> },
    Quantifier { kind: QuantifierKind, input: DbExpressionBinding, predicate: Box<DbExpression> },
    IsOf { argument: Box<DbExpression>, of_type: TypeUsage },
    Treat { argument: Box<DbExpression>, result_type: TypeUsage },
    OfType { argument: Box<DbExpression>, of_type: TypeUsage, result_type: TypeUsage },
    Deref { argument: Box<DbExpression>, result_type: TypeUsage },
    EntityRef { argument: Box<DbExpression>, result_type: TypeUsage },
    RefKey { argument: Box<DbExpression>, result_type: TypeUsage },
    Lambda { arguments: Vec<DbExpression>, body: Box<DbExpression> },
}

impl DbExpression {
    pub fn kind(&self) -> ExpressionKind {
        match self {
            DbExpression::Constant { .. } => ExpressionKind::Constant,
            DbExpression::Null { .. } => ExpressionKind::Null,
            DbExpression::VariableReference { .. } => ExpressionKind::VariableReference,
            DbExpression::ParameterReference { .. } => ExpressionKind::ParameterReference,
            DbExpression::Property { .. } => ExpressionKind::Property,
            DbExpression::Scan { .. } => ExpressionKind::Scan,
            DbExpression::Filter { .. } => ExpressionKind::Filter,
            DbExpression::Project { .. } => ExpressionKind::Project,
            DbExpression::CrossJoin { .. } => ExpressionKind::CrossJoin,
            DbExpression::Join { kind, .. } => kind.expression_kind(),
            DbExpression::Apply { kind: ApplyKind::Cross, .. } => ExpressionKind::CrossApply,
            DbExpression::Apply { kind: ApplyKind::Outer, .. } => ExpressionKind::OuterApply,
            DbExpression::GroupBy { .. } => ExpressionKind::GroupBy,
            DbExpression::Sort { .. } => ExpressionKind::Sort,
            DbExpression::Skip { .. } => ExpressionKind::Skip,
            DbExpression::Limit { .. } => ExpressionKind::Limit,
            DbExpression::Distinct { .. } => ExpressionKind::Distinct,
            DbExpression::Element { .. } => ExpressionKind::Element,
            DbExpression::SetOp { kind: SetOpKind::UnionAll, .. } => ExpressionKind::UnionAll,
            DbExpression::SetOp { kind: SetOpKind::Intersect, .. } => ExpressionKind::Intersect,
            DbExpression::SetOp { kind: SetOpKind::Except, .. } => ExpressionKind::Except,
            DbExpression::Function { .. } => ExpressionKind::Function,
            DbExpression::Case { .. } => ExpressionKind::Case,
            DbExpression::Comparison { kind, .. } => kind.expression_kind(),
            DbExpression::Arithmetic { kind, .. } => kind.expression_kind(),
            DbExpression::And { .. } => ExpressionKind::And,
            DbExpression::Or { .. } => ExpressionKind::Or,
            DbExpression::Not { .. } => ExpressionKind::Not,
            DbExpression::NewInstance { .. } => ExpressionKind::NewInstance,
            DbExpression::Cast { .. } => ExpressionKind::Cast,
            DbExpression::Like { .. } => ExpressionKind::Like,
            DbExpression::IsNull { .. } => ExpressionKind::IsNull,
            DbExpression::IsEmpty { .. } => ExpressionKind::IsEmpty,
            DbExpression::Quantifier { kind: QuantifierKind::Any, .. } => ExpressionKind::Any,
            DbExpression::Quantifier { kind: QuantifierKind::All, .. } => ExpressionKind::All,
            DbExpression::IsOf { .. } => ExpressionKind::IsOf,
            DbExpression::Treat { .. } => ExpressionKind::Treat,
            DbExpression::OfType { .. } => ExpressionKind::OfType,
            DbExpression::Deref { .. } => ExpressionKind::Deref,
            DbExpression::EntityRef { .. } => ExpressionKind::EntityRef,
            DbExpression::RefKey { .. } => ExpressionKind::RefKey,
            DbExpression::Lambda { .. } => ExpressionKind::Lambda,
        }
    }

    pub fn result_type(&self) -> TypeUsage {
        match self {
            DbExpression::Constant { result_type, .. }
            | DbExpression::Null { result_type }
            | DbExpression::VariableReference { result_type, .. }
            | DbExpression::ParameterReference { result_type, .. }
            | DbExpression::CrossJoin { result_type, .. }
            | DbExpression::Join { result_type, .. }
            | DbExpression::Apply { result_type, .. }
            | DbExpression::GroupBy { result_type, .. }
            | DbExpression::Function { result_type, .. }
            | DbExpression::Case { result_type, .. }
            | DbExpression::Arithmetic { result_type, .. }
            | DbExpression::NewInstance { result_type, .. }
            | DbExpression::Cast { result_type, .. }
            | DbExpression::Treat { result_type, .. }
            | DbExpression::OfType { result_type, .. }
            | DbExpression::Deref { result_type, .. }
            | DbExpression::EntityRef { result_type, .. }
            | DbExpression::RefKey { result_type, .. } => result_type.clone(),
            DbExpression::Property { property, .. } => property.type_usage.clone(),
            DbExpression::Scan { target } => TypeUsage::collection(target.element_type_usage()),
            DbExpression::Filter { input, .. }
            | DbExpression::Sort { input, .. }
            | DbExpression::Skip { input, .. } => input.expression.result_type(),
            DbExpression::Project { projection, .. } => TypeUsage::collection(projection.result_type()),
            DbExpression::Limit { argument, .. }
            | DbExpression::Distinct { argument } => argument.result_type(),
            DbExpression::Element { argument } => {
                let collection = argument.result_type();
                collection.element_type().cloned().unwrap_or(collection)
            }
            DbExpression::SetOp { left, .. } => left.result_type(),
            DbExpression::Lambda { body, .. } => body.result_type(),
            DbExpression::Comparison { .. }
            | DbExpression::And { .. }
            | DbExpression::Or { .. }
            | DbExpression::Not { .. }
            | DbExpression::Like { .. }
            | DbExpression::IsNull { .. }
            | DbExpression::IsEmpty { .. }
            | DbExpression::Quantifier { .. }
            | DbExpression::IsOf { .. } => TypeUsage::boolean(),
        }
    }

    /// Element type of a collection-typed expression.
    pub fn element_type(&self) -> Result<TypeUsage> {
        let ty = self.result_type();
        ty.element_type().cloned().must_exist(&format!("element type of {ty}"))
    }

    /// Rebuilds the node with every direct child replaced by `f(child)`.
    /// Binding variable types are kept, since rewrites preserve result types.
    pub fn map_children<F>(&self, f: &mut F) -> Result<DbExpression>
    where
        F: FnMut(&DbExpression) -> Result<DbExpression>,
    {
        fn bx<F: FnMut(&DbExpression) -> Result<DbExpression>>(
            e: &DbExpression,
            f: &mut F,
        ) -> Result<Box<DbExpression>> {
            Ok(Box::new(f(e)?))
        }
        fn list<F: FnMut(&DbExpression) -> Result<DbExpression>>(
            es: &[DbExpression],
            f: &mut F,
        ) -> Result<Vec<DbExpression>> {
            es.iter().map(|e| f(e)).collect()
        }
        fn bind<F: FnMut(&DbExpression) -> Result<DbExpression>>(
            b: &DbExpressionBinding,
            f: &mut F,
        ) -> Result<DbExpressionBinding> {
            Ok(DbExpressionBinding {
                expression: Box::new(f(&b.expression)?),
                variable_name: b.variable_name.clone(),
                variable_type: b.variable_type.clone(),
            })
        }
        fn sort<F: FnMut(&DbExpression) -> Result<DbExpression>>(
            order: &[DbSortClause],
            f: &mut F,
        ) -> Result<Vec<DbSortClause>> {
            order
                .iter()
                .map(|c| {
                    Ok(DbSortClause { expression: f(&c.expression)?, ascending: c.ascending, collation: c.collation.clone() })
                })
                .collect()
        }

        Ok(match self {
            DbExpression::Constant { .. }
            | DbExpression::Null { .. }
            | DbExpression::VariableReference { .. }
            | DbExpression::ParameterReference { .. }
            | DbExpression::Scan { .. } => self.clone(),
            DbExpression::Property { instance, property } => {
                DbExpression::Property { instance: bx(instance, f)?, property: property.clone() }
            }
            DbExpression::Filter { input, predicate } => {
                DbExpression::Filter { input: bind(input, f)?, predicate: bx(predicate, f)? }
            }
            DbExpression::Project { input, projection } => {
                DbExpression::Project { input: bind(input, f)?, projection: bx(projection, f)? }
            }
            DbExpression::CrossJoin { inputs, result_type } => DbExpression::CrossJoin {
                inputs: inputs.iter().map(|b| bind(b, f)).collect::<Result<_>>()?,
                result_type: result_type.clone(),
            },
            DbExpression::Join { kind, left, right, condition, result_type } => DbExpression::Join {
                kind: *kind,
                left: bind(left, f)?,
                right: bind(right, f)?,
                condition: bx(condition, f)?,
                result_type: result_type.clone(),
            },
            DbExpression::Apply { kind, input, apply, result_type } => DbExpression::Apply {
                kind: *kind,
                input: bind(input, f)?,
                apply: bind(apply, f)?,
                result_type: result_type.clone(),
            },
            DbExpression::GroupBy { input, keys, aggregates, result_type } => DbExpression::GroupBy {
                input: DbGroupExpressionBinding {
                    expression: bx(&input.expression, f)?,
                    variable_name: input.variable_name.clone(),
                    variable_type: input.variable_type.clone(),
                    group_variable_name: input.group_variable_name.clone(),
                },
                keys: list(keys, f)?,
                aggregates: aggregates
                    .iter()
                    .map(|a| {
                        Ok(match a {
                            DbAggregate::Function { function, arguments, distinct, result_type } => {
                                DbAggregate::Function {
                                    function: function.clone(),
                                    arguments: list(arguments, f)?,
                                    distinct: *distinct,
                                    result_type: result_type.clone(),
                                }
                            }
                            DbAggregate::Group { arguments, result_type } => DbAggregate::Group {
                                arguments: list(arguments, f)?,
                                result_type: result_type.clone(),
                            },
                        })
                    })
                    .collect::<Result<_>>()?,
                result_type: result_type.clone(),
            },
            DbExpression::Sort { input, sort_order } => {
                DbExpression::Sort { input: bind(input, f)?, sort_order: sort(sort_order, f)? }
            }
            DbExpression::Skip { input, sort_order, count } => DbExpression::Skip {
                input: bind(input, f)?,
                sort_order: sort(sort_order, f)?,
                count: bx(count, f)?,
            },
            DbExpression::Limit { argument, limit, with_ties } => DbExpression::Limit {
                argument: bx(argument, f)?,
                limit: bx(limit, f)?,
                with_ties: *with_ties,
            },
            DbExpression::Distinct { argument } => DbExpression::Distinct { argument: bx(argument, f)? },
            DbExpression::Element { argument } => DbExpression::Element { argument: bx(argument, f)? },
            DbExpression::SetOp { kind, left, right } => {
                DbExpression::SetOp { kind: *kind, left: bx(left, f)?, right: bx(right, f)? }
            }
            DbExpression::Function { function, arguments, result_type } => DbExpression::Function {
                function: function.clone(),
                arguments: list(arguments, f)?,
                result_type: result_type.clone(),
            },
            DbExpression::Case { when, then, else_expression, result_type } => DbExpression::Case {
                when: list(when, f)?,
                then: list(then, f)?,
                else_expression: bx(else_expression, f)?,
                result_type: result_type.clone(),
            },
            DbExpression::Comparison { kind, left, right } => {
                DbExpression::Comparison { kind: *kind, left: bx(left, f)?, right: bx(right, f)? }
            }
            DbExpression::Arithmetic { kind, arguments, result_type } => DbExpression::Arithmetic {
                kind: *kind,
                arguments: list(arguments, f)?,
                result_type: result_type.clone(),
            },
            DbExpression::And { left, right } => DbExpression::And { left: bx(left, f)?, right: bx(right, f)? },
            DbExpression::Or { left, right } => DbExpression::Or { left: bx(left, f)?, right: bx(right, f)? },
            DbExpression::Not { argument } => DbExpression::Not { argument: bx(argument, f)? },
            DbExpression::NewInstance { arguments, result_type } => DbExpression::NewInstance {
                arguments: list(arguments, f)?,
                result_type: result_type.clone(),
            },
            DbExpression::Cast { argument, result_type } => {
                DbExpression::Cast { argument: bx(argument, f)?, result_type: result_type.clone() }
            }
            DbExpression::Like { argument, pattern, escape } => DbExpression::Like {
                argument: bx(argument, f)?,
                pattern: bx(pattern, f)?,
                escape: bx(escape, f)?,
            },
            DbExpression::IsNull { argument } => DbExpression::IsNull { argument: bx(argument, f)? },
            DbExpression::IsEmpty { argument } => DbExpression::IsEmpty { argument: bx(argument, f)? },
            DbExpression::Quantifier { kind, input, predicate } => DbExpression::Quantifier {
                kind: *kind,
                input: bind(input, f)?,
                predicate: bx(predicate, f)?,
            },
            DbExpression::IsOf { argument, of_type } => {
                DbExpression::IsOf { argument: bx(argument, f)?, of_type: of_type.clone() }
            }
            DbExpression::Treat { argument, result_type } => {
                DbExpression::Treat { argument: bx(argument, f)?, result_type: result_type.clone() }
            }
            DbExpression::OfType { argument, of_type, result_type } => DbExpression::OfType {
                argument: bx(argument, f)?,
                of_type: of_type.clone(),
                result_type: result_type.clone(),
            },
            DbExpression::Deref { argument, result_type } => {
                DbExpression::Deref { argument: bx(argument, f)?, result_type: result_type.clone() }
            }
            DbExpression::EntityRef { argument, result_type } => {
                DbExpression::EntityRef { argument: bx(argument, f)?, result_type: result_type.clone() }
            }
            DbExpression::RefKey { argument, result_type } => {
                DbExpression::RefKey { argument: bx(argument, f)?, result_type: result_type.clone() }
            }
            DbExpression::Lambda { arguments, body } => {
                DbExpression::Lambda { arguments: list(arguments, f)?, body: bx(body, f)? }
            }
        })
    }

    /// Direct children in visit order: binding inputs first, then the
    /// operator's own arguments.
    pub fn children(&self) -> Vec<&DbExpression> {
        let mut out: Vec<&DbExpression> = Vec::new();
        match self {
            DbExpression::Constant { .. }
            | DbExpression::Null { .. }
            | DbExpression::VariableReference { .. }
            | DbExpression::ParameterReference { .. }
            | DbExpression::Scan { .. } => {}
            DbExpression::Property { instance, .. } => out.push(instance),
            DbExpression::Filter { input, predicate: other }
            | DbExpression::Project { input, projection: other }
            | DbExpression::Quantifier { input, predicate: other, .. } => {
                out.push(&input.expression);
                out.push(other);
            }
            DbExpression::CrossJoin { inputs, .. } => out.extend(inputs.iter().map(|b| b.expression.as_ref())),
            DbExpression::Join { left, right, condition, .. } => {
                out.push(&left.expression);
                out.push(&right.expression);
                out.push(condition);
            }
            DbExpression::Apply { input, apply, .. } => {
                out.push(&input.expression);
                out.push(&apply.expression);
            }
            DbExpression::GroupBy { input, keys, aggregates, .. } => {
                out.push(&input.expression);
                out.extend(keys);
                out.extend(aggregates.iter().flat_map(DbAggregate::arguments));
            }
            DbExpression::Sort { input, sort_order } => {
                out.push(&input.expression);
                out.extend(sort_order.iter().map(|c| &c.expression));
            }
            DbExpression::Skip { input, sort_order, count } => {
                out.push(&input.expression);
                out.extend(sort_order.iter().map(|c| &c.expression));
                out.push(count);
            }
            DbExpression::Limit { argument, limit, .. } => {
                out.push(argument);
                out.push(limit);
            }
            DbExpression::SetOp { left, right, .. }
            | DbExpression::Comparison { left, right, .. }
            | DbExpression::And { left, right }
            | DbExpression::Or { left, right } => {
                out.push(left);
                out.push(right);
            }
            DbExpression::Function { arguments, .. }
            | DbExpression::Arithmetic { arguments, .. }
            | DbExpression::NewInstance { arguments, .. } => out.extend(arguments),
            DbExpression::Case { when, then, else_expression, .. } => {
                for (w, t) in when.iter().zip(then) {
                    out.push(w);
                    out.push(t);
                }
                out.push(else_expression);
            }
            DbExpression::Like { argument, pattern, escape } => {
                out.push(argument);
                out.push(pattern);
                out.push(escape);
            }
            DbExpression::Distinct { argument }
            | DbExpression::Element { argument }
            | DbExpression::Not { argument }
            | DbExpression::Cast { argument, .. }
            | DbExpression::IsNull { argument }
            | DbExpression::IsEmpty { argument }
            | DbExpression::IsOf { argument, .. }
            | DbExpression::Treat { argument, .. }
            | DbExpression::OfType { argument, .. }
            | DbExpression::Deref { argument, .. }
            | DbExpression::EntityRef { argument, .. }
            | DbExpression::RefKey { argument, .. } => out.push(argument),
            DbExpression::Lambda { arguments, body } => {
                out.extend(arguments);
                out.push(body);
            }
        }
        out
    }
}
