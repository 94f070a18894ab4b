use serde::{Deserialize, Serialize};

/// Node kind of a [`crate::DbExpression`], one per distinct SQL treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpressionKind {
    All,
    And,
    Any,
    Case,
    Cast,
    Constant,
    CrossApply,
    CrossJoin,
    Deref,
    Distinct,
    Divide,
    Element,
    EntityRef,
    Equals,
    Except,
    Filter,
    FullOuterJoin,
    Function,
    GreaterThan,
    GreaterThanOrEquals,
    GroupBy,
    InnerJoin,
    Intersect,
    IsEmpty,
    IsNull,
    IsOf,
    Lambda,
    LeftOuterJoin,
    LessThan,
    LessThanOrEquals,
    Like,
    Limit,
    Minus,
    Modulo,
    Multiply,
    NewInstance,
    Not,
    NotEquals,
    Null,
    OfType,
    Or,
    OuterApply,
    ParameterReference,
    Plus,
    Project,
    Property,
    RefKey,
    Scan,
    Skip,
    Sort,
    Treat,
    UnaryMinus,
    UnionAll,
    VariableReference,
}

impl ExpressionKind {
    pub fn is_join(self) -> bool {
        matches!(
            self,
            ExpressionKind::CrossJoin
                | ExpressionKind::FullOuterJoin
                | ExpressionKind::InnerJoin
                | ExpressionKind::LeftOuterJoin
        )
    }

    pub fn is_apply(self) -> bool {
        matches!(self, ExpressionKind::CrossApply | ExpressionKind::OuterApply)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonKind {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
}

impl ComparisonKind {
    pub fn sql_operator(self) -> &'static str {
        match self {
            ComparisonKind::Equals => " = ",
            ComparisonKind::NotEquals => " <> ",
            ComparisonKind::LessThan => " < ",
            ComparisonKind::LessThanOrEquals => " <= ",
            ComparisonKind::GreaterThan => " > ",
            ComparisonKind::GreaterThanOrEquals => " >= ",
        }
    }

    pub fn expression_kind(self) -> ExpressionKind {
        match self {
            ComparisonKind::Equals => ExpressionKind::Equals,
            ComparisonKind::NotEquals => ExpressionKind::NotEquals,
            ComparisonKind::LessThan => ExpressionKind::LessThan,
            ComparisonKind::LessThanOrEquals => ExpressionKind::LessThanOrEquals,
            ComparisonKind::GreaterThan => ExpressionKind::GreaterThan,
            ComparisonKind::GreaterThanOrEquals => ExpressionKind::GreaterThanOrEquals,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithmeticKind {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    UnaryMinus,
}

impl ArithmeticKind {
    pub fn expression_kind(self) -> ExpressionKind {
        match self {
            ArithmeticKind::Plus => ExpressionKind::Plus,
            ArithmeticKind::Minus => ExpressionKind::Minus,
            ArithmeticKind::Multiply => ExpressionKind::Multiply,
            ArithmeticKind::Divide => ExpressionKind::Divide,
            ArithmeticKind::Modulo => ExpressionKind::Modulo,
            ArithmeticKind::UnaryMinus => ExpressionKind::UnaryMinus,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    FullOuter,
}

impl JoinKind {
    pub fn sql_keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
            JoinKind::FullOuter => "FULL OUTER JOIN",
        }
    }

    pub fn expression_kind(self) -> ExpressionKind {
        match self {
            JoinKind::Inner => ExpressionKind::InnerJoin,
            JoinKind::LeftOuter => ExpressionKind::LeftOuterJoin,
            JoinKind::FullOuter => ExpressionKind::FullOuterJoin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplyKind {
    Cross,
    Outer,
}

impl ApplyKind {
    pub fn sql_keyword(self) -> &'static str {
        match self {
            ApplyKind::Cross => "CROSS APPLY",
            ApplyKind::Outer => "OUTER APPLY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetOpKind {
    UnionAll,
    Intersect,
    Except,
}

impl SetOpKind {
    pub fn sql_keyword(self) -> &'static str {
        match self {
            SetOpKind::UnionAll => "UNION ALL",
            SetOpKind::Intersect => "INTERSECT",
            SetOpKind::Except => "EXCEPT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantifierKind {
    Any,
    All,
}
