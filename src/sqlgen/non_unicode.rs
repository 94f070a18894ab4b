use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::{
    DbExpression, Error, PrimitiveTypeKind, Result,
    sqlgen::SqlGenerator,
};

/// String functions that keep a non-unicode argument non-unicode, by the
/// number of arguments that must qualify.
static STRING_FUNCTIONS_ONE_ARG: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "Edm.Trim",
        "Edm.RTrim",
        "Edm.LTrim",
        "Edm.Left",
        "Edm.Right",
        "Edm.Substring",
        "Edm.ToLower",
        "Edm.ToUpper",
        "Edm.Reverse",
        "SqlServer.RTRIM",
        "SqlServer.LTRIM",
        "SqlServer.LEFT",
        "SqlServer.RIGHT",
        "SqlServer.SUBSTRING",
        "SqlServer.LOWER",
        "SqlServer.UPPER",
        "SqlServer.REVERSE",
    ]
    .into_iter()
    .collect()
});

static STRING_FUNCTIONS_TWO_ARGS: Lazy<HashSet<&'static str>> = Lazy::new(|| ["Edm.Concat"].into_iter().collect());

static STRING_FUNCTIONS_THREE_ARGS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["Edm.Replace", "SqlServer.REPLACE"].into_iter().collect());

impl SqlGenerator {
    /// Whether the string literals and parameters of a comparison or LIKE
    /// should be written as non-unicode. Forcing contexts do not nest.
    pub(super) fn check_if_force_non_unicode_required(&self, e: &DbExpression) -> Result<bool> {
        if self.force_non_unicode {
            return Err(Error::not_supported("nested non-unicode string comparisons"));
        }
        Ok(match_pattern_for_forcing_non_unicode(e))
    }

    /// Runs `f` with forcing switched on when `force` is set and it is not on already.
    pub(super) fn forcing_non_unicode<T>(&mut self, force: bool, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let reset = force && !self.force_non_unicode;
        if reset {
            self.force_non_unicode = true;
        }
        let result = f(self);
        if reset {
            self.force_non_unicode = false;
        }
        result
    }
}

pub(super) fn match_pattern_for_forcing_non_unicode(e: &DbExpression) -> bool {
    match e {
        DbExpression::Like { argument, pattern, escape } => {
            match_source_pattern(argument) && match_target_pattern(pattern) && match_target_pattern(escape)
        }
        DbExpression::Comparison { left, right, .. } => {
            (match_source_pattern(left) && match_target_pattern(right))
                || (match_source_pattern(right) && match_target_pattern(left))
        }
        _ => false,
    }
}

/// A column explicitly declared non-unicode.
pub(super) fn match_source_pattern(e: &DbExpression) -> bool {
    matches!(e, DbExpression::Property { property, .. } if property.type_usage.facets.unicode == Some(false))
}

/// A string literal, parameter or null with no unicode facet of its own, or a
/// pass-through string function over such operands.
pub(super) fn match_target_pattern(e: &DbExpression) -> bool {
    if is_const_param_or_null_unicode_not_specified(e) {
        return true;
    }
    let DbExpression::Function { function, arguments, .. } = e else {
        return false;
    };
    if !function.is_canonical() && !function.is_store() {
        return false;
    }

    let full_name = function.full_name();
    let qualifying = if STRING_FUNCTIONS_ONE_ARG.contains(full_name.as_str()) {
        1
    } else if STRING_FUNCTIONS_TWO_ARGS.contains(full_name.as_str()) {
        2
    } else if STRING_FUNCTIONS_THREE_ARGS.contains(full_name.as_str()) {
        3
    } else {
        return false;
    };
    arguments.len() >= qualifying && arguments[..qualifying].iter().all(match_target_pattern)
}

fn is_const_param_or_null_unicode_not_specified(e: &DbExpression) -> bool {
    let ty = e.result_type();
    ty.is_primitive_kind(PrimitiveTypeKind::String)
        && matches!(
            e,
            DbExpression::Constant { .. } | DbExpression::ParameterReference { .. } | DbExpression::Null { .. }
        )
        && ty.facets.unicode.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EdmFunction, EdmProperty, TypeUsage};

    fn ansi_column() -> DbExpression {
        DbExpression::Property {
            instance: Box::new(DbExpression::variable("p", TypeUsage::row(vec![]))),
            property: EdmProperty::new("Code", TypeUsage::string(Some(false))),
        }
    }

    #[test]
    fn literal_compared_with_ansi_column_is_forced() {
        let e = ansi_column().equal(DbExpression::constant("x"));
        assert!(match_pattern_for_forcing_non_unicode(&e));
        let reversed = DbExpression::parameter("p0", TypeUsage::string(None)).equal(ansi_column());
        assert!(match_pattern_for_forcing_non_unicode(&reversed));
    }

    #[test]
    fn explicit_unicode_operands_are_left_alone() {
        let e = ansi_column().equal(DbExpression::typed_constant("x", TypeUsage::string(Some(true))));
        assert!(!match_pattern_for_forcing_non_unicode(&e));
    }

    #[test]
    fn pass_through_functions_are_targets() {
        let upper = DbExpression::invoke(
            EdmFunction::canonical("ToUpper"),
            vec![DbExpression::parameter("p0", TypeUsage::string(None))],
            TypeUsage::string(None),
        );
        assert!(match_target_pattern(&upper));

        let length = DbExpression::invoke(
            EdmFunction::canonical("Length"),
            vec![DbExpression::constant("x")],
            TypeUsage::int32(),
        );
        assert!(!match_target_pattern(&length));

        let replace = DbExpression::invoke(
            EdmFunction::store("REPLACE"),
            vec![DbExpression::constant("a"), DbExpression::constant("b"), DbExpression::constant("c")],
            TypeUsage::string(None),
        );
        assert!(match_target_pattern(&replace));
    }

    #[test]
    fn forcing_does_not_nest() {
        let mut generator = SqlGenerator::new(crate::SqlVersion::Sql9);
        generator.force_non_unicode = true;
        match generator.check_if_force_non_unicode_required(&ansi_column().equal(DbExpression::constant("x"))) {
            Err(Error::NotSupported(_)) => {}
            other => panic!("expected NotSupported, got {other:?}"),
        }
    }
}
