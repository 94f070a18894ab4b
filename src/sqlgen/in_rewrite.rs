use tracing::debug;

use crate::{
    ComparisonKind, DbExpression, PrimitiveTypeKind, Result,
    sqlgen::{
        SqlBuilder, SqlFragment, SqlGenerator,
        non_unicode::{match_source_pattern, match_target_pattern},
    },
};

/// Values compared with each key of a disjunction, keys in first-seen order.
#[derive(Default)]
struct KeyToValues<'e> {
    entries: Vec<(&'e DbExpression, Vec<&'e DbExpression>)>,
}

impl<'e> KeyToValues<'e> {
    fn add(&mut self, key: &'e DbExpression, value: &'e DbExpression) {
        match self.entries.iter_mut().find(|(k, _)| same_key(k, key)) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }
}

/// Keys match structurally: the same property chain, parameter or variable,
/// or the same cast over a matching key.
fn same_key(x: &DbExpression, y: &DbExpression) -> bool {
    match (x, y) {
        (
            DbExpression::Property { instance: a, property: p },
            DbExpression::Property { instance: b, property: q },
        ) => p == q && same_key(a, b),
        (DbExpression::ParameterReference { name: a, .. }, DbExpression::ParameterReference { name: b, .. }) => a == b,
        (DbExpression::VariableReference { name: a, .. }, DbExpression::VariableReference { name: b, .. }) => a == b,
        (
            DbExpression::Cast { argument: a, result_type: s },
            DbExpression::Cast { argument: b, result_type: t },
        ) => s == t && same_key(a, b),
        _ => false,
    }
}

fn is_key_for_in(e: &DbExpression) -> bool {
    matches!(
        e,
        DbExpression::Property { .. } | DbExpression::VariableReference { .. } | DbExpression::ParameterReference { .. }
    )
}

/// Collects `key = value` and `key IS NULL` terms. Fails as soon as one
/// disjunct has another shape.
fn build_map<'e>(e: &'e DbExpression, map: &mut KeyToValues<'e>) -> bool {
    match e {
        DbExpression::Comparison { kind: ComparisonKind::Equals, left, right } => {
            if is_key_for_in(left) {
                map.add(left, right);
                true
            } else if is_key_for_in(right) {
                map.add(right, left);
                true
            } else {
                false
            }
        }
        DbExpression::IsNull { argument } if is_key_for_in(argument) => {
            map.add(argument, e);
            true
        }
        DbExpression::Or { left, right } => build_map(left, map) && build_map(right, map),
        _ => false,
    }
}

impl SqlGenerator {
    /// Writes a disjunction of equalities over the same keys as
    /// `key IN (v1,v2)` terms, with `OR key IS NULL` kept apart.
    pub(super) fn try_translate_into_in(&mut self, e: &DbExpression) -> Result<Option<SqlFragment>> {
        let mut map = KeyToValues::default();
        if !build_map(e, &mut map) || map.entries.is_empty() {
            return Ok(None);
        }
        debug!(target: "tsqlgen::sqlgen", keys = map.entries.len(), "rewrote OR of equalities into IN");

        let mut result = SqlBuilder::new();
        for (i, (key, values)) in map.entries.iter().enumerate() {
            if i > 0 {
                result.append(" OR ");
            }
            let real_values: Vec<&DbExpression> =
                values.iter().copied().filter(|v| !matches!(v, DbExpression::IsNull { .. })).collect();

            let key_type = key.result_type();
            let (force_on_values, force_on_key) = if key_type.is_primitive_kind(PrimitiveTypeKind::String) {
                let on_values = match_source_pattern(key);
                let on_key = !on_values
                    && match_target_pattern(key)
                    && real_values.iter().all(|v| match_source_pattern(v));
                (on_values, on_key)
            } else {
                (false, false)
            };

            if !real_values.is_empty() {
                self.forcing_non_unicode(force_on_key, |g| g.parenthesize_if_needed(key, &mut result))?;
                result.append(if real_values.len() == 1 { " = " } else { " IN (" });
                for (j, value) in real_values.iter().enumerate() {
                    if j > 0 {
                        result.append(",");
                    }
                    let same_type = key_type.same_edm_type(&value.result_type());
                    let force = force_on_values && match_target_pattern(value);
                    self.forcing_non_unicode(force, |g| g.append_without_redundant_cast(value, same_type, &mut result))?;
                }
                if real_values.len() > 1 {
                    result.append(")");
                }
            }

            if let Some(DbExpression::IsNull { argument }) =
                values.iter().find(|v| matches!(v, DbExpression::IsNull { .. }))
            {
                if !real_values.is_empty() {
                    result.append(" OR ");
                }
                result.append(self.visit_is_null(argument, false)?);
            }
        }
        Ok(Some(result.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EdmProperty, TypeUsage};

    fn column(name: &str) -> DbExpression {
        DbExpression::Property {
            instance: Box::new(DbExpression::variable("p", TypeUsage::row(vec![]))),
            property: EdmProperty::new(name, TypeUsage::int32()),
        }
    }

    #[test]
    fn keys_are_grouped_structurally() {
        let e = column("Id")
            .equal(DbExpression::constant(1))
            .or(DbExpression::constant(2).equal(column("Id")))
            .or(column("Age").is_null());
        let mut map = KeyToValues::default();
        assert!(build_map(&e, &mut map));
        assert_eq!(map.entries.len(), 2);
        assert_eq!(map.entries[0].1.len(), 2);
    }

    #[test]
    fn other_disjuncts_prevent_the_rewrite() {
        let e = column("Id").equal(DbExpression::constant(1)).or(column("Id").greater_than(DbExpression::constant(5)));
        let mut map = KeyToValues::default();
        assert!(!build_map(&e, &mut map));
    }

    #[test]
    fn different_instances_are_different_keys() {
        let other = DbExpression::Property {
            instance: Box::new(DbExpression::variable("q", TypeUsage::row(vec![]))),
            property: EdmProperty::new("Id", TypeUsage::int32()),
        };
        assert!(same_key(&column("Id"), &column("Id")));
        assert!(!same_key(&column("Id"), &other));
    }
}
