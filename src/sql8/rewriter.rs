use std::collections::HashMap;

use tracing::debug;

use crate::{DbExpression, DbExpressionBinding, DbSortClause, Error, Result, SetOpKind};

/// Rewrites EXCEPT, INTERSECT and SKIP into filters over correlated
/// EXISTS subqueries, which SQL Server 2000 can run.
pub struct Sql8Rewriter {
    next_variable: usize,
}

enum Emulation<'a> {
    Except,
    Intersect,
    /// The input minus its first rows, compared on the sort key columns only.
    Skip { sort_order: &'a [DbSortClause], variable_name: &'a str },
}

impl Sql8Rewriter {
    pub fn rewrite(e: &DbExpression) -> Result<DbExpression> {
        let mut rewriter = Self { next_variable: 0 };
        let rewritten = rewriter.visit(e)?;
        debug!(
            target: "tsqlgen::sql8",
            bindings = rewriter.next_variable,
            "rewrote EXCEPT/INTERSECT/SKIP for SQL Server 2000"
        );
        Ok(rewritten)
    }

    fn next_variable_name(&mut self) -> String {
        let name = format!("Var_{}", self.next_variable);
        self.next_variable += 1;
        name
    }

    fn visit(&mut self, e: &DbExpression) -> Result<DbExpression> {
        let e = e.map_children(&mut |child| self.visit(child))?;
        match e {
            DbExpression::SetOp { kind: SetOpKind::Except, left, right } => {
                self.transform_intersect_or_except(*left, *right, Emulation::Except)
            }
            DbExpression::SetOp { kind: SetOpKind::Intersect, left, right } => {
                self.transform_intersect_or_except(*left, *right, Emulation::Intersect)
            }
            DbExpression::Skip { input, sort_order, count } => self.transform_skip(input, sort_order, *count),
            other => Ok(other),
        }
    }

    /// `SKIP(input, keys, n)` becomes the rows of `input` with no match among
    /// `TOP n` of the sorted input, bound under the original name and sorted again.
    fn transform_skip(
        &mut self,
        input: DbExpressionBinding,
        sort_order: Vec<DbSortClause>,
        count: DbExpression,
    ) -> Result<DbExpression> {
        let limited = input.clone().sort(sort_order.clone()).limit(count);
        let left = (*input.expression).clone();
        let except = self.transform_intersect_or_except(
            left,
            limited,
            Emulation::Skip { sort_order: &sort_order, variable_name: &input.variable_name },
        )?;
        Ok(except.bind_as(&input.variable_name)?.sort(sort_order))
    }

    fn transform_intersect_or_except(
        &mut self,
        left: DbExpression,
        right: DbExpression,
        emulation: Emulation<'_>,
    ) -> Result<DbExpression> {
        let negate = !matches!(emulation, Emulation::Intersect);
        let distinct = !matches!(emulation, Emulation::Skip { .. });

        let left_binding = left.bind_as(&self.next_variable_name())?;
        let mut right_binding = right.bind_as(&self.next_variable_name())?;

        let mut left_properties = Vec::new();
        let mut right_properties = Vec::new();
        flatten_properties(left_binding.variable(), &mut left_properties)?;
        flatten_properties(right_binding.variable(), &mut right_properties)?;

        if let Emulation::Skip { sort_order, variable_name } = emulation {
            let removed = remove_non_sort_properties(
                &mut left_properties,
                &mut right_properties,
                sort_order,
                &left_binding.variable_name,
                variable_name,
            );
            if removed {
                (right_binding, right_properties) = self.cap_with_project(right_binding, right_properties)?;
            }
        }

        if left_properties.is_empty() || left_properties.len() != right_properties.len() {
            return Err(Error::not_supported(
                "set operations are only emulated over rows of primitive columns on SQL Server 2000",
            ));
        }

        let conditions = left_properties
            .into_iter()
            .zip(right_properties)
            .map(|(l, r)| l.clone().equal(r.clone()).or(l.is_null().and(r.is_null())))
            .collect();
        let Some(condition) = balanced_and(conditions) else {
            return Err(Error::invalid_operation("empty row comparison"));
        };

        let mut exists = right_binding.any(condition);
        if negate {
            exists = exists.not();
        }
        let result = left_binding.filter(exists);
        Ok(if distinct { result.distinct() } else { result })
    }

    /// Projects `binding` down to `properties`, suffixing clashing column names,
    /// and returns the new binding with the properties re-rooted on it.
    fn cap_with_project(
        &mut self,
        binding: DbExpressionBinding,
        properties: Vec<DbExpression>,
    ) -> Result<(DbExpressionBinding, Vec<DbExpression>)> {
        let mut used: HashMap<String, u32> = HashMap::with_capacity(properties.len());
        let mut names = Vec::with_capacity(properties.len());
        for p in &properties {
            let DbExpression::Property { property, .. } = p else {
                return Err(Error::invalid_operation("flattened column is not a property"));
            };
            let mut name = property.name.clone();
            if let Some(&last) = used.get(&name) {
                let mut suffix = last;
                let renamed = loop {
                    suffix += 1;
                    let candidate = format!("{name}{suffix}");
                    if !used.contains_key(&candidate) {
                        break candidate;
                    }
                };
                used.insert(name, suffix);
                name = renamed;
            }
            used.insert(name.clone(), 0);
            names.push(name);
        }

        let row = DbExpression::new_row(names.iter().map(String::as_str).zip(properties).collect());
        let capped = binding.project(row).bind_as(&self.next_variable_name())?;
        let variable = capped.variable();
        let properties = names
            .iter()
            .map(|name| variable.clone().property(name))
            .collect::<Result<Vec<_>>>()?;
        Ok((capped, properties))
    }
}

/// Every primitive property reachable from `input`, depth first.
fn flatten_properties(input: DbExpression, out: &mut Vec<DbExpression>) -> Result<()> {
    let ty = input.result_type();
    for property in ty.properties() {
        let access = input.clone().property(&property.name)?;
        if property.type_usage.is_primitive() {
            out.push(access);
        } else {
            flatten_properties(access, out)?;
        }
    }
    Ok(())
}

/// Drops the pairs whose left column is not a sort key; returns whether any went.
fn remove_non_sort_properties(
    left: &mut Vec<DbExpression>,
    right: &mut Vec<DbExpression>,
    sort_order: &[DbSortClause],
    left_variable: &str,
    sort_variable: &str,
) -> bool {
    let mut removed = false;
    for i in (0..left.len()).rev() {
        let is_key = sort_order
            .iter()
            .any(|clause| are_matching(&left[i], &clause.expression, left_variable, sort_variable));
        if !is_key {
            left.remove(i);
            right.remove(i);
            removed = true;
        }
    }
    removed
}

/// Same property chain rooted at the two given variables.
fn are_matching(left: &DbExpression, right: &DbExpression, left_variable: &str, right_variable: &str) -> bool {
    match (left, right) {
        (
            DbExpression::Property { instance: left_instance, property: left_property },
            DbExpression::Property { instance: right_instance, property: right_property },
        ) => {
            left_property.name == right_property.name
                && are_matching(left_instance, right_instance, left_variable, right_variable)
        }
        (
            DbExpression::VariableReference { name: left_name, .. },
            DbExpression::VariableReference { name: right_name, .. },
        ) => left_name == left_variable && right_name == right_variable,
        _ => false,
    }
}

fn balanced_and(mut conditions: Vec<DbExpression>) -> Option<DbExpression> {
    match conditions.len() {
        0 => None,
        1 => conditions.pop(),
        n => {
            let right = conditions.split_off(n / 2);
            Some(balanced_and(conditions)?.and(balanced_and(right)?))
        }
    }
}
