use crate::{DbExpression, Error, Result, SetOpKind};

/// Walks a query tree looking for constructs SQL Server 2000 has no syntax for.
pub struct Sql8ConformanceChecker;

impl Sql8ConformanceChecker {
    /// True when the tree holds an EXCEPT, INTERSECT or SKIP that has to be
    /// rewritten before generation. Every child is visited, so an unsupported
    /// construct anywhere below is reported even under a node that needs a rewrite.
    pub fn needs_rewrite(e: &DbExpression) -> Result<bool> {
        let own = match e {
            DbExpression::SetOp { kind: SetOpKind::Except | SetOpKind::Intersect, .. } => true,
            DbExpression::Skip { count, .. } => {
                reject_parameter_count(count, "SKIP")?;
                true
            }
            DbExpression::Limit { limit, .. } => {
                reject_parameter_count(limit, "TOP")?;
                false
            }
            DbExpression::Apply { .. } => {
                return Err(Error::not_supported("APPLY is not supported on SQL Server 2000"));
            }
            _ => false,
        };

        let mut children = false;
        for child in e.children() {
            children |= Self::needs_rewrite(child)?;
        }
        Ok(own || children)
    }
}

fn reject_parameter_count(count: &DbExpression, operator: &str) -> Result<()> {
    match count {
        DbExpression::ParameterReference { name, .. } => Err(Error::not_supported(format!(
            "{operator} with parameter @{name} as its count is not supported on SQL Server 2000"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DbSortClause, EdmProperty, EntitySet, StructuralType, TypeUsage};

    fn people_set() -> EntitySet {
        EntitySet::new(
            "Crm",
            "People",
            StructuralType {
                name: "Person".into(),
                properties: vec![
                    EdmProperty::new("Id", TypeUsage::int32()),
                    EdmProperty::new("Name", TypeUsage::string(Some(true))),
                ],
                key_members: vec!["Id".into()],
            },
        )
    }

    fn sorted_by_id(binding_name: &str) -> (crate::DbExpressionBinding, Vec<DbSortClause>) {
        let binding = DbExpression::scan(people_set()).bind_as(binding_name).unwrap();
        let key = binding.variable().property("Id").unwrap();
        (binding, vec![DbSortClause::asc(key)])
    }

    #[test]
    fn plain_queries_need_no_rewrite() {
        let p = DbExpression::scan(people_set()).bind_as("p").unwrap();
        let pred = p.variable().property("Id").unwrap().equal(DbExpression::constant(3));
        let q = p.filter(pred).limit(DbExpression::constant(10));
        assert!(!Sql8ConformanceChecker::needs_rewrite(&q).unwrap());
    }

    #[test]
    fn set_difference_and_skip_need_a_rewrite() {
        let except = DbExpression::scan(people_set()).except(DbExpression::scan(people_set()));
        assert!(Sql8ConformanceChecker::needs_rewrite(&except).unwrap());

        let (binding, keys) = sorted_by_id("p");
        let skip = binding.skip(keys, DbExpression::constant(5));
        // Nested under a projection the flag still bubbles up.
        let outer = skip
            .bind_as("s")
            .unwrap()
            .project(DbExpression::new_row(vec![("X", DbExpression::constant(1))]));
        assert!(Sql8ConformanceChecker::needs_rewrite(&outer).unwrap());

        let union = DbExpression::scan(people_set()).union_all(DbExpression::scan(people_set()));
        assert!(!Sql8ConformanceChecker::needs_rewrite(&union).unwrap());
    }

    #[test]
    fn apply_is_rejected() {
        let p = DbExpression::scan(people_set()).bind_as("p").unwrap();
        let q = DbExpression::scan(people_set()).bind_as("q").unwrap();
        match Sql8ConformanceChecker::needs_rewrite(&p.cross_apply(q)) {
            Err(Error::NotSupported(msg)) => assert!(msg.contains("APPLY")),
            other => panic!("expected NotSupported, got {other:?}"),
        }
    }

    #[test]
    fn parameter_counts_are_rejected_below_a_rewrite() {
        let (binding, keys) = sorted_by_id("p");
        let skip = binding.skip(keys, DbExpression::parameter("n", TypeUsage::int64()));
        let except = skip.except(DbExpression::scan(people_set()));
        match Sql8ConformanceChecker::needs_rewrite(&except) {
            Err(Error::NotSupported(msg)) => assert!(msg.contains("@n")),
            other => panic!("expected NotSupported, got {other:?}"),
        }

        let top = DbExpression::scan(people_set()).limit(DbExpression::parameter("n", TypeUsage::int64()));
        assert!(Sql8ConformanceChecker::needs_rewrite(&top).is_err());
    }
}
