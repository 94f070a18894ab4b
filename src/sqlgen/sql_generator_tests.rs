#[cfg(test)]
pub mod fixtures {
    use crate::{EdmProperty, EntitySet, StructuralType, TypeUsage};

    pub fn people_set() -> EntitySet {
        EntitySet::new(
            "Crm",
            "People",
            StructuralType {
                name: "Person".into(),
                properties: vec![
                    EdmProperty::new("Id", TypeUsage::int32()),
                    EdmProperty::new("Name", TypeUsage::string(Some(true))),
                    EdmProperty::new("Code", TypeUsage::string(Some(false))),
                ],
                key_members: vec!["Id".into()],
            },
        )
        .with_schema("dbo")
    }

    pub fn orders_set() -> EntitySet {
        EntitySet::new(
            "Crm",
            "Orders",
            StructuralType {
                name: "Order".into(),
                properties: vec![
                    EdmProperty::new("Id", TypeUsage::int32()),
                    EdmProperty::new("PersonId", TypeUsage::int32()),
                    EdmProperty::new("Total", TypeUsage::int32()),
                ],
                key_members: vec!["Id".into()],
            },
        )
        .with_schema("dbo")
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{orders_set, people_set};
    use crate::{
        CommandTree, DbAggregate, DbExpression, DbExpressionBinding, DbSortClause, EdmFunction, Error,
        GeneratorConfig, QueryCommandTree, SqlVersion, TypeUsage, generate_sql, group_by, inner_join,
        sqlgen::SqlGenerator,
    };

    fn people(name: &str) -> DbExpressionBinding {
        DbExpression::scan(people_set()).bind_as(name).unwrap()
    }

    fn orders(name: &str) -> DbExpressionBinding {
        DbExpression::scan(orders_set()).bind_as(name).unwrap()
    }

    fn column(binding: &DbExpressionBinding, name: &str) -> DbExpression {
        binding.variable().property(name).unwrap()
    }

    fn compile(version: SqlVersion, query: &DbExpression) -> String {
        SqlGenerator::new(version).compile(query).unwrap().render("\n").unwrap()
    }

    fn contains(target: DbExpression, search: &str) -> DbExpression {
        DbExpression::invoke(
            EdmFunction::canonical("Contains"),
            vec![target, DbExpression::constant(search)],
            TypeUsage::boolean(),
        )
    }

    #[test]
    fn filter_selects_every_column_of_the_extent() {
        let p = people("p");
        let predicate = column(&p, "Id").equal(DbExpression::constant(3));
        let sql = compile(SqlVersion::Sql10, &p.filter(predicate));
        assert_eq!(
            sql,
            "SELECT \n[p].[Id] AS [Id], \n[p].[Name] AS [Name], \n[p].[Code] AS [Code]\nFROM [dbo].[People] AS [p]\nWHERE [p].[Id] = 3"
        );
    }

    #[test]
    fn projection_over_a_filter_shares_one_statement() {
        let p = people("p");
        let filtered = p.clone().filter(column(&p, "Id").greater_than(DbExpression::constant(1)));
        let f = filtered.bind_as("f").unwrap();
        let query = f.clone().project(DbExpression::new_row(vec![("Name", column(&f, "Name"))]));
        assert_eq!(
            compile(SqlVersion::Sql9, &query),
            "SELECT \n[p].[Name] AS [Name]\nFROM [dbo].[People] AS [p]\nWHERE [p].[Id] > 1"
        );
    }

    #[test]
    fn top_over_a_sort_keeps_the_order_by() {
        let p = people("p");
        let keys = vec![DbSortClause::asc(column(&p, "Name"))];
        let query = p.sort(keys).limit(DbExpression::constant(5));

        let columns = "\n[p].[Id] AS [Id], \n[p].[Name] AS [Name], \n[p].[Code] AS [Code]";
        let tail = "\nFROM [dbo].[People] AS [p]\nORDER BY [p].[Name] ASC";
        assert_eq!(compile(SqlVersion::Sql10, &query), format!("SELECT TOP (5) {columns}{tail}"));
        assert_eq!(compile(SqlVersion::Sql8, &query), format!("SELECT TOP 5 {columns}{tail}"));
    }

    #[test]
    fn joined_columns_with_the_same_name_are_renamed() {
        let p = people("p");
        let o = orders("o");
        let condition = column(&p, "Id").equal(column(&o, "PersonId"));
        let sql = compile(SqlVersion::Sql10, &inner_join(p, o, condition));
        assert_eq!(
            sql,
            "SELECT \n[p].[Id] AS [Id1], \n[p].[Name] AS [Name], \n[p].[Code] AS [Code], \n\
             [o].[Id] AS [Id2], \n[o].[PersonId] AS [PersonId], \n[o].[Total] AS [Total]\n\
             FROM  [dbo].[People] AS [p]\nINNER JOIN [dbo].[Orders] AS [o] ON [p].[Id] = [o].[PersonId]"
        );
    }

    #[test]
    fn group_by_over_plain_columns_stays_flat() {
        let input = DbExpression::scan(people_set()).group_bind_as("p", "g").unwrap();
        let key = input.variable().property("Name").unwrap();
        let counted = input.group_variable().property("Id").unwrap();
        let count = DbAggregate::function(EdmFunction::canonical("Count"), counted, TypeUsage::int32());
        let query = group_by(input, vec![("Name", key)], vec![("Count", count)]);
        assert_eq!(
            compile(SqlVersion::Sql10, &query),
            "SELECT \n[p].[Name] AS [Name], \nCOUNT([p].[Id]) AS [Count]\nFROM [dbo].[People] AS [p]\nGROUP BY [p].[Name]"
        );
    }

    #[test]
    fn group_by_over_computed_keys_uses_an_inner_query() {
        let input = DbExpression::scan(people_set()).group_bind_as("p", "g").unwrap();
        let key = input.variable().property("Id").unwrap().plus(DbExpression::constant(1));
        let counted = input.group_variable().property("Id").unwrap();
        let count = DbAggregate::function(EdmFunction::canonical("BigCount"), counted, TypeUsage::int64());
        let query = group_by(input, vec![("K", key)], vec![("Count", count)]);
        let sql = compile(SqlVersion::Sql10, &query);
        assert!(sql.contains("].[Id] + 1 AS [K]"), "{sql}");
        assert!(sql.contains("COUNT_BIG(["), "{sql}");
        assert!(sql.contains("].[K] AS [K]"), "{sql}");
        assert!(sql.ends_with("].[K]"), "{sql}");
    }

    #[test]
    fn skip_uses_row_number_on_sql9() {
        let p = people("p");
        let query = p.clone().skip(vec![DbSortClause::asc(column(&p, "Id"))], DbExpression::constant(10));
        let sql = compile(SqlVersion::Sql9, &query);
        assert!(sql.contains("row_number() OVER (ORDER BY [p].[Id] ASC) AS [row_number]"), "{sql}");
        assert!(sql.contains("WHERE [p].[row_number] > 10"), "{sql}");
        assert!(sql.ends_with("ORDER BY [p].[Id] ASC"), "{sql}");
    }

    #[test]
    fn skip_is_emulated_on_sql8() {
        let p = people("p");
        let query = p.clone().skip(vec![DbSortClause::asc(column(&p, "Id"))], DbExpression::constant(10));
        let sql = compile(SqlVersion::Sql8, &query);
        assert!(!sql.contains("row_number"), "{sql}");
        assert!(sql.contains("TOP 10 "), "{sql}");
        assert!(sql.contains(" NOT (EXISTS ("), "{sql}");
    }

    #[test]
    fn except_is_native_from_sql9_and_emulated_on_sql8() {
        let query = DbExpression::scan(people_set()).except(DbExpression::scan(people_set()));
        let sql9 = compile(SqlVersion::Sql9, &query);
        assert!(sql9.contains("\nEXCEPT\n"), "{sql9}");

        let sql8 = compile(SqlVersion::Sql8, &query);
        assert!(!sql8.contains("EXCEPT"), "{sql8}");
        assert!(sql8.starts_with("SELECT DISTINCT "), "{sql8}");
        assert!(sql8.contains(" NOT (EXISTS ("), "{sql8}");
    }

    #[test]
    fn union_all_joins_two_statements() {
        let p = people("p");
        let q = people("q");
        let left = p.clone().project(DbExpression::new_row(vec![("Name", column(&p, "Name"))]));
        let right = q.clone().project(DbExpression::new_row(vec![("Name", column(&q, "Name"))]));
        let sql = compile(SqlVersion::Sql10, &left.union_all(right));
        assert!(sql.starts_with("SELECT \n[p].[Name] AS [Name]\nFROM [dbo].[People] AS [p]"), "{sql}");
        assert!(sql.contains("\nUNION ALL\n"), "{sql}");
        assert!(sql.ends_with("FROM [dbo].[People] AS [q]"), "{sql}");
    }

    #[test]
    fn equalities_over_one_key_become_in() {
        let p = people("p");
        let id = || column(&p, "Id");
        let disjunction = id()
            .equal(DbExpression::constant(1))
            .or(id().equal(DbExpression::constant(2)))
            .or(id().equal(DbExpression::constant(3)));
        let sql = compile(SqlVersion::Sql10, &p.clone().filter(disjunction.clone()));
        assert!(sql.ends_with("WHERE [p].[Id] IN (1,2,3)"), "{sql}");

        let with_null = disjunction.or(id().is_null());
        let sql = compile(SqlVersion::Sql10, &p.clone().filter(with_null));
        assert!(sql.ends_with("WHERE [p].[Id] IN (1,2,3) OR [p].[Id] IS NULL"), "{sql}");
    }

    #[test]
    fn contains_over_a_non_unicode_column_is_a_plain_like() {
        let p = people("p");
        let sql = compile(SqlVersion::Sql10, &p.clone().filter(contains(column(&p, "Code"), "abc")));
        assert!(sql.ends_with("WHERE [p].[Code] LIKE '%abc%'"), "{sql}");

        let sql = compile(SqlVersion::Sql10, &p.clone().filter(contains(column(&p, "Code"), "a%b")));
        assert!(sql.ends_with("WHERE [p].[Code] LIKE '%a~%b%' ESCAPE '~'"), "{sql}");

        let sql = compile(SqlVersion::Sql10, &p.clone().filter(contains(column(&p, "Name"), "abc")));
        assert!(sql.ends_with("WHERE [p].[Name] LIKE N'%abc%'"), "{sql}");
    }

    #[test]
    fn contains_outside_a_predicate_becomes_a_bit() {
        let p = people("p");
        let projection = DbExpression::new_row(vec![("HasA", contains(column(&p, "Code"), "a"))]);
        let sql = compile(SqlVersion::Sql10, &p.project(projection));
        assert!(
            sql.contains(
                "CASE WHEN ([p].[Code] LIKE '%a%') THEN cast(1 as bit) WHEN ( NOT ([p].[Code] LIKE '%a%')) THEN cast(0 as bit) END AS [HasA]"
            ),
            "{sql}"
        );
    }

    #[test]
    fn parameters_compared_only_with_non_unicode_columns_are_reported() {
        let p = people("p");
        let param = || DbExpression::parameter("code", TypeUsage::string(None));
        let compiled = SqlGenerator::new(SqlVersion::Sql10)
            .compile(&p.clone().filter(column(&p, "Code").equal(param())))
            .unwrap();
        assert_eq!(compiled.params_to_force_non_unicode, ["code"]);

        let both = column(&p, "Code").equal(param()).and(column(&p, "Name").equal(param()));
        let compiled = SqlGenerator::new(SqlVersion::Sql10).compile(&p.clone().filter(both)).unwrap();
        assert!(compiled.params_to_force_non_unicode.is_empty());
    }

    #[test]
    fn rendering_twice_gives_the_same_text() {
        let p = people("p");
        let o = orders("o");
        let condition = column(&p, "Id").equal(column(&o, "PersonId"));
        let compiled = SqlGenerator::new(SqlVersion::Sql10).compile(&inner_join(p, o, condition)).unwrap();
        let first = compiled.render("\n").unwrap();
        assert_eq!(compiled.render("\n").unwrap(), first);
        assert_eq!(compiled.render("\r\n").unwrap(), first.replace('\n', "\r\n"));
    }

    #[test]
    fn cross_apply_needs_sql9() {
        let p = people("p");
        let o = orders("x");
        let correlated = o.clone().filter(column(&o, "PersonId").equal(column(&p, "Id")));
        let query = p.cross_apply(correlated.bind_as("o").unwrap());

        let sql = compile(SqlVersion::Sql9, &query);
        assert!(sql.contains("\nCROSS APPLY "), "{sql}");

        match SqlGenerator::new(SqlVersion::Sql8).compile(&query) {
            Err(Error::NotSupported(msg)) => assert!(msg.contains("APPLY")),
            other => panic!("expected NotSupported, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let p = people("p");
        let projection = DbExpression::new_row(vec![("X", DbExpression::constant(f64::NAN))]);
        match SqlGenerator::new(SqlVersion::Sql10).compile(&p.project(projection)) {
            Err(Error::NotSupported(msg)) => assert!(msg.contains("NaN")),
            other => panic!("expected NotSupported, got {other:?}"),
        }
    }

    #[test]
    fn parameterized_top_needs_sql9() {
        let query = DbExpression::scan(people_set()).limit(DbExpression::parameter("n", TypeUsage::int64()));
        assert!(compile(SqlVersion::Sql9, &query).starts_with("SELECT TOP (@n) "));
        assert!(SqlGenerator::new(SqlVersion::Sql8).compile(&query).is_err());
    }

    #[test]
    fn inner_alias_hiding_an_outer_reference_is_renamed() {
        let p = people("p");
        let o = orders("p");
        let sorted = o.clone().sort(vec![DbSortClause::asc(column(&o, "Id"))]);
        let q = sorted.bind_as("q").unwrap();
        let correlated = column(&q, "PersonId").equal(column(&p, "Id"));
        let exists = q.any(correlated);
        let sql = compile(SqlVersion::Sql10, &p.filter(exists));

        assert!(sql.contains("FROM [dbo].[People] AS [p]\nWHERE EXISTS (SELECT "), "{sql}");
        assert!(sql.contains("FROM [dbo].[Orders] AS [p1]"), "{sql}");
        assert!(sql.contains("WHERE [p1].[PersonId] = [p].[Id]"), "{sql}");
        assert!(!sql.contains("ORDER BY"), "{sql}");
    }

    #[test]
    fn alias_collisions_ignore_case() {
        let p = people("P");
        let o = orders("p");
        let q = o.clone().sort(vec![DbSortClause::asc(column(&o, "Id"))]).bind_as("q").unwrap();
        let correlated = column(&q, "PersonId").equal(column(&p, "Id"));
        let exists = q.any(correlated);
        let sql = compile(SqlVersion::Sql9, &p.filter(exists));

        assert!(sql.contains("FROM [dbo].[People] AS [P]"), "{sql}");
        assert!(sql.contains("FROM [dbo].[Orders] AS [p1]"), "{sql}");
        assert!(sql.contains("WHERE [p1].[PersonId] = [P].[Id]"), "{sql}");
    }

    #[test]
    fn columns_of_a_wrapped_join_are_reached_through_the_derived_table() {
        let p = people("p");
        let o = orders("o");
        let condition = column(&p, "Id").equal(column(&o, "PersonId"));
        let j = inner_join(p, o, condition).bind_as("j").unwrap();
        let person_id = j.variable().property("p").unwrap().property("Id").unwrap();
        let f = j.filter(person_id.greater_than(DbExpression::constant(1))).bind_as("f").unwrap();
        let total = f.variable().property("o").unwrap().property("Total").unwrap();
        let id = f.variable().property("p").unwrap().property("Id").unwrap();
        let sql = compile(SqlVersion::Sql10, &f.filter(total.greater_than(id)));

        assert!(sql.starts_with("SELECT \n[f].[Id1], \n[f].[Name], "), "{sql}");
        assert!(sql.contains("[p].[Id] AS [Id1]"), "{sql}");
        assert!(sql.contains("[o].[Id] AS [Id2]"), "{sql}");
        assert!(sql.contains("[o].[Total] AS [Total]"), "{sql}");
        assert!(sql.contains("WHERE [p].[Id] > 1"), "{sql}");
        assert!(sql.contains("AS [f]"), "{sql}");
        assert!(sql.ends_with("WHERE [f].[Total] > [f].[Id1]"), "{sql}");
    }

    #[test]
    fn set_differences_are_emulated_on_sql8_end_to_end() {
        let generate = |query: DbExpression, config: GeneratorConfig| {
            generate_sql(&CommandTree::Query(QueryCommandTree { query }), &config).unwrap().command_text
        };
        let scan = || DbExpression::scan(people_set());

        let native = generate(scan().intersect(scan()), GeneratorConfig::sql10());
        assert!(native.contains("\nINTERSECT\n"), "{native}");

        let intersect = generate(scan().intersect(scan()), GeneratorConfig::sql8());
        assert!(!intersect.contains("INTERSECT"), "{intersect}");
        assert!(intersect.starts_with("SELECT DISTINCT "), "{intersect}");
        assert!(intersect.contains("FROM [dbo].[People] AS [Var_0]"), "{intersect}");
        assert!(intersect.contains("WHERE EXISTS (SELECT "), "{intersect}");
        assert!(!intersect.contains("NOT (EXISTS"), "{intersect}");
        assert!(intersect.contains("[Var_0].[Id] = [Var_1].[Id]"), "{intersect}");
        assert!(intersect.contains("[Var_1].[Code] IS NULL"), "{intersect}");

        let except = generate(scan().except(scan()), GeneratorConfig::sql8());
        assert!(!except.contains("EXCEPT"), "{except}");
        assert!(except.starts_with("SELECT DISTINCT "), "{except}");
        assert!(except.contains(" NOT (EXISTS (SELECT "), "{except}");
        assert!(except.contains("[Var_0].[Name] = [Var_1].[Name]"), "{except}");
    }

    #[test]
    fn free_variable_references_are_invalid() {
        let p = people("p");
        let bare = p.clone().filter(p.variable().is_null());
        match SqlGenerator::new(SqlVersion::Sql10).compile(&bare) {
            Err(Error::InvalidOperation(msg)) => assert!(msg.contains("variable")),
            other => panic!("expected InvalidOperation, got {other:?}"),
        }

        let unbound = DbExpression::variable("z", people_set().element_type_usage()).property("Id").unwrap();
        let query = p.clone().filter(unbound.equal(DbExpression::constant(1)));
        match SqlGenerator::new(SqlVersion::Sql10).compile(&query) {
            Err(Error::InvalidOperation(msg)) => assert!(msg.contains("'z'")),
            other => panic!("expected InvalidOperation, got {other:?}"),
        }
    }
}
