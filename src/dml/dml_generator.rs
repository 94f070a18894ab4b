use std::collections::HashSet;

use tracing::debug;

use crate::{
    DbExpression, DbExpressionBinding, DeleteCommandTree, EntitySet, Error, GeneratorConfig, InsertCommandTree,
    Result, SqlVersion, StoreType, TypeUsage, UpdateCommandTree,
    dml::{ExpressionTranslator, ParameterDescriptor},
    sql_type_name,
    sqlgen::quote_identifier,
};

const DUMMY_SET_PARAMETER: &str = "@p";
const GENERATED_KEYS: &str = "@generated_keys";

/// Text and parameters of one INSERT, UPDATE or DELETE batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DmlCommand {
    pub command_text: String,
    pub parameters: Vec<ParameterDescriptor>,
}

fn target_set(target: &DbExpressionBinding) -> Result<&EntitySet> {
    match target.expression.as_ref() {
        DbExpression::Scan { target } => Ok(target),
        other => Err(Error::invalid_operation(format!(
            "the target of a modification must be a table scan, got {:?}",
            other.kind()
        ))),
    }
}

/// Whether `ty` can be an IDENTITY column, so its value reads back through `scope_identity()`.
fn is_valid_scope_identity_type(version: SqlVersion, ty: &TypeUsage) -> Result<bool> {
    Ok(StoreType::for_type(version, ty)?.is_valid_identity_type())
}

/// Column type of the `@generated_keys` table variable.
fn variable_type(version: SqlVersion, ty: &TypeUsage) -> Result<String> {
    let name = sql_type_name(version, ty)?;
    // A rowversion value cannot be inserted into another rowversion column.
    Ok(match name.as_str() {
        "rowversion" | "timestamp" => "binary(8)".to_string(),
        _ => name,
    })
}

/// Server generated keys are read back through OUTPUT on 2005 and later
/// when `scope_identity()` cannot produce them.
fn use_generated_keys_variable(tree: &InsertCommandTree, table: &EntitySet, version: SqlVersion) -> Result<bool> {
    if version == SqlVersion::Sql8 || tree.returning.is_none() {
        return Ok(false);
    }
    let assigned: HashSet<&str> = tree
        .set_clauses
        .iter()
        .filter_map(|clause| match &clause.property {
            DbExpression::Property { property, .. } => Some(property.name.as_str()),
            _ => None,
        })
        .collect();

    let mut first_key_found = false;
    for key in table.element_type.keys() {
        if assigned.contains(key.name.as_str()) {
            continue;
        }
        if first_key_found || !is_valid_scope_identity_type(version, &key.type_usage)? {
            return Ok(true);
        }
        first_key_found = true;
    }
    Ok(false)
}

pub fn generate_insert_sql(tree: &InsertCommandTree, config: &GeneratorConfig) -> Result<DmlCommand> {
    let version = config.version;
    let table = target_set(&tree.target)?;
    let mut translator = ExpressionTranslator::new(
        config.version,
        config.line_terminator.as_str(),
        "InsertFunction",
        tree.returning.is_some(),
    );
    let use_generated_keys = use_generated_keys_variable(tree, table, version)?;

    if use_generated_keys {
        translator.append("declare ").append(GENERATED_KEYS).append(" table(");
        for (i, key) in table.element_type.keys().enumerate() {
            if i > 0 {
                translator.append(", ");
            }
            translator
                .append(&quote_identifier(&key.name))
                .append(" ")
                .append(&variable_type(version, &key.type_usage)?);
            if let Some(collation) = key.type_usage.facets.collation.as_deref().filter(|c| !c.is_empty()) {
                translator.append(" collate ").append(collation);
            }
        }
        translator.append(")").append_line();
    }

    translator.append("insert ");
    translator.visit(&tree.target.expression)?;
    if tree.set_clauses.is_empty() {
        translator.append_line();
    } else {
        translator.append("(");
        for (i, clause) in tree.set_clauses.iter().enumerate() {
            if i > 0 {
                translator.append(", ");
            }
            translator.visit(&clause.property)?;
        }
        translator.append(")").append_line();
    }

    if use_generated_keys {
        translator.append("output ");
        for (i, key) in table.element_type.keys().enumerate() {
            if i > 0 {
                translator.append(", ");
            }
            translator.append("inserted.").append(&quote_identifier(&key.name));
        }
        translator.append(" into ").append(GENERATED_KEYS).append_line();
    }

    if tree.set_clauses.is_empty() {
        translator.append("default values").append_line();
    } else {
        translator.append("values (");
        for (i, clause) in tree.set_clauses.iter().enumerate() {
            if i > 0 {
                translator.append(", ");
            }
            translator.visit(&clause.value)?;
            translator.register_member_value(&clause.property, &clause.value)?;
        }
        translator.append(")").append_line();
    }

    generate_returning_sql(&mut translator, &tree.target, table, tree.returning.as_ref(), use_generated_keys, version)?;

    debug!(
        target: "tsqlgen::dml",
        table = %table.name,
        parameters = translator.parameter_count(),
        generated_keys = use_generated_keys,
        "generated INSERT"
    );
    Ok(translator.finish())
}

pub fn generate_update_sql(tree: &UpdateCommandTree, config: &GeneratorConfig) -> Result<DmlCommand> {
    let table = target_set(&tree.target)?;
    let mut translator = ExpressionTranslator::new(
        config.version,
        config.line_terminator.as_str(),
        "UpdateFunction",
        tree.returning.is_some(),
    );

    if tree.set_clauses.is_empty() {
        translator.append("declare ").append(DUMMY_SET_PARAMETER).append(" int").append_line();
    }

    translator.append("update ");
    translator.visit(&tree.target.expression)?;
    translator.append_line();

    translator.append("set ");
    if tree.set_clauses.is_empty() {
        // Still takes the row locks and recomputes server generated columns.
        translator.append(DUMMY_SET_PARAMETER).append(" = 0");
    }
    for (i, clause) in tree.set_clauses.iter().enumerate() {
        if i > 0 {
            translator.append(", ");
        }
        translator.visit(&clause.property)?;
        translator.append(" = ");
        translator.visit(&clause.value)?;
    }
    translator.append_line();

    translator.append("where ");
    translator.visit(&tree.predicate)?;
    translator.append_line();

    generate_returning_sql(&mut translator, &tree.target, table, tree.returning.as_ref(), false, config.version)?;

    debug!(
        target: "tsqlgen::dml",
        table = %table.name,
        parameters = translator.parameter_count(),
        "generated UPDATE"
    );
    Ok(translator.finish())
}

pub fn generate_delete_sql(tree: &DeleteCommandTree, config: &GeneratorConfig) -> Result<DmlCommand> {
    let table = target_set(&tree.target)?;
    let mut translator =
        ExpressionTranslator::new(config.version, config.line_terminator.as_str(), "DeleteFunction", false);

    translator.append("delete ");
    translator.visit(&tree.target.expression)?;
    translator.append_line();
    translator.append("where ");
    translator.visit(&tree.predicate)?;

    debug!(
        target: "tsqlgen::dml",
        table = %table.name,
        parameters = translator.parameter_count(),
        "generated DELETE"
    );
    Ok(translator.finish())
}

/// SELECT reading the server generated columns back from the modified row.
fn generate_returning_sql(
    translator: &mut ExpressionTranslator<'_>,
    target: &DbExpressionBinding,
    table: &EntitySet,
    returning: Option<&DbExpression>,
    use_generated_keys: bool,
    version: SqlVersion,
) -> Result<()> {
    let Some(returning) = returning else {
        return Ok(());
    };

    translator.append("select ");
    if use_generated_keys {
        translator.property_alias = Some("t");
    }
    let visited = translator.visit(returning);
    translator.property_alias = None;
    visited?;
    translator.append_line();

    if use_generated_keys {
        translator.append("from ").append(GENERATED_KEYS).append(" as g join ");
        translator.visit(&target.expression)?;
        translator.append(" as t on ");
        for (i, key) in table.element_type.keys().enumerate() {
            if i > 0 {
                translator.append(" and ");
            }
            let column = quote_identifier(&key.name);
            translator.append("g.").append(&column).append(" = t.").append(&column);
        }
        translator.append_line();
        translator.append("where @@ROWCOUNT > 0");
        return Ok(());
    }

    translator.append("from ");
    translator.visit(&target.expression)?;
    translator.append_line();
    translator.append("where @@ROWCOUNT > 0");

    let mut identity = false;
    for key in table.element_type.keys() {
        translator.append(" and ").append(&quote_identifier(&key.name)).append(" = ");
        match translator.member_value(&key.name).map(str::to_owned) {
            Some(parameter) => {
                translator.append(&parameter);
            }
            None => {
                if identity {
                    return Err(Error::not_supported(format!(
                        "table {} has more than one server generated key",
                        table.name
                    )));
                }
                if !is_valid_scope_identity_type(version, &key.type_usage)? {
                    return Err(Error::invalid_operation(format!(
                        "server generated key {} of type {} cannot be read back with scope_identity()",
                        key.name, key.type_usage
                    )));
                }
                translator.append("scope_identity()");
                identity = true;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConstantValue, DbSetClause, EdmFunction, EdmProperty, PrimitiveTypeKind, StructuralType};

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
        .with_schema("dbo")
    }

    fn order_lines_set(key_type: TypeUsage) -> EntitySet {
        EntitySet::new(
            "Crm",
            "OrderLines",
            StructuralType {
                name: "OrderLine".into(),
                properties: vec![
                    EdmProperty::new("OrderId", key_type.clone()),
                    EdmProperty::new("Line", key_type),
                    EdmProperty::new("Qty", TypeUsage::int32()),
                ],
                key_members: vec!["OrderId".into(), "Line".into()],
            },
        )
        .with_schema("dbo")
    }

    fn target(set: EntitySet) -> DbExpressionBinding {
        DbExpression::scan(set).bind_as("target").unwrap()
    }

    fn column(target: &DbExpressionBinding, name: &str) -> DbExpression {
        target.variable().property(name).unwrap()
    }

    fn returning(target: &DbExpressionBinding, names: &[&str]) -> DbExpression {
        DbExpression::new_row(names.iter().map(|&n| (n, column(target, n))).collect())
    }

    #[test]
    fn insert_reads_an_identity_key_back_with_scope_identity() {
        let t = target(people_set());
        let tree = InsertCommandTree {
            set_clauses: vec![DbSetClause::new(column(&t, "Name"), DbExpression::constant("Ann"))],
            returning: Some(returning(&t, &["Id"])),
            target: t,
        };
        let command = generate_insert_sql(&tree, &GeneratorConfig::sql8()).unwrap();
        assert_eq!(
            command.command_text,
            "insert [dbo].[People]([Name])\nvalues (@0)\nselect [Id]\nfrom [dbo].[People]\nwhere @@ROWCOUNT > 0 and [Id] = scope_identity()"
        );
        assert_eq!(command.parameters.len(), 1);
        assert_eq!(command.parameters[0].value, ConstantValue::from("Ann"));
    }

    #[test]
    fn insert_with_assigned_key_selects_by_its_parameter() {
        let t = target(people_set());
        let tree = InsertCommandTree {
            set_clauses: vec![
                DbSetClause::new(column(&t, "Id"), DbExpression::constant(5)),
                DbSetClause::new(column(&t, "Name"), DbExpression::null(TypeUsage::string(Some(true)))),
            ],
            returning: Some(returning(&t, &["Name"])),
            target: t,
        };
        let command = generate_insert_sql(&tree, &GeneratorConfig::sql10()).unwrap();
        assert!(command.command_text.starts_with("insert [dbo].[People]([Id], [Name])\nvalues (@0, null)\n"));
        assert!(command.command_text.ends_with("where @@ROWCOUNT > 0 and [Id] = @0"));
    }

    #[test]
    fn insert_without_values_uses_default_values() {
        let tree = InsertCommandTree { target: target(people_set()), set_clauses: vec![], returning: None };
        let command = generate_insert_sql(&tree, &GeneratorConfig::sql9()).unwrap();
        assert_eq!(command.command_text, "insert [dbo].[People]\ndefault values\n");
    }

    #[test]
    fn two_server_generated_keys_fail_on_sql8() {
        let t = target(order_lines_set(TypeUsage::int32()));
        let tree = InsertCommandTree {
            set_clauses: vec![DbSetClause::new(column(&t, "Qty"), DbExpression::constant(1))],
            returning: Some(returning(&t, &["OrderId", "Line"])),
            target: t,
        };
        match generate_insert_sql(&tree, &GeneratorConfig::sql8()) {
            Err(Error::NotSupported(msg)) => assert!(msg.contains("OrderLines")),
            other => panic!("expected NotSupported, got {other:?}"),
        }
    }

    #[test]
    fn generated_keys_go_through_output_on_sql9() {
        let t = target(order_lines_set(TypeUsage::int32()));
        let tree = InsertCommandTree {
            set_clauses: vec![DbSetClause::new(column(&t, "Qty"), DbExpression::constant(1))],
            returning: Some(returning(&t, &["OrderId", "Line"])),
            target: t,
        };
        let command = generate_insert_sql(&tree, &GeneratorConfig::sql9()).unwrap();
        assert_eq!(
            command.command_text,
            "declare @generated_keys table([OrderId] int, [Line] int)\n\
             insert [dbo].[OrderLines]([Qty])\n\
             output inserted.[OrderId], inserted.[Line] into @generated_keys\n\
             values (@0)\n\
             select t.[OrderId], t.[Line]\n\
             from @generated_keys as g join [dbo].[OrderLines] as t on g.[OrderId] = t.[OrderId] and g.[Line] = t.[Line]\n\
             where @@ROWCOUNT > 0"
        );
    }

    #[test]
    fn non_integer_identity_keys_cannot_use_scope_identity() {
        let guid = TypeUsage::primitive(PrimitiveTypeKind::Guid);
        let set = EntitySet::new(
            "Crm",
            "Tokens",
            StructuralType {
                name: "Token".into(),
                properties: vec![EdmProperty::new("Id", guid), EdmProperty::new("Label", TypeUsage::string(None))],
                key_members: vec!["Id".into()],
            },
        );
        let t = target(set);
        let tree = InsertCommandTree {
            set_clauses: vec![DbSetClause::new(column(&t, "Label"), DbExpression::constant("a"))],
            returning: Some(returning(&t, &["Id"])),
            target: t,
        };
        match generate_insert_sql(&tree, &GeneratorConfig::sql8()) {
            Err(Error::InvalidOperation(msg)) => assert!(msg.contains("Id")),
            other => panic!("expected InvalidOperation, got {other:?}"),
        }
        let command = generate_insert_sql(&tree, &GeneratorConfig::sql10()).unwrap();
        assert!(command.command_text.starts_with("declare @generated_keys table([Id] uniqueidentifier)\n"));
    }

    #[test]
    fn update_without_set_clauses_assigns_a_dummy_variable() {
        let t = target(people_set());
        let tree = UpdateCommandTree {
            set_clauses: vec![],
            predicate: column(&t, "Id").equal(DbExpression::constant(3)),
            returning: None,
            target: t,
        };
        let command = generate_update_sql(&tree, &GeneratorConfig::sql9()).unwrap();
        assert_eq!(command.command_text, "declare @p int\nupdate [dbo].[People]\nset @p = 0\nwhere ([Id] = @0)\n");
    }

    #[test]
    fn update_returning_finds_the_row_by_its_key_parameter() {
        let t = target(people_set());
        let tree = UpdateCommandTree {
            set_clauses: vec![DbSetClause::new(column(&t, "Name"), DbExpression::constant("Bo"))],
            predicate: column(&t, "Id").equal(DbExpression::constant(3)),
            returning: Some(returning(&t, &["Name"])),
            target: t,
        };
        let command = generate_update_sql(&tree, &GeneratorConfig::sql10()).unwrap();
        assert_eq!(
            command.command_text,
            "update [dbo].[People]\nset [Name] = @0\nwhere ([Id] = @1)\nselect [Name]\nfrom [dbo].[People]\nwhere @@ROWCOUNT > 0 and [Id] = @1"
        );
        assert_eq!(command.parameters[1].value, ConstantValue::from(3));
    }

    #[test]
    fn update_values_can_call_functions() {
        let t = target(people_set());
        let upper = DbExpression::invoke(
            EdmFunction::canonical("ToUpper"),
            vec![DbExpression::constant("ann")],
            TypeUsage::string(Some(true)),
        );
        let tree = UpdateCommandTree {
            set_clauses: vec![DbSetClause::new(column(&t, "Name"), upper)],
            predicate: column(&t, "Id").equal(DbExpression::constant(3)),
            returning: None,
            target: t,
        };
        let command = generate_update_sql(&tree, &GeneratorConfig::sql10()).unwrap();
        assert_eq!(command.command_text, "update [dbo].[People]\nset [Name] = UPPER(@0)\nwhere ([Id] = @1)\n");
        assert_eq!(command.parameters[0].value, ConstantValue::from("ann"));
        assert_eq!(command.parameters[1].value, ConstantValue::from(3));
    }

    #[test]
    fn function_arguments_can_read_the_target_row() {
        let t = target(people_set());
        let trimmed = DbExpression::invoke(
            EdmFunction::canonical("Trim"),
            vec![column(&t, "Name")],
            TypeUsage::string(Some(true)),
        );
        let tree = UpdateCommandTree {
            set_clauses: vec![DbSetClause::new(column(&t, "Name"), trimmed)],
            predicate: column(&t, "Id").equal(DbExpression::constant(3)),
            returning: None,
            target: t,
        };
        let command = generate_update_sql(&tree, &GeneratorConfig::sql8()).unwrap();
        assert_eq!(command.command_text, "update [dbo].[People]\nset [Name] = LTRIM(RTRIM([Name]))\nwhere ([Id] = @0)\n");
    }

    #[test]
    fn delete_writes_the_predicate() {
        let t = target(people_set());
        let predicate = column(&t, "Id").equal(DbExpression::constant(3)).and(column(&t, "Name").is_null().not());
        let tree = DeleteCommandTree { target: t, predicate };
        let command = generate_delete_sql(&tree, &GeneratorConfig::sql8()).unwrap();
        assert_eq!(command.command_text, "delete [dbo].[People]\nwhere (([Id] = @0) and not ([Name] is null))");
    }

    #[test]
    fn defining_query_targets_are_a_metadata_error() {
        let t = target(people_set().with_defining_query("SELECT 1 AS Id, 'a' AS Name"));
        let tree = DeleteCommandTree { predicate: column(&t, "Id").equal(DbExpression::constant(1)), target: t };
        match generate_delete_sql(&tree, &GeneratorConfig::sql10()) {
            Err(Error::Metadata(msg)) => assert!(msg.contains("DeleteFunction")),
            other => panic!("expected Metadata error, got {other:?}"),
        }
    }
}
