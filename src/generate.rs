use serde::Serialize;
use tracing::{debug, debug_span};

use crate::{
    CommandTree, EdmFunction, GeneratorConfig, Result,
    dml::{DmlCommand, ParameterDescriptor, generate_delete_sql, generate_insert_sql, generate_update_sql},
    sqlgen::{SqlGenerator, quote_identifier},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandType {
    Text,
    StoredProcedure,
}

/// A command ready to be sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedCommand {
    pub command_text: String,
    pub command_type: CommandType,
    /// Parameters created for the constants of a modification statement.
    pub parameters: Vec<ParameterDescriptor>,
    /// Query parameters the caller should bind as non-unicode strings.
    pub params_to_force_non_unicode: Vec<String>,
}

impl GeneratedCommand {
    fn text(command_text: String) -> Self {
        Self {
            command_text,
            command_type: CommandType::Text,
            parameters: Vec::new(),
            params_to_force_non_unicode: Vec::new(),
        }
    }
}

impl From<DmlCommand> for GeneratedCommand {
    fn from(command: DmlCommand) -> Self {
        Self { parameters: command.parameters, ..Self::text(command.command_text) }
    }
}

/// Generates the T-SQL for one command tree.
pub fn generate_sql(tree: &CommandTree, config: &GeneratorConfig) -> Result<GeneratedCommand> {
    let span = debug_span!("generate_sql", kind = tree.kind_name(), version = %config.version);
    let _enter = span.enter();

    let command = match tree {
        CommandTree::Query(query) => {
            let compiled = SqlGenerator::new(config.version).compile(&query.query)?;
            let text = compiled.render(config.line_terminator.as_str())?;
            GeneratedCommand {
                params_to_force_non_unicode: compiled.params_to_force_non_unicode,
                ..GeneratedCommand::text(text)
            }
        }
        CommandTree::Insert(insert) => generate_insert_sql(insert, config)?.into(),
        CommandTree::Update(update) => generate_update_sql(update, config)?.into(),
        CommandTree::Delete(delete) => generate_delete_sql(delete, config)?.into(),
        CommandTree::Function(function) => generate_function_sql(&function.function),
    };
    debug!(target: "tsqlgen::sqlgen", length = command.command_text.len(), "generated command");
    Ok(command)
}

/// Inline command text as is, otherwise a call of `[schema].[procedure]`.
fn generate_function_sql(function: &EdmFunction) -> GeneratedCommand {
    if let Some(text) = &function.command_text {
        return GeneratedCommand::text(text.clone());
    }
    let schema = function.schema.as_deref().filter(|s| !s.is_empty()).unwrap_or(&function.namespace);
    let name = format!("{}.{}", quote_identifier(schema), quote_identifier(function.store_name()));
    GeneratedCommand { command_type: CommandType::StoredProcedure, ..GeneratedCommand::text(name) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DbExpression, EdmProperty, EntitySet, FunctionCommandTree, StructuralType, TypeUsage};

    fn people_set() -> EntitySet {
        EntitySet::new(
            "Crm",
            "People",
            StructuralType {
                name: "Person".into(),
                properties: vec![
                    EdmProperty::new("Id", TypeUsage::int32()),
                    EdmProperty::new("Code", TypeUsage::string(Some(false))),
                ],
                key_members: vec!["Id".into()],
            },
        )
        .with_schema("dbo")
    }

    #[test]
    fn procedures_are_called_by_schema_and_store_name() {
        let function = EdmFunction::user("Crm", "GetPeople").with_schema("sales").with_store_name("usp_people");
        let tree = CommandTree::Function(FunctionCommandTree { function });
        let command = generate_sql(&tree, &GeneratorConfig::sql10()).unwrap();
        assert_eq!(command.command_type, CommandType::StoredProcedure);
        assert_eq!(command.command_text, "[sales].[usp_people]");

        let function = EdmFunction::user("Crm", "GetPeople");
        let tree = CommandTree::Function(FunctionCommandTree { function });
        assert_eq!(generate_sql(&tree, &GeneratorConfig::sql10()).unwrap().command_text, "[Crm].[GetPeople]");
    }

    #[test]
    fn inline_command_text_is_kept() {
        let function = EdmFunction::user("Crm", "Purge").with_command_text("DELETE FROM Log");
        let tree = CommandTree::Function(FunctionCommandTree { function });
        let command = generate_sql(&tree, &GeneratorConfig::sql8()).unwrap();
        assert_eq!(command.command_type, CommandType::Text);
        assert_eq!(command.command_text, "DELETE FROM Log");
    }

    #[test]
    fn queries_report_non_unicode_parameters() {
        let p = DbExpression::scan(people_set()).bind_as("p").unwrap();
        let pred = p
            .variable()
            .property("Code")
            .unwrap()
            .equal(DbExpression::parameter("code", TypeUsage::string(None)));
        let tree = CommandTree::query(p.filter(pred));
        let command = generate_sql(&tree, &GeneratorConfig::sql9()).unwrap();
        assert_eq!(command.command_type, CommandType::Text);
        assert!(command.command_text.starts_with("SELECT"));
        assert_eq!(command.params_to_force_non_unicode, ["code"]);
        assert!(command.parameters.is_empty());
    }
}
