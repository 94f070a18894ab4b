use std::collections::HashMap;

use serde::Serialize;

use crate::{
    ComparisonKind, ConstantValue, DbExpression, Error, Result, SqlVersion, TypeUsage,
    dml::DmlCommand,
    sqlgen::{SqlGenerator, TargetColumns, quote_identifier},
};

/// A constant of a DML statement, sent as a parameter instead of a literal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub value: ConstantValue,
    pub ty: TypeUsage,
}

/// Writes the few expression shapes INSERT, UPDATE and DELETE trees carry.
pub(super) struct ExpressionTranslator<'n> {
    text: String,
    newline: &'n str,
    version: SqlVersion,
    /// Mapping element the target set would need, for error messages.
    function_mapping: &'static str,
    parameters: Vec<ParameterDescriptor>,
    /// Parameter holding the value of each assigned property. Only kept when
    /// a returning SELECT has to find the modified row again.
    member_values: Option<HashMap<String, String>>,
    pub(super) property_alias: Option<&'static str>,
}

impl<'n> ExpressionTranslator<'n> {
    pub(super) fn new(
        version: SqlVersion,
        newline: &'n str,
        function_mapping: &'static str,
        preserve_member_values: bool,
    ) -> Self {
        Self {
            text: String::with_capacity(256),
            newline,
            version,
            function_mapping,
            parameters: Vec::new(),
            member_values: preserve_member_values.then(HashMap::new),
            property_alias: None,
        }
    }

    pub(super) fn append(&mut self, s: &str) -> &mut Self {
        self.text.push_str(s);
        self
    }

    pub(super) fn append_line(&mut self) -> &mut Self {
        self.text.push_str(self.newline);
        self
    }

    pub(super) fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub(super) fn member_value(&self, property: &str) -> Option<&str> {
        self.member_values.as_ref()?.get(property).map(String::as_str)
    }

    /// Remembers the parameter just emitted for `value` as the value of `property`.
    pub(super) fn register_member_value(&mut self, property: &DbExpression, value: &DbExpression) -> Result<()> {
        let Some(member_values) = self.member_values.as_mut() else {
            return Ok(());
        };
        let DbExpression::Property { property, .. } = property else {
            return Err(Error::invalid_operation("a modified column must be a property of the target"));
        };
        if let (DbExpression::Constant { .. }, Some(parameter)) = (value, self.parameters.last()) {
            member_values.insert(property.name.clone(), parameter.name.clone());
        }
        Ok(())
    }

    pub(super) fn finish(self) -> DmlCommand {
        DmlCommand { command_text: self.text, parameters: self.parameters }
    }

    pub(super) fn visit(&mut self, e: &DbExpression) -> Result<()> {
        match e {
            DbExpression::Constant { value, result_type } => {
                let name = self.add_parameter(value, result_type);
                self.text.push_str(&name);
            }
            DbExpression::Null { .. } => self.text.push_str("null"),
            DbExpression::Property { property, .. } => {
                if let Some(alias) = self.property_alias {
                    self.text.push_str(alias);
                    self.text.push('.');
                }
                self.text.push_str(&quote_identifier(&property.name));
            }
            DbExpression::Scan { target } => {
                if target.defining_query.is_some() {
                    return Err(Error::metadata(format!(
                        "entity set {} is mapped to a defining query and has no {} mapping",
                        target.name, self.function_mapping
                    )));
                }
                self.text.push_str(target.target_sql());
            }
            DbExpression::And { left, right } => self.visit_binary(left, " and ", right)?,
            DbExpression::Or { left, right } => self.visit_binary(left, " or ", right)?,
            DbExpression::Not { argument } => {
                self.text.push_str("not (");
                self.visit(argument)?;
                self.text.push(')');
            }
            DbExpression::IsNull { argument } => {
                self.visit(argument)?;
                self.text.push_str(" is null");
            }
            DbExpression::Comparison { kind: ComparisonKind::Equals, left, right } => {
                self.visit_binary(left, " = ", right)?;
                self.register_member_value(left, right)?;
            }
            // Returning lists: every column keeps its own name.
            DbExpression::NewInstance { arguments, .. } => {
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        self.text.push_str(", ");
                    }
                    self.visit(argument)?;
                }
            }
            DbExpression::Function { .. } => {
                let value = self.parameterize(e)?;
                let columns = match self.property_alias {
                    Some(alias) => TargetColumns::Aliased(alias),
                    None => TargetColumns::Bare,
                };
                let sql = SqlGenerator::new(self.version).modification_value_sql(&value, columns, self.newline)?;
                self.text.push_str(&sql);
            }
            other => {
                return Err(Error::not_supported(format!(
                    "{:?} expressions are not supported in modification statements",
                    other.kind()
                )));
            }
        }
        Ok(())
    }

    fn add_parameter(&mut self, value: &ConstantValue, ty: &TypeUsage) -> String {
        let name = format!("@{}", self.parameters.len());
        self.parameters.push(ParameterDescriptor { name: name.clone(), value: value.clone(), ty: ty.clone() });
        name
    }

    /// Replaces the constants below `e` with references to new parameters, in visit order.
    fn parameterize(&mut self, e: &DbExpression) -> Result<DbExpression> {
        match e {
            DbExpression::Constant { value, result_type } => {
                let name = self.add_parameter(value, result_type);
                Ok(DbExpression::parameter(name.trim_start_matches('@'), result_type.clone()))
            }
            _ => e.map_children(&mut |child| self.parameterize(child)),
        }
    }

    fn visit_binary(&mut self, left: &DbExpression, separator: &str, right: &DbExpression) -> Result<()> {
        self.text.push('(');
        self.visit(left)?;
        self.text.push_str(separator);
        self.visit(right)?;
        self.text.push(')');
        Ok(())
    }
}
