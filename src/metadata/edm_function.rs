use serde::{Deserialize, Serialize};

use crate::TypeUsage;

/// Namespace of the provider independent functions.
pub const CANONICAL_NAMESPACE: &str = "Edm";
/// Namespace of the SQL Server built-in functions.
pub const STORE_NAMESPACE: &str = "SqlServer";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdmFunction {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    /// Native name when it differs from `name`.
    #[serde(default)]
    pub store_function_name: Option<String>,
    #[serde(default)]
    pub built_in: bool,
    #[serde(default)]
    pub niladic: bool,
    /// Native command text of a function import mapped to inline SQL.
    #[serde(default)]
    pub command_text: Option<String>,
    #[serde(default)]
    pub return_type: Option<TypeUsage>,
}

impl EdmFunction {
    fn with_namespace(namespace: &str, name: &str, built_in: bool) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            schema: None,
            store_function_name: None,
            built_in,
            niladic: false,
            command_text: None,
            return_type: None,
        }
    }

    pub fn canonical(name: &str) -> Self {
        Self::with_namespace(CANONICAL_NAMESPACE, name, true)
    }

    pub fn store(name: &str) -> Self {
        Self::with_namespace(STORE_NAMESPACE, name, true)
    }

    /// A user defined function or stored procedure.
    pub fn user(namespace: &str, name: &str) -> Self {
        Self::with_namespace(namespace, name, false)
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    pub fn with_store_name(mut self, store_name: &str) -> Self {
        self.store_function_name = Some(store_name.to_string());
        self
    }

    pub fn with_command_text(mut self, text: &str) -> Self {
        self.command_text = Some(text.to_string());
        self
    }

    pub fn with_return_type(mut self, return_type: TypeUsage) -> Self {
        self.return_type = Some(return_type);
        self
    }

    pub fn niladic(mut self) -> Self {
        self.niladic = true;
        self
    }

    /// `Namespace.Name`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    pub fn is_canonical(&self) -> bool {
        self.namespace == CANONICAL_NAMESPACE
    }

    /// Built-in store function, i.e. not canonical and not user defined.
    pub fn is_store(&self) -> bool {
        self.built_in && !self.is_canonical()
    }

    pub fn store_name(&self) -> &str {
        self.store_function_name.as_deref().unwrap_or(&self.name)
    }
}
