use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, SqlVersion};

/// Line terminator written for every newline token of the generated text.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum LineTerminator {
    #[default]
    Lf,
    CrLf,
}

impl LineTerminator {
    pub fn as_str(self) -> &'static str {
        match self {
            LineTerminator::Lf => "\n",
            LineTerminator::CrLf => "\r\n",
        }
    }
}

/// Generator configuration.
///
/// - `version` selects the T-SQL dialect.
/// - `line_terminator` is written wherever the generated text breaks a line.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub version: SqlVersion,
    #[serde(default)]
    pub line_terminator: LineTerminator,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self { version: SqlVersion::default(), line_terminator: LineTerminator::default() }
    }
}

impl GeneratorConfig {
    pub fn new(version: SqlVersion) -> Self {
        Self { version, ..Self::default() }
    }

    pub fn from(version: SqlVersion, line_terminator: LineTerminator) -> Self {
        Self { version, line_terminator }
    }

    pub fn sql8() -> Self {
        Self::new(SqlVersion::Sql8)
    }

    pub fn sql9() -> Self {
        Self::new(SqlVersion::Sql9)
    }

    pub fn sql10() -> Self {
        Self::new(SqlVersion::Sql10)
    }

    /// Configuration for a server reporting `server_version`, e.g. `"09.00.3042"`.
    pub fn from_server_version(server_version: &str) -> Result<Self> {
        Ok(Self::new(SqlVersion::from_server_version(server_version)?))
    }

    /// Configuration for a manifest token (`"2000"`, `"2005"`, `"2008"`).
    pub fn from_manifest_token(token: &str) -> Result<Self> {
        Ok(Self::new(token.parse()?))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn newline(&self) -> &'static str {
        self.line_terminator.as_str()
    }
}
