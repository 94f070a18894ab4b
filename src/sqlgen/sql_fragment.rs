use std::borrow::Cow;

use crate::sqlgen::{StatementId, SymbolId};

/// `[name]`, with `]` doubled.
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Unit of generated SQL. Names are resolved only when the fragment is written.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlFragment {
    Text(Cow<'static, str>),
    NewLine,
    Builder(SqlBuilder),
    Statement(StatementId),
    Symbol(SymbolId),
    /// Column reference whose column is not known yet. Never written.
    SymbolPair { source: SymbolId, column: SymbolId },
}

impl SqlFragment {
    pub fn as_statement(&self) -> Option<StatementId> {
        match self {
            SqlFragment::Statement(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<SymbolId> {
        match self {
            SqlFragment::Symbol(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<&'static str> for SqlFragment {
    fn from(s: &'static str) -> Self {
        SqlFragment::Text(Cow::Borrowed(s))
    }
}

impl From<String> for SqlFragment {
    fn from(s: String) -> Self {
        SqlFragment::Text(Cow::Owned(s))
    }
}

impl From<SqlBuilder> for SqlFragment {
    fn from(b: SqlBuilder) -> Self {
        SqlFragment::Builder(b)
    }
}

impl From<SymbolId> for SqlFragment {
    fn from(id: SymbolId) -> Self {
        SqlFragment::Symbol(id)
    }
}

impl From<StatementId> for SqlFragment {
    fn from(id: StatementId) -> Self {
        SqlFragment::Statement(id)
    }
}

/// Ordered list of fragments. Empty only when nothing was appended,
/// so appending `""` makes it non-empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlBuilder {
    fragments: Vec<SqlFragment>,
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(s: impl Into<SqlFragment>) -> Self {
        let mut b = Self::new();
        b.append(s);
        b
    }

    pub fn append(&mut self, fragment: impl Into<SqlFragment>) -> &mut Self {
        self.fragments.push(fragment.into());
        self
    }

    pub fn append_line(&mut self) -> &mut Self {
        self.fragments.push(SqlFragment::NewLine);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn fragments(&self) -> &[SqlFragment] {
        &self.fragments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_doubles_closing_brackets() {
        assert_eq!(quote_identifier("Order Details"), "[Order Details]");
        assert_eq!(quote_identifier("a]b"), "[a]]b]");
    }

    #[test]
    fn empty_text_makes_a_builder_non_empty() {
        let mut b = SqlBuilder::new();
        assert!(b.is_empty());
        b.append("");
        assert!(!b.is_empty());
    }
}
