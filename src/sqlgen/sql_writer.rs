use tracing::debug;

use crate::{
    Error, Result, SqlVersion,
    sqlgen::{
        NameMap, NameRegistries, SqlBuilder, SqlFragment, StatementArena, StatementId, SymbolArena, SymbolId,
        SymbolUsageManager, TopClause, quote_identifier,
    },
};

/// Text sink that indents every line by the nesting depth of the current SELECT.
#[derive(Debug)]
pub struct SqlWriter<'n> {
    out: String,
    /// Starts at -1 so the outermost statement is not indented.
    indent: i32,
    at_beginning_of_line: bool,
    newline: &'n str,
}

impl<'n> SqlWriter<'n> {
    pub fn new(newline: &'n str) -> Self {
        Self { out: String::with_capacity(1024), indent: -1, at_beginning_of_line: true, newline }
    }

    pub fn write(&mut self, s: &str) {
        if self.at_beginning_of_line {
            for _ in 0..self.indent.max(0) {
                self.out.push('\t');
            }
            self.at_beginning_of_line = false;
        }
        self.out.push_str(s);
    }

    pub fn write_line(&mut self) {
        self.out.push_str(self.newline);
        self.at_beginning_of_line = true;
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// Second phase of generation: writes a fragment tree, resolving the names
/// symbols end up with.
///
/// Works on its own copies of the symbols, the usage table and the name
/// registries, so rendering is repeatable.
pub struct Renderer<'a> {
    version: SqlVersion,
    statements: &'a StatementArena,
    symbols: SymbolArena,
    usage: SymbolUsageManager,
    names: NameRegistries,
}

impl<'a> Renderer<'a> {
    pub fn new(
        version: SqlVersion,
        statements: &'a StatementArena,
        symbols: &SymbolArena,
        usage: &SymbolUsageManager,
        names: &NameRegistries,
    ) -> Self {
        Self { version, statements, symbols: symbols.clone(), usage: usage.clone(), names: names.clone() }
    }

    pub fn render(mut self, fragment: &SqlFragment, newline: &str) -> Result<String> {
        let mut writer = SqlWriter::new(newline);
        self.write_fragment(fragment, &mut writer)?;
        Ok(writer.finish())
    }

    fn write_fragment(&mut self, fragment: &SqlFragment, w: &mut SqlWriter) -> Result<()> {
        match fragment {
            SqlFragment::Text(s) => w.write(s),
            SqlFragment::NewLine => w.write_line(),
            SqlFragment::Builder(b) => self.write_builder(b, w)?,
            SqlFragment::Statement(id) => self.write_statement(*id, w)?,
            SqlFragment::Symbol(id) => self.write_symbol(*id, w),
            SqlFragment::SymbolPair { .. } => {
                return Err(Error::invalid_operation("a column reference was left unresolved"));
            }
        }
        Ok(())
    }

    fn write_builder(&mut self, builder: &SqlBuilder, w: &mut SqlWriter) -> Result<()> {
        for fragment in builder.fragments() {
            self.write_fragment(fragment, w)?;
        }
        Ok(())
    }

    fn write_symbol(&mut self, id: SymbolId, w: &mut SqlWriter) {
        let symbol = &mut self.symbols[id];
        if symbol.needs_renaming {
            if self.names.columns.contains(&symbol.new_name) {
                symbol.new_name = self.names.columns.next_free(&symbol.new_name);
            } else {
                self.names.columns.register(&symbol.new_name);
            }
            symbol.needs_renaming = false;
        }
        w.write(&quote_identifier(&symbol.new_name));
    }

    fn write_statement(&mut self, id: StatementId, w: &mut SqlWriter) -> Result<()> {
        let statements = self.statements;
        let stmt = &statements[id];

        // Aliases referenced from inside this statement that belong to enclosing ones.
        let mut taken = NameMap::new();
        for &outer in &stmt.outer_extents {
            match self.symbols.join(outer) {
                Some(join) => {
                    for &s in &join.flattened_extent_list {
                        taken.insert(&self.symbols[s].new_name, ());
                    }
                }
                None => {
                    taken.insert(&self.symbols[outer].new_name, ());
                }
            }
        }

        let extents = stmt.all_join_extents.as_ref().unwrap_or(&stmt.from_extents);
        for &extent in extents {
            let name = self.symbols[extent].name.clone();
            if taken.contains(&name) {
                let new_name = self.names.extents.next_free(&name);
                debug!(target: "tsqlgen::sqlgen", alias = %name, renamed = %new_name, "renamed FROM alias hiding an outer reference");
                self.symbols[extent].new_name = new_name;
            }
            taken.insert(&self.symbols[extent].new_name, ());
        }

        w.indent += 1;

        self.write_select_clause(id, w)?;
        w.write_line();
        w.write("FROM ");
        self.write_builder(&stmt.from, w)?;

        if !stmt.where_clause.is_empty() {
            w.write_line();
            w.write("WHERE ");
            self.write_builder(&stmt.where_clause, w)?;
        }
        if !stmt.group_by.is_empty() {
            w.write_line();
            w.write("GROUP BY ");
            self.write_builder(&stmt.group_by, w)?;
        }
        if !stmt.order_by.is_empty() && (stmt.is_top_most || stmt.has_top()) {
            w.write_line();
            w.write("ORDER BY ");
            self.write_builder(&stmt.order_by, w)?;
        }

        w.indent -= 1;
        Ok(())
    }

    fn write_select_clause(&mut self, id: StatementId, w: &mut SqlWriter) -> Result<()> {
        let statements = self.statements;
        let stmt = &statements[id];
        let select = &stmt.select;

        w.write("SELECT ");
        if select.is_distinct {
            w.write("DISTINCT ");
        }
        if let Some(top) = &select.top {
            self.write_top(top, w)?;
        }

        if select.is_empty() {
            w.write("*");
            return Ok(());
        }

        if stmt.is_top_most || select.is_distinct {
            for column in &select.optional_columns {
                self.usage.mark_as_used(column.symbol);
            }
        }
        let mut printed_any = false;
        for column in &select.optional_columns {
            if self.usage.is_used(column.symbol) {
                if printed_any {
                    w.write(", ");
                }
                self.write_builder(&column.builder, w)?;
                printed_any = true;
            }
        }

        if !select.items.is_empty() {
            if printed_any {
                w.write(", ");
            }
            self.write_builder(&select.items, w)?;
        } else if !printed_any {
            if let Some(first) = select.optional_columns.first() {
                self.usage.mark_as_used(first.symbol);
                self.write_builder(&first.builder, w)?;
            }
        }
        Ok(())
    }

    fn write_top(&mut self, top: &TopClause, w: &mut SqlWriter) -> Result<()> {
        w.write("TOP ");
        let parenthesized = self.version != SqlVersion::Sql8;
        if parenthesized {
            w.write("(");
        }
        self.write_fragment(&top.count, w)?;
        if parenthesized {
            w.write(")");
        }
        w.write(" ");
        if top.with_ties {
            w.write("WITH TIES ");
        }
        Ok(())
    }
}
