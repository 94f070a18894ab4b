use std::{
    collections::HashMap,
    ops::{Index, IndexMut},
};

use crate::{TypeUsage, sqlgen::NameMap};

/// Handle of a [`Symbol`] in the [`SymbolArena`] of one compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(usize);

/// Extents aggregated by a join symbol.
///
/// - `extent_list`: direct inputs of the join, in FROM order.
/// - `flattened_extent_list`: leaf extents of a nested join, used to detect
///   alias collisions with outer references.
/// - `column_list`: columns a nested join exposes through its own SELECT.
/// - `is_nested_join`: the join sits behind a derived table, so property
///   access stops at this symbol.
#[derive(Debug, Clone, Default)]
pub struct JoinExtents {
    pub extent_list: Vec<SymbolId>,
    pub name_to_extent: NameMap<SymbolId>,
    pub flattened_extent_list: Vec<SymbolId>,
    pub column_list: Vec<SymbolId>,
    pub is_nested_join: bool,
}

/// A named source of columns: an extent, a derived statement, a column or a join.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    /// Name written to the SQL; differs from `name` after collision resolution.
    pub new_name: String,
    pub ty: Option<TypeUsage>,
    pub needs_renaming: bool,
    /// Columns referenced through this symbol so far.
    pub columns: NameMap<SymbolId>,
    /// Output columns of the statement the symbol stands for.
    pub output_columns: NameMap<SymbolId>,
    pub output_columns_renamed: bool,
    pub join: Option<JoinExtents>,
}

impl Symbol {
    pub fn new(name: &str, ty: Option<TypeUsage>) -> Self {
        Self {
            name: name.to_string(),
            new_name: name.to_string(),
            ty,
            needs_renaming: false,
            columns: NameMap::new(),
            output_columns: NameMap::new(),
            output_columns_renamed: false,
            join: None,
        }
    }

    pub fn with_output_columns(name: &str, ty: Option<TypeUsage>, output_columns: NameMap<SymbolId>, renamed: bool) -> Self {
        Self { output_columns, output_columns_renamed: renamed, ..Self::new(name, ty) }
    }

    pub fn is_join(&self) -> bool {
        self.join.is_some()
    }

    pub fn is_nested_join(&self) -> bool {
        self.join.as_ref().is_some_and(|j| j.is_nested_join)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SymbolArena {
    symbols: Vec<Symbol>,
}

impl SymbolArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, symbol: Symbol) -> SymbolId {
        self.symbols.push(symbol);
        SymbolId(self.symbols.len() - 1)
    }

    /// A join symbol over `extents`, addressable by each extent's name.
    pub fn add_join(&mut self, name: &str, ty: Option<TypeUsage>, extents: Vec<SymbolId>) -> SymbolId {
        let mut name_to_extent = NameMap::new();
        for &extent in &extents {
            name_to_extent.insert(&self[extent].name, extent);
        }
        let mut symbol = Symbol::new(name, ty);
        symbol.join = Some(JoinExtents { extent_list: extents, name_to_extent, ..Default::default() });
        self.add(symbol)
    }

    /// A join symbol standing for a derived table built over a join.
    /// Its children are reachable only through `column_list`.
    pub fn add_nested_join(
        &mut self,
        name: &str,
        ty: Option<TypeUsage>,
        extents: Vec<SymbolId>,
        column_list: Vec<SymbolId>,
        flattened_extent_list: Vec<SymbolId>,
    ) -> SymbolId {
        let id = self.add_join(name, ty, extents);
        if let Some(join) = self[id].join.as_mut() {
            join.is_nested_join = true;
            join.column_list = column_list;
            join.flattened_extent_list = flattened_extent_list;
        }
        id
    }

    pub fn join(&self, id: SymbolId) -> Option<&JoinExtents> {
        self[id].join.as_ref()
    }

    pub fn is_join(&self, id: SymbolId) -> bool {
        self[id].is_join()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Index<SymbolId> for SymbolArena {
    type Output = Symbol;

    fn index(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }
}

impl IndexMut<SymbolId> for SymbolArena {
    fn index_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0]
    }
}

/// Tracks whether optional columns are referenced. Symbols registered from the
/// same source share one cell, so marking either marks both.
#[derive(Debug, Clone, Default)]
pub struct SymbolUsageManager {
    cells: Vec<bool>,
    cell_of: HashMap<SymbolId, usize>,
}

impl SymbolUsageManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, symbol: SymbolId) -> bool {
        self.cell_of.contains_key(&symbol)
    }

    /// Registers `symbol`, sharing the cell of `source` when there is one.
    pub fn add(&mut self, source: Option<SymbolId>, symbol: SymbolId) {
        let cell = match source.and_then(|s| self.cell_of.get(&s).copied()) {
            Some(cell) => cell,
            None => {
                self.cells.push(false);
                let cell = self.cells.len() - 1;
                if let Some(source) = source {
                    self.cell_of.insert(source, cell);
                }
                cell
            }
        };
        self.cell_of.insert(symbol, cell);
    }

    /// No-op for symbols that were never registered.
    pub fn mark_as_used(&mut self, symbol: SymbolId) {
        if let Some(&cell) = self.cell_of.get(&symbol) {
            self.cells[cell] = true;
        }
    }

    pub fn is_used(&self, symbol: SymbolId) -> bool {
        self.cell_of.get(&symbol).is_some_and(|&cell| self.cells[cell])
    }
}
