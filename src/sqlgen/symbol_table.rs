use crate::sqlgen::{NameMap, SymbolId};

/// Stack of scopes mapping variable names to symbols.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    scopes: Vec<NameMap<SymbolId>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(NameMap::new());
    }

    pub fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    /// Binds `name` in the innermost scope, shadowing outer bindings.
    pub fn add(&mut self, name: &str, symbol: SymbolId) {
        if self.scopes.is_empty() {
            self.enter_scope();
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, symbol);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlgen::{Symbol, SymbolArena};

    #[test]
    fn inner_scopes_shadow_outer_ones() {
        let mut arena = SymbolArena::new();
        let outer = arena.add(Symbol::new("a", None));
        let inner = arena.add(Symbol::new("a", None));

        let mut table = SymbolTable::new();
        table.enter_scope();
        table.add("a", outer);
        table.enter_scope();
        table.add("A", inner);
        assert_eq!(table.lookup("a"), Some(inner));
        table.exit_scope();
        assert_eq!(table.lookup("a"), Some(outer));
        table.exit_scope();
        assert_eq!(table.lookup("a"), None);
        assert_eq!(table.depth(), 0);
    }
}
