//! Scope-structured symbol table driven by the code generator.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Constant,
    Variable,
    Array,
    Procedure,
    Parameter,
}

/// Declared type, used for symbol display only; the language is otherwise
/// untyped integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarType {
    #[default]
    Integer,
    Boolean,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub var_type: VarType,
    /// Static nesting level of the declaring scope.
    pub level: i32,
    /// Frame-relative address for variables; code offset for procedures.
    pub address: i64,
    /// 1 for scalars, element count for arrays, 0 for procedures.
    pub size: i64,
    /// Reserved for parameter passing.
    pub by_value: bool,
    pub constant_value: i64,
}

impl Default for Symbol {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: SymbolKind::Variable,
            var_type: VarType::Integer,
            level: 0,
            address: 0,
            size: 0,
            by_value: true,
            constant_value: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScopeInfo {
    pub level: i32,
    /// Next free frame-relative address. Starts at 3 per activation record
    /// (static link, dynamic link, return address).
    pub data_offset: i64,
}

#[derive(Debug, Clone)]
struct ScopeFrame {
    start_index: usize,
    info: ScopeInfo,
}

/// Append-only symbol list plus a stack of scope frames. Leaving a scope
/// truncates the list back to the frame's start index.
#[derive(Debug)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    scopes: Vec<ScopeFrame>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            symbols: Vec::new(),
            scopes: vec![ScopeFrame {
                start_index: 0,
                info: ScopeInfo::default(),
            }],
        }
    }

    pub fn enter_scope(&mut self) {
        let level = self
            .scopes
            .last()
            .map(|frame| frame.info.level + 1)
            .unwrap_or(0);
        self.scopes.push(ScopeFrame {
            start_index: self.symbols.len(),
            info: ScopeInfo {
                level,
                data_offset: 0,
            },
        });
    }

    pub fn leave_scope(&mut self) {
        if let Some(frame) = self.scopes.pop() {
            self.symbols.truncate(frame.start_index);
        }
        if self.scopes.is_empty() {
            // Never without a global scope.
            self.scopes.push(ScopeFrame {
                start_index: 0,
                info: ScopeInfo::default(),
            });
        }
    }

    pub fn current_scope(&self) -> &ScopeInfo {
        &self.scopes.last().expect("scope stack is never empty").info
    }

    pub fn current_scope_mut(&mut self) -> &mut ScopeInfo {
        &mut self
            .scopes
            .last_mut()
            .expect("scope stack is never empty")
            .info
    }

    /// Installs a symbol in the current scope, stamping its level, and
    /// returns its index for later mutation (procedure address patching).
    pub fn add_symbol(&mut self, mut symbol: Symbol) -> usize {
        symbol.level = self.current_scope().level;
        self.symbols.push(symbol);
        self.symbols.len() - 1
    }

    pub fn symbol(&self, index: usize) -> &Symbol {
        &self.symbols[index]
    }

    pub fn symbol_mut(&mut self, index: usize) -> &mut Symbol {
        &mut self.symbols[index]
    }

    /// Walks from most-recent to oldest; first match wins, so inner scopes
    /// shadow outer ones.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().rev().find(|symbol| symbol.name == name)
    }

    /// Lookup restricted to the top scope frame.
    pub fn lookup_in_current(&self, name: &str) -> Option<&Symbol> {
        let frame = self.scopes.last()?;
        self.symbols[frame.start_index..]
            .iter()
            .rev()
            .find(|symbol| symbol.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(name: &str, address: i64) -> Symbol {
        Symbol {
            name: name.to_string(),
            kind: SymbolKind::Variable,
            address,
            size: 1,
            ..Symbol::default()
        }
    }

    #[test]
    fn scope_levels_increase_and_symbols_get_stamped() {
        let mut table = SymbolTable::new();
        assert_eq!(table.current_scope().level, 0);

        table.enter_scope();
        assert_eq!(table.current_scope().level, 1);
        let index = table.add_symbol(variable("x", 3));
        assert_eq!(table.symbol(index).level, 1);

        table.enter_scope();
        assert_eq!(table.current_scope().level, 2);
        table.leave_scope();
        assert_eq!(table.current_scope().level, 1);
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let mut table = SymbolTable::new();
        table.add_symbol(variable("x", 3));
        table.enter_scope();
        table.add_symbol(variable("x", 4));

        let found = table.lookup("x").expect("x should resolve");
        assert_eq!(found.level, 1);
        assert_eq!(found.address, 4);

        table.leave_scope();
        let found = table.lookup("x").expect("x should resolve");
        assert_eq!(found.level, 0);
        assert_eq!(found.address, 3);
    }

    #[test]
    fn lookup_in_current_ignores_outer_scopes() {
        let mut table = SymbolTable::new();
        table.add_symbol(variable("x", 3));
        table.enter_scope();
        assert!(table.lookup_in_current("x").is_none());
        assert!(table.lookup("x").is_some());
    }

    #[test]
    fn leaving_scope_truncates_symbols() {
        let mut table = SymbolTable::new();
        table.enter_scope();
        table.add_symbol(variable("temp", 3));
        table.leave_scope();
        assert!(table.lookup("temp").is_none());
    }

    #[test]
    fn leaving_last_scope_reinitializes_global() {
        let mut table = SymbolTable::new();
        table.add_symbol(variable("x", 3));
        table.leave_scope();
        assert!(table.lookup("x").is_none());
        assert_eq!(table.current_scope().level, 0);
        // Still usable afterwards.
        table.add_symbol(variable("y", 3));
        assert!(table.lookup("y").is_some());
    }

    #[test]
    fn data_offset_tracks_declared_sizes() {
        let mut table = SymbolTable::new();
        table.enter_scope();
        table.current_scope_mut().data_offset = 3;
        table.current_scope_mut().data_offset += 1; // scalar
        table.current_scope_mut().data_offset += 8; // array of 8
        assert_eq!(table.current_scope().data_offset, 12);
    }
}
