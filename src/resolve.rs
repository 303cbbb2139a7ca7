//! The `ResolveResult` contract produced by the (out-of-scope) semantic resolver.
//!
//! The resolver assigns every identifier a `(scope, index, kind)` triple,
//! builds the function table with stable indices, and tells us which
//! globals are scalars vs arrays. This module defines that contract; the
//! actual scope-resolution algorithm lives outside this crate. Test fixtures
//! construct `ResolveResult` values directly (see `compiler::tests`).

use hashbrown::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Local,
    Special,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Scalar,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub scope: Scope,
    pub index: u32,
    pub kind: SymbolKind,
}

/// Predefined special variables, kept in their own slot space (spec §3,
/// "Variable access").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Special {
    Nr = 0,
    Nf = 1,
    Fs = 2,
    Ofs = 3,
    Ors = 4,
    Rs = 5,
    Fnr = 6,
    Filename = 7,
    Subsep = 8,
    Rstart = 9,
    Rlength = 10,
    Convfmt = 11,
    Ofmt = 12,
}

impl Special {
    pub const COUNT: u32 = 13;

    pub fn index(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone)]
pub struct FunctionInfo<'a> {
    pub index: u32,
    pub name: &'a str,
    pub params: &'a [&'a str],
    /// Per-parameter array-or-scalar flag, derived from usage inside the body.
    pub param_is_array: &'a [bool],
}

/// Everything the compiler needs from name resolution for one program.
pub struct ResolveResult<'a> {
    /// `(function scope name, identifier) -> Symbol`. The global scope uses
    /// the empty string as its function-scope key.
    symbols: HashMap<(&'a str, &'a str), Symbol>,
    functions: HashMap<&'a str, FunctionInfo<'a>>,
    ordered_functions: Vec<&'a str>,
    global_scalar_names: Vec<&'a str>,
    global_array_names: Vec<&'a str>,
}

pub const GLOBAL_SCOPE: &str = "";

impl<'a> ResolveResult<'a> {
    pub fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            functions: HashMap::new(),
            ordered_functions: Vec::new(),
            global_scalar_names: Vec::new(),
            global_array_names: Vec::new(),
        }
    }

    pub fn define_global_scalar(&mut self, name: &'a str) -> Symbol {
        let index = self.global_scalar_names.len() as u32;
        self.global_scalar_names.push(name);
        let sym = Symbol {
            scope: Scope::Global,
            index,
            kind: SymbolKind::Scalar,
        };
        self.symbols.insert((GLOBAL_SCOPE, name), sym);
        sym
    }

    pub fn define_global_array(&mut self, name: &'a str) -> Symbol {
        let index = self.global_array_names.len() as u32;
        self.global_array_names.push(name);
        let sym = Symbol {
            scope: Scope::Global,
            index,
            kind: SymbolKind::Array,
        };
        self.symbols.insert((GLOBAL_SCOPE, name), sym);
        sym
    }

    pub fn define_local(
        &mut self,
        func_scope: &'a str,
        name: &'a str,
        index: u32,
        kind: SymbolKind,
    ) -> Symbol {
        let sym = Symbol {
            scope: Scope::Local,
            index,
            kind,
        };
        self.symbols.insert((func_scope, name), sym);
        sym
    }

    pub fn define_special(&mut self, name: &'a str, special: Special) -> Symbol {
        let sym = Symbol {
            scope: Scope::Special,
            index: special.index(),
            kind: SymbolKind::Scalar,
        };
        self.symbols.insert((GLOBAL_SCOPE, name), sym);
        sym
    }

    pub fn lookup_var(&self, func_scope: &str, name: &str) -> Option<Symbol> {
        self.symbols
            .get(&(func_scope, name))
            .copied()
            .or_else(|| self.symbols.get(&(GLOBAL_SCOPE, name)).copied())
    }

    pub fn add_function(&mut self, info: FunctionInfo<'a>) {
        self.ordered_functions.push(info.name);
        self.functions.insert(info.name, info);
    }

    pub fn get_function(&self, name: &str) -> Option<&FunctionInfo<'a>> {
        self.functions.get(name)
    }

    pub fn functions_in_order(&self) -> impl Iterator<Item = &FunctionInfo<'a>> {
        self.ordered_functions
            .iter()
            .map(move |name| &self.functions[name])
    }

    pub fn global_scalar_names(&self) -> &[&'a str] {
        &self.global_scalar_names
    }

    pub fn global_array_names(&self) -> &[&'a str] {
        &self.global_array_names
    }
}

impl<'a> Default for ResolveResult<'a> {
    fn default() -> Self {
        Self::new()
    }
}
