use std::fmt;

/// Scope depth of the sentinel scope. Never left.
pub const SENTINEL_DEPTH: usize = 0;
/// File scope: globals and every function.
pub const GLOBAL_DEPTH: usize = 1;
/// Parameter list of the function being compiled.
pub const PARAM_DEPTH: usize = 2;
/// Function body and any nested block.
pub const FIRST_LOCAL_DEPTH: usize = 3;

/// Handle into the symbol arena. Valid until its scope is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Seen but not yet declared.
    Undeclared,
    /// Function returning a value.
    Function,
    VoidFunction,
    /// Called before any definition was seen.
    UndefinedFunction,
    Variable,
    Parameter,
}

impl SymbolKind {
    pub fn is_storage(self) -> bool {
        matches!(self, SymbolKind::Variable | SymbolKind::Parameter)
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKind::Undeclared => write!(f, "undeclared"),
            SymbolKind::Function => write!(f, "function"),
            SymbolKind::VoidFunction => write!(f, "void function"),
            SymbolKind::UndefinedFunction => write!(f, "undefined function"),
            SymbolKind::Variable => write!(f, "variable"),
            SymbolKind::Parameter => write!(f, "parameter"),
        }
    }
}

/// Storage region, which decides the addressing mode of every access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Global,
    Parameter,
    Local,
}

impl Region {
    pub fn for_depth(depth: usize) -> Region {
        match depth {
            GLOBAL_DEPTH => Region::Global,
            PARAM_DEPTH => Region::Parameter,
            d if d >= FIRST_LOCAL_DEPTH => Region::Local,
            _ => crate::diag::ice("no storage region at the sentinel depth"),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Global => write!(f, "global"),
            Region::Parameter => write!(f, "param"),
            Region::Local => write!(f, "local"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub depth: usize,
    /// Offset within the symbol's region.
    pub offset: usize,
    /// 0 for scalars, element count for arrays.
    pub size: usize,
    /// Levels of pointer indirection.
    pub ref_level: u8,
    /// Next parameter in declaration order.
    pub next_param: Option<SymbolId>,
    /// First parameter of a function.
    pub first_param: Option<SymbolId>,
    /// Argument count fixed by the first call site or the definition.
    pub expected_args: Option<usize>,
}

impl Symbol {
    pub(crate) fn stub(name: &str, depth: usize) -> Self {
        Self {
            name: name.to_string(),
            kind: SymbolKind::Undeclared,
            depth,
            offset: 0,
            size: 0,
            ref_level: 0,
            next_param: None,
            first_param: None,
            expected_args: None,
        }
    }

    pub fn region(&self) -> Region {
        Region::for_depth(self.depth)
    }

    pub fn is_array(&self) -> bool {
        self.size > 0
    }
}

/// Everything the backend needs to address a storage symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    pub region: Region,
    pub offset: usize,
    pub size: usize,
    pub ref_level: u8,
    /// Parameter count of the enclosing function; only used for parameters.
    pub arity: usize,
}

impl Address {
    pub fn global(offset: usize) -> Self {
        Self {
            region: Region::Global,
            offset,
            size: 0,
            ref_level: 0,
            arity: 0,
        }
    }

    pub fn local(offset: usize) -> Self {
        Self {
            region: Region::Local,
            ..Self::global(offset)
        }
    }

    pub fn parameter(offset: usize, arity: usize) -> Self {
        Self {
            region: Region::Parameter,
            arity,
            ..Self::global(offset)
        }
    }

    pub fn is_array(&self) -> bool {
        self.size > 0
    }

    pub fn is_pointer(&self) -> bool {
        self.ref_level > 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.region, self.offset)
    }
}
