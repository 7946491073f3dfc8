//! State threaded through the lowering of one compilation unit

use crate::error::LowerError;
use crate::facts::ProgramFacts;
use crate::options::LowerOptions;
use lm_override::OverrideProvider;
use lm_scope::{FrameKind, ScopeManager};
use lm_source::{SemanticModel, SymbolId};
use lm_span::{FileId, FileSpan, Span};
use lm_target::{Expr, Name};
use rustc_hash::FxHashMap;

/// Result type of every lowering step
pub type LowerResult<T> = Result<T, LowerError>;

/// A construct `break` can leave
#[derive(Debug, Clone)]
pub(crate) enum Breakable {
    /// A loop; `flag` is set when its body needs continue emulation
    Loop {
        flag: Option<Name>,
        depth: usize,
    },
    /// A switch wrapped in a one-shot `repeat`
    Switch {
        /// Labels of sections reached through `goto case`/`goto default`
        labels: Vec<(SectionKey, Name)>,
        /// A `continue` inside left through this switch
        continue_escapes: bool,
        depth: usize,
    },
}

/// Identity of a switch section targeted by a jump
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SectionKey {
    /// `goto case value`, keyed by the rendered constant
    Case(String),
    /// `goto default`
    Default,
}

/// One emitted function
#[derive(Debug, Clone)]
pub(crate) struct FunctionState {
    /// Name of the receiver parameter inside instance members
    pub this: Option<Name>,
    /// Enclosing loops and switches, innermost last
    pub breakables: Vec<Breakable>,
    /// Protected-region closures (`try`, `using`) currently open, innermost
    /// last, each with the most values a `return` inside it produced
    pub protected: Vec<Option<usize>>,
    /// ref/out parameters returned after the primary value
    pub ref_params: Vec<Name>,
    /// Catch variables, innermost last, for bare rethrow
    pub catch_vars: Vec<Name>,
    /// Function location
    pub span: FileSpan,
}

impl FunctionState {
    fn new(this: Option<Name>, span: FileSpan) -> Self {
        Self {
            this,
            breakables: Vec::new(),
            protected: Vec::new(),
            ref_params: Vec::new(),
            catch_vars: Vec::new(),
            span,
        }
    }
}

/// Type whose closure is being emitted
#[derive(Debug, Clone)]
pub(crate) struct TypeState {
    pub symbol: SymbolId,
    /// Type-level locals of members: methods, private statics, accessors
    pub locals: FxHashMap<MemberSlot, Name>,
}

/// Key of a type-level local
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub(crate) enum MemberSlot {
    /// Method, or static field kept as a local
    Member(SymbolId),
    /// Getter/adder (`true`) or setter/remover (`false`) of a property or event
    Accessor(SymbolId, bool),
    /// Constructor closure
    Ctor(SymbolId),
}

/// Lowering context for one compilation unit
pub struct LowerCtx<'ctx> {
    pub(crate) model: &'ctx SemanticModel,
    pub(crate) overrides: &'ctx OverrideProvider,
    pub(crate) options: &'ctx LowerOptions,
    pub(crate) facts: &'ctx ProgramFacts<'ctx>,
    pub(crate) file: FileId,
    pub(crate) scopes: ScopeManager,
    pub(crate) member_names: FxHashMap<SymbolId, String>,
    pub(crate) functions: Vec<FunctionState>,
    pub(crate) types: Vec<TypeState>,
    /// Qualified names of exported types, in emission order
    pub(crate) exports: Vec<String>,
    /// Types emitted so far
    pub(crate) type_count: usize,
    /// Access paths of query range variables inside selector closures
    pub(crate) range_vars: FxHashMap<SymbolId, Expr>,
}

impl<'ctx> LowerCtx<'ctx> {
    /// Context for one file
    pub fn new(
        model: &'ctx SemanticModel,
        overrides: &'ctx OverrideProvider,
        options: &'ctx LowerOptions,
        facts: &'ctx ProgramFacts<'ctx>,
        file: FileId,
    ) -> Self {
        Self {
            model,
            overrides,
            options,
            facts,
            file,
            scopes: ScopeManager::new(),
            member_names: FxHashMap::default(),
            functions: Vec::new(),
            types: Vec::new(),
            exports: Vec::new(),
            type_count: 0,
            range_vars: FxHashMap::default(),
        }
    }

    pub(crate) fn at(&self, span: Span) -> FileSpan {
        FileSpan::new(self.file, span)
    }

    pub(crate) fn function(&self) -> Option<&FunctionState> {
        self.functions.last()
    }

    pub(crate) fn function_mut(&mut self, span: Span) -> LowerResult<&mut FunctionState> {
        let at = self.at(span);
        self.functions
            .last_mut()
            .ok_or_else(|| LowerError::unsupported("statement outside a function", at))
    }

    pub(crate) fn this_name(&self) -> Option<&Name> {
        self.function().and_then(|function| function.this.as_ref())
    }

    pub(crate) fn current_type(&self) -> Option<SymbolId> {
        self.types.last().map(|state| state.symbol)
    }

    /// Type-local bound to a member of the innermost type, if any
    pub(crate) fn type_local(&self, slot: MemberSlot) -> Option<&Name> {
        self.types.last().and_then(|state| state.locals.get(&slot))
    }

    /// Whether `member` belongs to the type being emitted
    pub(crate) fn is_own_member(&self, member: SymbolId) -> bool {
        self.current_type()
            .is_some_and(|ty| self.model.declaring_type(member) == Some(ty))
    }

    /// Open a function frame
    pub(crate) fn enter_function(&mut self, this: Option<Name>, span: FileSpan) {
        self.scopes.push(FrameKind::Function, Some(span));
        self.functions.push(FunctionState::new(this, span));
    }

    /// Open a closure frame that keeps the enclosing receiver
    pub(crate) fn enter_closure(&mut self, span: FileSpan) {
        let this = self.this_name().cloned();
        self.enter_function(this, span);
    }

    pub(crate) fn leave_function(&mut self) -> LowerResult<FunctionState> {
        let fallback = self.at(Span::detached());
        self.scopes
            .pop()
            .map_err(|error| LowerError::from_scope(error, fallback))?;
        self.functions
            .pop()
            .ok_or_else(|| LowerError::unsupported("unbalanced function frame", fallback))
    }

    /// Number of protected-region closures around the current statement
    pub(crate) fn closure_depth(&self) -> usize {
        self.function().map_or(0, |function| function.protected.len())
    }

    /// Reserve a synthetic name, suffixed on collision
    pub(crate) fn synthetic(&mut self, preferred: &str) -> Name {
        self.scopes.fresh(preferred)
    }

    /// Synthesize a temporary in the current function
    pub(crate) fn temp(&mut self) -> LowerResult<Name> {
        let fallback = self
            .function()
            .map_or_else(|| self.at(Span::detached()), |function| function.span);
        self.scopes
            .fresh_temp()
            .map_err(|error| LowerError::from_scope(error, fallback))
    }

    /// Declare a source symbol under its own name, renamed on collision
    pub(crate) fn declare(&mut self, symbol: SymbolId) -> Name {
        let name = self.model.name(symbol).to_owned();
        self.scopes.declare(symbol, &name)
    }

    /// Output name of a declared local, parameter or label
    pub(crate) fn resolve(&self, symbol: SymbolId, span: Span) -> LowerResult<Name> {
        self.scopes.resolve(symbol).cloned().ok_or_else(|| {
            LowerError::unsupported(
                format!("reference to undeclared `{}`", self.model.name(symbol)),
                self.at(span),
            )
        })
    }
}
