//! Scope tree for naming locals during lowering
//!
//! Every name the lowering passes declare in the output goes through a
//! [`ScopeManager`]. Frames form a tree with parent links: a type frame for
//! each emitted type closure and a function frame for each emitted function.
//! A name is taken when any frame on the chain to the root holds it, so a
//! nested closure never shadows something an outer function still reads.
//!
//! Names declared in a function frame are handed to the parent function
//! frame when it pops. They stay reserved until the outermost function of
//! the chain pops, which keeps every identifier unique for a function's whole
//! lifetime, nested closures included.

mod error;
pub mod reserved;

pub use error::ScopeError;

use la_arena::{Arena, Idx};
use lm_source::SymbolId;
use lm_span::FileSpan;
use lm_target::Name;
use rustc_hash::{FxHashMap, FxHashSet};
use std::{iter, mem};
use tracing::{debug, trace};

/// Number of synthetic temporaries available to one function chain
pub const TEMP_POOL: usize = 256;

/// Unique identifier for a frame
pub type FrameId = Idx<FrameData>;

/// What a frame encloses
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameKind {
    /// A compilation unit or type closure; functions below it start fresh
    Type,
    /// A function or closure body
    Function,
}

/// One frame of the scope tree
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Enclosing frame
    pub parent: Option<FrameId>,
    /// Frame kind
    pub kind: FrameKind,
    /// Names declared here, plus those handed up by popped child functions
    pub names: FxHashSet<String>,
    /// Output names of source symbols declared here
    pub symbols: FxHashMap<SymbolId, Name>,
    /// Next temporary index to try
    pub next_temp: usize,
    /// Location of the construct that opened the frame
    pub span: Option<FileSpan>,
}

impl FrameData {
    fn new(parent: Option<FrameId>, kind: FrameKind, next_temp: usize, span: Option<FileSpan>) -> Self {
        Self {
            parent,
            kind,
            names: FxHashSet::default(),
            symbols: FxHashMap::default(),
            next_temp,
            span,
        }
    }
}

/// Scope stack for one compilation unit
#[derive(Debug)]
pub struct ScopeManager {
    frames: Arena<FrameData>,
    current: FrameId,
}

impl Default for ScopeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeManager {
    /// Manager holding only the unit frame
    pub fn new() -> Self {
        let mut frames = Arena::new();
        let current = frames.alloc(FrameData::new(None, FrameKind::Type, 0, None));
        Self { frames, current }
    }

    /// Current frame
    pub fn current(&self) -> FrameId {
        self.current
    }

    /// Frame data
    pub fn frame(&self, id: FrameId) -> &FrameData {
        &self.frames[id]
    }

    /// Number of frames between the current one and the unit frame
    pub fn depth(&self) -> usize {
        self.chain().count() - 1
    }

    fn chain(&self) -> impl Iterator<Item = &FrameData> {
        let mut next = Some(self.current);
        iter::from_fn(move || {
            let id = next?;
            let frame = &self.frames[id];
            next = frame.parent;
            Some(frame)
        })
    }

    /// Open a frame below the current one
    pub fn push(&mut self, kind: FrameKind, span: Option<FileSpan>) -> FrameId {
        let parent = &self.frames[self.current];
        let next_temp = match (parent.kind, kind) {
            (FrameKind::Function, FrameKind::Function) => parent.next_temp,
            _ => 0,
        };
        let id = self
            .frames
            .alloc(FrameData::new(Some(self.current), kind, next_temp, span));
        self.current = id;
        id
    }

    /// Close the current frame
    ///
    /// A function nested in another function hands its names and temporary
    /// counter to its parent.
    pub fn pop(&mut self) -> Result<(), ScopeError> {
        let popped = self.current;
        let Some(parent) = self.frames[popped].parent else {
            return Err(ScopeError::Underflow);
        };
        if self.frames[popped].kind == FrameKind::Function && self.frames[parent].kind == FrameKind::Function {
            let names = mem::take(&mut self.frames[popped].names);
            let next_temp = self.frames[popped].next_temp;
            let parent_frame = &mut self.frames[parent];
            parent_frame.names.extend(names);
            parent_frame.next_temp = parent_frame.next_temp.max(next_temp);
        }
        self.current = parent;
        Ok(())
    }

    /// Whether declaring `name` here would collide
    pub fn is_taken(&self, name: &str) -> bool {
        reserved::is_reserved(name) || self.chain().any(|frame| frame.names.contains(name))
    }

    /// Register `name` in the current frame; `false` if it is taken
    pub fn reserve(&mut self, name: &str) -> bool {
        if self.is_taken(name) {
            return false;
        }
        self.frames[self.current].names.insert(name.to_owned());
        true
    }

    /// Register `name`, or the first free `name_N` after it
    pub fn fresh(&mut self, preferred: &str) -> Name {
        if self.reserve(preferred) {
            return Name::new(preferred);
        }
        let mut suffix = 1_usize;
        loop {
            let candidate = format!("{preferred}_{suffix}");
            if self.reserve(&candidate) {
                trace!(preferred, renamed = %candidate, "renamed colliding local");
                return Name::new(candidate);
            }
            suffix += 1;
        }
    }

    /// Declare a source symbol, renaming on collision
    ///
    /// Later references must go through [`Self::resolve`].
    pub fn declare(&mut self, symbol: SymbolId, preferred: &str) -> Name {
        let name = self.fresh(preferred);
        self.bind(symbol, name.clone());
        name
    }

    /// Record the output name of a symbol without reserving anything
    pub fn bind(&mut self, symbol: SymbolId, name: Name) {
        self.frames[self.current].symbols.insert(symbol, name);
    }

    /// Output name of a declared symbol, searching outwards
    pub fn resolve(&self, symbol: SymbolId) -> Option<&Name> {
        self.chain().find_map(|frame| frame.symbols.get(&symbol))
    }

    /// Synthesize a temporary from the fixed pool
    pub fn fresh_temp(&mut self) -> Result<Name, ScopeError> {
        loop {
            let index = self.frames[self.current].next_temp;
            if index >= TEMP_POOL {
                let span = self.chain().find_map(|frame| frame.span);
                debug!(pool = TEMP_POOL, "temporary pool exhausted");
                return Err(ScopeError::NamePoolExhausted { pool: TEMP_POOL, span });
            }
            self.frames[self.current].next_temp = index + 1;
            let candidate = format!("t{index:02x}");
            if self.reserve(&candidate) {
                return Ok(Name::new(candidate));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_and_runtime_globals_are_renamed() {
        let mut scopes = ScopeManager::new();
        scopes.push(FrameKind::Function, None);
        assert_eq!(scopes.fresh("end").as_str(), "end_1");
        assert_eq!(scopes.fresh("System").as_str(), "System_1");
        assert_eq!(scopes.fresh("value").as_str(), "value");
        assert_eq!(scopes.fresh("value").as_str(), "value_1");
    }

    #[test]
    fn test_nested_closure_names_stay_reserved_until_outermost_pops() {
        let mut scopes = ScopeManager::new();
        scopes.push(FrameKind::Type, None);
        scopes.push(FrameKind::Function, None);
        let outer = scopes.fresh("item");
        scopes.push(FrameKind::Function, None);
        let inner = scopes.fresh("item");
        let temp = scopes.fresh_temp().unwrap_or_else(|_| Name::new("?"));
        let Ok(_) = scopes.pop() else {
            panic!("scope stack underflow");
        };
        let after = scopes.fresh("item");
        let next_temp = scopes.fresh_temp().unwrap_or_else(|_| Name::new("?"));
        assert_eq!(outer.as_str(), "item");
        assert_eq!(inner.as_str(), "item_1");
        assert_eq!(after.as_str(), "item_2");
        assert_eq!(temp.as_str(), "t00");
        assert_eq!(next_temp.as_str(), "t01");

        let Ok(_) = scopes.pop() else {
            panic!("scope stack underflow");
        };
        scopes.push(FrameKind::Function, None);
        assert_eq!(scopes.fresh("item").as_str(), "item");
    }

    #[test]
    fn test_type_level_names_are_visible_to_methods() {
        let mut scopes = ScopeManager::new();
        scopes.push(FrameKind::Type, None);
        assert!(scopes.reserve("Count"));
        scopes.push(FrameKind::Function, None);
        assert!(!scopes.reserve("Count"));
        assert_eq!(scopes.fresh("Count").as_str(), "Count_1");
    }

    #[test]
    fn test_resolve_follows_declaration() {
        let mut scopes = ScopeManager::new();
        scopes.push(FrameKind::Function, None);
        let first = scopes.declare(SymbolId(7), "repeat");
        scopes.push(FrameKind::Function, None);
        assert_eq!(scopes.resolve(SymbolId(7)), Some(&first));
        assert_eq!(first.as_str(), "repeat_1");
        assert_eq!(scopes.resolve(SymbolId(8)), None);
    }

    #[test]
    fn test_pool_exhaustion_reports_function() {
        let span = FileSpan::default();
        let mut scopes = ScopeManager::new();
        scopes.push(FrameKind::Function, Some(span));
        let mut seen = FxHashSet::default();
        for _ in 0..TEMP_POOL {
            let name = scopes.fresh_temp();
            let Ok(_) = name else {
                panic!("unexpected error");
            };
            assert!(seen.insert(name.map(|name| name.0).unwrap_or_default()));
        }
        assert_eq!(
            scopes.fresh_temp(),
            Err(ScopeError::NamePoolExhausted {
                pool: TEMP_POOL,
                span: Some(span)
            })
        );
    }

    #[test]
    fn test_pop_of_unit_frame_fails() {
        let mut scopes = ScopeManager::new();
        assert_eq!(scopes.pop(), Err(ScopeError::Underflow));
        assert_eq!(scopes.depth(), 0);
    }
}
