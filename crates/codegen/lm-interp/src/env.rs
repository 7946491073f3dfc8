//! Lexical scopes

use crate::value::Value;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Variable slot, shared by every closure that captured it
pub type Slot = Rc<RefCell<Value>>;

/// One block's locals, linked to the enclosing block
#[derive(Default)]
pub struct Scope {
    vars: RefCell<FxHashMap<String, Slot>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    /// Outermost scope of a chunk
    pub fn root() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Scope nested in `parent`
    pub fn child(parent: &Rc<Self>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::default(),
            parent: Some(Rc::clone(parent)),
        })
    }

    /// Introduce a local; a redeclaration in the same block gets a new slot
    pub fn declare(&self, name: &str, value: Value) {
        self.vars
            .borrow_mut()
            .insert(name.to_owned(), Rc::new(RefCell::new(value)));
    }

    /// Nearest slot for `name`
    pub fn lookup(&self, name: &str) -> Option<Slot> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(slot) = current.vars.borrow().get(name) {
                return Some(Rc::clone(slot));
            }
            scope = current.parent.as_deref();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_scope_shadows_and_shares() {
        let root = Scope::root();
        root.declare("x", Value::Int(1));
        let inner = Scope::child(&root);
        let outer_slot = inner.lookup("x");
        inner.declare("x", Value::Int(2));

        assert_eq!(inner.lookup("x").map(|slot| slot.borrow().clone()), Some(Value::Int(2)));
        assert_eq!(root.lookup("x").map(|slot| slot.borrow().clone()), Some(Value::Int(1)));
        if let Some(slot) = outer_slot {
            *slot.borrow_mut() = Value::Int(5);
        }
        assert_eq!(root.lookup("x").map(|slot| slot.borrow().clone()), Some(Value::Int(5)));
        assert!(inner.lookup("y").is_none());
    }
}
