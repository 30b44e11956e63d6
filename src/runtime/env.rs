use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::value::Value;

/// A scope: module globals, a function frame, or a comprehension.
///
/// Lookups walk outwards through `parent`; assignments always bind in the
/// innermost scope.
#[derive(Default)]
pub struct Env {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Env>>,
}

impl Env {
    pub fn global() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn child(parent: &Rc<Env>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
        })
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.get(name))
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.vars.borrow_mut().insert(name.into(), value);
    }

    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self.vars.borrow().keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Drops every binding, breaking reference cycles through closures.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.vars.borrow_mut());
        drop(drained);
    }
}
