use std::{cell::RefCell, fmt::Debug, rc::Rc};

use rustc_hash::FxHashMap;

use super::Value;

/// One frame of name bindings. Lookups that miss fall back to the parent.
pub struct Scope {
    values: FxHashMap<String, Value>,
    parent: Option<Rc<RefCell<Scope>>>,
}

impl Scope {
    pub fn boxed(parent: Option<Rc<RefCell<Scope>>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new(parent)))
    }

    pub fn new(parent: Option<Rc<RefCell<Scope>>>) -> Self {
        Self {
            values: FxHashMap::default(),
            parent,
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.values.get(name) {
            Some(value.clone())
        } else if let Some(parent) = &self.parent {
            parent.borrow().get(name)
        } else {
            None
        }
    }

    /// Binds `name` in this frame, replacing an earlier binding of the same
    /// frame and shadowing any binding in enclosing frames.
    pub fn declare(&mut self, name: String, value: Value) {
        self.values.insert(name, value);
    }

    pub fn parent(&self) -> Option<&Rc<RefCell<Scope>>> {
        self.parent.as_ref()
    }
}

impl Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut values = self
            .values
            .iter()
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect::<Vec<_>>();
        values.sort();

        f.debug_struct(format!("Scope<{:?}>", std::ptr::from_ref(self)).as_str())
            .field("values", &values)
            .field("parent", &self.parent().map(|p| p.as_ptr()))
            .finish()
    }
}
