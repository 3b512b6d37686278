//! Layered execution context.
//!
//! The root scope holds `input` and the results of top-level nodes. Every loop
//! iteration pushes a child scope holding `loop_var`, `loop_index` and the
//! results of body nodes; lookups read through to the parent chain. Scopes
//! live in an arena and refer to their parent by index, so nested loops never
//! overwrite an outer binding.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Read access to named values.
pub trait Lookup {
    fn lookup(&self, key: &str) -> Option<&Value>;
}

impl Lookup for HashMap<String, Value> {
    fn lookup(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }
}

impl Lookup for Map<String, Value> {
    fn lookup(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug)]
struct Scope {
    parent: Option<ScopeId>,
    values: HashMap<String, Value>,
}

/// Arena of scopes; index 0 is the root.
#[derive(Debug)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    /// Create an arena whose root scope contains `input`.
    pub fn new(input: Value) -> Self {
        let mut values = HashMap::new();
        values.insert("input".to_string(), input);
        Self {
            scopes: vec![Scope {
                parent: None,
                values,
            }],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Push an empty child scope of `parent`.
    pub fn push(&mut self, parent: ScopeId) -> ScopeId {
        self.scopes.push(Scope {
            parent: Some(parent),
            values: HashMap::new(),
        });
        ScopeId(self.scopes.len() - 1)
    }

    /// Drop `scope` and every scope pushed after it. The root is never dropped.
    pub fn release(&mut self, scope: ScopeId) {
        if scope.0 > 0 && scope.0 < self.scopes.len() {
            self.scopes.truncate(scope.0);
        }
    }

    /// Write a value into `scope` itself, never into a parent.
    pub fn set(&mut self, scope: ScopeId, key: impl Into<String>, value: Value) {
        if let Some(s) = self.scopes.get_mut(scope.0) {
            s.values.insert(key.into(), value);
        }
    }

    /// Find `key` in `scope` or the nearest ancestor that defines it.
    pub fn get(&self, scope: ScopeId, key: &str) -> Option<&Value> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.scopes.get(id.0)?;
            if let Some(v) = s.values.get(key) {
                return Some(v);
            }
            current = s.parent;
        }
        None
    }

    /// Number of scopes between `scope` and the root.
    pub fn depth(&self, scope: ScopeId) -> usize {
        let mut depth = 0;
        let mut current = self.scopes.get(scope.0).and_then(|s| s.parent);
        while let Some(id) = current {
            depth += 1;
            current = self.scopes.get(id.0).and_then(|s| s.parent);
        }
        depth
    }

    pub fn view(&self, scope: ScopeId) -> ScopeView<'_> {
        ScopeView { arena: self, scope }
    }

    /// The root scope's values, consuming the arena.
    pub fn into_root(mut self) -> Map<String, Value> {
        self.scopes.truncate(1);
        self.scopes
            .pop()
            .map(|s| s.values.into_iter().collect())
            .unwrap_or_default()
    }
}

/// Read-only view of one scope and its ancestors.
#[derive(Clone, Copy)]
pub struct ScopeView<'a> {
    arena: &'a ScopeArena,
    scope: ScopeId,
}

impl Lookup for ScopeView<'_> {
    fn lookup(&self, key: &str) -> Option<&Value> {
        self.arena.get(self.scope, key)
    }
}

/// A few temporary bindings over another lookup, used for per-element
/// evaluation in transforms.
pub struct Layered<'a> {
    values: HashMap<String, Value>,
    parent: &'a dyn Lookup,
}

impl<'a> Layered<'a> {
    pub fn new(parent: &'a dyn Lookup) -> Self {
        Self {
            values: HashMap::new(),
            parent,
        }
    }

    pub fn bind(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

impl Lookup for Layered<'_> {
    fn lookup(&self, key: &str) -> Option<&Value> {
        self.values.get(key).or_else(|| self.parent.lookup(key))
    }
}
