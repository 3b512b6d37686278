use serde_json::Value;

use crate::error::{json_type, ExecError, ValidationError};
use crate::graph::LoopConfig;
use crate::resolver::{self, PathRef};
use crate::scope::{Lookup, ScopeArena, ScopeId};

/// Scope key bound to the current element.
pub const LOOP_VAR: &str = "loop_var";
/// Scope key bound to the current zero-based position.
pub const LOOP_INDEX: &str = "loop_index";

/// Resolves a Loop node's iteration source and binds per-iteration scopes.
///
/// Running the body itself is the engine's job; this executor only knows how
/// to turn the source into items and an item into a child scope.
#[derive(Debug, Clone)]
pub struct LoopExecutor {
    source: PathRef,
    max_iterations: Option<usize>,
    item_alias: Option<String>,
}

impl LoopExecutor {
    pub fn build(node_id: &str, cfg: &LoopConfig) -> Result<Self, ValidationError> {
        let source = resolver::parse_reference(&cfg.iteration_source).map_err(|e| {
            ValidationError::LoopSource {
                node: node_id.to_string(),
                reference: cfg.iteration_source.clone(),
                reason: e.to_string(),
            }
        })?;
        let invalid = |reason: &str| ValidationError::InvalidConfig {
            node: node_id.to_string(),
            reason: reason.to_string(),
        };
        if cfg.max_iterations == Some(0) {
            return Err(invalid("max_iterations must be positive"));
        }
        if let Some(alias) = &cfg.item_alias {
            let simple = PathRef::parse(alias)
                .map(|p| p.segments().len() == 1)
                .unwrap_or(false);
            if !simple || alias == "input" {
                return Err(invalid("item_alias must be a plain name other than 'input'"));
            }
        }
        Ok(Self {
            source,
            max_iterations: cfg.max_iterations,
            item_alias: cfg.item_alias.clone(),
        })
    }

    pub fn source(&self) -> &PathRef {
        &self.source
    }

    /// Effective iteration cap.
    pub fn limit(&self, default_max: usize) -> usize {
        self.max_iterations.unwrap_or(default_max)
    }

    /// Resolve the iteration source to its elements.
    pub fn items(&self, scope: &dyn Lookup) -> Result<Vec<Value>, ExecError> {
        match self.source.resolve(scope)? {
            Value::Array(items) => Ok(items),
            other => Err(ExecError::NotAnArray {
                path: self.source.as_str().to_string(),
                found: json_type(&other).to_string(),
            }),
        }
    }

    /// Push the child scope for one iteration.
    pub fn enter(
        &self,
        arena: &mut ScopeArena,
        parent: ScopeId,
        index: usize,
        item: Value,
    ) -> ScopeId {
        let scope = arena.push(parent);
        if let Some(alias) = &self.item_alias {
            arena.set(scope, alias.clone(), item.clone());
        }
        arena.set(scope, LOOP_VAR, item);
        arena.set(scope, LOOP_INDEX, Value::from(index));
        scope
    }
}
