//! Engine environment: value handles and scoped retention.
//!
//! The env stands in for the engine side of the bridge. Completion callbacks
//! may create engine-owned values through it; every dispatch is bracketed by
//! a handle scope, so values created across the asynchronous boundary are
//! released when the callback exits, on every exit path.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tracing::trace;

/// Handle to an engine-owned value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueRef(u64);

struct EnvState {
    values: HashMap<u64, Value>,
    /// Open scopes, innermost last. Each layer holds the ids created while it
    /// was innermost.
    scopes: Vec<Vec<u64>>,
    next_value: u64,
}

/// The engine's value table plus its scope stack.
pub struct EngineEnv {
    state: Mutex<EnvState>,
}

impl EngineEnv {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EnvState {
                values: HashMap::new(),
                scopes: Vec::new(),
                next_value: 1,
            }),
        }
    }

    /// Create a value owned by the innermost open scope. With no scope open
    /// the value is a root: it lives until the env is dropped.
    pub fn create_value(&self, payload: Value) -> ValueRef {
        let mut state = self.state.lock().unwrap();
        let id = state.next_value;
        state.next_value += 1;
        state.values.insert(id, payload);
        if let Some(scope) = state.scopes.last_mut() {
            scope.push(id);
        }
        ValueRef(id)
    }

    /// Look up a value. None once its owning scope has closed.
    pub fn value(&self, value_ref: ValueRef) -> Option<Value> {
        self.state.lock().unwrap().values.get(&value_ref.0).cloned()
    }

    /// Values currently alive, root and scoped.
    pub fn live_values(&self) -> usize {
        self.state.lock().unwrap().values.len()
    }

    /// Scopes currently open.
    pub fn open_scopes(&self) -> usize {
        self.state.lock().unwrap().scopes.len()
    }

    /// Open a scope. Dropping the guard releases every value created while
    /// the scope was innermost, including values of inner scopes left open.
    pub fn open_scope(&self) -> HandleScope<'_> {
        let mut state = self.state.lock().unwrap();
        state.scopes.push(Vec::new());
        let depth = state.scopes.len();
        trace!(depth, "scope opened");
        HandleScope { env: self, depth }
    }

    fn close_scope(&self, depth: usize) {
        let mut state = self.state.lock().unwrap();
        let mut released = 0;
        while state.scopes.len() >= depth {
            let Some(layer) = state.scopes.pop() else {
                break;
            };
            for id in layer {
                if state.values.remove(&id).is_some() {
                    released += 1;
                }
            }
        }
        trace!(depth, released, "scope closed");
    }
}

impl Default for EngineEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one open scope. Close runs on drop, so the scope is closed
/// no matter how the bracketed callback exits, unwind included.
pub struct HandleScope<'env> {
    env: &'env EngineEnv,
    depth: usize,
}

impl Drop for HandleScope<'_> {
    fn drop(&mut self) {
        self.env.close_scope(self.depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scope_releases_its_values_on_drop() {
        let env = EngineEnv::new();
        let root = env.create_value(json!("root"));

        {
            let _scope = env.open_scope();
            env.create_value(json!(1));
            env.create_value(json!(2));
            assert_eq!(env.live_values(), 3);
        }

        assert_eq!(env.live_values(), 1);
        assert!(env.value(root).is_some());
    }

    #[test]
    fn dropping_outer_scope_releases_inner_scopes_left_open() {
        let env = EngineEnv::new();

        let outer = env.open_scope();
        env.create_value(json!("outer"));
        let inner = env.open_scope();
        env.create_value(json!("inner"));

        // Drop out of order: outer first must sweep the inner layer too.
        drop(outer);
        assert_eq!(env.live_values(), 0);
        assert_eq!(env.open_scopes(), 0);
        drop(inner);
        assert_eq!(env.open_scopes(), 0);
    }

    #[test]
    fn values_resolve_until_released() {
        let env = EngineEnv::new();
        let scope = env.open_scope();
        let v = env.create_value(json!({"answer": 42}));
        assert_eq!(env.value(v), Some(json!({"answer": 42})));
        drop(scope);
        assert_eq!(env.value(v), None);
    }
}
