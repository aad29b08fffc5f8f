//! Explicit root stack for the collector.
//!
//! Handles held in Rust locals are invisible to the collector, so the
//! evaluator pushes every handle it keeps across an allocation and pops back
//! to a recorded depth when it returns. Global bindings are roots too, but
//! they are read straight from the symbol table at collection time.

use crate::value::ValueRef;

/// Depth of the root stack at the time a scope was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a scope must be restored"]
pub struct RootScope(usize);

/// Root set for garbage collection.
pub struct RootSet {
    stack: Vec<ValueRef>,
}

impl RootSet {
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    /// Record the current depth so it can be restored later.
    pub fn scope(&self) -> RootScope {
        RootScope(self.stack.len())
    }

    /// Pop every root pushed since `scope` was opened.
    pub fn restore(&mut self, scope: RootScope) {
        self.stack.truncate(scope.0);
    }

    pub fn push(&mut self, value: ValueRef) {
        self.stack.push(value);
    }

    pub fn extend(&mut self, values: &[ValueRef]) {
        self.stack.extend_from_slice(values);
    }

    pub fn iter(&self) -> impl Iterator<Item = ValueRef> + '_ {
        self.stack.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

impl Default for RootSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_set_creation() {
        let roots = RootSet::new();
        assert_eq!(roots.len(), 0);
        assert!(roots.is_empty());
    }

    #[test]
    fn test_scope_restore_pops_nested_pushes() {
        let mut roots = RootSet::new();
        roots.push(ValueRef::TRUE);

        let outer = roots.scope();
        roots.push(ValueRef::NIL);
        let inner = roots.scope();
        roots.extend(&[ValueRef::NIL, ValueRef::TRUE]);
        assert_eq!(roots.len(), 4);

        roots.restore(inner);
        assert_eq!(roots.len(), 2);
        roots.restore(outer);
        assert_eq!(roots.iter().collect::<Vec<_>>(), vec![ValueRef::TRUE]);
    }
}
