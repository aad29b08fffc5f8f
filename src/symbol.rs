use crate::error::{LispError, LispResult};
use crate::value::{SymbolId, ValueRef};

/// One interned name.
pub struct SymbolEntry {
    name: String,
    /// The unique `Symbol` value for this name.
    node: ValueRef,
    /// Global binding; `ValueRef::UNBOUND` until assigned.
    binding: ValueRef,
}

/// Interned symbol table with a fixed number of entries.
///
/// Entries are never removed, and each carries the name's single global
/// binding. Interning a new name also needs an arena slot, so the allocating
/// half of `intern` lives on `Machine`; this table only stores entries.
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
    capacity: usize,
    max_name_len: usize,
}

impl SymbolTable {
    pub fn new(capacity: usize, max_name_len: usize) -> Self {
        SymbolTable {
            entries: Vec::with_capacity(capacity),
            capacity,
            max_name_len,
        }
    }

    /// Look up a name without interning it.
    pub fn lookup(&self, name: &str) -> Option<ValueRef> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.node)
    }

    /// Reject names the table could never hold, before any slot is spent.
    pub fn validate_name(&self, name: &str) -> LispResult<()> {
        if name.is_empty() {
            return Err(LispError::Syntax("empty symbol name".into()));
        }
        if name.len() > self.max_name_len {
            return Err(LispError::NameTooLong {
                name: name.to_string(),
                max: self.max_name_len,
            });
        }
        if self.entries.len() >= self.capacity {
            return Err(LispError::OutOfSymbols { capacity: self.capacity });
        }
        Ok(())
    }

    /// Id the next inserted name will receive.
    pub fn next_id(&self) -> SymbolId {
        SymbolId(self.entries.len() as u32)
    }

    /// Add an entry for `name` whose symbol value lives in `node`.
    pub fn insert(&mut self, name: &str, node: ValueRef) -> LispResult<SymbolId> {
        self.validate_name(name)?;
        let id = self.next_id();
        self.entries.push(SymbolEntry {
            name: name.to_string(),
            node,
            binding: ValueRef::UNBOUND,
        });
        Ok(id)
    }

    pub fn name(&self, id: SymbolId) -> &str {
        self.entries.get(id.0 as usize).map(|e| e.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn binding(&self, id: SymbolId) -> LispResult<ValueRef> {
        self.entry(id).map(|e| e.binding)
    }

    /// Set a global binding. Write-once unless `initializing` is set.
    pub fn bind(&mut self, id: SymbolId, value: ValueRef, initializing: bool) -> LispResult<()> {
        let entry = self.entry_mut(id)?;
        if entry.binding != ValueRef::UNBOUND && !initializing {
            return Err(LispError::Redefinition(entry.name.clone()));
        }
        entry.binding = value;
        Ok(())
    }

    /// All assigned global bindings. These are collector roots.
    pub fn bindings(&self) -> impl Iterator<Item = ValueRef> + '_ {
        self.entries
            .iter()
            .map(|e| e.binding)
            .filter(|&b| b != ValueRef::UNBOUND)
    }

    /// `(id, name, binding)` for every entry, in interning order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &str, ValueRef)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (SymbolId(i as u32), e.name.as_str(), e.binding))
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    fn entry(&self, id: SymbolId) -> LispResult<&SymbolEntry> {
        self.entries
            .get(id.0 as usize)
            .ok_or_else(|| LispError::Unreachable(format!("no symbol entry for {:?}", id)))
    }

    fn entry_mut(&mut self, id: SymbolId) -> LispResult<&mut SymbolEntry> {
        self.entries
            .get_mut(id.0 as usize)
            .ok_or_else(|| LispError::Unreachable(format!("no symbol entry for {:?}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(i: u32) -> ValueRef {
        ValueRef::new(i, 0)
    }

    #[test]
    fn insert_then_lookup() {
        let mut table = SymbolTable::new(4, 15);
        let id = table.insert("foo", node(10)).unwrap();
        assert_eq!(table.name(id), "foo");
        assert_eq!(table.lookup("foo"), Some(node(10)));
        assert_eq!(table.lookup("bar"), None);
        assert_eq!(table.binding(id).unwrap(), ValueRef::UNBOUND);
    }

    #[test]
    fn full_table_reports_out_of_symbols() {
        let mut table = SymbolTable::new(1, 15);
        table.insert("a", node(3)).unwrap();
        assert_eq!(table.insert("b", node(4)), Err(LispError::OutOfSymbols { capacity: 1 }));
    }

    #[test]
    fn long_names_are_rejected() {
        let table = SymbolTable::new(4, 3);
        assert!(matches!(table.validate_name("abcd"), Err(LispError::NameTooLong { max: 3, .. })));
        assert!(table.validate_name("abc").is_ok());
    }

    #[test]
    fn bindings_are_write_once_outside_initialization() {
        let mut table = SymbolTable::new(4, 15);
        let id = table.insert("x", node(3)).unwrap();
        table.bind(id, ValueRef::TRUE, false).unwrap();
        assert_eq!(table.bind(id, ValueRef::NIL, false), Err(LispError::Redefinition("x".into())));
        assert_eq!(table.binding(id).unwrap(), ValueRef::TRUE);

        table.bind(id, ValueRef::NIL, true).unwrap();
        assert_eq!(table.binding(id).unwrap(), ValueRef::NIL);
    }

    #[test]
    fn unbound_entries_are_not_roots() {
        let mut table = SymbolTable::new(4, 15);
        let a = table.insert("a", node(3)).unwrap();
        table.insert("b", node(4)).unwrap();
        table.bind(a, ValueRef::TRUE, false).unwrap();
        assert_eq!(table.bindings().collect::<Vec<_>>(), vec![ValueRef::TRUE]);
    }
}
