//! Compile-time symbol tables
//!
//! Every block gets a table mapping its parameter names to scope slots. Tables
//! are chained to the table of the block that references them and lookups
//! walk outward. Slots are allocated from a single counter per top-level
//! template, so one flat runtime scope frame covers the whole template.
//! Slot 0 always holds `self`.

use indexmap::IndexMap;

pub const SELF_SYMBOL: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(usize);

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    parent: Option<TableId>,
    locals: IndexMap<String, usize>,
    named: IndexMap<String, usize>,
    yields: IndexMap<String, usize>,
}

impl SymbolTable {
    pub fn parent(&self) -> Option<TableId> {
        self.parent
    }

    pub fn locals(&self) -> impl Iterator<Item = (&str, usize)> {
        self.locals.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// All symbol tables of one top-level template
#[derive(Debug, Clone)]
pub struct SymbolTables {
    tables: Vec<SymbolTable>,
    size: usize,
}

impl SymbolTables {
    fn with_root(root: SymbolTable, size: usize) -> (Self, TableId) {
        (
            Self {
                tables: vec![root],
                size,
            },
            TableId(0),
        )
    }

    /// Root table for an entry point: only `self`
    pub fn for_entry_point() -> (Self, TableId) {
        Self::with_root(SymbolTable::default(), 1)
    }

    /// Root table for a layout: named parameters, then yield targets
    pub fn for_layout(named: &[String], yields: &[String]) -> (Self, TableId) {
        let mut root = SymbolTable::default();
        let mut size = 1;
        for name in named {
            root.named.entry(name.clone()).or_insert_with(|| {
                size += 1;
                size - 1
            });
        }
        for name in yields {
            root.yields.entry(name.clone()).or_insert_with(|| {
                size += 1;
                size - 1
            });
        }
        Self::with_root(root, size)
    }

    /// Create the table for a nested block with positional parameters
    pub fn init_for_block(&mut self, parent: TableId, locals: &[String]) -> TableId {
        let mut table = SymbolTable {
            parent: Some(parent),
            ..SymbolTable::default()
        };
        for name in locals {
            let slot = self.size;
            self.size += 1;
            table.locals.insert(name.clone(), slot);
        }
        self.tables.push(table);
        TableId(self.tables.len() - 1)
    }

    pub fn table(&self, id: TableId) -> &SymbolTable {
        &self.tables[id.0]
    }

    /// Number of runtime slots, `self` included
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get_local(&self, table: TableId, name: &str) -> Option<usize> {
        self.lookup(table, |t| t.locals.get(name).copied())
    }

    pub fn get_named(&self, table: TableId, name: &str) -> Option<usize> {
        self.lookup(table, |t| t.named.get(name).copied())
    }

    pub fn get_yield(&self, table: TableId, name: &str) -> Option<usize> {
        self.lookup(table, |t| t.yields.get(name).copied())
    }

    fn lookup(&self, table: TableId, find: impl Fn(&SymbolTable) -> Option<usize>) -> Option<usize> {
        let mut current = Some(table);
        while let Some(id) = current {
            let table = &self.tables[id.0];
            if let Some(symbol) = find(table) {
                return Some(symbol);
            }
            current = table.parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_layout_slots_follow_self() {
        let (tables, root) = SymbolTables::for_layout(&names(&["title", "body"]), &names(&["default"]));
        assert_eq!(tables.get_named(root, "title"), Some(1));
        assert_eq!(tables.get_named(root, "body"), Some(2));
        assert_eq!(tables.get_yield(root, "default"), Some(3));
        assert_eq!(tables.size(), 4);
    }

    #[test]
    fn test_nested_lookup_walks_outward() {
        let (mut tables, root) = SymbolTables::for_layout(&names(&["title"]), &[]);
        let outer = tables.init_for_block(root, &names(&["item"]));
        let inner = tables.init_for_block(outer, &names(&["child"]));

        assert_eq!(tables.get_local(inner, "child"), Some(3));
        assert_eq!(tables.get_local(inner, "item"), Some(2));
        assert_eq!(tables.get_named(inner, "title"), Some(1));
        assert_eq!(tables.get_local(outer, "child"), None);
        assert_eq!(tables.table(inner).parent(), Some(outer));
    }

    #[test]
    fn test_entry_point_has_no_named() {
        let (tables, root) = SymbolTables::for_entry_point();
        assert_eq!(tables.get_named(root, "title"), None);
        assert_eq!(tables.get_yield(root, "default"), None);
        assert_eq!(tables.size(), 1);
    }
}
