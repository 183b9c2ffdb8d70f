use std::{collections::HashMap, sync::Arc};

use crate::{
    btree::table::BTreeTable,
    heap::HeapTable,
    storage::schema::Schema,
};

/// A registered database file, as a tagged variant so callers can
/// dispatch on the file kind.
#[derive(Clone)]
pub enum Table {
    Heap(Arc<HeapTable>),
    BTree(Arc<BTreeTable>),
}

impl Table {
    pub fn get_id(&self) -> u32 {
        match self {
            Table::Heap(t) => t.get_id(),
            Table::BTree(t) => t.get_id(),
        }
    }

    pub fn get_schema(&self) -> Schema {
        match self {
            Table::Heap(t) => t.get_schema(),
            Table::BTree(t) => t.get_schema(),
        }
    }

    pub fn pages_count(&self) -> usize {
        match self {
            Table::Heap(t) => t.pages_count(),
            Table::BTree(t) => t.pages_count(),
        }
    }
}

/// The table registry: table id to file, plus the name and primary-key
/// bookkeeping of the schema layer.
pub struct Catalog {
    tables: HashMap<u32, Table>,
    names: HashMap<String, u32>,
    primary_keys: HashMap<u32, String>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            names: HashMap::new(),
            primary_keys: HashMap::new(),
        }
    }

    /// Register a table under a name. A table re-registered under the
    /// same name replaces the previous binding.
    pub fn add_table(&mut self, table: Table, name: &str, primary_key: &str) {
        let table_id = table.get_id();
        self.tables.insert(table_id, table);
        self.names.insert(name.to_string(), table_id);
        self.primary_keys.insert(table_id, primary_key.to_string());
    }

    pub fn get_table(&self, table_id: &u32) -> Option<Table> {
        self.tables.get(table_id).cloned()
    }

    pub fn get_table_id(&self, name: &str) -> Option<u32> {
        self.names.get(name).copied()
    }

    pub fn get_schema(&self, table_id: &u32) -> Option<Schema> {
        self.tables.get(table_id).map(|t| t.get_schema())
    }

    pub fn get_primary_key(&self, table_id: &u32) -> Option<String> {
        self.primary_keys.get(table_id).cloned()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
        self.names.clear();
        self.primary_keys.clear();
    }
}
