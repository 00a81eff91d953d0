#![deny(missing_docs)]
//! A minimal stand-in for the CFG subsystem's jump-table analysis.
//!
//! Switch/case recognition needs to know, for a given jump-table base
//! address, which case index maps to which target address. A real
//! embedding supplies this from its own jump-table recovery pass; this
//! module just carries the map.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::il::Addr;

/// A single jump table: an ordered list of case targets, indexed by the
/// (already bounds-checked) case number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JumpTable {
    /// The jump target for each case index, in order.
    pub entries: Vec<Addr>,
}

impl JumpTable {
    /// Creates a jump table from a list of targets.
    pub fn new(entries: Vec<Addr>) -> Self {
        Self { entries }
    }

    /// Returns the target for `case_index`, if in range.
    pub fn target(&self, case_index: usize) -> Option<Addr> {
        self.entries.get(case_index).copied()
    }

    /// The number of cases in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The jump tables known to the engine for one function, keyed by the
/// address of the indirect jump that reads them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JumpTables {
    tables: HashMap<Addr, JumpTable>,
}

impl JumpTables {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Registers a jump table at `addr`.
    pub fn insert(&mut self, addr: Addr, table: JumpTable) {
        self.tables.insert(addr, table);
    }

    /// Looks up the jump table at `addr`.
    pub fn get(&self, addr: Addr) -> Option<&JumpTable> {
        self.tables.get(&addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jump_table_target_lookup() {
        let table = JumpTable::new(vec![0x10, 0x20, 0x30]);
        assert_eq!(table.target(1), Some(0x20));
        assert_eq!(table.target(3), None);
    }

    #[test]
    fn test_jump_tables_insert_and_get() {
        let mut tables = JumpTables::new();
        tables.insert(0x1000, JumpTable::new(vec![0x10, 0x20]));
        assert_eq!(tables.get(0x1000).map(JumpTable::len), Some(2));
        assert!(tables.get(0x2000).is_none());
    }
}
