use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One exclusive in-process lock per table, created on first use.
/// Writers hold a table's lock across their exists-check and write.
#[derive(Default)]
pub(crate) struct TableLocks {
    tables: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TableLocks {
    pub(crate) fn get(&self, table: &str) -> Arc<Mutex<()>> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.tables.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
