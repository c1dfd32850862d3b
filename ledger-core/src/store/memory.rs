//! In-process store backed by ordered maps

use super::{entry_id, index_entries, IndexKey, LedgerStore, LedgerView, WriteSet};
use crate::{
    error::{Error, Result},
    types::Record,
};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
struct Tables {
    records: BTreeMap<u64, Record>,
    indices: BTreeSet<Vec<u8>>,
    last_id: u64,
}

/// Volatile store; contents are lost when dropped
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    /// Held across check-then-commit; the table lock only covers the apply
    writer: Mutex<()>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(&self, writes: WriteSet) -> Result<()> {
        let mut tables = self.tables.write();

        // Validate the whole set before touching anything
        for record in writes.records() {
            if tables.records.contains_key(&record.id()) {
                return Err(Error::Corrupt(format!(
                    "{} {} already exists",
                    record.kind(),
                    record.id()
                )));
            }
        }

        for record in writes.into_records() {
            tables.indices.extend(index_entries(&record));
            tables.last_id = tables.last_id.max(record.id());
            tables.records.insert(record.id(), record);
        }

        Ok(())
    }
}

impl LedgerStore for MemoryStore {
    type View<'a> = MemoryView<'a>;

    fn view(&self) -> Result<MemoryView<'_>> {
        Ok(MemoryView {
            tables: self.tables.read(),
        })
    }

    fn commit_with<T, F>(&self, build: F) -> Result<T>
    where
        F: FnOnce(&Self::View<'_>) -> Result<(WriteSet, T)>,
    {
        let _writer = self.writer.lock();
        let (writes, output) = {
            let view = self.view()?;
            build(&view)?
        };
        self.apply(writes)?;
        Ok(output)
    }

    fn last_id(&self) -> Result<u64> {
        Ok(self.tables.read().last_id)
    }
}

/// Read guard over the tables; writers wait until it is dropped
pub struct MemoryView<'a> {
    tables: RwLockReadGuard<'a, Tables>,
}

impl LedgerView for MemoryView<'_> {
    fn record(&self, id: u64) -> Result<Option<Record>> {
        Ok(self.tables.records.get(&id).cloned())
    }

    fn scan(&self, key: &IndexKey) -> Box<dyn Iterator<Item = Result<u64>> + '_> {
        let prefix = key.prefix().to_vec();
        Box::new(
            self.tables
                .indices
                .range(prefix.clone()..)
                .take_while(move |entry| entry.starts_with(&prefix))
                .map(|entry| entry_id(entry)),
        )
    }
}
