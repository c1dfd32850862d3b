//! Durable store using RocksDB
//!
//! # Column Families
//!
//! - `records` - Ledger records (key: record_id, big-endian)
//! - `indices` - Secondary indices (key: tag || owner || record_id, empty value)
//! - `meta` - Bookkeeping (`last_id`)

use super::{entry_id, index_entries, IndexKey, LedgerStore, LedgerView, WriteSet};
use crate::{
    error::{Error, Result},
    types::Record,
    Config,
};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    Snapshot, WriteBatch, WriteOptions, DB,
};

/// Column family names
const CF_RECORDS: &str = "records";
const CF_INDICES: &str = "indices";
const CF_META: &str = "meta";

const KEY_LAST_ID: &[u8] = b"last_id";

/// Storage wrapper for RocksDB
pub struct RocksStore {
    db: DB,
    sync_writes: bool,
    /// Serializes check-then-commit sections
    writer: Mutex<()>,
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;
        let tuning = &config.storage.rocksdb;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(tuning.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(tuning.max_write_buffer_number);
        db_opts.set_target_file_size_base(tuning.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(tuning.max_background_jobs);
        db_opts.set_level_zero_file_num_compaction_trigger(
            tuning.level0_file_num_compaction_trigger,
        );

        // Append-only workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if tuning.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_RECORDS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;
        let store = Self {
            db,
            sync_writes: tuning.sync_writes,
            writer: Mutex::new(()),
        };

        tracing::info!(
            path = ?path,
            last_id = store.last_id()?,
            "Opened RocksDB ledger store"
        );

        Ok(store)
    }

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn apply(&self, writes: WriteSet) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let cf_records = self.cf_handle(CF_RECORDS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let cf_meta = self.cf_handle(CF_META)?;

        let last_id = self.last_id()?.max(writes.last_id());
        let mut batch = WriteBatch::default();

        for record in writes.records() {
            let key = record.id().to_be_bytes();
            if self.db.get_pinned_cf(cf_records, key)?.is_some() {
                return Err(Error::Corrupt(format!(
                    "{} {} already exists",
                    record.kind(),
                    record.id()
                )));
            }
            batch.put_cf(cf_records, key, bincode::serialize(record)?);
            for entry in index_entries(record) {
                batch.put_cf(cf_indices, entry, b"");
            }
        }
        batch.put_cf(cf_meta, KEY_LAST_ID, last_id.to_be_bytes());

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);

        // Atomic commit
        self.db.write_opt(batch, &write_opts)?;

        tracing::debug!(records = writes.len(), last_id, "Write set committed");

        Ok(())
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl LedgerStore for RocksStore {
    type View<'a> = RocksView<'a>;

    fn view(&self) -> Result<RocksView<'_>> {
        Ok(RocksView {
            store: self,
            snapshot: self.db.snapshot(),
        })
    }

    fn commit_with<T, F>(&self, build: F) -> Result<T>
    where
        F: FnOnce(&Self::View<'_>) -> Result<(WriteSet, T)>,
    {
        let _writer = self.writer.lock();
        let (writes, output) = build(&self.view()?)?;
        self.apply(writes)?;
        Ok(output)
    }

    fn last_id(&self) -> Result<u64> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_pinned_cf(cf, KEY_LAST_ID)? {
            Some(value) => {
                let bytes: [u8; 8] = value
                    .as_ref()
                    .try_into()
                    .map_err(|_| Error::Corrupt("malformed last_id".to_string()))?;
                Ok(u64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }
}

/// Point-in-time snapshot of the database
pub struct RocksView<'a> {
    store: &'a RocksStore,
    snapshot: Snapshot<'a>,
}

impl LedgerView for RocksView<'_> {
    fn record(&self, id: u64) -> Result<Option<Record>> {
        let cf = self.store.cf_handle(CF_RECORDS)?;
        match self.snapshot.get_cf(cf, id.to_be_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn scan(&self, key: &IndexKey) -> Box<dyn Iterator<Item = Result<u64>> + '_> {
        let cf = match self.store.cf_handle(CF_INDICES) {
            Ok(cf) => cf,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };

        let prefix = key.prefix().to_vec();
        let iter = self
            .snapshot
            .iterator_cf(cf, IteratorMode::From(key.prefix(), Direction::Forward));

        Box::new(
            iter.take_while(move |item| match item {
                Ok((entry, _)) => entry.starts_with(&prefix),
                Err(_) => true,
            })
            .map(|item| {
                let (entry, _) = item?;
                entry_id(&entry)
            }),
        )
    }
}
