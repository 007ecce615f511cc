// Replicated log storage
// The committed log and the latest namespace snapshot of one replica

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use paxfs_common::PaxfsError;
use parking_lot::RwLock;
use rocksdb::{BlockBasedOptions, ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteOptions};
use tracing::{debug, info};

use super::command::LogEntry;
use crate::namespace::NamespaceState;

// Column family names
const CF_LOGS: &str = "logs";
const CF_META: &str = "meta";

// Meta keys
const KEY_SNAPSHOT: &[u8] = b"snapshot";

// RocksDB tuning constants
/// Write buffer size: 16MB, log entries are small
const WRITE_BUFFER_SIZE: usize = 16 * 1024 * 1024;
/// Maximum number of write buffers for write stall prevention
const MAX_WRITE_BUFFER_NUMBER: i32 = 3;
/// Block cache size: 64MB for replay reads
const BLOCK_CACHE_SIZE: usize = 64 * 1024 * 1024;
/// Bloom filter bits per key for faster lookups
const BLOOM_FILTER_BITS_PER_KEY: f64 = 10.0;

/// Helper to create a storage error from any backend error
fn storage_error(e: impl std::fmt::Display) -> PaxfsError {
    PaxfsError::Storage(e.to_string())
}

/// Check that `entries` extend a log ending at `last_index` without gaps
fn check_contiguous(last_index: u64, entries: &[LogEntry]) -> Result<(), PaxfsError> {
    let mut expected = last_index + 1;
    for entry in entries {
        if entry.instance != expected {
            return Err(PaxfsError::Internal(format!(
                "non-contiguous append: expected instance {}, got {}",
                expected, entry.instance
            )));
        }
        expected += 1;
    }
    Ok(())
}

/// Durable, append-only log of committed instances
///
/// Instance numbers start at 1 and are gap-free. Entries are never purged so
/// the namespace can always be rebuilt by replay from instance 1.
pub trait LogStore: Send + Sync {
    /// Append entries that directly follow the current last index
    fn append(&self, entries: &[LogEntry]) -> Result<(), PaxfsError>;

    /// Up to `limit` entries starting at instance `from`
    fn entries(&self, from: u64, limit: usize) -> Result<Vec<LogEntry>, PaxfsError>;

    /// Highest stored instance, 0 when empty
    fn last_index(&self) -> u64;

    fn save_snapshot(&self, snapshot: &NamespaceState) -> Result<(), PaxfsError>;

    fn load_snapshot(&self) -> Result<Option<NamespaceState>, PaxfsError>;
}

/// In-memory log store, used by tests and ephemeral replicas
#[derive(Default)]
pub struct MemoryLogStore {
    entries: RwLock<Vec<LogEntry>>,
    snapshot: RwLock<Option<NamespaceState>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for MemoryLogStore {
    fn append(&self, entries: &[LogEntry]) -> Result<(), PaxfsError> {
        let mut log = self.entries.write();
        check_contiguous(log.len() as u64, entries)?;
        log.extend_from_slice(entries);
        Ok(())
    }

    fn entries(&self, from: u64, limit: usize) -> Result<Vec<LogEntry>, PaxfsError> {
        let log = self.entries.read();
        let start = from.max(1) as usize - 1;
        Ok(log.iter().skip(start).take(limit).cloned().collect())
    }

    fn last_index(&self) -> u64 {
        self.entries.read().len() as u64
    }

    fn save_snapshot(&self, snapshot: &NamespaceState) -> Result<(), PaxfsError> {
        *self.snapshot.write() = Some(snapshot.clone());
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<NamespaceState>, PaxfsError> {
        Ok(self.snapshot.read().clone())
    }
}

/// RocksDB-based log store
pub struct RocksLogStore {
    db: Arc<DB>,
    /// Cached last log index
    last_index: AtomicU64,
}

impl RocksLogStore {
    /// Open (or create) a RocksDB log store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PaxfsError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(WRITE_BUFFER_SIZE);
        db_opts.set_max_write_buffer_number(MAX_WRITE_BUFFER_NUMBER);
        db_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let mut block_opts = BlockBasedOptions::default();
        let cache = rocksdb::Cache::new_lru_cache(BLOCK_CACHE_SIZE);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(BLOOM_FILTER_BITS_PER_KEY, false);

        let mut cf_opts = Options::default();
        cf_opts.set_write_buffer_size(WRITE_BUFFER_SIZE);
        cf_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        cf_opts.set_block_based_table_factory(&block_opts);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_LOGS, cf_opts.clone()),
            ColumnFamilyDescriptor::new(CF_META, cf_opts),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cfs).map_err(storage_error)?;

        let store = Self {
            db: Arc::new(db),
            last_index: AtomicU64::new(0),
        };
        let last_index = store.calculate_last_index()?;
        store.last_index.store(last_index, Ordering::SeqCst);

        info!(last_index, "RocksDB log store initialized");
        Ok(store)
    }

    fn cf_logs(&self) -> Result<&ColumnFamily, PaxfsError> {
        self.db
            .cf_handle(CF_LOGS)
            .ok_or_else(|| PaxfsError::Storage("missing column family 'logs'".to_string()))
    }

    fn cf_meta(&self) -> Result<&ColumnFamily, PaxfsError> {
        self.db
            .cf_handle(CF_META)
            .ok_or_else(|| PaxfsError::Storage("missing column family 'meta'".to_string()))
    }

    /// Encode log index to bytes (big-endian for proper ordering)
    fn encode_log_index(index: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8);
        // writing into a Vec cannot fail
        let _ = buf.write_u64::<BigEndian>(index);
        buf
    }

    /// Decode log index from bytes
    fn decode_log_index(bytes: &[u8]) -> Result<u64, PaxfsError> {
        let mut cursor = std::io::Cursor::new(bytes);
        cursor.read_u64::<BigEndian>().map_err(storage_error)
    }

    /// Find the last index by seeking to the end of the log column family
    fn calculate_last_index(&self) -> Result<u64, PaxfsError> {
        let mut iter = self.db.raw_iterator_cf(self.cf_logs()?);
        iter.seek_to_last();

        match iter.key() {
            Some(key) if iter.valid() => Self::decode_log_index(key),
            _ => Ok(0),
        }
    }
}

impl LogStore for RocksLogStore {
    fn append(&self, entries: &[LogEntry]) -> Result<(), PaxfsError> {
        if entries.is_empty() {
            return Ok(());
        }
        let last_index = self.last_index.load(Ordering::SeqCst);
        check_contiguous(last_index, entries)?;

        let cf = self.cf_logs()?;
        let mut batch = rocksdb::WriteBatch::default();
        for entry in entries {
            let value = serde_json::to_vec(entry).map_err(storage_error)?;
            batch.put_cf(cf, Self::encode_log_index(entry.instance), value);
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        self.db.write_opt(batch, &write_opts).map_err(storage_error)?;

        let new_last = last_index + entries.len() as u64;
        self.last_index.store(new_last, Ordering::SeqCst);
        debug!("Appended {} log entries, last index {}", entries.len(), new_last);
        Ok(())
    }

    fn entries(&self, from: u64, limit: usize) -> Result<Vec<LogEntry>, PaxfsError> {
        let mut entries = Vec::new();
        let mut iter = self.db.raw_iterator_cf(self.cf_logs()?);
        iter.seek(Self::encode_log_index(from.max(1)));

        while iter.valid() && entries.len() < limit {
            if let Some(value) = iter.value() {
                let entry: LogEntry = serde_json::from_slice(value).map_err(storage_error)?;
                entries.push(entry);
            }
            iter.next();
        }
        iter.status().map_err(storage_error)?;

        Ok(entries)
    }

    fn last_index(&self) -> u64 {
        self.last_index.load(Ordering::SeqCst)
    }

    fn save_snapshot(&self, snapshot: &NamespaceState) -> Result<(), PaxfsError> {
        let bytes = serde_json::to_vec(snapshot).map_err(storage_error)?;
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        self.db
            .put_cf_opt(self.cf_meta()?, KEY_SNAPSHOT, bytes, &write_opts)
            .map_err(storage_error)?;
        debug!("Saved namespace snapshot at instance {}", snapshot.last_applied());
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<NamespaceState>, PaxfsError> {
        match self.db.get_cf(self.cf_meta()?, KEY_SNAPSHOT) {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(storage_error),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paxos::command::{PaxosCommand, Proposal, ProposalId};

    fn entry(instance: u64) -> LogEntry {
        LogEntry {
            instance,
            proposal: Proposal {
                id: ProposalId {
                    replica_id: 0,
                    sequence: instance,
                },
                command: PaxosCommand::Create {
                    path: format!("/n{}", instance),
                    is_dir: false,
                },
            },
        }
    }

    #[test]
    fn test_encode_decode_log_index() {
        let index = 12345u64;
        let encoded = RocksLogStore::encode_log_index(index);
        let decoded = RocksLogStore::decode_log_index(&encoded).unwrap();
        assert_eq!(index, decoded);
    }

    #[test]
    fn test_encode_log_index_ordering() {
        // big-endian encoding preserves ordering for RocksDB
        let indices = vec![0u64, 1, 255, 256, 1000, u64::MAX];
        let encoded: Vec<_> = indices
            .iter()
            .map(|&i| RocksLogStore::encode_log_index(i))
            .collect();

        for i in 0..encoded.len() - 1 {
            assert!(
                encoded[i] < encoded[i + 1],
                "Encoding should preserve ordering"
            );
        }
    }

    #[test]
    fn test_memory_store_append_and_read() {
        let store = MemoryLogStore::new();
        assert_eq!(store.last_index(), 0);

        store.append(&[entry(1), entry(2), entry(3)]).unwrap();
        assert_eq!(store.last_index(), 3);

        let read = store.entries(2, 10).unwrap();
        assert_eq!(read, vec![entry(2), entry(3)]);
        assert!(store.entries(4, 10).unwrap().is_empty());
        assert_eq!(store.entries(1, 1).unwrap(), vec![entry(1)]);
    }

    #[test]
    fn test_memory_store_rejects_gaps() {
        let store = MemoryLogStore::new();
        assert!(store.append(&[entry(2)]).is_err());
        store.append(&[entry(1)]).unwrap();
        assert!(store.append(&[entry(1)]).is_err());
        assert!(store.append(&[entry(2), entry(4)]).is_err());
        assert_eq!(store.last_index(), 1);
    }

    #[test]
    fn test_rocks_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = RocksLogStore::open(dir.path()).unwrap();
            store.append(&[entry(1), entry(2)]).unwrap();
            store.append(&[entry(3)]).unwrap();
            assert!(store.append(&[entry(5)]).is_err());

            let mut snapshot = NamespaceState::new();
            snapshot.apply(1, &entry(1).proposal.command).unwrap();
            store.save_snapshot(&snapshot).unwrap();
        }

        let store = RocksLogStore::open(dir.path()).unwrap();
        assert_eq!(store.last_index(), 3);
        assert_eq!(store.entries(1, 10).unwrap(), vec![entry(1), entry(2), entry(3)]);
        assert_eq!(store.entries(3, 10).unwrap(), vec![entry(3)]);

        let snapshot = store.load_snapshot().unwrap().unwrap();
        assert_eq!(snapshot.last_applied(), 1);
        assert!(snapshot.get("/n1").is_some());
    }

    #[test]
    fn test_rocks_store_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksLogStore::open(dir.path()).unwrap();
        assert_eq!(store.last_index(), 0);
        assert!(store.load_snapshot().unwrap().is_none());
        assert!(store.entries(1, 10).unwrap().is_empty());
    }
}
