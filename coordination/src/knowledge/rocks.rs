//! RocksDB-backed knowledge base
//!
//! One column family per [`RecordKind`]; values are stored as JSON so the
//! records stay readable with stock RocksDB tooling.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use serde_json::Value;

use super::store::{
    KnowledgeBase, KnowledgeError, KnowledgeResult, RecordFilter, RecordKind, SharedKnowledgeBase,
};

impl From<rocksdb::Error> for KnowledgeError {
    fn from(e: rocksdb::Error) -> Self {
        KnowledgeError::Storage(e.to_string())
    }
}

/// Persistent knowledge base
pub struct RocksDbKnowledgeBase {
    db: RwLock<DB>,
    path: PathBuf,
}

impl RocksDbKnowledgeBase {
    /// Open or create a store at the given path
    pub fn open(path: impl Into<PathBuf>) -> KnowledgeResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = RecordKind::ALL
            .iter()
            .map(|kind| ColumnFamilyDescriptor::new(kind.as_str(), Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)?;

        Ok(Self {
            db: RwLock::new(db),
            path,
        })
    }

    pub fn shared(self) -> SharedKnowledgeBase {
        Arc::new(self)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl KnowledgeBase for RocksDbKnowledgeBase {
    fn put(&self, kind: RecordKind, id: &str, record: Value) -> KnowledgeResult<()> {
        let db = self.db.read().map_err(|_| KnowledgeError::LockPoisoned)?;
        let cf = db
            .cf_handle(kind.as_str())
            .ok_or_else(|| KnowledgeError::Storage(format!("missing column family {kind}")))?;
        let bytes = serde_json::to_vec(&record)?;
        db.put_cf(&cf, id.as_bytes(), bytes)?;
        Ok(())
    }

    fn get(&self, kind: RecordKind, id: &str) -> KnowledgeResult<Option<Value>> {
        let db = self.db.read().map_err(|_| KnowledgeError::LockPoisoned)?;
        let cf = db
            .cf_handle(kind.as_str())
            .ok_or_else(|| KnowledgeError::Storage(format!("missing column family {kind}")))?;
        match db.get_cf(&cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn query(&self, kind: RecordKind, filter: &RecordFilter) -> KnowledgeResult<Vec<Value>> {
        let db = self.db.read().map_err(|_| KnowledgeError::LockPoisoned)?;
        let cf = db
            .cf_handle(kind.as_str())
            .ok_or_else(|| KnowledgeError::Storage(format!("missing column family {kind}")))?;

        let limit = filter.limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        for item in db.iterator_cf(&cf, IteratorMode::Start) {
            if out.len() >= limit {
                break;
            }
            let (_, bytes) = item?;
            let value: Value = serde_json::from_slice(&bytes)?;
            if filter.matches(&value) {
                out.push(value);
            }
        }
        Ok(out)
    }

    fn delete(&self, kind: RecordKind, id: &str) -> KnowledgeResult<bool> {
        let db = self.db.read().map_err(|_| KnowledgeError::LockPoisoned)?;
        let cf = db
            .cf_handle(kind.as_str())
            .ok_or_else(|| KnowledgeError::Storage(format!("missing column family {kind}")))?;
        let existed = db.get_cf(&cf, id.as_bytes())?.is_some();
        if existed {
            db.delete_cf(&cf, id.as_bytes())?;
        }
        Ok(existed)
    }
}
