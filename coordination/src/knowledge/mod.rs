//! Knowledge base for debate history, workflow templates and shared notes
//!
//! The coordinator reads and writes through the narrow [`KnowledgeBase`]
//! trait. Failures from it are infrastructure errors: they are retried or
//! logged, never turned into task or debate failures.
//!
//! Backends:
//! - [`InMemoryKnowledgeBase`]: process-local, the default
//! - `RocksDbKnowledgeBase`: column family per record kind (feature `rocksdb-store`)

pub mod records;
#[cfg(feature = "rocksdb-store")]
pub mod rocks;
pub mod store;

pub use records::{DebateRecord, KnowledgeItem, WorkflowTemplate};
#[cfg(feature = "rocksdb-store")]
pub use rocks::RocksDbKnowledgeBase;
pub use store::{
    put_with_retry, InMemoryKnowledgeBase, KnowledgeBase, KnowledgeBaseExt, KnowledgeError,
    KnowledgeResult, RecordFilter, RecordKind, RetryPolicy, SharedKnowledgeBase,
};
