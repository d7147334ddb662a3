//! # Pulsenet Ledger Crate
//!
//! The replicated object ledger: a transactional, content-addressed record
//! store with object lifelines, plus the components that anchor it to the
//! pulse pipeline.
//!
//! ## Modules
//! - `record`: persisted record variants and content-ID hashing
//! - `index`: object lifeline head structure
//! - `keys`: byte-prefixed keyspace layout
//! - `idlock`: sharded per-record-ID lock table
//! - `db`: LMDB environment wrapper + genesis bootstrap
//! - `transaction`: buffered single-writer transactions with per-ID locks
//! - `jetdrop`: per-pulse drop finalization
//! - `pulsemanager`: pulse commit + jet-drop close-out + runner advance
//! - `jetcoordinator`: entropy-seeded deterministic role routing
//! - `artifact`: application-facing object ledger API
//! - `descriptors`: object/code descriptors
//! - `child_iterator`: chunked lazy iteration over a parent's children
//! - `handlers`: server-side message handlers registered on the bus

pub mod artifact;
pub mod child_iterator;
pub mod db;
pub mod descriptors;
pub mod handlers;
pub mod idlock;
pub mod index;
pub mod jetcoordinator;
pub mod jetdrop;
pub mod keys;
pub mod pulsemanager;
pub mod record;
pub mod transaction;

pub use artifact::ArtifactManager;
pub use db::Db;
pub use index::{LifelineState, ObjectLifeline};
pub use record::{Record, SideEffectRecord};
pub use transaction::{StorageError, TransactionManager};
