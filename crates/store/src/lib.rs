//! Persistence for the catalog and orders.
//!
//! Inventory-mutating operations run inside a [`StoreTransaction`]: reads
//! through a transaction lock what they return, and nothing is visible to
//! other callers until [`StoreTransaction::commit`]. Dropping a transaction
//! without committing discards every write made through it.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use store::{CommerceStore, StoreTransaction, StoreTransactionExt};
