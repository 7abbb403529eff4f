//! Shared identifier types for the storefront inventory engine.

pub mod types;

pub use types::{CANONICAL_ID_LEN, InvalidId, OrderId, ProductId, VariantId, is_canonical_id};
