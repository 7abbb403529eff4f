//! Domain layer for the storefront inventory engine.
//!
//! This crate provides the data the engine mutates and the rules that guard it:
//! - Catalog products with embedded variants and derived stock flags
//! - Money in integer cents with half-away-from-zero percentage rounding
//! - The order document with its inventory lifecycle record
//! - Order and payment status state machines

pub mod catalog;
pub mod error;
pub mod order;
pub mod value_objects;

pub use catalog::{Measurements, Product, Size, Variant};
pub use common::{OrderId, ProductId, VariantId};
pub use error::DomainError;
pub use order::{
    InventoryLifecycle, NewOrder, Order, OrderItem, OrderNumber, OrderStatus, PaymentDetails,
    PaymentStatus, aggregate_quantities, new_payment_reference,
};
pub use value_objects::{Address, Customer, Money};
