//! Order document and related types.

mod aggregate;
mod number;
mod state;

pub use aggregate::{
    InventoryLifecycle, NewOrder, Order, OrderItem, PaymentDetails, aggregate_quantities,
};
pub use number::{OrderNumber, new_payment_reference};
pub use state::{OrderStatus, PaymentStatus};
