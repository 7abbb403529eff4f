//! Order document.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use common::{OrderId, ProductId, VariantId};
use serde::{Deserialize, Serialize};

use crate::catalog::Size;
use crate::error::DomainError;
use crate::value_objects::{Address, Customer, Money};

use super::{OrderNumber, OrderStatus, PaymentStatus};

/// Immutable snapshot of a priced cart line, copied into the order.
///
/// Orders stay readable after the product is edited or deleted, so nothing
/// here refers back to live catalog state beyond the identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub product_name: String,
    pub product_slug: String,
    pub color: String,
    pub size: Size,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Regular unit price.
    pub unit_price: Money,
    pub discount_price: Money,
    /// Unit price actually charged.
    pub effective_price: Money,
    pub quantity: u32,
    /// `quantity × unit_price`
    pub item_subtotal: Money,
    /// `quantity × effective_price`
    pub item_total: Money,
}

/// Sums required quantities per variant, grouped by product.
///
/// A cart holding the same variant on two lines yields a single entry. Fails
/// if a variant's total does not fit in a `u32`.
pub fn aggregate_quantities<'a>(
    items: impl IntoIterator<Item = &'a OrderItem>,
) -> Result<BTreeMap<ProductId, BTreeMap<VariantId, u32>>, DomainError> {
    let mut required: BTreeMap<ProductId, BTreeMap<VariantId, u32>> = BTreeMap::new();
    for item in items {
        let total = required
            .entry(item.product_id.clone())
            .or_default()
            .entry(item.variant_id.clone())
            .or_default();
        *total = total
            .checked_add(item.quantity)
            .ok_or_else(|| DomainError::QuantityOverflow(item.variant_id.to_string()))?;
    }
    Ok(required)
}

/// Payment linkage with the external gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub status: PaymentStatus,
    /// Reference this system generated and handed to the gateway.
    pub reference: String,
    /// Transaction reference the gateway assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentDetails {
    /// Returns true if `reference` is either correlation id of this payment.
    pub fn matches(&self, reference: &str) -> bool {
        self.reference == reference || self.transaction_reference.as_deref() == Some(reference)
    }
}

/// Timestamps tracking what happened to the order's stock.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryLifecycle {
    pub reserved_at: Option<DateTime<Utc>>,
    pub reservation_expires_at: Option<DateTime<Utc>>,
    pub reservation_released_at: Option<DateTime<Utc>>,
    pub deducted_at: Option<DateTime<Utc>>,
    pub deduction_failed_at: Option<DateTime<Utc>>,
    pub deduction_error: Option<String>,
}

/// Input for [`Order::place`].
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
    pub payment_reference: String,
}

/// The persisted record of a checkout attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
    pub status: OrderStatus,
    pub payment: PaymentDetails,
    pub inventory: InventoryLifecycle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a freshly placed order holding a reservation that expires after `ttl`.
    pub fn place(new: NewOrder, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: OrderId::new(),
            order_number: new.order_number,
            customer: new.customer,
            items: new.items,
            shipping_address: new.shipping_address,
            billing_address: new.billing_address,
            subtotal: new.subtotal,
            shipping: new.shipping,
            tax: new.tax,
            total: new.total,
            status: OrderStatus::OrderPlaced,
            payment: PaymentDetails {
                status: PaymentStatus::Pending,
                reference: new.payment_reference,
                transaction_reference: None,
                checkout_url: None,
                paid_at: None,
            },
            inventory: InventoryLifecycle {
                reserved_at: Some(now),
                reservation_expires_at: Some(now + ttl),
                ..Default::default()
            },
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Required quantities per product and variant, from the order's own snapshots.
    pub fn required_quantities(
        &self,
    ) -> Result<BTreeMap<ProductId, BTreeMap<VariantId, u32>>, DomainError> {
        aggregate_quantities(&self.items)
    }

    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// Returns true if a hold was placed and has not been consumed yet.
    pub fn has_live_reservation(&self) -> bool {
        self.inventory.reserved_at.is_some() && self.inventory.reservation_released_at.is_none()
    }

    pub fn is_deducted(&self) -> bool {
        self.inventory.deducted_at.is_some()
    }

    pub fn has_deduction_failure(&self) -> bool {
        self.inventory.deduction_failed_at.is_some()
    }

    /// Returns true if the hold is live and its expiry is before `now`.
    pub fn is_reservation_expired(&self, now: DateTime<Utc>) -> bool {
        self.has_live_reservation()
            && self
                .inventory
                .reservation_expires_at
                .is_some_and(|expires| expires < now)
    }

    /// Records a confirmed payment.
    ///
    /// `paid_at` keeps the first known value. An order that was waiting for
    /// payment or failed on payment alone moves to `Processing`; orders further
    /// along keep their status. Every `Cancelled` order is revived as well,
    /// whether it was cancelled by expiry, by the gateway or by an operator:
    /// captured money is always fulfilled, and refunding is an operator step.
    pub fn record_payment(&mut self, paid_at: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        self.payment.status = PaymentStatus::Paid;
        self.payment.paid_at = paid_at.or(self.payment.paid_at).or(Some(now));

        let revivable = match self.status {
            OrderStatus::OrderPlaced | OrderStatus::Cancelled => true,
            OrderStatus::Failed => !self.has_deduction_failure(),
            _ => false,
        };
        if revivable {
            self.status = OrderStatus::Processing;
            self.cancelled_at = None;
        }
        self.updated_at = now;
    }

    /// Records a failed or cancelled payment. Paid orders are left alone.
    ///
    /// Returns true if the order changed.
    pub fn record_payment_failure(&mut self, status: PaymentStatus, now: DateTime<Utc>) -> bool {
        if !self.payment.status.can_transition_to(status) || status == PaymentStatus::Paid {
            return false;
        }
        self.payment.status = status;
        if !self.status.is_terminal() {
            self.status = if status == PaymentStatus::Cancelled {
                self.cancelled_at = Some(now);
                OrderStatus::Cancelled
            } else {
                OrderStatus::Failed
            };
        }
        self.updated_at = now;
        true
    }

    /// Stamps the reservation as consumed. Returns false if it already was.
    pub fn mark_reservation_released(&mut self, now: DateTime<Utc>) -> bool {
        if self.inventory.reservation_released_at.is_some() {
            return false;
        }
        self.inventory.reservation_released_at = Some(now);
        self.updated_at = now;
        true
    }

    /// Stamps the permanent stock deduction and clears failure markers.
    pub fn mark_deducted(&mut self, now: DateTime<Utc>) {
        self.inventory.deducted_at = Some(now);
        self.clear_deduction_failure();
        self.updated_at = now;
    }

    /// Pins a paid order that could not be fulfilled.
    pub fn mark_deduction_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.inventory.deduction_failed_at = Some(now);
        self.inventory.deduction_error = Some(error);
        self.status = OrderStatus::Failed;
        self.updated_at = now;
    }

    pub fn clear_deduction_failure(&mut self) {
        self.inventory.deduction_failed_at = None;
        self.inventory.deduction_error = None;
    }

    /// Cancels the order after its hold expired unpaid. No-op if already cancelled.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == OrderStatus::Cancelled {
            return false;
        }
        self.status = OrderStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.updated_at = now;
        true
    }

    /// Admin-driven status change with timestamp bookkeeping.
    pub fn transition_to(
        &mut self,
        next: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status,
                to: next,
            });
        }
        match next {
            OrderStatus::Shipped | OrderStatus::InTransit | OrderStatus::OutForDelivery => {
                self.shipped_at.get_or_insert(now);
            }
            OrderStatus::Delivered => {
                self.shipped_at.get_or_insert(now);
                self.delivered_at = Some(now);
            }
            OrderStatus::Cancelled => {
                self.cancelled_at = Some(now);
            }
            _ => {}
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}
