//! Order and payment state machines.

use serde::{Deserialize, Serialize};

/// The fulfillment status of an order.
///
/// State transitions:
/// ```text
/// OrderPlaced ──► Processing ──► Packed ──► Shipped ──► InTransit ──► OutForDelivery ──► Delivered
///      │              │            │           │            │               │
///      └──────────────┴────────────┴───────────┴────────────┴───────────────┴──► Cancelled | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order written with its reservation, awaiting payment.
    #[default]
    OrderPlaced,

    /// Payment confirmed.
    Processing,

    Packed,

    Shipped,

    InTransit,

    OutForDelivery,

    /// Terminal.
    Delivered,

    /// Terminal side exit.
    Cancelled,

    /// Terminal side exit: payment failed, or a paid order could not be fulfilled.
    Failed,
}

impl OrderStatus {
    /// Position on the forward progression; `None` for side exits.
    fn rank(&self) -> Option<u8> {
        match self {
            OrderStatus::OrderPlaced => Some(0),
            OrderStatus::Processing => Some(1),
            OrderStatus::Packed => Some(2),
            OrderStatus::Shipped => Some(3),
            OrderStatus::InTransit => Some(4),
            OrderStatus::OutForDelivery => Some(5),
            OrderStatus::Delivered => Some(6),
            OrderStatus::Cancelled | OrderStatus::Failed => None,
        }
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Failed
        )
    }

    /// Returns true if the order may move from `self` to `next`.
    ///
    /// Forward moves along the progression may skip steps; `Cancelled` and
    /// `Failed` are reachable from any non-terminal state.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to > from,
            (_, None) => true,
            (None, Some(_)) => false,
        }
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::OrderPlaced => "OrderPlaced",
            OrderStatus::Processing => "Processing",
            OrderStatus::Packed => "Packed",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::InTransit => "InTransit",
            OrderStatus::OutForDelivery => "OutForDelivery",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            OrderStatus::OrderPlaced,
            OrderStatus::Processing,
            OrderStatus::Packed,
            OrderStatus::Shipped,
            OrderStatus::InTransit,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Failed,
        ]
        .into_iter()
        .find(|status| status.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("unknown order status: {s}"))
    }
}

/// The payment status of an order.
///
/// ```text
/// Pending ──┬──► Paid
///           ├──► Failed
///           └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Only Pending moves, and only to a terminal state.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(self, PaymentStatus::Pending) && next.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_states() {
        assert_eq!(OrderStatus::default(), OrderStatus::OrderPlaced);
        assert_eq!(PaymentStatus::default(), PaymentStatus::Pending);
    }

    #[test]
    fn test_forward_progression() {
        assert!(OrderStatus::OrderPlaced.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Packed));
        assert!(OrderStatus::Packed.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Packed));
        assert!(!OrderStatus::Packed.can_transition_to(OrderStatus::Packed));
    }

    #[test]
    fn test_side_exits_from_pre_delivered_states() {
        for status in [
            OrderStatus::OrderPlaced,
            OrderStatus::Processing,
            OrderStatus::Packed,
            OrderStatus::Shipped,
            OrderStatus::InTransit,
            OrderStatus::OutForDelivery,
        ] {
            assert!(status.can_transition_to(OrderStatus::Cancelled));
            assert!(status.can_transition_to(OrderStatus::Failed));
        }
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        for status in [
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Failed,
        ] {
            assert!(status.is_terminal());
            assert!(!status.can_transition_to(OrderStatus::Cancelled));
            assert!(!status.can_transition_to(OrderStatus::Processing));
        }
    }

    #[test]
    fn test_order_status_parse() {
        assert_eq!("shipped".parse::<OrderStatus>(), Ok(OrderStatus::Shipped));
        assert_eq!(
            "OutForDelivery".parse::<OrderStatus>(),
            Ok(OrderStatus::OutForDelivery)
        );
        assert!("Lost".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_payment_transitions() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Paid));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Paid.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Failed.can_transition_to(PaymentStatus::Paid));
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&OrderStatus::InTransit).unwrap();
        assert_eq!(json, "\"InTransit\"");
        let back: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OrderStatus::InTransit);
    }
}
