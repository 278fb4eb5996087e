//! Order lifecycle: fulfillment status, payment status, and order numbers.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

/// Fulfillment state. Moves strictly forward, driven by admin actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "confirmed")]
    Confirmed,
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "shipped")]
    Shipped,
    #[serde(rename = "in transit", alias = "in_transit")]
    InTransit,
    #[serde(rename = "delivered")]
    Delivered,
}

impl OrderStatus {
    const ALL: [OrderStatus; 5] = [
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::InTransit,
        OrderStatus::Delivered,
    ];

    /// Value stored in `orders.order_status`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::InTransit => "in transit",
            OrderStatus::Delivered => "delivered",
        }
    }

    /// The immediate successor, or `None` once delivered.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .skip_while(|s| *s != self)
            .nth(1)
    }

    /// Forward moves are allowed, including skips; staying put or moving
    /// backward is not.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        target > self
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "confirmed" => Ok(OrderStatus::Confirmed),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "in transit" | "in_transit" => Ok(OrderStatus::InTransit),
            "delivered" => Ok(OrderStatus::Delivered),
            other => Err(CoreError::InvalidOrderStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl PaymentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            other => Err(CoreError::InvalidPaymentStatus(other.to_string())),
        }
    }
}

/// Client-visible order number, e.g. `DS-20261019-3F9A1C07`.
///
/// Uniqueness is enforced by the `orders.order_number` constraint; a
/// collision surfaces as a retryable persistence failure.
#[must_use]
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "DS-{}-{}",
        now.format("%Y%m%d"),
        suffix[..8].to_ascii_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn statuses_advance_in_order() {
        assert_eq!(OrderStatus::Confirmed.next(), Some(OrderStatus::Processing));
        assert_eq!(OrderStatus::Shipped.next(), Some(OrderStatus::InTransit));
        assert_eq!(OrderStatus::InTransit.next(), Some(OrderStatus::Delivered));
        assert_eq!(OrderStatus::Delivered.next(), None);
    }

    #[test]
    fn transitions_are_strictly_forward() {
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Processing));
    }

    #[test]
    fn in_transit_uses_spaced_name() {
        assert_eq!(OrderStatus::InTransit.as_str(), "in transit");
        assert_eq!(
            "in_transit".parse::<OrderStatus>().unwrap(),
            OrderStatus::InTransit
        );
        let json = serde_json::to_string(&OrderStatus::InTransit).unwrap();
        assert_eq!(json, "\"in transit\"");
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(matches!(
            "cancelled".parse::<OrderStatus>(),
            Err(CoreError::InvalidOrderStatus(_))
        ));
        assert!("refunded".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn order_number_embeds_date_and_suffix() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let number = generate_order_number(now);
        assert!(number.starts_with("DS-20261019-"), "got {number}");
        assert_eq!(number.len(), "DS-20261019-".len() + 8);
        assert_ne!(number, generate_order_number(now));
    }
}
