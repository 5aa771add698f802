//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::OrderStatus;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Wallet(WalletEvent),
    Customer(CustomerEvent),
}

impl DomainEvent {
    /// Subject the event is published under, e.g. `shop.order.placed`.
    pub fn subject(&self) -> String {
        let (aggregate, name) = match self {
            Self::Order(e) => ("order", e.name()),
            Self::Wallet(e) => ("wallet", e.name()),
            Self::Customer(e) => ("customer", e.name()),
        };
        format!("shop.{aggregate}.{name}")
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: Uuid, total: Decimal },
    Paid { order_id: Uuid },
    PaymentFailed { order_id: Uuid },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    Refunded { order_id: Uuid, amount: Decimal },
}

impl OrderEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "placed",
            Self::Paid { .. } => "paid",
            Self::PaymentFailed { .. } => "payment_failed",
            Self::StatusChanged { .. } => "status_changed",
            Self::Refunded { .. } => "refunded",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalletEvent {
    Credited { user_id: Uuid, amount: Decimal, balance: Decimal },
    Debited { user_id: Uuid, amount: Decimal, balance: Decimal },
}

impl WalletEvent {
    fn name(&self) -> &'static str {
        match self { Self::Credited { .. } => "credited", Self::Debited { .. } => "debited" }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CustomerEvent {
    Registered { user_id: Uuid, referred_by: Option<Uuid> },
    Verified { user_id: Uuid },
    Blocked { user_id: Uuid },
    Unblocked { user_id: Uuid },
}

impl CustomerEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "registered",
            Self::Verified { .. } => "verified",
            Self::Blocked { .. } => "blocked",
            Self::Unblocked { .. } => "unblocked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject() {
        let e = DomainEvent::Order(OrderEvent::Paid { order_id: Uuid::nil() });
        assert_eq!(e.subject(), "shop.order.paid");
        let e = DomainEvent::Wallet(WalletEvent::Debited { user_id: Uuid::nil(), amount: Decimal::ONE, balance: Decimal::ZERO });
        assert_eq!(e.subject(), "shop.wallet.debited");
    }

    #[test]
    fn test_serialises_tagged() {
        let e = DomainEvent::Customer(CustomerEvent::Verified { user_id: Uuid::nil() });
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["aggregate"], "customer");
        assert_eq!(json["event"]["type"], "verified");
    }
}
