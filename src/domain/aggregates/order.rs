//! Order Aggregate
//!
//! Every status change goes through [`OrderStatus::can_transition_to`]. The
//! operations that change status also report the stock and wallet side effects
//! the caller has to apply, as a [`Settlement`].

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::events::{DomainEvent, OrderEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { PaymentPending, Placed, Shipped, Delivered, Cancelled, ReturnRequested, Returned, PaymentFailed }

impl sqlx::postgres::PgHasArrayType for OrderStatus {
    fn array_type_info() -> sqlx::postgres::PgTypeInfo { sqlx::postgres::PgTypeInfo::with_name("_order_status") }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus { Pending, Paid, Failed, Refunded }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod { Cod, Razorpay, Wallet }

impl OrderStatus {
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (PaymentPending, Placed | PaymentFailed | Cancelled)
                | (PaymentFailed, Placed | Cancelled)
                | (Placed, Shipped | Cancelled)
                | (Shipped, Delivered | Cancelled)
                | (Delivered, ReturnRequested)
                | (ReturnRequested, Returned | Delivered)
        )
    }

    /// Statuses that count as a sale in reports.
    pub fn is_sale(self) -> bool {
        matches!(self, Self::Placed | Self::Shipped | Self::Delivered | Self::ReturnRequested)
    }
}

/// Who is asking for a change; customers may do less than admins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Actor { Customer, Admin }

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub sale_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub subtotal: Decimal,
    pub coupon_code: Option<String>,
    pub coupon_discount: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub shipping_address: serde_json::Value,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub return_reason: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<OrderItem>,
    #[sqlx(skip)]
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Input for placing an order from a priced cart.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub payment_method: PaymentMethod,
    pub shipping_address: serde_json::Value,
    pub currency: String,
    pub lines: Vec<NewOrderLine>,
    pub coupon: Option<(String, Decimal)>,
}

#[derive(Clone, Debug)]
pub struct NewOrderLine { pub product_id: Uuid, pub name: String, pub unit_price: Decimal, pub sale_price: Decimal, pub quantity: i32 }

/// Side effects owed after a status change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Settlement { pub restock: bool, pub refund: Option<Decimal> }

impl Order {
    pub fn place(order_number: String, new: NewOrder, cod_limit: Decimal) -> Result<Self, OrderError> {
        if new.lines.is_empty() { return Err(OrderError::NoItems); }
        let id = Uuid::now_v7();
        let now = Utc::now();
        let items: Vec<OrderItem> = new.lines.into_iter().map(|l| OrderItem {
            id: Uuid::now_v7(), order_id: id, product_id: l.product_id, name: l.name,
            unit_price: l.unit_price, sale_price: l.sale_price, quantity: l.quantity,
            line_total: l.sale_price * Decimal::from(l.quantity),
        }).collect();
        let subtotal: Decimal = items.iter().map(|i| i.line_total).sum();
        let (coupon_code, coupon_discount) = match new.coupon {
            Some((code, discount)) => (Some(code), discount.min(subtotal)),
            None => (None, Decimal::ZERO),
        };
        let total = subtotal - coupon_discount;
        if new.payment_method == PaymentMethod::Cod && total > cod_limit {
            return Err(OrderError::CodLimitExceeded { limit: cod_limit });
        }
        let (status, payment_status) = match new.payment_method {
            PaymentMethod::Cod => (OrderStatus::Placed, PaymentStatus::Pending),
            PaymentMethod::Wallet => (OrderStatus::Placed, PaymentStatus::Paid),
            // Nothing left to collect online.
            PaymentMethod::Razorpay if total.is_zero() => (OrderStatus::Placed, PaymentStatus::Paid),
            PaymentMethod::Razorpay => (OrderStatus::PaymentPending, PaymentStatus::Pending),
        };
        let mut order = Self {
            id, order_number, user_id: new.user_id, status, payment_method: new.payment_method, payment_status,
            subtotal, coupon_code, coupon_discount, total, currency: new.currency,
            shipping_address: new.shipping_address, gateway_order_id: None, gateway_payment_id: None,
            return_reason: None, delivered_at: None, created_at: now, updated_at: now, items, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: id, user_id: order.user_id, total }));
        if payment_status == PaymentStatus::Paid {
            order.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: id }));
        }
        Ok(order)
    }

    pub fn generate_number() -> String { format!("ORD-{:08}", rand::random::<u32>() % 100_000_000) }

    pub fn with_items(mut self, items: Vec<OrderItem>) -> Self { self.items = items; self }

    pub fn awaits_online_payment(&self) -> bool {
        self.payment_method == PaymentMethod::Razorpay && matches!(self.status, OrderStatus::PaymentPending | OrderStatus::PaymentFailed)
    }

    pub fn attach_gateway_order(&mut self, gateway_order_id: impl Into<String>) {
        self.gateway_order_id = Some(gateway_order_id.into());
        self.touch();
    }

    pub fn confirm_payment(&mut self, payment_id: impl Into<String>) -> Result<(), OrderError> {
        if !self.awaits_online_payment() { return Err(OrderError::NotAwaitingPayment); }
        self.transition(OrderStatus::Placed)?;
        self.payment_status = PaymentStatus::Paid;
        self.gateway_payment_id = Some(payment_id.into());
        self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: self.id }));
        Ok(())
    }

    pub fn fail_payment(&mut self) -> Result<(), OrderError> {
        if !self.awaits_online_payment() { return Err(OrderError::NotAwaitingPayment); }
        if self.status != OrderStatus::PaymentFailed { self.transition(OrderStatus::PaymentFailed)?; }
        self.payment_status = PaymentStatus::Failed;
        self.raise_event(DomainEvent::Order(OrderEvent::PaymentFailed { order_id: self.id }));
        Ok(())
    }

    pub fn ship(&mut self) -> Result<(), OrderError> { self.transition(OrderStatus::Shipped) }

    pub fn deliver(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Delivered)?;
        self.delivered_at = Some(now);
        if self.payment_method == PaymentMethod::Cod { self.payment_status = PaymentStatus::Paid; }
        Ok(())
    }

    pub fn cancel(&mut self, actor: Actor) -> Result<Settlement, OrderError> {
        if actor == Actor::Customer && self.status == OrderStatus::Shipped { return Err(OrderError::CannotCancel); }
        if !self.status.can_transition_to(OrderStatus::Cancelled) { return Err(OrderError::CannotCancel); }
        self.transition(OrderStatus::Cancelled)?;
        Ok(Settlement { restock: true, refund: self.refund_if_paid() })
    }

    pub fn request_return(&mut self, reason: &str, now: DateTime<Utc>, window_days: i64) -> Result<(), OrderError> {
        let reason = reason.trim();
        if reason.is_empty() { return Err(OrderError::ReasonRequired); }
        if self.status != OrderStatus::Delivered { return Err(OrderError::InvalidTransition { from: self.status, to: OrderStatus::ReturnRequested }); }
        let delivered_at = self.delivered_at.unwrap_or(self.updated_at);
        if now > delivered_at + Duration::days(window_days) { return Err(OrderError::ReturnWindowClosed); }
        self.transition(OrderStatus::ReturnRequested)?;
        self.return_reason = Some(reason.to_string());
        Ok(())
    }

    pub fn approve_return(&mut self) -> Result<Settlement, OrderError> {
        self.transition(OrderStatus::Returned)?;
        Ok(Settlement { restock: true, refund: self.refund_if_paid() })
    }

    pub fn reject_return(&mut self) -> Result<(), OrderError> { self.transition(OrderStatus::Delivered) }

    /// Admin status update, routed through the operation that owns the target status.
    pub fn advance(&mut self, to: OrderStatus, now: DateTime<Utc>) -> Result<Settlement, OrderError> {
        match to {
            OrderStatus::Shipped => self.ship().map(|_| Settlement::default()),
            OrderStatus::Delivered if self.status == OrderStatus::ReturnRequested => self.reject_return().map(|_| Settlement::default()),
            OrderStatus::Delivered => self.deliver(now).map(|_| Settlement::default()),
            OrderStatus::Cancelled => self.cancel(Actor::Admin),
            OrderStatus::Returned => self.approve_return(),
            other => Err(OrderError::InvalidTransition { from: self.status, to: other }),
        }
    }

    fn refund_if_paid(&mut self) -> Option<Decimal> {
        if self.payment_status != PaymentStatus::Paid || self.total.is_zero() { return None; }
        self.payment_status = PaymentStatus::Refunded;
        self.raise_event(DomainEvent::Order(OrderEvent::Refunded { order_id: self.id, amount: self.total }));
        Some(self.total)
    }

    fn transition(&mut self, to: OrderStatus) -> Result<(), OrderError> {
        let from = self.status;
        if !from.can_transition_to(to) { return Err(OrderError::InvalidTransition { from, to }); }
        self.status = to;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    NoItems, CannotCancel, NotAwaitingPayment, ReasonRequired, ReturnWindowClosed,
    CodLimitExceeded { limit: Decimal },
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "No items"),
            Self::CannotCancel => write!(f, "Order can no longer be cancelled"),
            Self::NotAwaitingPayment => write!(f, "Order is not awaiting payment"),
            Self::ReasonRequired => write!(f, "A reason is required"),
            Self::ReturnWindowClosed => write!(f, "Return window has closed"),
            Self::CodLimitExceeded { limit } => write!(f, "Cash on delivery is not available for orders above {limit}"),
            Self::InvalidTransition { from, to } => write!(f, "Cannot move order from {from:?} to {to:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_order(method: PaymentMethod, coupon: Option<(String, Decimal)>) -> NewOrder {
        NewOrder {
            user_id: Uuid::new_v4(), payment_method: method, shipping_address: serde_json::json!({"city": "Kochi"}),
            currency: "INR".into(), coupon,
            lines: vec![
                NewOrderLine { product_id: Uuid::new_v4(), name: "Widget".into(), unit_price: Decimal::new(500, 0), sale_price: Decimal::new(400, 0), quantity: 2 },
                NewOrderLine { product_id: Uuid::new_v4(), name: "Gadget".into(), unit_price: Decimal::new(100, 0), sale_price: Decimal::new(100, 0), quantity: 1 },
            ],
        }
    }

    fn limit() -> Decimal { Decimal::new(10_000, 0) }

    #[test]
    fn test_fully_discounted_online_order_is_paid_at_placement() {
        let order = Order::place("ORD-9".into(), new_order(PaymentMethod::Razorpay, Some(("FREE".into(), Decimal::new(5_000, 0)))), limit()).unwrap();
        assert_eq!(order.total, Decimal::ZERO);
        assert_eq!((order.status, order.payment_status), (OrderStatus::Placed, PaymentStatus::Paid));
        assert!(!order.awaits_online_payment());

        let due = Order::place("ORD-10".into(), new_order(PaymentMethod::Razorpay, None), limit()).unwrap();
        assert_eq!(due.status, OrderStatus::PaymentPending);
        assert!(due.awaits_online_payment());
    }

    #[test]
    fn test_order_workflow() {
        let mut order = Order::place("ORD-1".into(), new_order(PaymentMethod::Cod, None), limit()).unwrap();
        assert_eq!(order.status, OrderStatus::Placed);
        assert_eq!(order.subtotal, Decimal::new(900, 0));
        assert_eq!(order.total, Decimal::new(900, 0));
        order.ship().unwrap();
        let now = Utc::now();
        order.deliver(now).unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.delivered_at, Some(now));
        assert!(!order.take_events().is_empty());
    }

    #[test]
    fn test_coupon_discount_applied() {
        let order = Order::place("ORD-2".into(), new_order(PaymentMethod::Wallet, Some(("SAVE".into(), Decimal::new(90, 0)))), limit()).unwrap();
        assert_eq!(order.total, Decimal::new(810, 0));
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.coupon_code.as_deref(), Some("SAVE"));
    }

    #[test]
    fn test_cod_limit() {
        let err = Order::place("ORD-3".into(), new_order(PaymentMethod::Cod, None), Decimal::new(500, 0)).unwrap_err();
        assert_eq!(err, OrderError::CodLimitExceeded { limit: Decimal::new(500, 0) });
        assert!(Order::place("ORD-3".into(), new_order(PaymentMethod::Razorpay, None), Decimal::new(500, 0)).is_ok());
    }

    #[test]
    fn test_transition_guard() {
        use OrderStatus::*;
        assert!(Placed.can_transition_to(Shipped));
        assert!(!Placed.can_transition_to(Delivered));
        assert!(!Cancelled.can_transition_to(Placed));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(ReturnRequested.can_transition_to(Delivered));

        let mut order = Order::place("ORD-4".into(), new_order(PaymentMethod::Cod, None), limit()).unwrap();
        assert_eq!(order.deliver(Utc::now()), Err(OrderError::InvalidTransition { from: Placed, to: Delivered }));
    }

    #[test]
    fn test_online_payment_flow() {
        let mut order = Order::place("ORD-5".into(), new_order(PaymentMethod::Razorpay, None), limit()).unwrap();
        assert_eq!(order.status, OrderStatus::PaymentPending);
        order.fail_payment().unwrap();
        assert_eq!(order.status, OrderStatus::PaymentFailed);
        order.fail_payment().unwrap();
        order.confirm_payment("pay_123").unwrap();
        assert_eq!(order.status, OrderStatus::Placed);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.confirm_payment("pay_456"), Err(OrderError::NotAwaitingPayment));
    }

    #[test]
    fn test_cancel_refunds_paid_order() {
        let mut order = Order::place("ORD-6".into(), new_order(PaymentMethod::Wallet, None), limit()).unwrap();
        let settlement = order.cancel(Actor::Customer).unwrap();
        assert_eq!(settlement, Settlement { restock: true, refund: Some(Decimal::new(900, 0)) });
        assert_eq!(order.payment_status, PaymentStatus::Refunded);

        let mut cod = Order::place("ORD-7".into(), new_order(PaymentMethod::Cod, None), limit()).unwrap();
        assert_eq!(cod.cancel(Actor::Customer).unwrap(), Settlement { restock: true, refund: None });
    }

    #[test]
    fn test_customer_cannot_cancel_shipped() {
        let mut order = Order::place("ORD-8".into(), new_order(PaymentMethod::Cod, None), limit()).unwrap();
        order.ship().unwrap();
        assert_eq!(order.cancel(Actor::Customer), Err(OrderError::CannotCancel));
        assert!(order.cancel(Actor::Admin).is_ok());
    }

    #[test]
    fn test_return_window() {
        let mut order = Order::place("ORD-9".into(), new_order(PaymentMethod::Cod, None), limit()).unwrap();
        order.ship().unwrap();
        let delivered = Utc::now() - Duration::days(10);
        order.deliver(delivered).unwrap();
        assert_eq!(order.request_return("broken", Utc::now(), 7), Err(OrderError::ReturnWindowClosed));
        assert_eq!(order.request_return("  ", delivered, 7), Err(OrderError::ReasonRequired));
        order.request_return("broken", delivered + Duration::days(2), 7).unwrap();
        assert_eq!(order.status, OrderStatus::ReturnRequested);
        let settlement = order.approve_return().unwrap();
        assert_eq!(settlement.refund, Some(Decimal::new(900, 0)));
        assert_eq!(order.status, OrderStatus::Returned);
    }

    #[test]
    fn test_advance_rejects_return() {
        let mut order = Order::place("ORD-10".into(), new_order(PaymentMethod::Cod, None), limit()).unwrap();
        let now = Utc::now();
        order.advance(OrderStatus::Shipped, now).unwrap();
        order.advance(OrderStatus::Delivered, now).unwrap();
        order.request_return("wrong size", now, 7).unwrap();
        order.advance(OrderStatus::Delivered, now).unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        assert!(order.advance(OrderStatus::PaymentPending, now).is_err());
    }
}
