//! Cart Aggregate

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::offer::AppliedOffer;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, Default)]
pub struct Cart {
    id: Uuid,
    items: Vec<CartItem>,
    coupon_code: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Upper bounds for one cart line: the per-order cap and what is on the shelf.
#[derive(Clone, Copy, Debug)]
pub struct LineLimit { pub max_per_item: i32, pub stock: i32 }

impl LineLimit {
    fn cap(&self) -> i32 { self.max_per_item.min(self.stock) }
}

impl Cart {
    pub fn new(id: Uuid) -> Self { Self { id, ..Self::default() } }

    pub fn restore(id: Uuid, items: Vec<CartItem>, coupon_code: Option<String>) -> Self {
        Self { id, items, coupon_code }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn coupon_code(&self) -> Option<&str> { self.coupon_code.as_deref() }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn quantity_of(&self, product_id: Uuid) -> i32 {
        self.items.iter().find(|i| i.product_id == product_id).map_or(0, |i| i.quantity)
    }

    /// Adds `quantity` to the line for `product_id`, merging with an existing line.
    /// Returns the resulting line quantity.
    pub fn add_item(&mut self, product_id: Uuid, quantity: i32, limit: LineLimit) -> Result<i32, CartError> {
        if quantity < 1 { return Err(CartError::InvalidQuantity); }
        if limit.stock < 1 { return Err(CartError::OutOfStock); }
        let wanted = self.quantity_of(product_id)
            .checked_add(quantity)
            .ok_or(CartError::QuantityLimit { max: limit.max_per_item })?;
        check_limit(wanted, limit)?;
        self.put(product_id, wanted);
        Ok(wanted)
    }

    /// Sets the line quantity; zero removes the line.
    pub fn update_quantity(&mut self, product_id: Uuid, quantity: i32, limit: LineLimit) -> Result<(), CartError> {
        if quantity < 0 { return Err(CartError::InvalidQuantity); }
        if !self.items.iter().any(|i| i.product_id == product_id) { return Err(CartError::ItemNotFound); }
        if quantity == 0 {
            self.items.retain(|i| i.product_id != product_id);
            return Ok(());
        }
        check_limit(quantity, limit)?;
        self.put(product_id, quantity);
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: Uuid) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        Ok(())
    }

    /// Folds a guest cart into this one. Merged lines are clamped to their
    /// limits instead of failing; lines with nothing left on the shelf are dropped.
    pub fn merge<F>(&mut self, other: &Cart, mut limit_for: F)
    where
        F: FnMut(Uuid) -> Option<LineLimit>,
    {
        for item in other.items() {
            let Some(limit) = limit_for(item.product_id) else { continue };
            let merged = self.quantity_of(item.product_id).saturating_add(item.quantity).min(limit.cap());
            if merged > 0 { self.put(item.product_id, merged); }
        }
    }

    pub fn apply_coupon(&mut self, code: impl Into<String>) { self.coupon_code = Some(code.into()); }
    pub fn remove_coupon(&mut self) { self.coupon_code = None; }

    pub fn clear(&mut self) { self.items.clear(); self.coupon_code = None; }

    fn put(&mut self, product_id: Uuid, quantity: i32) {
        match self.items.iter_mut().find(|i| i.product_id == product_id) {
            Some(existing) => existing.quantity = quantity,
            None => self.items.push(CartItem { product_id, quantity }),
        }
    }
}

fn check_limit(quantity: i32, limit: LineLimit) -> Result<(), CartError> {
    if quantity > limit.max_per_item { return Err(CartError::QuantityLimit { max: limit.max_per_item }); }
    if quantity > limit.stock { return Err(CartError::InsufficientStock { available: limit.stock }); }
    Ok(())
}

/// One priced line of a cart or wishlist view.
#[derive(Clone, Debug, Serialize)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub quantity: i32,
    pub stock: i32,
    pub unit_price: Money,
    pub sale_price: Money,
    pub line_total: Money,
    pub offer: Option<AppliedOffer>,
}

impl PricedLine {
    pub fn original_total(&self) -> Decimal { self.unit_price.amount() * Decimal::from(self.quantity) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub original_total: Decimal,
    pub offer_savings: Decimal,
    pub subtotal: Decimal,
    pub coupon_code: Option<String>,
    pub coupon_discount: Decimal,
    pub total: Decimal,
}

impl CartTotals {
    pub fn compute(lines: &[PricedLine], coupon: Option<(String, Decimal)>) -> Self {
        let original_total: Decimal = lines.iter().map(PricedLine::original_total).sum();
        let subtotal: Decimal = lines.iter().map(|l| l.line_total.amount()).sum();
        let (coupon_code, coupon_discount) = match coupon {
            Some((code, discount)) => (Some(code), discount.min(subtotal)),
            None => (None, Decimal::ZERO),
        };
        Self {
            original_total,
            offer_savings: original_total - subtotal,
            subtotal,
            coupon_code,
            coupon_discount,
            total: subtotal - coupon_discount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartError { ItemNotFound, InvalidQuantity, OutOfStock, QuantityLimit { max: i32 }, InsufficientStock { available: i32 }, ProductUnavailable, Empty }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemNotFound => write!(f, "Item not found"),
            Self::InvalidQuantity => write!(f, "Invalid quantity"),
            Self::OutOfStock => write!(f, "Product is out of stock"),
            Self::QuantityLimit { max } => write!(f, "At most {max} units per product"),
            Self::InsufficientStock { available } => write!(f, "Only {available} units available"),
            Self::ProductUnavailable => write!(f, "Product is not available"),
            Self::Empty => write!(f, "Cart is empty"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: LineLimit = LineLimit { max_per_item: 5, stock: 8 };

    #[test]
    fn test_cart_operations() {
        let mut cart = Cart::new(Uuid::new_v4());
        let p1 = Uuid::new_v4();
        assert_eq!(cart.add_item(p1, 2, LIMIT).unwrap(), 2);
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.add_item(p1, 1, LIMIT).unwrap(), 3);
        assert_eq!(cart.items()[0].quantity, 3); // Merged
    }

    #[test]
    fn test_add_respects_limits() {
        let mut cart = Cart::new(Uuid::new_v4());
        let p1 = Uuid::new_v4();
        cart.add_item(p1, 4, LIMIT).unwrap();
        assert_eq!(cart.add_item(p1, 2, LIMIT), Err(CartError::QuantityLimit { max: 5 }));
        assert_eq!(cart.quantity_of(p1), 4);

        let scarce = LineLimit { max_per_item: 10, stock: 1 };
        assert_eq!(cart.add_item(Uuid::new_v4(), 2, scarce), Err(CartError::InsufficientStock { available: 1 }));
        assert_eq!(cart.add_item(Uuid::new_v4(), 1, LineLimit { max_per_item: 10, stock: 0 }), Err(CartError::OutOfStock));
        assert_eq!(cart.add_item(Uuid::new_v4(), 0, LIMIT), Err(CartError::InvalidQuantity));
    }

    #[test]
    fn test_add_never_overflows_line_quantity() {
        let mut cart = Cart::new(Uuid::new_v4());
        let p1 = Uuid::new_v4();
        let roomy = LineLimit { max_per_item: i32::MAX, stock: i32::MAX };
        cart.add_item(p1, 1, roomy).unwrap();
        assert_eq!(cart.add_item(p1, i32::MAX, roomy), Err(CartError::QuantityLimit { max: i32::MAX }));
        assert_eq!(cart.quantity_of(p1), 1);

        let guest = Cart::restore(Uuid::new_v4(), vec![CartItem { product_id: p1, quantity: i32::MAX }], None);
        cart.merge(&guest, |_| Some(LIMIT));
        assert_eq!(cart.quantity_of(p1), 5);
    }

    #[test]
    fn test_update_and_remove() {
        let mut cart = Cart::new(Uuid::new_v4());
        let p1 = Uuid::new_v4();
        cart.add_item(p1, 1, LIMIT).unwrap();
        cart.update_quantity(p1, 5, LIMIT).unwrap();
        assert_eq!(cart.quantity_of(p1), 5);
        cart.update_quantity(p1, 0, LIMIT).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.remove_item(p1), Err(CartError::ItemNotFound));
        assert_eq!(cart.update_quantity(p1, 1, LIMIT), Err(CartError::ItemNotFound));
    }

    #[test]
    fn test_merge_guest_cart_clamps() {
        let (p1, p2, gone) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut user = Cart::restore(Uuid::new_v4(), vec![CartItem { product_id: p1, quantity: 4 }], None);
        let guest = Cart::restore(Uuid::new_v4(), vec![
            CartItem { product_id: p1, quantity: 3 },
            CartItem { product_id: p2, quantity: 2 },
            CartItem { product_id: gone, quantity: 1 },
        ], None);
        user.merge(&guest, |id| if id == gone { None } else { Some(LIMIT) });
        assert_eq!(user.quantity_of(p1), 5);
        assert_eq!(user.quantity_of(p2), 2);
        assert_eq!(user.quantity_of(gone), 0);
    }

    #[test]
    fn test_totals() {
        let line = |unit: i64, sale: i64, qty: i32| PricedLine {
            product_id: Uuid::new_v4(), name: "x".into(), image: None, quantity: qty, stock: 10,
            unit_price: Money::inr(Decimal::new(unit, 0)), sale_price: Money::inr(Decimal::new(sale, 0)),
            line_total: Money::inr(Decimal::new(sale * i64::from(qty), 0)), offer: None,
        };
        let lines = vec![line(100, 80, 2), line(50, 50, 1)];
        let totals = CartTotals::compute(&lines, Some(("SAVE".into(), Decimal::new(30, 0))));
        assert_eq!(totals.original_total, Decimal::new(250, 0));
        assert_eq!(totals.subtotal, Decimal::new(210, 0));
        assert_eq!(totals.offer_savings, Decimal::new(40, 0));
        assert_eq!(totals.total, Decimal::new(180, 0));

        let none = CartTotals::compute(&lines, None);
        assert_eq!(none.total, none.subtotal);
        assert_eq!(none.coupon_code, None);
    }
}
