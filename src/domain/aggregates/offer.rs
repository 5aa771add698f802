//! Offer Aggregate
//!
//! Product, category and default offers are independent time-boxed
//! percentage discounts. The one giving the largest discount wins; on a tie
//! the more specific scope wins.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::value_objects::{Money, Percentage, PercentageError};

/// Declaration order is the tie-break order: later variants win.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferScope { Default, Category, Product }

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductOffer {
    pub id: Uuid, pub product_id: Uuid, pub discount_percentage: i32,
    pub starts_at: DateTime<Utc>, pub ends_at: DateTime<Utc>, pub is_active: bool, pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct CategoryOffer {
    pub id: Uuid, pub category_id: Uuid, pub discount_percentage: i32,
    pub starts_at: DateTime<Utc>, pub ends_at: DateTime<Utc>, pub is_active: bool, pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct DefaultOffer {
    pub id: Uuid, pub name: String, pub discount_percentage: i32,
    pub starts_at: DateTime<Utc>, pub ends_at: DateTime<Utc>, pub is_active: bool, pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReferralOffer {
    pub id: Uuid, pub referrer_reward: Decimal, pub referee_reward: Decimal,
    pub starts_at: DateTime<Utc>, pub ends_at: DateTime<Utc>, pub is_active: bool, pub created_at: DateTime<Utc>,
}

impl ReferralOffer {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool { is_live(self.is_active, self.starts_at, self.ends_at, now) }
}

/// Newest live referral offer, if any.
pub fn current_referral_offer(offers: &[ReferralOffer], now: DateTime<Utc>) -> Option<&ReferralOffer> {
    offers.iter().filter(|o| o.is_live(now)).max_by_key(|o| o.created_at)
}

fn is_live(active: bool, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    active && starts_at <= now && now < ends_at
}

/// Common view of the three discount offer kinds used for resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OfferCandidate {
    pub id: Uuid,
    pub scope: OfferScope,
    pub discount: Percentage,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
}

impl OfferCandidate {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool { is_live(self.is_active, self.starts_at, self.ends_at, now) }
}

fn candidate(id: Uuid, scope: OfferScope, pct: i32, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>, is_active: bool) -> Option<OfferCandidate> {
    // Out-of-range rows are excluded by a CHECK constraint; skip them if one slips through.
    Some(OfferCandidate { id, scope, discount: Percentage::offer(pct).ok()?, starts_at, ends_at, is_active })
}

impl ProductOffer {
    pub fn candidate(&self) -> Option<OfferCandidate> { candidate(self.id, OfferScope::Product, self.discount_percentage, self.starts_at, self.ends_at, self.is_active) }
}
impl CategoryOffer {
    pub fn candidate(&self) -> Option<OfferCandidate> { candidate(self.id, OfferScope::Category, self.discount_percentage, self.starts_at, self.ends_at, self.is_active) }
}
impl DefaultOffer {
    pub fn candidate(&self) -> Option<OfferCandidate> { candidate(self.id, OfferScope::Default, self.discount_percentage, self.starts_at, self.ends_at, self.is_active) }
}

pub fn resolve_best_offer<'a, I>(candidates: I, now: DateTime<Utc>) -> Option<&'a OfferCandidate>
where
    I: IntoIterator<Item = &'a OfferCandidate>,
{
    candidates.into_iter().filter(|c| c.is_live(now)).max_by_key(|c| (c.discount, c.scope))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppliedOffer { pub id: Uuid, pub scope: OfferScope, pub discount_percentage: u8 }

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PricedProduct {
    pub price: Money,
    pub sale_price: Money,
    pub offer: Option<AppliedOffer>,
}

impl PricedProduct {
    pub fn list_price(price: Money) -> Self { Self { sale_price: price.clone(), price, offer: None } }
    pub fn savings(&self) -> Decimal { self.price.amount() - self.sale_price.amount() }
}

/// Offers loaded for one pricing pass, indexed by what they apply to.
#[derive(Clone, Debug, Default)]
pub struct OfferBook {
    by_product: HashMap<Uuid, Vec<OfferCandidate>>,
    by_category: HashMap<Uuid, Vec<OfferCandidate>>,
    defaults: Vec<OfferCandidate>,
}

impl OfferBook {
    pub fn new(products: &[ProductOffer], categories: &[CategoryOffer], defaults: &[DefaultOffer]) -> Self {
        let mut book = Self::default();
        for o in products {
            if let Some(c) = o.candidate() { book.by_product.entry(o.product_id).or_default().push(c); }
        }
        for o in categories {
            if let Some(c) = o.candidate() { book.by_category.entry(o.category_id).or_default().push(c); }
        }
        book.defaults = defaults.iter().filter_map(DefaultOffer::candidate).collect();
        book
    }

    pub fn price(&self, product_id: Uuid, category_id: Uuid, price: Money, now: DateTime<Utc>) -> PricedProduct {
        let candidates = self.by_product.get(&product_id).into_iter().flatten()
            .chain(self.by_category.get(&category_id).into_iter().flatten())
            .chain(self.defaults.iter());
        match resolve_best_offer(candidates, now) {
            Some(best) => PricedProduct {
                sale_price: price.percent_off(best.discount),
                price,
                offer: Some(AppliedOffer { id: best.id, scope: best.scope, discount_percentage: best.discount.value() }),
            },
            None => PricedProduct::list_price(price),
        }
    }
}

/// Checks shared by every offer kind before it is stored.
pub fn validate_offer(discount_percentage: i32, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Result<Percentage, OfferError> {
    let pct = Percentage::offer(discount_percentage).map_err(OfferError::Discount)?;
    validate_window(starts_at, ends_at)?;
    Ok(pct)
}

pub fn validate_window(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Result<(), OfferError> {
    if ends_at <= starts_at { return Err(OfferError::InvalidWindow); }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OfferError { Discount(PercentageError), InvalidWindow, NegativeReward }
impl std::error::Error for OfferError {}
impl std::fmt::Display for OfferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discount(e) => write!(f, "{e}"),
            Self::InvalidWindow => write!(f, "offer must end after it starts"),
            Self::NegativeReward => write!(f, "referral rewards cannot be negative"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn live(scope: OfferScope, pct: i32, now: DateTime<Utc>) -> OfferCandidate {
        OfferCandidate { id: Uuid::new_v4(), scope, discount: Percentage::offer(pct).unwrap(), starts_at: now - Duration::days(1), ends_at: now + Duration::days(1), is_active: true }
    }

    #[test]
    fn test_best_offer_by_percentage() {
        let now = Utc::now();
        let offers = vec![live(OfferScope::Product, 10, now), live(OfferScope::Category, 25, now), live(OfferScope::Default, 5, now)];
        let best = resolve_best_offer(&offers, now).unwrap();
        assert_eq!(best.scope, OfferScope::Category);
        assert_eq!(best.discount.value(), 25);
    }

    #[test]
    fn test_tie_prefers_specific_scope() {
        let now = Utc::now();
        let offers = vec![live(OfferScope::Default, 20, now), live(OfferScope::Product, 20, now), live(OfferScope::Category, 20, now)];
        assert_eq!(resolve_best_offer(&offers, now).unwrap().scope, OfferScope::Product);
    }

    #[test]
    fn test_expired_and_inactive_ignored() {
        let now = Utc::now();
        let mut expired = live(OfferScope::Product, 50, now);
        expired.ends_at = now;
        let mut inactive = live(OfferScope::Category, 40, now);
        inactive.is_active = false;
        let mut upcoming = live(OfferScope::Default, 30, now);
        upcoming.starts_at = now + Duration::hours(1);
        assert!(resolve_best_offer(&[expired, inactive, upcoming], now).is_none());
    }

    #[test]
    fn test_offer_book_prices_product() {
        let now = Utc::now();
        let product_id = Uuid::new_v4();
        let category_id = Uuid::new_v4();
        let product = ProductOffer { id: Uuid::new_v4(), product_id, discount_percentage: 10, starts_at: now - Duration::days(1), ends_at: now + Duration::days(1), is_active: true, created_at: now };
        let category = CategoryOffer { id: Uuid::new_v4(), category_id, discount_percentage: 20, starts_at: now - Duration::days(1), ends_at: now + Duration::days(1), is_active: true, created_at: now };
        let book = OfferBook::new(&[product], &[category.clone()], &[]);

        let priced = book.price(product_id, category_id, Money::inr(Decimal::new(1000, 0)), now);
        assert_eq!(priced.sale_price.amount(), Decimal::new(800, 0));
        assert_eq!(priced.offer.as_ref().unwrap().id, category.id);
        assert_eq!(priced.savings(), Decimal::new(200, 0));

        let other = book.price(Uuid::new_v4(), Uuid::new_v4(), Money::inr(Decimal::new(1000, 0)), now);
        assert!(other.offer.is_none());
        assert_eq!(other.sale_price, other.price);
    }

    #[test]
    fn test_current_referral_offer_newest_live() {
        let now = Utc::now();
        let mk = |created: DateTime<Utc>, active: bool| ReferralOffer { id: Uuid::new_v4(), referrer_reward: Decimal::new(100, 0), referee_reward: Decimal::new(50, 0), starts_at: now - Duration::days(2), ends_at: now + Duration::days(2), is_active: active, created_at: created };
        let older = mk(now - Duration::days(1), true);
        let newer = mk(now, true);
        let inactive = mk(now + Duration::seconds(1), false);
        let offers = [older, newer.clone(), inactive];
        assert_eq!(current_referral_offer(&offers, now).unwrap().id, newer.id);
    }

    #[test]
    fn test_validate_offer() {
        let now = Utc::now();
        assert!(validate_offer(10, now, now + Duration::days(1)).is_ok());
        assert_eq!(validate_offer(10, now, now), Err(OfferError::InvalidWindow));
        assert!(matches!(validate_offer(95, now, now + Duration::days(1)), Err(OfferError::Discount(_))));
    }
}
