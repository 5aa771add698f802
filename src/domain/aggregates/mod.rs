//! Aggregates module
pub mod product;
pub mod category;
pub mod offer;
pub mod coupon;
pub mod order;
pub mod cart;
pub mod wallet;
pub mod user;

pub use product::{Product, ProductDraft, ProductError, ProductStatus};
pub use category::{slugify, Category};
pub use offer::{AppliedOffer, CategoryOffer, DefaultOffer, OfferBook, OfferError, OfferScope, PricedProduct, ProductOffer, ReferralOffer};
pub use coupon::{Coupon, CouponError};
pub use order::{Actor, NewOrder, NewOrderLine, Order, OrderError, OrderItem, OrderStatus, PaymentMethod, PaymentStatus, Settlement};
pub use cart::{Cart, CartError, CartItem, CartTotals, LineLimit, PricedLine};
pub use wallet::{EntryKind, Wallet, WalletEntry, WalletError};
pub use user::{AccountError, OneTimeCode, User};
