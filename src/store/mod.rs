//! Queries shared by more than one handler. Handler-specific SQL stays in the handler.
pub mod cart;
pub mod catalog;
pub mod coupons;
pub mod offers;
pub mod orders;
pub mod wallet;
