//! Wallet Aggregate
//!
//! In-memory mirror of the rules the wallet store enforces in SQL: amounts
//! are positive and a debit never takes the balance below zero.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::events::{DomainEvent, WalletEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "wallet_entry_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryKind { Credit, Debit }

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct WalletEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct Wallet {
    user_id: Uuid,
    balance: Decimal,
    entries: Vec<WalletEntry>,
    events: Vec<DomainEvent>,
}

impl Wallet {
    pub fn open(user_id: Uuid) -> Self { Self::restore(user_id, Decimal::ZERO) }

    pub fn restore(user_id: Uuid, balance: Decimal) -> Self {
        Self { user_id, balance, entries: vec![], events: vec![] }
    }

    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn balance(&self) -> Decimal { self.balance }
    pub fn entries(&self) -> &[WalletEntry] { &self.entries }

    pub fn credit(&mut self, amount: Decimal, description: &str, order_id: Option<Uuid>) -> Result<&WalletEntry, WalletError> {
        check_amount(amount)?;
        self.balance += amount;
        self.raise_event(DomainEvent::Wallet(WalletEvent::Credited { user_id: self.user_id, amount, balance: self.balance }));
        Ok(self.record(EntryKind::Credit, amount, description, order_id))
    }

    pub fn debit(&mut self, amount: Decimal, description: &str, order_id: Option<Uuid>) -> Result<&WalletEntry, WalletError> {
        check_amount(amount)?;
        if self.balance < amount {
            return Err(WalletError::InsufficientBalance { balance: self.balance, requested: amount });
        }
        self.balance -= amount;
        self.raise_event(DomainEvent::Wallet(WalletEvent::Debited { user_id: self.user_id, amount, balance: self.balance }));
        Ok(self.record(EntryKind::Debit, amount, description, order_id))
    }

    fn record(&mut self, kind: EntryKind, amount: Decimal, description: &str, order_id: Option<Uuid>) -> &WalletEntry {
        self.entries.push(WalletEntry {
            id: Uuid::now_v7(), user_id: self.user_id, kind, amount, balance_after: self.balance,
            description: description.to_string(), order_id, created_at: Utc::now(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

pub fn check_amount(amount: Decimal) -> Result<(), WalletError> {
    if amount <= Decimal::ZERO { return Err(WalletError::InvalidAmount); }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletError { InvalidAmount, InsufficientBalance { balance: Decimal, requested: Decimal }, NotFound }
impl std::error::Error for WalletError {}
impl std::fmt::Display for WalletError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAmount => write!(f, "Amount must be positive"),
            Self::InsufficientBalance { balance, requested } => write!(f, "Insufficient wallet balance: available {balance}, requested {requested}"),
            Self::NotFound => write!(f, "Wallet not found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_then_debit() {
        let mut w = Wallet::open(Uuid::new_v4());
        w.credit(Decimal::new(500, 0), "Refund", None).unwrap();
        let entry = w.debit(Decimal::new(200, 0), "Order payment", Some(Uuid::new_v4())).unwrap();
        assert_eq!(entry.kind, EntryKind::Debit);
        assert_eq!(entry.balance_after, Decimal::new(300, 0));
        assert_eq!(w.balance(), Decimal::new(300, 0));
        assert_eq!(w.entries().len(), 2);
        assert_eq!(w.take_events().len(), 2);
    }

    #[test]
    fn test_insufficient_balance_leaves_balance_unchanged() {
        let mut w = Wallet::restore(Uuid::new_v4(), Decimal::new(100, 0));
        let err = w.debit(Decimal::new(150, 0), "Order payment", None).unwrap_err();
        assert_eq!(err, WalletError::InsufficientBalance { balance: Decimal::new(100, 0), requested: Decimal::new(150, 0) });
        assert_eq!(w.balance(), Decimal::new(100, 0));
        assert!(w.entries().is_empty());
        assert!(w.take_events().is_empty());
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        let mut w = Wallet::open(Uuid::new_v4());
        assert_eq!(w.credit(Decimal::ZERO, "x", None).unwrap_err(), WalletError::InvalidAmount);
        assert_eq!(w.debit(Decimal::new(-5, 0), "x", None).unwrap_err(), WalletError::InvalidAmount);
    }

    #[test]
    fn test_exact_balance_debit() {
        let mut w = Wallet::restore(Uuid::new_v4(), Decimal::new(250, 0));
        w.debit(Decimal::new(250, 0), "Order payment", None).unwrap();
        assert!(w.balance().is_zero());
    }
}
