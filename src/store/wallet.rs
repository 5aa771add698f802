//! Wallet writes. Both run on a caller-owned transaction; the debit's
//! conditional `UPDATE` is what stops two concurrent debits overspending.

use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::aggregates::{Wallet, WalletEntry, WalletError};
use crate::domain::events::DomainEvent;
use crate::error::Result;

pub async fn open_wallet(conn: &mut PgConnection, user_id: Uuid) -> Result<()> {
    sqlx::query("INSERT INTO wallets (user_id, balance, updated_at) VALUES ($1, 0, NOW()) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn lock_wallet(conn: &mut PgConnection, user_id: Uuid) -> Result<Wallet> {
    let balance: Decimal = sqlx::query_scalar("SELECT balance FROM wallets WHERE user_id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(WalletError::NotFound)?;
    Ok(Wallet::restore(user_id, balance))
}

async fn insert_entry(conn: &mut PgConnection, entry: &WalletEntry) -> Result<()> {
    sqlx::query("INSERT INTO wallet_transactions (id, user_id, kind, amount, balance_after, description, order_id, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
        .bind(entry.id).bind(entry.user_id).bind(entry.kind).bind(entry.amount).bind(entry.balance_after)
        .bind(&entry.description).bind(entry.order_id).bind(entry.created_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[tracing::instrument(skip(conn))]
pub async fn credit(conn: &mut PgConnection, user_id: Uuid, amount: Decimal, description: &str, order_id: Option<Uuid>) -> Result<(WalletEntry, Vec<DomainEvent>)> {
    let mut wallet = lock_wallet(conn, user_id).await?;
    let mut entry = wallet.credit(amount, description, order_id)?.clone();
    entry.balance_after = sqlx::query_scalar("UPDATE wallets SET balance = balance + $1, updated_at = NOW() WHERE user_id = $2 RETURNING balance")
        .bind(amount)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
    insert_entry(conn, &entry).await?;
    tracing::info!(balance = %entry.balance_after, "wallet credited");
    Ok((entry, wallet.take_events()))
}

#[tracing::instrument(skip(conn))]
pub async fn debit(conn: &mut PgConnection, user_id: Uuid, amount: Decimal, description: &str, order_id: Option<Uuid>) -> Result<(WalletEntry, Vec<DomainEvent>)> {
    let mut wallet = lock_wallet(conn, user_id).await?;
    let balance = wallet.balance();
    let mut entry = wallet.debit(amount, description, order_id)?.clone();
    let remaining: Option<Decimal> = sqlx::query_scalar("UPDATE wallets SET balance = balance - $1, updated_at = NOW() WHERE user_id = $2 AND balance >= $1 RETURNING balance")
        .bind(amount)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(remaining) = remaining else {
        tracing::warn!(%balance, "wallet debit refused");
        return Err(WalletError::InsufficientBalance { balance, requested: amount }.into());
    };
    entry.balance_after = remaining;
    insert_entry(conn, &entry).await?;
    tracing::info!(balance = %remaining, "wallet debited");
    Ok((entry, wallet.take_events()))
}
