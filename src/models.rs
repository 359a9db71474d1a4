//! Core domain types shared by the store, matcher and wire layers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle state of an [`Order`].
///
/// The wire protocol and this enum both spell the terminal state
/// `canceled` (single "l") uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Executed,
    Canceled,
}

/// A provisioned trading account.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub account_id: String,
    pub balance: Decimal,
}

/// A per-(account, symbol) share holding.
#[derive(Debug, Clone, FromRow)]
pub struct Position {
    pub account_id: String,
    pub symbol: String,
    pub amount: Decimal,
}

/// A resting or historical order.
///
/// `amount` carries the sign (positive = buy, negative = sell); the sign
/// is immutable once the order is created.
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub order_id: i64,
    pub account_id: String,
    pub symbol: String,
    pub amount: Decimal,
    pub limit_price: Decimal,
    pub remaining_amount: Decimal,
    pub status: OrderStatus,
    pub time_created: DateTime<Utc>,
}

impl Order {
    pub fn is_buy(&self) -> bool {
        self.amount.is_sign_positive()
    }
}

/// An order eligible to match, as read back from the book query.
///
/// A narrower projection of [`Order`] carrying only the fields the
/// matcher needs, so the `FOR UPDATE` select doesn't have to hydrate
/// the full row.
#[derive(Debug, Clone, FromRow)]
pub struct CounterOrder {
    pub order_id: i64,
    pub account_id: String,
    pub limit_price: Decimal,
    pub remaining_amount: Decimal,
    pub time_created: DateTime<Utc>,
}

/// A single fill or cancellation marker on an order.
///
/// `shares = 0 ∧ price = 0` marks the cancellation event rather than a
/// fill; everything else is an append-only trade record.
#[derive(Debug, Clone, FromRow)]
pub struct Execution {
    pub order_id: i64,
    pub shares: Decimal,
    pub price: Decimal,
    pub time_executed: DateTime<Utc>,
}
