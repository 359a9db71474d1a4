//! Transactional access to accounts, positions, symbols, orders and
//! executions.
//!
//! `Store` owns the connection pool and exposes narrow, typed operations;
//! no business logic lives here. Everything a caller needs done
//! atomically (order entry + match + settlement, cancel + refund) is
//! threaded through one `sqlx::Transaction` the caller drives, so lock
//! scope matches transaction scope.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;

use crate::models::{Account, CounterOrder, Execution, Order, OrderStatus, Position};

pub type Tx<'a> = Transaction<'a, Postgres>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn begin(&self) -> Result<Tx<'_>, StoreError> {
        Ok(self.pool.begin().await?)
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    pub async fn account_exists(&self, account_id: &str) -> Result<bool, StoreError> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM accounts WHERE account_id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Insert a new account. Returns `true` only when a row was actually
    /// inserted, so repeated `<create>` of the same id is silently a
    /// no-op (`ON CONFLICT DO NOTHING`, race-free under concurrent
    /// identical creates since the check and the insert are one
    /// statement).
    pub async fn create_account(
        &self,
        account_id: &str,
        balance: Decimal,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO accounts (account_id, balance) VALUES ($1, $2) \
             ON CONFLICT (account_id) DO NOTHING",
        )
        .bind(account_id)
        .bind(balance)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_balance_for_update(
        tx: &mut Tx<'_>,
        account_id: &str,
    ) -> Result<Option<Decimal>, StoreError> {
        let row: Option<(Decimal,)> =
            sqlx::query_as("SELECT balance FROM accounts WHERE account_id = $1 FOR UPDATE")
                .bind(account_id)
                .fetch_optional(&mut **tx)
                .await?;
        Ok(row.map(|(balance,)| balance))
    }

    pub async fn debit_balance(
        tx: &mut Tx<'_>,
        account_id: &str,
        amount: Decimal,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE accounts SET balance = balance - $1 WHERE account_id = $2")
            .bind(amount)
            .bind(account_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn credit_balance(
        tx: &mut Tx<'_>,
        account_id: &str,
        amount: Decimal,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE accounts SET balance = balance + $1 WHERE account_id = $2")
            .bind(amount)
            .bind(account_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn get_account(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        let account =
            sqlx::query_as::<_, Account>("SELECT account_id, balance FROM accounts WHERE account_id = $1")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(account)
    }

    // ------------------------------------------------------------------
    // Symbols
    // ------------------------------------------------------------------

    pub async fn create_symbol(&self, symbol: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO symbols (symbol) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(symbol)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Positions
    // ------------------------------------------------------------------

    pub async fn get_position_for_update(
        tx: &mut Tx<'_>,
        account_id: &str,
        symbol: &str,
    ) -> Result<Option<Decimal>, StoreError> {
        let row: Option<(Decimal,)> = sqlx::query_as(
            "SELECT amount FROM positions WHERE account_id = $1 AND symbol = $2 FOR UPDATE",
        )
        .bind(account_id)
        .bind(symbol)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(|(amount,)| amount))
    }

    pub async fn decrement_position(
        tx: &mut Tx<'_>,
        account_id: &str,
        symbol: &str,
        amount: Decimal,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE positions SET amount = amount - $1 WHERE account_id = $2 AND symbol = $3",
        )
        .bind(amount)
        .bind(account_id)
        .bind(symbol)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Additive upsert: `amount` is added to the existing position (or a
    /// new zero-based position is created and then incremented).
    pub async fn add_to_position(
        executor: &Store,
        account_id: &str,
        symbol: &str,
        amount: Decimal,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO positions (account_id, symbol, amount) VALUES ($1, $2, $3) \
             ON CONFLICT (account_id, symbol) DO UPDATE SET amount = positions.amount + EXCLUDED.amount",
        )
        .bind(account_id)
        .bind(symbol)
        .bind(amount)
        .execute(&executor.pool)
        .await?;
        Ok(())
    }

    pub async fn add_to_position_tx(
        tx: &mut Tx<'_>,
        account_id: &str,
        symbol: &str,
        amount: Decimal,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO positions (account_id, symbol, amount) VALUES ($1, $2, $3) \
             ON CONFLICT (account_id, symbol) DO UPDATE SET amount = positions.amount + EXCLUDED.amount",
        )
        .bind(account_id)
        .bind(symbol)
        .bind(amount)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn get_position(
        &self,
        account_id: &str,
        symbol: &str,
    ) -> Result<Option<Position>, StoreError> {
        let position = sqlx::query_as::<_, Position>(
            "SELECT account_id, symbol, amount FROM positions WHERE account_id = $1 AND symbol = $2",
        )
        .bind(account_id)
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        Ok(position)
    }

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    /// Insert a new order with `status = open`, returning its
    /// server-issued id and commit-visible creation time.
    pub async fn insert_order(
        tx: &mut Tx<'_>,
        account_id: &str,
        symbol: &str,
        amount: Decimal,
        limit_price: Decimal,
    ) -> Result<(i64, DateTime<Utc>), StoreError> {
        let (order_id, time_created): (i64, DateTime<Utc>) = sqlx::query_as(
            "INSERT INTO orders (account_id, symbol, amount, limit_price, remaining_amount, status, time_created) \
             VALUES ($1, $2, $3, $4, $5, 'open', NOW()) \
             RETURNING order_id, time_created",
        )
        .bind(account_id)
        .bind(symbol)
        .bind(amount)
        .bind(limit_price)
        .bind(amount.abs())
        .fetch_one(&mut **tx)
        .await?;

        Ok((order_id, time_created))
    }

    /// Select open counter-orders eligible to match against `limit_price`,
    /// locked for the duration of the caller's transaction, in
    /// price-time priority order. Ties on identical price and
    /// `time_created` break on `order_id`, the monotonic tie-break the
    /// matcher relies on for determinism.
    pub async fn select_counter_orders_for_update(
        tx: &mut Tx<'_>,
        symbol: &str,
        is_buy: bool,
        limit_price: Decimal,
    ) -> Result<Vec<CounterOrder>, StoreError> {
        let rows = if is_buy {
            sqlx::query_as::<_, CounterOrder>(
                "SELECT order_id, account_id, limit_price, remaining_amount, time_created \
                 FROM orders \
                 WHERE symbol = $1 AND status = 'open' AND amount < 0 AND limit_price <= $2 \
                 ORDER BY limit_price ASC, time_created ASC, order_id ASC \
                 FOR UPDATE",
            )
            .bind(symbol)
            .bind(limit_price)
            .fetch_all(&mut **tx)
            .await?
        } else {
            sqlx::query_as::<_, CounterOrder>(
                "SELECT order_id, account_id, limit_price, remaining_amount, time_created \
                 FROM orders \
                 WHERE symbol = $1 AND status = 'open' AND amount > 0 AND limit_price >= $2 \
                 ORDER BY limit_price DESC, time_created ASC, order_id ASC \
                 FOR UPDATE",
            )
            .bind(symbol)
            .bind(limit_price)
            .fetch_all(&mut **tx)
            .await?
        };

        Ok(rows)
    }

    pub async fn decrement_remaining(
        tx: &mut Tx<'_>,
        order_id: i64,
        quantity: Decimal,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE orders SET remaining_amount = remaining_amount - $1 WHERE order_id = $2")
            .bind(quantity)
            .bind(order_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn set_order_status(
        tx: &mut Tx<'_>,
        order_id: i64,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE orders SET status = $1 WHERE order_id = $2")
            .bind(status)
            .bind(order_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Mark an order `executed` if its remaining amount has reached
    /// zero; a no-op otherwise. Used after each fill for both the
    /// resting counter-order and the new order.
    pub async fn finalize_if_filled(tx: &mut Tx<'_>, order_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE orders SET status = 'executed' \
             WHERE order_id = $1 AND remaining_amount = 0 AND status = 'open'",
        )
        .bind(order_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn get_order(&self, order_id: i64) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_as::<_, Order>(
            "SELECT order_id, account_id, symbol, amount, limit_price, remaining_amount, status, time_created \
             FROM orders WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    pub async fn get_order_for_update(
        tx: &mut Tx<'_>,
        order_id: i64,
    ) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_as::<_, Order>(
            "SELECT order_id, account_id, symbol, amount, limit_price, remaining_amount, status, time_created \
             FROM orders WHERE order_id = $1 FOR UPDATE",
        )
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(order)
    }

    // ------------------------------------------------------------------
    // Executions
    // ------------------------------------------------------------------

    pub async fn insert_execution(
        tx: &mut Tx<'_>,
        order_id: i64,
        shares: Decimal,
        price: Decimal,
    ) -> Result<DateTime<Utc>, StoreError> {
        let (time_executed,): (DateTime<Utc>,) = sqlx::query_as(
            "INSERT INTO executions (order_id, shares, price, time_executed) \
             VALUES ($1, $2, $3, NOW()) RETURNING time_executed",
        )
        .bind(order_id)
        .bind(shares)
        .bind(price)
        .fetch_one(&mut **tx)
        .await?;
        Ok(time_executed)
    }

    pub async fn get_fills(&self, order_id: i64) -> Result<Vec<Execution>, StoreError> {
        let rows = sqlx::query_as::<_, Execution>(
            "SELECT order_id, shares, price, time_executed FROM executions \
             WHERE order_id = $1 AND shares > 0 ORDER BY time_executed",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_fills_tx(
        tx: &mut Tx<'_>,
        order_id: i64,
    ) -> Result<Vec<Execution>, StoreError> {
        let rows = sqlx::query_as::<_, Execution>(
            "SELECT order_id, shares, price, time_executed FROM executions \
             WHERE order_id = $1 AND shares > 0 ORDER BY time_executed",
        )
        .bind(order_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows)
    }

    /// The cancellation-marker execution (`shares = 0, price = 0`) for an
    /// order, if it has one.
    pub async fn get_cancellation_marker(
        &self,
        order_id: i64,
    ) -> Result<Option<Execution>, StoreError> {
        let row = sqlx::query_as::<_, Execution>(
            "SELECT order_id, shares, price, time_executed FROM executions \
             WHERE order_id = $1 AND shares = 0 ORDER BY time_executed DESC LIMIT 1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
