//! Order matching engine.
//!
//! For one newly-accepted order this repeatedly consumes counter-orders
//! under price-time priority, computes execution price/quantity, and
//! settles funds and shares — all inside the same transaction that
//! inserted the order, so the `FOR UPDATE` locks taken while selecting
//! counter-orders serialize concurrent matchers on the same symbol.

mod book;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::store::{StoreError, Tx};

#[derive(Debug, Error)]
pub enum MatchingError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Run the matching loop for a newly-inserted order against resting
/// counter-orders on the same symbol, inside `tx`.
///
/// `amount` is the order's signed amount (positive = buy); `limit` is its
/// limit price; `order_time` is its commit-visible creation timestamp.
pub async fn match_order(
    tx: &mut Tx<'_>,
    order_id: i64,
    symbol: &str,
    account_id: &str,
    amount: Decimal,
    limit: Decimal,
    order_time: DateTime<Utc>,
) -> Result<(), MatchingError> {
    let is_buy = amount.is_sign_positive();
    let mut remaining = amount.abs();

    let candidates = book::select_counter_orders(tx, symbol, is_buy, limit).await?;

    for candidate in candidates {
        if remaining.is_zero() {
            break;
        }

        // The resting order sets the price unless it arrived after the
        // new order (which cannot happen under FIFO selection, but the
        // rule is expressed in terms of time regardless of fetch order).
        let execution_price = if candidate.time_created < order_time {
            candidate.limit_price
        } else {
            limit
        };
        let execution_quantity = remaining.min(candidate.remaining_amount);

        crate::store::Store::insert_execution(tx, order_id, execution_quantity, execution_price)
            .await?;
        crate::store::Store::insert_execution(
            tx,
            candidate.order_id,
            execution_quantity,
            execution_price,
        )
        .await?;

        crate::store::Store::decrement_remaining(tx, order_id, execution_quantity).await?;
        crate::store::Store::decrement_remaining(tx, candidate.order_id, execution_quantity)
            .await?;
        crate::store::Store::finalize_if_filled(tx, candidate.order_id).await?;

        let (buyer, seller) = if is_buy {
            (account_id, candidate.account_id.as_str())
        } else {
            (candidate.account_id.as_str(), account_id)
        };

        // Seller is always credited the full execution value, regardless
        // of whether a buyer refund also applies this fill.
        let proceeds = execution_quantity * execution_price;
        crate::store::Store::credit_balance(tx, seller, proceeds).await?;
        crate::store::Store::add_to_position_tx(tx, buyer, symbol, execution_quantity).await?;

        if is_buy && execution_price < limit {
            let refund = execution_quantity * (limit - execution_price);
            crate::store::Store::credit_balance(tx, account_id, refund).await?;
        }

        remaining -= execution_quantity;

        debug!(
            order_id,
            counter_order_id = candidate.order_id,
            %execution_quantity,
            %execution_price,
            "matched fill"
        );
    }

    crate::store::Store::finalize_if_filled(tx, order_id).await?;

    Ok(())
}
