//! Counter-order retrieval under price-time priority.

use rust_decimal::Decimal;

use crate::models::CounterOrder;
use crate::store::{Store, StoreError, Tx};

/// Candidates for a buy are open sells with `limit_price <= limit`,
/// ordered `(limit_price ASC, time_created ASC)`; for a sell they are
/// open buys with `limit_price >= limit`, ordered `(limit_price DESC,
/// time_created ASC)`. Both orderings break ties on `order_id`.
///
/// Rows are acquired under `FOR UPDATE`, which is what actually
/// serializes concurrent matchers on the same symbol — the ordering
/// only decides who a given matcher consumes first.
pub async fn select_counter_orders(
    tx: &mut Tx<'_>,
    symbol: &str,
    is_buy: bool,
    limit: Decimal,
) -> Result<Vec<CounterOrder>, StoreError> {
    Store::select_counter_orders_for_update(tx, symbol, is_buy, limit).await
}
