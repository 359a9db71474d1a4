//! `<query>` handling: read-only order status lookup.
//!
//! Deliberately ignores the enclosing `<transactions>` account — any
//! account may query any order id. This is a known authorization gap in
//! the wire protocol, preserved here rather than fixed.

use tracing::warn;

use crate::models::OrderStatus;
use crate::store::Store;
use crate::wire::response::{ResultNode, StatusEntry};

pub async fn handle(store: &Store, id: Option<String>) -> ResultNode {
    let Some(id_str) = id else {
        return ResultNode::error_id(None, "Invalid transaction ID");
    };

    let order_id: i64 = match id_str.trim().parse() {
        Ok(order_id) => order_id,
        Err(_) => return ResultNode::error_id(Some(id_str), "Invalid transaction ID"),
    };

    match run(store, order_id).await {
        Ok(Some(entries)) => ResultNode::Status { id: order_id, entries },
        Ok(None) => ResultNode::error_id(Some(id_str), "Order not found"),
        Err(err) => {
            warn!(error = %err, order_id, "query failed");
            ResultNode::error_id(Some(id_str), "Database error")
        }
    }
}

async fn run(
    store: &Store,
    order_id: i64,
) -> Result<Option<Vec<StatusEntry>>, crate::store::StoreError> {
    let Some(order) = store.get_order(order_id).await? else {
        return Ok(None);
    };

    let mut entries = Vec::new();

    if order.status == OrderStatus::Open && !order.remaining_amount.is_zero() {
        entries.push(StatusEntry::Open {
            shares: order.remaining_amount,
        });
    }

    if order.status == OrderStatus::Canceled {
        if let Some(marker) = store.get_cancellation_marker(order_id).await? {
            entries.push(StatusEntry::Canceled {
                shares: order.remaining_amount,
                time: marker.time_executed.timestamp(),
            });
        }
    }

    for fill in store.get_fills(order_id).await? {
        entries.push(StatusEntry::Executed {
            shares: fill.shares,
            price: fill.price,
            time: fill.time_executed.timestamp(),
        });
    }

    Ok(Some(entries))
}
