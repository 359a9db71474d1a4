//! `<cancel>` handling: terminate an open order and refund its unfilled
//! portion.

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
        Ok(Outcome::Canceled(entries)) => ResultNode::Canceled { id: order_id, entries },
        Ok(Outcome::Rejected(text)) => ResultNode::error_id(Some(id_str), text),
        Err(err) => {
            warn!(error = %err, order_id, "cancel failed");
            ResultNode::error_id(Some(id_str), "Database error")
        }
    }
}

enum Outcome {
    Canceled(Vec<StatusEntry>),
    Rejected(&'static str),
}

async fn run(store: &Store, order_id: i64) -> Result<Outcome, crate::store::StoreError> {
    let mut tx = store.begin().await?;

    let Some(order) = Store::get_order_for_update(&mut tx, order_id).await? else {
        return Ok(Outcome::Rejected("Order not found"));
    };

    if order.status != OrderStatus::Open || order.remaining_amount.is_zero() {
        return Ok(Outcome::Rejected("Order cannot be canceled"));
    }

    Store::set_order_status(&mut tx, order_id, OrderStatus::Canceled).await?;
    let marker_time = Store::insert_execution(
        &mut tx,
        order_id,
        rust_decimal::Decimal::ZERO,
        rust_decimal::Decimal::ZERO,
    )
    .await?;

    if order.is_buy() {
        let refund = order.remaining_amount * order.limit_price;
        Store::credit_balance(&mut tx, &order.account_id, refund).await?;
    } else {
        Store::add_to_position_tx(&mut tx, &order.account_id, &order.symbol, order.remaining_amount)
            .await?;
    }

    let mut entries = vec![StatusEntry::Canceled {
        shares: order.remaining_amount,
        time: marker_time.timestamp(),
    }];
    for fill in Store::get_fills_tx(&mut tx, order_id).await? {
        entries.push(StatusEntry::Executed {
            shares: fill.shares,
            price: fill.price,
            time: fill.time_executed.timestamp(),
        });
    }

    tx.commit().await?;
    Ok(Outcome::Canceled(entries))
}
