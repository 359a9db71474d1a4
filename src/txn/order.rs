//! `<order>` handling: preflight debit/reserve, insert, match, commit.

use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::warn;

use crate::store::Store;
use crate::wire::response::ResultNode;

pub async fn handle(
    store: &Store,
    account_id: &str,
    sym: Option<String>,
    amount: Option<String>,
    limit: Option<String>,
) -> ResultNode {
    let Some(sym) = sym else {
        return ResultNode::error_order(None, amount, limit, "Invalid amount or limit value");
    };

    let (amount_val, limit_val) = match (
        amount.as_deref().and_then(|s| Decimal::from_str(s.trim()).ok()),
        limit.as_deref().and_then(|s| Decimal::from_str(s.trim()).ok()),
    ) {
        (Some(amount_val), Some(limit_val)) if limit_val.is_sign_positive() && !amount_val.is_zero() => {
            (amount_val, limit_val)
        }
        _ => {
            return ResultNode::error_order(
                Some(sym),
                amount,
                limit,
                "Invalid amount or limit value",
            )
        }
    };

    let amount_str = amount.unwrap_or_default();
    let limit_str = limit.unwrap_or_default();

    let is_buy = amount_val.is_sign_positive();
    let abs_amount = amount_val.abs();

    let result = run(store, account_id, &sym, amount_val, limit_val, is_buy, abs_amount).await;

    match result {
        Ok(Outcome::Opened { order_id }) => ResultNode::Opened {
            id: order_id,
            sym,
            amount: amount_str,
            limit: limit_str,
        },
        Ok(Outcome::Rejected(text)) => {
            ResultNode::error_order(Some(sym), Some(amount_str), Some(limit_str), text)
        }
        Err(err) => {
            warn!(error = %err, %account_id, %sym, "order processing failed");
            ResultNode::error_order(Some(sym), Some(amount_str), Some(limit_str), "Database error")
        }
    }
}

enum Outcome {
    Opened { order_id: i64 },
    Rejected(&'static str),
}

async fn run(
    store: &Store,
    account_id: &str,
    sym: &str,
    amount_val: Decimal,
    limit_val: Decimal,
    is_buy: bool,
    abs_amount: Decimal,
) -> Result<Outcome, crate::matching::MatchingError> {
    let mut tx = store.begin().await?;

    if is_buy {
        let limit_cost = amount_val * limit_val;
        let balance = match Store::get_balance_for_update(&mut tx, account_id).await? {
            Some(balance) => balance,
            None => return Ok(Outcome::Rejected("Account not found")),
        };

        if balance < limit_cost {
            return Ok(Outcome::Rejected("Insufficient funds"));
        }

        Store::debit_balance(&mut tx, account_id, limit_cost).await?;
    } else {
        let held = Store::get_position_for_update(&mut tx, account_id, sym).await?;
        if held.map(|amount| amount < abs_amount).unwrap_or(true) {
            return Ok(Outcome::Rejected("Insufficient shares"));
        }

        Store::decrement_position(&mut tx, account_id, sym, abs_amount).await?;
    }

    let (order_id, order_time) =
        Store::insert_order(&mut tx, account_id, sym, amount_val, limit_val).await?;

    crate::matching::match_order(
        &mut tx, order_id, sym, account_id, amount_val, limit_val, order_time,
    )
    .await?;

    tx.commit()
        .await
        .map_err(crate::store::StoreError::from)?;
    Ok(Outcome::Opened { order_id })
}
