//! Applies `<create>` envelopes: accounts, symbols, seed positions.

use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::warn;

use crate::store::Store;
use crate::wire::request::{CreateChild, SymbolPosition};
use crate::wire::response::ResultNode;

/// Apply the children of a `<create>` envelope in order, producing one
/// result node per sub-operation.
pub async fn handle_create(store: &Store, children: Vec<CreateChild>) -> Vec<ResultNode> {
    let mut results = Vec::with_capacity(children.len());

    for child in children {
        match child {
            CreateChild::Account { id, balance } => {
                if let Some(node) = create_account(store, id, balance).await {
                    results.push(node);
                }
            }
            CreateChild::Symbol { sym, positions } => {
                results.extend(create_symbol(store, sym, positions).await);
            }
        }
    }

    results
}

/// Returns `None` when the account already existed — a `<created>` node is
/// only emitted for a row actually inserted; a conflict is silent.
async fn create_account(
    store: &Store,
    id: Option<String>,
    balance: Option<String>,
) -> Option<ResultNode> {
    let (id, balance_str) = match (id, balance) {
        (Some(id), Some(balance)) => (id, balance),
        (id, _) => {
            return Some(ResultNode::error_id(id, "Missing required attributes"));
        }
    };

    let balance = match Decimal::from_str(balance_str.trim()) {
        Ok(balance) if balance.is_sign_positive() || balance.is_zero() => balance,
        _ => return Some(ResultNode::error_id(Some(id), "Invalid balance value")),
    };

    match store.create_account(&id, balance).await {
        Ok(true) => Some(ResultNode::Created { id: Some(id), sym: None }),
        Ok(false) => None,
        Err(err) => {
            warn!(error = %err, account_id = %id, "create_account failed");
            Some(ResultNode::error_id(Some(id), "Database error"))
        }
    }
}

async fn create_symbol(
    store: &Store,
    sym: Option<String>,
    positions: Vec<SymbolPosition>,
) -> Vec<ResultNode> {
    let Some(sym) = sym else {
        return vec![ResultNode::error_sym(None, None, "Missing required attributes")];
    };

    if let Err(err) = store.create_symbol(&sym).await {
        warn!(error = %err, symbol = %sym, "create_symbol failed");
        return vec![ResultNode::error_sym(Some(sym), None, "Database error")];
    }

    let mut results = Vec::with_capacity(positions.len());
    for position in positions {
        results.push(add_position(store, &sym, position).await);
    }
    results
}

async fn add_position(store: &Store, sym: &str, position: SymbolPosition) -> ResultNode {
    let SymbolPosition { account_id, amount } = position;

    let amount = match Decimal::from_str(amount.trim()) {
        Ok(amount) if amount.is_sign_positive() || amount.is_zero() => amount,
        _ => return ResultNode::error_sym(Some(sym.to_string()), Some(account_id), "Invalid amount"),
    };

    match store.account_exists(&account_id).await {
        Ok(false) => {
            return ResultNode::error_sym(
                Some(sym.to_string()),
                Some(account_id),
                "Account does not exist",
            )
        }
        Err(err) => {
            warn!(error = %err, account_id = %account_id, "account_exists check failed");
            return ResultNode::error_sym(Some(sym.to_string()), Some(account_id), "Database error");
        }
        Ok(true) => {}
    }

    match crate::store::Store::add_to_position(store, &account_id, sym, amount).await {
        Ok(()) => ResultNode::Created {
            id: Some(account_id),
            sym: Some(sym.to_string()),
        },
        Err(err) => {
            warn!(error = %err, account_id = %account_id, symbol = %sym, "add_to_position failed");
            ResultNode::error_sym(Some(sym.to_string()), Some(account_id), "Database error")
        }
    }
}
