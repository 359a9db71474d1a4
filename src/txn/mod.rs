//! Dispatches `<transactions id=ACCT>` children to the order, query and
//! cancel handlers.

mod cancel;
mod order;
mod query;

use tracing::warn;

use crate::store::Store;
use crate::wire::request::TxnChild;
use crate::wire::response::ResultNode;

/// Run every child of a `<transactions>` envelope against `store`,
/// returning one [`ResultNode`] per recognized child in input order.
///
/// If `account_id` does not name an existing account, every child is
/// answered with `<error ...>Invalid account</error>` — the children are
/// never executed. Otherwise each child runs independently: one child's
/// failure has no effect on its siblings.
pub async fn handle_transactions(
    store: &Store,
    account_id: Option<String>,
    children: Vec<TxnChild>,
) -> Vec<ResultNode> {
    let Some(account_id) = account_id else {
        return children
            .iter()
            .map(|child| invalid_account_error(child))
            .collect();
    };

    let exists = match store.account_exists(&account_id).await {
        Ok(exists) => exists,
        Err(err) => {
            warn!(error = %err, %account_id, "account_exists preflight failed");
            false
        }
    };

    if !exists {
        return children
            .iter()
            .map(|child| invalid_account_error(child))
            .collect();
    }

    let mut results = Vec::with_capacity(children.len());
    for child in children {
        match child {
            TxnChild::Order { sym, amount, limit } => {
                results.push(order::handle(store, &account_id, sym, amount, limit).await);
            }
            TxnChild::Query { id } => {
                results.push(query::handle(store, id).await);
            }
            TxnChild::Cancel { id } => {
                results.push(cancel::handle(store, id).await);
            }
        }
    }
    results
}

fn invalid_account_error(child: &TxnChild) -> ResultNode {
    match child {
        TxnChild::Order { sym, amount, limit } => ResultNode::error_order(
            sym.clone(),
            amount.clone(),
            limit.clone(),
            "Invalid account",
        ),
        TxnChild::Query { id } => ResultNode::error_id(id.clone(), "Invalid account"),
        TxnChild::Cancel { id } => ResultNode::error_id(id.clone(), "Invalid account"),
    }
}
