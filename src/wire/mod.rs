//! Line-framed XML request/response codec and top-level dispatch.
//!
//! A connection handler (see `net`) hands one already-unframed payload to
//! [`process`] and writes back the returned payload, unframed the same way.

pub mod request;
pub mod response;

use crate::provision;
use crate::store::Store;
use crate::txn;
use request::Request;
use response::{render, top_level_error};

/// Parse, dispatch, and render one request payload into its response
/// payload. Never returns an error — a malformed/unrecognized request
/// becomes a top-level `<error>` per the wire contract, same as any
/// other outcome.
pub async fn process(store: &Store, payload: &str) -> String {
    match request::parse(payload) {
        Ok(Request::Create(children)) => render(&provision::handle_create(store, children).await),
        Ok(Request::Transactions { account_id, children }) => {
            render(&txn::handle_transactions(store, account_id, children).await)
        }
        Err(request::WireError::Malformed) => top_level_error("Invalid XML format"),
        Err(request::WireError::UnknownRoot) => top_level_error("Unknown request type"),
    }
}
