//! Builds the `<results>` response envelope from typed outcome nodes.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use rust_decimal::Decimal;
use std::io::Cursor;

/// One child-slot outcome inside a `<status>`/`<canceled>` body, in the
/// order they should be written.
#[derive(Debug)]
pub enum StatusEntry {
    Open { shares: Decimal },
    Canceled { shares: Decimal, time: i64 },
    Executed { shares: Decimal, price: Decimal, time: i64 },
}

/// One outcome of a single request child, composed in input order into
/// the enclosing `<results>` element.
#[derive(Debug)]
pub enum ResultNode {
    Created {
        id: Option<String>,
        sym: Option<String>,
    },
    Opened {
        id: i64,
        sym: String,
        amount: String,
        limit: String,
    },
    Status {
        id: i64,
        entries: Vec<StatusEntry>,
    },
    Canceled {
        id: i64,
        entries: Vec<StatusEntry>,
    },
    Error {
        sym: Option<String>,
        amount: Option<String>,
        limit: Option<String>,
        id: Option<String>,
        text: String,
    },
}

impl ResultNode {
    /// An `<error id=.../>` whose only identifying attribute is an id —
    /// the shape used by provisioner account failures, and by query/cancel.
    pub fn error_id(id: Option<String>, text: impl Into<String>) -> Self {
        ResultNode::Error {
            sym: None,
            amount: None,
            limit: None,
            id,
            text: text.into(),
        }
    }

    /// An `<error sym=... id=.../>` — the shape used by provisioner
    /// symbol/position failures.
    pub fn error_sym(sym: Option<String>, id: Option<String>, text: impl Into<String>) -> Self {
        ResultNode::Error {
            sym,
            amount: None,
            limit: None,
            id,
            text: text.into(),
        }
    }

    /// An `<error sym=... amount=... limit=.../>` — the shape used by
    /// order-entry failures, mirroring the submitted child's attributes.
    pub fn error_order(
        sym: Option<String>,
        amount: Option<String>,
        limit: Option<String>,
        text: impl Into<String>,
    ) -> Self {
        ResultNode::Error {
            sym,
            amount,
            limit,
            id: None,
            text: text.into(),
        }
    }
}

/// Wrap a malformed/unrecognized request in a top-level `<error>` — the
/// only case where no per-child outcome exists at all.
pub fn top_level_error(text: &str) -> String {
    render(&[ResultNode::Error {
        sym: None,
        amount: None,
        limit: None,
        id: None,
        text: text.to_string(),
    }])
}

/// Serialize a batch of outcomes into one `<results>...</results>` string,
/// preserving input order.
pub fn render(nodes: &[ResultNode]) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let results_start = BytesStart::new("results");
    writer
        .write_event(Event::Start(results_start))
        .expect("writing to an in-memory buffer cannot fail");

    for node in nodes {
        write_node(&mut writer, node);
    }

    writer
        .write_event(Event::End(BytesEnd::new("results")))
        .expect("writing to an in-memory buffer cannot fail");

    String::from_utf8(writer.into_inner().into_inner()).expect("writer only emits valid UTF-8")
}

fn write_node(writer: &mut Writer<Cursor<Vec<u8>>>, node: &ResultNode) {
    match node {
        ResultNode::Created { id, sym } => {
            let mut tag = BytesStart::new("created");
            if let Some(id) = id {
                tag.push_attribute(("id", id.as_str()));
            }
            if let Some(sym) = sym {
                tag.push_attribute(("sym", sym.as_str()));
            }
            writer.write_event(Event::Empty(tag)).unwrap();
        }
        ResultNode::Opened { id, sym, amount, limit } => {
            let mut tag = BytesStart::new("opened");
            tag.push_attribute(("sym", sym.as_str()));
            tag.push_attribute(("amount", amount.as_str()));
            tag.push_attribute(("limit", limit.as_str()));
            tag.push_attribute(("id", id.to_string().as_str()));
            writer.write_event(Event::Empty(tag)).unwrap();
        }
        ResultNode::Status { id, entries } => {
            write_container(writer, "status", &id.to_string(), entries);
        }
        ResultNode::Canceled { id, entries } => {
            write_container(writer, "canceled", &id.to_string(), entries);
        }
        ResultNode::Error {
            sym,
            amount,
            limit,
            id,
            text,
        } => {
            let mut tag = BytesStart::new("error");
            if let Some(sym) = sym {
                tag.push_attribute(("sym", sym.as_str()));
            }
            if let Some(amount) = amount {
                tag.push_attribute(("amount", amount.as_str()));
            }
            if let Some(limit) = limit {
                tag.push_attribute(("limit", limit.as_str()));
            }
            if let Some(id) = id {
                tag.push_attribute(("id", id.as_str()));
            }
            writer.write_event(Event::Start(tag)).unwrap();
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .unwrap();
            writer.write_event(Event::End(BytesEnd::new("error"))).unwrap();
        }
    }
}

fn write_container(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    tag_name: &str,
    id: &str,
    entries: &[StatusEntry],
) {
    let mut tag = BytesStart::new(tag_name);
    tag.push_attribute(("id", id));
    writer.write_event(Event::Start(tag)).unwrap();

    for entry in entries {
        let entry_tag = match entry {
            StatusEntry::Open { shares } => {
                let mut t = BytesStart::new("open");
                t.push_attribute(("shares", shares.to_string().as_str()));
                t
            }
            StatusEntry::Canceled { shares, time } => {
                let mut t = BytesStart::new("canceled");
                t.push_attribute(("shares", shares.to_string().as_str()));
                t.push_attribute(("time", time.to_string().as_str()));
                t
            }
            StatusEntry::Executed { shares, price, time } => {
                let mut t = BytesStart::new("executed");
                t.push_attribute(("shares", shares.to_string().as_str()));
                t.push_attribute(("price", price.to_string().as_str()));
                t.push_attribute(("time", time.to_string().as_str()));
                t
            }
        };
        writer.write_event(Event::Empty(entry_tag)).unwrap();
    }

    writer
        .write_event(Event::End(BytesEnd::new(tag_name)))
        .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn renders_created_account() {
        let xml = render(&[ResultNode::Created {
            id: Some("a1".to_string()),
            sym: None,
        }]);
        assert_eq!(xml, r#"<results><created id="a1"/></results>"#);
    }

    #[test]
    fn renders_opened_order() {
        let xml = render(&[ResultNode::Opened {
            id: 7,
            sym: "GOOG".to_string(),
            amount: "-10".to_string(),
            limit: "150".to_string(),
        }]);
        assert_eq!(
            xml,
            r#"<results><opened sym="GOOG" amount="-10" limit="150" id="7"/></results>"#
        );
    }

    #[test]
    fn renders_status_with_open_entry() {
        let xml = render(&[ResultNode::Status {
            id: 3,
            entries: vec![StatusEntry::Open { shares: dec!(5) }],
        }]);
        assert_eq!(
            xml,
            r#"<results><status id="3"><open shares="5"/></status></results>"#
        );
    }

    #[test]
    fn renders_canceled_with_refund_and_fills() {
        let xml = render(&[ResultNode::Canceled {
            id: 9,
            entries: vec![
                StatusEntry::Canceled {
                    shares: dec!(10),
                    time: 1_700_000_000,
                },
                StatusEntry::Executed {
                    shares: dec!(5),
                    price: dec!(150),
                    time: 1_699_999_000,
                },
            ],
        }]);
        assert_eq!(
            xml,
            r#"<results><canceled id="9"><canceled shares="10" time="1700000000"/><executed shares="5" price="150" time="1699999000"/></canceled></results>"#
        );
    }

    #[test]
    fn renders_order_error_mirroring_attributes() {
        let xml = render(&[ResultNode::error_order(
            Some("X".to_string()),
            Some("10".to_string()),
            Some("100".to_string()),
            "Insufficient funds",
        )]);
        assert_eq!(
            xml,
            r#"<results><error sym="X" amount="10" limit="100">Insufficient funds</error></results>"#
        );
    }

    #[test]
    fn top_level_error_has_no_attributes() {
        assert_eq!(
            top_level_error("Invalid XML format"),
            r#"<results><error>Invalid XML format</error></results>"#
        );
    }
}
