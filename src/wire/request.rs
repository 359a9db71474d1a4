//! Parses the wire XML into typed requests.
//!
//! Two root shapes are accepted: `<create>` and `<transactions id=ACCT>`.
//! Attribute values that are missing or unparseable are carried through
//! as `Option<String>`/raw strings rather than rejected at parse time —
//! validation and the resulting `<error>` text are a provisioning/
//! transaction-handler concern, not a parsing one, matching the wire
//! protocol's per-child error reporting.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid XML format")]
    Malformed,

    #[error("unknown request type")]
    UnknownRoot,
}

#[derive(Debug)]
pub enum Request {
    Create(Vec<CreateChild>),
    Transactions {
        account_id: Option<String>,
        children: Vec<TxnChild>,
    },
}

#[derive(Debug)]
pub enum CreateChild {
    Account {
        id: Option<String>,
        balance: Option<String>,
    },
    Symbol {
        sym: Option<String>,
        positions: Vec<SymbolPosition>,
    },
}

#[derive(Debug)]
pub struct SymbolPosition {
    pub account_id: String,
    pub amount: String,
}

#[derive(Debug)]
pub enum TxnChild {
    Order {
        sym: Option<String>,
        amount: Option<String>,
        limit: Option<String>,
    },
    Query {
        id: Option<String>,
    },
    Cancel {
        id: Option<String>,
    },
}

fn attr(tag: &BytesStart, name: &str) -> Option<String> {
    tag.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name.as_bytes())
        .map(|a| a.unescape_value().unwrap_or_default().into_owned())
}

/// Parse one framed request payload into a [`Request`].
pub fn parse(xml: &str) -> Result<Request, WireError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event().map_err(|_| WireError::Malformed)? {
            Event::Start(tag) => {
                return match tag.local_name().as_ref() {
                    b"create" => parse_create(&mut reader),
                    b"transactions" => parse_transactions(&mut reader, &tag),
                    _ => Err(WireError::UnknownRoot),
                };
            }
            Event::Empty(tag) => {
                return match tag.local_name().as_ref() {
                    b"create" => Ok(Request::Create(Vec::new())),
                    b"transactions" => Ok(Request::Transactions {
                        account_id: attr(&tag, "id"),
                        children: Vec::new(),
                    }),
                    _ => Err(WireError::UnknownRoot),
                };
            }
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => continue,
            Event::Eof => return Err(WireError::Malformed),
            _ => continue,
        }
    }
}

fn parse_create(reader: &mut Reader<&[u8]>) -> Result<Request, WireError> {
    let mut children = Vec::new();

    loop {
        match reader.read_event().map_err(|_| WireError::Malformed)? {
            Event::Start(tag) if tag.local_name().as_ref() == b"account" => {
                let id = attr(&tag, "id");
                let balance = attr(&tag, "balance");
                skip_to_end(reader, &tag)?;
                children.push(CreateChild::Account { id, balance });
            }
            Event::Empty(tag) if tag.local_name().as_ref() == b"account" => {
                let id = attr(&tag, "id");
                let balance = attr(&tag, "balance");
                children.push(CreateChild::Account { id, balance });
            }
            Event::Start(tag) if tag.local_name().as_ref() == b"symbol" => {
                let sym = attr(&tag, "sym");
                let positions = parse_symbol_positions(reader)?;
                children.push(CreateChild::Symbol { sym, positions });
            }
            Event::Empty(tag) if tag.local_name().as_ref() == b"symbol" => {
                let sym = attr(&tag, "sym");
                children.push(CreateChild::Symbol {
                    sym,
                    positions: Vec::new(),
                });
            }
            Event::End(tag) if tag.local_name().as_ref() == b"create" => break,
            Event::Eof => return Err(WireError::Malformed),
            _ => continue,
        }
    }

    Ok(Request::Create(children))
}

fn parse_symbol_positions(reader: &mut Reader<&[u8]>) -> Result<Vec<SymbolPosition>, WireError> {
    let mut positions = Vec::new();

    loop {
        match reader.read_event().map_err(|_| WireError::Malformed)? {
            Event::Start(tag) if tag.local_name().as_ref() == b"account" => {
                let account_id = attr(&tag, "id").unwrap_or_default();
                let amount = read_text_until_end(reader, &tag)?;
                positions.push(SymbolPosition { account_id, amount });
            }
            Event::Empty(tag) if tag.local_name().as_ref() == b"account" => {
                let account_id = attr(&tag, "id").unwrap_or_default();
                positions.push(SymbolPosition {
                    account_id,
                    amount: "0".to_string(),
                });
            }
            Event::End(tag) if tag.local_name().as_ref() == b"symbol" => break,
            Event::Eof => return Err(WireError::Malformed),
            _ => continue,
        }
    }

    Ok(positions)
}

fn parse_transactions(reader: &mut Reader<&[u8]>, root: &BytesStart) -> Result<Request, WireError> {
    let account_id = attr(root, "id");
    let mut children = Vec::new();

    loop {
        match reader.read_event().map_err(|_| WireError::Malformed)? {
            Event::Start(tag) | Event::Empty(tag) => {
                let local = tag.local_name().as_ref().to_vec();
                match local.as_slice() {
                    b"order" => {
                        children.push(TxnChild::Order {
                            sym: attr(&tag, "sym"),
                            amount: attr(&tag, "amount"),
                            limit: attr(&tag, "limit"),
                        });
                    }
                    b"query" => children.push(TxnChild::Query { id: attr(&tag, "id") }),
                    b"cancel" => children.push(TxnChild::Cancel { id: attr(&tag, "id") }),
                    other => {
                        tracing::warn!(
                            tag = %String::from_utf8_lossy(other),
                            "unknown transaction child tag"
                        );
                    }
                }
            }
            Event::End(tag) if tag.local_name().as_ref() == b"transactions" => break,
            Event::Eof => return Err(WireError::Malformed),
            _ => continue,
        }
    }

    Ok(Request::Transactions {
        account_id,
        children,
    })
}

fn skip_to_end(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<(), WireError> {
    let name = start.name().as_ref().to_vec();
    loop {
        match reader.read_event().map_err(|_| WireError::Malformed)? {
            Event::End(tag) if tag.name().as_ref() == name.as_slice() => return Ok(()),
            Event::Eof => return Err(WireError::Malformed),
            _ => continue,
        }
    }
}

fn read_text_until_end(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<String, WireError> {
    let name = start.name().as_ref().to_vec();
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(|_| WireError::Malformed)? {
            Event::Text(bytes) => {
                text.push_str(&bytes.unescape().map_err(|_| WireError::Malformed)?);
            }
            Event::End(tag) if tag.name().as_ref() == name.as_slice() => {
                return Ok(if text.trim().is_empty() {
                    "0".to_string()
                } else {
                    text.trim().to_string()
                });
            }
            Event::Eof => return Err(WireError::Malformed),
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_create_account() {
        let xml = r#"<create><account id="a1" balance="100.00"/></create>"#;
        let req = parse(xml).unwrap();
        match req {
            Request::Create(children) => {
                assert_eq!(children.len(), 1);
                match &children[0] {
                    CreateChild::Account { id, balance } => {
                        assert_eq!(id.as_deref(), Some("a1"));
                        assert_eq!(balance.as_deref(), Some("100.00"));
                    }
                    _ => panic!("expected account"),
                }
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn parses_symbol_with_positions() {
        let xml = r#"<create><symbol sym="X"><account id="a1">10</account></symbol></create>"#;
        let req = parse(xml).unwrap();
        match req {
            Request::Create(children) => match &children[0] {
                CreateChild::Symbol { sym, positions } => {
                    assert_eq!(sym.as_deref(), Some("X"));
                    assert_eq!(positions.len(), 1);
                    assert_eq!(positions[0].account_id, "a1");
                    assert_eq!(positions[0].amount, "10");
                }
                _ => panic!("expected symbol"),
            },
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn parses_transactions_with_mixed_children() {
        let xml = r#"<transactions id="acct"><order sym="X" amount="10" limit="5.00"/><query id="1"/><cancel id="2"/></transactions>"#;
        let req = parse(xml).unwrap();
        match req {
            Request::Transactions { account_id, children } => {
                assert_eq!(account_id.as_deref(), Some("acct"));
                assert_eq!(children.len(), 3);
            }
            _ => panic!("expected transactions"),
        }
    }

    #[test]
    fn rejects_malformed_xml() {
        let xml = r#"<create><account id="a1""#;
        assert!(matches!(parse(xml), Err(WireError::Malformed)));
    }

    #[test]
    fn rejects_unknown_root() {
        let xml = r#"<bogus/>"#;
        assert!(matches!(parse(xml), Err(WireError::UnknownRoot)));
    }

    #[test]
    fn tolerates_xml_declaration() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<create><account id=\"a1\" balance=\"1\"/></create>";
        assert!(matches!(parse(xml), Ok(Request::Create(_))));
    }
}
