//! Atom documents returned by a SWORD v2 server: deposit receipts (entries
//! carrying edit, edit-media and statement links) and Atom statements
//! (feeds whose state is given by categories).

use dip_core::StatementState;
use quick_xml::events::{BytesStart, Event};

/// Link relation of the statement link in a deposit receipt.
pub const STATEMENT_REL: &str = "http://purl.org/net/sword/terms/statement";

/// Category scheme that marks a state in an Atom statement.
pub const STATE_SCHEME: &str = "http://purl.org/net/sword/terms/state";

/// Links found in a deposit receipt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiptLinks {
    pub edit: Option<String>,
    pub edit_media: Option<String>,
    pub statement: Option<String>,
}

/// Extract the edit, edit-media and statement links from a receipt.
///
/// When the statement is offered in several serializations the Atom one is
/// preferred.
pub fn parse_receipt_links(xml: &str) -> Result<ReceiptLinks, AtomError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut links = ReceiptLinks::default();
    let mut statement_is_atom = false;
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                saw_root = true;
                if e.local_name().as_ref() != b"link" {
                    continue;
                }
                let rel = attribute(e, b"rel")?;
                let href = attribute(e, b"href")?;
                let (Some(rel), Some(href)) = (rel, href) else {
                    continue;
                };
                match rel.as_str() {
                    "edit" if links.edit.is_none() => links.edit = Some(href),
                    "edit-media" if links.edit_media.is_none() => links.edit_media = Some(href),
                    STATEMENT_REL => {
                        let is_atom = attribute(e, b"type")?
                            .map(|t| t.contains("atom"))
                            .unwrap_or(false);
                        if links.statement.is_none() || (is_atom && !statement_is_atom) {
                            links.statement = Some(href);
                            statement_is_atom = is_atom;
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(AtomError::Parse(e.to_string())),
            _ => {}
        }
    }

    if !saw_root {
        return Err(AtomError::InvalidStructure(
            "document has no elements".to_string(),
        ));
    }
    Ok(links)
}

/// Extract the states reported by an Atom statement.
pub fn parse_statement(xml: &str) -> Result<Vec<StatementState>, AtomError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut states = Vec::new();
    let mut current: Option<StatementState> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) if is_state_category(e)? => {
                if let Some(term) = attribute(e, b"term")? {
                    states.push(StatementState {
                        term,
                        description: None,
                    });
                }
            }
            Ok(Event::Start(ref e)) if is_state_category(e)? => {
                current = attribute(e, b"term")?.map(|term| StatementState {
                    term,
                    description: None,
                });
            }
            Ok(Event::Text(ref t)) => {
                if let Some(state) = current.as_mut() {
                    let text = t.unescape().map_err(|e| AtomError::Parse(e.to_string()))?;
                    state.description = Some(text.into_owned());
                }
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"category" => {
                if let Some(state) = current.take() {
                    states.push(state);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(AtomError::Parse(e.to_string())),
            _ => {}
        }
    }
    Ok(states)
}

fn is_state_category(e: &BytesStart<'_>) -> Result<bool, AtomError> {
    if e.local_name().as_ref() != b"category" {
        return Ok(false);
    }
    Ok(attribute(e, b"scheme")?.as_deref() == Some(STATE_SCHEME))
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, AtomError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| AtomError::Parse(e.to_string()))?;
        if attr.key.local_name().as_ref() == name {
            let value = attr
                .unescape_value()
                .map_err(|e| AtomError::Parse(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Atom parsing errors
#[derive(Debug, thiserror::Error)]
pub enum AtomError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid Atom structure: {0}")]
    InvalidStructure(String),
}
