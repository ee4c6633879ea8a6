//! SWORD v2 connector for DIP deposits.
//!
//! Provides a blocking HTTP implementation of
//! [`dip_core::RepositoryConnector`] plus parsing of the Atom deposit
//! receipts and statements a SWORD server returns.

pub mod atom;
pub mod client;

pub use atom::{AtomError, ReceiptLinks, parse_receipt_links, parse_statement};
pub use client::{ClientConfig, SwordClient};
