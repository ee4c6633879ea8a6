//! DIP Core Library
//!
//! Local management of a Deposit Information Package (DIP): a directory that
//! tracks files by reference, holds descriptive metadata, and records what
//! has been deposited to which remote repository endpoint. Includes:
//! - Persistent record store (JSON, whole-document atomic rewrite)
//! - Typed entity views and endpoint handles
//! - Dublin Core and extra metadata documents
//! - Deposit state reconciliation
//! - Pluggable packagers (SimpleZip built in)
//! - Deposit orchestration over a repository connector
//! - Per-endpoint communication history

pub mod checksum;
pub mod config;
pub mod connector;
pub mod deposit;
pub mod dip;
pub mod entity;
pub mod error;
pub mod history;
pub mod metadata;
pub mod package;
pub mod paths;
pub mod record;
pub mod state;
pub mod store;
pub mod timestamp;

pub use config::DipConfig;
pub use connector::{
    Auth, DepositRequest, Payload, Receipt, RepositoryConnector, Statement, StatementState,
};
pub use deposit::{DepositOptions, DepositOutcome, Depositor, Exchange};
pub use dip::{Dip, MetadataSource};
pub use entity::{DepositFile, EndpointHandle, MetadataFile};
pub use error::{DipError, Result};
pub use history::{AuthInfo, CommunicationRecord, Direction, History};
pub use metadata::{DcValue, XmlElement};
pub use package::{
    PackageDescriptor, PackageOptions, Packager, PackagerRegistry, SIMPLE_ZIP, SimpleZipPackager,
};
pub use record::{DCTERMS_FORMAT, DepositRecord, Endpoint, EndpointDeposit};
pub use state::{DepositState, DepositStatus, StateEntry, TrackedItem};
pub use timestamp::Timestamp;
