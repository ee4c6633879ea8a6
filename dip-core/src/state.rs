//! Reconciliation: the deposit status of every tracked item against every
//! endpoint.

use crate::dip::Dip;
use crate::error::Result;
use crate::record::{Endpoint, EndpointDeposit, Tracked};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepositStatus {
    /// Deposited, and unchanged since.
    UpToDate,
    /// Changed since it was last deposited.
    OutOfDate,
    /// An endpoint exists that the item was never deposited to.
    NotDeposited,
    /// No endpoints at all.
    NoAction,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::UpToDate => "UP_TO_DATE",
            DepositStatus::OutOfDate => "OUT_OF_DATE",
            DepositStatus::NotDeposited => "NOT_DEPOSITED",
            DepositStatus::NoAction => "NO_ACTION",
        }
    }

    /// Whether a deposit would change anything remotely.
    pub fn needs_deposit(&self) -> bool {
        matches!(self, DepositStatus::OutOfDate | DepositStatus::NotDeposited)
    }
}

impl fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The item a state entry is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedItem {
    File { path: PathBuf, record_path: String },
    Metadata { format: String, record_path: String },
}

impl fmt::Display for TrackedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackedItem::File { record_path, .. } => write!(f, "file {}", record_path),
            TrackedItem::Metadata { format, .. } => write!(f, "metadata {}", format),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    pub status: DepositStatus,
    pub item: TrackedItem,
    /// `None` only for [`DepositStatus::NoAction`].
    pub endpoint_id: Option<String>,
    /// The deposit record the status was derived from, if any.
    pub deposit: Option<EndpointDeposit>,
}

/// Result of reconciling a DIP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepositState {
    entries: Vec<StateEntry>,
}

impl DepositState {
    pub fn entries(&self) -> &[StateEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<StateEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn for_endpoint<'a>(&'a self, endpoint_id: &'a str) -> impl Iterator<Item = &'a StateEntry> {
        self.entries
            .iter()
            .filter(move |e| e.endpoint_id.as_deref() == Some(endpoint_id))
    }

    pub fn count(&self, status: DepositStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    /// Whether anything is out of date with, or missing from, an endpoint.
    pub fn requires_deposit(&self, endpoint_id: &str) -> bool {
        self.for_endpoint(endpoint_id).any(|e| e.status.needs_deposit())
    }
}

fn evaluate<T: Tracked>(
    tracked: &T,
    item: TrackedItem,
    endpoints: &[Endpoint],
    entries: &mut Vec<StateEntry>,
) {
    let before = entries.len();
    for deposit in tracked.deposits() {
        let status = if tracked.last_changed() > deposit.last_deposit {
            DepositStatus::OutOfDate
        } else {
            DepositStatus::UpToDate
        };
        entries.push(StateEntry {
            status,
            item: item.clone(),
            endpoint_id: Some(deposit.id.clone()),
            deposit: Some(deposit.clone()),
        });
    }
    for endpoint in endpoints {
        if tracked.deposit_for(&endpoint.id).is_none() {
            entries.push(StateEntry {
                status: DepositStatus::NotDeposited,
                item: item.clone(),
                endpoint_id: Some(endpoint.id.clone()),
                deposit: None,
            });
        }
    }
    if entries.len() == before {
        entries.push(StateEntry {
            status: DepositStatus::NoAction,
            item,
            endpoint_id: None,
            deposit: None,
        });
    }
}

impl Dip {
    /// Reconcile every tracked file and metadata document against every
    /// endpoint. File records are refreshed from disk first, which may
    /// persist new checksums.
    pub fn get_state(&mut self) -> Result<DepositState> {
        self.refresh_files()?;

        let mut entries = Vec::new();
        let endpoints = self.endpoints();
        for file in self.files() {
            let item = TrackedItem::File {
                path: file.path(),
                record_path: file.record_path().to_string(),
            };
            evaluate(file.raw(), item, endpoints, &mut entries);
        }
        for md in self.metadata_files() {
            let item = TrackedItem::Metadata {
                format: md.format().to_string(),
                record_path: md.record_path().to_string(),
            };
            evaluate(md.raw(), item, endpoints, &mut entries);
        }

        let state = DepositState { entries };
        tracing::debug!(
            "State: {} up to date, {} out of date, {} not deposited, {} no action",
            state.count(DepositStatus::UpToDate),
            state.count(DepositStatus::OutOfDate),
            state.count(DepositStatus::NotDeposited),
            state.count(DepositStatus::NoAction)
        );
        Ok(state)
    }
}
