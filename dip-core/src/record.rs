//! Persisted DIP state.
//!
//! These structs are the on-disk document (`deposit-record.json`). Fields are
//! declared in key order so that serialization is sorted and diff-friendly.
//! Optional fields are `Option`s omitted when absent; defaults for absent
//! values are applied by the accessors in [`crate::entity`], not here.

use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// Format identifier of the mandatory Dublin Core metadata document.
pub const DCTERMS_FORMAT: &str = "dcterms";

/// Location of the Dublin Core document, relative to the DIP root.
pub const DCTERMS_PATH: &str = "metadata/dcterms.xml";

/// Root record of a DIP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub created: Timestamp,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub metadata: Vec<MetadataRecord>,
}

impl DepositRecord {
    /// A fresh record: no files, no endpoints, only the Dublin Core document.
    pub fn new() -> Self {
        let now = Timestamp::now();
        Self {
            created: now,
            endpoints: Vec::new(),
            files: Vec::new(),
            metadata: vec![MetadataRecord::new(DCTERMS_FORMAT, DCTERMS_PATH, now)],
        }
    }

    /// Re-add the Dublin Core record if it has gone missing.
    /// Returns true if the record was changed.
    pub fn ensure_dcterms(&mut self) -> bool {
        if self.metadata.iter().any(|m| m.format == DCTERMS_FORMAT) {
            return false;
        }
        self.metadata
            .push(MetadataRecord::new(DCTERMS_FORMAT, DCTERMS_PATH, Timestamp::now()));
        true
    }

    pub fn endpoint(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    pub fn endpoint_mut(&mut self, id: &str) -> Option<&mut Endpoint> {
        self.endpoints.iter_mut().find(|e| e.id == id)
    }

    pub fn metadata_for(&self, format: &str) -> Option<&MetadataRecord> {
        self.metadata.iter().find(|m| m.format == format)
    }

    pub fn metadata_for_mut(&mut self, format: &str) -> Option<&mut MetadataRecord> {
        self.metadata.iter_mut().find(|m| m.format == format)
    }

    /// Stamp the given files (by record path) and metadata formats as
    /// deposited to `endpoint_id` at `at`.
    pub fn mark_deposited(
        &mut self,
        endpoint_id: &str,
        file_paths: &[String],
        formats: &[String],
        at: Timestamp,
    ) {
        for file in self.files.iter_mut().filter(|f| file_paths.contains(&f.path)) {
            file.set_deposited(endpoint_id, at);
        }
        for md in self.metadata.iter_mut().filter(|m| formats.contains(&m.format)) {
            md.set_deposited(endpoint_id, at);
        }
    }

    /// Drop every item's deposit record for `endpoint_id`.
    /// Returns the number of records removed.
    pub fn forget_endpoint(&mut self, endpoint_id: &str) -> usize {
        let files = self
            .files
            .iter_mut()
            .map(|f| f.clear_deposit(endpoint_id))
            .filter(|removed| *removed)
            .count();
        let metadata = self
            .metadata
            .iter_mut()
            .map(|m| m.clear_deposit(endpoint_id))
            .filter(|removed| *removed)
            .count();
        files + metadata
    }
}

impl Default for DepositRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Last successful deposit of one item to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDeposit {
    pub id: String,
    pub last_deposit: Timestamp,
}

/// Shared bookkeeping for anything that is deposited to endpoints.
pub trait Tracked {
    fn deposits(&self) -> &[EndpointDeposit];

    fn deposits_mut(&mut self) -> &mut Vec<EndpointDeposit>;

    /// When the tracked content last changed.
    fn last_changed(&self) -> Timestamp;

    fn deposit_for(&self, endpoint_id: &str) -> Option<&EndpointDeposit> {
        self.deposits().iter().find(|d| d.id == endpoint_id)
    }

    /// Record a deposit, overwriting any previous record for the endpoint.
    fn set_deposited(&mut self, endpoint_id: &str, at: Timestamp) {
        let deposits = self.deposits_mut();
        match deposits.iter_mut().find(|d| d.id == endpoint_id) {
            Some(existing) => existing.last_deposit = at,
            None => deposits.push(EndpointDeposit {
                id: endpoint_id.to_string(),
                last_deposit: at,
            }),
        }
    }

    fn clear_deposit(&mut self, endpoint_id: &str) -> bool {
        let deposits = self.deposits_mut();
        let before = deposits.len();
        deposits.retain(|d| d.id != endpoint_id);
        deposits.len() != before
    }
}

/// A file tracked by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub added: Timestamp,
    #[serde(default)]
    pub endpoints: Vec<EndpointDeposit>,
    pub md5: String,
    /// Relative to the DIP root, `/`-separated.
    pub path: String,
    pub updated: Timestamp,
}

impl FileRecord {
    pub fn new(path: String, md5: String, now: Timestamp) -> Self {
        Self {
            added: now,
            endpoints: Vec::new(),
            md5,
            path,
            updated: now,
        }
    }
}

impl Tracked for FileRecord {
    fn deposits(&self) -> &[EndpointDeposit] {
        &self.endpoints
    }

    fn deposits_mut(&mut self) -> &mut Vec<EndpointDeposit> {
        &mut self.endpoints
    }

    fn last_changed(&self) -> Timestamp {
        self.updated
    }
}

/// A descriptive metadata document held inside the DIP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub added: Timestamp,
    #[serde(default)]
    pub endpoints: Vec<EndpointDeposit>,
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_root: Option<bool>,
    pub modified: Timestamp,
    pub path: String,
}

impl MetadataRecord {
    pub fn new(format: &str, path: &str, now: Timestamp) -> Self {
        Self {
            added: now,
            endpoints: Vec::new(),
            format: format.to_string(),
            include_root: None,
            modified: now,
            path: path.to_string(),
        }
    }
}

impl Tracked for MetadataRecord {
    fn deposits(&self) -> &[EndpointDeposit] {
        &self.endpoints
    }

    fn deposits_mut(&mut self) -> &mut Vec<EndpointDeposit> {
        &mut self.endpoints
    }

    fn last_changed(&self) -> Timestamp {
        self.modified
    }
}

pub(crate) fn mint_endpoint_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A remote repository binding.
///
/// `sd_iri` is required when the endpoint is registered; `col_iri` is required
/// before anything can be deposited. `edit_iri` exists only between a
/// successful create and a successful delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col_iri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_iri: Option<String>,
    #[serde(default = "mint_endpoint_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sd_iri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Endpoint {
    /// Create an endpoint with a freshly minted id.
    pub fn new(sd_iri: impl Into<String>) -> Self {
        Self {
            col_iri: None,
            edit_iri: None,
            id: mint_endpoint_id(),
            obo: None,
            package: None,
            sd_iri: Some(sd_iri.into()),
            username: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_col_iri(mut self, col_iri: impl Into<String>) -> Self {
        self.col_iri = Some(col_iri.into());
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_obo(mut self, obo: impl Into<String>) -> Self {
        self.obo = Some(obo.into());
        self
    }

    /// Whether a create has succeeded and not been undone by a delete.
    pub fn is_deposited(&self) -> bool {
        self.edit_iri.is_some()
    }
}
