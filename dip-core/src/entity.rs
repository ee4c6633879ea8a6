//! Typed views over the records held by a [`Dip`].
//!
//! Views borrow from the session rather than copying, so they always reflect
//! the current state. The only mutating wrapper, [`EndpointHandle`], holds the
//! session mutably and saves after every change.

use crate::dip::Dip;
use crate::error::{DipError, Result};
use crate::paths;
use crate::record::{Endpoint, EndpointDeposit, FileRecord, MetadataRecord, Tracked};
use crate::timestamp::Timestamp;
use std::path::{Path, PathBuf};

/// A tracked file.
#[derive(Debug, Clone, Copy)]
pub struct DepositFile<'a> {
    base: &'a Path,
    raw: &'a FileRecord,
}

impl<'a> DepositFile<'a> {
    pub(crate) fn new(base: &'a Path, raw: &'a FileRecord) -> Self {
        Self { base, raw }
    }

    /// Absolute path of the file.
    pub fn path(&self) -> PathBuf {
        paths::resolve(self.base, &self.raw.path)
    }

    /// Path as stored, relative to the DIP root.
    pub fn record_path(&self) -> &'a str {
        &self.raw.path
    }

    pub fn md5(&self) -> &'a str {
        &self.raw.md5
    }

    pub fn added(&self) -> Timestamp {
        self.raw.added
    }

    pub fn updated(&self) -> Timestamp {
        self.raw.updated
    }

    pub fn deposits(&self) -> &'a [EndpointDeposit] {
        &self.raw.endpoints
    }

    pub fn deposit_for(&self, endpoint_id: &str) -> Option<&'a EndpointDeposit> {
        self.raw.endpoints.iter().find(|d| d.id == endpoint_id)
    }

    pub fn raw(&self) -> &'a FileRecord {
        self.raw
    }
}

/// A metadata document held by the DIP.
#[derive(Debug, Clone, Copy)]
pub struct MetadataFile<'a> {
    base: &'a Path,
    raw: &'a MetadataRecord,
}

impl<'a> MetadataFile<'a> {
    pub(crate) fn new(base: &'a Path, raw: &'a MetadataRecord) -> Self {
        Self { base, raw }
    }

    pub fn format(&self) -> &'a str {
        &self.raw.format
    }

    /// Absolute path of the document.
    pub fn path(&self) -> PathBuf {
        paths::resolve(self.base, &self.raw.path)
    }

    pub fn record_path(&self) -> &'a str {
        &self.raw.path
    }

    /// Whether a metadata-only deposit sends the document element itself
    /// (true, the default) or only its children.
    pub fn include_root(&self) -> bool {
        self.raw.include_root.unwrap_or(true)
    }

    pub fn added(&self) -> Timestamp {
        self.raw.added
    }

    pub fn modified(&self) -> Timestamp {
        self.raw.modified
    }

    pub fn deposits(&self) -> &'a [EndpointDeposit] {
        &self.raw.endpoints
    }

    pub fn deposit_for(&self, endpoint_id: &str) -> Option<&'a EndpointDeposit> {
        self.raw.deposit_for(endpoint_id)
    }

    pub fn raw(&self) -> &'a MetadataRecord {
        self.raw
    }
}

/// Mutable access to one registered endpoint. Every setter persists the
/// owning DIP before returning.
pub struct EndpointHandle<'a> {
    dip: &'a mut Dip,
    index: usize,
}

impl<'a> EndpointHandle<'a> {
    pub(crate) fn new(dip: &'a mut Dip, index: usize) -> Self {
        Self { dip, index }
    }

    pub fn get(&self) -> &Endpoint {
        &self.dip.record().endpoints[self.index]
    }

    pub fn id(&self) -> &str {
        &self.get().id
    }

    pub fn set_sd_iri(&mut self, sd_iri: impl Into<String>) -> Result<()> {
        let sd_iri = sd_iri.into();
        if sd_iri.trim().is_empty() {
            return Err(DipError::initialise("sd_iri cannot be empty"));
        }
        self.update(|e| e.sd_iri = Some(sd_iri))
    }

    pub fn set_col_iri(&mut self, col_iri: Option<String>) -> Result<()> {
        self.update(|e| e.col_iri = col_iri)
    }

    pub fn set_package(&mut self, package: Option<String>) -> Result<()> {
        self.update(|e| e.package = package)
    }

    pub fn set_username(&mut self, username: Option<String>) -> Result<()> {
        self.update(|e| e.username = username)
    }

    pub fn set_obo(&mut self, obo: Option<String>) -> Result<()> {
        self.update(|e| e.obo = obo)
    }

    fn update(&mut self, change: impl FnOnce(&mut Endpoint)) -> Result<()> {
        change(&mut self.dip.record_mut().endpoints[self.index]);
        self.dip.save()
    }
}
