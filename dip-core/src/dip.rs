//! The DIP session: one open package directory and its in-memory record.
//!
//! Every mutating operation persists the whole record before returning, so
//! the on-disk state always matches what the session reports.

use crate::checksum;
use crate::config::DipConfig;
use crate::entity::{DepositFile, EndpointHandle, MetadataFile};
use crate::error::{DipError, Result};
use crate::history::History;
use crate::metadata::{self, DcFilter, DcValue, XmlElement};
use crate::package::{PackageDescriptor, PackageOptions, PackagerRegistry};
use crate::paths;
use crate::record::{
    DCTERMS_FORMAT, DCTERMS_PATH, DepositRecord, Endpoint, FileRecord, MetadataRecord,
    mint_endpoint_id,
};
use crate::store::{METADATA_DIR, RecordStore};
use crate::timestamp::Timestamp;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Where the content of a metadata document comes from.
#[derive(Debug, Clone)]
pub enum MetadataSource<'a> {
    /// Copy the content of this file.
    Path(&'a Path),
    Text(&'a str),
}

/// An open Deposit Information Package.
#[derive(Debug)]
pub struct Dip {
    store: RecordStore,
    record: DepositRecord,
    dc: XmlElement,
}

impl Dip {
    /// Open the DIP at `base_dir`, initialising it if it does not exist yet.
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        let store = RecordStore::open(base_dir.as_ref())?;
        let mut record = store.load()?;
        if record.ensure_dcterms() {
            tracing::warn!("Dublin Core record was missing; restored it");
            store.save(&record)?;
        }
        let dc = store.load_document(DCTERMS_PATH)?;
        tracing::debug!(
            "Opened DIP at {} ({} files, {} endpoints)",
            store.base_dir().display(),
            record.files.len(),
            record.endpoints.len()
        );
        Ok(Self { store, record, dc })
    }

    pub fn base_dir(&self) -> &Path {
        self.store.base_dir()
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn record(&self) -> &DepositRecord {
        &self.record
    }

    /// Replace the whole record and persist it.
    pub fn set_record(&mut self, mut record: DepositRecord) -> Result<()> {
        record.ensure_dcterms();
        self.record = record;
        self.save()
    }

    pub fn history(&self) -> History {
        History::new(&self.store.history_dir())
    }

    pub fn config(&self) -> Result<DipConfig> {
        DipConfig::load(self.base_dir())
    }

    pub(crate) fn record_mut(&mut self) -> &mut DepositRecord {
        &mut self.record
    }

    pub(crate) fn save(&self) -> Result<()> {
        self.store.save(&self.record)
    }

    // ─────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────

    pub fn files(&self) -> Vec<DepositFile<'_>> {
        let base = self.base_dir();
        self.record
            .files
            .iter()
            .map(|f| DepositFile::new(base, f))
            .collect()
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<DepositFile<'_>> {
        let real = paths::real_path(path.as_ref());
        self.file_index(&real)
            .map(|i| DepositFile::new(self.base_dir(), &self.record.files[i]))
    }

    /// Track a file, or refresh its checksum if it is already tracked.
    ///
    /// `updated` moves only when the content actually changed.
    pub fn set_file(&mut self, path: impl AsRef<Path>) -> Result<DepositFile<'_>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DipError::initialise(format!(
                "{} is not a path to a file",
                path.display()
            )));
        }
        let real = paths::real_path(path);
        let md5 = checksum::md5_file(&real)?;
        let now = Timestamp::now();

        let index = match self.file_index(&real) {
            Some(i) => {
                let file = &mut self.record.files[i];
                if file.md5 != md5 {
                    file.md5 = md5;
                    file.updated = now;
                    self.save()?;
                    tracing::info!("Updated {}", real.display());
                } else {
                    tracing::debug!("{} is unchanged", real.display());
                }
                i
            }
            None => {
                let rel = paths::to_record_path(&paths::relative_to(&real, self.base_dir()));
                self.record.files.push(FileRecord::new(rel, md5, now));
                self.save()?;
                tracing::info!("Added {}", real.display());
                self.record.files.len() - 1
            }
        };
        Ok(DepositFile::new(self.base_dir(), &self.record.files[index]))
    }

    /// Stop tracking a file. Returns false if it was not tracked.
    pub fn remove_file(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let real = paths::real_path(path.as_ref());
        match self.file_index(&real) {
            Some(i) => {
                let removed = self.record.files.remove(i);
                self.save()?;
                tracing::info!("Removed {}", removed.path);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn file_index(&self, real: &Path) -> Option<usize> {
        let base = self.base_dir();
        self.record
            .files
            .iter()
            .position(|f| paths::real_path(&paths::resolve(base, &f.path)) == real)
    }

    /// Bring every file record up to date with the disk: a file modified
    /// since it was last recorded is re-hashed, and its `updated` timestamp
    /// moves only if the content changed. Returns how many records changed.
    pub fn refresh_files(&mut self) -> Result<usize> {
        let base = self.store.base_dir().to_path_buf();
        let mut changed = 0;
        for file in self.record.files.iter_mut() {
            if refresh_file(&base, file)? {
                changed += 1;
            }
        }
        if changed > 0 {
            self.save()?;
            tracing::info!("Refreshed {} changed files", changed);
        }
        Ok(changed)
    }

    // ─────────────────────────────────────────────────────
    // Endpoints
    // ─────────────────────────────────────────────────────

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.record.endpoints
    }

    pub fn endpoint(&self, id: &str) -> Option<&Endpoint> {
        self.record.endpoint(id)
    }

    pub fn endpoint_mut(&mut self, id: &str) -> Option<EndpointHandle<'_>> {
        let index = self.record.endpoints.iter().position(|e| e.id == id)?;
        Some(EndpointHandle::new(self, index))
    }

    /// Register an endpoint, replacing any with the same id.
    ///
    /// A replacement without an edit locator keeps the recorded one.
    pub fn set_endpoint(&mut self, mut endpoint: Endpoint) -> Result<EndpointHandle<'_>> {
        if endpoint.sd_iri.as_deref().is_none_or(|s| s.trim().is_empty()) {
            return Err(DipError::initialise("an endpoint requires an sd_iri"));
        }
        if endpoint.id.is_empty() {
            endpoint.id = mint_endpoint_id();
        }

        let index = match self.record.endpoints.iter().position(|e| e.id == endpoint.id) {
            Some(i) => {
                let existing = &mut self.record.endpoints[i];
                if endpoint.edit_iri.is_none() {
                    endpoint.edit_iri = existing.edit_iri.take();
                }
                *existing = endpoint;
                tracing::info!("Replaced endpoint {}", existing.id);
                i
            }
            None => {
                tracing::info!("Registered endpoint {}", endpoint.id);
                self.record.endpoints.push(endpoint);
                self.record.endpoints.len() - 1
            }
        };
        self.save()?;
        Ok(EndpointHandle::new(self, index))
    }

    /// Unregister an endpoint and forget every deposit made to it.
    /// Returns false if no such endpoint exists.
    pub fn remove_endpoint(&mut self, id: &str, delete_in_repository: bool) -> Result<bool> {
        if delete_in_repository {
            return Err(DipError::Unsupported(
                "deleting the remote object while removing an endpoint; delete it first".into(),
            ));
        }
        let Some(index) = self.record.endpoints.iter().position(|e| e.id == id) else {
            return Ok(false);
        };
        self.record.endpoints.remove(index);
        let forgotten = self.record.forget_endpoint(id);
        self.save()?;
        tracing::info!("Removed endpoint {} ({} deposit records dropped)", id, forgotten);
        Ok(true)
    }

    /// Record a confirmed deposit. `edit_iri` is set when the deposit created
    /// the remote object.
    pub(crate) fn record_deposit(
        &mut self,
        endpoint_id: &str,
        edit_iri: Option<String>,
        files: &[String],
        formats: &[String],
        at: Timestamp,
    ) -> Result<()> {
        if let Some(edit_iri) = edit_iri {
            if let Some(endpoint) = self.record.endpoint_mut(endpoint_id) {
                endpoint.edit_iri = Some(edit_iri);
            }
        }
        self.record.mark_deposited(endpoint_id, files, formats, at);
        self.save()
    }

    /// Record a confirmed remote delete.
    pub(crate) fn record_removal(&mut self, endpoint_id: &str) -> Result<usize> {
        if let Some(endpoint) = self.record.endpoint_mut(endpoint_id) {
            endpoint.edit_iri = None;
        }
        let forgotten = self.record.forget_endpoint(endpoint_id);
        self.save()?;
        Ok(forgotten)
    }

    // ─────────────────────────────────────────────────────
    // Metadata
    // ─────────────────────────────────────────────────────

    pub fn metadata_files(&self) -> Vec<MetadataFile<'_>> {
        let base = self.base_dir();
        self.record
            .metadata
            .iter()
            .map(|m| MetadataFile::new(base, m))
            .collect()
    }

    pub fn metadata_file(&self, format: &str) -> Option<MetadataFile<'_>> {
        self.record
            .metadata_for(format)
            .map(|m| MetadataFile::new(self.base_dir(), m))
    }

    /// Store a metadata document in the DIP, replacing any of the same format.
    pub fn add_metadata_file(
        &mut self,
        format: &str,
        source: MetadataSource<'_>,
    ) -> Result<MetadataFile<'_>> {
        let content = match source {
            MetadataSource::Path(path) => fs::read_to_string(path)?,
            MetadataSource::Text(text) => text.to_string(),
        };

        if format == DCTERMS_FORMAT {
            let document = XmlElement::parse(&content)?;
            self.replace_dublin_core(document)?;
        } else {
            let rel_path = format!("{}/{}.xml", METADATA_DIR, urlencoding::encode(format));
            self.store.write_raw(&rel_path, content.as_bytes())?;
            let now = Timestamp::now();
            match self.record.metadata_for_mut(format) {
                Some(existing) => {
                    existing.path = rel_path;
                    existing.modified = now;
                }
                None => self
                    .record
                    .metadata
                    .push(MetadataRecord::new(format, &rel_path, now)),
            }
            self.save()?;
            tracing::info!("Stored {} metadata", format);
        }

        self.metadata_file(format)
            .ok_or_else(|| DipError::initialise(format!("metadata record {} vanished", format)))
    }

    /// Choose whether metadata-only deposits of `format` send the document
    /// element itself or only its children.
    pub fn set_include_root(&mut self, format: &str, include_root: bool) -> Result<()> {
        let record = self.record.metadata_for_mut(format).ok_or_else(|| {
            DipError::initialise(format!("no metadata document with format {}", format))
        })?;
        record.include_root = Some(include_root);
        self.save()
    }

    /// Parsed content of a metadata document.
    pub fn metadata_document(&self, format: &str) -> Result<XmlElement> {
        if format == DCTERMS_FORMAT {
            return Ok(self.dc.clone());
        }
        let record = self.metadata_file(format).ok_or_else(|| {
            DipError::initialise(format!("no metadata document with format {}", format))
        })?;
        XmlElement::parse(&fs::read_to_string(record.path())?)
    }

    pub fn dublin_core(&self) -> &XmlElement {
        &self.dc
    }

    /// Replace the Dublin Core document wholesale.
    pub fn replace_dublin_core(&mut self, document: XmlElement) -> Result<()> {
        self.dc = document;
        self.dublin_core_changed()
    }

    pub fn add_dublin_core(&mut self, term: &str, value: &str, lang: Option<&str>) -> Result<()> {
        metadata::add_dcterm(&mut self.dc, term, value, lang)?;
        self.dublin_core_changed()?;
        tracing::info!("Added dcterms:{}", term);
        Ok(())
    }

    /// Remove matching statements (`None` matches anything). Returns how many
    /// were removed.
    pub fn remove_dublin_core(
        &mut self,
        term: Option<&str>,
        value: Option<&str>,
        lang: Option<&str>,
    ) -> Result<usize> {
        let filter = DcFilter { term, value, lang };
        let removed = metadata::remove_dcterms(&mut self.dc, &filter);
        if removed > 0 {
            self.dublin_core_changed()?;
            tracing::info!("Removed {} Dublin Core statements", removed);
        }
        Ok(removed)
    }

    pub fn get_dublin_core(
        &self,
        term: Option<&str>,
        value: Option<&str>,
        lang: Option<&str>,
    ) -> Vec<DcValue> {
        metadata::dcterms(&self.dc, &DcFilter { term, value, lang })
    }

    fn dublin_core_changed(&mut self) -> Result<()> {
        self.store.save_document(DCTERMS_PATH, &self.dc)?;
        self.record.ensure_dcterms();
        if let Some(record) = self.record.metadata_for_mut(DCTERMS_FORMAT) {
            record.modified = Timestamp::now();
        }
        self.save()
    }

    // ─────────────────────────────────────────────────────
    // Packaging
    // ─────────────────────────────────────────────────────

    /// Directory that packages of `format` are written to.
    pub fn package_dir(&self, format: &str) -> PathBuf {
        self.store
            .packages_dir()
            .join(urlencoding::encode(format).as_ref())
    }

    pub fn package(
        &self,
        registry: &PackagerRegistry,
        format: &str,
        options: &PackageOptions,
    ) -> Result<PackageDescriptor> {
        registry
            .get(format)?
            .package(self, &self.package_dir(format), options)
    }
}

/// Returns true if the record changed.
fn refresh_file(base: &Path, file: &mut FileRecord) -> Result<bool> {
    let path = paths::resolve(base, &file.path);
    let meta = match fs::metadata(&path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!("Tracked file {} no longer exists", path.display());
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };
    let mtime = Timestamp::from_system_time(meta.modified()?);
    if mtime <= file.updated {
        return Ok(false);
    }

    let md5 = checksum::md5_file(&path)?;
    if md5 == file.md5 {
        tracing::debug!("{} was touched but its content is unchanged", path.display());
        return Ok(false);
    }
    file.md5 = md5;
    file.updated = Timestamp::now();
    Ok(true)
}
