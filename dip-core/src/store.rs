//! Persistent record store for a DIP directory.
//!
//! Layout on disk:
//! ```text
//! {base}/
//!   deposit-record.json        root record (files, endpoints, metadata)
//!   metadata/dcterms.xml       Dublin Core document
//!   metadata/{format}.xml      further metadata documents
//!   history/{endpoint-id}/     communication records
//!   packages/{format}/         packaged artifacts
//! ```
//!
//! Every save rewrites the whole document through a temporary file and a
//! rename, so a crash never leaves a half-written record behind. There is no
//! version check: the last writer wins.

use crate::error::{DipError, Result};
use crate::metadata::{self, XmlElement};
use crate::record::{DCTERMS_PATH, DepositRecord};
use std::fs;
use std::path::{Path, PathBuf};

pub const RECORD_FILE: &str = "deposit-record.json";
pub const HISTORY_DIR: &str = "history";
pub const PACKAGES_DIR: &str = "packages";
pub const METADATA_DIR: &str = "metadata";

/// Reads and writes the documents of one DIP directory.
#[derive(Debug, Clone)]
pub struct RecordStore {
    base_dir: PathBuf,
}

impl RecordStore {
    /// Open (creating if necessary) the DIP layout under `base_dir`.
    ///
    /// Fails with [`DipError::Initialise`] when a known path exists but is
    /// the wrong kind of filesystem entry.
    pub fn open(base_dir: &Path) -> Result<Self> {
        guarantee_directory(base_dir)?;
        let base_dir = base_dir.canonicalize()?;

        for dir in [HISTORY_DIR, PACKAGES_DIR, METADATA_DIR] {
            guarantee_directory(&base_dir.join(dir))?;
        }
        guarantee_file_kind(&base_dir.join(RECORD_FILE))?;
        guarantee_file_kind(&base_dir.join(DCTERMS_PATH))?;

        Ok(Self { base_dir })
    }

    /// Canonical path of the DIP root.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn record_path(&self) -> PathBuf {
        self.base_dir.join(RECORD_FILE)
    }

    pub fn history_dir(&self) -> PathBuf {
        self.base_dir.join(HISTORY_DIR)
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.base_dir.join(PACKAGES_DIR)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.base_dir.join(METADATA_DIR)
    }

    /// Load the root record, writing the default record on first use.
    pub fn load(&self) -> Result<DepositRecord> {
        let path = self.record_path();
        if !path.exists() {
            let record = DepositRecord::new();
            self.save(&record)?;
            tracing::info!("Initialised deposit record at {}", path.display());
            return Ok(record);
        }

        let data = fs::read_to_string(&path)?;
        serde_json::from_str(&data).map_err(|e| {
            DipError::initialise(format!(
                "{} is not a valid deposit record: {}",
                path.display(),
                e
            ))
        })
    }

    /// Replace the on-disk root record.
    pub fn save(&self, record: &DepositRecord) -> Result<()> {
        let data = serde_json::to_string_pretty(record)?;
        write_atomic(&self.record_path(), data.as_bytes())
    }

    /// Load a metadata document (path relative to the DIP root). A missing
    /// document is created empty.
    pub fn load_document(&self, rel_path: &str) -> Result<XmlElement> {
        let path = self.base_dir.join(rel_path);
        guarantee_file_kind(&path)?;
        if !path.exists() {
            let doc = metadata::default_document();
            self.save_document(rel_path, &doc)?;
            return Ok(doc);
        }
        let data = fs::read_to_string(&path)?;
        XmlElement::parse(&data)
    }

    pub fn save_document(&self, rel_path: &str, document: &XmlElement) -> Result<()> {
        let xml = document.to_document()?;
        write_atomic(&self.base_dir.join(rel_path), xml.as_bytes())
    }

    /// Store raw bytes at a path relative to the DIP root.
    pub fn write_raw(&self, rel_path: &str, data: &[u8]) -> Result<()> {
        write_atomic(&self.base_dir.join(rel_path), data)
    }
}

fn guarantee_directory(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(DipError::initialise(format!(
                "{} exists, and does not resolve to a directory",
                path.display()
            )));
        }
        return Ok(());
    }
    fs::create_dir_all(path)?;
    Ok(())
}

fn guarantee_file_kind(path: &Path) -> Result<()> {
    if path.exists() && !path.is_file() {
        return Err(DipError::initialise(format!(
            "{} exists, but does not resolve to a file",
            path.display()
        )));
    }
    Ok(())
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_layout() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("dip");
        let store = RecordStore::open(&base).unwrap();

        assert!(base.join(HISTORY_DIR).is_dir());
        assert!(base.join(PACKAGES_DIR).is_dir());
        assert!(base.join(METADATA_DIR).is_dir());
        assert_eq!(store.base_dir(), base.canonicalize().unwrap());
    }

    #[test]
    fn test_open_rejects_file_as_base() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("dip");
        fs::write(&base, b"not a dir").unwrap();
        let err = RecordStore::open(&base).unwrap_err();
        assert!(matches!(err, DipError::Initialise(_)));
    }

    #[test]
    fn test_open_rejects_file_where_subdir_expected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(HISTORY_DIR), b"oops").unwrap();
        assert!(matches!(
            RecordStore::open(tmp.path()).unwrap_err(),
            DipError::Initialise(_)
        ));
    }

    #[test]
    fn test_open_rejects_directory_where_record_expected() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(RECORD_FILE)).unwrap();
        assert!(matches!(
            RecordStore::open(tmp.path()).unwrap_err(),
            DipError::Initialise(_)
        ));
    }

    #[test]
    fn test_load_writes_default_once() {
        let tmp = TempDir::new().unwrap();
        let store = RecordStore::open(tmp.path()).unwrap();
        let first = store.load().unwrap();
        assert!(store.record_path().is_file());
        let second = store.load().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_rejects_malformed_record() {
        let tmp = TempDir::new().unwrap();
        let store = RecordStore::open(tmp.path()).unwrap();
        fs::write(store.record_path(), b"{ not json").unwrap();
        assert!(matches!(store.load().unwrap_err(), DipError::Initialise(_)));
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let store = RecordStore::open(tmp.path()).unwrap();
        store.save(&DepositRecord::new()).unwrap();
        assert!(!store.record_path().with_extension("tmp").exists());
    }

    #[test]
    fn test_document_default_and_reload() {
        let tmp = TempDir::new().unwrap();
        let store = RecordStore::open(tmp.path()).unwrap();
        let doc = store.load_document(DCTERMS_PATH).unwrap();
        assert_eq!(doc.name, "metadata");
        assert!(tmp.path().join(DCTERMS_PATH).is_file());

        let other = XmlElement::new("other").with_child(XmlElement::new("sub"));
        store.save_document(DCTERMS_PATH, &other).unwrap();
        assert_eq!(store.load_document(DCTERMS_PATH).unwrap(), other);
    }
}
