//! Reconciliation and packaging integration tests

use dip_core::{
    DCTERMS_FORMAT, Dip, DipError, DepositStatus, Endpoint, PackageOptions, PackagerRegistry,
    SIMPLE_ZIP, TrackedItem, checksum,
};
use std::fs;
use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;
use tempfile::TempDir;

fn write_file(tmp: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = tmp.path().join("files").join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn open(tmp: &TempDir) -> Dip {
    Dip::open(tmp.path().join("dip")).unwrap()
}

#[test]
fn test_create_dip_in_empty_dir() {
    let tmp = TempDir::new().unwrap();
    let dip = open(&tmp);

    let record = dip.record();
    assert!(record.files.is_empty());
    assert!(record.endpoints.is_empty());
    assert_eq!(record.metadata.len(), 1);
    assert_eq!(record.metadata[0].format, DCTERMS_FORMAT);
    assert_eq!(record.metadata[0].path, "metadata/dcterms.xml");

    let dc = fs::read_to_string(tmp.path().join("dip/metadata/dcterms.xml")).unwrap();
    let root = dip_core::XmlElement::parse(&dc).unwrap();
    assert_eq!(root.elements().count(), 0);

    let raw = fs::read_to_string(tmp.path().join("dip/deposit-record.json")).unwrap();
    assert!(raw.contains("\"created\""));
}

#[test]
fn test_files_without_endpoints_are_no_action() {
    let tmp = TempDir::new().unwrap();
    let mut dip = open(&tmp);
    dip.set_file(write_file(&tmp, "a.txt", "a")).unwrap();
    dip.set_file(write_file(&tmp, "b.txt", "b")).unwrap();

    let state = dip.get_state().unwrap();
    let files: Vec<_> = state
        .entries()
        .iter()
        .filter(|e| matches!(e.item, TrackedItem::File { .. }))
        .collect();
    assert_eq!(files.len(), 2);
    for entry in files {
        assert_eq!(entry.status, DepositStatus::NoAction);
        assert!(entry.endpoint_id.is_none());
        assert!(entry.deposit.is_none());
    }
}

#[test]
fn test_new_files_and_endpoints_are_not_deposited() {
    let tmp = TempDir::new().unwrap();
    let mut dip = open(&tmp);
    for name in ["a.txt", "b.txt", "c.txt"] {
        dip.set_file(write_file(&tmp, name, name)).unwrap();
    }
    for id in ["e1", "e2"] {
        dip.set_endpoint(Endpoint::new("http://sd").with_id(id)).unwrap();
    }

    let state = dip.get_state().unwrap();
    let file_entries: Vec<_> = state
        .entries()
        .iter()
        .filter(|e| matches!(e.item, TrackedItem::File { .. }))
        .collect();
    assert_eq!(file_entries.len(), 3 * 2);
    assert!(file_entries.iter().all(|e| e.status == DepositStatus::NotDeposited));
    // plus the Dublin Core record against each endpoint
    assert_eq!(state.count(DepositStatus::NotDeposited), 3 * 2 + 2);
    assert!(state.requires_deposit("e1"));
}

#[test]
fn test_registering_unchanged_file_twice_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let mut dip = open(&tmp);
    let path = write_file(&tmp, "a.txt", "same");

    dip.set_file(&path).unwrap();
    dip.set_file(&path).unwrap();

    let files = dip.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].added(), files[0].updated());
}

#[test]
fn test_touched_but_unchanged_file_keeps_updated() {
    let tmp = TempDir::new().unwrap();
    let mut dip = open(&tmp);
    let path = write_file(&tmp, "a.txt", "same");
    let updated = dip.set_file(&path).unwrap().updated();

    sleep(Duration::from_millis(50));
    fs::write(&path, "same").unwrap();

    dip.get_state().unwrap();
    assert_eq!(dip.file(&path).unwrap().updated(), updated);
}

#[test]
fn test_modified_file_is_refreshed_before_reconciling() {
    let tmp = TempDir::new().unwrap();
    let mut dip = open(&tmp);
    let path = write_file(&tmp, "a.txt", "before");
    dip.set_file(&path).unwrap();

    sleep(Duration::from_millis(50));
    fs::write(&path, "after").unwrap();

    dip.get_state().unwrap();
    let file = dip.file(&path).unwrap();
    assert_eq!(file.md5(), checksum::md5_hex(b"after"));
    assert!(file.updated() > file.added());

    // the refreshed checksum was persisted
    let reopened = open(&tmp);
    assert_eq!(
        reopened.file(&path).unwrap().md5(),
        checksum::md5_hex(b"after")
    );
}

#[test]
fn test_missing_tracked_file_uses_recorded_state() {
    let tmp = TempDir::new().unwrap();
    let mut dip = open(&tmp);
    let path = write_file(&tmp, "gone.txt", "x");
    let md5 = dip.set_file(&path).unwrap().md5().to_string();
    fs::remove_file(&path).unwrap();

    let state = dip.get_state().unwrap();
    assert!(state.entries().iter().any(|e| matches!(
        &e.item,
        TrackedItem::File { record_path, .. } if record_path.ends_with("gone.txt")
    )));
    assert_eq!(dip.files()[0].md5(), md5);
}

#[test]
fn test_package_nothing_selected() {
    let tmp = TempDir::new().unwrap();
    let mut dip = open(&tmp);
    dip.set_file(write_file(&tmp, "a.txt", "a")).unwrap();

    let options = PackageOptions {
        include_files: false,
        include_metadata: false,
        remove_artifact: false,
    };
    let err = dip
        .package(&PackagerRegistry::with_defaults(), SIMPLE_ZIP, &options)
        .unwrap_err();
    assert!(matches!(err, DipError::Package(_)));
}

#[test]
fn test_package_unknown_format() {
    let tmp = TempDir::new().unwrap();
    let dip = open(&tmp);
    let err = dip
        .package(
            &PackagerRegistry::with_defaults(),
            "http://example.org/package/Unknown",
            &PackageOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, DipError::Package(_)));
}

fn zip_names(path: &std::path::Path) -> Vec<String> {
    let archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

#[test]
fn test_simple_zip_contains_files_and_metadata() {
    let tmp = TempDir::new().unwrap();
    let mut dip = open(&tmp);
    dip.add_dublin_core("creator", "Richard", None).unwrap();
    dip.set_file(write_file(&tmp, "testfile.txt", "one")).unwrap();
    dip.set_file(write_file(&tmp, "testfile2.txt", "two")).unwrap();

    let descriptor = dip
        .package(
            &PackagerRegistry::with_defaults(),
            SIMPLE_ZIP,
            &PackageOptions::default(),
        )
        .unwrap();

    assert_eq!(descriptor.filename, "SimpleZip.zip");
    assert_eq!(descriptor.mime, "application/zip");
    assert!(descriptor.path.starts_with(dip.package_dir(SIMPLE_ZIP)));
    assert_eq!(descriptor.files.len(), 2);
    assert_eq!(descriptor.metadata, vec![DCTERMS_FORMAT.to_string()]);
    assert_eq!(
        zip_names(&descriptor.path),
        vec!["dcterms.xml", "testfile.txt", "testfile2.txt"]
    );
}

#[test]
fn test_simple_zip_files_only() {
    let tmp = TempDir::new().unwrap();
    let mut dip = open(&tmp);
    dip.set_file(write_file(&tmp, "testfile.txt", "one")).unwrap();

    let options = PackageOptions {
        include_metadata: false,
        ..PackageOptions::default()
    };
    let descriptor = dip
        .package(&PackagerRegistry::with_defaults(), SIMPLE_ZIP, &options)
        .unwrap();
    assert!(descriptor.metadata.is_empty());
    assert_eq!(zip_names(&descriptor.path), vec!["testfile.txt"]);
}

#[test]
fn test_simple_zip_shared_basenames() {
    let tmp = TempDir::new().unwrap();
    let mut dip = open(&tmp);
    dip.set_file(write_file(&tmp, "one/data.csv", "1")).unwrap();
    dip.set_file(write_file(&tmp, "two/data.csv", "2")).unwrap();

    let options = PackageOptions {
        include_metadata: false,
        ..PackageOptions::default()
    };
    let descriptor = dip
        .package(&PackagerRegistry::with_defaults(), SIMPLE_ZIP, &options)
        .unwrap();
    assert_eq!(
        zip_names(&descriptor.path),
        vec!["files/one/data.csv", "files/two/data.csv"]
    );
}
