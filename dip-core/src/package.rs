//! Packaging DIP content into a single artifact for binary deposit.
//!
//! Packagers are looked up by format identifier in a [`PackagerRegistry`].
//! The built-in [`SimpleZipPackager`] writes a flat zip of the tracked files
//! and metadata documents.

use crate::dip::Dip;
use crate::error::{DipError, Result};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use zip::write::SimpleFileOptions;

/// Format identifier of the SimpleZip package.
pub const SIMPLE_ZIP: &str = "http://purl.org/net/sword/package/SimpleZip";

pub const ZIP_MIME: &str = "application/zip";

/// What to put in a package and what to do with it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageOptions {
    pub include_files: bool,
    pub include_metadata: bool,
    /// Delete the artifact once it has been deposited.
    pub remove_artifact: bool,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            include_files: true,
            include_metadata: true,
            remove_artifact: false,
        }
    }
}

/// A package written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDescriptor {
    pub format: String,
    /// Absolute path of the artifact.
    pub path: PathBuf,
    pub filename: String,
    pub mime: String,
    /// Record paths of the tracked files included.
    pub files: Vec<String>,
    /// Formats of the metadata documents included.
    pub metadata: Vec<String>,
}

/// Builds deposit artifacts of one format.
pub trait Packager {
    fn format(&self) -> &str;

    /// Write a package for `dip` into `output_dir`.
    fn package(
        &self,
        dip: &Dip,
        output_dir: &Path,
        options: &PackageOptions,
    ) -> Result<PackageDescriptor>;

    /// Tidy up after the package has been deposited.
    fn cleanup(
        &self,
        dip: &Dip,
        output_dir: &Path,
        descriptor: &PackageDescriptor,
        options: &PackageOptions,
    ) -> Result<()>;
}

/// Packagers by format identifier.
#[derive(Default)]
pub struct PackagerRegistry {
    packagers: HashMap<String, Box<dyn Packager>>,
}

impl PackagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in packager.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SimpleZipPackager));
        registry
    }

    /// Add a packager, replacing any registered for the same format.
    pub fn register(&mut self, packager: Box<dyn Packager>) {
        self.packagers.insert(packager.format().to_string(), packager);
    }

    pub fn get(&self, format: &str) -> Result<&dyn Packager> {
        self.packagers
            .get(format)
            .map(|p| p.as_ref())
            .ok_or_else(|| DipError::package(format!("no packager for format {}", format)))
    }

    pub fn formats(&self) -> Vec<&str> {
        let mut formats: Vec<&str> = self.packagers.keys().map(String::as_str).collect();
        formats.sort_unstable();
        formats
    }
}

/// Name of the artifact for a format: the last segment of the identifier
/// with a `.zip` extension.
pub fn artifact_name(format: &str) -> String {
    let segment = format
        .trim_end_matches('/')
        .rsplit(['/', '#', ':'])
        .find(|s| !s.is_empty())
        .unwrap_or("package");
    format!("{}.zip", segment)
}

/// A flat zip of tracked files and metadata documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleZipPackager;

struct Entry {
    source: PathBuf,
    record_path: String,
}

impl Packager for SimpleZipPackager {
    fn format(&self) -> &str {
        SIMPLE_ZIP
    }

    fn package(
        &self,
        dip: &Dip,
        output_dir: &Path,
        options: &PackageOptions,
    ) -> Result<PackageDescriptor> {
        if !options.include_files && !options.include_metadata {
            return Err(DipError::package(
                "nothing to package: neither files nor metadata selected",
            ));
        }

        let mut entries = Vec::new();
        let mut files = Vec::new();
        let mut metadata = Vec::new();
        if options.include_files {
            for file in dip.files() {
                files.push(file.record_path().to_string());
                entries.push(Entry {
                    source: file.path(),
                    record_path: file.record_path().to_string(),
                });
            }
        }
        if options.include_metadata {
            for md in dip.metadata_files() {
                metadata.push(md.format().to_string());
                entries.push(Entry {
                    source: md.path(),
                    record_path: md.record_path().to_string(),
                });
            }
        }
        let names = archive_names(&entries)?;

        fs::create_dir_all(output_dir)?;
        let filename = artifact_name(SIMPLE_ZIP);
        let path = output_dir.join(&filename);

        let mut zip = zip::ZipWriter::new(File::create(&path)?);
        let zip_options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (entry, name) in entries.iter().zip(&names) {
            zip.start_file(name.as_str(), zip_options)?;
            let mut source = File::open(&entry.source)?;
            io::copy(&mut source, &mut zip)?;
        }
        zip.finish()?;

        tracing::info!(
            "Packaged {} files and {} metadata documents into {}",
            files.len(),
            metadata.len(),
            path.display()
        );
        Ok(PackageDescriptor {
            format: SIMPLE_ZIP.to_string(),
            path,
            filename,
            mime: ZIP_MIME.to_string(),
            files,
            metadata,
        })
    }

    fn cleanup(
        &self,
        _dip: &Dip,
        _output_dir: &Path,
        descriptor: &PackageDescriptor,
        options: &PackageOptions,
    ) -> Result<()> {
        if !options.remove_artifact {
            tracing::debug!("Keeping package {}", descriptor.path.display());
            return Ok(());
        }
        if descriptor.path.exists() {
            fs::remove_file(&descriptor.path)?;
            tracing::info!("Removed package {}", descriptor.path.display());
        }
        Ok(())
    }
}

/// Names of the zip entries: basenames, except that items sharing a basename
/// are stored under their DIP-relative path instead.
fn archive_names(entries: &[Entry]) -> Result<Vec<String>> {
    let basenames: Vec<String> = entries.iter().map(|e| basename(&e.record_path)).collect();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in &basenames {
        *counts.entry(name.as_str()).or_default() += 1;
    }

    let names: Vec<String> = entries
        .iter()
        .zip(&basenames)
        .map(|(entry, base)| {
            if counts[base.as_str()] > 1 {
                inner_path(&entry.record_path)
            } else {
                base.clone()
            }
        })
        .collect();

    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
    for (entry, name) in entries.iter().zip(&names) {
        if let Some(other) = seen.insert(name.as_str(), entry.record_path.as_str()) {
            return Err(DipError::package(format!(
                "{} and {} would both be stored as {}",
                other, entry.record_path, name
            )));
        }
    }
    Ok(names)
}

fn basename(record_path: &str) -> String {
    record_path
        .rsplit('/')
        .next()
        .unwrap_or(record_path)
        .to_string()
}

/// The record path with parent and root components dropped.
fn inner_path(record_path: &str) -> String {
    Path::new(record_path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
