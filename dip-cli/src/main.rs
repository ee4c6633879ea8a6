//! dip — Deposit Information Package manager.
//!
//! Supports:
//! - Tracking files and metadata documents in a local DIP directory
//! - Managing repository endpoints
//! - Reporting deposit state per file, metadata document and endpoint
//! - Packaging, depositing, deleting and querying deposits over SWORD v2
//! - Viewing the per-endpoint communication history
//!
//! # Usage
//!
//! ```bash
//! # Create a DIP in the current directory and track some files
//! dip init
//! dip add-file data/report.pdf data/results.csv
//!
//! # Describe it
//! dip dc add title "Quarterly results" --lang en
//!
//! # Register a repository and deposit
//! dip endpoint add http://repo/sd --id repo --col-iri http://repo/col --username me
//! dip state
//! DIP_PASSWORD=secret dip deposit repo
//!
//! # Check what the repository did with it
//! dip statement repo
//! dip history repo --bodies
//! ```

mod history_log;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use dip_core::{
    DepositOptions, DepositState, DepositStatus, Depositor, Dip, DipConfig, Endpoint,
    MetadataSource, PackageOptions, PackagerRegistry, SIMPLE_ZIP,
};
use dip_sword::{ClientConfig, SwordClient};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "dip")]
#[command(author = "DIP Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Deposit Information Package manager")]
struct Cli {
    /// DIP directory
    #[arg(short, long, global = true, default_value = ".")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create (or open) the DIP directory
    Init,

    /// Track files, or refresh them if already tracked
    #[command(name = "add-file")]
    AddFile {
        /// Files to track
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Stop tracking files
    #[command(name = "remove-file")]
    RemoveFile {
        /// Files to forget
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List tracked files
    Files,

    /// Edit the Dublin Core document
    Dc {
        #[command(subcommand)]
        command: DcCommands,
    },

    /// Manage extra metadata documents
    Metadata {
        #[command(subcommand)]
        command: MetadataCommands,
    },

    /// Manage repository endpoints
    Endpoint {
        #[command(subcommand)]
        command: EndpointCommands,
    },

    /// Show what needs depositing where
    State {
        /// Only show entries for this endpoint
        #[arg(short, long)]
        endpoint: Option<String>,
    },

    /// Build a package without depositing it
    Package {
        /// Package format
        #[arg(short, long, default_value = SIMPLE_ZIP)]
        format: String,
        /// Leave the tracked files out
        #[arg(long)]
        no_files: bool,
        /// Leave the metadata documents out
        #[arg(long)]
        no_metadata: bool,
    },

    /// Create or update the deposit at an endpoint
    Deposit {
        /// Endpoint id
        endpoint: String,
        /// Send only a metadata document
        #[arg(long)]
        metadata_only: bool,
        /// Metadata document a metadata-only deposit sends
        #[arg(long)]
        metadata_format: Option<String>,
        /// Tell the repository more content will follow
        #[arg(long)]
        in_progress: bool,
        /// Delete the package once it has been deposited
        #[arg(long)]
        remove_package: bool,
        /// Repository password
        #[arg(long, env = "DIP_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Delete the deposit at an endpoint
    Delete {
        /// Endpoint id
        endpoint: String,
        /// Repository password
        #[arg(long, env = "DIP_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Fetch the repository's statement about a deposit
    Statement {
        /// Endpoint id
        endpoint: String,
        /// Repository password
        #[arg(long, env = "DIP_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// View the communication history
    History {
        /// Endpoint id (default: all endpoints)
        endpoint: Option<String>,
        /// Also print stored request and response bodies
        #[arg(long)]
        bodies: bool,
    },
}

#[derive(Subcommand, Debug)]
enum DcCommands {
    /// Add a Dublin Core statement
    Add {
        /// Term, e.g. title or creator
        term: String,
        value: String,
        #[arg(long)]
        lang: Option<String>,
    },
    /// Remove matching statements
    Remove {
        term: Option<String>,
        #[arg(long)]
        value: Option<String>,
        #[arg(long)]
        lang: Option<String>,
    },
    /// List matching statements
    List {
        term: Option<String>,
        #[arg(long)]
        lang: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum MetadataCommands {
    /// Store an XML metadata document under a format name
    Add {
        /// Format name (dcterms replaces the Dublin Core document)
        format: String,
        /// XML file to copy into the DIP
        path: PathBuf,
        /// Send only the document's children in metadata-only deposits
        #[arg(long)]
        no_root: bool,
    },
    /// List metadata documents
    List,
}

#[derive(Subcommand, Debug)]
enum EndpointCommands {
    /// Add an endpoint, or update the one with the same id
    Add {
        /// Service document IRI
        sd_iri: String,
        #[arg(long)]
        id: Option<String>,
        /// Collection IRI deposits are created in
        #[arg(long)]
        col_iri: Option<String>,
        /// Package format for binary deposits
        #[arg(long, default_value = SIMPLE_ZIP)]
        package: String,
        #[arg(short, long)]
        username: Option<String>,
        /// Deposit on behalf of this user
        #[arg(long)]
        obo: Option<String>,
    },
    /// Remove an endpoint and forget its deposits
    Remove {
        /// Endpoint id
        id: String,
    },
    /// List endpoints
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dip=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let dir = cli.dir.as_path();
    tracing::debug!("Using DIP at {}", dir.display());

    match cli.command {
        Commands::Init => cmd_init(dir),
        Commands::AddFile { paths } => cmd_add_file(dir, &paths),
        Commands::RemoveFile { paths } => cmd_remove_file(dir, &paths),
        Commands::Files => cmd_files(dir),
        Commands::Dc { command } => cmd_dc(dir, command),
        Commands::Metadata { command } => cmd_metadata(dir, command),
        Commands::Endpoint { command } => cmd_endpoint(dir, command),
        Commands::State { endpoint } => cmd_state(dir, endpoint.as_deref()),
        Commands::Package {
            format,
            no_files,
            no_metadata,
        } => cmd_package(dir, &format, !no_files, !no_metadata),
        Commands::Deposit {
            endpoint,
            metadata_only,
            metadata_format,
            in_progress,
            remove_package,
            password,
        } => {
            let dip = Dip::open(dir)?;
            let config = dip.config()?;
            let options = DepositOptions {
                metadata_only,
                metadata_format: metadata_format
                    .unwrap_or_else(|| config.default_metadata_format.clone()),
                password,
                in_progress,
                package: PackageOptions {
                    remove_artifact: remove_package || config.remove_packages,
                    ..config.package_options()
                },
            };
            cmd_deposit(dip, &config, &endpoint, &options)
        }
        Commands::Delete { endpoint, password } => cmd_delete(dir, &endpoint, password.as_deref()),
        Commands::Statement { endpoint, password } => {
            cmd_statement(dir, &endpoint, password.as_deref())
        }
        Commands::History { endpoint, bodies } => {
            let dip = Dip::open(dir)?;
            let mut stdout = std::io::stdout();
            history_log::print_history(&dip.history(), endpoint.as_deref(), bodies, &mut stdout)
        }
    }
}

fn cmd_init(dir: &Path) -> Result<()> {
    let dip = Dip::open(dir)?;
    println!("DIP ready at {}", dip.base_dir().display());
    println!("  Created:   {}", dip.record().created);
    println!("  Files:     {}", dip.files().len());
    println!("  Endpoints: {}", dip.endpoints().len());
    Ok(())
}

fn cmd_add_file(dir: &Path, paths: &[PathBuf]) -> Result<()> {
    let mut dip = Dip::open(dir)?;
    for path in paths {
        let file = dip.set_file(path)?;
        println!("Tracking {} ({})", file.record_path(), file.md5());
    }
    Ok(())
}

fn cmd_remove_file(dir: &Path, paths: &[PathBuf]) -> Result<()> {
    let mut dip = Dip::open(dir)?;
    for path in paths {
        if dip.remove_file(path)? {
            println!("Removed {}", path.display());
        } else {
            tracing::warn!("{} is not tracked", path.display());
        }
    }
    Ok(())
}

fn cmd_files(dir: &Path) -> Result<()> {
    let mut dip = Dip::open(dir)?;
    dip.refresh_files()?;
    let files = dip.files();
    if files.is_empty() {
        println!("No files tracked.");
        return Ok(());
    }
    for file in &files {
        println!("{}", file.record_path());
        println!("  MD5:       {}", file.md5());
        println!("  Added:     {}", file.added());
        println!("  Updated:   {}", file.updated());
        for deposit in file.deposits() {
            println!("  Deposited: {} at {}", deposit.id, deposit.last_deposit);
        }
    }
    Ok(())
}

fn cmd_dc(dir: &Path, command: DcCommands) -> Result<()> {
    let mut dip = Dip::open(dir)?;
    match command {
        DcCommands::Add { term, value, lang } => {
            dip.add_dublin_core(&term, &value, lang.as_deref())?;
            println!("Added dcterms:{}", term);
        }
        DcCommands::Remove { term, value, lang } => {
            let removed =
                dip.remove_dublin_core(term.as_deref(), value.as_deref(), lang.as_deref())?;
            println!("Removed {} statements", removed);
        }
        DcCommands::List { term, lang } => {
            for dc in dip.get_dublin_core(term.as_deref(), None, lang.as_deref()) {
                match dc.lang {
                    Some(lang) => println!("{} [{}]: {}", dc.term, lang, dc.value),
                    None => println!("{}: {}", dc.term, dc.value),
                }
            }
        }
    }
    Ok(())
}

fn cmd_metadata(dir: &Path, command: MetadataCommands) -> Result<()> {
    let mut dip = Dip::open(dir)?;
    match command {
        MetadataCommands::Add {
            format,
            path,
            no_root,
        } => {
            dip.add_metadata_file(&format, MetadataSource::Path(&path))?;
            if no_root {
                dip.set_include_root(&format, false)?;
            }
            println!("Stored {} metadata from {}", format, path.display());
        }
        MetadataCommands::List => {
            for metadata in dip.metadata_files() {
                println!("{}", metadata.format());
                println!("  Path:         {}", metadata.record_path());
                println!("  Include root: {}", metadata.include_root());
                println!("  Modified:     {}", metadata.modified());
            }
        }
    }
    Ok(())
}

fn cmd_endpoint(dir: &Path, command: EndpointCommands) -> Result<()> {
    let mut dip = Dip::open(dir)?;
    match command {
        EndpointCommands::Add {
            sd_iri,
            id,
            col_iri,
            package,
            username,
            obo,
        } => {
            let mut endpoint = Endpoint::new(sd_iri).with_package(package);
            if let Some(id) = id {
                endpoint = endpoint.with_id(id);
            }
            endpoint.col_iri = col_iri;
            endpoint.username = username;
            endpoint.obo = obo;
            let handle = dip.set_endpoint(endpoint)?;
            println!("Endpoint {} saved", handle.id());
        }
        EndpointCommands::Remove { id } => {
            if dip.remove_endpoint(&id, false)? {
                println!("Endpoint {} removed", id);
            } else {
                bail!("No endpoint with id {}", id);
            }
        }
        EndpointCommands::List => {
            if dip.endpoints().is_empty() {
                println!("No endpoints configured.");
            }
            for endpoint in dip.endpoints() {
                println!("{}", endpoint.id);
                print_optional("Service doc", endpoint.sd_iri.as_deref());
                print_optional("Collection", endpoint.col_iri.as_deref());
                print_optional("Edit IRI", endpoint.edit_iri.as_deref());
                print_optional("Package", endpoint.package.as_deref());
                print_optional("Username", endpoint.username.as_deref());
                print_optional("On behalf", endpoint.obo.as_deref());
            }
        }
    }
    Ok(())
}

fn print_optional(label: &str, value: Option<&str>) {
    if let Some(value) = value {
        println!("  {:<12} {}", format!("{}:", label), value);
    }
}

fn cmd_state(dir: &Path, endpoint: Option<&str>) -> Result<()> {
    let mut dip = Dip::open(dir)?;
    let state = dip.get_state()?;
    print_state(&state, endpoint);
    Ok(())
}

fn print_state(state: &DepositState, endpoint: Option<&str>) {
    let entries: Vec<_> = state
        .entries()
        .iter()
        .filter(|e| endpoint.is_none() || e.endpoint_id.as_deref() == endpoint)
        .collect();
    if entries.is_empty() {
        println!("Nothing tracked.");
        return;
    }

    println!("{:<15} {:<20} {}", "Status", "Endpoint", "Item");
    println!("{}", "-".repeat(80));
    for entry in &entries {
        println!(
            "{:<15} {:<20} {}",
            entry.status.as_str(),
            entry.endpoint_id.as_deref().unwrap_or("-"),
            entry.item
        );
    }
    println!("{}", "-".repeat(80));

    let pending = entries.iter().filter(|e| e.status.needs_deposit()).count();
    let up_to_date = entries
        .iter()
        .filter(|e| e.status == DepositStatus::UpToDate)
        .count();
    println!(
        "{} entries: {} up to date, {} need depositing",
        entries.len(),
        up_to_date,
        pending
    );
}

fn cmd_package(dir: &Path, format: &str, include_files: bool, include_metadata: bool) -> Result<()> {
    let dip = Dip::open(dir)?;
    let options = PackageOptions {
        include_files,
        include_metadata,
        ..dip.config()?.package_options()
    };
    let descriptor = dip.package(&PackagerRegistry::with_defaults(), format, &options)?;
    let size = fs::metadata(&descriptor.path)?.len();

    println!("Package written: {}", descriptor.path.display());
    println!("  Format:    {}", descriptor.format);
    println!("  MIME:      {}", descriptor.mime);
    println!("  Size:      {}", history_log::format_size(size));
    println!("  Files:     {}", descriptor.files.len());
    println!("  Metadata:  {}", descriptor.metadata.join(", "));
    Ok(())
}

fn sword_client(config: &DipConfig) -> Result<SwordClient> {
    SwordClient::new(&ClientConfig::from_dip_config(config))
}

fn cmd_deposit(
    mut dip: Dip,
    config: &DipConfig,
    endpoint: &str,
    options: &DepositOptions,
) -> Result<()> {
    let client = sword_client(config)?;
    let packagers = PackagerRegistry::with_defaults();
    if options.metadata_only {
        tracing::info!("Depositing {} metadata to {}", options.metadata_format, endpoint);
    } else {
        tracing::info!("Depositing package to {}", endpoint);
    }
    let outcome = Depositor::new(&client, &packagers).deposit(&mut dip, endpoint, options)?;

    let receipt = &outcome.exchange.result;
    println!(
        "{} at {} ({})",
        if outcome.created { "Created" } else { "Updated" },
        endpoint,
        receipt.code
    );
    if let Some(edit_iri) = dip.endpoint(endpoint).and_then(|e| e.edit_iri.as_deref()) {
        println!("  Edit IRI:  {}", edit_iri);
    }
    println!("  Files:     {}", outcome.files.len());
    println!("  Metadata:  {}", outcome.metadata.join(", "));
    Ok(())
}

fn cmd_delete(dir: &Path, endpoint: &str, password: Option<&str>) -> Result<()> {
    let mut dip = Dip::open(dir)?;
    let client = sword_client(&dip.config()?)?;
    let packagers = PackagerRegistry::with_defaults();
    let exchange = Depositor::new(&client, &packagers).delete(&mut dip, endpoint, password)?;
    println!("Deleted deposit at {} ({})", endpoint, exchange.result.code);
    Ok(())
}

fn cmd_statement(dir: &Path, endpoint: &str, password: Option<&str>) -> Result<()> {
    let dip = Dip::open(dir)?;
    let client = sword_client(&dip.config()?)?;
    let packagers = PackagerRegistry::with_defaults();
    let exchange = Depositor::new(&client, &packagers).statement(&dip, endpoint, password)?;

    let statement = &exchange.result;
    if statement.states.is_empty() {
        println!("Statement for {} reports no state.", endpoint);
    }
    for state in &statement.states {
        println!("State: {}", state.term);
        if let Some(description) = &state.description {
            println!("  {}", description);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deposit() {
        let cli = Cli::try_parse_from([
            "dip",
            "--dir",
            "/tmp/dip",
            "deposit",
            "repo",
            "--metadata-only",
            "--password",
            "secret",
        ])
        .unwrap();
        assert_eq!(cli.dir, PathBuf::from("/tmp/dip"));
        match cli.command {
            Commands::Deposit {
                endpoint,
                metadata_only,
                password,
                ..
            } => {
                assert_eq!(endpoint, "repo");
                assert!(metadata_only);
                assert_eq!(password.as_deref(), Some("secret"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_endpoint_add_defaults_to_simple_zip() {
        let cli = Cli::try_parse_from(["dip", "endpoint", "add", "http://repo/sd"]).unwrap();
        match cli.command {
            Commands::Endpoint {
                command: EndpointCommands::Add { package, id, .. },
            } => {
                assert_eq!(package, SIMPLE_ZIP);
                assert!(id.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_local_commands() {
        let tmp = tempfile::TempDir::new().unwrap();
        let data = tmp.path().join("data.txt");
        fs::write(&data, "hello").unwrap();

        cmd_init(tmp.path()).unwrap();
        cmd_add_file(tmp.path(), &[data.clone()]).unwrap();
        cmd_dc(
            tmp.path(),
            DcCommands::Add {
                term: "title".into(),
                value: "Test".into(),
                lang: None,
            },
        )
        .unwrap();
        cmd_package(tmp.path(), SIMPLE_ZIP, true, true).unwrap();

        let dip = Dip::open(tmp.path()).unwrap();
        assert_eq!(dip.files().len(), 1);
        assert_eq!(dip.get_dublin_core(Some("title"), None, None).len(), 1);
        assert!(dip.package_dir(SIMPLE_ZIP).join("SimpleZip.zip").exists());

        cmd_remove_file(tmp.path(), &[data.clone()]).unwrap();
        assert!(Dip::open(tmp.path()).unwrap().files().is_empty());
        // already removed: logged, not an error
        cmd_remove_file(tmp.path(), &[data]).unwrap();
    }

    #[test]
    fn test_dc_add_rejects_invalid_term() {
        let tmp = tempfile::TempDir::new().unwrap();
        let add = |term: &str| {
            cmd_dc(
                tmp.path(),
                DcCommands::Add {
                    term: term.into(),
                    value: "2024".into(),
                    lang: None,
                },
            )
        };
        add("issued").unwrap();
        assert!(add("date issued").is_err());

        let dip = Dip::open(tmp.path()).unwrap();
        let values = dip.get_dublin_core(None, None, None);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].term, "issued");
    }
}
