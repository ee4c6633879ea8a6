//! Deposit orchestration: create, update, delete and statement retrieval
//! against one endpoint of a DIP.
//!
//! Every exchange is written to the communication history before and after
//! the connector call, whatever its outcome. Local state changes only once
//! the repository has confirmed the operation with a 2xx response.

use crate::connector::{
    Auth, ConnectorResponse, DepositRequest, Payload, Receipt, RepositoryConnector, Statement,
    auth_headers,
};
use crate::dip::Dip;
use crate::error::{DipError, Result};
use crate::history::{CommunicationRecord, History};
use crate::metadata;
use crate::package::{PackageOptions, PackagerRegistry};
use crate::record::{DCTERMS_FORMAT, Endpoint};
use crate::timestamp::Timestamp;

/// How to deposit.
#[derive(Debug, Clone)]
pub struct DepositOptions {
    /// Send only a metadata document as an Atom entry.
    pub metadata_only: bool,
    /// Which metadata document a metadata-only deposit sends.
    pub metadata_format: String,
    pub password: Option<String>,
    pub in_progress: bool,
    pub package: PackageOptions,
}

impl Default for DepositOptions {
    fn default() -> Self {
        Self {
            metadata_only: false,
            metadata_format: DCTERMS_FORMAT.to_string(),
            password: None,
            in_progress: false,
            package: PackageOptions::default(),
        }
    }
}

impl DepositOptions {
    pub fn metadata_only() -> Self {
        Self {
            metadata_only: true,
            ..Self::default()
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }
}

/// A confirmed exchange.
#[derive(Debug, Clone)]
pub struct Exchange<T> {
    pub request: CommunicationRecord,
    pub response: CommunicationRecord,
    pub result: T,
}

/// What a successful deposit did.
#[derive(Debug, Clone)]
pub struct DepositOutcome {
    /// True if the deposit created the remote object.
    pub created: bool,
    pub exchange: Exchange<Receipt>,
    /// Record paths of the files marked deposited.
    pub files: Vec<String>,
    /// Metadata formats marked deposited.
    pub metadata: Vec<String>,
}

/// Drives deposits through a connector.
pub struct Depositor<'a, C: RepositoryConnector + ?Sized> {
    connector: &'a C,
    packagers: &'a PackagerRegistry,
}

impl<'a, C: RepositoryConnector + ?Sized> Depositor<'a, C> {
    pub fn new(connector: &'a C, packagers: &'a PackagerRegistry) -> Self {
        Self {
            connector,
            packagers,
        }
    }

    /// Create or update the remote object for `endpoint_id`.
    pub fn deposit(
        &self,
        dip: &mut Dip,
        endpoint_id: &str,
        options: &DepositOptions,
    ) -> Result<DepositOutcome> {
        let endpoint = ready_endpoint(dip, endpoint_id)?;
        let auth = Auth::from_endpoint(&endpoint, options.password.as_deref());
        if options.metadata_only {
            self.deposit_metadata(dip, &endpoint, &auth, options)
        } else {
            self.deposit_package(dip, &endpoint, &auth, options)
        }
    }

    fn deposit_metadata(
        &self,
        dip: &mut Dip,
        endpoint: &Endpoint,
        auth: &Auth,
        options: &DepositOptions,
    ) -> Result<DepositOutcome> {
        let format = options.metadata_format.as_str();
        let include_root = dip
            .metadata_file(format)
            .map(|m| m.include_root())
            .ok_or_else(|| {
                DipError::deposit(format!("no metadata document with format {}", format))
            })?;
        let document = dip.metadata_document(format).map_err(|e| {
            DipError::deposit(format!("{} metadata cannot be sent as XML: {}", format, e))
        })?;

        let (method, target, create) = target_for(endpoint, None)?;
        let requested = Timestamp::now();
        let entry = metadata::atom_entry(&document, include_root, requested).to_document()?;
        let request = DepositRequest {
            target,
            payload: Payload::Entry(&entry),
            in_progress: options.in_progress,
            auth,
        };

        let history = dip.history();
        let exchange = record_exchange(
            &history,
            &endpoint.id,
            method,
            &request_record(method, target, auth, &request, requested),
            Some(&entry),
            || {
                if create {
                    self.connector.create(&request)
                } else {
                    self.connector.update(&request)
                }
            },
        )?;
        let edit_iri = confirm(&exchange.result, method, target, create)?;

        let formats = vec![format.to_string()];
        dip.record_deposit(&endpoint.id, edit_iri, &[], &formats, requested)?;
        tracing::info!(
            "Deposited {} metadata to endpoint {} ({} {})",
            format,
            endpoint.id,
            method,
            target
        );
        Ok(DepositOutcome {
            created: create,
            exchange,
            files: Vec::new(),
            metadata: formats,
        })
    }

    fn deposit_package(
        &self,
        dip: &mut Dip,
        endpoint: &Endpoint,
        auth: &Auth,
        options: &DepositOptions,
    ) -> Result<DepositOutcome> {
        let format = endpoint.package.as_deref().ok_or_else(|| {
            DipError::package(format!("endpoint {} has no package format", endpoint.id))
        })?;
        let packager = self.packagers.get(format)?;
        let output_dir = dip.package_dir(format);
        let descriptor = packager.package(dip, &output_dir, &options.package)?;

        let history = dip.history();
        let edit_media = match &endpoint.edit_iri {
            Some(edit_iri) => {
                let receipt = self.fetch_receipt(&history, endpoint, edit_iri, auth)?;
                Some(receipt.result.edit_media.ok_or_else(|| {
                    DipError::deposit(format!(
                        "deposit receipt for {} has no edit-media link",
                        edit_iri
                    ))
                })?)
            }
            None => None,
        };
        let (method, target, create) = target_for(endpoint, edit_media.as_deref())?;

        let requested = Timestamp::now();
        let request = DepositRequest {
            target,
            payload: Payload::Binary {
                path: &descriptor.path,
                filename: &descriptor.filename,
                mime: &descriptor.mime,
                packaging: &descriptor.format,
            },
            in_progress: options.in_progress,
            auth,
        };
        let mut record = request_record(method, target, auth, &request, requested);
        record.payload = Some(descriptor.path.display().to_string());
        let exchange = record_exchange(&history, &endpoint.id, method, &record, None, || {
            if create {
                self.connector.create(&request)
            } else {
                self.connector.update(&request)
            }
        })?;
        let edit_iri = confirm(&exchange.result, method, target, create)?;

        dip.record_deposit(
            &endpoint.id,
            edit_iri,
            &descriptor.files,
            &descriptor.metadata,
            requested,
        )?;
        packager.cleanup(dip, &output_dir, &descriptor, &options.package)?;
        tracing::info!(
            "Deposited {} files and {} metadata documents to endpoint {} ({} {})",
            descriptor.files.len(),
            descriptor.metadata.len(),
            endpoint.id,
            method,
            target
        );
        Ok(DepositOutcome {
            created: create,
            exchange,
            files: descriptor.files,
            metadata: descriptor.metadata,
        })
    }

    /// Delete the remote object and forget every deposit to the endpoint.
    pub fn delete(
        &self,
        dip: &mut Dip,
        endpoint_id: &str,
        password: Option<&str>,
    ) -> Result<Exchange<Receipt>> {
        let endpoint = ready_endpoint(dip, endpoint_id)?;
        let edit_iri = deposited_edit_iri(&endpoint)?;
        let auth = Auth::from_endpoint(&endpoint, password);

        let history = dip.history();
        let record = CommunicationRecord::request("DELETE", edit_iri, Timestamp::now())
            .with_auth(auth.info())
            .with_headers(auth_headers(&auth));
        let exchange = record_exchange(&history, &endpoint.id, "DELETE", &record, None, || {
            self.connector.delete(edit_iri, &auth)
        })?;
        ensure_success(exchange.result.code, "DELETE", edit_iri)?;

        let forgotten = dip.record_removal(&endpoint.id)?;
        tracing::info!(
            "Deleted {} from endpoint {} ({} deposit records cleared)",
            edit_iri,
            endpoint.id,
            forgotten
        );
        Ok(exchange)
    }

    /// Fetch the repository's statement about the deposited object.
    pub fn statement(
        &self,
        dip: &Dip,
        endpoint_id: &str,
        password: Option<&str>,
    ) -> Result<Exchange<Statement>> {
        let endpoint = ready_endpoint(dip, endpoint_id)?;
        let edit_iri = deposited_edit_iri(&endpoint)?;
        let auth = Auth::from_endpoint(&endpoint, password);

        let history = dip.history();
        let receipt = self.fetch_receipt(&history, &endpoint, edit_iri, &auth)?;
        let statement_iri = receipt.result.statement.ok_or_else(|| {
            DipError::deposit(format!("deposit receipt for {} has no statement link", edit_iri))
        })?;

        let record = CommunicationRecord::request("GET", &statement_iri, Timestamp::now())
            .with_auth(auth.info())
            .with_headers(auth_headers(&auth));
        let exchange = record_exchange(&history, &endpoint.id, "GET", &record, None, || {
            self.connector.get_statement(&statement_iri, &auth)
        })?;
        ensure_success(exchange.result.code, "GET", &statement_iri)?;
        Ok(exchange)
    }

    fn fetch_receipt(
        &self,
        history: &History,
        endpoint: &Endpoint,
        edit_iri: &str,
        auth: &Auth,
    ) -> Result<Exchange<Receipt>> {
        let record = CommunicationRecord::request("GET", edit_iri, Timestamp::now())
            .with_auth(auth.info())
            .with_headers(auth_headers(auth));
        let exchange = record_exchange(history, &endpoint.id, "GET", &record, None, || {
            self.connector.get_deposit_receipt(edit_iri, auth)
        })?;
        ensure_success(exchange.result.code, "GET", edit_iri)?;
        Ok(exchange)
    }
}

/// The endpoint, checked to be usable for any remote operation.
fn ready_endpoint(dip: &Dip, endpoint_id: &str) -> Result<Endpoint> {
    let endpoint = dip
        .endpoint(endpoint_id)
        .ok_or_else(|| DipError::deposit(format!("no endpoint with id {}", endpoint_id)))?;
    if endpoint.sd_iri.is_none() {
        return Err(DipError::deposit(format!(
            "endpoint {} has no sd_iri",
            endpoint_id
        )));
    }
    if endpoint.col_iri.is_none() {
        return Err(DipError::deposit(format!(
            "endpoint {} has no col_iri",
            endpoint_id
        )));
    }
    Ok(endpoint.clone())
}

fn deposited_edit_iri(endpoint: &Endpoint) -> Result<&str> {
    endpoint.edit_iri.as_deref().ok_or_else(|| {
        DipError::deposit(format!(
            "nothing has been deposited to endpoint {}",
            endpoint.id
        ))
    })
}

/// Method, target and whether this is a create. Updates go to the edit
/// locator, or to `update_target` when given.
fn target_for<'e>(
    endpoint: &'e Endpoint,
    update_target: Option<&'e str>,
) -> Result<(&'static str, &'e str, bool)> {
    match &endpoint.edit_iri {
        None => {
            let col_iri = endpoint.col_iri.as_deref().ok_or_else(|| {
                DipError::deposit(format!("endpoint {} has no col_iri", endpoint.id))
            })?;
            Ok(("POST", col_iri, true))
        }
        Some(edit_iri) => Ok(("PUT", update_target.unwrap_or(edit_iri), false)),
    }
}

fn request_record(
    method: &str,
    target: &str,
    auth: &Auth,
    request: &DepositRequest<'_>,
    at: Timestamp,
) -> CommunicationRecord {
    CommunicationRecord::request(method, target, at)
        .with_auth(auth.info())
        .with_headers(request.headers())
}

/// Record the request, make the call, record the response. A connector error
/// is recorded and then returned unchanged.
fn record_exchange<T, F>(
    history: &History,
    endpoint_id: &str,
    method: &str,
    request: &CommunicationRecord,
    body: Option<&str>,
    call: F,
) -> Result<Exchange<T>>
where
    T: ConnectorResponse,
    F: FnOnce() -> anyhow::Result<T>,
{
    let mut request = request.clone();
    history.save(endpoint_id, &mut request, body)?;

    let result = call();
    let mut response = CommunicationRecord::response(method, &request.url, Timestamp::now());
    match result {
        Ok(result) => {
            response.code = Some(result.code());
            response.headers = result.headers();
            history.save(endpoint_id, &mut response, result.body())?;
            Ok(Exchange {
                request,
                response,
                result,
            })
        }
        Err(e) => {
            response.error = Some(format!("{:#}", e));
            if let Err(save_err) = history.save(endpoint_id, &mut response, None) {
                tracing::warn!("Could not record failed {} {}: {}", method, request.url, save_err);
            }
            Err(DipError::Connector(e))
        }
    }
}

fn ensure_success(code: u16, method: &str, target: &str) -> Result<()> {
    if (200..300).contains(&code) {
        return Ok(());
    }
    Err(DipError::deposit(format!(
        "{} {} was not accepted by the repository (HTTP {})",
        method, target, code
    )))
}

/// Check a create/update receipt; for a create, return the new edit locator.
fn confirm(receipt: &Receipt, method: &str, target: &str, create: bool) -> Result<Option<String>> {
    ensure_success(receipt.code, method, target)?;
    if !create {
        return Ok(None);
    }
    match receipt.edit_locator() {
        Some(edit_iri) => Ok(Some(edit_iri.to_string())),
        None => Err(DipError::deposit(format!(
            "{} {} succeeded but the receipt has no edit locator",
            method, target
        ))),
    }
}
