//! The repository connector contract.
//!
//! The deposit orchestrator talks to a remote repository only through
//! [`RepositoryConnector`]. Implementations return `anyhow::Result` so that
//! transport failures reach the caller with their full context; any HTTP
//! response, successful or not, comes back as a [`Receipt`].

use crate::history::AuthInfo;
use crate::record::Endpoint;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Content type of an Atom entry body.
pub const ATOM_ENTRY_CONTENT_TYPE: &str = "application/atom+xml;type=entry";

/// Credentials and mediation for one request.
#[derive(Clone, Default)]
pub struct Auth {
    pub username: Option<String>,
    pub password: Option<String>,
    pub on_behalf_of: Option<String>,
}

impl Auth {
    pub fn from_endpoint(endpoint: &Endpoint, password: Option<&str>) -> Self {
        Self {
            username: endpoint.username.clone(),
            password: password.map(str::to_string),
            on_behalf_of: endpoint.obo.clone(),
        }
    }

    /// What may be written to the history: never the password.
    pub fn info(&self) -> AuthInfo {
        AuthInfo {
            obo: self.on_behalf_of.clone(),
            username: self.username.clone(),
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("on_behalf_of", &self.on_behalf_of)
            .finish()
    }
}

/// Body of a create or update.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    /// A serialized Atom entry.
    Entry(&'a str),
    /// A packaged artifact on disk.
    Binary {
        path: &'a Path,
        filename: &'a str,
        mime: &'a str,
        packaging: &'a str,
    },
}

/// A create or update request.
#[derive(Debug, Clone, Copy)]
pub struct DepositRequest<'a> {
    pub target: &'a str,
    pub payload: Payload<'a>,
    pub in_progress: bool,
    pub auth: &'a Auth,
}

impl DepositRequest<'_> {
    /// Protocol headers for this request, excluding authorization and the
    /// payload checksum (both computed by the transport).
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = auth_headers(self.auth);
        headers.insert(
            "In-Progress".to_string(),
            if self.in_progress { "true" } else { "false" }.to_string(),
        );
        match self.payload {
            Payload::Entry(_) => {
                headers.insert(
                    "Content-Type".to_string(),
                    ATOM_ENTRY_CONTENT_TYPE.to_string(),
                );
            }
            Payload::Binary {
                filename,
                mime,
                packaging,
                ..
            } => {
                headers.insert("Content-Type".to_string(), mime.to_string());
                headers.insert(
                    "Content-Disposition".to_string(),
                    format!("attachment; filename={}", filename),
                );
                headers.insert("Packaging".to_string(), packaging.to_string());
            }
        }
        headers
    }
}

/// Headers shared by every request made with `auth`.
pub fn auth_headers(auth: &Auth) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    if let Some(obo) = &auth.on_behalf_of {
        headers.insert("On-Behalf-Of".to_string(), obo.clone());
    }
    headers
}

/// The repository's answer to any request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Receipt {
    pub code: u16,
    pub location: Option<String>,
    /// Edit locator (`rel="edit"`).
    pub edit: Option<String>,
    /// Edit-media locator (`rel="edit-media"`).
    pub edit_media: Option<String>,
    /// Statement locator.
    pub statement: Option<String>,
    pub body: Option<String>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// The locator to use for later updates: the edit link, falling back to
    /// the `Location` header.
    pub fn edit_locator(&self) -> Option<&str> {
        self.edit.as_deref().or(self.location.as_deref())
    }
}

/// One state reported in a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementState {
    pub term: String,
    pub description: Option<String>,
}

/// The repository's description of a deposited object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub code: u16,
    pub states: Vec<StatementState>,
    pub body: Option<String>,
}

impl Statement {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// What the history needs to know about any response.
pub trait ConnectorResponse {
    fn code(&self) -> u16;

    fn body(&self) -> Option<&str>;

    fn headers(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

impl ConnectorResponse for Receipt {
    fn code(&self) -> u16 {
        self.code
    }

    fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        if let Some(location) = &self.location {
            headers.insert("Location".to_string(), location.clone());
        }
        headers
    }
}

impl ConnectorResponse for Statement {
    fn code(&self) -> u16 {
        self.code
    }

    fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

/// Transport to a remote deposit repository.
pub trait RepositoryConnector {
    /// Create a new object in the collection at `request.target`.
    fn create(&self, request: &DepositRequest<'_>) -> anyhow::Result<Receipt>;

    /// Replace the content at `request.target` (an edit or edit-media locator).
    fn update(&self, request: &DepositRequest<'_>) -> anyhow::Result<Receipt>;

    fn delete(&self, target: &str, auth: &Auth) -> anyhow::Result<Receipt>;

    fn get_deposit_receipt(&self, edit_iri: &str, auth: &Auth) -> anyhow::Result<Receipt>;

    fn get_statement(&self, statement_iri: &str, auth: &Auth) -> anyhow::Result<Statement>;
}
