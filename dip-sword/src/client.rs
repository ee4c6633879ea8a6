//! Blocking SWORD v2 HTTP client.
//!
//! Implements [`RepositoryConnector`]: create is a POST to the collection,
//! update a PUT to an edit or edit-media locator, delete a DELETE, and
//! receipts and statements are fetched with GET. Every HTTP response is
//! returned as a [`Receipt`]; only transport failures are errors.

use crate::atom;
use anyhow::{Context, Result};
use dip_core::checksum::md5_hex;
use dip_core::connector::{Auth, DepositRequest, Payload, auth_headers};
use dip_core::{DipConfig, Receipt, RepositoryConnector, Statement};
use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, LOCATION};
use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

const ATOM_FEED: &str = "application/atom+xml;type=feed";

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn from_dip_config(config: &DipConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            user_agent: config.user_agent.clone(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_dip_config(&DipConfig::default())
    }
}

/// HTTP connector to a SWORD v2 server.
pub struct SwordClient {
    http: Client,
}

impl SwordClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { http })
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        auth: &Auth,
        headers: BTreeMap<String, String>,
    ) -> RequestBuilder {
        let mut builder = self.http.request(method, url);
        if let Some(username) = &auth.username {
            builder = builder.basic_auth(username, auth.password.as_ref());
        }
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        builder
    }

    fn send_deposit(&self, method: Method, request: &DepositRequest<'_>) -> Result<Receipt> {
        let mut builder = self.request(
            method.clone(),
            request.target,
            request.auth,
            request.headers(),
        );
        builder = match request.payload {
            Payload::Entry(entry) => builder
                .header("Content-MD5", md5_hex(entry.as_bytes()))
                .body(entry.to_string()),
            Payload::Binary { path, .. } => {
                let data = fs::read(path)
                    .with_context(|| format!("Failed to read package {}", path.display()))?;
                builder.header("Content-MD5", md5_hex(&data)).body(data)
            }
        };

        tracing::debug!("{} {}", method, request.target);
        let resp = builder
            .send()
            .with_context(|| format!("Failed to send {} to {}", method, request.target))?;
        read_receipt(resp)
    }

    fn send_get(&self, url: &str, auth: &Auth, accept: Option<&str>) -> Result<Response> {
        let mut builder = self.request(Method::GET, url, auth, auth_headers(auth));
        if let Some(accept) = accept {
            builder = builder.header(ACCEPT, accept);
        }
        tracing::debug!("GET {}", url);
        builder
            .send()
            .with_context(|| format!("Failed to connect to {}", url))
    }
}

impl RepositoryConnector for SwordClient {
    fn create(&self, request: &DepositRequest<'_>) -> Result<Receipt> {
        self.send_deposit(Method::POST, request)
    }

    fn update(&self, request: &DepositRequest<'_>) -> Result<Receipt> {
        self.send_deposit(Method::PUT, request)
    }

    fn delete(&self, target: &str, auth: &Auth) -> Result<Receipt> {
        tracing::debug!("DELETE {}", target);
        let resp = self
            .request(Method::DELETE, target, auth, auth_headers(auth))
            .send()
            .with_context(|| format!("Failed to send DELETE to {}", target))?;
        read_receipt(resp)
    }

    fn get_deposit_receipt(&self, edit_iri: &str, auth: &Auth) -> Result<Receipt> {
        read_receipt(self.send_get(edit_iri, auth, None)?)
    }

    fn get_statement(&self, statement_iri: &str, auth: &Auth) -> Result<Statement> {
        let resp = self.send_get(statement_iri, auth, Some(ATOM_FEED))?;
        let code = resp.status().as_u16();
        let body = resp
            .text()
            .with_context(|| format!("Failed to read statement from {}", statement_iri))?;

        let states = if (200..300).contains(&code) {
            atom::parse_statement(&body)
                .with_context(|| format!("Failed to parse statement from {}", statement_iri))?
        } else {
            Vec::new()
        };
        Ok(Statement {
            code,
            states,
            body: non_empty(body),
        })
    }
}

/// Turn any HTTP response into a receipt, reading links from an Atom body
/// when there is one.
fn read_receipt(resp: Response) -> Result<Receipt> {
    let code = resp.status().as_u16();
    let location = resp
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp.text().context("Failed to read response body")?;

    let mut receipt = Receipt {
        code,
        location,
        ..Receipt::default()
    };
    if body.trim_start().starts_with('<') {
        match atom::parse_receipt_links(&body) {
            Ok(links) => {
                receipt.edit = links.edit;
                receipt.edit_media = links.edit_media;
                receipt.statement = links.statement;
            }
            Err(e) => tracing::debug!("Response body is not a deposit receipt: {}", e),
        }
    }
    receipt.body = non_empty(body);
    Ok(receipt)
}

fn non_empty(body: String) -> Option<String> {
    if body.trim().is_empty() { None } else { Some(body) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_from_dip_config() {
        let config = DipConfig {
            timeout_secs: 12,
            user_agent: "agent/1".into(),
            ..DipConfig::default()
        };
        let client_config = ClientConfig::from_dip_config(&config);
        assert_eq!(client_config.timeout, Duration::from_secs(12));
        assert_eq!(client_config.user_agent, "agent/1");
        assert!(SwordClient::new(&client_config).is_ok());
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty("  \n".into()), None);
        assert_eq!(non_empty("<x/>".into()).as_deref(), Some("<x/>"));
    }
}
