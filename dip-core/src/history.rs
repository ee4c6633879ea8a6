//! Communication history: every request sent to and response received from
//! a repository, kept per endpoint under `<base>/history/<endpoint-id>/`.
//!
//! Each exchange leg is one metadata JSON file plus, when there is a body,
//! one body file alongside it.

use crate::error::Result;
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

const META_SUFFIX: &str = "_meta.json";
const BODY_SUFFIX: &str = "_body.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Request => "request",
            Direction::Response => "response",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity a request was made with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// One leg of an exchange with a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthInfo>,
    /// Name of the body file, relative to the endpoint's history directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    pub direction: Direction,
    /// Transport failure that stood in for a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub method: String,
    /// Path of a binary payload that was sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    pub timestamp: Timestamp,
    pub url: String,
}

impl CommunicationRecord {
    pub fn new(direction: Direction, method: &str, url: &str, timestamp: Timestamp) -> Self {
        Self {
            auth: None,
            body: None,
            code: None,
            direction,
            error: None,
            headers: BTreeMap::new(),
            method: method.to_string(),
            payload: None,
            timestamp,
            url: url.to_string(),
        }
    }

    pub fn request(method: &str, url: &str, timestamp: Timestamp) -> Self {
        Self::new(Direction::Request, method, url, timestamp)
    }

    pub fn response(method: &str, url: &str, timestamp: Timestamp) -> Self {
        Self::new(Direction::Response, method, url, timestamp)
    }

    pub fn with_auth(mut self, auth: AuthInfo) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn is_success(&self) -> bool {
        self.code.is_some_and(|c| (200..300).contains(&c))
    }

    fn stem(&self) -> String {
        format!("{}_{}", self.timestamp.to_file_stem(), self.direction)
    }
}

/// The communication history of a DIP.
#[derive(Debug, Clone)]
pub struct History {
    history_dir: PathBuf,
}

impl History {
    pub fn new(history_dir: &Path) -> Self {
        Self {
            history_dir: history_dir.to_path_buf(),
        }
    }

    pub fn endpoint_dir(&self, endpoint_id: &str) -> PathBuf {
        self.history_dir
            .join(urlencoding::encode(endpoint_id).as_ref())
    }

    /// Persist a record, and its body if any. Sets `record.body` to the body
    /// file name. Returns the path of the metadata file.
    pub fn save(
        &self,
        endpoint_id: &str,
        record: &mut CommunicationRecord,
        body: Option<&str>,
    ) -> Result<PathBuf> {
        let dir = self.endpoint_dir(endpoint_id);
        fs::create_dir_all(&dir)?;

        let stem = record.stem();
        if let Some(body) = body {
            let body_name = format!("{}{}", stem, BODY_SUFFIX);
            fs::write(dir.join(&body_name), body)?;
            record.body = Some(body_name);
        }

        let meta_path = dir.join(format!("{}{}", stem, META_SUFFIX));
        let data = serde_json::to_string_pretty(record)?;
        fs::write(&meta_path, data)?;
        tracing::debug!(
            "Recorded {} {} {} for endpoint {}",
            record.direction,
            record.method,
            record.url,
            endpoint_id
        );
        Ok(meta_path)
    }

    /// All records for an endpoint, oldest first; a request sorts before the
    /// response with the same timestamp.
    pub fn list(&self, endpoint_id: &str) -> Result<Vec<CommunicationRecord>> {
        let dir = self.endpoint_dir(endpoint_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_meta = path
                .file_name()
                .map(|n| n.to_string_lossy().ends_with(META_SUFFIX))
                .unwrap_or(false);
            if !is_meta {
                continue;
            }
            let data = fs::read_to_string(&path)?;
            match serde_json::from_str::<CommunicationRecord>(&data) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping unreadable history entry {}: {}", path.display(), e),
            }
        }
        records.sort_by_key(|r| (r.timestamp, r.direction));
        Ok(records)
    }

    pub fn latest(&self, endpoint_id: &str) -> Result<Option<CommunicationRecord>> {
        Ok(self.list(endpoint_id)?.into_iter().last())
    }

    pub fn read_body(
        &self,
        endpoint_id: &str,
        record: &CommunicationRecord,
    ) -> Result<Option<String>> {
        match &record.body {
            Some(name) => Ok(Some(fs::read_to_string(
                self.endpoint_dir(endpoint_id).join(name),
            )?)),
            None => Ok(None),
        }
    }

    /// Endpoint ids that have any history.
    pub fn endpoints(&self) -> Result<Vec<String>> {
        if !self.history_dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.history_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let name = entry.file_name().to_string_lossy().into_owned();
                let id = urlencoding::decode(&name)
                    .map(|s| s.into_owned())
                    .unwrap_or(name);
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
