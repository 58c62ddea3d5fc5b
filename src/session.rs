use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BulkError;
use crate::jmap::CAP_MAIL;
use crate::toolkit::{SharedAuth, Toolkit};

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Negotiated session: where to send calls and which account to address.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub api_url: String,
    pub account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip)]
    pub download_url: Option<String>,
    #[serde(skip)]
    pub upload_url: Option<String>,
    #[serde(skip)]
    pub capabilities: BTreeSet<String>,
}

impl Session {
    pub fn has_capability(&self, urn: &str) -> bool {
        self.capabilities.contains(urn)
    }

    pub fn download_url_for(&self, blob_id: &str, name: &str, content_type: &str) -> Option<String> {
        self.download_url.as_ref().map(|t| {
            expand_template(
                t,
                &[
                    ("accountId", &self.account_id),
                    ("blobId", blob_id),
                    ("name", name),
                    ("type", content_type),
                ],
            )
        })
    }

    pub fn upload_url_for(&self) -> Option<String> {
        self.upload_url
            .as_ref()
            .map(|t| expand_template(t, &[("accountId", &self.account_id)]))
    }
}

fn expand_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (k, v)| {
        let encoded: String = url::form_urlencoded::byte_serialize(v.as_bytes()).collect();
        acc.replace(&format!("{{{k}}}"), &encoded)
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionDocument {
    api_url: String,
    #[serde(default)]
    primary_accounts: BTreeMap<String, String>,
    #[serde(default)]
    capabilities: BTreeMap<String, Value>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    upload_url: Option<String>,
}

impl TryFrom<SessionDocument> for Session {
    type Error = BulkError;

    fn try_from(doc: SessionDocument) -> Result<Self, Self::Error> {
        let account_id = doc
            .primary_accounts
            .get(CAP_MAIL)
            .cloned()
            .ok_or_else(|| BulkError::Auth("session has no primary mail account".to_string()))?;

        Ok(Self {
            api_url: doc.api_url,
            account_id,
            username: doc.username,
            download_url: doc.download_url,
            upload_url: doc.upload_url,
            capabilities: doc.capabilities.into_keys().collect(),
        })
    }
}

/// Fetch the session document from `server_url` and publish the result on `toolkit`.
pub async fn connect(
    http: &reqwest::Client,
    server_url: &str,
    credentials: &Credentials,
    toolkit: &Toolkit,
) -> Result<Session, BulkError> {
    let resp = http
        .get(server_url)
        .basic_auth(&credentials.user, Some(&credentials.pass))
        .send()
        .await
        .map_err(|e| BulkError::Auth(format!("Authentication failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(BulkError::Auth(format!(
            "Authentication failed: {}",
            status.as_u16()
        )));
    }

    let doc: SessionDocument = resp
        .json()
        .await
        .map_err(|e| BulkError::Auth(format!("invalid session document: {e}")))?;
    let session = Session::try_from(doc)?;

    log::info!(
        "session established: account {} via {}",
        session.account_id,
        session.api_url
    );

    toolkit.set_shared_auth(SharedAuth {
        server_url: server_url.to_string(),
        credentials: credentials.clone(),
        session: session.clone(),
    });

    Ok(session)
}
