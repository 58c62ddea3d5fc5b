use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ROLE_JUNK: &str = "junk";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mailbox {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
}

/// The subset of an Email object fetched by the scanner and the mutation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub from: Option<Vec<EmailAddress>>,
    #[serde(default)]
    pub mailbox_ids: BTreeMap<String, bool>,
}

impl MessageSummary {
    /// First listed sender, if any.
    pub fn sender(&self) -> Option<&EmailAddress> {
        self.from.as_ref().and_then(|f| f.first())
    }
}

/// Server-side filter script (RFC 9661). The source text lives in the blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SieveScript {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub blob_id: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetResponse<T> {
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetResponse {
    #[serde(default)]
    pub created: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    pub updated: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    pub not_created: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    pub not_updated: Option<BTreeMap<String, serde_json::Value>>,
}

impl SetResponse {
    pub fn updated_count(&self) -> usize {
        self.updated.as_ref().map_or(0, BTreeMap::len)
    }

    pub fn not_updated_count(&self) -> usize {
        self.not_updated.as_ref().map_or(0, BTreeMap::len)
    }
}
