use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::RuntimeConfig;
use crate::error::BulkError;
use crate::jmap::{CAP_SIEVE, Request, Transport, USING_MAIL, USING_SIEVE};
use crate::senders::{SenderGroup, SenderKey, group_by_sender};
use crate::session::{self, Session};
use crate::sieve;
use crate::toolkit::Toolkit;
use crate::types::{GetResponse, Mailbox, MessageSummary, ROLE_JUNK, SetResponse, SieveScript};

const CREATE_ID: &str = "new-rule";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    pub moved: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleOutcome {
    pub sender: String,
    pub script_id: String,
    pub script_name: String,
    pub created: bool,
}

pub struct Backend {
    transport: Transport,
    session: Session,
    bulk_mailbox: Option<Mailbox>,
}

fn http_client() -> Result<reqwest::Client, BulkError> {
    reqwest::Client::builder()
        .user_agent(concat!("bulkman/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| BulkError::transport(format!("http client setup failed: {e}")))
}

/// Role `junk` first, then a case-insensitive name match; server order breaks ties.
pub fn select_bulk_mailbox<'a>(mailboxes: &'a [Mailbox], candidate: &str) -> Option<&'a Mailbox> {
    mailboxes
        .iter()
        .find(|m| m.role.as_deref() == Some(ROLE_JUNK))
        .or_else(|| {
            let wanted = candidate.to_lowercase();
            mailboxes.iter().find(|m| m.name.to_lowercase() == wanted)
        })
}

pub fn scan_cutoff(now: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>, BulkError> {
    Duration::try_days(i64::from(days))
        .and_then(|d| now.checked_sub_signed(d))
        .ok_or_else(|| BulkError::Usage(format!("scan window of {days} days is out of range")))
}

fn utc_date(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn sieve_unavailable(e: &BulkError) -> bool {
    let BulkError::Transport {
        detail: Some(detail),
        ..
    } = e
    else {
        return false;
    };

    let kind = detail.get("type").and_then(|t| t.as_str()).unwrap_or("");
    if kind == "unknownMethod" || kind.ends_with("unknownCapability") {
        return true;
    }
    let text = detail.to_string();
    text.contains("SieveScript") || text.contains(CAP_SIEVE)
}

impl Backend {
    /// Authenticate, reusing a session already published on `toolkit`.
    pub async fn connect(cfg: &RuntimeConfig, toolkit: &Toolkit) -> Result<Self, BulkError> {
        let http = http_client()?;
        let session = match toolkit.session_for(&cfg.server_url, &cfg.credentials) {
            Some(s) => {
                log::debug!("reusing shared session for account {}", s.account_id);
                s
            }
            None => session::connect(&http, &cfg.server_url, &cfg.credentials, toolkit).await?,
        };
        let transport = Transport::new(http, session.api_url.clone(), cfg.credentials.clone());

        Ok(Self {
            transport,
            session,
            bulk_mailbox: None,
        })
    }

    /// Connect and resolve the bulk mailbox.
    pub async fn open(cfg: &RuntimeConfig, toolkit: &Toolkit) -> Result<Self, BulkError> {
        let mut backend = Self::connect(cfg, toolkit).await?;
        backend.find_bulk_mailbox(&cfg.folder).await?;
        Ok(backend)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn bulk_mailbox(&self) -> Option<&Mailbox> {
        self.bulk_mailbox.as_ref()
    }

    fn bulk_mailbox_id(&self) -> Result<&str, BulkError> {
        self.bulk_mailbox
            .as_ref()
            .map(|m| m.id.as_str())
            .ok_or_else(|| BulkError::NotFound("bulk mailbox has not been resolved".to_string()))
    }

    fn account_id(&self) -> &str {
        &self.session.account_id
    }

    pub async fn list_mailboxes(&self) -> Result<Vec<Mailbox>, BulkError> {
        let mut req = Request::new(USING_MAIL);
        let get = req.call(
            "Mailbox/get",
            json!({
                "accountId": self.account_id(),
                "properties": ["id", "name", "parentId", "role"],
            }),
        );

        let mut resp = self.transport.invoke(&req).await?;
        resp.take(&get)?
            .parse::<GetResponse<Mailbox>>("Mailbox/get")
            .map(|r| r.list)
    }

    pub async fn find_bulk_mailbox(&mut self, candidate: &str) -> Result<Mailbox, BulkError> {
        let mailboxes = self.list_mailboxes().await?;
        let found = select_bulk_mailbox(&mailboxes, candidate)
            .cloned()
            .ok_or_else(|| BulkError::NotFound(format!("Folder \"{candidate}\" not found")))?;

        log::info!("bulk mailbox: {} ({})", found.name, found.id);
        self.bulk_mailbox = Some(found.clone());
        Ok(found)
    }

    /// Bulk-folder messages received at or after `cutoff`, in server order.
    pub async fn recent_bulk_messages(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MessageSummary>, BulkError> {
        let mut req = Request::new(USING_MAIL);
        let query = req.call(
            "Email/query",
            json!({
                "accountId": self.account_id(),
                "filter": {
                    "inMailbox": self.bulk_mailbox_id()?,
                    "after": utc_date(cutoff),
                },
                "sort": [{"property": "receivedAt", "isAscending": false}],
            }),
        );
        let get = req.call(
            "Email/get",
            json!({
                "accountId": self.account_id(),
                "#ids": query.result_reference("/ids"),
                "properties": ["id", "subject", "from", "receivedAt", "mailboxIds"],
            }),
        );

        let mut resp = self.transport.invoke(&req).await?;
        resp.take(&query)?.into_arguments("Email/query")?;
        let mut messages = resp
            .take(&get)?
            .parse::<GetResponse<MessageSummary>>("Email/get")?
            .list;

        messages.retain(|m| m.received_at.is_none_or(|t| t >= cutoff));
        Ok(messages)
    }

    pub async fn scan(
        &self,
        days: u32,
        now: DateTime<Utc>,
        key: SenderKey,
    ) -> Result<Vec<SenderGroup>, BulkError> {
        let messages = self.recent_bulk_messages(scan_cutoff(now, days)?).await?;
        log::debug!("scan: {} messages in the last {days} days", messages.len());
        Ok(group_by_sender(messages, key))
    }

    async fn messages_outside_bulk(&self, sender: &str) -> Result<Vec<MessageSummary>, BulkError> {
        let mut req = Request::new(USING_MAIL);
        let query = req.call(
            "Email/query",
            json!({
                "accountId": self.account_id(),
                "filter": {
                    "from": sender,
                    "notInMailbox": self.bulk_mailbox_id()?,
                },
            }),
        );
        let get = req.call(
            "Email/get",
            json!({
                "accountId": self.account_id(),
                "#ids": query.result_reference("/ids"),
                "properties": ["id", "mailboxIds"],
            }),
        );

        let mut resp = self.transport.invoke(&req).await?;
        resp.take(&query)?.into_arguments("Email/query")?;
        resp.take(&get)?
            .parse::<GetResponse<MessageSummary>>("Email/get")
            .map(|r| r.list)
    }

    /// Move every message from `sender` into the bulk mailbox, dropping all
    /// other memberships. Per-message failures are counted, not raised.
    pub async fn move_from_sender(&self, sender: &str) -> Result<MoveOutcome, BulkError> {
        let bulk_id = self.bulk_mailbox_id()?.to_string();
        let messages = self.messages_outside_bulk(sender).await?;
        if messages.is_empty() {
            log::info!("move {sender}: no messages outside the bulk mailbox");
            return Ok(MoveOutcome::default());
        }

        let update: serde_json::Map<String, Value> = messages
            .iter()
            .map(|m| {
                log::debug!(
                    "move {}: leaving {:?}",
                    m.id,
                    m.mailbox_ids.keys().collect::<Vec<_>>()
                );
                (m.id.clone(), json!({ "mailboxIds": { bulk_id.as_str(): true } }))
            })
            .collect();

        let mut req = Request::new(USING_MAIL);
        let set = req.call(
            "Email/set",
            json!({
                "accountId": self.account_id(),
                "update": update,
            }),
        );

        let mut resp = self.transport.invoke(&req).await?;
        let result = resp.take(&set)?.parse::<SetResponse>("Email/set")?;

        if let Some(errors) = result.not_updated.as_ref().filter(|e| !e.is_empty()) {
            for (id, err) in errors {
                log::warn!("could not move {id}: {err}");
            }
        }

        let outcome = MoveOutcome {
            moved: result.updated_count(),
            failed: result.not_updated_count(),
        };
        log::info!(
            "move {sender}: {} moved, {} failed",
            outcome.moved,
            outcome.failed
        );
        Ok(outcome)
    }

    async fn sieve_scripts(&self) -> Result<Vec<SieveScript>, BulkError> {
        let mut req = Request::new(USING_SIEVE);
        let get = req.call("SieveScript/get", json!({ "accountId": self.account_id() }));

        let mut resp = self.transport.invoke(&req).await?;
        resp.take(&get)?
            .parse::<GetResponse<SieveScript>>("SieveScript/get")
            .map(|r| r.list)
    }

    async fn script_source(&self, script: &SieveScript) -> Result<Option<String>, BulkError> {
        let Some(blob_id) = script.blob_id.as_deref() else {
            return Ok(None);
        };
        let name = script.name.as_deref().unwrap_or(sieve::DEFAULT_SCRIPT_NAME);
        let url = self
            .session
            .download_url_for(blob_id, name, sieve::CONTENT_TYPE)
            .ok_or_else(|| BulkError::Rule("session has no download URL".to_string()))?;
        self.transport.download_text(&url).await.map(Some)
    }

    async fn upload_script(&self, source: String) -> Result<String, BulkError> {
        let url = self
            .session
            .upload_url_for()
            .ok_or_else(|| BulkError::Rule("session has no upload URL".to_string()))?;
        self.transport.upload(&url, sieve::CONTENT_TYPE, source).await
    }

    /// Append a rule filing `sender` into the bulk mailbox to the active
    /// filter script, creating and activating a script when none is active.
    pub async fn create_rule(&self, sender: &str) -> Result<RuleOutcome, BulkError> {
        if !self.session.has_capability(CAP_SIEVE) {
            return Err(BulkError::rules_unavailable());
        }

        self.write_rule(sender).await.map_err(|e| {
            if sieve_unavailable(&e) {
                log::warn!("filter scripts unavailable: {e}");
                BulkError::rules_unavailable()
            } else {
                e
            }
        })
    }

    async fn write_rule(&self, sender: &str) -> Result<RuleOutcome, BulkError> {
        let scripts = self.sieve_scripts().await?;
        let active = scripts.into_iter().find(|s| s.is_active);

        let existing = match active.as_ref() {
            Some(s) => self.script_source(s).await?,
            None => None,
        };
        let source = sieve::append_rule(existing.as_deref(), sender, sieve::DEFAULT_FOLDER);
        let blob_id = self.upload_script(source).await?;

        let mut req = Request::new(USING_SIEVE);
        let args = match active.as_ref() {
            Some(s) => json!({
                "accountId": self.account_id(),
                "update": { s.id.as_str(): { "blobId": blob_id } },
            }),
            None => json!({
                "accountId": self.account_id(),
                "create": {
                    CREATE_ID: {
                        "name": sieve::DEFAULT_SCRIPT_NAME,
                        "blobId": blob_id,
                    }
                },
                "onSuccessActivateScript": format!("#{CREATE_ID}"),
            }),
        };
        let set = req.call("SieveScript/set", args);

        let mut resp = self.transport.invoke(&req).await?;
        let result = resp.take(&set)?.parse::<SetResponse>("SieveScript/set")?;

        let outcome = match active {
            Some(s) if result.updated.as_ref().is_some_and(|u| u.contains_key(&s.id)) => {
                RuleOutcome {
                    sender: sender.to_string(),
                    script_name: s.name.unwrap_or_default(),
                    script_id: s.id,
                    created: false,
                }
            }
            None => {
                let id = result
                    .created
                    .as_ref()
                    .and_then(|c| c.get(CREATE_ID))
                    .and_then(|c| c.get("id"))
                    .and_then(|id| id.as_str())
                    .map(str::to_string);
                match id {
                    Some(script_id) => RuleOutcome {
                        sender: sender.to_string(),
                        script_id,
                        script_name: sieve::DEFAULT_SCRIPT_NAME.to_string(),
                        created: true,
                    },
                    None => return Err(rule_rejected(&result)),
                }
            }
            Some(_) => return Err(rule_rejected(&result)),
        };

        log::info!(
            "rule for {sender} written to script {} ({})",
            outcome.script_id,
            if outcome.created { "created" } else { "updated" }
        );
        Ok(outcome)
    }
}

fn rule_rejected(result: &SetResponse) -> BulkError {
    let detail = result
        .not_created
        .as_ref()
        .or(result.not_updated.as_ref())
        .map(|d| serde_json::to_string(d).unwrap_or_default())
        .unwrap_or_else(|| "no result".to_string());
    BulkError::Rule(format!("Failed to create rule: {detail}"))
}
