use std::fs;

use serde_json::{Value, json};

use crate::app_config::{self, FASTMAIL_SESSION_URL};
use crate::error::BulkError;
use crate::session::Credentials;
use crate::sieve::DEFAULT_FOLDER;

pub const DEFAULT_DAYS: u32 = 7;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Session URL; GET here returns the JMAP session document.
    pub server_url: String,
    pub credentials: Credentials,
    pub folder: String,
    pub days: u32,
}

impl RuntimeConfig {
    /// Settings without secrets.
    pub fn redacted(&self) -> Value {
        json!({
            "serverUrl": self.server_url,
            "user": self.credentials.user,
            "folder": self.folder,
            "days": self.days,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedRuntimeConfig {
    pub config: RuntimeConfig,
    pub account: Option<String>,
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub account: Option<String>,
    pub folder: Option<String>,
    pub days: Option<u32>,
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_text_file_trimmed(path: &str, what: &str) -> Result<String, BulkError> {
    let p = app_config::expand_user_path(path)?;
    let text = fs::read_to_string(&p)
        .map_err(|e| BulkError::Config(format!("failed to read {what} file: {e}")))?;
    Ok(text.trim().to_string())
}

fn parse_days(raw: &str, source: &str) -> Result<u32, BulkError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| BulkError::Config(format!("{source} must be a whole number of days, got {raw:?}")))
}

fn validate_server_url(raw: &str) -> Result<String, BulkError> {
    let u = url::Url::parse(raw.trim())
        .map_err(|e| BulkError::Config(format!("invalid server url: {e}")))?;
    match u.scheme() {
        "http" | "https" => Ok(raw.trim().to_string()),
        other => Err(BulkError::Config(format!(
            "invalid server url: unsupported scheme {other}"
        ))),
    }
}

fn pass_from_env() -> Result<Option<String>, BulkError> {
    match (env_nonempty("BULKMAN_PASS"), env_nonempty("BULKMAN_PASS_FILE")) {
        (Some(_), Some(_)) => Err(BulkError::Config(
            "both BULKMAN_PASS and BULKMAN_PASS_FILE are set; choose one".to_string(),
        )),
        (Some(p), None) => Ok(Some(p)),
        (None, Some(path)) => read_text_file_trimmed(&path, "password").map(Some),
        (None, None) => Ok(None),
    }
}

fn pass_from_account(acct: &app_config::AccountConfig) -> Result<Option<String>, BulkError> {
    if let Some(p) = acct.pass.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        return Ok(Some(p.to_string()));
    }
    if let Some(v) = acct.pass_env.as_deref().and_then(env_nonempty) {
        return Ok(Some(v));
    }
    match acct.pass_file.as_deref() {
        Some(path) => read_text_file_trimmed(path, "password").map(Some),
        None => Ok(None),
    }
}

fn select_account(
    cfg: &app_config::AppConfig,
    selected: Option<&str>,
) -> Result<Option<String>, BulkError> {
    if let Some(a) = selected {
        return Ok(Some(a.to_string()));
    }
    if let Some(a) = &cfg.defaults.account {
        return Ok(Some(a.clone()));
    }
    let mut names = cfg.accounts.keys();
    match (names.next(), names.next()) {
        (None, _) => Ok(None),
        (Some(only), None) => Ok(Some(only.clone())),
        (Some(_), Some(_)) => Err(BulkError::Config(
            "missing --account and no default account is set; run `bulkman config set-default <name>`"
                .to_string(),
        )),
    }
}

/// Field-by-field precedence: command line, then environment, then the
/// selected config account, then built-in defaults.
pub fn resolve_runtime_config(overrides: &Overrides) -> Result<ResolvedRuntimeConfig, BulkError> {
    let env_pass = pass_from_env()?;
    let cfg = app_config::load_config()?.map(|(cfg, _)| cfg);

    let (account, acct) = match cfg.as_ref() {
        Some(cfg) => {
            let name = select_account(cfg, overrides.account.as_deref())?;
            let acct = match name.as_deref() {
                Some(n) => Some(cfg.accounts.get(n).cloned().ok_or_else(|| {
                    BulkError::Config(format!("unknown account '{n}' in config"))
                })?),
                None => None,
            };
            (name, acct)
        }
        None => (overrides.account.clone(), None),
    };

    let server_url = env_nonempty("BULKMAN_SERVER_URL")
        .or_else(|| acct.as_ref().and_then(|a| a.server_url.clone()))
        .unwrap_or_else(|| FASTMAIL_SESSION_URL.to_string());
    let server_url = validate_server_url(&server_url)?;

    let user = env_nonempty("BULKMAN_USER")
        .or_else(|| acct.as_ref().and_then(|a| a.user.clone()))
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| {
            BulkError::Config(
                "missing user; set BULKMAN_USER or `user` in the account config".to_string(),
            )
        })?;

    let pass = match env_pass {
        Some(p) => p,
        None => acct
            .as_ref()
            .map(pass_from_account)
            .transpose()?
            .flatten()
            .ok_or_else(|| {
                BulkError::Config(
                    "missing password; set BULKMAN_PASS or run `bulkman auth set-password`"
                        .to_string(),
                )
            })?,
    };

    let folder = overrides
        .folder
        .clone()
        .or_else(|| env_nonempty("BULKMAN_FOLDER"))
        .or_else(|| acct.as_ref().and_then(|a| a.folder.clone()))
        .unwrap_or_else(|| DEFAULT_FOLDER.to_string());

    let days = match (overrides.days, env_nonempty("BULKMAN_DAYS")) {
        (Some(d), _) => d,
        (None, Some(raw)) => parse_days(&raw, "BULKMAN_DAYS")?,
        (None, None) => acct.as_ref().and_then(|a| a.days).unwrap_or(DEFAULT_DAYS),
    };

    log::debug!("resolved config: account={account:?} server={server_url} folder={folder} days={days}");

    Ok(ResolvedRuntimeConfig {
        config: RuntimeConfig {
            server_url,
            credentials: Credentials {
                user: user.trim().to_string(),
                pass,
            },
            folder,
            days,
        },
        account,
    })
}
