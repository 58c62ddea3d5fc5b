use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::BulkError;

pub const DEFAULT_ACCOUNT: &str = "fastmail";
pub const FASTMAIL_SESSION_URL: &str = "https://api.fastmail.com/jmap/session";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub account: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    /// JMAP session URL, fetched as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,

    /// Name of an environment variable holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_file: Option<String>,

    /// Bulk folder name used when no mailbox has the junk role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
}

fn home_dir() -> Result<PathBuf, BulkError> {
    let home = std::env::var("HOME")
        .map_err(|_| BulkError::Config("missing HOME environment variable".to_string()))?;
    Ok(PathBuf::from(home))
}

pub fn default_config_path() -> Result<PathBuf, BulkError> {
    if let Ok(p) = std::env::var("BULKMAN_CONFIG_PATH") {
        return Ok(PathBuf::from(p));
    }

    let base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(x) if !x.is_empty() => PathBuf::from(x),
        _ => home_dir()?.join(".config"),
    };
    Ok(base.join("bulkman/config.json"))
}

pub fn default_secrets_dir() -> Result<PathBuf, BulkError> {
    let cfg_path = default_config_path()?;
    Ok(cfg_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("secrets"))
}

pub fn expand_user_path(s: &str) -> Result<PathBuf, BulkError> {
    if let Some(rest) = s.strip_prefix("~/") {
        Ok(home_dir()?.join(rest))
    } else {
        Ok(PathBuf::from(s))
    }
}

pub fn read_config() -> Result<(AppConfig, PathBuf), BulkError> {
    let path = default_config_path()?;
    load_config()?.ok_or_else(|| {
        BulkError::Config(format!(
            "config {} does not exist; run `bulkman config init`",
            path.display()
        ))
    })
}

/// `None` only when the config file does not exist; unreadable or invalid
/// files are errors.
pub fn load_config() -> Result<Option<(AppConfig, PathBuf)>, BulkError> {
    let path = default_config_path()?;
    let text = match fs::read_to_string(&path) {
        Ok(t) => t,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(BulkError::Config(format!(
                "failed to read config {}: {e}",
                path.display()
            )));
        }
    };
    let cfg: AppConfig = serde_json::from_str(&text).map_err(|e| {
        BulkError::Config(format!("invalid config json in {}: {e}", path.display()))
    })?;
    Ok(Some((cfg, path)))
}

#[cfg(unix)]
fn restrict(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        log::warn!("could not restrict permissions on {}: {e}", path.display());
    }
}

#[cfg(not(unix))]
fn restrict(_path: &Path, _mode: u32) {}

#[cfg(unix)]
fn create_private(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> io::Result<fs::File> {
    fs::File::create(path)
}

/// Write via a temp file and rename; parent is 0700, file is 0600.
fn write_private(path: &Path, contents: &str, what: &str) -> Result<(), BulkError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| BulkError::Config(format!("{what} mkdir failed: {e}")))?;
        restrict(parent, 0o700);
    }

    let tmp = path.with_extension("tmp");
    create_private(&tmp)
        .and_then(|mut f| f.write_all(contents.as_bytes()))
        .map_err(|e| BulkError::Config(format!("{what} write failed: {e}")))?;
    restrict(&tmp, 0o600);
    fs::rename(&tmp, path).map_err(|e| BulkError::Config(format!("{what} rename failed: {e}")))?;
    Ok(())
}

pub fn write_config(cfg: &AppConfig) -> Result<PathBuf, BulkError> {
    let path = default_config_path()?;
    let text = serde_json::to_string_pretty(cfg)
        .map_err(|e| BulkError::Config(format!("config serialize failed: {e}")))?;
    write_private(&path, &format!("{text}\n"), "config")?;
    Ok(path)
}

pub fn write_secret_file(path: &Path, secret: &str) -> Result<(), BulkError> {
    write_private(path, &format!("{}\n", secret.trim()), "secret")
}

/// Return the existing config, or write one with a single Fastmail account.
pub fn ensure_minimal_fastmail_config() -> Result<(AppConfig, PathBuf, bool), BulkError> {
    if let Some((cfg, path)) = load_config()? {
        return Ok((cfg, path, false));
    }

    let mut cfg = AppConfig::default();
    cfg.defaults.account = Some(DEFAULT_ACCOUNT.to_string());
    cfg.accounts.insert(
        DEFAULT_ACCOUNT.to_string(),
        AccountConfig {
            server_url: Some(FASTMAIL_SESSION_URL.to_string()),
            ..Default::default()
        },
    );

    let path = write_config(&cfg)?;
    log::info!("wrote initial config to {}", path.display());
    Ok((cfg, path, true))
}
