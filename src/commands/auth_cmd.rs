use std::path::PathBuf;

use serde_json::{Value, json};

use crate::app_config;
use crate::cli::AuthSetPasswordArgs;
use crate::error::BulkError;
use crate::output::{Envelope, Meta};

fn default_pass_file_for_account(account: &str) -> Result<PathBuf, BulkError> {
    Ok(app_config::default_secrets_dir()?.join(format!("{account}.pass")))
}

pub fn set_password(cli_account: Option<&str>, args: &AuthSetPasswordArgs) -> Envelope<Value> {
    let command_name = "auth.set_password";

    if args.password.trim().is_empty() {
        return Envelope::err(
            command_name,
            None,
            BulkError::Usage("password must not be empty".to_string()),
        );
    }

    let (mut cfg, _path, _created) = match app_config::ensure_minimal_fastmail_config() {
        Ok(v) => v,
        Err(e) => return Envelope::err(command_name, None, e),
    };

    let account = cli_account
        .map(str::to_string)
        .or_else(|| cfg.defaults.account.clone())
        .unwrap_or_else(|| app_config::DEFAULT_ACCOUNT.to_string());

    let Some(acct) = cfg.accounts.get_mut(&account) else {
        return Envelope::err(
            command_name,
            Some(account.clone()),
            BulkError::Usage(format!(
                "unknown account '{account}'; run `bulkman config init` and edit config first"
            )),
        );
    };

    let pass_file = match acct.pass_file.as_deref() {
        Some(s) => app_config::expand_user_path(s),
        None => default_pass_file_for_account(&account),
    };
    let pass_file = match pass_file {
        Ok(p) => p,
        Err(e) => return Envelope::err(command_name, Some(account), e),
    };

    if let Err(e) = app_config::write_secret_file(&pass_file, &args.password) {
        return Envelope::err(command_name, Some(account), e);
    }

    acct.pass = None;
    acct.pass_env = None;
    acct.pass_file = Some(pass_file.to_string_lossy().to_string());
    if let Some(user) = args.user.as_ref().filter(|u| !u.trim().is_empty()) {
        acct.user = Some(user.trim().to_string());
    }

    if cfg.defaults.account.is_none() {
        cfg.defaults.account = Some(account.clone());
    }

    let config_path = match app_config::write_config(&cfg) {
        Ok(p) => p,
        Err(e) => return Envelope::err(command_name, Some(account), e),
    };

    Envelope::ok(
        command_name,
        Some(account.clone()),
        json!({
            "account": account,
            "configPath": config_path.to_string_lossy(),
            "passFile": pass_file.to_string_lossy(),
        }),
        Meta::default(),
    )
}
