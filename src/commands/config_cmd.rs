use serde_json::{Value, json};

use super::Ctx;
use crate::app_config;
use crate::cli::{ConfigSetDefaultArgs, ConfigShowArgs};
use crate::error::BulkError;
use crate::output::{Envelope, Meta};

fn sanitize_config(mut cfg: app_config::AppConfig) -> app_config::AppConfig {
    for acct in cfg.accounts.values_mut() {
        acct.pass = None;
    }
    cfg
}

pub fn init() -> Envelope<Value> {
    let command_name = "config.init";

    let (cfg, path, created) = match app_config::ensure_minimal_fastmail_config() {
        Ok(v) => v,
        Err(e) => return Envelope::err(command_name, None, e),
    };

    Envelope::ok(
        command_name,
        None,
        json!({
            "path": path.to_string_lossy(),
            "created": created,
            "defaults": {"account": cfg.defaults.account},
            "accounts": cfg.accounts.keys().collect::<Vec<_>>(),
        }),
        Meta::default(),
    )
}

pub fn set_default(args: &ConfigSetDefaultArgs) -> Envelope<Value> {
    let command_name = "config.set_default";

    let (mut cfg, _path) = match app_config::read_config() {
        Ok(v) => v,
        Err(e) => return Envelope::err(command_name, None, e),
    };

    if !cfg.accounts.contains_key(&args.account) {
        return Envelope::err(
            command_name,
            None,
            BulkError::Usage(format!("unknown account '{}'", args.account)),
        );
    }

    cfg.defaults.account = Some(args.account.clone());

    let path = match app_config::write_config(&cfg) {
        Ok(p) => p,
        Err(e) => return Envelope::err(command_name, None, e),
    };

    Envelope::ok(
        command_name,
        None,
        json!({
            "path": path.to_string_lossy(),
            "defaultAccount": cfg.defaults.account,
        }),
        Meta::default(),
    )
}

pub fn show(ctx: &Ctx<'_>, args: &ConfigShowArgs) -> Envelope<Value> {
    let command_name = "config.show";

    if args.effective {
        let resolved = match ctx.resolve(None) {
            Ok(r) => r,
            Err(e) => return Envelope::err(command_name, ctx.account(), e),
        };

        return Envelope::ok(
            command_name,
            resolved.account.clone(),
            json!({
                "selectedAccount": resolved.account,
                "runtime": resolved.config.redacted(),
            }),
            Meta::default(),
        );
    }

    let (cfg, path) = match app_config::read_config() {
        Ok(v) => v,
        Err(e) => return Envelope::err(command_name, None, e),
    };

    Envelope::ok(
        command_name,
        None,
        json!({
            "path": path.to_string_lossy(),
            "config": sanitize_config(cfg),
        }),
        Meta::default(),
    )
}
