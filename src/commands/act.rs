use std::io::{BufRead, IsTerminal, Write};

use serde_json::Value;

use super::Ctx;
use crate::actions::{ActionKind, PendingAction};
use crate::backend::Backend;
use crate::cli::SendersArgs;
use crate::error::BulkError;
use crate::output::{Envelope, Meta};

fn ask(prompt: &str) -> Result<bool, BulkError> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{prompt} [y/N] ")
        .and_then(|_| stderr.flush())
        .map_err(|e| BulkError::Usage(format!("prompt failed: {e}")))?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| BulkError::Usage(format!("prompt failed: {e}")))?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn confirm(ctx: &Ctx<'_>, action: &PendingAction) -> Result<(), BulkError> {
    if ctx.cli.force {
        return Ok(());
    }
    if ctx.cli.no_input || !std::io::stdin().is_terminal() {
        return Err(BulkError::Usage(format!(
            "{} needs confirmation; pass --force (or --preview to see what would happen)",
            action.kind_name()
        )));
    }
    if ask(&action.confirmation_prompt())? {
        Ok(())
    } else {
        Err(BulkError::Usage("action canceled".to_string()))
    }
}

fn to_value(report: &impl serde::Serialize) -> Result<Value, BulkError> {
    serde_json::to_value(report)
        .map_err(|e| BulkError::transport(format!("report serialization failed: {e}")))
}

/// `move` and `rule`: preview, or confirm then run against the server.
pub async fn run(ctx: &Ctx<'_>, kind: ActionKind, args: &SendersArgs) -> Envelope<Value> {
    let command_name = match kind {
        ActionKind::Move => "move",
        ActionKind::Rule => "rule",
    };

    let action = match PendingAction::new(kind, args.senders.clone()) {
        Ok(a) => a,
        Err(e) => return Envelope::err(command_name, ctx.account(), e),
    };

    if ctx.cli.preview {
        log::debug!("preview {}: no server contact", action.kind_name());
        return match to_value(&action.preview()) {
            Ok(v) => Envelope::ok(command_name, ctx.account(), v, Meta::requests(0)),
            Err(e) => Envelope::err(command_name, ctx.account(), e),
        };
    }

    if let Err(e) = confirm(ctx, &action) {
        return Envelope::err(command_name, ctx.account(), e);
    }

    let resolved = match ctx.resolve(None) {
        Ok(r) => r,
        Err(e) => return Envelope::err(command_name, ctx.account(), e),
    };
    let account = resolved.account.clone().or_else(|| ctx.account());

    let backend = match Backend::open(&resolved.config, &ctx.toolkit).await {
        Ok(b) => b,
        Err(e) => return Envelope::err(command_name, account, e),
    };

    let report = match action.execute(&backend).await {
        Ok(r) => r,
        Err(e) => return Envelope::err(command_name, account, e),
    };
    log::info!("{}: {}", action.kind_name(), report.status.message);

    match to_value(&report) {
        Ok(v) => Envelope::ok(
            command_name,
            account,
            v,
            Meta::requests(backend.transport().calls()),
        ),
        Err(e) => Envelope::err(command_name, account, e),
    }
}
