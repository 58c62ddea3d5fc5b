use chrono::Utc;
use serde_json::{Value, json};

use super::Ctx;
use crate::backend::{Backend, scan_cutoff};
use crate::cli::{MessagesArgs, ScanArgs};
use crate::error::BulkError;
use crate::output::{Envelope, Meta};
use crate::schema;
use crate::senders::SenderKey;
use crate::toolkit::Toolkit;

fn sender_key(args: &ScanArgs) -> SenderKey {
    if args.fold_case {
        SenderKey::FoldCase
    } else {
        SenderKey::Exact
    }
}

pub async fn connect(ctx: &Ctx<'_>) -> Envelope<Value> {
    let command_name = "connect";

    let resolved = match ctx.resolve(None) {
        Ok(r) => r,
        Err(e) => return Envelope::err(command_name, ctx.account(), e),
    };
    let account = resolved.account.clone().or_else(|| ctx.account());

    let backend = match Backend::open(&resolved.config, &ctx.toolkit).await {
        Ok(b) => b,
        Err(e) => return Envelope::err(command_name, account, e),
    };

    Envelope::ok(
        command_name,
        account,
        json!({
            "session": backend.session(),
            "bulkMailbox": backend.bulk_mailbox().map(schema::mailbox_item),
            "toolkit": {
                "version": Toolkit::VERSION,
                "tools": ctx.toolkit.tools(),
            },
        }),
        Meta::requests(backend.transport().calls()),
    )
}

pub async fn mailboxes(ctx: &Ctx<'_>) -> Envelope<Value> {
    let command_name = "mailboxes";

    let resolved = match ctx.resolve(None) {
        Ok(r) => r,
        Err(e) => return Envelope::err(command_name, ctx.account(), e),
    };
    let account = resolved.account.clone().or_else(|| ctx.account());

    let backend = match Backend::connect(&resolved.config, &ctx.toolkit).await {
        Ok(b) => b,
        Err(e) => return Envelope::err(command_name, account, e),
    };

    let mailboxes = match backend.list_mailboxes().await {
        Ok(m) => m,
        Err(e) => return Envelope::err(command_name, account, e),
    };

    Envelope::ok(
        command_name,
        account,
        json!({
            "mailboxes": mailboxes.iter().map(schema::mailbox_item).collect::<Vec<_>>(),
        }),
        Meta::requests(backend.transport().calls()),
    )
}

pub async fn scan(ctx: &Ctx<'_>, args: &ScanArgs) -> Envelope<Value> {
    let command_name = "scan";

    let resolved = match ctx.resolve(args.days) {
        Ok(r) => r,
        Err(e) => return Envelope::err(command_name, ctx.account(), e),
    };
    let account = resolved.account.clone().or_else(|| ctx.account());
    let days = resolved.config.days;

    let now = Utc::now();
    let cutoff = match scan_cutoff(now, days) {
        Ok(c) => c,
        Err(e) => return Envelope::err(command_name, account, e),
    };

    let backend = match Backend::open(&resolved.config, &ctx.toolkit).await {
        Ok(b) => b,
        Err(e) => return Envelope::err(command_name, account, e),
    };

    let groups = match backend.scan(days, now, sender_key(args)).await {
        Ok(g) => g,
        Err(e) => return Envelope::err(command_name, account, e),
    };

    let Some(bulk) = backend.bulk_mailbox() else {
        return Envelope::err(
            command_name,
            account,
            BulkError::NotFound("bulk mailbox has not been resolved".to_string()),
        );
    };

    let mut meta = Meta::requests(backend.transport().calls());
    if let Some(anon) = groups.iter().find(|g| g.email.is_empty()) {
        meta.warnings = Some(vec![format!(
            "{} messages have no sender address",
            anon.count()
        )]);
    }

    Envelope::ok(
        command_name,
        account,
        schema::scan_result(bulk, days, cutoff, &groups),
        meta,
    )
}

/// Scanned messages from a single sender, newest first.
pub async fn messages(ctx: &Ctx<'_>, args: &MessagesArgs) -> Envelope<Value> {
    let command_name = "messages";

    let resolved = match ctx.resolve(args.scan.days) {
        Ok(r) => r,
        Err(e) => return Envelope::err(command_name, ctx.account(), e),
    };
    let account = resolved.account.clone().or_else(|| ctx.account());
    let days = resolved.config.days;

    let backend = match Backend::open(&resolved.config, &ctx.toolkit).await {
        Ok(b) => b,
        Err(e) => return Envelope::err(command_name, account, e),
    };

    let key = sender_key(&args.scan);
    let groups = match backend.scan(days, Utc::now(), key).await {
        Ok(g) => g,
        Err(e) => return Envelope::err(command_name, account, e),
    };

    let wanted = key.key(args.sender.trim());
    let group = groups.into_iter().find(|g| g.email == wanted);
    let items = group
        .as_ref()
        .map(|g| schema::message_items(&g.messages))
        .unwrap_or_default();

    Envelope::ok(
        command_name,
        account,
        json!({
            "sender": wanted,
            "name": group.as_ref().map(|g| g.name.as_str()),
            "days": days,
            "count": items.len(),
            "messages": items,
        }),
        Meta::requests(backend.transport().calls()),
    )
}
