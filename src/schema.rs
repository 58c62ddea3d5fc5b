use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};

use crate::senders::SenderGroup;
use crate::types::{Mailbox, MessageSummary};

fn rfc3339(t: Option<DateTime<Utc>>) -> Option<String> {
    t.map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

pub fn mailbox_item(m: &Mailbox) -> Value {
    json!({
        "id": m.id,
        "name": m.name,
        "parentId": m.parent_id,
        "role": m.role,
    })
}

pub fn message_item(m: &MessageSummary) -> Value {
    json!({
        "id": m.id,
        "subject": m.subject,
        "receivedAt": rfc3339(m.received_at),
    })
}

pub fn message_items(messages: &[MessageSummary]) -> Vec<Value> {
    messages.iter().map(message_item).collect()
}

pub fn group_item(g: &SenderGroup) -> Value {
    json!({
        "email": g.email,
        "name": g.name,
        "count": g.count(),
        "messages": message_items(&g.messages),
    })
}

pub fn scan_result(
    bulk_mailbox: &Mailbox,
    days: u32,
    cutoff: DateTime<Utc>,
    groups: &[SenderGroup],
) -> Value {
    json!({
        "bulkMailbox": mailbox_item(bulk_mailbox),
        "days": days,
        "cutoff": rfc3339(Some(cutoff)),
        "totalMessages": groups.iter().map(SenderGroup::count).sum::<usize>(),
        "senders": groups.iter().map(group_item).collect::<Vec<_>>(),
    })
}
