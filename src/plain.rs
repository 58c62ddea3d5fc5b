use serde_json::Value;

use crate::output::Envelope;

fn sanitize_field(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn tsv(fields: &[String]) -> String {
    fields.join("\t")
}

fn get_str<'a>(v: &'a Value, ptr: &str) -> &'a str {
    v.pointer(ptr).and_then(|x| x.as_str()).unwrap_or("")
}

fn get_u64(v: &Value, ptr: &str) -> u64 {
    v.pointer(ptr).and_then(|x| x.as_u64()).unwrap_or(0)
}

fn plain_err(env: &Envelope<Value>) -> String {
    let (kind, msg) = env
        .error
        .as_ref()
        .map(|e| (e.kind.as_str(), e.message.as_str()))
        .unwrap_or(("error", ""));

    tsv(&[
        "ERR".to_string(),
        env.command.clone(),
        kind.to_string(),
        sanitize_field(msg),
    ])
}

fn plain_ok_fallback(env: &Envelope<Value>) -> String {
    tsv(&["OK".to_string(), env.command.clone()])
}

fn render_mailboxes(data: &Value) -> Option<String> {
    let mbs = data.pointer("/mailboxes")?.as_array()?;
    let lines: Vec<String> = mbs
        .iter()
        .map(|m| {
            tsv(&[
                get_str(m, "/id").to_string(),
                get_str(m, "/role").to_string(),
                sanitize_field(get_str(m, "/name")),
            ])
        })
        .collect();
    Some(lines.join("\n"))
}

fn render_scan(data: &Value) -> Option<String> {
    let senders = data.pointer("/senders")?.as_array()?;
    let lines: Vec<String> = senders
        .iter()
        .map(|g| {
            let subjects: Vec<String> = g
                .pointer("/messages")
                .and_then(|x| x.as_array())
                .map(|ms| {
                    ms.iter()
                        .take(3)
                        .map(|m| truncate(&sanitize_field(get_str(m, "/subject")), 60))
                        .collect()
                })
                .unwrap_or_default();
            tsv(&[
                get_u64(g, "/count").to_string(),
                get_str(g, "/email").to_string(),
                sanitize_field(get_str(g, "/name")),
                subjects.join(" • "),
            ])
        })
        .collect();
    Some(lines.join("\n"))
}

fn render_messages(data: &Value) -> Option<String> {
    let ms = data.pointer("/messages")?.as_array()?;
    let lines: Vec<String> = ms
        .iter()
        .map(|m| {
            tsv(&[
                get_str(m, "/receivedAt").to_string(),
                get_str(m, "/id").to_string(),
                truncate(&sanitize_field(get_str(m, "/subject")), 120),
            ])
        })
        .collect();
    Some(lines.join("\n"))
}

fn render_action(data: &Value) -> Option<String> {
    let status = data.pointer("/status")?;
    let mut lines = vec![tsv(&[
        get_str(status, "/severity").to_uppercase(),
        sanitize_field(get_str(status, "/message")),
    ])];

    for r in data.pointer("/results").and_then(|x| x.as_array())? {
        let sender = get_str(r, "/sender").to_string();
        let line = if r.pointer("/ok").and_then(|x| x.as_bool()) != Some(true) {
            tsv(&[
                sender,
                "failed".to_string(),
                sanitize_field(get_str(r, "/error/message")),
            ])
        } else if let Some(rule) = r.pointer("/rule") {
            let verb = if rule.pointer("/created").and_then(|x| x.as_bool()) == Some(true) {
                "created"
            } else {
                "updated"
            };
            tsv(&[
                sender,
                format!("rule {verb}"),
                get_str(rule, "/scriptId").to_string(),
            ])
        } else {
            tsv(&[
                sender,
                format!("moved={}", get_u64(r, "/moved")),
                format!("failed={}", get_u64(r, "/failed")),
            ])
        };
        lines.push(line);
    }
    Some(lines.join("\n"))
}

fn render_connect(data: &Value) -> Option<String> {
    let session = data.pointer("/session")?;
    Some(tsv(&[
        get_str(session, "/accountId").to_string(),
        get_str(session, "/username").to_string(),
        get_str(data, "/bulkMailbox/id").to_string(),
        sanitize_field(get_str(data, "/bulkMailbox/name")),
    ]))
}

pub fn render(env: &Envelope<Value>) -> String {
    if !env.ok {
        return plain_err(env);
    }
    let Some(data) = env.data.as_ref() else {
        return plain_ok_fallback(env);
    };

    let rendered = match env.command.as_str() {
        "connect" => render_connect(data),
        "mailboxes" => render_mailboxes(data),
        "scan" => render_scan(data),
        "messages" => render_messages(data),
        "move" | "rule" => render_action(data),
        _ => None,
    };
    rendered.unwrap_or_else(|| plain_ok_fallback(env))
}
