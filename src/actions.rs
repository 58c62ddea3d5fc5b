use serde::Serialize;

use crate::backend::{Backend, MoveOutcome, RuleOutcome};
use crate::error::{BulkError, ErrorOut};
use crate::output::{Severity, Status};

/// What happens to a sender once the user confirms.
#[allow(async_fn_in_trait)]
pub trait SenderActions {
    async fn move_from_sender(&self, sender: &str) -> Result<MoveOutcome, BulkError>;
    async fn create_rule(&self, sender: &str) -> Result<RuleOutcome, BulkError>;
}

impl SenderActions for Backend {
    async fn move_from_sender(&self, sender: &str) -> Result<MoveOutcome, BulkError> {
        Backend::move_from_sender(self, sender).await
    }

    async fn create_rule(&self, sender: &str) -> Result<RuleOutcome, BulkError> {
        Backend::create_rule(self, sender).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Move,
    Rule,
}

/// A requested action waiting for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    Move(String),
    Rule(String),
    BulkMove(Vec<String>),
    BulkRule(Vec<String>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetResult {
    pub sender: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moved: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<RuleOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorOut>,
}

impl TargetResult {
    fn moved(sender: &str, o: MoveOutcome) -> Self {
        Self {
            sender: sender.to_string(),
            ok: true,
            moved: Some(o.moved),
            failed: Some(o.failed),
            rule: None,
            error: None,
        }
    }

    fn rule(sender: &str, o: RuleOutcome) -> Self {
        Self {
            sender: sender.to_string(),
            ok: true,
            moved: None,
            failed: None,
            rule: Some(o),
            error: None,
        }
    }

    fn failed(sender: &str, e: &BulkError) -> Self {
        Self {
            sender: sender.to_string(),
            ok: false,
            moved: None,
            failed: None,
            rule: None,
            error: Some(ErrorOut::from(e)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport {
    pub action: &'static str,
    pub preview: bool,
    pub targets: Vec<String>,
    pub status: Status,
    pub results: Vec<TargetResult>,
}

fn valid_sender(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(|c| c.is_whitespace() || c.is_control())
}

impl PendingAction {
    /// One sender is a single action, several a bulk one. Duplicates are dropped.
    pub fn new(kind: ActionKind, senders: Vec<String>) -> Result<Self, BulkError> {
        let mut targets: Vec<String> = Vec::with_capacity(senders.len());
        for s in senders {
            let s = s.trim().to_string();
            if !valid_sender(&s) {
                return Err(BulkError::Usage(format!("invalid sender address: {s:?}")));
            }
            if !targets.contains(&s) {
                targets.push(s);
            }
        }

        let mut it = targets.clone().into_iter();
        match (it.next(), it.next(), kind) {
            (None, _, _) => Err(BulkError::Usage("missing sender".to_string())),
            (Some(s), None, ActionKind::Move) => Ok(Self::Move(s)),
            (Some(s), None, ActionKind::Rule) => Ok(Self::Rule(s)),
            (Some(_), Some(_), ActionKind::Move) => Ok(Self::BulkMove(targets)),
            (Some(_), Some(_), ActionKind::Rule) => Ok(Self::BulkRule(targets)),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Move(_) => "move",
            Self::Rule(_) => "rule",
            Self::BulkMove(_) => "bulk_move",
            Self::BulkRule(_) => "bulk_rule",
        }
    }

    pub fn targets(&self) -> Vec<String> {
        match self {
            Self::Move(s) | Self::Rule(s) => vec![s.clone()],
            Self::BulkMove(v) | Self::BulkRule(v) => v.clone(),
        }
    }

    pub fn confirmation_prompt(&self) -> String {
        match self {
            Self::Move(s) => format!(
                "Move all non-bulk messages from {s} to the bulk folder? This cannot be easily undone."
            ),
            Self::Rule(s) => format!(
                "Create a filter rule to move future messages from {s} to the bulk folder?"
            ),
            Self::BulkMove(v) => format!(
                "Move all messages from {} selected senders ({})?",
                v.len(),
                list_preview(v)
            ),
            Self::BulkRule(v) => format!(
                "Create rules for {} selected senders ({})?",
                v.len(),
                list_preview(v)
            ),
        }
    }

    fn preview_status(&self) -> Status {
        let message = match self {
            Self::Move(s) => format!("Preview: Would move all messages from {s} to bulk folder"),
            Self::Rule(s) => format!(
                "Preview: Would create rule to automatically move messages from {s} to bulk"
            ),
            Self::BulkMove(v) => format!(
                "Preview: Would move all messages from {} selected senders to bulk folder",
                v.len()
            ),
            Self::BulkRule(v) => {
                format!("Preview: Would create rules for {} selected senders", v.len())
            }
        };
        Status::new(message, Severity::Info)
    }

    /// Describe the action without touching the server.
    pub fn preview(&self) -> ActionReport {
        ActionReport {
            action: self.kind_name(),
            preview: true,
            targets: self.targets(),
            status: self.preview_status(),
            results: Vec::new(),
        }
    }

    /// Run the action. Bulk actions go one sender at a time and record an
    /// outcome for every sender; single actions return their error.
    pub async fn execute<E: SenderActions>(&self, exec: &E) -> Result<ActionReport, BulkError> {
        let (status, results) = match self {
            Self::Move(s) => {
                let o = exec.move_from_sender(s).await?;
                (move_status(s, o), vec![TargetResult::moved(s, o)])
            }
            Self::Rule(s) => {
                let o = exec.create_rule(s).await?;
                let status = Status::new(
                    format!("Created rule to move messages from {s} to bulk folder"),
                    Severity::Success,
                );
                (status, vec![TargetResult::rule(s, o)])
            }
            Self::BulkMove(senders) => {
                let mut results = Vec::with_capacity(senders.len());
                for s in senders {
                    match exec.move_from_sender(s).await {
                        Ok(o) => results.push(TargetResult::moved(s, o)),
                        Err(e) => {
                            log::warn!("bulk move: {s}: {e}");
                            results.push(TargetResult::failed(s, &e));
                        }
                    }
                }
                (bulk_move_status(&results), results)
            }
            Self::BulkRule(senders) => {
                let mut results = Vec::with_capacity(senders.len());
                for s in senders {
                    match exec.create_rule(s).await {
                        Ok(o) => results.push(TargetResult::rule(s, o)),
                        Err(e) => {
                            log::warn!("bulk rule: {s}: {e}");
                            results.push(TargetResult::failed(s, &e));
                        }
                    }
                }
                (bulk_rule_status(&results), results)
            }
        };

        Ok(ActionReport {
            action: self.kind_name(),
            preview: false,
            targets: self.targets(),
            status,
            results,
        })
    }
}

fn list_preview(senders: &[String]) -> String {
    let shown = senders.iter().take(5).cloned().collect::<Vec<_>>().join(", ");
    match senders.len() {
        n if n > 5 => format!("{shown} and {} more", n - 5),
        _ => shown,
    }
}

fn move_status(sender: &str, o: MoveOutcome) -> Status {
    match o {
        MoveOutcome { moved: 0, failed: 0 } => {
            Status::new("No messages to move".to_string(), Severity::Success)
        }
        MoveOutcome { moved, failed: 0 } => Status::new(
            format!("Moved {moved} messages from {sender} to bulk folder"),
            Severity::Success,
        ),
        MoveOutcome { moved, failed } => Status::new(
            format!("Moved {moved} messages from {sender} to bulk folder ({failed} failed)"),
            Severity::Warning,
        ),
    }
}

fn bulk_severity(ok: usize, total: usize, errors: usize) -> Severity {
    if ok == 0 {
        Severity::Error
    } else if ok == total && errors == 0 {
        Severity::Success
    } else {
        Severity::Warning
    }
}

fn bulk_move_status(results: &[TargetResult]) -> Status {
    let ok = results.iter().filter(|r| r.ok).count();
    let moved: usize = results.iter().filter_map(|r| r.moved).sum();
    let errors: usize =
        results.iter().filter_map(|r| r.failed).sum::<usize>() + (results.len() - ok);

    let mut message = format!(
        "Bulk move completed: {ok}/{} senders processed, {moved} messages moved",
        results.len()
    );
    if errors > 0 {
        message.push_str(&format!(" ({errors} errors)"));
    }
    Status::new(message, bulk_severity(ok, results.len(), errors))
}

fn bulk_rule_status(results: &[TargetResult]) -> Status {
    let ok = results.iter().filter(|r| r.ok).count();
    let errors = results.len() - ok;

    let mut message = format!(
        "Bulk rule creation completed: {ok}/{} rules created",
        results.len()
    );
    if errors > 0 {
        message.push_str(&format!(" ({errors} errors)"));
    }
    Status::new(message, bulk_severity(ok, results.len(), errors))
}
