use serde::Serialize;
use serde_json::{Value, json};

/// Message shown when the server cannot manage filter scripts over JMAP.
pub const RULES_UNAVAILABLE: &str = "Sieve script management not available. You can manually create a rule in Fastmail Settings → Rules.";

#[derive(Debug, thiserror::Error)]
pub enum BulkError {
    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Transport {
        message: String,
        status: Option<u16>,
        detail: Option<Value>,
    },

    #[error("{0}")]
    RuleUnavailable(String),

    #[error("{0}")]
    Rule(String),

    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Usage(String),
}

impl BulkError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
            detail: None,
        }
    }

    pub fn http_status(message: impl Into<String>, status: u16, detail: Option<Value>) -> Self {
        Self::Transport {
            message: message.into(),
            status: Some(status),
            detail,
        }
    }

    /// A method-level `["error", {...}, tag]` response.
    pub fn method(method: &str, detail: Value) -> Self {
        let kind = detail
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("serverFail")
            .to_string();
        let message = match detail.get("description").and_then(|d| d.as_str()) {
            Some(desc) => format!("{method} failed: {kind}: {desc}"),
            None => format!("{method} failed: {kind}"),
        };
        Self::Transport {
            message,
            status: None,
            detail: Some(detail),
        }
    }

    pub fn rules_unavailable() -> Self {
        Self::RuleUnavailable(RULES_UNAVAILABLE.to_string())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "authError",
            Self::NotFound(_) => "notFoundError",
            Self::Transport { .. } => "transportError",
            Self::RuleUnavailable(_) => "ruleUnavailable",
            Self::Rule(_) => "ruleError",
            Self::Config(_) => "configError",
            Self::Usage(_) => "usageError",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorOut {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jmap: Option<Value>,
}

impl From<&BulkError> for ErrorOut {
    fn from(e: &BulkError) -> Self {
        let (http, jmap) = match e {
            BulkError::Transport { status, detail, .. } => {
                (status.map(|s| json!({ "status": s })), detail.clone())
            }
            _ => (None, None),
        };
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
            http,
            jmap,
        }
    }
}

impl From<BulkError> for ErrorOut {
    fn from(e: BulkError) -> Self {
        Self::from(&e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_error_names_the_method_and_keeps_detail() {
        let e = BulkError::method(
            "SieveScript/get",
            json!({"type": "unknownMethod", "description": "no sieve here"}),
        );
        assert_eq!(e.to_string(), "SieveScript/get failed: unknownMethod: no sieve here");

        let out = ErrorOut::from(&e);
        assert_eq!(out.kind, "transportError");
        assert!(out.http.is_none());
        assert_eq!(
            out.jmap.as_ref().and_then(|j| j.get("type")).and_then(|t| t.as_str()),
            Some("unknownMethod")
        );
    }

    #[test]
    fn http_status_is_reported_under_http() {
        let out = ErrorOut::from(BulkError::http_status("JMAP call failed: 502", 502, None));
        assert_eq!(out.kind, "transportError");
        assert_eq!(out.http, Some(json!({"status": 502})));
        assert!(out.jmap.is_none());
    }
}
