use serde::Serialize;
use serde_json::Value;

use crate::error::ErrorOut;

pub const SCHEMA_VERSION: &str = "0.1";

#[derive(Debug, Default, Clone, Serialize)]
pub struct Meta {
    /// HTTP requests made against the server for this command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

impl Meta {
    pub fn requests(n: usize) -> Self {
        Self {
            requests: Some(n),
            warnings: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// A one-line outcome for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub message: String,
    pub severity: Severity,
}

impl Status {
    pub fn new(message: String, severity: Severity) -> Self {
        Self { message, severity }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T>
where
    T: Serialize,
{
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,

    pub ok: bool,
    pub command: String,
    pub account: Option<String>,
    pub data: Option<T>,
    pub error: Option<ErrorOut>,
    pub meta: Meta,
}

impl<T> Envelope<T>
where
    T: Serialize,
{
    pub fn ok(command: impl Into<String>, account: Option<String>, data: T, meta: Meta) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            ok: true,
            command: command.into(),
            account,
            data: Some(data),
            error: None,
            meta,
        }
    }

    pub fn err(
        command: impl Into<String>,
        account: Option<String>,
        error: impl Into<ErrorOut>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            ok: false,
            command: command.into(),
            account,
            data: None,
            error: Some(error.into()),
            meta: Meta::default(),
        }
    }
}

pub fn print_envelope(env: &Envelope<Value>, plain: bool) {
    if plain {
        println!("{}", crate::plain::render(env));
        return;
    }

    match serde_json::to_string_pretty(env) {
        Ok(s) => println!("{s}"),
        Err(e) => {
            log::error!("envelope serialization failed: {e}");
            println!(
                "{{\"schemaVersion\":\"{SCHEMA_VERSION}\",\"ok\":false,\"command\":{:?}}}",
                env.command
            );
        }
    }
}
