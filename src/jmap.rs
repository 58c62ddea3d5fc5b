use std::sync::atomic::{AtomicUsize, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::BulkError;
use crate::session::Credentials;

pub const CAP_CORE: &str = "urn:ietf:params:jmap:core";
pub const CAP_MAIL: &str = "urn:ietf:params:jmap:mail";
pub const CAP_SIEVE: &str = "urn:ietf:params:jmap:sieve";

pub const USING_MAIL: &[&str] = &[CAP_CORE, CAP_MAIL];
pub const USING_SIEVE: &[&str] = &[CAP_CORE, CAP_MAIL, CAP_SIEVE];

/// One `[name, arguments, tag]` method call.
#[derive(Debug, Clone, Serialize)]
pub struct Invocation(pub String, pub Value, pub String);

/// One `[name, result, tag]` method response.
#[derive(Debug, Clone, Deserialize)]
pub struct MethodResponse(pub String, pub Value, pub String);

impl MethodResponse {
    pub fn tag(&self) -> &str {
        &self.2
    }

    /// Arguments of a successful response to `method`.
    pub fn into_arguments(self, method: &str) -> Result<Value, BulkError> {
        if self.0 == "error" {
            return Err(BulkError::method(method, self.1));
        }
        if self.0 != method {
            return Err(BulkError::transport(format!(
                "expected {method} response, got {}",
                self.0
            )));
        }
        Ok(self.1)
    }

    pub fn parse<T: DeserializeOwned>(self, method: &str) -> Result<T, BulkError> {
        let args = self.into_arguments(method)?;
        serde_json::from_value(args)
            .map_err(|e| BulkError::transport(format!("malformed {method} response: {e}")))
    }
}

/// Handle to a call that was added to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRef {
    pub name: String,
    pub tag: String,
}

impl CallRef {
    /// Back-reference to a path in this call's result, resolved by the server.
    pub fn result_reference(&self, path: &str) -> Value {
        json!({
            "resultOf": self.tag,
            "name": self.name,
            "path": path,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    using: Vec<&'static str>,
    method_calls: Vec<Invocation>,
}

impl Request {
    pub fn new(using: &[&'static str]) -> Self {
        Self {
            using: using.to_vec(),
            method_calls: Vec::new(),
        }
    }

    /// Append a call; tags are assigned in order ("0", "1", ...).
    pub fn call(&mut self, name: &str, arguments: Value) -> CallRef {
        let tag = self.method_calls.len().to_string();
        self.method_calls
            .push(Invocation(name.to_string(), arguments, tag.clone()));
        CallRef {
            name: name.to_string(),
            tag,
        }
    }

    pub fn method_names(&self) -> Vec<&str> {
        self.method_calls.iter().map(|c| c.0.as_str()).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub method_responses: Vec<MethodResponse>,
}

impl Response {
    /// Remove and return the first response tagged like `call`.
    pub fn take(&mut self, call: &CallRef) -> Result<MethodResponse, BulkError> {
        let pos = self
            .method_responses
            .iter()
            .position(|r| r.tag() == call.tag)
            .ok_or_else(|| BulkError::transport(format!("missing {} response", call.name)))?;
        Ok(self.method_responses.remove(pos))
    }
}

/// Batched JMAP calls over HTTP. Every request carries Basic auth.
pub struct Transport {
    http: reqwest::Client,
    api_url: String,
    credentials: Credentials,
    calls: AtomicUsize,
}

impl Transport {
    pub fn new(http: reqwest::Client, api_url: String, credentials: Credentials) -> Self {
        Self {
            http,
            api_url,
            credentials,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of HTTP requests issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub async fn invoke(&self, request: &Request) -> Result<Response, BulkError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        log::debug!("JMAP call: {}", request.method_names().join(", "));

        let resp = self
            .http
            .post(&self.api_url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.pass))
            .json(request)
            .send()
            .await
            .map_err(|e| BulkError::transport(format!("JMAP request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.json::<Value>().await.ok();
            return Err(BulkError::http_status(
                format!("JMAP call failed: {}", status.as_u16()),
                status.as_u16(),
                detail,
            ));
        }

        resp.json::<Response>()
            .await
            .map_err(|e| BulkError::transport(format!("malformed JMAP response: {e}")))
    }

    pub async fn download_text(&self, url: &str) -> Result<String, BulkError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        log::debug!("blob download: {url}");

        let resp = self
            .http
            .get(url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.pass))
            .send()
            .await
            .map_err(|e| BulkError::transport(format!("download failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BulkError::http_status(
                format!("download failed: {}", status.as_u16()),
                status.as_u16(),
                None,
            ));
        }

        resp.text()
            .await
            .map_err(|e| BulkError::transport(format!("download failed: {e}")))
    }

    /// Upload a blob and return its id.
    pub async fn upload(
        &self,
        url: &str,
        content_type: &str,
        body: String,
    ) -> Result<String, BulkError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct UploadResponse {
            blob_id: String,
        }

        self.calls.fetch_add(1, Ordering::Relaxed);
        log::debug!("blob upload: {} bytes", body.len());

        let resp = self
            .http
            .post(url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.pass))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| BulkError::transport(format!("upload failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.json::<Value>().await.ok();
            return Err(BulkError::http_status(
                format!("upload failed: {}", status.as_u16()),
                status.as_u16(),
                detail,
            ));
        }

        resp.json::<UploadResponse>()
            .await
            .map(|u| u.blob_id)
            .map_err(|e| BulkError::transport(format!("malformed upload response: {e}")))
    }
}
