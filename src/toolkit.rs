use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

use crate::session::{Credentials, Session};

pub const TOOL_NAME: &str = "bulkManager";

/// Authenticated context published by the last successful connect.
#[derive(Debug, Clone)]
pub struct SharedAuth {
    pub server_url: String,
    pub credentials: Credentials,
    pub session: Session,
}

/// Context shared by cooperating tools in one process. Last writer wins.
#[derive(Debug, Default)]
pub struct Toolkit {
    tools: RwLock<BTreeSet<String>>,
    shared_auth: RwLock<Option<Arc<SharedAuth>>>,
}

impl Toolkit {
    pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tool(&self, name: &str) {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
    }

    pub fn tools(&self) -> Vec<String> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn set_shared_auth(&self, auth: SharedAuth) {
        *self
            .shared_auth
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(auth));
    }

    pub fn shared_auth(&self) -> Option<Arc<SharedAuth>> {
        self.shared_auth
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Published session for this server and user, if one exists.
    pub fn session_for(&self, server_url: &str, credentials: &Credentials) -> Option<Session> {
        self.shared_auth()
            .filter(|a| a.server_url == server_url && a.credentials == *credentials)
            .map(|a| a.session.clone())
    }
}
