//! Application context: the one place that wires the client together
//!
//! ```text
//! KeyValueStore ─▶ CredentialStore ─▶ ApiClient ─▶ SessionStore
//!                                        │  ▲            │
//!                                        │  └── 401 ─────┘ invalidate
//!                                        ▼
//!                                     KageApi
//! ```
//!
//! Consumers receive an `AppContext` (or one of its parts) explicitly; there
//! is no process-wide session.

use crate::api::{ApiClient, KageApi};
use crate::auth::{Credential, Identity, SessionStore};
use crate::channels::{Endpoint, NotificationChannel};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::routes::{GuardDecision, RouteTable};
use crate::storage::{CredentialStore, KeyValueStore, MemoryStore};

use std::sync::{Arc, Weak};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AppContext {
    config: ClientConfig,
    api: ApiClient,
    session: Arc<SessionStore>,
    routes: RouteTable,
}

impl AppContext {
    /// Build the client on top of `backend`. The session starts anonymous;
    /// call [`AppContext::restore_session`] to pick up a persisted login.
    pub fn new(config: ClientConfig, backend: Arc<dyn KeyValueStore>) -> Result<Self> {
        let credentials = CredentialStore::with_key(backend, config.credential_key.clone());
        let api = ApiClient::new(&config, credentials)?;
        let session = Arc::new(SessionStore::new(api.clone()));

        // Weak: the session already owns a clone of the client
        let weak: Weak<SessionStore> = Arc::downgrade(&session);
        api.set_unauthorized_hook(Arc::new(move |sent: Option<&Credential>| {
            // requests that carried no stored credential cannot end a session
            if let (Some(session), Some(sent)) = (weak.upgrade(), sent) {
                session.invalidate_if_current(sent);
            }
        }));

        debug!(api_url = %config.api_url, "Client context ready");

        Ok(Self {
            config,
            api,
            session,
            routes: RouteTable::new(),
        })
    }

    /// Context whose credential lives only as long as the process
    pub fn in_memory(config: ClientConfig) -> Result<Self> {
        Self::new(config, Arc::new(MemoryStore::new()))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Typed endpoint wrapper sharing this context's client
    pub fn kage(&self) -> KageApi {
        KageApi::new(self.api.clone())
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn restore_session(&self) -> Result<Option<Identity>> {
        self.session.restore()
    }

    /// Gate `path` against the current identity
    pub fn navigate(&self, path: &str) -> GuardDecision {
        self.routes.resolve(path, self.session.identity().as_ref())
    }

    /// Unstarted channel for `endpoint`, configured from this context
    pub fn channel(&self, endpoint: Endpoint) -> Result<NotificationChannel> {
        NotificationChannel::new(&self.config, endpoint)
    }
}
