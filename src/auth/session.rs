//! Session store: the single source of truth for who is logged in
//!
//! ```text
//! anonymous ──login──▶ authenticating ──ok──▶ authenticated
//!     ▲                      │                     │
//!     └────── rejected ──────┘◀── logout / 401 ────┘
//! ```
//!
//! One `SessionStore` exists per application; consumers receive it
//! explicitly (usually through [`crate::AppContext`]) and observe changes
//! with [`SessionStore::subscribe`].

use crate::api::{ApiClient, RequestOptions};
use crate::auth::tokens::{Credential, Identity, Role};
use crate::error::{ClientError, Result};
use crate::storage::CredentialStore;

use reqwest::Method;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Login endpoint, form-encoded `username` + `password`
pub const LOGIN_PATH: &str = "/auth/login";

/// Session lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    /// A login request is in flight
    Authenticating,
    Authenticated(Identity),
}

impl SessionState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }
}

pub struct SessionStore {
    api: ApiClient,
    credentials: CredentialStore,
    state: watch::Sender<SessionState>,
}

impl SessionStore {
    /// Create an anonymous session. Does not look at persisted state; see
    /// [`SessionStore::restore`].
    pub fn new(api: ApiClient) -> Self {
        let credentials = api.credentials().clone();
        let (state, _) = watch::channel(SessionState::Anonymous);

        Self {
            api,
            credentials,
            state,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Identity of the logged-in user, `None` when anonymous
    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity().cloned()
    }

    /// Role of the logged-in user, `None` when anonymous or role unknown
    pub fn role(&self) -> Option<Role> {
        self.state.borrow().identity().and_then(|i| i.role)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::Authenticated(_))
    }

    /// Exchange username and password for a credential.
    ///
    /// On success the credential is persisted and the decoded identity
    /// published. A credential whose payload cannot be decoded still logs
    /// the user in, with an empty identity.
    pub async fn login(&self, username: &str, password: &str) -> Result<Identity> {
        self.set_state(SessionState::Authenticating);

        match self.request_credential(username, password).await {
            Ok(credential) => {
                if let Err(e) = self.credentials.save(&credential) {
                    self.reset();
                    return Err(e.into());
                }

                let identity = Identity::decode(&credential).unwrap_or_else(|e| {
                    warn!(error = %e, "Credential payload unreadable, continuing without role");
                    Identity::default()
                });

                info!(username = %identity.username, role = ?identity.role, "Logged in");
                self.set_state(SessionState::Authenticated(identity.clone()));
                Ok(identity)
            }
            Err(e) => {
                debug!(error = %e, "Login failed");
                self.reset();
                Err(e)
            }
        }
    }

    /// Forget the identity and delete the persisted credential. Safe to call
    /// when already logged out.
    pub fn logout(&self) -> Result<()> {
        self.set_state(SessionState::Anonymous);
        self.credentials.clear()?;
        info!("Logged out");
        Ok(())
    }

    /// Drop the session because the server rejected the credential
    pub fn invalidate(&self) {
        if self.is_authenticated() {
            warn!("Credential rejected by server, ending session");
        }
        self.reset();
    }

    /// Drop the session only if `rejected` is still the stored credential.
    ///
    /// A 401 for a request sent before the latest login (or with no
    /// credential at all) says nothing about the current session.
    pub fn invalidate_if_current(&self, rejected: &Credential) -> bool {
        match self.credentials.load() {
            Ok(Some(current)) if current == *rejected => {
                self.invalidate();
                true
            }
            Ok(_) => {
                debug!("Ignoring 401 for a credential that is no longer stored");
                false
            }
            Err(e) => {
                warn!(error = %e, "Failed to read credential, ending session");
                self.invalidate();
                true
            }
        }
    }

    /// Re-derive the identity from a persisted credential.
    ///
    /// Returns `None` (and stays anonymous) when nothing is persisted.
    pub fn restore(&self) -> Result<Option<Identity>> {
        let Some(credential) = self.credentials.load()? else {
            return Ok(None);
        };

        let identity = Identity::decode(&credential).unwrap_or_else(|e| {
            warn!(error = %e, "Persisted credential payload unreadable, continuing without role");
            Identity::default()
        });

        debug!(username = %identity.username, "Session restored from storage");
        self.set_state(SessionState::Authenticated(identity.clone()));
        Ok(Some(identity))
    }

    async fn request_credential(&self, username: &str, password: &str) -> Result<Credential> {
        let options = RequestOptions::form([("username", username), ("password", password)]);

        let response: serde_json::Value = self
            .api
            .request(Method::POST, LOGIN_PATH, options)
            .await
            .map_err(|e| match e {
                ClientError::Http { status, body } => {
                    ClientError::Authentication(format!("server answered {}: {}", status, body))
                }
                ClientError::Serialization(e) => {
                    ClientError::Authentication(format!("malformed login response: {}", e))
                }
                other => other,
            })?;

        response
            .get("access_token")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(Credential::new)
            .ok_or_else(|| ClientError::Authentication("login response has no access_token".into()))
    }

    fn reset(&self) {
        self.set_state(SessionState::Anonymous);
        if let Err(e) = self.credentials.clear() {
            warn!(error = %e, "Failed to clear credential");
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    fn session() -> SessionStore {
        let api = ApiClient::new(
            &ClientConfig::new("http://127.0.0.1:9"),
            CredentialStore::in_memory(),
        )
        .unwrap();
        SessionStore::new(api)
    }

    fn jwt(payload: &str) -> Credential {
        Credential::new(format!("h.{}.s", URL_SAFE_NO_PAD.encode(payload)))
    }

    #[test]
    fn test_initial_state() {
        let session = session();
        assert_eq!(session.state(), SessionState::Anonymous);
        assert!(session.identity().is_none());
        assert!(session.role().is_none());
    }

    #[test]
    fn test_logout_when_anonymous() {
        let session = session();
        session.logout().unwrap();
        session.logout().unwrap();
        assert_eq!(session.state(), SessionState::Anonymous);
    }

    #[test]
    fn test_restore_without_credential() {
        let session = session();
        assert!(session.restore().unwrap().is_none());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_restore_from_storage() {
        let session = session();
        session
            .credentials
            .save(&jwt(r#"{"sub":"ana","role":"admin"}"#))
            .unwrap();

        let identity = session.restore().unwrap().unwrap();
        assert_eq!(identity, Identity::new("ana", Role::Admin));
        assert_eq!(session.role(), Some(Role::Admin));
    }

    #[test]
    fn test_restore_malformed_credential() {
        let session = session();
        session.credentials.save(&Credential::new("garbage")).unwrap();

        let identity = session.restore().unwrap().unwrap();
        assert_eq!(identity, Identity::default());
        assert!(session.is_authenticated());
        assert!(session.role().is_none());
    }

    #[test]
    fn test_invalidate_clears_everything() {
        let session = session();
        session
            .credentials
            .save(&jwt(r#"{"sub":"ana","role":"mesero"}"#))
            .unwrap();
        session.restore().unwrap();

        session.invalidate();
        assert_eq!(session.state(), SessionState::Anonymous);
        assert!(session.credentials.load().unwrap().is_none());
    }

    #[test]
    fn test_invalidate_if_current_ignores_stale_credential() {
        let session = session();
        let current = jwt(r#"{"sub":"root","role":"admin"}"#);
        session.credentials.save(&current).unwrap();
        session.restore().unwrap();

        assert!(!session.invalidate_if_current(&jwt(r#"{"sub":"lu","role":"mesero"}"#)));
        assert_eq!(session.role(), Some(Role::Admin));
        assert_eq!(session.credentials.load().unwrap(), Some(current.clone()));

        assert!(session.invalidate_if_current(&current));
        assert_eq!(session.state(), SessionState::Anonymous);
        assert!(session.credentials.load().unwrap().is_none());
    }

    #[test]
    fn test_subscribers_see_changes() {
        let session = session();
        let mut rx = session.subscribe();
        session
            .credentials
            .save(&jwt(r#"{"sub":"ana","role":"cocina"}"#))
            .unwrap();

        session.restore().unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            rx.borrow_and_update().identity().and_then(|i| i.role),
            Some(Role::Cocina)
        );

        session.logout().unwrap();
        assert_eq!(*rx.borrow_and_update(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_login_unreachable_server_returns_to_anonymous() {
        let session = session();
        let result = session.login("ana", "pw").await;

        assert!(matches!(result, Err(ClientError::Request(_))));
        assert_eq!(session.state(), SessionState::Anonymous);
    }
}
