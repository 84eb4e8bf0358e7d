//! Credentials and the identity decoded from them
//!
//! Credentials are JWTs issued by the backend: `header.payload.signature`,
//! each segment base64url without padding. The payload carries
//! `{"sub": "<username>", "role": "<role>"}`.
//!
//! The client holds no verification key, so the decoded [`Identity`] is
//! advisory: good for choosing what to show, never for deciding what the
//! server will allow. The server re-checks the bearer on every call.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token format")]
    InvalidFormat,

    #[error("token decode error: {0}")]
    DecodeError(String),
}

/// Opaque bearer token
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential([REDACTED])")
    }
}

/// Roles known to the dashboards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Waitstaff
    Mesero,
    Admin,
    /// Kitchen
    Cocina,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Mesero, Role::Admin, Role::Cocina];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Mesero => "mesero",
            Role::Admin => "admin",
            Role::Cocina => "cocina",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mesero" => Ok(Role::Mesero),
            "admin" => Ok(Role::Admin),
            "cocina" => Ok(Role::Cocina),
            other => Err(TokenError::DecodeError(format!("unknown role '{}'", other))),
        }
    }
}

/// Claims read from the credential payload
#[derive(Debug, Clone, Default, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

/// Who is logged in, as claimed by the credential
///
/// An identity with no role is what a credential with an unreadable payload
/// degrades to: the user is logged in but no role-gated route will render.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub role: Option<Role>,
}

impl Identity {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role: Some(role),
        }
    }

    /// Decode the payload segment of a credential without verifying it.
    ///
    /// Roles the client does not know about decode to `None`.
    pub fn decode(credential: &Credential) -> Result<Self, TokenError> {
        let mut parts = credential.as_str().split('.');
        let payload_b64 = match (parts.next(), parts.next()) {
            (Some(_header), Some(payload)) if !payload.is_empty() => payload,
            _ => return Err(TokenError::InvalidFormat),
        };

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64.trim_end_matches('='))
            .map_err(|e| TokenError::DecodeError(e.to_string()))?;

        let claims: Claims = serde_json::from_slice(&payload_json)
            .map_err(|e| TokenError::DecodeError(e.to_string()))?;

        Ok(Self {
            username: claims.sub.unwrap_or_default(),
            role: claims.role.and_then(|r| r.parse().ok()),
        })
    }

    pub fn has_role(&self) -> bool {
        self.role.is_some()
    }
}
