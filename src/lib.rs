//! KageControl client - session, authenticated HTTP and live notifications
//!
//! Client side of the KageControl restaurant operations backend. It keeps
//! track of who is logged in, attaches the bearer credential to every REST
//! call, follows the backend's WebSocket push channels with automatic
//! reconnection, and decides which dashboard routes a role may open.

pub mod api;
pub mod auth;
pub mod channels;
pub mod config;
pub mod context;
pub mod error;
pub mod routes;
pub mod storage;

pub use api::{ApiClient, KageApi};
pub use auth::{Credential, Identity, Role, SessionState, SessionStore};
pub use channels::{ChannelHandle, ConnectionState, Endpoint, NotificationChannel, NotificationEvent};
pub use config::ClientConfig;
pub use context::AppContext;
pub use error::{ClientError, Result};
pub use routes::{guard, GuardDecision, Redirect, RouteTable};
