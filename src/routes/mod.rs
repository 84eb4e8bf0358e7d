//! Client-side route gating
//!
//! Each dashboard section is reachable by a fixed set of roles. The guard
//! only decides what to show; the server enforces access on every call.
//!
//! - No identity: go to `/login`
//! - Identity whose role is not allowed (or unknown): go to `/unauthorized`
//! - Otherwise: render

mod table;

pub use table::{landing_route, menu, RouteDescriptor, RouteTable};

use crate::auth::{Identity, Role, SessionStore};

pub const LOGIN_PATH: &str = "/login";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";
pub const ROOT_PATH: &str = "/";

/// Where a denied or forwarding navigation goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    Login,
    Unauthorized,
    To(&'static str),
}

impl Redirect {
    pub fn path(&self) -> &'static str {
        match self {
            Redirect::Login => LOGIN_PATH,
            Redirect::Unauthorized => UNAUTHORIZED_PATH,
            Redirect::To(path) => path,
        }
    }
}

/// Outcome of gating one navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    Redirect(Redirect),
}

impl GuardDecision {
    /// Perform the redirect, if any, and report whether the content renders
    pub fn apply(self, navigator: &mut dyn Navigator) -> bool {
        match self {
            GuardDecision::Render => true,
            GuardDecision::Redirect(redirect) => {
                navigator.navigate(redirect.path());
                false
            }
        }
    }
}

/// Something that can move the user to another route
pub trait Navigator {
    fn navigate(&mut self, path: &str);
}

/// Decide whether `identity` may see a route open to `allowed`
pub fn guard(allowed: &[Role], identity: Option<&Identity>) -> GuardDecision {
    match identity {
        None => GuardDecision::Redirect(Redirect::Login),
        Some(identity) => match identity.role {
            Some(role) if allowed.contains(&role) => GuardDecision::Render,
            _ => GuardDecision::Redirect(Redirect::Unauthorized),
        },
    }
}

/// A route's allow-list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGuard {
    allowed: Vec<Role>,
}

impl RouteGuard {
    pub fn new(allowed: impl IntoIterator<Item = Role>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    /// Open to every known role
    pub fn any_role() -> Self {
        Self::new(Role::ALL)
    }

    pub fn allowed(&self) -> &[Role] {
        &self.allowed
    }

    pub fn check(&self, identity: Option<&Identity>) -> GuardDecision {
        guard(&self.allowed, identity)
    }

    pub fn check_session(&self, session: &SessionStore) -> GuardDecision {
        self.check(session.identity().as_ref())
    }
}
