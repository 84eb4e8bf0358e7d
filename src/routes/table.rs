//! Role-to-route table
//!
//! ```text
//! /                 any role  → landing route of that role
//! /mesero/*         mesero
//! /admin/*          admin
//! /cocina/*         cocina
//! /login, /unauthorized       always render
//! anything else               → /
//! ```

use super::{guard, GuardDecision, Redirect, LOGIN_PATH, ROOT_PATH, UNAUTHORIZED_PATH};
use crate::auth::{Identity, Role};

/// A navigable page of a role's dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub path: &'static str,
    pub label: &'static str,
}

const fn route(path: &'static str, label: &'static str) -> RouteDescriptor {
    RouteDescriptor { path, label }
}

const MESERO_ROUTES: [RouteDescriptor; 4] = [
    route("/mesero/registrar", "Registrar llegada"),
    route("/mesero/ordenes", "Órdenes"),
    route("/mesero/plano", "Plano de mesas"),
    route("/mesero/seguimiento", "Seguimiento"),
];

const ADMIN_ROUTES: [RouteDescriptor; 4] = [
    route("/admin/reportes", "Ver reportes y estadísticas"),
    route("/admin/usuarios", "Gestionar usuarios y roles"),
    route("/admin/inventario", "Supervisar inventario"),
    route("/admin/informes", "Exportar informes"),
];

const COCINA_ROUTES: [RouteDescriptor; 3] = [
    route("/cocina/pedidos", "Ver pedidos por estación"),
    route("/cocina/estado", "Actualizar platillos"),
    route("/cocina/notas", "Notas dietéticas"),
];

/// Ordered menu for a role; the first entry is its landing route
pub fn menu(role: Role) -> &'static [RouteDescriptor] {
    match role {
        Role::Mesero => &MESERO_ROUTES,
        Role::Admin => &ADMIN_ROUTES,
        Role::Cocina => &COCINA_ROUTES,
    }
}

/// Where `/` sends this identity
pub fn landing_route(identity: Option<&Identity>) -> &'static str {
    identity
        .and_then(|i| i.role)
        .and_then(|role| menu(role).first())
        .map(|r| r.path)
        .unwrap_or(UNAUTHORIZED_PATH)
}

/// Resolves paths to guard decisions
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteTable;

impl RouteTable {
    pub fn new() -> Self {
        Self
    }

    /// Roles allowed on `path`, or `None` when the path is public or unknown
    pub fn allowed_roles(&self, path: &str) -> Option<&'static [Role]> {
        let path = normalize(path);
        if path == ROOT_PATH {
            return Some(&Role::ALL);
        }
        section(path).map(|role| match role {
            Role::Mesero => &[Role::Mesero][..],
            Role::Admin => &[Role::Admin][..],
            Role::Cocina => &[Role::Cocina][..],
        })
    }

    pub fn resolve(&self, path: &str, identity: Option<&Identity>) -> GuardDecision {
        let path = normalize(path);

        if path == LOGIN_PATH || path == UNAUTHORIZED_PATH {
            return GuardDecision::Render;
        }

        match self.allowed_roles(path) {
            Some(allowed) => match guard(allowed, identity) {
                GuardDecision::Render if path == ROOT_PATH => {
                    GuardDecision::Redirect(Redirect::To(landing_route(identity)))
                }
                decision => decision,
            },
            None => GuardDecision::Redirect(Redirect::To(ROOT_PATH)),
        }
    }
}

/// Drop query, fragment and trailing slashes
fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or("");
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        ROOT_PATH
    } else {
        trimmed
    }
}

/// Role whose section contains `path`
fn section(path: &str) -> Option<Role> {
    let first = path.trim_start_matches('/').split('/').next()?;
    Role::ALL.into_iter().find(|role| role.as_str() == first)
}
